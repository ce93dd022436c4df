//! Error types for evaluation, STEP resolution and configuration
//!
//! Item-level problems never show up here: they travel as strings in the
//! response's display info. These errors are the environment-fatal ones.

use crate::kernel::KernelError;
use std::path::PathBuf;
use thiserror::Error;

/// A callback was invoked in a way that indicates an integration defect
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{callback}: {reason}")]
pub struct ContractViolation {
    pub callback: &'static str,
    pub reason: String,
}

impl ContractViolation {
    pub fn new(callback: &'static str, reason: impl Into<String>) -> Self {
        Self {
            callback,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum StepError {
    #[error("no STEP library directory found (searched: {})", display_paths(.searched))]
    NoLibrary { searched: Vec<PathBuf> },

    #[error("STEP file for {guid} not found in {}", .root.display())]
    FileNotFound { guid: String, root: PathBuf },

    #[error("failed to import STEP file for {guid}: {source}")]
    Import {
        guid: String,
        #[source]
        source: KernelError,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "nothing".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure of a whole evaluation
#[derive(Debug, Clone, Error)]
pub enum EvaluateError {
    #[error("contract violation in {0}")]
    ContractViolation(#[from] ContractViolation),

    #[error("program failed to compile: {0}")]
    Compile(String),

    #[error("program aborted: {0}")]
    Script(String),

    #[error(transparent)]
    Step(#[from] StepError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let violation = ContractViolation::new("display", "id must be a string");
        assert_eq!(violation.to_string(), "display: id must be a string");

        let err = EvaluateError::from(violation);
        assert_eq!(err.to_string(), "contract violation in display: id must be a string");

        let err = StepError::NoLibrary { searched: vec![] };
        assert_eq!(err.to_string(), "no STEP library directory found (searched: nothing)");
    }
}
