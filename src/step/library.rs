//! STEP file library resolution
//!
//! The library directory is decided once, when the pipeline is built. Lookups
//! afterwards only probe `<guid>.step` and `<guid>.STEP` inside it.

use crate::constants;
use crate::error::StepError;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepConfig {
    /// Used as-is when set
    pub root: Option<PathBuf>,
    /// Probed in order when no root is set
    pub candidate_roots: Vec<PathBuf>,
    /// Environment variable naming a fallback directory
    pub env_var: String,
}

impl Default for StepConfig {
    fn default() -> Self {
        let mut candidate_roots: Vec<PathBuf> = constants::step::CANDIDATE_ROOTS
            .iter()
            .map(PathBuf::from)
            .collect();
        if let Some(data_dir) = dirs::data_dir() {
            candidate_roots.push(data_dir.join(constants::step::DATA_SUBDIR));
        }
        Self {
            root: None,
            candidate_roots,
            env_var: constants::step::ENV_VAR.to_string(),
        }
    }
}

impl StepConfig {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepLibrary {
    root: PathBuf,
}

impl StepLibrary {
    /// Picks the library directory: the configured root, else the first
    /// existing candidate, else the environment override
    pub fn resolve(config: &StepConfig) -> Result<Self, StepError> {
        if let Some(root) = &config.root {
            if root.is_dir() {
                info!("Using STEP library {}", root.display());
                return Ok(Self { root: root.clone() });
            }
            return Err(StepError::NoLibrary {
                searched: vec![root.clone()],
            });
        }

        let mut searched = Vec::new();
        for candidate in &config.candidate_roots {
            if candidate.is_dir() {
                info!("Using STEP library {}", candidate.display());
                return Ok(Self {
                    root: candidate.clone(),
                });
            }
            searched.push(candidate.clone());
        }

        if let Some(dir) = std::env::var_os(&config.env_var).map(PathBuf::from) {
            if dir.is_dir() {
                info!("Using STEP library {} from ${}", dir.display(), config.env_var);
                return Ok(Self { root: dir });
            }
            searched.push(dir);
        }

        Err(StepError::NoLibrary { searched })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file for `guid`, lower-case extension first
    pub fn locate(&self, guid: &str) -> Result<PathBuf, StepError> {
        for extension in constants::step::EXTENSIONS {
            let path = self.root.join(format!("{}.{}", guid, extension));
            if path.is_file() {
                debug!("Found STEP file {}", path.display());
                return Ok(path);
            }
        }
        Err(StepError::FileNotFound {
            guid: guid.to_string(),
            root: self.root.clone(),
        })
    }
}
