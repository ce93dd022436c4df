//! Pipeline configuration
//!
//! Loaded from a JSON file. Every section and field is optional; missing
//! values fall back to the defaults in `constants`.

use crate::error::ConfigError;
use crate::kernel::KernelSettings;
use crate::sandbox::SandboxLimits;
use crate::step::StepConfig;
use serde::{Deserialize, Serialize};
use shapedelta_core::MergeOptions;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sandbox: SandboxLimits,
    pub kernel: KernelSettings,
    pub step: StepConfig,
    pub merge: MergeOptions,
}

impl PipelineConfig {
    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Merge options with an explicit age limit taking precedence over the file
    pub fn merge_options(&self, max_age: Option<u64>) -> MergeOptions {
        max_age.map(MergeOptions::with_max_age).unwrap_or(self.merge)
    }
}
