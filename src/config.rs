//! Deployment configuration for the save queue
//!
//! Loaded from JSON; every field has a default, so `{}` is a valid config.
//!
//! ```json
//! { "app_name": "my-game", "strategy": "dedicated_worker" }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::save::{FileTarget, SaveError};

/// Which execution strategy a manager runs its I/O on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// Each task is a separate unit of work on a rayon pool
    #[default]
    ThreadPool,
    /// One long-lived background thread
    DedicatedWorker,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    /// Subdirectory name under the platform data directory
    pub app_name: String,
    /// Overrides the platform data directory entirely
    pub save_dir: Option<PathBuf>,
    pub strategy: ExecutionStrategy,
    /// Worker count for the thread-pool strategy (0 = let rayon decide)
    pub pool_threads: usize,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            app_name: "save-queue".to_string(),
            save_dir: None,
            strategy: ExecutionStrategy::ThreadPool,
            pool_threads: 1,
        }
    }
}

impl SaveConfig {
    pub fn from_json_str(json: &str) -> Result<Self, SaveError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SaveError> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Directory every file target lives under
    pub fn resolve_save_dir(&self) -> PathBuf {
        if let Some(dir) = &self.save_dir {
            return dir.clone();
        }
        dirs::data_dir()
            .map(|p| p.join(&self.app_name))
            .unwrap_or_else(|| PathBuf::from("./saves"))
    }

    /// File target for `name` inside the save directory
    pub fn file_target(&self, name: &str) -> Result<FileTarget, SaveError> {
        FileTarget::new(self.resolve_save_dir(), name)
    }
}
