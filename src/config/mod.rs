pub mod settings;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::core::MatchStrategy;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Where the key-value store keeps its JSON files. `None` uses the platform data dir.
    pub data_directory: Option<PathBuf>,
    pub last_directory: Option<PathBuf>,
    pub default_template: String,
    pub match_strategy: MatchStrategy,
    /// Resolve `{date}`/`{time}` once per batch instead of once per file.
    pub pin_batch_timestamp: bool,
    pub allow_overwrite: bool,
    pub rename_workers: usize,
    pub max_concurrent_uploads: usize,
    pub upload_chunk_size: usize,
    pub export_directory: Option<PathBuf>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        settings::load_config(None)
    }

    /// Directory of the key-value store.
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_directory {
            Some(dir) => Ok(dir.clone()),
            None => settings::get_data_directory()
                .ok_or_else(|| anyhow::anyhow!("Could not determine data directory")),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_directory: None,
            last_directory: None,
            default_template: "{class}-{name}-{index}".to_string(),
            match_strategy: MatchStrategy::NameSubstring,
            pin_batch_timestamp: false,
            allow_overwrite: false,
            rename_workers: 4,
            max_concurrent_uploads: 3,
            upload_chunk_size: 64 * 1024,
            export_directory: dirs::desktop_dir(),
        }
    }
}
