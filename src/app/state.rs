//! Defines the central, mutable state of the application.

use anyhow::Result;
use camino::Utf8PathBuf;
use std::path::PathBuf;
use std::sync::Arc;

use super::view_model::HomeworkReport;
use crate::config::{settings, AppConfig};
use crate::core::{FileRecord, RenamePlan, RosterEntry, UploadQueue};
use crate::storage::{
    JsonFileStore, KeyValueStore, MemoryStore, TableRepository, ThemeRepository,
    UploadHistoryRepository,
};

/// Holds the complete, mutable state of the application.
///
/// This struct is wrapped in an `Arc<Mutex<...>>` to allow for safe, shared access
/// from the host loop and the background upload tasks.
pub struct AppState {
    /// The application's configuration settings.
    pub config: AppConfig,
    /// Directory the config is saved to. `None` is the platform config directory.
    pub config_dir: Option<PathBuf>,
    pub themes: ThemeRepository,
    pub tables: TableRepository,
    pub upload_history: UploadHistoryRepository,
    /// The folder whose files are offered for renaming.
    pub current_folder: Option<Utf8PathBuf>,
    /// Files of `current_folder`, in listing order.
    pub files: Vec<FileRecord>,
    /// The template of the last preview.
    pub template: String,
    /// The last previewed plan. Cleared whenever the file list or selection changes.
    pub plan: Option<RenamePlan>,
    /// `true` while a rename plan is being applied.
    pub is_renaming: bool,
    /// The roster of the last homework check.
    pub roster: Vec<RosterEntry>,
    pub report: Option<HomeworkReport>,
    pub uploads: UploadQueue,
    pub status_message: String,
}

impl Default for AppState {
    /// Creates a default `AppState` instance, loading the configuration from disk.
    fn default() -> Self {
        let config = AppConfig::load().unwrap_or_default();
        let store: Arc<dyn KeyValueStore> = match config.data_dir() {
            Ok(dir) => Arc::new(JsonFileStore::new(dir)),
            Err(e) => {
                tracing::warn!("{}. Keeping data in memory only.", e);
                Arc::new(MemoryStore::new())
            }
        };
        Self::new(config, None, store)
    }
}

impl AppState {
    pub fn new(config: AppConfig, config_dir: Option<PathBuf>, store: Arc<dyn KeyValueStore>) -> Self {
        let template = config.default_template.clone();
        Self {
            config,
            config_dir,
            themes: ThemeRepository::new(store.clone()),
            tables: TableRepository::new(store.clone()),
            upload_history: UploadHistoryRepository::new(store),
            current_folder: None,
            files: Vec::new(),
            template,
            plan: None,
            is_renaming: false,
            roster: Vec::new(),
            report: None,
            uploads: UploadQueue::new(),
            status_message: "Ready.".to_string(),
        }
    }

    pub fn save_config(&self) -> Result<()> {
        settings::save_config(&self.config, self.config_dir.as_deref())
    }

    /// Drops the previewed plan and the names it put on the file records.
    pub fn invalidate_plan(&mut self) {
        self.plan = None;
        for file in &mut self.files {
            file.new_name = None;
        }
    }

    /// Replaces the file list of the current folder.
    pub fn set_files(&mut self, folder: Utf8PathBuf, files: Vec<FileRecord>) {
        self.current_folder = Some(folder);
        self.files = files;
        self.plan = None;
    }

    /// Forgets the open folder, the plan and the last homework check.
    ///
    /// Uploads keep running; their queue is left alone.
    pub fn reset_session(&mut self) {
        self.current_folder = None;
        self.files.clear();
        self.plan = None;
        self.roster.clear();
        self.report = None;
    }

    pub fn selected_count(&self) -> usize {
        self.files.iter().filter(|f| f.selected).count()
    }
}
