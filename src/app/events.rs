//! Defines the event and message structures exchanged with the host.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use super::view_model::{FormatTokenInfo, HomeworkReport, RenamePreview, UiState};
use crate::core::schema::Record;
use crate::core::{RosterEntry, UploadTask};
use crate::fs_ops::{DirEntryInfo, RenameOutcome};
use crate::storage::{ColorMode, TableMeta, UploadRecord};

/// Events sent from the backend to the host.
///
/// Serialized as `{"event": "<name>", "payload": ...}`, one per line.
#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum UserEvent {
    /// A complete state update to re-render the UI.
    StateUpdate(Box<UiState>),
    DirectoryListing {
        path: String,
        entries: Vec<DirEntryInfo>,
    },
    FolderCreated {
        path: Utf8PathBuf,
    },
    /// An error message to be displayed to the user.
    Error(String),
    /// The dry-run result of a rename template. Nothing has been renamed yet.
    RenamePreview(RenamePreview),
    /// Per-file outcomes of an applied rename plan.
    RenameApplied {
        succeeded: usize,
        failed: usize,
        outcomes: Vec<RenameOutcome>,
    },
    FormatTokens(Vec<FormatTokenInfo>),
    TableStored(TableMeta),
    Tables(Vec<TableMeta>),
    TableData {
        meta: TableMeta,
        data: Vec<Record>,
    },
    TableDeleted {
        id: String,
        deleted: bool,
    },
    HomeworkReport(Box<HomeworkReport>),
    /// Roster entries narrowed by class and/or search term.
    RosterEntries(Vec<RosterEntry>),
    MissingExported {
        path: String,
        count: usize,
    },
    ColorMode(ColorMode),
    ConfigExported {
        path: String,
    },
    /// The current state of one upload task.
    UploadProgress(UploadTask),
    UploadHistory(Vec<UploadRecord>),
}

/// A message received from the host.
#[derive(Deserialize, Debug)]
pub struct IpcMessage {
    /// The name of the command to execute.
    pub command: String,
    /// The payload associated with the command, as a JSON value.
    #[serde(default)]
    pub payload: serde_json::Value,
}
