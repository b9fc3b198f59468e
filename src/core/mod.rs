//! The renaming and matching engine.
//!
//! Everything in here is a pure function over in-memory collections, with the
//! exception of `transfer`, which only models state and never touches the disk.

pub mod error;
pub mod planner;
pub mod roster;
pub mod schema;
pub mod template;
pub mod tokens;
pub mod transfer;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// A file in the folder currently open for batch renaming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub path: Utf8PathBuf,
    pub selected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
}

impl FileRecord {
    pub fn new(id: impl Into<String>, path: impl Into<Utf8PathBuf>) -> Self {
        let path = path.into();
        let name = path.file_name().unwrap_or(path.as_str()).to_string();
        Self {
            id: id.into(),
            name,
            path,
            selected: false,
            new_name: None,
        }
    }

    pub fn selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }
}

/// One expected participant from an uploaded roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub id: String,
    pub name: String,
    pub class_name: String,
    pub student_id: String,
    #[serde(default)]
    pub submitted: bool,
}

impl RosterEntry {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        class_name: impl Into<String>,
        student_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            class_name: class_name.into(),
            student_id: student_id.into(),
            submitted: false,
        }
    }
}

/// A read-only view of a file found in the submission folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedFile {
    pub id: String,
    pub name: String,
    pub path: Utf8PathBuf,
}

impl SubmittedFile {
    pub fn new(id: impl Into<String>, path: impl Into<Utf8PathBuf>) -> Self {
        let path = path.into();
        let name = path.file_name().unwrap_or(path.as_str()).to_string();
        Self {
            id: id.into(),
            name,
            path,
        }
    }
}

/// Per-class submission counts, always derived from the current roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStat {
    pub class_name: String,
    pub total: usize,
    pub submitted: usize,
}

impl ClassStat {
    /// Ratio of submitted to total entries, `0.0` for an empty class.
    pub fn coverage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.submitted as f64 / self.total as f64
        }
    }
}

pub use error::{CoreError, CoreResult, RosterIssue, ValidationError};
pub use planner::{plan, preview, PlannedRename, RenamePlan, RenamePlanner};
pub use roster::{
    aggregate, filter_by_class, match_roster, match_with_warnings, missing_submissions, search,
    MatchAmbiguityWarning, MatchReport, MatchStrategy,
};
pub use schema::RosterSchema;
pub use template::{expand, unrecognized_placeholders, FormatToken, IdResolver};
pub use tokens::{extract, extract_at, FileTokens};
pub use transfer::{TransferError, TransferState, UploadQueue, UploadTask};
