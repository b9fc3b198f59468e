//! Defines the custom error types for the `core` module.

use std::path::PathBuf;
use thiserror::Error;

/// A precondition that was violated before any external mutation was attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The naming template is empty or only whitespace.
    #[error("empty template")]
    EmptyTemplate,

    /// No file in the planning batch is selected.
    #[error("no files selected")]
    NoFilesSelected,

    /// A computed target name cannot be used as a file name in the source folder.
    #[error("invalid target name {name:?} for {source_name:?}")]
    InvalidTargetName { source_name: String, name: String },

    /// One or more roster rows do not fit the roster schema.
    #[error("invalid roster: {}", format_roster_issues(.0))]
    InvalidRoster(Vec<RosterIssue>),

    /// A folder name that cannot be created.
    #[error("invalid folder name {name:?}: {reason}")]
    InvalidFolderName { name: String, reason: String },
}

/// A single problem found while mapping a spreadsheet row onto a roster entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterIssue {
    /// 1-based data row number. The header row and blank rows are not counted.
    pub row: usize,
    pub column: String,
    pub problem: String,
}

fn format_roster_issues(issues: &[RosterIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("row {} column {:?} {}", issue.row, issue.column, issue.problem))
        .collect::<Vec<_>>()
        .join("; ")
}

/// The primary error type for the `core` module.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A precondition failed. Nothing was attempted.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Two or more planned renames would produce the same file name.
    #[error("Collision error: duplicate target names {names:?}")]
    Collision { names: Vec<String> },

    /// Represents an I/O error, typically from file system operations.
    #[error("I/O error for path {1}: {0}")]
    Io(#[source] std::io::Error, PathBuf),

    /// The spreadsheet collaborator failed to read or write a table.
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    /// The file extension is not a supported spreadsheet format.
    #[error("Unsupported spreadsheet format: {0}")]
    UnsupportedFormat(PathBuf),

    /// A value could not be converted to or from JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Represents an error that occurred when a Tokio task was joined.
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl CoreError {
    /// Wraps an I/O error together with the path it concerns.
    pub fn io(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        CoreError::Io(err, path.into())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
