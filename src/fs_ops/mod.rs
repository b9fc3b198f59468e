//! Filesystem collaborators: directory listing, folder creation, batch rename
//! and file upload.

pub mod rename;
pub mod upload;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

use crate::core::{CoreError, CoreResult, FileRecord, SubmittedFile, ValidationError};

pub use rename::{apply_plan, FileRenamer, FsRenamer, RenameOutcome};
pub use upload::{run_uploads, CopyTransfer, Transfer, UploadEvent};

/// One immediate child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntryInfo {
    pub name: String,
    pub path: Utf8PathBuf,
    pub is_directory: bool,
    pub size: u64,
    pub modified_time: Option<DateTime<Utc>>,
}

/// Lists the immediate children of `path`, directories first, then by name.
///
/// Entries that cannot be inspected are skipped with a warning. Failing to
/// open `path` itself is an error.
pub fn list_directory(path: &Path) -> CoreResult<Vec<DirEntryInfo>> {
    if !path.is_dir() {
        return Err(CoreError::io(
            io::Error::new(io::ErrorKind::NotFound, "not a directory"),
            path,
        ));
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(CoreError::io(e.into(), path)),
            Err(e) => {
                tracing::warn!("Skipping unreadable entry in {:?}: {}", path, e);
                continue;
            }
        };

        let metadata = match entry.metadata() {
            Ok(md) => md,
            Err(e) => {
                tracing::warn!("Skipping {:?}: {}", entry.path(), e);
                continue;
            }
        };

        let Ok(utf8_path) = Utf8PathBuf::from_path_buf(entry.path().to_path_buf()) else {
            tracing::warn!("Skipping non UTF-8 path {:?}", entry.path());
            continue;
        };

        entries.push(DirEntryInfo {
            name: utf8_path.file_name().unwrap_or_default().to_string(),
            path: utf8_path,
            is_directory: metadata.is_dir(),
            size: metadata.len(),
            modified_time: metadata.modified().ok().map(DateTime::<Utc>::from),
        });
    }

    entries.sort_by(|a, b| {
        b.is_directory
            .cmp(&a.is_directory)
            .then_with(|| a.name.cmp(&b.name))
    });
    tracing::debug!("Listed {} entries in {:?}", entries.len(), path);
    Ok(entries)
}

/// The files of `path` as unselected rename candidates, ids starting at `1`.
pub fn list_files(path: &Path) -> CoreResult<Vec<FileRecord>> {
    Ok(list_directory(path)?
        .into_iter()
        .filter(|e| !e.is_directory)
        .enumerate()
        .map(|(i, e)| FileRecord::new((i + 1).to_string(), e.path))
        .collect())
}

/// The files of `path` as submissions to check a roster against.
pub fn submitted_files(path: &Path) -> CoreResult<Vec<SubmittedFile>> {
    Ok(list_directory(path)?
        .into_iter()
        .filter(|e| !e.is_directory)
        .enumerate()
        .map(|(i, e)| SubmittedFile::new((i + 1).to_string(), e.path))
        .collect())
}

/// Creates `parent/name` and returns its path.
pub fn create_folder(parent: &Utf8Path, name: &str) -> CoreResult<Utf8PathBuf> {
    let name = name.trim();
    let invalid = |reason: &str| -> CoreError {
        ValidationError::InvalidFolderName {
            name: name.to_string(),
            reason: reason.to_string(),
        }
        .into()
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(invalid("name must be a single path component"));
    }

    let target = parent.join(name);
    if target.exists() {
        return Err(invalid("already exists"));
    }

    fs::create_dir(&target).map_err(|e| CoreError::io(e, target.as_std_path()))?;
    tracing::info!("Created folder {:?}", target);
    Ok(target)
}
