//! Upload lifecycle: `queued -> transferring -> succeeded | failed`.
//!
//! This module only tracks state. The bytes are moved by a transfer
//! collaborator (see `fs_ops::upload`), which reports real progress here.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum TransferState {
    Queued,
    Transferring { progress: u8 },
    Succeeded,
    Failed { error: String },
}

impl TransferState {
    fn label(&self) -> &'static str {
        match self {
            TransferState::Queued => "queued",
            TransferState::Transferring { .. } => "transferring",
            TransferState::Succeeded => "succeeded",
            TransferState::Failed { .. } => "failed",
        }
    }

    /// Percentage shown for this state.
    pub fn progress(&self) -> u8 {
        match self {
            TransferState::Queued => 0,
            TransferState::Transferring { progress } => *progress,
            TransferState::Succeeded | TransferState::Failed { .. } => 100,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, TransferState::Succeeded | TransferState::Failed { .. })
    }

    /// Validates a move to `next`, returning it on success.
    pub fn transition(&self, next: TransferState) -> Result<TransferState, TransferError> {
        let allowed = match (self, &next) {
            (TransferState::Queued, TransferState::Transferring { progress }) => *progress <= 100,
            (
                TransferState::Transferring { progress: current },
                TransferState::Transferring { progress },
            ) => progress >= current && *progress <= 100,
            (TransferState::Transferring { .. }, TransferState::Succeeded) => true,
            (TransferState::Transferring { .. }, TransferState::Failed { .. }) => true,
            (TransferState::Failed { .. }, TransferState::Queued) => true,
            _ => false,
        };

        if allowed {
            Ok(next)
        } else {
            Err(TransferError::InvalidTransition {
                from: self.label(),
                to: next.label(),
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("invalid transfer transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("unknown upload task {0}")]
    UnknownTask(String),
}

/// A single file being uploaded into a folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTask {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub source: Utf8PathBuf,
    pub folder: Utf8PathBuf,
    pub state: TransferState,
}

/// Upload tasks in enqueue order.
#[derive(Debug, Default, Clone)]
pub struct UploadQueue {
    tasks: Vec<UploadTask>,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a queued task and returns its id.
    pub fn enqueue(&mut self, source: Utf8PathBuf, size: u64, folder: Utf8PathBuf) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let name = source.file_name().unwrap_or(source.as_str()).to_string();
        self.tasks.push(UploadTask {
            id: id.clone(),
            name,
            size,
            source,
            folder,
            state: TransferState::Queued,
        });
        id
    }

    pub fn get(&self, id: &str) -> Option<&UploadTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn start(&mut self, id: &str) -> Result<&UploadTask, TransferError> {
        self.apply(id, TransferState::Transferring { progress: 0 })
    }

    pub fn report_progress(&mut self, id: &str, progress: u8) -> Result<&UploadTask, TransferError> {
        self.apply(id, TransferState::Transferring { progress })
    }

    pub fn complete(&mut self, id: &str) -> Result<&UploadTask, TransferError> {
        self.apply(id, TransferState::Succeeded)
    }

    pub fn fail(&mut self, id: &str, error: impl Into<String>) -> Result<&UploadTask, TransferError> {
        self.apply(
            id,
            TransferState::Failed {
                error: error.into(),
            },
        )
    }

    /// Puts a failed task back into the queue.
    pub fn retry(&mut self, id: &str) -> Result<&UploadTask, TransferError> {
        self.apply(id, TransferState::Queued)
    }

    pub fn remove(&mut self, id: &str) -> Option<UploadTask> {
        let pos = self.tasks.iter().position(|t| t.id == id)?;
        Some(self.tasks.remove(pos))
    }

    pub fn snapshot(&self) -> Vec<UploadTask> {
        self.tasks.clone()
    }

    /// True while any task has not finished.
    pub fn is_busy(&self) -> bool {
        self.tasks.iter().any(|t| !t.state.is_finished())
    }

    fn apply(&mut self, id: &str, next: TransferState) -> Result<&UploadTask, TransferError> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| TransferError::UnknownTask(id.to_string()))?;
        task.state = task.state.transition(next)?;
        Ok(&*task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_with_one() -> (UploadQueue, String) {
        let mut queue = UploadQueue::new();
        let id = queue.enqueue("/tmp/小明-作业.docx".into(), 2048, "/course/计科2206".into());
        (queue, id)
    }

    #[test]
    fn test_happy_path() {
        let (mut queue, id) = queue_with_one();
        assert!(queue.is_busy());
        assert_eq!(queue.get(&id).unwrap().name, "小明-作业.docx");

        queue.start(&id).unwrap();
        queue.report_progress(&id, 40).unwrap();
        queue.report_progress(&id, 40).unwrap();
        queue.report_progress(&id, 100).unwrap();
        let task = queue.complete(&id).unwrap();

        assert_eq!(task.state, TransferState::Succeeded);
        assert_eq!(task.state.progress(), 100);
        assert!(!queue.is_busy());
    }

    #[test]
    fn test_progress_never_decreases() {
        let (mut queue, id) = queue_with_one();
        queue.start(&id).unwrap();
        queue.report_progress(&id, 60).unwrap();

        let err = queue.report_progress(&id, 30).unwrap_err();
        assert_eq!(
            err,
            TransferError::InvalidTransition {
                from: "transferring",
                to: "transferring"
            }
        );
        assert_eq!(queue.get(&id).unwrap().state.progress(), 60);
        assert!(queue.report_progress(&id, 101).is_err());
    }

    #[test]
    fn test_illegal_transitions_leave_state_unchanged() {
        let (mut queue, id) = queue_with_one();
        assert!(queue.complete(&id).is_err());
        assert!(queue.retry(&id).is_err());
        assert_eq!(queue.get(&id).unwrap().state, TransferState::Queued);

        queue.start(&id).unwrap();
        queue.complete(&id).unwrap();
        assert!(queue.start(&id).is_err());
        assert!(queue.fail(&id, "late").is_err());
    }

    #[test]
    fn test_failed_task_can_be_retried() {
        let (mut queue, id) = queue_with_one();
        queue.start(&id).unwrap();
        queue.fail(&id, "disk full").unwrap();
        assert_eq!(
            queue.get(&id).unwrap().state,
            TransferState::Failed {
                error: "disk full".into()
            }
        );

        queue.retry(&id).unwrap();
        queue.start(&id).unwrap();
        assert_eq!(queue.get(&id).unwrap().state.progress(), 0);
    }

    #[test]
    fn test_unknown_and_removed_tasks() {
        let (mut queue, id) = queue_with_one();
        assert_eq!(
            queue.start("nope").unwrap_err(),
            TransferError::UnknownTask("nope".into())
        );
        assert!(queue.remove(&id).is_some());
        assert!(queue.snapshot().is_empty());
        assert!(queue.remove(&id).is_none());
    }

    #[test]
    fn test_state_serializes_with_status_tag() {
        let json = serde_json::to_value(TransferState::Transferring { progress: 42 }).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "transferring", "progress": 42})
        );
    }
}
