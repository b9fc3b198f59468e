//! Long-running background work: file uploads.

use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use super::events::UserEvent;
use super::helpers::{lock_state, with_state_and_notify};
use super::proxy::EventProxy;
use super::state::AppState;
use crate::core::{TransferError, UploadTask};
use crate::fs_ops::{run_uploads, CopyTransfer, UploadEvent};
use crate::storage::UploadRecord;

/// Spawns the transfer of the queued tasks `ids`.
///
/// Every state change of a task is reported as `UploadProgress`. Once all
/// tasks have finished they are added to the upload history and a final
/// `StateUpdate` is sent.
pub fn start_uploads<P: EventProxy>(
    ids: Vec<String>,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) -> JoinHandle<()> {
    let (tasks, transfer, max_concurrent) = {
        let state_guard = lock_state(&state);
        let tasks: Vec<UploadTask> = ids
            .iter()
            .filter_map(|id| state_guard.uploads.get(id).cloned())
            .collect();
        let transfer = CopyTransfer {
            chunk_size: state_guard.config.upload_chunk_size,
            allow_overwrite: state_guard.config.allow_overwrite,
        };
        (tasks, transfer, state_guard.config.max_concurrent_uploads)
    };

    tokio::spawn(async move {
        tracing::info!("Starting {} uploads", tasks.len());

        let event_state = state.clone();
        let event_proxy = proxy.clone();
        let on_event: Arc<dyn Fn(UploadEvent) + Send + Sync> =
            Arc::new(move |event| apply_upload_event(&event_state, &event_proxy, event));

        let results = run_uploads(tasks, Arc::new(transfer), max_concurrent, on_event).await;
        let failed = results.iter().filter(|(_, r)| r.is_err()).count();

        let (records, history) = {
            let state_guard = lock_state(&state);
            let records: Vec<UploadRecord> = results
                .iter()
                .filter_map(|(id, _)| state_guard.uploads.get(id))
                .filter(|task| task.state.is_finished())
                .map(UploadRecord::from_task)
                .collect();
            (records, state_guard.upload_history.clone())
        };
        if let Err(e) = history.record(records) {
            tracing::warn!("Failed to save upload history: {}", e);
        }

        tracing::info!(
            "Uploads finished: {} succeeded, {} failed",
            results.len() - failed,
            failed
        );
        with_state_and_notify(&state, &proxy, |s| {
            s.status_message = format!(
                "Uploaded {} of {} files.",
                results.len() - failed,
                results.len()
            );
        });
    })
}

/// Moves the task named by `event` through its lifecycle and reports it.
fn apply_upload_event<P: EventProxy>(state: &Arc<Mutex<AppState>>, proxy: &P, event: UploadEvent) {
    let mut state_guard = lock_state(state);
    let queue = &mut state_guard.uploads;

    let (id, result): (&str, Result<UploadTask, TransferError>) = match &event {
        UploadEvent::Started(id) => (id.as_str(), queue.start(id).cloned()),
        UploadEvent::Progress(id, progress) => (id.as_str(), queue.report_progress(id, *progress).cloned()),
        UploadEvent::Finished(id, Ok(target)) => {
            tracing::debug!("Upload {} written to {:?}", id, target);
            (id.as_str(), queue.complete(id).cloned())
        }
        UploadEvent::Finished(id, Err(error)) => (id.as_str(), queue.fail(id, error.clone()).cloned()),
    };

    match result {
        Ok(task) => proxy.send_event(UserEvent::UploadProgress(task)),
        Err(e) => tracing::warn!("Ignoring upload event for {}: {}", id, e),
    }
}
