//! Moves upload bytes into the target folder and reports real progress.

use async_trait::async_trait;
use camino::Utf8PathBuf;
use std::io;
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::core::{CoreError, CoreResult, UploadTask};

/// Copies one task's file into its folder, calling `progress` with the
/// percentage done. Returns the written path.
#[async_trait]
pub trait Transfer: Send + Sync {
    async fn transfer(
        &self,
        task: &UploadTask,
        progress: &(dyn Fn(u8) + Send + Sync),
    ) -> CoreResult<Utf8PathBuf>;
}

/// Local chunked file copy.
#[derive(Debug, Clone, Copy)]
pub struct CopyTransfer {
    pub chunk_size: usize,
    pub allow_overwrite: bool,
}

impl Default for CopyTransfer {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            allow_overwrite: false,
        }
    }
}

fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}

impl CopyTransfer {
    async fn copy(
        &self,
        task: &UploadTask,
        target: &Utf8PathBuf,
        progress: &(dyn Fn(u8) + Send + Sync),
    ) -> io::Result<()> {
        let mut source = File::open(&task.source).await?;
        let total = source.metadata().await?.len();

        // Bytes land in a hidden file in the folder; the target only changes on persist.
        let staged = tempfile::Builder::new()
            .prefix(".upload-")
            .tempfile_in(&task.folder)?;
        let mut dest = File::from_std(staged.as_file().try_clone()?);

        let mut buf = vec![0u8; self.chunk_size.max(1)];
        let mut done = 0u64;
        let mut last = 0u8;
        progress(0);
        loop {
            let n = source.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            dest.write_all(&buf[..n]).await?;
            done += n as u64;
            let now = percent(done, total);
            if now != last {
                last = now;
                progress(now);
            }
        }
        dest.flush().await?;
        drop(dest);

        let persisted = if self.allow_overwrite {
            staged.persist(target)
        } else {
            staged.persist_noclobber(target)
        };
        persisted.map_err(|e| e.error)?;
        if last != 100 {
            progress(100);
        }
        Ok(())
    }
}

#[async_trait]
impl Transfer for CopyTransfer {
    async fn transfer(
        &self,
        task: &UploadTask,
        progress: &(dyn Fn(u8) + Send + Sync),
    ) -> CoreResult<Utf8PathBuf> {
        let target = task.folder.join(&task.name);
        if !self.allow_overwrite && fs::try_exists(&target).await.unwrap_or(false) {
            return Err(CoreError::io(
                io::Error::new(io::ErrorKind::AlreadyExists, "target already exists"),
                target.as_std_path(),
            ));
        }

        if let Err(e) = self.copy(task, &target, progress).await {
            return Err(CoreError::io(e, task.source.as_std_path()));
        }

        tracing::info!("Uploaded {:?} to {:?}", task.source, target);
        Ok(target)
    }
}

/// Lifecycle notifications emitted by [`run_uploads`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    Started(String),
    Progress(String, u8),
    Finished(String, Result<Utf8PathBuf, String>),
}

/// Runs `tasks` with at most `max_concurrent` transfers in flight.
///
/// Every task produces `Started`, zero or more `Progress` and exactly one
/// `Finished` event. Results are returned in task order.
pub async fn run_uploads(
    tasks: Vec<UploadTask>,
    transfer: Arc<dyn Transfer>,
    max_concurrent: usize,
    on_event: Arc<dyn Fn(UploadEvent) + Send + Sync>,
) -> Vec<(String, Result<Utf8PathBuf, String>)> {
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut set = JoinSet::new();

    for (position, task) in tasks.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let transfer = transfer.clone();
        let on_event = on_event.clone();
        set.spawn(async move {
            // The semaphore is never closed, so acquiring only waits.
            let _permit = semaphore.acquire_owned().await.ok();
            on_event(UploadEvent::Started(task.id.clone()));

            let id = task.id.clone();
            let report = {
                let on_event = on_event.clone();
                move |p: u8| on_event(UploadEvent::Progress(id.clone(), p))
            };
            let result = transfer
                .transfer(&task, &report)
                .await
                .map_err(|e| e.to_string());

            on_event(UploadEvent::Finished(task.id.clone(), result.clone()));
            (position, task.id, result)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(done) => results.push(done),
            Err(e) => tracing::error!("Upload task panicked: {}", e),
        }
    }
    results.sort_by_key(|(position, _, _)| *position);
    results
        .into_iter()
        .map(|(_, id, result)| (id, result))
        .collect()
}
