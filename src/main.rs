use paper_trail::app::{self, events::UserEvent, state::AppState};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Reads one JSON command per line from stdin and writes one JSON event per
/// line to stdout. Logs go to stderr.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<UserEvent>();
    let state = Arc::new(Mutex::new(AppState::default()));

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(event) = event_rx.recv().await {
            let mut line = match serde_json::to_string(&event) {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!("Failed to serialize event {:?}: {}", event, e);
                    continue;
                }
            };
            line.push('\n');
            if let Err(e) = stdout.write_all(line.as_bytes()).await {
                tracing::error!("Failed to write event: {}", e);
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    tracing::info!("PaperTrail ready, waiting for commands on stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        app::handle_ipc_message(line, event_tx.clone(), state.clone()).await;
    }

    tracing::info!("stdin closed, waiting for pending uploads");
    while app::helpers::lock_state(&state).uploads.is_busy() {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    drop(event_tx);
    drop(state);
    writer.await?;
    Ok(())
}
