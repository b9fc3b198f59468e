//! The application layer: shared state, IPC command dispatch and background tasks.

pub mod commands;
pub mod events;
pub mod helpers;
pub mod proxy;
pub mod state;
pub mod tasks;
pub mod view_model;

use std::sync::{Arc, Mutex};

use events::IpcMessage;
use helpers::send_error;
use proxy::EventProxy;
use state::AppState;

/// Parses one raw IPC message and runs the matching command.
///
/// Malformed messages and unknown commands are answered with an `Error` event.
pub async fn handle_ipc_message<P: EventProxy>(
    message: String,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    match serde_json::from_str::<IpcMessage>(&message) {
        Ok(msg) => dispatch(msg, proxy, state).await,
        Err(e) => send_error(&proxy, format!("Failed to parse IPC message: {}", e)),
    }
}

/// Runs a single parsed command.
pub async fn dispatch<P: EventProxy>(msg: IpcMessage, proxy: P, state: Arc<Mutex<AppState>>) {
    tracing::debug!("IPC command {:?}", msg.command);
    let payload = msg.payload;

    match msg.command.as_str() {
        "initialize" => commands::initialize(proxy, state),
        "listDirectory" => commands::list_directory(payload, proxy),
        "createFolder" => commands::create_folder(payload, proxy),
        "loadFolder" => commands::load_folder(payload, proxy, state),
        "toggleSelection" => commands::toggle_selection(payload, proxy, state),
        "selectAll" => commands::select_all(payload, proxy, state),
        "previewRename" => commands::preview_rename(payload, proxy, state),
        "applyRename" => commands::apply_rename(proxy, state).await,
        "getFormatTokens" => commands::get_format_tokens(proxy),
        "uploadTable" => commands::upload_table(payload, proxy, state).await,
        "listTables" => commands::list_tables(proxy, state),
        "getTableData" => commands::get_table_data(payload, proxy, state),
        "deleteTable" => commands::delete_table(payload, proxy, state),
        "checkHomework" => commands::check_homework(payload, proxy, state).await,
        "filterRoster" => commands::filter_roster(payload, proxy, state),
        "exportMissing" => commands::export_missing(payload, proxy, state),
        "importConfig" => commands::import_config(payload, proxy, state),
        "exportConfig" => commands::export_config(payload, proxy, state),
        "getColorMode" => commands::get_color_mode(proxy, state),
        "saveColorMode" => commands::save_color_mode(payload, proxy, state),
        "uploadFiles" => commands::upload_files(payload, proxy, state),
        "retryUpload" => commands::retry_upload(payload, proxy, state),
        "removeUpload" => commands::remove_upload(payload, proxy, state),
        "getUploadHistory" => commands::get_upload_history(proxy, state),
        unknown => send_error(&proxy, format!("Unknown IPC command: {}", unknown)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::storage::MemoryStore;
    use events::UserEvent;
    use tokio::sync::mpsc;
    use tracing_test::traced_test;

    fn state() -> Arc<Mutex<AppState>> {
        Arc::new(Mutex::new(AppState::new(
            AppConfig::default(),
            None,
            Arc::new(MemoryStore::new()),
        )))
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unknown_command_is_reported() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        handle_ipc_message(r#"{"command":"launchRockets"}"#.into(), tx, state()).await;

        match rx.recv().await {
            Some(UserEvent::Error(msg)) => assert!(msg.contains("launchRockets")),
            other => panic!("expected an error event, got {:?}", other),
        }
        assert!(logs_contain("Unknown IPC command"));
    }

    #[tokio::test]
    async fn test_garbage_message_is_reported() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        handle_ipc_message("not json".into(), tx, state()).await;
        assert!(matches!(rx.recv().await, Some(UserEvent::Error(_))));
    }

    #[tokio::test]
    async fn test_events_serialize_with_tag() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        handle_ipc_message(r#"{"command":"getFormatTokens"}"#.into(), tx, state()).await;

        let event = rx.recv().await.unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "formatTokens");
        assert_eq!(json["payload"][0]["placeholder"], "{class}");
    }
}
