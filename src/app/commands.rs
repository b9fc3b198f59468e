//! Contains all the command handlers that are callable from the host via IPC.
//!
//! Each function in this module corresponds to a specific `IpcMessage::command`.
//! Handlers never return errors. Failures are logged and sent as `UserEvent::Error`.

use camino::Utf8PathBuf;
use chrono::Local;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::events::UserEvent;
use super::helpers::{lock_state, parse_payload, send_error, with_state_and_notify};
use super::proxy::EventProxy;
use super::state::AppState;
use super::tasks;
use super::view_model::{format_tokens, generate_ui_state, HomeworkReport, RenamePreview};
use crate::core::schema::Record;
use crate::config;
use crate::core::template::RosterIdResolver;
use crate::core::{
    filter_by_class, match_with_warnings, missing_submissions, preview, search, unrecognized_placeholders,
    CoreResult, RenamePlan, RenamePlanner, RosterSchema, TransferState,
};
use crate::fs_ops::{self, rename::summarize, FsRenamer};
use crate::spreadsheet::{self, MISSING_EXPORT_FILE_NAME};
use crate::storage::ColorMode;

#[derive(Deserialize)]
struct PathPayload {
    path: PathBuf,
}

#[derive(Deserialize)]
struct IdPayload {
    id: String,
}

#[derive(Deserialize)]
struct CreateFolderPayload {
    parent: Utf8PathBuf,
    name: String,
}

#[derive(Deserialize)]
struct SelectAllPayload {
    selected: bool,
}

#[derive(Deserialize, Default)]
struct PreviewPayload {
    #[serde(default)]
    template: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckHomeworkPayload {
    #[serde(default)]
    roster_path: Option<PathBuf>,
    #[serde(default)]
    table_id: Option<String>,
    folder: PathBuf,
}

#[derive(Deserialize, Default)]
struct ExportPayload {
    #[serde(default)]
    path: Option<PathBuf>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct FilterRosterPayload {
    #[serde(default)]
    class_name: Option<String>,
    #[serde(default)]
    term: Option<String>,
    #[serde(default)]
    only_missing: bool,
}

#[derive(Deserialize)]
struct ColorModePayload {
    mode: ColorMode,
}

#[derive(Deserialize)]
struct UploadFilesPayload {
    files: Vec<Utf8PathBuf>,
    folder: Utf8PathBuf,
}

/// Treats a missing payload as an empty object, so optional fields default.
fn or_empty(payload: Value) -> Value {
    if payload.is_null() {
        Value::Object(Default::default())
    } else {
        payload
    }
}

/// Handles the initial request for state from the host.
pub fn initialize<P: EventProxy>(proxy: P, state: Arc<Mutex<AppState>>) {
    let state_guard = lock_state(&state);
    proxy.send_event(UserEvent::StateUpdate(Box::new(generate_ui_state(
        &state_guard,
    ))));
}

/// Lists the immediate children of a directory.
pub fn list_directory<P: EventProxy>(payload: Value, proxy: P) {
    let Some(PathPayload { path }) = parse_payload("listDirectory", payload, &proxy) else {
        return;
    };
    match fs_ops::list_directory(&path) {
        Ok(entries) => proxy.send_event(UserEvent::DirectoryListing {
            path: path.to_string_lossy().to_string(),
            entries,
        }),
        Err(e) => send_error(&proxy, e.to_string()),
    }
}

pub fn create_folder<P: EventProxy>(payload: Value, proxy: P) {
    let Some(CreateFolderPayload { parent, name }) =
        parse_payload("createFolder", payload, &proxy)
    else {
        return;
    };
    match fs_ops::create_folder(&parent, &name) {
        Ok(path) => proxy.send_event(UserEvent::FolderCreated { path }),
        Err(e) => send_error(&proxy, e.to_string()),
    }
}

/// Opens a folder for batch renaming and remembers it as the last directory.
pub fn load_folder<P: EventProxy>(payload: Value, proxy: P, state: Arc<Mutex<AppState>>) {
    let Some(PathPayload { path }) = parse_payload("loadFolder", payload, &proxy) else {
        return;
    };
    let Ok(folder) = Utf8PathBuf::from_path_buf(path.clone()) else {
        send_error(&proxy, format!("Folder path is not valid UTF-8: {:?}", path));
        return;
    };
    let files = match fs_ops::list_files(&path) {
        Ok(files) => files,
        Err(e) => {
            send_error(&proxy, e.to_string());
            return;
        }
    };

    with_state_and_notify(&state, &proxy, |s| {
        tracing::info!("Loaded {} files from {:?}", files.len(), folder);
        s.status_message = format!("{} files in {}", files.len(), folder);
        s.set_files(folder, files);
        s.config.last_directory = Some(path);
        if let Err(e) = s.save_config() {
            tracing::warn!("Failed to save config after loading folder: {}", e);
        }
    });
}

pub fn toggle_selection<P: EventProxy>(payload: Value, proxy: P, state: Arc<Mutex<AppState>>) {
    let Some(IdPayload { id }) = parse_payload("toggleSelection", payload, &proxy) else {
        return;
    };
    let found = with_state_and_notify(&state, &proxy, |s| {
        let Some(file) = s.files.iter_mut().find(|f| f.id == id) else {
            return false;
        };
        file.selected = !file.selected;
        s.invalidate_plan();
        true
    });
    if !found {
        send_error(&proxy, format!("Unknown file id {}", id));
    }
}

pub fn select_all<P: EventProxy>(payload: Value, proxy: P, state: Arc<Mutex<AppState>>) {
    let Some(SelectAllPayload { selected }) = parse_payload("selectAll", payload, &proxy) else {
        return;
    };
    with_state_and_notify(&state, &proxy, |s| {
        for file in &mut s.files {
            file.selected = selected;
        }
        s.invalidate_plan();
    });
}

/// Plans the selected files of the current folder with `template`.
fn build_plan(state: &AppState, template: &str) -> CoreResult<RenamePlan> {
    let folder_name = state
        .current_folder
        .as_ref()
        .and_then(|f| f.file_name())
        .unwrap_or_default();

    let mut planner = RenamePlanner::new(template);
    if !state.roster.is_empty() {
        planner = planner.with_id_resolver(RosterIdResolver::from_roster(&state.roster));
    }
    if state.config.pin_batch_timestamp {
        planner = planner.with_timestamp(Local::now().naive_local());
    }
    planner.plan(&state.files, folder_name)
}

/// Computes a dry-run rename plan and shows the proposed names.
pub fn preview_rename<P: EventProxy>(payload: Value, proxy: P, state: Arc<Mutex<AppState>>) {
    let Some(PreviewPayload { template }) =
        parse_payload("previewRename", or_empty(payload), &proxy)
    else {
        return;
    };

    let mut state_guard = lock_state(&state);
    if let Some(template) = template {
        state_guard.template = template;
    }
    let template = state_guard.template.clone();

    match build_plan(&state_guard, &template) {
        Ok(plan) => {
            preview(&mut state_guard.files, &plan);
            let event = RenamePreview {
                template: template.clone(),
                entries: plan.entries.clone(),
                unrecognized_placeholders: unrecognized_placeholders(&template),
            };
            state_guard.plan = Some(plan);
            proxy.send_event(UserEvent::RenamePreview(event));
        }
        Err(e) => {
            state_guard.invalidate_plan();
            send_error(&proxy, e.to_string());
        }
    }
    proxy.send_event(UserEvent::StateUpdate(Box::new(generate_ui_state(
        &state_guard,
    ))));
}

/// Applies the previewed plan, or a fresh one for the current template.
///
/// Per-file failures are reported in the outcomes and never stop the batch.
/// The folder is re-listed afterwards.
pub async fn apply_rename<P: EventProxy>(proxy: P, state: Arc<Mutex<AppState>>) {
    let prepared = {
        let mut state_guard = lock_state(&state);
        if state_guard.is_renaming {
            drop(state_guard);
            send_error(&proxy, "A rename is already in progress");
            return;
        }
        let plan = match state_guard.plan.clone() {
            Some(plan) => Ok(plan),
            None => {
                let template = state_guard.template.clone();
                build_plan(&state_guard, &template)
            }
        };
        if plan.is_ok() {
            state_guard.is_renaming = true;
        }
        plan.map(|plan| {
            (
                plan,
                FsRenamer {
                    allow_overwrite: state_guard.config.allow_overwrite,
                },
                state_guard.config.rename_workers,
            )
        })
    };

    let (plan, renamer, workers) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => {
            send_error(&proxy, e.to_string());
            return;
        }
    };

    tracing::info!("Applying {} renames", plan.len());
    let applied =
        tokio::task::spawn_blocking(move || fs_ops::apply_plan(&plan, &renamer, workers)).await;

    let outcomes = match applied {
        Ok(outcomes) => outcomes,
        Err(e) => {
            with_state_and_notify(&state, &proxy, |s| s.is_renaming = false);
            send_error(&proxy, format!("Rename task failed: {}", e));
            return;
        }
    };
    let (succeeded, failed) = summarize(&outcomes);
    tracing::info!("Renamed {} files, {} failed", succeeded, failed);

    proxy.send_event(UserEvent::RenameApplied {
        succeeded,
        failed,
        outcomes,
    });

    with_state_and_notify(&state, &proxy, |s| {
        s.is_renaming = false;
        s.status_message = format!("Renamed {} files, {} failed.", succeeded, failed);
        if let Some(folder) = s.current_folder.clone() {
            match fs_ops::list_files(folder.as_std_path()) {
                Ok(files) => s.set_files(folder, files),
                Err(e) => {
                    tracing::warn!("Failed to reload {:?} after renaming: {}", folder, e);
                    s.invalidate_plan();
                }
            }
        }
    });
}

pub fn get_format_tokens<P: EventProxy>(proxy: P) {
    proxy.send_event(UserEvent::FormatTokens(format_tokens()));
}

async fn read_table_blocking(path: PathBuf) -> Result<Vec<Record>, String> {
    match tokio::task::spawn_blocking(move || spreadsheet::read_table(&path)).await {
        Ok(Ok(rows)) => Ok(rows),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) => Err(format!("Spreadsheet task failed: {}", e)),
    }
}

/// Reads a spreadsheet and stores it as a new table.
pub async fn upload_table<P: EventProxy>(payload: Value, proxy: P, state: Arc<Mutex<AppState>>) {
    let Some(PathPayload { path }) = parse_payload("uploadTable", payload, &proxy) else {
        return;
    };
    let rows = match read_table_blocking(path.clone()).await {
        Ok(rows) => rows,
        Err(e) => {
            send_error(&proxy, e);
            return;
        }
    };

    let tables = lock_state(&state).tables.clone();
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    match tables.create(&filename, &path.to_string_lossy(), rows) {
        Ok(stored) => {
            let missing = RosterSchema::default().missing_columns(&stored.meta.headers);
            if !missing.is_empty() {
                tracing::warn!(
                    "Table {:?} lacks roster columns {:?}; it cannot be used for homework checks",
                    filename,
                    missing
                );
            }
            proxy.send_event(UserEvent::TableStored(stored.meta));
        }
        Err(e) => send_error(&proxy, format!("Failed to store table: {}", e)),
    }
}

pub fn list_tables<P: EventProxy>(proxy: P, state: Arc<Mutex<AppState>>) {
    let tables = lock_state(&state).tables.clone();
    proxy.send_event(UserEvent::Tables(tables.list()));
}

pub fn get_table_data<P: EventProxy>(payload: Value, proxy: P, state: Arc<Mutex<AppState>>) {
    let Some(IdPayload { id }) = parse_payload("getTableData", payload, &proxy) else {
        return;
    };
    let tables = lock_state(&state).tables.clone();
    match tables.meta(&id) {
        Some(meta) => proxy.send_event(UserEvent::TableData {
            data: tables.data(&id),
            meta,
        }),
        None => send_error(&proxy, format!("Unknown table {}", id)),
    }
}

pub fn delete_table<P: EventProxy>(payload: Value, proxy: P, state: Arc<Mutex<AppState>>) {
    let Some(IdPayload { id }) = parse_payload("deleteTable", payload, &proxy) else {
        return;
    };
    let tables = lock_state(&state).tables.clone();
    match tables.delete(&id) {
        Ok(deleted) => proxy.send_event(UserEvent::TableDeleted { id, deleted }),
        Err(e) => send_error(&proxy, format!("Failed to delete table {}: {}", id, e)),
    }
}

/// Checks a submission folder against a roster read from a file or a stored table.
pub async fn check_homework<P: EventProxy>(payload: Value, proxy: P, state: Arc<Mutex<AppState>>) {
    let Some(CheckHomeworkPayload {
        roster_path,
        table_id,
        folder,
    }) = parse_payload("checkHomework", payload, &proxy)
    else {
        return;
    };

    let rows = match (table_id, roster_path) {
        (Some(id), _) => {
            let tables = lock_state(&state).tables.clone();
            if tables.meta(&id).is_none() {
                send_error(&proxy, format!("Unknown table {}", id));
                return;
            }
            tables.data(&id)
        }
        (None, Some(path)) => match read_table_blocking(path).await {
            Ok(rows) => rows,
            Err(e) => {
                send_error(&proxy, e);
                return;
            }
        },
        (None, None) => {
            send_error(&proxy, "checkHomework needs a rosterPath or a tableId");
            return;
        }
    };

    let roster = match RosterSchema::default().parse(&rows) {
        Ok(roster) => roster,
        Err(e) => {
            send_error(&proxy, e.to_string());
            return;
        }
    };
    let files = match fs_ops::submitted_files(&folder) {
        Ok(files) => files,
        Err(e) => {
            send_error(&proxy, e.to_string());
            return;
        }
    };

    let strategy = lock_state(&state).config.match_strategy;
    let matched = match_with_warnings(&roster, &files, strategy);
    for warning in &matched.warnings {
        tracing::info!(
            "{:?} matches several roster entries: {:?}",
            warning.file_name,
            warning.entry_names
        );
    }
    let report = HomeworkReport::from_match(folder.to_string_lossy(), matched);
    tracing::info!(
        "Homework check: {} of {} submitted",
        report.submitted_count,
        report.entries.len()
    );

    {
        let mut state_guard = lock_state(&state);
        state_guard.roster = report.entries.clone();
        state_guard.report = Some(report.clone());
    }
    proxy.send_event(UserEvent::HomeworkReport(Box::new(report)));
}

/// Narrows the checked roster by class, missing status and a search term.
///
/// The term matches name, student ID or class. All filters compose.
pub fn filter_roster<P: EventProxy>(payload: Value, proxy: P, state: Arc<Mutex<AppState>>) {
    let Some(FilterRosterPayload {
        class_name,
        term,
        only_missing,
    }) = parse_payload("filterRoster", or_empty(payload), &proxy)
    else {
        return;
    };
    let roster = lock_state(&state).roster.clone();
    let by_class = match class_name {
        Some(class_name) => filter_by_class(&roster, &class_name),
        None => roster,
    };
    let by_status = if only_missing {
        missing_submissions(&by_class)
    } else {
        by_class
    };
    let entries = search(&by_status, term.as_deref().unwrap_or_default());
    proxy.send_event(UserEvent::RosterEntries(entries));
}

/// Writes the missing submissions of the last homework check to a CSV file.
pub fn export_missing<P: EventProxy>(payload: Value, proxy: P, state: Arc<Mutex<AppState>>) {
    let Some(ExportPayload { path }) = parse_payload("exportMissing", or_empty(payload), &proxy)
    else {
        return;
    };

    let pending = {
        let state_guard = lock_state(&state);
        state_guard.report.as_ref().map(|report| {
            (
                report.missing.clone(),
                state_guard.config.export_directory.clone(),
            )
        })
    };
    let Some((missing, export_directory)) = pending else {
        send_error(&proxy, "No homework check to export");
        return;
    };

    let Some(path) = path.or_else(|| export_directory.map(|d| d.join(MISSING_EXPORT_FILE_NAME)))
    else {
        send_error(&proxy, "No export path given and no export directory configured");
        return;
    };

    match spreadsheet::export_roster(&missing, &path) {
        Ok(count) => proxy.send_event(UserEvent::MissingExported {
            path: path.to_string_lossy().to_string(),
            count,
        }),
        Err(e) => send_error(&proxy, e.to_string()),
    }
}

/// Replaces the configuration with one read from a JSON file.
///
/// The folder, plan and roster of the old session are cleared so nothing
/// planned under the old settings can be applied under the new ones.
pub fn import_config<P: EventProxy>(payload: Value, proxy: P, state: Arc<Mutex<AppState>>) {
    let Some(PathPayload { path }) = parse_payload("importConfig", payload, &proxy) else {
        return;
    };
    let new_config = match config::settings::import_config(&path) {
        Ok(imported) => imported,
        Err(e) => {
            send_error(&proxy, format!("Failed to import config: {}", e));
            return;
        }
    };

    with_state_and_notify(&state, &proxy, |s| {
        s.reset_session();
        s.template = new_config.default_template.clone();
        s.config = new_config;
        if let Err(e) = s.save_config() {
            tracing::warn!("Failed to save imported config: {}", e);
        }
        s.status_message = format!("Imported config from {}", path.display());
    });
}

/// Writes the current configuration to a JSON file.
pub fn export_config<P: EventProxy>(payload: Value, proxy: P, state: Arc<Mutex<AppState>>) {
    let Some(PathPayload { path }) = parse_payload("exportConfig", payload, &proxy) else {
        return;
    };
    let current = lock_state(&state).config.clone();
    match config::settings::export_config(&current, &path) {
        Ok(()) => proxy.send_event(UserEvent::ConfigExported {
            path: path.to_string_lossy().to_string(),
        }),
        Err(e) => send_error(&proxy, format!("Failed to export config: {}", e)),
    }
}

pub fn get_color_mode<P: EventProxy>(proxy: P, state: Arc<Mutex<AppState>>) {
    let themes = lock_state(&state).themes.clone();
    proxy.send_event(UserEvent::ColorMode(themes.color_mode()));
}

pub fn save_color_mode<P: EventProxy>(payload: Value, proxy: P, state: Arc<Mutex<AppState>>) {
    let Some(ColorModePayload { mode }) = parse_payload("saveColorMode", payload, &proxy) else {
        return;
    };
    let themes = lock_state(&state).themes.clone();
    match themes.save_color_mode(mode) {
        Ok(()) => proxy.send_event(UserEvent::ColorMode(mode)),
        Err(e) => send_error(&proxy, format!("Failed to save color mode: {}", e)),
    }
}

/// Queues `files` for upload into `folder` and starts transferring them.
pub fn upload_files<P: EventProxy>(payload: Value, proxy: P, state: Arc<Mutex<AppState>>) {
    let Some(UploadFilesPayload { files, folder }) =
        parse_payload("uploadFiles", payload, &proxy)
    else {
        return;
    };
    if !folder.is_dir() {
        send_error(&proxy, format!("Upload folder {} does not exist", folder));
        return;
    }
    if files.is_empty() {
        send_error(&proxy, "No files to upload");
        return;
    }

    let ids: Vec<String> = {
        let mut state_guard = lock_state(&state);
        files
            .into_iter()
            .map(|source| {
                let size = std::fs::metadata(&source).map(|m| m.len()).unwrap_or(0);
                let id = state_guard.uploads.enqueue(source, size, folder.clone());
                if let Some(task) = state_guard.uploads.get(&id) {
                    proxy.send_event(UserEvent::UploadProgress(task.clone()));
                }
                id
            })
            .collect()
    };

    tasks::start_uploads(ids, proxy, state);
}

/// Puts a failed upload back into the queue and transfers it again.
pub fn retry_upload<P: EventProxy>(payload: Value, proxy: P, state: Arc<Mutex<AppState>>) {
    let Some(IdPayload { id }) = parse_payload("retryUpload", payload, &proxy) else {
        return;
    };
    let retried = lock_state(&state).uploads.retry(&id).cloned();
    match retried {
        Ok(task) => {
            proxy.send_event(UserEvent::UploadProgress(task));
            tasks::start_uploads(vec![id], proxy, state);
        }
        Err(e) => send_error(&proxy, e.to_string()),
    }
}

/// Removes an upload that is not currently transferring.
pub fn remove_upload<P: EventProxy>(payload: Value, proxy: P, state: Arc<Mutex<AppState>>) {
    let Some(IdPayload { id }) = parse_payload("removeUpload", payload, &proxy) else {
        return;
    };
    let outcome = with_state_and_notify(&state, &proxy, |s| {
        let found = s.uploads.get(&id).map(|task| {
            (
                matches!(task.state, TransferState::Transferring { .. }),
                task.name.clone(),
            )
        });
        match found {
            None => Err(format!("Unknown upload {}", id)),
            Some((true, name)) => Err(format!("Upload {} is still transferring", name)),
            Some((false, _)) => {
                s.uploads.remove(&id);
                Ok(())
            }
        }
    });
    if let Err(message) = outcome {
        send_error(&proxy, message);
    }
}

pub fn get_upload_history<P: EventProxy>(proxy: P, state: Arc<Mutex<AppState>>) {
    let history = lock_state(&state).upload_history.clone();
    proxy.send_event(UserEvent::UploadHistory(history.list()));
}
