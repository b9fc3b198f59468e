//! Typed repositories over a [`KeyValueStore`].

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::KeyValueStore;
use crate::core::schema::Record;
use crate::core::transfer::{TransferState, UploadTask};

const THEME_KEY: &str = "theme-config";
const THEME_VERSION: u32 = 1;

const TABLE_META_KEY: &str = "excel-meta";
const TABLE_VERSION: u32 = 1;

const UPLOAD_HISTORY_KEY: &str = "upload-history";
const UPLOAD_HISTORY_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThemeConfig {
    #[serde(default)]
    color_mode: ColorMode,
}

/// Persists the light/dark preference.
#[derive(Clone)]
pub struct ThemeRepository {
    store: Arc<dyn KeyValueStore>,
}

impl ThemeRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn color_mode(&self) -> ColorMode {
        self.store
            .get_or(THEME_KEY, ThemeConfig::default())
            .color_mode
    }

    pub fn save_color_mode(&self, color_mode: ColorMode) -> Result<()> {
        self.store
            .put(THEME_KEY, THEME_VERSION, &ThemeConfig { color_mode })
    }
}

/// Metadata of an uploaded spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMeta {
    pub id: String,
    pub filename: String,
    pub original_path: String,
    pub upload_time: DateTime<Utc>,
    pub headers: Vec<String>,
    pub record_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTable {
    pub meta: TableMeta,
    pub data: Vec<Record>,
}

/// Spreadsheets stored as a metadata list plus one data file per table.
#[derive(Clone)]
pub struct TableRepository {
    store: Arc<dyn KeyValueStore>,
}

impl TableRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn data_key(id: &str) -> String {
        format!("excel_data_{}", id)
    }

    pub fn list(&self) -> Vec<TableMeta> {
        self.store.get_or(TABLE_META_KEY, Vec::new())
    }

    pub fn meta(&self, id: &str) -> Option<TableMeta> {
        self.list().into_iter().find(|m| m.id == id)
    }

    /// Rows of table `id`; empty when the table is unknown.
    pub fn data(&self, id: &str) -> Vec<Record> {
        if self.meta(id).is_none() {
            return Vec::new();
        }
        self.store.get_or(&Self::data_key(id), Vec::new())
    }

    /// Stores `rows` under a fresh id.
    ///
    /// Rows leave out empty cells, so headers are gathered from every row in
    /// first-seen order.
    pub fn create(&self, filename: &str, original_path: &str, rows: Vec<Record>) -> Result<StoredTable> {
        let mut headers: Vec<String> = Vec::new();
        for key in rows.iter().flat_map(|row| row.keys()) {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
        let meta = TableMeta {
            id: uuid::Uuid::new_v4().to_string(),
            filename: filename.to_string(),
            original_path: original_path.to_string(),
            upload_time: Utc::now(),
            headers,
            record_count: rows.len(),
        };

        // Data first, so a listed table always has its rows.
        self.store
            .put(&Self::data_key(&meta.id), TABLE_VERSION, &rows)?;
        self.save_meta(meta.clone())?;
        tracing::info!(
            "Stored table {:?} ({} rows) as {}",
            filename,
            meta.record_count,
            meta.id
        );

        Ok(StoredTable { meta, data: rows })
    }

    /// Inserts or replaces the metadata entry with the same id.
    pub fn save_meta(&self, meta: TableMeta) -> Result<()> {
        let mut list = self.list();
        match list.iter_mut().find(|m| m.id == meta.id) {
            Some(existing) => *existing = meta,
            None => list.push(meta),
        }
        self.store.put(TABLE_META_KEY, TABLE_VERSION, &list)
    }

    /// Removes metadata and data. Returns `false` for an unknown id.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let list = self.list();
        let remaining: Vec<TableMeta> = list.iter().filter(|m| m.id != id).cloned().collect();
        if remaining.len() == list.len() {
            return Ok(false);
        }
        self.store.put(TABLE_META_KEY, TABLE_VERSION, &remaining)?;
        if let Err(e) = self.store.remove(&Self::data_key(id)) {
            tracing::warn!("Failed to delete data of table {}: {}", id, e);
        }
        Ok(true)
    }
}

/// A finished upload as remembered across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub name: String,
    pub size: u64,
    pub folder: String,
    pub state: TransferState,
    pub finished_at: DateTime<Utc>,
}

impl UploadRecord {
    pub fn from_task(task: &UploadTask) -> Self {
        Self {
            name: task.name.clone(),
            size: task.size,
            folder: task.folder.to_string(),
            state: task.state.clone(),
            finished_at: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct UploadHistoryRepository {
    store: Arc<dyn KeyValueStore>,
}

impl UploadHistoryRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn list(&self) -> Vec<UploadRecord> {
        self.store.get_or(UPLOAD_HISTORY_KEY, Vec::new())
    }

    /// Appends `records`, replacing older entries with the same file name.
    pub fn record(&self, records: Vec<UploadRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut history: Vec<UploadRecord> = self
            .list()
            .into_iter()
            .filter(|old| !records.iter().any(|new| new.name == old.name))
            .collect();
        history.extend(records);
        self.store
            .put(UPLOAD_HISTORY_KEY, UPLOAD_HISTORY_VERSION, &history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{JsonFileStore, MemoryStore};
    use serde_json::json;

    fn memory() -> Arc<dyn KeyValueStore> {
        Arc::new(MemoryStore::new())
    }

    fn row(value: serde_json::Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_theme_defaults_to_light_and_persists() {
        let themes = ThemeRepository::new(memory());
        assert_eq!(themes.color_mode(), ColorMode::Light);
        themes.save_color_mode(ColorMode::Dark).unwrap();
        assert_eq!(themes.color_mode(), ColorMode::Dark);
    }

    #[test]
    fn test_theme_reads_legacy_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("theme-config.json"),
            r#"{ "colorMode": "dark" }"#,
        )
        .unwrap();
        let themes = ThemeRepository::new(Arc::new(JsonFileStore::new(dir.path())));
        assert_eq!(themes.color_mode(), ColorMode::Dark);
    }

    #[test]
    fn test_table_create_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(dir.path()));
        let tables = TableRepository::new(store);

        let rows = vec![
            row(json!({"姓名": "小明", "学号": "1", "班级": "A"})),
            row(json!({"姓名": "小红", "学号": "2", "班级": "A"})),
        ];
        let stored = tables.create("名单.xlsx", "/tmp/名单.xlsx", rows.clone()).unwrap();

        assert_eq!(stored.meta.record_count, 2);
        assert_eq!(stored.meta.headers.len(), 3);
        assert!(dir
            .path()
            .join(format!("excel_data_{}.json", stored.meta.id))
            .exists());
        assert_eq!(tables.list(), vec![stored.meta.clone()]);
        assert_eq!(tables.data(&stored.meta.id), rows);

        assert!(tables.delete(&stored.meta.id).unwrap());
        assert!(tables.list().is_empty());
        assert!(tables.data(&stored.meta.id).is_empty());
        assert!(!tables.delete(&stored.meta.id).unwrap());
    }

    #[test]
    fn test_table_headers_come_from_every_row() {
        let tables = TableRepository::new(memory());
        let rows = vec![
            row(json!({"姓名": "小明", "班级": "A"})),
            row(json!({"姓名": "小红", "学号": "2", "班级": "A", "备注": "x"})),
        ];
        let stored = tables.create("名单.csv", "/tmp/名单.csv", rows).unwrap();
        assert_eq!(stored.meta.headers, vec!["姓名", "班级", "学号", "备注"]);
    }

    #[test]
    fn test_unknown_table_has_no_data() {
        let tables = TableRepository::new(memory());
        assert!(tables.data("missing").is_empty());
        assert!(tables.meta("missing").is_none());
    }

    #[test]
    fn test_upload_history_dedups_by_name() {
        let history = UploadHistoryRepository::new(memory());
        let record = |name: &str, state: TransferState| UploadRecord {
            name: name.into(),
            size: 1,
            folder: "/f".into(),
            state,
            finished_at: Utc::now(),
        };

        history
            .record(vec![
                record("a.doc", TransferState::Failed { error: "x".into() }),
                record("b.doc", TransferState::Succeeded),
            ])
            .unwrap();
        history
            .record(vec![record("a.doc", TransferState::Succeeded)])
            .unwrap();

        let names: Vec<(String, TransferState)> = history
            .list()
            .into_iter()
            .map(|r| (r.name, r.state))
            .collect();
        assert_eq!(
            names,
            vec![
                ("b.doc".to_string(), TransferState::Succeeded),
                ("a.doc".to_string(), TransferState::Succeeded),
            ]
        );
    }
}
