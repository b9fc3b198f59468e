//! Builds dry-run rename plans for the selected files of a folder.

use camino::Utf8PathBuf;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::error::{CoreError, CoreResult, ValidationError};
use super::template::{expand_with, IdResolver, SyntheticIdResolver};
use super::tokens::{extract, extract_at};
use super::FileRecord;

/// A single proposed rename. Nothing has been applied yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedRename {
    pub id: String,
    pub old_path: Utf8PathBuf,
    pub new_name: String,
    pub new_path: Utf8PathBuf,
}

/// The validated output of the planner: unique target names, in selection order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenamePlan {
    pub folder_name: String,
    pub template: String,
    pub entries: Vec<PlannedRename>,
}

impl RenamePlan {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Configurable planner. [`plan`] is the common case with default options.
pub struct RenamePlanner {
    template: String,
    ids: Box<dyn IdResolver>,
    timestamp: Option<NaiveDateTime>,
}

impl RenamePlanner {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            ids: Box::new(SyntheticIdResolver),
            timestamp: None,
        }
    }

    /// Resolves `{id}` through `ids` instead of the synthetic label.
    pub fn with_id_resolver(mut self, ids: impl IdResolver + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    /// Resolves `{date}`/`{time}` once for the whole batch.
    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Plans renames for the selected `files`, using `folder_name` for `{class}`.
    ///
    /// Fails before producing anything if the template is empty, nothing is
    /// selected, a target name is unusable, or two targets collide.
    pub fn plan(&self, files: &[FileRecord], folder_name: &str) -> CoreResult<RenamePlan> {
        if self.template.trim().is_empty() {
            return Err(ValidationError::EmptyTemplate.into());
        }

        let selected: Vec<&FileRecord> = files.iter().filter(|f| f.selected).collect();
        if selected.is_empty() {
            return Err(ValidationError::NoFilesSelected.into());
        }

        let mut entries = Vec::with_capacity(selected.len());
        for (index, file) in selected.into_iter().enumerate() {
            let tokens = match self.timestamp {
                Some(ts) => extract_at(&file.name, ts),
                None => extract(&file.name),
            };
            let new_name = expand_with(
                &self.template,
                &tokens,
                index,
                Some(folder_name),
                self.ids.as_ref(),
            );
            validate_target_name(&file.name, &new_name)?;

            let new_path = match file.path.parent() {
                Some(parent) => parent.join(&new_name),
                None => Utf8PathBuf::from(&new_name),
            };
            entries.push(PlannedRename {
                id: file.id.clone(),
                old_path: file.path.clone(),
                new_name,
                new_path,
            });
        }

        let collisions = find_collisions(&entries);
        if !collisions.is_empty() {
            tracing::debug!(
                "Rename plan rejected, {} colliding target names",
                collisions.len()
            );
            return Err(CoreError::Collision { names: collisions });
        }

        tracing::debug!("Planned {} renames in {:?}", entries.len(), folder_name);
        Ok(RenamePlan {
            folder_name: folder_name.to_string(),
            template: self.template.clone(),
            entries,
        })
    }
}

/// Plans renames with the synthetic `{id}` and per-file timestamps.
pub fn plan(files: &[FileRecord], template: &str, folder_name: &str) -> CoreResult<RenamePlan> {
    RenamePlanner::new(template).plan(files, folder_name)
}

/// Copies planned names onto the records they belong to.
///
/// Unselected records lose any stale `new_name`.
pub fn preview(files: &mut [FileRecord], plan: &RenamePlan) {
    let by_id: HashMap<&str, &str> = plan
        .entries
        .iter()
        .map(|e| (e.id.as_str(), e.new_name.as_str()))
        .collect();

    for file in files.iter_mut() {
        file.new_name = if file.selected {
            by_id.get(file.id.as_str()).map(|name| name.to_string())
        } else {
            None
        };
    }
}

fn validate_target_name(source: &str, name: &str) -> CoreResult<()> {
    let invalid = name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']);
    if invalid {
        return Err(ValidationError::InvalidTargetName {
            source_name: source.to_string(),
            name: name.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Target names used more than once, in order of first appearance.
fn find_collisions(entries: &[PlannedRename]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for entry in entries {
        *counts.entry(entry.new_name.as_str()).or_default() += 1;
    }

    let mut reported = HashSet::new();
    entries
        .iter()
        .map(|e| e.new_name.as_str())
        .filter(|name| counts[name] > 1 && reported.insert(*name))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn records(folder: &str, names: &[&str], selected: bool) -> Vec<FileRecord> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                FileRecord::new((i + 1).to_string(), format!("{}/{}", folder, name))
                    .selected(selected)
            })
            .collect()
    }

    fn batch_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap()
    }

    #[test]
    fn test_plan_class_name_index() {
        let files = records(
            "/计科2206",
            &["小明-期末作业.docx", "小红-期末作业.docx"],
            true,
        );
        let plan = plan(&files, "{class}-{name}-{index}", "计科2206").unwrap();

        let names: Vec<&str> = plan.entries.iter().map(|e| e.new_name.as_str()).collect();
        assert_eq!(names, vec!["计科2206-小明-1.docx", "计科2206-小红-2.docx"]);
        assert_eq!(plan.entries[0].old_path, "/计科2206/小明-期末作业.docx");
        assert_eq!(plan.entries[0].new_path, "/计科2206/计科2206-小明-1.docx");
    }

    #[test]
    fn test_index_counts_only_selected_files() {
        let mut files = records("/f", &["a-1.txt", "b-1.txt", "c-1.txt"], true);
        files[0].selected = false;

        let plan = plan(&files, "{name}{index}", "f").unwrap();
        let names: Vec<&str> = plan.entries.iter().map(|e| e.new_name.as_str()).collect();
        assert_eq!(names, vec!["b1.txt", "c2.txt"]);
        assert_eq!(plan.entries[0].id, "2");
    }

    #[test]
    fn test_empty_template_is_rejected() {
        let files = records("/f", &["a-1.txt"], true);
        let err = plan(&files, "", "f").unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::EmptyTemplate)
        ));

        let err = plan(&files, "   ", "f").unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::EmptyTemplate)
        ));
    }

    #[test]
    fn test_no_selection_is_rejected() {
        let files = records("/f", &["a-1.txt", "b-1.txt"], false);
        let err = plan(&files, "{name}", "f").unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::NoFilesSelected)
        ));
    }

    #[test]
    fn test_collisions_are_reported_not_overwritten() {
        let files = records(
            "/f",
            &["小明-作业一.docx", "小明-作业二.docx", "小红-作业.docx", "小红-作业.pdf"],
            true,
        );
        let err = plan(&files, "{class}-{name}", "计科2206").unwrap_err();
        match err {
            CoreError::Collision { names } => {
                assert_eq!(names, vec!["计科2206-小明.docx".to_string()]);
            }
            other => panic!("expected collision, got {:?}", other),
        }
    }

    #[test]
    fn test_target_with_separator_is_rejected() {
        let files = records("/f", &["a-1.txt"], true);
        let err = plan(&files, "sub/{name}", "f").unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::InvalidTargetName { .. })
        ));
    }

    #[test]
    fn test_pinned_timestamp_is_shared_by_the_batch() {
        let files = records("/f", &["a-1.txt", "b-1.txt"], true);
        let plan = RenamePlanner::new("{date}{time}-{name}")
            .with_timestamp(batch_time())
            .plan(&files, "f")
            .unwrap();
        assert_eq!(plan.entries[0].new_name, "20241231235959-a.txt");
        assert_eq!(plan.entries[1].new_name, "20241231235959-b.txt");
    }

    #[test]
    fn test_preview_writes_names_to_selected_records() {
        let mut files = records("/f", &["a-1.txt", "b-1.txt"], true);
        let plan = plan(&files, "{index}", "f").unwrap();
        files[1].selected = false;
        files[1].new_name = Some("stale".into());

        preview(&mut files, &plan);
        assert_eq!(files[0].new_name.as_deref(), Some("1.txt"));
        assert_eq!(files[1].new_name, None);
    }

    proptest! {
        #[test]
        fn prop_one_entry_per_selected_file_in_order(
            picks in prop::collection::vec(("[a-z]{1,6}", any::<bool>()), 1..40),
        ) {
            let files: Vec<FileRecord> = picks
                .iter()
                .enumerate()
                .map(|(i, (stem, sel))| {
                    FileRecord::new(i.to_string(), format!("/dir/{}-x.txt", stem)).selected(*sel)
                })
                .collect();
            let expected: Vec<String> = files
                .iter()
                .filter(|f| f.selected)
                .map(|f| f.id.clone())
                .collect();

            let result = RenamePlanner::new("{name}-{index}")
                .with_timestamp(batch_time())
                .plan(&files, "dir");

            if expected.is_empty() {
                prop_assert!(result.is_err());
            } else {
                let plan = result.unwrap();
                let ids: Vec<String> = plan.entries.iter().map(|e| e.id.clone()).collect();
                prop_assert_eq!(ids, expected);
            }
        }

        #[test]
        fn prop_replanning_is_idempotent(
            stems in prop::collection::vec("[a-z]{1,6}", 1..20),
            template in "(\\{name\\}|\\{index\\}|\\{id\\}|\\{date\\}|-|_){1,6}",
        ) {
            let files: Vec<FileRecord> = stems
                .iter()
                .enumerate()
                .map(|(i, s)| FileRecord::new(i.to_string(), format!("/d/{}-hw.doc", s)).selected(true))
                .collect();
            let planner = RenamePlanner::new(template).with_timestamp(batch_time());
            let first = planner.plan(&files, "d");
            let second = planner.plan(&files, "d");
            match (first, second) {
                (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
                (Err(a), Err(b)) => prop_assert_eq!(a.to_string(), b.to_string()),
                _ => prop_assert!(false, "planning the same batch twice disagreed"),
            }
        }
    }
}
