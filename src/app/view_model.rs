//! Responsible for transforming the `AppState` into serializable view models.

use camino::Utf8PathBuf;
use serde::Serialize;

use super::state::AppState;
use crate::config::AppConfig;
use crate::core::roster::render_summary;
use crate::core::{
    aggregate, missing_submissions, ClassStat, FileRecord, FormatToken, MatchAmbiguityWarning,
    MatchReport, PlannedRename, RosterEntry, UploadTask,
};

/// A serializable representation of the application state for the UI.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    pub config: AppConfig,
    pub current_folder: Option<Utf8PathBuf>,
    pub files: Vec<FileRecord>,
    pub selected_files_count: usize,
    pub template: String,
    pub has_plan: bool,
    pub is_renaming: bool,
    pub roster_size: usize,
    pub uploads: Vec<UploadTask>,
    pub is_uploading: bool,
    pub status_message: String,
}

/// Creates the complete `UiState` from the current `AppState`.
pub fn generate_ui_state(state: &AppState) -> UiState {
    UiState {
        config: state.config.clone(),
        current_folder: state.current_folder.clone(),
        files: state.files.clone(),
        selected_files_count: state.selected_count(),
        template: state.template.clone(),
        has_plan: state.plan.is_some(),
        is_renaming: state.is_renaming,
        roster_size: state.roster.len(),
        uploads: state.uploads.snapshot(),
        is_uploading: state.uploads.is_busy(),
        status_message: state.status_message.clone(),
    }
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RenamePreview {
    pub template: String,
    pub entries: Vec<PlannedRename>,
    /// Placeholders left in the output because they are not known tokens.
    pub unrecognized_placeholders: Vec<String>,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FormatTokenInfo {
    pub key: &'static str,
    pub placeholder: String,
    pub description: &'static str,
}

/// The placeholder vocabulary offered by the rename dialog.
pub fn format_tokens() -> Vec<FormatTokenInfo> {
    FormatToken::ALL
        .into_iter()
        .map(|token| FormatTokenInfo {
            key: token.key(),
            placeholder: token.placeholder(),
            description: token.description(),
        })
        .collect()
}

/// The result of checking a submission folder against a roster.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct HomeworkReport {
    pub folder: String,
    pub entries: Vec<RosterEntry>,
    pub stats: Vec<ClassStat>,
    pub missing: Vec<RosterEntry>,
    pub warnings: Vec<MatchAmbiguityWarning>,
    pub submitted_count: usize,
    pub summary: String,
}

impl HomeworkReport {
    /// Derives statistics and the missing list from a match result.
    pub fn from_match(folder: impl Into<String>, matched: MatchReport) -> Self {
        let stats = aggregate(&matched.entries);
        let missing = missing_submissions(&matched.entries);
        let submitted_count = matched.entries.len() - missing.len();
        Self {
            folder: folder.into(),
            summary: render_summary(&stats),
            stats,
            missing,
            submitted_count,
            warnings: matched.warnings,
            entries: matched.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_tokens_cover_vocabulary() {
        let tokens = format_tokens();
        assert_eq!(tokens.len(), FormatToken::ALL.len());
        assert_eq!(tokens[0].placeholder, "{class}");
        assert_eq!(tokens[1].description, "学生姓名");
    }

    #[test]
    fn test_report_from_match() {
        let mut a = RosterEntry::new("1", "小明", "A", "01");
        a.submitted = true;
        let b = RosterEntry::new("2", "小红", "A", "02");
        let c = RosterEntry::new("3", "小刚", "B", "03");

        let report = HomeworkReport::from_match(
            "/course/hw1",
            MatchReport {
                entries: vec![a, b.clone(), c.clone()],
                warnings: Vec::new(),
            },
        );

        assert_eq!(report.submitted_count, 1);
        assert_eq!(report.missing, vec![b, c]);
        assert_eq!(report.stats.len(), 2);
        assert_eq!(report.stats[0].submitted, 1);
        assert!(report.summary.contains("total: 1/3"));
    }
}
