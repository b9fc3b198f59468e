//! Checks a roster against the files found in a submission folder.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{ClassStat, RosterEntry, SubmittedFile};

/// How a roster entry is recognised in a file name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchStrategy {
    /// The file name contains the entry's name.
    #[default]
    NameSubstring,
    /// The file name contains the entry's student ID, falling back to the name.
    StudentIdThenName,
}

/// A submitted file that satisfied more than one roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchAmbiguityWarning {
    pub file_name: String,
    pub entry_names: Vec<String>,
}

/// Matched entries together with the non-fatal ambiguities found on the way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchReport {
    pub entries: Vec<RosterEntry>,
    pub warnings: Vec<MatchAmbiguityWarning>,
}

/// Marks each entry submitted iff some file name contains the entry's name.
pub fn match_roster(roster: &[RosterEntry], files: &[SubmittedFile]) -> Vec<RosterEntry> {
    match_with_warnings(roster, files, MatchStrategy::NameSubstring).entries
}

/// Matches `roster` against `files` and reports files claimed by several entries.
pub fn match_with_warnings(
    roster: &[RosterEntry],
    files: &[SubmittedFile],
    strategy: MatchStrategy,
) -> MatchReport {
    // claims[f] holds the indices of the entries that file f satisfied.
    let mut claims: Vec<Vec<usize>> = vec![Vec::new(); files.len()];

    let entries: Vec<RosterEntry> = roster
        .iter()
        .enumerate()
        .map(|(entry_idx, entry)| {
            let matched = matching_files(entry, files, strategy);
            for &file_idx in &matched {
                claims[file_idx].push(entry_idx);
            }
            RosterEntry {
                submitted: !matched.is_empty(),
                ..entry.clone()
            }
        })
        .collect();

    let warnings: Vec<MatchAmbiguityWarning> = files
        .iter()
        .zip(claims)
        .filter(|(_, claimed_by)| claimed_by.len() > 1)
        .map(|(file, claimed_by)| MatchAmbiguityWarning {
            file_name: file.name.clone(),
            entry_names: claimed_by
                .into_iter()
                .map(|idx| roster[idx].name.clone())
                .collect(),
        })
        .collect();

    if !warnings.is_empty() {
        tracing::debug!("{} submitted files matched more than one roster entry", warnings.len());
    }

    MatchReport { entries, warnings }
}

fn matching_files(
    entry: &RosterEntry,
    files: &[SubmittedFile],
    strategy: MatchStrategy,
) -> Vec<usize> {
    let contains = |needle: &str| -> Vec<usize> {
        files
            .iter()
            .enumerate()
            .filter(|(_, file)| file.name.contains(needle))
            .map(|(idx, _)| idx)
            .collect()
    };

    match strategy {
        MatchStrategy::NameSubstring => contains(&entry.name),
        MatchStrategy::StudentIdThenName => {
            // An empty ID would claim every file, so only the name can match then.
            let by_id = if entry.student_id.is_empty() {
                Vec::new()
            } else {
                contains(&entry.student_id)
            };
            if by_id.is_empty() {
                contains(&entry.name)
            } else {
                by_id
            }
        }
    }
}

/// Per-class totals in order of each class's first appearance.
pub fn aggregate(roster: &[RosterEntry]) -> Vec<ClassStat> {
    let mut stats: Vec<ClassStat> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for entry in roster {
        let pos = *positions.entry(entry.class_name.as_str()).or_insert_with(|| {
            stats.push(ClassStat {
                class_name: entry.class_name.clone(),
                total: 0,
                submitted: 0,
            });
            stats.len() - 1
        });
        stats[pos].total += 1;
        if entry.submitted {
            stats[pos].submitted += 1;
        }
    }

    stats
}

/// Entries that have not submitted, in roster order.
pub fn missing_submissions(roster: &[RosterEntry]) -> Vec<RosterEntry> {
    roster.iter().filter(|e| !e.submitted).cloned().collect()
}

/// Entries of one class, in roster order.
pub fn filter_by_class(roster: &[RosterEntry], class_name: &str) -> Vec<RosterEntry> {
    roster
        .iter()
        .filter(|e| e.class_name == class_name)
        .cloned()
        .collect()
}

/// Entries whose name, student ID or class contains `term`. An empty term keeps everything.
pub fn search(roster: &[RosterEntry], term: &str) -> Vec<RosterEntry> {
    roster
        .iter()
        .filter(|e| {
            e.name.contains(term) || e.student_id.contains(term) || e.class_name.contains(term)
        })
        .cloned()
        .collect()
}

/// Renders a plain-text coverage summary, one line per class.
pub fn render_summary(stats: &[ClassStat]) -> String {
    let mut out = String::new();
    for stat in stats {
        out.push_str(&format!(
            "{}: {}/{} ({:.0}%)\n",
            stat.class_name,
            stat.submitted,
            stat.total,
            stat.coverage() * 100.0
        ));
    }
    let total: usize = stats.iter().map(|s| s.total).sum();
    let submitted: usize = stats.iter().map(|s| s.submitted).sum();
    out.push_str(&format!("total: {}/{}\n", submitted, total));
    out
}
