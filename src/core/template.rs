//! Expands naming templates such as `{class}-{name}-{index}` into file names.

use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;

use super::tokens::FileTokens;
use super::RosterEntry;

/// The fixed vocabulary of placeholders a template may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatToken {
    Class,
    Name,
    Id,
    Date,
    Time,
    Original,
    Index,
}

impl FormatToken {
    pub const ALL: [FormatToken; 7] = [
        FormatToken::Class,
        FormatToken::Name,
        FormatToken::Id,
        FormatToken::Date,
        FormatToken::Time,
        FormatToken::Original,
        FormatToken::Index,
    ];

    /// The key between the braces.
    pub fn key(self) -> &'static str {
        match self {
            FormatToken::Class => "class",
            FormatToken::Name => "name",
            FormatToken::Id => "id",
            FormatToken::Date => "date",
            FormatToken::Time => "time",
            FormatToken::Original => "original",
            FormatToken::Index => "index",
        }
    }

    /// The literal as it appears in a template, e.g. `{name}`.
    pub fn placeholder(self) -> String {
        format!("{{{}}}", self.key())
    }

    /// Label shown next to the placeholder in the rename dialog.
    pub fn description(self) -> &'static str {
        match self {
            FormatToken::Class => "班级名称",
            FormatToken::Name => "学生姓名",
            FormatToken::Id => "学号",
            FormatToken::Date => "日期(YYYYMMDD)",
            FormatToken::Time => "时间(HHMMSS)",
            FormatToken::Original => "原文件名",
            FormatToken::Index => "序号",
        }
    }

    /// Case-sensitive lookup by key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|token| token.key() == key)
    }
}

/// Supplies the value for `{id}`.
pub trait IdResolver: Send + Sync {
    fn resolve(&self, tokens: &FileTokens, index: usize) -> String;
}

/// Labels files `学号1`, `学号2`, ... by their position in the batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticIdResolver;

impl IdResolver for SyntheticIdResolver {
    fn resolve(&self, _tokens: &FileTokens, index: usize) -> String {
        synthetic_id(index)
    }
}

fn synthetic_id(index: usize) -> String {
    format!("学号{}", index + 1)
}

/// Looks up the student ID of the roster entry named like the file.
///
/// Falls back to the synthetic label when the name is unknown or has no ID.
#[derive(Debug, Default, Clone)]
pub struct RosterIdResolver {
    ids_by_name: HashMap<String, String>,
}

impl RosterIdResolver {
    pub fn from_roster(roster: &[RosterEntry]) -> Self {
        let mut ids_by_name = HashMap::new();
        for entry in roster {
            if entry.name.is_empty() || entry.student_id.is_empty() {
                continue;
            }
            // First entry wins for duplicated names.
            ids_by_name
                .entry(entry.name.clone())
                .or_insert_with(|| entry.student_id.clone());
        }
        Self { ids_by_name }
    }
}

impl IdResolver for RosterIdResolver {
    fn resolve(&self, tokens: &FileTokens, index: usize) -> String {
        self.ids_by_name
            .get(&tokens.name)
            .cloned()
            .unwrap_or_else(|| synthetic_id(index))
    }
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{([^{}]*)\}").expect("placeholder pattern is valid"))
}

/// Expands `template` for the file at 0-based `index` and appends its extension.
///
/// `{id}` resolves to the synthetic `学号<index+1>` label.
pub fn expand(
    template: &str,
    tokens: &FileTokens,
    index: usize,
    class_name_override: Option<&str>,
) -> String {
    expand_with(template, tokens, index, class_name_override, &SyntheticIdResolver)
}

/// Like [`expand`], with a caller-provided source for `{id}`.
///
/// Substitution happens in a single pass, so values are never re-expanded.
/// Unknown placeholders are kept verbatim.
pub fn expand_with(
    template: &str,
    tokens: &FileTokens,
    index: usize,
    class_name_override: Option<&str>,
    ids: &dyn IdResolver,
) -> String {
    let expanded = placeholder_regex().replace_all(template, |caps: &Captures| {
        match FormatToken::from_key(&caps[1]) {
            Some(FormatToken::Class) => class_name_override.unwrap_or_default().to_string(),
            Some(FormatToken::Name) => tokens.name.clone(),
            Some(FormatToken::Id) => ids.resolve(tokens, index),
            Some(FormatToken::Date) => tokens.date.clone(),
            Some(FormatToken::Time) => tokens.time.clone(),
            Some(FormatToken::Original) => tokens.original.clone(),
            Some(FormatToken::Index) => (index + 1).to_string(),
            None => caps[0].to_string(),
        }
    });

    let mut name = expanded.into_owned();
    name.push_str(tokens.extension_str());
    name
}

/// Lists the `{...}` placeholders in `template` that are not part of the vocabulary.
pub fn unrecognized_placeholders(template: &str) -> Vec<String> {
    let mut unknown: Vec<String> = Vec::new();
    for caps in placeholder_regex().captures_iter(template) {
        if FormatToken::from_key(&caps[1]).is_none() && !unknown.iter().any(|u| u == &caps[0]) {
            unknown.push(caps[0].to_string());
        }
    }
    unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tokens::extract_at;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 9)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap()
    }

    fn tokens(file_name: &str) -> FileTokens {
        extract_at(file_name, at())
    }

    #[test]
    fn test_expand_all_tokens() {
        let t = tokens("小明-期末作业.docx");
        let out = expand(
            "{class}|{name}|{id}|{date}|{time}|{original}|{index}",
            &t,
            4,
            Some("计科2206"),
        );
        assert_eq!(
            out,
            "计科2206|小明|学号5|20250109|143000|小明-期末作业|5.docx"
        );
    }

    #[test]
    fn test_repeated_placeholders_are_all_replaced() {
        let out = expand("{name}{name}-{index}{index}", &tokens("a-b.txt"), 0, None);
        assert_eq!(out, "aa-11.txt");
    }

    #[test]
    fn test_unknown_placeholders_are_left_verbatim() {
        let out = expand("{name}-{Name}-{grade}", &tokens("小红-x.pdf"), 0, None);
        assert_eq!(out, "小红-{Name}-{grade}.pdf");
    }

    #[test]
    fn test_missing_class_resolves_to_empty() {
        let out = expand("{class}{name}", &tokens("小李-x.doc"), 0, None);
        assert_eq!(out, "小李.doc");
    }

    #[test]
    fn test_substituted_values_are_not_reexpanded() {
        let t = tokens("{index}-hw.txt");
        assert_eq!(t.name, "{index}");
        let out = expand("{name}_{index}", &t, 2, None);
        assert_eq!(out, "{index}_3.txt");
    }

    #[test]
    fn test_extension_is_always_appended() {
        assert_eq!(expand("fixed", &tokens("a-b.xlsx"), 0, None), "fixed.xlsx");
        assert_eq!(expand("fixed", &tokens("a-b"), 0, None), "fixed");
    }

    #[test]
    fn test_expand_is_deterministic() {
        let t = tokens("小张-期末作业.docx");
        let first = expand("{class}-{name}-{id}-{index}", &t, 7, Some("计科2207"));
        let second = expand("{class}-{name}-{id}-{index}", &t, 7, Some("计科2207"));
        assert_eq!(first, second);
    }

    #[test]
    fn test_roster_id_resolver_uses_student_id() {
        let roster = vec![
            RosterEntry::new("student-0", "小明", "计科2206", "2022001"),
            RosterEntry::new("student-1", "小红", "计科2206", ""),
        ];
        let ids = RosterIdResolver::from_roster(&roster);

        let ming = expand_with("{id}", &tokens("小明-x.doc"), 0, None, &ids);
        let hong = expand_with("{id}", &tokens("小红-x.doc"), 1, None, &ids);
        assert_eq!(ming, "2022001.doc");
        assert_eq!(hong, "学号2.doc");
    }

    #[test]
    fn test_unrecognized_placeholders_are_listed_once() {
        let unknown = unrecognized_placeholders("{name}-{grade}-{x}-{grade}-{index}");
        assert_eq!(unknown, vec!["{grade}".to_string(), "{x}".to_string()]);
        assert!(unrecognized_placeholders("{class}-{name}").is_empty());
    }

    #[test]
    fn test_token_vocabulary_round_trips_keys() {
        for token in FormatToken::ALL {
            assert_eq!(FormatToken::from_key(token.key()), Some(token));
            assert_eq!(token.placeholder(), format!("{{{}}}", token.key()));
        }
        assert_eq!(FormatToken::from_key("NAME"), None);
    }
}
