//! Splits a source file name into the fields a naming template can refer to.

use chrono::{Local, NaiveDateTime};
use serde::Serialize;

const DATE_FORMAT: &str = "%Y%m%d";
const TIME_FORMAT: &str = "%H%M%S";

/// Fields extracted from a single file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileTokens {
    /// Text before the first `-` of the stem, empty when the stem has no `-`.
    pub name: String,
    /// Extraction date as `YYYYMMDD`.
    pub date: String,
    /// Extraction time as `HHMMSS`.
    pub time: String,
    /// The stem, i.e. the file name without its extension.
    pub original: String,
    /// Everything from the last `.` on, including the dot.
    pub extension: Option<String>,
}

impl FileTokens {
    pub fn extension_str(&self) -> &str {
        self.extension.as_deref().unwrap_or("")
    }
}

/// Extracts tokens using the current local time for `{date}` and `{time}`.
pub fn extract(file_name: &str) -> FileTokens {
    extract_at(file_name, Local::now().naive_local())
}

/// Extracts tokens, resolving `{date}` and `{time}` against `timestamp`.
///
/// Never fails: a name without `-` yields an empty `name`, a name without `.`
/// yields no extension.
pub fn extract_at(file_name: &str, timestamp: NaiveDateTime) -> FileTokens {
    let (stem, extension) = match file_name.rfind('.') {
        Some(dot) => (&file_name[..dot], Some(file_name[dot..].to_string())),
        None => (file_name, None),
    };

    let name = stem
        .split_once('-')
        .map(|(left, _)| left.to_string())
        .unwrap_or_default();

    FileTokens {
        name,
        date: timestamp.format(DATE_FORMAT).to_string(),
        time: timestamp.format(TIME_FORMAT).to_string(),
        original: stem.to_string(),
        extension,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn fixed_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(9, 5, 7)
            .unwrap()
    }

    #[test]
    fn test_extract_splits_name_on_first_dash() {
        let tokens = extract_at("小明-期末-作业.docx", fixed_time());
        assert_eq!(tokens.name, "小明");
        assert_eq!(tokens.original, "小明-期末-作业");
        assert_eq!(tokens.extension.as_deref(), Some(".docx"));
    }

    #[test]
    fn test_extract_without_dash_has_empty_name() {
        let tokens = extract_at("report.pdf", fixed_time());
        assert_eq!(tokens.name, "");
        assert_eq!(tokens.original, "report");
    }

    #[test]
    fn test_extract_without_dot_has_no_extension() {
        let tokens = extract_at("小红-README", fixed_time());
        assert_eq!(tokens.name, "小红");
        assert_eq!(tokens.original, "小红-README");
        assert_eq!(tokens.extension, None);
        assert_eq!(tokens.extension_str(), "");
    }

    #[test]
    fn test_extension_starts_at_last_dot() {
        let tokens = extract_at("小李-archive.tar.gz", fixed_time());
        assert_eq!(tokens.extension.as_deref(), Some(".gz"));
        assert_eq!(tokens.original, "小李-archive.tar");
    }

    #[test]
    fn test_dash_inside_extension_is_not_a_delimiter() {
        let tokens = extract_at("notes.v-2", fixed_time());
        assert_eq!(tokens.name, "");
        assert_eq!(tokens.original, "notes");
        assert_eq!(tokens.extension.as_deref(), Some(".v-2"));
    }

    #[test]
    fn test_date_and_time_are_formatted_compactly() {
        let tokens = extract_at("a-b.txt", fixed_time());
        assert_eq!(tokens.date, "20240603");
        assert_eq!(tokens.time, "090507");
    }

    #[test]
    fn test_empty_input_degrades_gracefully() {
        let tokens = extract_at("", fixed_time());
        assert_eq!(tokens.name, "");
        assert_eq!(tokens.original, "");
        assert_eq!(tokens.extension, None);
    }

    #[test]
    fn test_extract_uses_current_clock() {
        let today = Local::now().format(DATE_FORMAT).to_string();
        let tokens = extract("x-y.txt");
        // Tolerate a midnight rollover between the two clock reads.
        assert!(tokens.date == today || tokens.date > today);
        assert_eq!(tokens.time.len(), 6);
    }
}
