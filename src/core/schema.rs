//! Maps loosely typed spreadsheet rows onto `RosterEntry` values.

use serde_json::{Map, Value};

use super::error::{CoreResult, RosterIssue, ValidationError};
use super::RosterEntry;

/// One spreadsheet row, keyed by header text.
pub type Record = Map<String, Value>;

pub const NAME_COLUMN: &str = "姓名";
pub const STUDENT_ID_COLUMN: &str = "学号";
pub const CLASS_COLUMN: &str = "班级";

/// Which header holds which roster field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterSchema {
    pub name_column: String,
    pub student_id_column: String,
    pub class_column: String,
}

impl Default for RosterSchema {
    fn default() -> Self {
        Self {
            name_column: NAME_COLUMN.to_string(),
            student_id_column: STUDENT_ID_COLUMN.to_string(),
            class_column: CLASS_COLUMN.to_string(),
        }
    }
}

impl RosterSchema {
    /// Converts `rows` into roster entries, or reports every malformed cell.
    pub fn parse(&self, rows: &[Record]) -> CoreResult<Vec<RosterEntry>> {
        let mut issues = Vec::new();
        let mut entries = Vec::with_capacity(rows.len());

        for (idx, row) in rows.iter().enumerate() {
            let row_number = idx + 1;
            let name = self.field(row, &self.name_column, row_number, &mut issues);
            let student_id = self.field(row, &self.student_id_column, row_number, &mut issues);
            let class_name = self.field(row, &self.class_column, row_number, &mut issues);

            if let (Some(name), Some(student_id), Some(class_name)) = (name, student_id, class_name)
            {
                entries.push(RosterEntry::new(
                    format!("student-{}", idx),
                    name,
                    class_name,
                    student_id,
                ));
            }
        }

        if issues.is_empty() {
            Ok(entries)
        } else {
            tracing::warn!("Roster rejected with {} issues", issues.len());
            Err(ValidationError::InvalidRoster(issues).into())
        }
    }

    /// Headers this schema requires that `headers` does not contain.
    pub fn missing_columns(&self, headers: &[String]) -> Vec<String> {
        [&self.name_column, &self.student_id_column, &self.class_column]
            .into_iter()
            .filter(|col| !headers.contains(*col))
            .cloned()
            .collect()
    }

    fn field(
        &self,
        row: &Record,
        column: &str,
        row_number: usize,
        issues: &mut Vec<RosterIssue>,
    ) -> Option<String> {
        let problem = match row.get(column) {
            None => "is missing",
            Some(value) => match cell_text(value) {
                Some(text) if !text.is_empty() => return Some(text),
                Some(_) => "is empty",
                None => "is not text",
            },
        };
        issues.push(RosterIssue {
            row: row_number,
            column: column.to_string(),
            problem: problem.to_string(),
        });
        None
    }
}

/// Text of a cell; integral numbers are printed without a fractional part.
fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                n.as_f64()
                    .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15)
                    .map(|f| format!("{:.0}", f))
            }
        }
        _ => None,
    }
}
