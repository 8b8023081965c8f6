//! dBASE-compatible checks applied to edited attribute values before they
//! are written back to a layer.
//!
//! A failed check never errors; callers get `false` (or the offending column
//! names) and decide what to reject.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::entities::column::{ColumnDescriptor, ColumnType};
use crate::domain::entities::layer::Feature;

const DATE_FORMAT: &str = "%Y/%m/%d";
const MIN_DATE_CHARS: usize = 6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOptions {
    /// Reject date values shorter than six characters instead of letting
    /// them through unchecked.
    #[serde(default)]
    pub strict_short_dates: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ValueValidator {
    options: ValidationOptions,
}

impl ValueValidator {
    pub fn new(options: ValidationOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> ValidationOptions {
        self.options
    }

    pub fn validate(&self, column_type: ColumnType, value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() {
            return true;
        }

        match column_type {
            ColumnType::Numeric => is_numeric(value),
            ColumnType::Float => value.parse::<f64>().is_ok(),
            ColumnType::Date => self.is_date(value),
            ColumnType::Logical => is_logical(value),
            ColumnType::Character | ColumnType::Memo => true,
        }
    }

    /// Names of the declared columns whose value on `feature` fails
    /// validation, in declaration order.
    pub fn validate_feature(&self, feature: &Feature, columns: &[ColumnDescriptor]) -> Vec<String> {
        columns
            .iter()
            .filter(|column| !self.validate(column.column_type, feature.value(&column.name)))
            .map(|column| column.name.clone())
            .collect()
    }

    fn is_date(&self, value: &str) -> bool {
        match reformat_date(value) {
            Some(formatted) => NaiveDate::parse_from_str(&formatted, DATE_FORMAT).is_ok(),
            None => !self.options.strict_short_dates,
        }
    }
}

fn is_numeric(value: &str) -> bool {
    if value.contains('.') || value.to_ascii_uppercase().contains("NAN") {
        value.parse::<f64>().is_ok()
    } else {
        value.parse::<i64>().is_ok()
    }
}

fn is_logical(value: &str) -> bool {
    let normalized = normalize_logical(value);
    normalized.eq_ignore_ascii_case("true") || normalized.eq_ignore_ascii_case("false")
}

/// Maps the DBF logical tokens onto `True`/`False`. Anything else, `?`
/// included, comes back unchanged.
pub fn normalize_logical(value: &str) -> String {
    match value.trim().to_ascii_uppercase().as_str() {
        "Y" | "YES" | "T" | "TRUE" => "True".to_string(),
        "N" | "NO" | "F" | "FALSE" => "False".to_string(),
        _ => value.trim().to_string(),
    }
}

/// `yyyymmdd` to `yyyy/mm/dd`: a separator goes in at char offset 6, then at
/// offset 4. Returns `None` below six characters.
pub fn reformat_date(value: &str) -> Option<String> {
    let mut chars: Vec<char> = value.trim().chars().collect();
    if chars.len() < MIN_DATE_CHARS {
        return None;
    }
    chars.insert(6, '/');
    chars.insert(4, '/');
    Some(chars.into_iter().collect())
}
