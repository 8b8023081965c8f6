use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// dBASE attribute types used by shapefile attribute tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Character,
    Numeric,
    Float,
    Date,
    Logical,
    Memo,
}

impl ColumnType {
    pub fn code(self) -> char {
        match self {
            ColumnType::Character => 'C',
            ColumnType::Numeric => 'N',
            ColumnType::Float => 'F',
            ColumnType::Date => 'D',
            ColumnType::Logical => 'L',
            ColumnType::Memo => 'M',
        }
    }

    /// Types whose stored text is bounded by the column width.
    pub fn is_width_bounded(self) -> bool {
        matches!(
            self,
            ColumnType::Character | ColumnType::Numeric | ColumnType::Float
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown column type: {0}")]
pub struct UnknownColumnType(pub String);

impl FromStr for ColumnType {
    type Err = UnknownColumnType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "c" | "character" | "string" => Ok(ColumnType::Character),
            "n" | "numeric" | "integer" => Ok(ColumnType::Numeric),
            "f" | "float" | "double" => Ok(ColumnType::Float),
            "d" | "date" => Ok(ColumnType::Date),
            "l" | "logical" | "boolean" => Ok(ColumnType::Logical),
            "m" | "memo" => Ok(ColumnType::Memo),
            _ => Err(UnknownColumnType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub column_type: ColumnType,
    pub max_length: usize,
    pub decimals: usize,
}

impl ColumnDescriptor {
    pub fn new(name: &str, column_type: ColumnType, max_length: usize) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            max_length,
            decimals: 0,
        }
    }

    pub fn character(name: &str, max_length: usize) -> Self {
        Self::new(name, ColumnType::Character, max_length)
    }

    pub fn numeric(name: &str, max_length: usize) -> Self {
        Self::new(name, ColumnType::Numeric, max_length)
    }

    pub fn float(name: &str, max_length: usize, decimals: usize) -> Self {
        Self {
            decimals,
            ..Self::new(name, ColumnType::Float, max_length)
        }
    }

    pub fn date(name: &str) -> Self {
        Self::new(name, ColumnType::Date, 8)
    }

    pub fn logical(name: &str) -> Self {
        Self::new(name, ColumnType::Logical, 1)
    }

    /// True when `value` does not fit the declared width. Widths count
    /// characters; a zero width means unbounded.
    pub fn exceeds_width(&self, value: &str) -> bool {
        self.column_type.is_width_bounded()
            && self.max_length > 0
            && value.chars().count() > self.max_length
    }
}
