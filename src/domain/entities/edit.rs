use std::fmt;

use crate::domain::entities::layer::FeatureId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellKey {
    pub row_idx: usize,
    pub col_idx: usize,
    pub column: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EditId(pub u64);

/// One committed grid cell change that has not been saved yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRecord {
    pub id: EditId,
    pub feature_id: FeatureId,
    pub cell: CellKey,
    pub old_value: String,
    pub new_value: String,
}

impl EditRecord {
    pub fn column(&self) -> &str {
        &self.cell.column
    }
}

impl fmt::Display for EditRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: \"{}\" -> \"{}\"",
            self.feature_id,
            self.cell.column,
            clip(&self.old_value),
            clip(&self.new_value)
        )
    }
}

fn clip(value: &str) -> String {
    if value.chars().count() > 30 {
        format!("{}...", value.chars().take(30).collect::<String>())
    } else {
        value.to_string()
    }
}
