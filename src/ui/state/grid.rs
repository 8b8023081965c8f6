use thiserror::Error;

use crate::domain::entities::column::ColumnDescriptor;
use crate::domain::entities::edit::{CellKey, EditId};
use crate::domain::entities::layer::{Feature, FeatureId};
use crate::usecase::edit_buffer::EditBuffer;
use crate::usecase::ports::layer::CellSink;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("row out of range: {0}")]
    RowOutOfRange(usize),
    #[error("unknown column: {0}")]
    UnknownColumn(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridRow {
    pub feature_id: FeatureId,
    pub values: Vec<String>,
}

/// Attribute table as shown to the user: one row per loaded feature, one
/// value per declared column.
#[derive(Debug, Clone, Default)]
pub struct AttributeGrid {
    columns: Vec<ColumnDescriptor>,
    rows: Vec<GridRow>,
}

impl AttributeGrid {
    pub fn new(columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn from_features(columns: Vec<ColumnDescriptor>, features: &[Feature]) -> Self {
        let mut grid = Self::new(columns);
        grid.append_rows(features);
        grid
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn rows(&self) -> &[GridRow] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn append_rows(&mut self, features: &[Feature]) {
        for feature in features {
            let values = self
                .columns
                .iter()
                .map(|column| feature.value(&column.name).to_string())
                .collect();
            self.rows.push(GridRow {
                feature_id: feature.id.clone(),
                values,
            });
        }
    }

    pub fn column_index(&self, column: &str) -> Result<usize, GridError> {
        self.columns
            .iter()
            .position(|descriptor| descriptor.name == column)
            .ok_or_else(|| GridError::UnknownColumn(column.to_string()))
    }

    pub fn cell_value(&self, row_idx: usize, column: &str) -> Result<&str, GridError> {
        let col_idx = self.column_index(column)?;
        let row = self
            .rows
            .get(row_idx)
            .ok_or(GridError::RowOutOfRange(row_idx))?;
        Ok(row.values.get(col_idx).map(String::as_str).unwrap_or(""))
    }

    /// Commits a cell edit: updates the displayed value and records the
    /// change. An unchanged value records nothing.
    pub fn edit_cell(
        &mut self,
        row_idx: usize,
        column: &str,
        value: &str,
        buffer: &mut EditBuffer,
    ) -> Result<Option<EditId>, GridError> {
        let col_idx = self.column_index(column)?;
        let row = self
            .rows
            .get_mut(row_idx)
            .ok_or(GridError::RowOutOfRange(row_idx))?;
        let Some(slot) = row.values.get_mut(col_idx) else {
            return Err(GridError::UnknownColumn(column.to_string()));
        };
        if slot == value {
            return Ok(None);
        }

        let old_value = std::mem::replace(slot, value.to_string());
        let cell = CellKey {
            row_idx,
            col_idx,
            column: column.to_string(),
        };
        Ok(Some(buffer.record(
            row.feature_id.clone(),
            cell,
            &old_value,
            value,
        )))
    }
}

impl CellSink for AttributeGrid {
    fn set_cell(&mut self, cell: &CellKey, value: &str) {
        if let Some(slot) = self
            .rows
            .get_mut(cell.row_idx)
            .and_then(|row| row.values.get_mut(cell.col_idx))
        {
            *slot = value.to_string();
        }
    }
}
