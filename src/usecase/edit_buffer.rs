use crate::domain::entities::edit::{CellKey, EditId, EditRecord};
use crate::domain::entities::layer::FeatureId;
use crate::usecase::ports::layer::CellSink;

/// Pending cell edits, kept in arrival order until they are saved or
/// discarded.
///
/// Edits are never merged: two changes to the same cell are two records, and
/// undo walks them back newest first. Records undone with
/// [`EditBuffer::undo_last`] sit on a redo stack until the next new edit or
/// any other kind of undo.
#[derive(Debug, Clone, Default)]
pub struct EditBuffer {
    active: Vec<EditRecord>,
    redo_stack: Vec<EditRecord>,
    next_id: u64,
}

impl EditBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a record with a fresh id and appends it.
    pub fn record(
        &mut self,
        feature_id: FeatureId,
        cell: CellKey,
        old_value: &str,
        new_value: &str,
    ) -> EditId {
        let id = EditId(self.next_id);
        self.add(EditRecord {
            id,
            feature_id,
            cell,
            old_value: old_value.to_string(),
            new_value: new_value.to_string(),
        });
        id
    }

    pub fn add(&mut self, record: EditRecord) {
        self.next_id = self.next_id.max(record.id.0 + 1);
        self.active.push(record);
        self.redo_stack.clear();
    }

    /// Reverts the newest active edit.
    pub fn undo_last(&mut self, cells: &mut dyn CellSink) -> Option<EditRecord> {
        let record = self.active.pop()?;
        cells.set_cell(&record.cell, &record.old_value);
        self.redo_stack.push(record.clone());
        Some(record)
    }

    /// Re-applies the most recently undone edit.
    pub fn redo(&mut self, cells: &mut dyn CellSink) -> Option<EditRecord> {
        let record = self.redo_stack.pop()?;
        cells.set_cell(&record.cell, &record.new_value);
        self.active.push(record.clone());
        Some(record)
    }

    /// Reverts one specific edit. It is not redoable.
    pub fn undo(&mut self, id: EditId, cells: &mut dyn CellSink) -> Option<EditRecord> {
        let position = self.active.iter().position(|record| record.id == id)?;
        let record = self.active.remove(position);
        cells.set_cell(&record.cell, &record.old_value);
        self.redo_stack.clear();
        Some(record)
    }

    /// Reverts every active edit of one feature, newest first, so each cell
    /// ends at the value it had before its first edit. Returns how many
    /// records were undone.
    pub fn undo_feature(&mut self, feature_id: &FeatureId, cells: &mut dyn CellSink) -> usize {
        let (undone, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.active)
            .into_iter()
            .partition(|record| &record.feature_id == feature_id);
        self.active = kept;
        for record in undone.iter().rev() {
            cells.set_cell(&record.cell, &record.old_value);
        }
        self.redo_stack.clear();
        undone.len()
    }

    pub fn undo_all(&mut self, cells: &mut dyn CellSink) -> usize {
        let undone = std::mem::take(&mut self.active);
        for record in undone.iter().rev() {
            cells.set_cell(&record.cell, &record.old_value);
        }
        self.redo_stack.clear();
        undone.len()
    }

    pub fn clear(&mut self) {
        self.active.clear();
        self.redo_stack.clear();
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn can_undo(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EditRecord> {
        self.active.iter()
    }

    pub fn records_for(&self, feature_id: &FeatureId) -> Vec<&EditRecord> {
        self.active
            .iter()
            .filter(|record| &record.feature_id == feature_id)
            .collect()
    }

    /// Distinct feature ids in the order they were first edited.
    pub fn feature_ids(&self) -> Vec<FeatureId> {
        let mut ids: Vec<FeatureId> = Vec::new();
        for record in &self.active {
            if !ids.contains(&record.feature_id) {
                ids.push(record.feature_id.clone());
            }
        }
        ids
    }

    pub fn grouped_by_feature(&self) -> Vec<(FeatureId, Vec<&EditRecord>)> {
        self.feature_ids()
            .into_iter()
            .map(|feature_id| {
                let records = self.records_for(&feature_id);
                (feature_id, records)
            })
            .collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "pending edits: {}, features: {}, can undo: {}, can redo: {}",
            self.active.len(),
            self.feature_ids().len(),
            self.can_undo(),
            self.can_redo()
        )
    }
}
