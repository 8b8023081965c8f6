use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::entities::layer::{Feature, FeatureId, LayerId, LayerMode};
use crate::domain::entities::transaction::{
    CommitState, FailureKind, FailureReason, TransactionResult,
};
use crate::domain::validation::ValueValidator;
use crate::usecase::edit_buffer::EditBuffer;
use crate::usecase::ports::layer::{CellSink, FeatureLayer, LayerError, MapNotifier};

#[derive(Debug, Error)]
pub enum CommitError {
    #[error(transparent)]
    Layer(#[from] LayerError),
}

/// One mutex per layer identity. Commits against the same layer serialize;
/// commits against different layers do not.
#[derive(Debug, Default)]
pub struct LayerLocks {
    guards: Mutex<HashMap<LayerId, Arc<Mutex<()>>>>,
}

impl LayerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Guards nobody holds a handle to are pruned on each call, so the map
    /// only tracks layers with a commit in progress or waiting.
    pub fn guard_for(&self, layer: &LayerId) -> Arc<Mutex<()>> {
        let mut guards = self.guards.lock().unwrap_or_else(PoisonError::into_inner);
        guards.retain(|_, guard| Arc::strong_count(guard) > 1);
        guards.entry(layer.clone()).or_default().clone()
    }

    pub fn tracked(&self) -> usize {
        self.guards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMessage {
    pub summary: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub state: CommitState,
    pub result: TransactionResult,
    pub message: Option<UserMessage>,
}

impl CommitOutcome {
    fn nothing_to_commit() -> Self {
        Self {
            state: CommitState::NothingToCommit,
            result: TransactionResult::default(),
            message: None,
        }
    }

    fn from_result(result: TransactionResult) -> Self {
        let state = if result.has_failures() {
            CommitState::RolledBack
        } else {
            CommitState::Committed
        };
        let message = failure_message(&result);
        Self {
            state,
            result,
            message,
        }
    }

    fn access_denied(layer: &LayerId, detail: String) -> Self {
        Self {
            state: CommitState::RolledBack,
            result: TransactionResult::default(),
            message: Some(UserMessage {
                summary: format!(
                    "Layer {layer} is locked by another process or cannot be written. No edits were saved."
                ),
                detail: Some(detail),
            }),
        }
    }
}

fn failure_message(result: &TransactionResult) -> Option<UserMessage> {
    let mut failures = result.failure_reasons.iter();
    match (failures.next(), failures.next()) {
        (None, _) => None,
        (Some((feature_id, reason)), None) => Some(UserMessage {
            summary: format!(
                "Feature {feature_id} was not saved: {}",
                reason.message
            ),
            detail: None,
        }),
        _ => {
            let detail = result
                .failure_reasons
                .iter()
                .map(|(feature_id, reason)| {
                    format!("{feature_id}: [{}] {}", reason.kind, reason.message)
                })
                .collect::<Vec<_>>()
                .join("\n");
            Some(UserMessage {
                summary: format!(
                    "Many errors occurred while saving; {} features were not saved.",
                    result.failure_reasons.len()
                ),
                detail: Some(detail),
            })
        }
    }
}

/// Writes the pending edits of an [`EditBuffer`] to a [`FeatureLayer`] in a
/// single transaction, undoing the edits of every feature that fails.
pub struct TransactionCoordinator {
    locks: Arc<LayerLocks>,
    validator: ValueValidator,
    notifier: Arc<dyn MapNotifier>,
}

impl TransactionCoordinator {
    pub fn new(
        locks: Arc<LayerLocks>,
        validator: ValueValidator,
        notifier: Arc<dyn MapNotifier>,
    ) -> Self {
        Self {
            locks,
            validator,
            notifier,
        }
    }

    /// Runs one commit attempt. Whatever happens after the lock is taken,
    /// the layer is closed and left read-only and the buffer is cleared
    /// before this returns.
    pub fn commit(
        &self,
        layer: &mut dyn FeatureLayer,
        buffer: &mut EditBuffer,
        cells: &mut dyn CellSink,
    ) -> Result<CommitOutcome, CommitError> {
        if buffer.is_empty() {
            debug!(layer = %layer.id(), "no pending edits to commit");
            return Ok(CommitOutcome::nothing_to_commit());
        }

        let layer_id = layer.id().clone();
        let guard = self.locks.guard_for(&layer_id);
        let _held = guard.lock().unwrap_or_else(PoisonError::into_inner);
        info!(
            layer = %layer_id,
            edits = buffer.len(),
            features = buffer.feature_ids().len(),
            "committing attribute edits"
        );
        self.notifier.close_overlays(&layer_id);

        let attempt = self.apply_and_commit(layer, buffer, cells);
        if let Err(err) = finalize(layer) {
            warn!(layer = %layer_id, error = %err, "failed to restore layer after commit");
        }

        let outcome = match attempt {
            Ok(outcome) => outcome,
            Err(LayerError::AccessDenied(detail)) => {
                let undone = buffer.undo_all(cells);
                warn!(layer = %layer_id, undone, %detail, "commit aborted, layer not writable");
                CommitOutcome::access_denied(&layer_id, detail)
            }
            Err(err) => {
                buffer.clear();
                warn!(layer = %layer_id, error = %err, "commit failed");
                return Err(err.into());
            }
        };
        buffer.clear();

        if outcome.result.total_success > 0 {
            self.notifier.layer_changed(&layer_id);
        }
        info!(
            layer = %layer_id,
            state = ?outcome.state,
            success = outcome.result.total_success,
            failure = outcome.result.total_failure,
            "commit finished"
        );
        Ok(outcome)
    }

    fn apply_and_commit(
        &self,
        layer: &mut dyn FeatureLayer,
        buffer: &mut EditBuffer,
        cells: &mut dyn CellSink,
    ) -> Result<CommitOutcome, LayerError> {
        if layer.is_open() {
            layer.close()?;
        }
        layer.set_mode(LayerMode::ReadWrite)?;
        layer.open()?;

        let columns = layer.columns()?;
        let mut fetched: HashMap<FeatureId, Feature> = layer
            .features_by_ids(&buffer.feature_ids())?
            .into_iter()
            .map(|feature| (feature.id.clone(), feature))
            .collect();

        let groups: Vec<(FeatureId, Vec<(String, String)>)> = buffer
            .grouped_by_feature()
            .into_iter()
            .map(|(feature_id, records)| {
                let edits = records
                    .into_iter()
                    .map(|record| (record.column().to_string(), record.new_value.clone()))
                    .collect();
                (feature_id, edits)
            })
            .collect();

        let mut result = TransactionResult::default();
        let mut to_write = Vec::new();
        for (feature_id, edits) in groups {
            let Some(mut feature) = fetched.remove(&feature_id) else {
                buffer.undo_feature(&feature_id, cells);
                let message = format!("feature {feature_id} no longer exists in {}", layer.id());
                result.record_failure(
                    feature_id,
                    FailureReason::new(FailureKind::MissingFeature, message),
                );
                continue;
            };

            for (column, value) in &edits {
                feature.set_value(column, value);
            }

            let invalid = self.validator.validate_feature(&feature, &columns);
            if !invalid.is_empty() {
                debug!(feature = %feature_id, columns = ?invalid, "rejecting invalid values");
                buffer.undo_feature(&feature_id, cells);
                let message = format!("invalid value for column {}", invalid.join(", "));
                result.record_failure(
                    feature_id,
                    FailureReason::new(FailureKind::InvalidValue, message),
                );
                continue;
            }
            to_write.push(feature);
        }

        if !to_write.is_empty() {
            layer.begin_transaction()?;
            for feature in to_write {
                layer.update(feature)?;
            }
            let stored = layer.commit_transaction()?;
            for feature_id in stored.failure_reasons.keys() {
                buffer.undo_feature(feature_id, cells);
            }
            result.merge(stored);
        }

        Ok(CommitOutcome::from_result(result))
    }
}

fn finalize(layer: &mut dyn FeatureLayer) -> Result<(), LayerError> {
    let closed = if layer.is_open() { layer.close() } else { Ok(()) };
    let restored = layer.set_mode(LayerMode::ReadOnly);
    closed.and(restored)
}
