use std::collections::BTreeMap;

use tracing::debug;

use crate::domain::entities::column::ColumnDescriptor;
use crate::domain::entities::layer::{Feature, FeatureId, LayerId, LayerMode};
use crate::domain::entities::transaction::{FailureKind, FailureReason, TransactionResult};
use crate::usecase::ports::layer::{FeatureLayer, LayerError};

/// Feature layer held entirely in memory. Enforces the same open/mode/
/// transaction rules as the file-backed layers.
#[derive(Debug, Clone)]
pub struct InMemoryFeatureLayer {
    id: LayerId,
    mode: LayerMode,
    open: bool,
    columns: Vec<ColumnDescriptor>,
    features: BTreeMap<FeatureId, Feature>,
    pending: Option<Vec<Feature>>,
}

impl InMemoryFeatureLayer {
    pub fn new(id: impl Into<LayerId>, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            id: id.into(),
            mode: LayerMode::ReadOnly,
            open: false,
            columns,
            features: BTreeMap::new(),
            pending: None,
        }
    }

    pub fn with_features(mut self, features: impl IntoIterator<Item = Feature>) -> Self {
        for feature in features {
            self.features.insert(feature.id.clone(), feature);
        }
        self
    }

    pub fn insert(&mut self, feature: Feature) {
        self.features.insert(feature.id.clone(), feature);
    }

    /// Stored state, bypassing the open check.
    pub fn feature(&self, id: &FeatureId) -> Option<&Feature> {
        self.features.get(id)
    }

    pub fn in_transaction(&self) -> bool {
        self.pending.is_some()
    }

    fn ensure_open(&self) -> Result<(), LayerError> {
        if self.open {
            Ok(())
        } else {
            Err(LayerError::InvalidState(format!("layer {} is not open", self.id)))
        }
    }

    fn oversized_column(&self, feature: &Feature) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|column| column.exceeds_width(feature.value(&column.name)))
    }
}

impl FeatureLayer for InMemoryFeatureLayer {
    fn id(&self) -> &LayerId {
        &self.id
    }

    fn mode(&self) -> LayerMode {
        self.mode
    }

    fn set_mode(&mut self, mode: LayerMode) -> Result<(), LayerError> {
        if self.open {
            return Err(LayerError::InvalidState(format!(
                "layer {} must be closed to change mode",
                self.id
            )));
        }
        self.mode = mode;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn open(&mut self) -> Result<(), LayerError> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), LayerError> {
        if self.pending.take().is_some() {
            debug!(layer = %self.id, "discarding uncommitted transaction on close");
        }
        self.open = false;
        Ok(())
    }

    fn columns(&self) -> Result<Vec<ColumnDescriptor>, LayerError> {
        self.ensure_open()?;
        Ok(self.columns.clone())
    }

    fn features_by_ids(&self, ids: &[FeatureId]) -> Result<Vec<Feature>, LayerError> {
        self.ensure_open()?;
        Ok(ids
            .iter()
            .filter_map(|id| self.features.get(id).cloned())
            .collect())
    }

    fn all_features(&self) -> Result<Vec<Feature>, LayerError> {
        self.ensure_open()?;
        Ok(self.features.values().cloned().collect())
    }

    fn begin_transaction(&mut self) -> Result<(), LayerError> {
        self.ensure_open()?;
        if self.mode != LayerMode::ReadWrite {
            return Err(LayerError::InvalidState(format!(
                "layer {} is read-only",
                self.id
            )));
        }
        if self.pending.is_some() {
            return Err(LayerError::InvalidState(format!(
                "layer {} already has a transaction",
                self.id
            )));
        }
        self.pending = Some(Vec::new());
        Ok(())
    }

    fn update(&mut self, feature: Feature) -> Result<(), LayerError> {
        match self.pending.as_mut() {
            Some(pending) => {
                pending.push(feature);
                Ok(())
            }
            None => Err(LayerError::InvalidState(format!(
                "layer {} has no open transaction",
                self.id
            ))),
        }
    }

    fn commit_transaction(&mut self) -> Result<TransactionResult, LayerError> {
        let pending = self.pending.take().ok_or_else(|| {
            LayerError::InvalidState(format!("layer {} has no open transaction", self.id))
        })?;

        let mut result = TransactionResult::default();
        for feature in pending {
            if !self.features.contains_key(&feature.id) {
                result.record_failure(
                    feature.id.clone(),
                    FailureReason::new(
                        FailureKind::MissingFeature,
                        format!("feature {} does not exist", feature.id),
                    ),
                );
                continue;
            }
            if let Some(column) = self.oversized_column(&feature) {
                let message = format!(
                    "value of column {} is longer than {} characters",
                    column.name, column.max_length
                );
                result.record_failure(
                    feature.id.clone(),
                    FailureReason::new(FailureKind::ValueTooLong, message),
                );
                continue;
            }
            self.features.insert(feature.id.clone(), feature);
            result.record_success();
        }
        debug!(
            layer = %self.id,
            success = result.total_success,
            failure = result.total_failure,
            "in-memory transaction committed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer() -> InMemoryFeatureLayer {
        InMemoryFeatureLayer::new("cities", vec![ColumnDescriptor::character("NAME", 5)])
            .with_features([Feature::new("1").with_value("NAME", "Oslo")])
    }

    #[test]
    fn reads_require_open_layer() {
        let layer = layer();
        assert!(matches!(
            layer.columns(),
            Err(LayerError::InvalidState(_))
        ));
    }

    #[test]
    fn read_only_layer_refuses_transactions() {
        let mut layer = layer();
        layer.open().expect("open");
        assert!(layer.begin_transaction().is_err());
        assert!(layer.set_mode(LayerMode::ReadWrite).is_err());
    }

    #[test]
    fn commit_rejects_values_wider_than_column() {
        let mut layer = layer();
        layer.set_mode(LayerMode::ReadWrite).expect("closed layer");
        layer.open().expect("open");
        layer.begin_transaction().expect("begin");
        layer
            .update(Feature::new("1").with_value("NAME", "Christiania"))
            .expect("update");

        let result = layer.commit_transaction().expect("commit");

        assert_eq!(result.total_failure, 1);
        assert_eq!(
            result.failure_reasons[&FeatureId::from("1")].kind,
            FailureKind::ValueTooLong
        );
        assert_eq!(layer.feature(&FeatureId::from("1")).map(|f| f.value("NAME")), Some("Oslo"));
    }

    #[test]
    fn close_discards_open_transaction() {
        let mut layer = layer();
        layer.set_mode(LayerMode::ReadWrite).expect("closed layer");
        layer.open().expect("open");
        layer.begin_transaction().expect("begin");
        layer
            .update(Feature::new("1").with_value("NAME", "Bod"))
            .expect("update");

        layer.close().expect("close");

        assert!(!layer.in_transaction());
        assert_eq!(layer.feature(&FeatureId::from("1")).map(|f| f.value("NAME")), Some("Oslo"));
    }
}
