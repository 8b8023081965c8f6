use thiserror::Error;

use crate::domain::entities::column::ColumnDescriptor;
use crate::domain::entities::edit::CellKey;
use crate::domain::entities::layer::{Feature, FeatureId, LayerId, LayerMode};
use crate::domain::entities::transaction::TransactionResult;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayerError {
    /// The backing file is locked by another process or not writable.
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("invalid layer state: {0}")]
    InvalidState(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Message(String),
}

impl LayerError {
    pub fn is_access_denied(&self) -> bool {
        matches!(self, LayerError::AccessDenied(_))
    }
}

/// A data source of features with a begin/update/commit write path.
///
/// Writes require the layer to be switched to [`LayerMode::ReadWrite`] while
/// closed and then opened. `close` discards an uncommitted transaction.
pub trait FeatureLayer {
    fn id(&self) -> &LayerId;

    fn mode(&self) -> LayerMode;
    fn set_mode(&mut self, mode: LayerMode) -> Result<(), LayerError>;

    fn is_open(&self) -> bool;
    fn open(&mut self) -> Result<(), LayerError>;
    fn close(&mut self) -> Result<(), LayerError>;

    fn columns(&self) -> Result<Vec<ColumnDescriptor>, LayerError>;
    /// Ids the layer does not know are left out of the result.
    fn features_by_ids(&self, ids: &[FeatureId]) -> Result<Vec<Feature>, LayerError>;
    fn all_features(&self) -> Result<Vec<Feature>, LayerError>;

    fn begin_transaction(&mut self) -> Result<(), LayerError>;
    fn update(&mut self, feature: Feature) -> Result<(), LayerError>;
    fn commit_transaction(&mut self) -> Result<TransactionResult, LayerError>;
}

/// Read access used by background row paging; must be shareable with a
/// worker thread.
pub trait RowSource: Send + Sync {
    fn total_rows(&self) -> Result<usize, LayerError>;
    fn fetch_rows(&self, offset: usize, limit: usize) -> Result<Vec<Feature>, LayerError>;
}

/// Whatever displays cell values; undo writes the restored value through it.
pub trait CellSink {
    fn set_cell(&mut self, cell: &CellKey, value: &str);
}

/// Hooks into the map view that renders a layer.
pub trait MapNotifier: Send + Sync {
    fn close_overlays(&self, _layer: &LayerId) {}
    fn layer_changed(&self, _layer: &LayerId) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl MapNotifier for NoopNotifier {}
