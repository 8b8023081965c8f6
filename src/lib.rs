pub mod domain;
pub mod infra;
pub mod logging;
pub mod session;
pub mod settings;
pub mod ui;
pub mod usecase;

pub use domain::entities::column::{ColumnDescriptor, ColumnType};
pub use domain::entities::edit::{CellKey, EditId, EditRecord};
pub use domain::entities::layer::{Feature, FeatureId, LayerId, LayerMode};
pub use domain::entities::transaction::{CommitState, FailureKind, TransactionResult};
pub use domain::validation::{ValidationOptions, ValueValidator};
pub use session::AppSession;
pub use ui::state::grid::AttributeGrid;
pub use usecase::edit_buffer::EditBuffer;
pub use usecase::ports::layer::{CellSink, FeatureLayer, LayerError, MapNotifier, RowSource};
pub use usecase::services::transaction_coordinator::{
    CommitError, CommitOutcome, TransactionCoordinator,
};

#[cfg(test)]
mod tests;
