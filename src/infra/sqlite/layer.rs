use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, ErrorCode};
use tracing::debug;

use crate::domain::entities::column::ColumnDescriptor;
use crate::domain::entities::layer::{Feature, FeatureId, LayerId, LayerMode};
use crate::domain::entities::transaction::{FailureKind, FailureReason, TransactionResult};
use crate::infra::sqlite::queries::{
    count_features, find_layer_key, load_columns, load_feature_page, load_features,
    write_feature,
};
use crate::infra::sqlite::schema::open_connection_with_mode;
use crate::usecase::ports::layer::{FeatureLayer, LayerError, RowSource};

/// Maps an infra error onto the port error. SQLite lock and permission
/// failures become [`LayerError::AccessDenied`].
fn to_layer_error(err: anyhow::Error) -> LayerError {
    let denied = err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(failure, _)) if matches!(
                failure.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::ReadOnly
                    | ErrorCode::CannotOpen
                    | ErrorCode::PermissionDenied
            )
        )
    });
    if denied {
        LayerError::AccessDenied(format!("{err:#}"))
    } else {
        LayerError::Message(format!("{err:#}"))
    }
}

fn layer_id_for(db_path: &Path, name: &str) -> LayerId {
    LayerId(format!("{}::{name}", db_path.display()))
}

struct OpenLayer {
    conn: Connection,
    layer_key: i64,
}

/// One named layer of an attribute database created by the CSV import or
/// [`crate::infra::sqlite::queries::create_layer`].
pub struct SqliteFeatureLayer {
    db_path: PathBuf,
    name: String,
    id: LayerId,
    mode: LayerMode,
    open: Option<OpenLayer>,
    pending: Option<Vec<Feature>>,
}

impl SqliteFeatureLayer {
    pub fn new(db_path: &Path, name: &str) -> Self {
        Self {
            db_path: db_path.to_path_buf(),
            name: name.to_string(),
            id: layer_id_for(db_path, name),
            mode: LayerMode::ReadOnly,
            open: None,
            pending: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn opened(&self) -> Result<&OpenLayer, LayerError> {
        self.open
            .as_ref()
            .ok_or_else(|| LayerError::InvalidState(format!("layer {} is not open", self.id)))
    }
}

impl FeatureLayer for SqliteFeatureLayer {
    fn id(&self) -> &LayerId {
        &self.id
    }

    fn mode(&self) -> LayerMode {
        self.mode
    }

    fn set_mode(&mut self, mode: LayerMode) -> Result<(), LayerError> {
        if self.open.is_some() {
            return Err(LayerError::InvalidState(format!(
                "layer {} must be closed to change mode",
                self.id
            )));
        }
        self.mode = mode;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.is_some()
    }

    fn open(&mut self) -> Result<(), LayerError> {
        if self.open.is_some() {
            return Ok(());
        }
        let conn = open_connection_with_mode(&self.db_path, self.mode).map_err(to_layer_error)?;
        conn.busy_timeout(Duration::ZERO)
            .map_err(|err| to_layer_error(err.into()))?;
        let layer_key = find_layer_key(&conn, &self.name)
            .map_err(to_layer_error)?
            .ok_or_else(|| LayerError::NotFound(format!("layer {}", self.name)))?;
        debug!(layer = %self.id, mode = ?self.mode, "sqlite layer opened");
        self.open = Some(OpenLayer { conn, layer_key });
        Ok(())
    }

    fn close(&mut self) -> Result<(), LayerError> {
        if self.pending.take().is_some() {
            debug!(layer = %self.id, "discarding uncommitted transaction on close");
        }
        if let Some(open) = self.open.take() {
            open.conn
                .close()
                .map_err(|(_, err)| to_layer_error(err.into()))?;
            debug!(layer = %self.id, "sqlite layer closed");
        }
        Ok(())
    }

    fn columns(&self) -> Result<Vec<ColumnDescriptor>, LayerError> {
        let open = self.opened()?;
        load_columns(&open.conn, open.layer_key).map_err(to_layer_error)
    }

    fn features_by_ids(&self, ids: &[FeatureId]) -> Result<Vec<Feature>, LayerError> {
        let open = self.opened()?;
        let columns = load_columns(&open.conn, open.layer_key).map_err(to_layer_error)?;
        load_features(&open.conn, open.layer_key, &columns, Some(ids)).map_err(to_layer_error)
    }

    fn all_features(&self) -> Result<Vec<Feature>, LayerError> {
        let open = self.opened()?;
        let columns = load_columns(&open.conn, open.layer_key).map_err(to_layer_error)?;
        load_features(&open.conn, open.layer_key, &columns, None).map_err(to_layer_error)
    }

    fn begin_transaction(&mut self) -> Result<(), LayerError> {
        self.opened()?;
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
        let layer_id = self.id.clone();
        let open = self
            .open
            .as_mut()
            .ok_or_else(|| LayerError::InvalidState(format!("layer {layer_id} is not open")))?;
        let layer_key = open.layer_key;
        let columns = load_columns(&open.conn, layer_key).map_err(to_layer_error)?;

        let tx = open
            .conn
            .transaction()
            .map_err(|err| to_layer_error(err.into()))?;
        let mut result = TransactionResult::default();
        for feature in &pending {
            if let Some(column) = columns
                .iter()
                .find(|column| column.exceeds_width(feature.value(&column.name)))
            {
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
            if write_feature(&tx, layer_key, &columns, feature).map_err(to_layer_error)? {
                result.record_success();
            } else {
                result.record_failure(
                    feature.id.clone(),
                    FailureReason::new(
                        FailureKind::MissingFeature,
                        format!("feature {} does not exist", feature.id),
                    ),
                );
            }
        }
        tx.commit().map_err(|err| to_layer_error(err.into()))?;

        debug!(
            layer = %layer_id,
            success = result.total_success,
            failure = result.total_failure,
            "sqlite transaction committed"
        );
        Ok(result)
    }
}

/// Read-only row access for background paging; opens its own connection per
/// call so it can live on a worker thread.
#[derive(Debug, Clone)]
pub struct SqliteRowSource {
    db_path: PathBuf,
    name: String,
}

impl SqliteRowSource {
    pub fn new(db_path: &Path, name: &str) -> Self {
        Self {
            db_path: db_path.to_path_buf(),
            name: name.to_string(),
        }
    }

    fn connect(&self) -> Result<(Connection, i64), LayerError> {
        let conn = open_connection_with_mode(&self.db_path, LayerMode::ReadOnly)
            .map_err(to_layer_error)?;
        let layer_key = find_layer_key(&conn, &self.name)
            .map_err(to_layer_error)?
            .ok_or_else(|| LayerError::NotFound(format!("layer {}", self.name)))?;
        Ok((conn, layer_key))
    }
}

impl RowSource for SqliteRowSource {
    fn total_rows(&self) -> Result<usize, LayerError> {
        let (conn, layer_key) = self.connect()?;
        count_features(&conn, layer_key).map_err(to_layer_error)
    }

    fn fetch_rows(&self, offset: usize, limit: usize) -> Result<Vec<Feature>, LayerError> {
        let (conn, layer_key) = self.connect()?;
        let columns = load_columns(&conn, layer_key).map_err(to_layer_error)?;
        load_feature_page(&conn, layer_key, &columns, offset, limit).map_err(to_layer_error)
    }
}
