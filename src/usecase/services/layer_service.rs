use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use crate::domain::entities::layer::LayerMeta;
use crate::infra::export::csv::{export_layer_csv, ExportOptions, ExportSummary};
use crate::infra::export::ExportError;
use crate::infra::import::csv::{import_csv_layer, ImportResult};
use crate::infra::sqlite::layer::{SqliteFeatureLayer, SqliteRowSource};
use crate::infra::sqlite::queries::{delete_layer, list_layers};
use crate::usecase::ports::layer::RowSource;

/// Entry point to the layers stored in one attribute database.
pub struct LayerService {
    db_path: PathBuf,
}

impl LayerService {
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn import_csv(&self, path: &Path, layer_name: Option<&str>) -> Result<ImportResult> {
        import_csv_layer(&self.db_path, path, layer_name)
    }

    pub fn list_layers(&self) -> Result<Vec<LayerMeta>> {
        list_layers(&self.db_path)
    }

    pub fn delete_layer(&self, name: &str) -> Result<()> {
        delete_layer(&self.db_path, name)
    }

    /// A closed, read-only handle on the named layer.
    pub fn layer(&self, name: &str) -> SqliteFeatureLayer {
        SqliteFeatureLayer::new(&self.db_path, name)
    }

    pub fn row_source(&self, name: &str) -> Arc<dyn RowSource> {
        Arc::new(SqliteRowSource::new(&self.db_path, name))
    }

    pub fn export_csv(
        &self,
        name: &str,
        path: &Path,
        options: &ExportOptions,
    ) -> Result<ExportSummary, ExportError> {
        let mut layer = self.layer(name);
        export_layer_csv(&mut layer, path, options)
    }
}
