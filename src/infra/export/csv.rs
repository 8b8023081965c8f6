use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::domain::entities::layer::LayerMode;
use crate::infra::export::sidecar::{encoding_for_code_page, write_cpg, write_prj};
use crate::infra::export::ExportError;
use crate::infra::import::csv::GEOMETRY_COLUMN;
use crate::usecase::ports::layer::FeatureLayer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub code_page: u32,
    /// Projection text for the `.prj` sidecar; none is written without it.
    pub projection_wkt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub data_path: PathBuf,
    pub cpg_path: PathBuf,
    pub prj_path: Option<PathBuf>,
    pub feature_count: usize,
}

/// Writes every feature of `layer` to a CSV file plus its sidecars. The
/// layer is opened read-only for the duration if it was closed.
pub fn export_layer_csv(
    layer: &mut dyn FeatureLayer,
    path: &Path,
    options: &ExportOptions,
) -> Result<ExportSummary, ExportError> {
    let encoding = encoding_for_code_page(options.code_page)
        .ok_or(ExportError::UnsupportedCodePage(options.code_page))?;

    let opened_here = !layer.is_open();
    if opened_here {
        layer.set_mode(LayerMode::ReadOnly)?;
        layer.open()?;
    }
    let read = layer
        .columns()
        .and_then(|columns| layer.all_features().map(|features| (columns, features)));
    if opened_here {
        layer.close()?;
    }
    let (columns, features) = read?;

    let with_geometry = features.iter().any(|feature| feature.geometry_wkt.is_some());
    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header: Vec<&str> = Vec::new();
    if with_geometry {
        header.push(GEOMETRY_COLUMN);
    }
    header.extend(columns.iter().map(|column| column.name.as_str()));
    writer.write_record(&header)?;

    for feature in &features {
        let mut record: Vec<&str> = Vec::with_capacity(header.len());
        if with_geometry {
            record.push(feature.geometry_wkt.as_deref().unwrap_or(""));
        }
        record.extend(columns.iter().map(|column| feature.value(&column.name)));
        writer.write_record(&record)?;
    }

    let text = writer
        .into_inner()
        .map_err(|err| ExportError::Csv(err.into_error().into()))?;
    let text = String::from_utf8(text).map_err(|_| ExportError::NotUtf8)?;
    let (bytes, _, had_errors) = encoding.encode(&text);
    if had_errors {
        warn!(
            code_page = options.code_page,
            "some characters are not representable and were replaced"
        );
    }
    fs::write(path, &bytes).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let cpg_path = write_cpg(path, options.code_page)?;
    let prj_path = match options.projection_wkt.as_deref() {
        Some(wkt) => Some(write_prj(path, wkt)?),
        None => None,
    };

    info!(
        layer = %layer.id(),
        path = %path.display(),
        features = features.len(),
        "exported layer to csv"
    );
    Ok(ExportSummary {
        data_path: path.to_path_buf(),
        cpg_path,
        prj_path,
        feature_count: features.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::column::ColumnDescriptor;
    use crate::domain::entities::layer::Feature;
    use crate::infra::memory::InMemoryFeatureLayer;

    fn layer() -> InMemoryFeatureLayer {
        InMemoryFeatureLayer::new(
            "towns",
            vec![
                ColumnDescriptor::character("NAME", 20),
                ColumnDescriptor::numeric("POP", 8),
            ],
        )
        .with_features([
            Feature::new("1")
                .with_value("NAME", "Tromsø")
                .with_value("POP", "77000")
                .with_geometry("POINT (18.95 69.65)"),
            Feature::new("2").with_value("NAME", "Alta"),
        ])
    }

    #[test]
    fn writes_data_and_sidecars() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("towns.csv");
        let mut layer = layer();

        let summary = export_layer_csv(
            &mut layer,
            &path,
            &ExportOptions {
                code_page: 65001,
                projection_wkt: Some("GEOGCS[\"WGS 84\"]".to_string()),
            },
        )
        .expect("export");

        assert_eq!(summary.feature_count, 2);
        let text = fs::read_to_string(&path).expect("read csv");
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("WKT,NAME,POP"));
        assert_eq!(lines.next(), Some("POINT (18.95 69.65),Tromsø,77000"));
        assert_eq!(lines.next(), Some(",Alta,"));
        assert_eq!(fs::read_to_string(&summary.cpg_path).expect("cpg"), "65001");
        let prj = summary.prj_path.expect("prj written");
        assert_eq!(fs::read_to_string(prj).expect("prj"), "GEOGCS[\"WGS 84\"]");
        assert!(!layer.is_open());
    }

    #[test]
    fn encodes_in_the_requested_code_page() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("towns.csv");
        let mut layer = layer();

        let summary = export_layer_csv(
            &mut layer,
            &path,
            &ExportOptions {
                code_page: 1252,
                projection_wkt: None,
            },
        )
        .expect("export");

        let bytes = fs::read(&path).expect("read csv");
        assert!(bytes.windows(2).any(|pair| pair == [b's', 0xF8]));
        assert_eq!(summary.prj_path, None);
    }

    #[test]
    fn unsupported_code_page_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut layer = layer();

        let result = export_layer_csv(
            &mut layer,
            &dir.path().join("towns.csv"),
            &ExportOptions {
                code_page: 4242,
                projection_wkt: None,
            },
        );

        assert!(matches!(result, Err(ExportError::UnsupportedCodePage(4242))));
    }
}
