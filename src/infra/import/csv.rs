use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::domain::entities::column::{ColumnDescriptor, ColumnType};
use crate::domain::entities::layer::Feature;
use crate::infra::sqlite::queries::create_layer;

/// Widest Character column a DBF table can hold.
pub const MAX_CHARACTER_WIDTH: usize = 254;
pub const GEOMETRY_COLUMN: &str = "WKT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportResult {
    pub layer_name: String,
    pub feature_count: usize,
}

/// Imports a CSV file as a new layer. Feature ids are the 1-based data row
/// numbers; a `WKT` column, if present, becomes the geometry.
pub fn import_csv_layer(
    db_path: &Path,
    csv_path: &Path,
    layer_name: Option<&str>,
) -> Result<ImportResult> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open csv: {}", csv_path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("failed to read headers from csv: {}", csv_path.display()))?
        .clone();

    if headers.is_empty() {
        anyhow::bail!("csv header is required")
    }

    let geometry_idx = headers
        .iter()
        .position(|name| name.eq_ignore_ascii_case(GEOMETRY_COLUMN));
    let attribute_names: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(idx, _)| Some(*idx) != geometry_idx)
        .map(|(idx, name)| (idx, name.to_string()))
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.context("failed to parse csv record")?;
        rows.push(record);
    }

    let columns: Vec<ColumnDescriptor> = attribute_names
        .iter()
        .map(|(idx, name)| {
            infer_column(name, rows.iter().map(|record| record.get(*idx).unwrap_or("")))
        })
        .collect();

    let features: Vec<Feature> = rows
        .iter()
        .enumerate()
        .map(|(row_idx, record)| {
            let mut feature = Feature::new((row_idx + 1).to_string());
            feature.geometry_wkt = geometry_idx
                .and_then(|idx| record.get(idx))
                .map(str::trim)
                .filter(|wkt| !wkt.is_empty())
                .map(str::to_string);
            for (idx, name) in &attribute_names {
                feature.set_value(name, record.get(*idx).unwrap_or("").trim());
            }
            feature
        })
        .collect();

    let layer_name = layer_name
        .map(str::to_string)
        .or_else(|| {
            csv_path
                .file_stem()
                .and_then(|name| name.to_str())
                .filter(|name| !name.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "layer".to_string());
    let source_path = csv_path.to_string_lossy().into_owned();

    create_layer(db_path, &layer_name, &source_path, &columns, &features)?;
    info!(layer = %layer_name, features = features.len(), "imported csv layer");

    Ok(ImportResult {
        layer_name,
        feature_count: features.len(),
    })
}

/// Integer-only data becomes Numeric, any-number data Float, everything else
/// Character. Widths are sized to the longest value.
pub fn infer_column<'a>(name: &str, values: impl Iterator<Item = &'a str>) -> ColumnDescriptor {
    let mut all_integer = true;
    let mut all_number = true;
    let mut width = 1;
    let mut decimals = 0;
    let mut saw_value = false;

    for value in values.map(str::trim).filter(|value| !value.is_empty()) {
        saw_value = true;
        width = width.max(value.chars().count());
        if value.parse::<i64>().is_err() {
            all_integer = false;
        }
        if value.parse::<f64>().is_err() {
            all_number = false;
        }
        if let Some((_, fraction)) = value.split_once('.') {
            decimals = decimals.max(fraction.len());
        }
    }

    if saw_value && all_integer {
        ColumnDescriptor::new(name, ColumnType::Numeric, width)
    } else if saw_value && all_number {
        ColumnDescriptor::float(name, width, decimals)
    } else {
        ColumnDescriptor::character(name, width.min(MAX_CHARACTER_WIDTH))
    }
}
