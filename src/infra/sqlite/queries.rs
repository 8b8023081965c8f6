use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, types::Value, Connection, OptionalExtension, Transaction};

use crate::domain::entities::column::{ColumnDescriptor, ColumnType};
use crate::domain::entities::layer::{Feature, FeatureId, LayerMeta};
use crate::infra::sqlite::schema::{init_db, open_connection};

pub fn insert_columns(
    tx: &Transaction<'_>,
    layer_key: i64,
    columns: &[ColumnDescriptor],
) -> Result<()> {
    let mut insert_column = tx
        .prepare(
            "INSERT INTO column_def(layer_id, col_idx, name, column_type, max_length, decimals)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .context("failed to prepare column insert")?;

    for (col_idx, column) in columns.iter().enumerate() {
        insert_column
            .execute(params![
                layer_key,
                col_idx as i64,
                column.name,
                column.column_type.code().to_string(),
                column.max_length as i64,
                column.decimals as i64
            ])
            .with_context(|| format!("failed to insert column {}", column.name))?;
    }

    Ok(())
}

pub fn create_layer(
    db_path: &Path,
    name: &str,
    source_path: &str,
    columns: &[ColumnDescriptor],
    features: &[Feature],
) -> Result<i64> {
    init_db(db_path)?;
    let mut conn = open_connection(db_path)?;
    let tx = conn
        .transaction()
        .context("failed to start layer create transaction")?;

    tx.execute(
        "INSERT INTO layer(name, source_path, feature_count) VALUES (?1, ?2, ?3)",
        params![name, source_path, features.len() as i64],
    )
    .with_context(|| format!("failed to insert layer {name}"))?;
    let layer_key = tx.last_insert_rowid();

    insert_columns(&tx, layer_key, columns)?;

    {
        let mut insert_feature = tx
            .prepare(
                "INSERT INTO feature(layer_id, feature_id, row_idx, wkt) VALUES (?1, ?2, ?3, ?4)",
            )
            .context("failed to prepare feature insert")?;
        let mut insert_value = tx
            .prepare(
                "INSERT INTO attribute(layer_id, feature_id, col_idx, value) VALUES (?1, ?2, ?3, ?4)",
            )
            .context("failed to prepare attribute insert")?;

        for (row_idx, feature) in features.iter().enumerate() {
            insert_feature
                .execute(params![
                    layer_key,
                    feature.id.0,
                    row_idx as i64,
                    feature.geometry_wkt
                ])
                .with_context(|| format!("failed to insert feature {}", feature.id))?;
            for (col_idx, column) in columns.iter().enumerate() {
                insert_value
                    .execute(params![
                        layer_key,
                        feature.id.0,
                        col_idx as i64,
                        feature.value(&column.name)
                    ])
                    .context("failed to insert attribute")?;
            }
        }
    }

    tx.commit().context("failed to commit layer create")?;
    Ok(layer_key)
}

pub fn list_layers(db_path: &Path) -> Result<Vec<LayerMeta>> {
    init_db(db_path)?;
    let conn = open_connection(db_path)?;
    let mut stmt = conn
        .prepare(
            "SELECT name, source_path, feature_count
             FROM layer
             ORDER BY id ASC",
        )
        .context("failed to prepare layers query")?;

    let layers = stmt
        .query_map([], |row| {
            Ok(LayerMeta {
                name: row.get(0)?,
                source_path: row.get(1)?,
                feature_count: row.get(2)?,
            })
        })
        .context("failed to query layers")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to collect layers")?;

    Ok(layers)
}

pub fn delete_layer(db_path: &Path, name: &str) -> Result<()> {
    init_db(db_path)?;
    let mut conn = open_connection(db_path)?;
    let tx = conn
        .transaction()
        .context("failed to start delete transaction")?;
    let Some(layer_key) = find_layer_key(&tx, name)? else {
        anyhow::bail!("layer not found: {name}")
    };
    tx.execute("DELETE FROM attribute WHERE layer_id = ?1", params![layer_key])
        .with_context(|| format!("failed to delete attributes of layer {name}"))?;
    tx.execute("DELETE FROM feature WHERE layer_id = ?1", params![layer_key])
        .with_context(|| format!("failed to delete features of layer {name}"))?;
    tx.execute("DELETE FROM column_def WHERE layer_id = ?1", params![layer_key])
        .with_context(|| format!("failed to delete columns of layer {name}"))?;
    tx.execute("DELETE FROM layer WHERE id = ?1", params![layer_key])
        .with_context(|| format!("failed to delete layer {name}"))?;
    tx.commit().context("failed to commit delete transaction")?;
    Ok(())
}

pub fn find_layer_key(conn: &Connection, name: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM layer WHERE name = ?1",
        params![name],
        |row| row.get::<_, i64>(0),
    )
    .optional()
    .with_context(|| format!("failed to look up layer {name}"))
}

pub fn load_columns(conn: &Connection, layer_key: i64) -> Result<Vec<ColumnDescriptor>> {
    let mut stmt = conn
        .prepare(
            "SELECT name, column_type, max_length, decimals
             FROM column_def
             WHERE layer_id = ?1
             ORDER BY col_idx ASC",
        )
        .context("failed to prepare columns query")?;

    let rows = stmt
        .query_map([layer_key], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })
        .context("failed to query columns")?;

    let mut columns = Vec::new();
    for row in rows {
        let (name, column_type, max_length, decimals) =
            row.context("failed to read column row")?;
        let column_type = column_type
            .parse::<ColumnType>()
            .with_context(|| format!("column {name} has an unknown type"))?;
        columns.push(ColumnDescriptor {
            name,
            column_type,
            max_length: max_length.max(0) as usize,
            decimals: decimals.max(0) as usize,
        });
    }

    Ok(columns)
}

pub fn count_features(conn: &Connection, layer_key: i64) -> Result<usize> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM feature WHERE layer_id = ?1",
            [layer_key],
            |row| row.get(0),
        )
        .context("failed to count features")?;
    Ok(count.max(0) as usize)
}

/// Features in row order, optionally restricted to `ids`.
pub fn load_features(
    conn: &Connection,
    layer_key: i64,
    columns: &[ColumnDescriptor],
    ids: Option<&[FeatureId]>,
) -> Result<Vec<Feature>> {
    let mut sql = String::from("SELECT feature_id, wkt FROM feature WHERE layer_id = ?");
    let mut sql_params = vec![Value::Integer(layer_key)];
    if let Some(ids) = ids {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(",");
        sql.push_str(&format!(" AND feature_id IN ({placeholders})"));
        sql_params.extend(ids.iter().map(|id| Value::Text(id.0.clone())));
    }
    sql.push_str(" ORDER BY row_idx ASC");

    let features = query_features(conn, &sql, sql_params)?;
    hydrate_attributes(conn, layer_key, columns, features)
}

pub fn load_feature_page(
    conn: &Connection,
    layer_key: i64,
    columns: &[ColumnDescriptor],
    offset: usize,
    limit: usize,
) -> Result<Vec<Feature>> {
    let sql = "SELECT feature_id, wkt FROM feature WHERE layer_id = ?
               ORDER BY row_idx ASC LIMIT ? OFFSET ?";
    let sql_params = vec![
        Value::Integer(layer_key),
        Value::Integer(limit as i64),
        Value::Integer(offset as i64),
    ];
    let features = query_features(conn, sql, sql_params)?;
    hydrate_attributes(conn, layer_key, columns, features)
}

fn query_features(conn: &Connection, sql: &str, sql_params: Vec<Value>) -> Result<Vec<Feature>> {
    let mut stmt = conn
        .prepare(sql)
        .context("failed to prepare features query")?;
    let features = stmt
        .query_map(rusqlite::params_from_iter(sql_params), |row| {
            Ok(Feature {
                id: FeatureId(row.get(0)?),
                geometry_wkt: row.get(1)?,
                values: Default::default(),
            })
        })
        .context("failed to query features")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to collect features")?;
    Ok(features)
}

fn hydrate_attributes(
    conn: &Connection,
    layer_key: i64,
    columns: &[ColumnDescriptor],
    mut features: Vec<Feature>,
) -> Result<Vec<Feature>> {
    if features.is_empty() {
        return Ok(features);
    }

    let placeholders = vec!["?"; features.len()].join(",");
    let hydrate_sql = format!(
        "SELECT feature_id, col_idx, value
         FROM attribute
         WHERE layer_id = ? AND feature_id IN ({placeholders})"
    );
    let mut hydrate_params = vec![Value::Integer(layer_key)];
    hydrate_params.extend(features.iter().map(|f| Value::Text(f.id.0.clone())));

    let feature_pos: HashMap<String, usize> = features
        .iter()
        .enumerate()
        .map(|(idx, feature)| (feature.id.0.clone(), idx))
        .collect();

    let mut hydrate_stmt = conn
        .prepare(&hydrate_sql)
        .context("failed to prepare attribute hydration query")?;
    let mut rows = hydrate_stmt
        .query(rusqlite::params_from_iter(hydrate_params))
        .context("failed to run attribute hydration query")?;

    while let Some(row) = rows.next().context("failed to read attribute row")? {
        let feature_id: String = row.get(0).context("failed to read feature_id")?;
        let col_idx: i64 = row.get(1).context("failed to read col_idx")?;
        let value: String = row.get(2).context("failed to read value")?;

        let column = usize::try_from(col_idx)
            .ok()
            .and_then(|idx| columns.get(idx));
        if let (Some(&pos), Some(column)) = (feature_pos.get(&feature_id), column) {
            features[pos].values.insert(column.name.clone(), value);
        }
    }

    Ok(features)
}

/// Upserts every declared column of `feature`. Returns `false` when the
/// feature row does not exist.
pub fn write_feature(
    tx: &Transaction<'_>,
    layer_key: i64,
    columns: &[ColumnDescriptor],
    feature: &Feature,
) -> Result<bool> {
    let changed = tx
        .execute(
            "UPDATE feature SET wkt = COALESCE(?3, wkt) WHERE layer_id = ?1 AND feature_id = ?2",
            params![layer_key, feature.id.0, feature.geometry_wkt],
        )
        .with_context(|| format!("failed to update feature {}", feature.id))?;
    if changed == 0 {
        return Ok(false);
    }

    let mut upsert = tx
        .prepare_cached(
            "INSERT INTO attribute(layer_id, feature_id, col_idx, value)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(layer_id, feature_id, col_idx) DO UPDATE SET value = excluded.value",
        )
        .context("failed to prepare attribute upsert")?;
    for (col_idx, column) in columns.iter().enumerate() {
        upsert
            .execute(params![
                layer_key,
                feature.id.0,
                col_idx as i64,
                feature.value(&column.name)
            ])
            .with_context(|| format!("failed to write {} of feature {}", column.name, feature.id))?;
    }

    Ok(true)
}
