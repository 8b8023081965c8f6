use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags};

use crate::domain::entities::layer::LayerMode;

pub fn open_connection(db_path: &Path) -> Result<Connection> {
    open_connection_with_mode(db_path, LayerMode::ReadWrite)
}

/// Read-only connections are opened with `SQLITE_OPEN_READ_ONLY`, so any
/// write through them fails at the SQLite level.
pub fn open_connection_with_mode(db_path: &Path, mode: LayerMode) -> Result<Connection> {
    let flags = match mode {
        LayerMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        LayerMode::ReadWrite => OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    };
    let conn = Connection::open_with_flags(db_path, flags)
        .with_context(|| format!("failed to open db: {}", db_path.display()))?;
    conn.execute_batch("PRAGMA foreign_keys = ON")
        .context("failed to enable foreign key enforcement")?;
    Ok(conn)
}

pub fn init_db(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent dir: {}", parent.display()))?;
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("failed to open db: {}", db_path.display()))?;

    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS layer (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            name          TEXT NOT NULL UNIQUE,
            source_path   TEXT NOT NULL,
            feature_count INTEGER NOT NULL,
            imported_at   TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS column_def (
            layer_id    INTEGER NOT NULL,
            col_idx     INTEGER NOT NULL,
            name        TEXT NOT NULL,
            column_type TEXT NOT NULL,
            max_length  INTEGER NOT NULL,
            decimals    INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (layer_id, col_idx),
            FOREIGN KEY (layer_id) REFERENCES layer(id)
        );

        CREATE TABLE IF NOT EXISTS feature (
            layer_id    INTEGER NOT NULL,
            feature_id  TEXT NOT NULL,
            row_idx     INTEGER NOT NULL,
            wkt         TEXT,
            PRIMARY KEY (layer_id, feature_id),
            FOREIGN KEY (layer_id) REFERENCES layer(id)
        );

        CREATE TABLE IF NOT EXISTS attribute (
            layer_id    INTEGER NOT NULL,
            feature_id  TEXT NOT NULL,
            col_idx     INTEGER NOT NULL,
            value       TEXT NOT NULL,
            PRIMARY KEY (layer_id, feature_id, col_idx),
            FOREIGN KEY (layer_id, feature_id) REFERENCES feature(layer_id, feature_id)
        );

        CREATE INDEX IF NOT EXISTS idx_feature_layer_row
            ON feature(layer_id, row_idx);
        ",
    )
    .context("failed to initialize schema")?;

    Ok(())
}
