use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use proptest::prelude::*;
use rusqlite::Connection;

use crate::domain::entities::column::ColumnDescriptor;
use crate::domain::entities::layer::{Feature, FeatureId, LayerMode};
use crate::domain::entities::transaction::{CommitState, FailureKind};
use crate::domain::validation::ValidationOptions;
use crate::infra::export::sidecar::read_cpg;
use crate::infra::sqlite::queries::create_layer;
use crate::infra::sqlite::schema::init_db;
use crate::session::AppSession;
use crate::settings::SessionSettings;
use crate::ui::state::grid::AttributeGrid;
use crate::usecase::edit_buffer::EditBuffer;
use crate::usecase::ports::layer::{FeatureLayer, LayerError};
use crate::usecase::services::layer_service::LayerService;

fn unique_test_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be after epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("attribute-editor-{prefix}-{nanos}"))
}

fn city_columns() -> Vec<ColumnDescriptor> {
    vec![
        ColumnDescriptor::character("NAME", 10),
        ColumnDescriptor::numeric("POP", 8),
        ColumnDescriptor::date("FOUNDED"),
        ColumnDescriptor::logical("CAPITAL"),
    ]
}

fn city_features() -> Vec<Feature> {
    vec![
        Feature::new("1")
            .with_value("NAME", "Oslo")
            .with_value("POP", "700000")
            .with_value("FOUNDED", "10480101")
            .with_value("CAPITAL", "T")
            .with_geometry("POINT (10.75 59.91)"),
        Feature::new("2")
            .with_value("NAME", "Bergen")
            .with_value("POP", "285000")
            .with_value("FOUNDED", "10700101")
            .with_value("CAPITAL", "F"),
        Feature::new("3")
            .with_value("NAME", "Trondheim")
            .with_value("POP", "210000")
            .with_value("FOUNDED", "09970101")
            .with_value("CAPITAL", "F"),
    ]
}

/// Creates a database holding the `cities` layer; returns the temp dir and db path.
fn seed_city_layer(prefix: &str) -> (PathBuf, PathBuf) {
    let temp_dir = unique_test_dir(prefix);
    fs::create_dir_all(&temp_dir).expect("should create temp dir");
    let db_path = temp_dir.join("attributes.sqlite");
    create_layer(&db_path, "cities", "cities.shp", &city_columns(), &city_features())
        .expect("layer should be created");
    (temp_dir, db_path)
}

fn load_grid(layer: &mut dyn FeatureLayer) -> AttributeGrid {
    layer.open().expect("layer should open");
    let columns = layer.columns().expect("columns should load");
    let features = layer.all_features().expect("features should load");
    layer.close().expect("layer should close");
    AttributeGrid::from_features(columns, &features)
}

fn stored_feature(layer: &mut dyn FeatureLayer, id: &str) -> Feature {
    layer.open().expect("layer should open");
    let feature = layer
        .features_by_ids(&[FeatureId::from(id)])
        .expect("feature query should succeed")
        .pop()
        .expect("feature should exist");
    layer.close().expect("layer should close");
    feature
}

#[test]
fn logging_can_be_initialized_twice() {
    crate::logging::init_logging();
    crate::logging::init_logging();
    tracing::warn!("logging initialized");
}

#[test]
fn init_db_creates_required_tables() {
    let temp_dir = unique_test_dir("init-db");
    fs::create_dir_all(&temp_dir).expect("should create temp dir");
    let db_path = temp_dir.join("attributes.sqlite");

    let result = init_db(&db_path);

    assert!(result.is_ok(), "init_db should succeed: {result:?}");

    let conn = Connection::open(&db_path).expect("should open sqlite db");
    let table_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('layer','column_def','feature','attribute')",
            [],
            |row| row.get(0),
        )
        .expect("table count query should succeed");

    assert_eq!(table_count, 4, "required tables should exist");

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn import_creates_layer_with_inferred_columns_and_geometry() {
    let temp_dir = unique_test_dir("import-csv");
    fs::create_dir_all(&temp_dir).expect("should create temp dir");
    let db_path = temp_dir.join("attributes.sqlite");
    let csv_path = temp_dir.join("towns.csv");
    fs::write(
        &csv_path,
        "NAME,POP,AREA,WKT\nTromso,77000,2520.8,POINT (18.95 69.65)\nAlta,21000,3849.4,\n",
    )
    .expect("should write csv fixture");
    let service = LayerService::new(db_path.clone());

    let imported = service.import_csv(&csv_path, None).expect("import should succeed");

    assert_eq!(imported.layer_name, "towns");
    assert_eq!(imported.feature_count, 2);

    let mut layer = service.layer("towns");
    layer.open().expect("layer should open");
    let columns = layer.columns().expect("columns should load");
    let names: Vec<_> = columns.iter().map(|column| column.name.as_str()).collect();
    assert_eq!(names, vec!["NAME", "POP", "AREA"]);
    assert_eq!(columns[1].column_type, crate::ColumnType::Numeric);
    assert_eq!(columns[2].column_type, crate::ColumnType::Float);

    let features = layer.all_features().expect("features should load");
    assert_eq!(features[0].id, FeatureId::from("1"));
    assert_eq!(features[0].geometry_wkt.as_deref(), Some("POINT (18.95 69.65)"));
    assert_eq!(features[1].geometry_wkt, None);
    assert_eq!(features[1].value("NAME"), "Alta");
    layer.close().expect("layer should close");

    let layers = service.list_layers().expect("layers should list");
    assert_eq!(layers.len(), 1);
    assert_eq!(layers[0].feature_count, 2);

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn delete_layer_removes_related_records() {
    let (temp_dir, db_path) = seed_city_layer("delete-layer");
    let service = LayerService::new(db_path.clone());

    service.delete_layer("cities").expect("delete should succeed");

    assert!(service.list_layers().expect("layers should list").is_empty());
    let conn = Connection::open(&db_path).expect("should open sqlite db");
    let attribute_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM attribute", [], |row| row.get(0))
        .expect("attribute count query should succeed");
    assert_eq!(attribute_count, 0);
    assert!(service.delete_layer("cities").is_err());

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn unknown_layer_fails_to_open() {
    let (temp_dir, db_path) = seed_city_layer("unknown-layer");
    let mut layer = LayerService::new(db_path).layer("rivers");

    assert!(matches!(layer.open(), Err(LayerError::NotFound(_))));

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn read_only_sqlite_layer_refuses_transactions() {
    let (temp_dir, db_path) = seed_city_layer("read-only");
    let mut layer = LayerService::new(db_path).layer("cities");

    layer.open().expect("layer should open");

    assert_eq!(layer.mode(), LayerMode::ReadOnly);
    assert!(matches!(
        layer.begin_transaction(),
        Err(LayerError::InvalidState(_))
    ));
    assert!(layer.set_mode(LayerMode::ReadWrite).is_err());
    layer.close().expect("layer should close");

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn sqlite_commit_keeps_good_features_and_rolls_back_bad_ones() {
    let (temp_dir, db_path) = seed_city_layer("sqlite-commit");
    let session = AppSession::default();
    let mut layer = LayerService::new(db_path).layer("cities");
    let mut grid = load_grid(&mut layer);
    let mut buffer = EditBuffer::new();

    grid.edit_cell(0, "FOUNDED", "20230615", &mut buffer).expect("edit");
    grid.edit_cell(0, "CAPITAL", "yes", &mut buffer).expect("edit");
    grid.edit_cell(1, "CAPITAL", "?", &mut buffer).expect("edit");
    grid.edit_cell(2, "NAME", "Nidaros of old", &mut buffer).expect("edit");

    let outcome = session
        .coordinator()
        .commit(&mut layer, &mut buffer, &mut grid)
        .expect("commit should run");

    assert_eq!(outcome.state, CommitState::RolledBack);
    assert_eq!(outcome.result.total_success, 1);
    assert_eq!(outcome.result.total_failure, 2);
    assert_eq!(
        outcome.result.failure_reasons[&FeatureId::from("2")].kind,
        FailureKind::InvalidValue
    );
    assert_eq!(
        outcome.result.failure_reasons[&FeatureId::from("3")].kind,
        FailureKind::ValueTooLong
    );
    assert!(buffer.is_empty());
    assert!(!layer.is_open());
    assert_eq!(layer.mode(), LayerMode::ReadOnly);

    assert_eq!(grid.cell_value(1, "CAPITAL"), Ok("F"));
    assert_eq!(grid.cell_value(2, "NAME"), Ok("Trondheim"));

    let oslo = stored_feature(&mut layer, "1");
    assert_eq!(oslo.value("FOUNDED"), "20230615");
    assert_eq!(oslo.value("CAPITAL"), "yes");
    assert_eq!(oslo.geometry_wkt.as_deref(), Some("POINT (10.75 59.91)"));
    assert_eq!(stored_feature(&mut layer, "2").value("CAPITAL"), "F");
    assert_eq!(stored_feature(&mut layer, "3").value("NAME"), "Trondheim");

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn locked_database_aborts_commit_and_still_finalizes() {
    let (temp_dir, db_path) = seed_city_layer("locked");
    let mut layer = LayerService::new(db_path.clone()).layer("cities");
    let mut grid = load_grid(&mut layer);
    let mut buffer = EditBuffer::new();
    grid.edit_cell(0, "NAME", "Christiania", &mut buffer).expect("edit");
    grid.edit_cell(1, "POP", "1", &mut buffer).expect("edit");

    let holder = Connection::open(&db_path).expect("should open sqlite db");
    holder
        .execute_batch("BEGIN EXCLUSIVE")
        .expect("should take exclusive lock");

    let outcome = AppSession::default()
        .coordinator()
        .commit(&mut layer, &mut buffer, &mut grid)
        .expect("locked file is reported, not raised");

    holder.execute_batch("ROLLBACK").expect("should release lock");

    assert_eq!(outcome.state, CommitState::RolledBack);
    let message = outcome.message.expect("user message");
    assert!(message.summary.contains("locked"));
    assert!(buffer.is_empty());
    assert!(!layer.is_open());
    assert_eq!(layer.mode(), LayerMode::ReadOnly);
    assert_eq!(grid.cell_value(0, "NAME"), Ok("Oslo"));
    assert_eq!(grid.cell_value(1, "POP"), Ok("285000"));
    assert_eq!(stored_feature(&mut layer, "2").value("POP"), "285000");

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn strict_date_setting_reaches_the_coordinator() {
    let (temp_dir, db_path) = seed_city_layer("strict-dates");
    let mut settings = SessionSettings::default();
    settings.validation = ValidationOptions {
        strict_short_dates: true,
    };
    let session = AppSession::new(settings);
    let mut layer = LayerService::new(db_path).layer("cities");
    let mut grid = load_grid(&mut layer);
    let mut buffer = EditBuffer::new();
    grid.edit_cell(0, "FOUNDED", "1048", &mut buffer).expect("edit");

    let outcome = session
        .coordinator()
        .commit(&mut layer, &mut buffer, &mut grid)
        .expect("commit should run");

    assert_eq!(outcome.state, CommitState::RolledBack);
    assert_eq!(grid.cell_value(0, "FOUNDED"), Ok("10480101"));

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn pager_fills_grid_from_sqlite_layer() {
    let (temp_dir, db_path) = seed_city_layer("pager");
    let mut settings = SessionSettings::default();
    settings.page_size = 2;
    let session = AppSession::new(settings);
    let service = LayerService::new(db_path);
    let mut grid = AttributeGrid::new(city_columns());
    let mut pager = session.row_pager(service.row_source("cities"));

    while pager.request_more() {
        pager.wait(|page| {
            let page = page.expect("page should load");
            assert_eq!(page.total_rows, 3);
            grid.append_rows(&page.features);
        });
    }

    assert_eq!(grid.row_count(), 3);
    assert_eq!(grid.cell_value(2, "NAME"), Ok("Trondheim"));
    assert!(pager.is_exhausted());

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn export_writes_csv_and_code_page_sidecar() {
    let (temp_dir, db_path) = seed_city_layer("export");
    let session = AppSession::default();
    let service = LayerService::new(db_path);
    let out_path = temp_dir.join("cities.csv");

    let summary = service
        .export_csv("cities", &out_path, &session.export_options(None))
        .expect("export should succeed");

    assert_eq!(summary.feature_count, 3);
    assert_eq!(read_cpg(&out_path).expect("cpg should read"), Some(65001));
    let text = fs::read_to_string(&out_path).expect("csv should read");
    assert!(text.starts_with("WKT,NAME,POP,FOUNDED,CAPITAL"));
    assert!(text.contains(",Bergen,285000,10700101,F"));

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

fn small_grid() -> AttributeGrid {
    AttributeGrid::from_features(
        vec![
            ColumnDescriptor::character("NAME", 10),
            ColumnDescriptor::numeric("POP", 8),
        ],
        &[
            Feature::new("1").with_value("NAME", "a").with_value("POP", "1"),
            Feature::new("2").with_value("NAME", "b"),
            Feature::new("3").with_value("POP", "3"),
        ],
    )
}

proptest! {
    #[test]
    fn undoing_every_edit_restores_the_grid(
        steps in prop::collection::vec(
            (0u8..5, 0usize..3, 0usize..2, "[a-z0-9]{0,4}"),
            0..40,
        )
    ) {
        let mut grid = small_grid();
        let original = grid.rows().to_vec();
        let mut buffer = EditBuffer::new();

        for (action, row_idx, col_idx, value) in &steps {
            match action {
                0 | 1 => {
                    let column = grid.columns()[*col_idx].name.clone();
                    grid.edit_cell(*row_idx, &column, value, &mut buffer).expect("cell exists");
                }
                2 => {
                    buffer.undo_last(&mut grid);
                }
                3 => {
                    buffer.redo(&mut grid);
                }
                _ => {
                    let feature_id = grid.rows()[*row_idx].feature_id.clone();
                    buffer.undo_feature(&feature_id, &mut grid);
                }
            }
        }
        while buffer.undo_last(&mut grid).is_some() {}

        prop_assert_eq!(grid.rows(), original.as_slice());
        prop_assert!(!buffer.has_pending_changes());
    }

    #[test]
    fn commit_writes_each_touched_feature_once(
        edits in prop::collection::vec((0usize..3, "[0-9]{1,3}"), 1..20)
    ) {
        let columns = vec![ColumnDescriptor::numeric("POP", 8)];
        let features: Vec<Feature> = (1..=3)
            .map(|n| Feature::new(n.to_string()).with_value("POP", "0"))
            .collect();
        let mut layer = crate::infra::memory::InMemoryFeatureLayer::new("pop", columns.clone())
            .with_features(features.clone());
        let mut grid = AttributeGrid::from_features(columns, &features);
        let mut buffer = EditBuffer::new();

        for (row_idx, value) in &edits {
            grid.edit_cell(*row_idx, "POP", value, &mut buffer).expect("cell exists");
        }
        let touched = buffer.feature_ids().len();
        let expected = grid.rows().to_vec();

        let outcome = AppSession::default()
            .coordinator()
            .commit(&mut layer, &mut buffer, &mut grid)
            .expect("commit should run");

        if touched == 0 {
            prop_assert_eq!(outcome.state, CommitState::NothingToCommit);
        } else {
            prop_assert_eq!(outcome.state, CommitState::Committed);
            prop_assert_eq!(outcome.result.total_success, touched);
        }
        for row in &expected {
            let stored = layer.feature(&row.feature_id).map(|f| f.value("POP").to_string());
            prop_assert_eq!(stored, Some(row.values[0].clone()));
        }
    }
}
