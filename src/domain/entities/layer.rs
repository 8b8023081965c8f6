use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub String);

impl From<&str> for LayerId {
    fn from(value: &str) -> Self {
        LayerId(value.to_string())
    }
}

impl From<String> for LayerId {
    fn from(value: String) -> Self {
        LayerId(value)
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(pub String);

impl From<&str> for FeatureId {
    fn from(value: &str) -> Self {
        FeatureId(value.to_string())
    }
}

impl From<String> for FeatureId {
    fn from(value: String) -> Self {
        FeatureId(value)
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayerMode {
    #[default]
    ReadOnly,
    ReadWrite,
}

/// A single record of a feature layer: optional geometry plus attribute
/// values keyed by column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    pub id: FeatureId,
    pub geometry_wkt: Option<String>,
    pub values: BTreeMap<String, String>,
}

impl Feature {
    pub fn new(id: impl Into<FeatureId>) -> Self {
        Self {
            id: id.into(),
            geometry_wkt: None,
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, column: &str, value: &str) -> Self {
        self.values.insert(column.to_string(), value.to_string());
        self
    }

    pub fn with_geometry(mut self, wkt: &str) -> Self {
        self.geometry_wkt = Some(wkt.to_string());
        self
    }

    /// Missing columns read as empty, the way DBF blanks do.
    pub fn value(&self, column: &str) -> &str {
        self.values.get(column).map(String::as_str).unwrap_or("")
    }

    pub fn set_value(&mut self, column: &str, value: &str) {
        self.values.insert(column.to_string(), value.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerMeta {
    pub name: String,
    pub source_path: String,
    pub feature_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowPage {
    pub offset: usize,
    pub features: Vec<Feature>,
    pub total_rows: usize,
}

impl RowPage {
    pub fn is_last(&self) -> bool {
        self.offset + self.features.len() >= self.total_rows || self.features.is_empty()
    }
}
