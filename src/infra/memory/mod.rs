mod layer;

pub use layer::InMemoryFeatureLayer;
