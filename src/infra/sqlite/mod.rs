pub mod layer;
pub mod queries;
pub mod schema;
