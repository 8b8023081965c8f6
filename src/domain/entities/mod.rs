pub mod column;
pub mod edit;
pub mod layer;
pub mod transaction;
