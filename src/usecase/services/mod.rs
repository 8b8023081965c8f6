pub mod layer_service;
pub mod row_pager;
pub mod transaction_coordinator;
