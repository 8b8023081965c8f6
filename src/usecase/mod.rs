pub mod edit_buffer;
pub mod ports;
pub mod services;
