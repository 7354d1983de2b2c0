pub mod btle;
pub mod constants;
pub mod mock;
pub mod service;
pub mod transport;
pub mod types;
