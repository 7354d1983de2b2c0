pub mod alerts;
pub mod coordinator;
pub mod protocol;
pub mod state;
pub mod telemetry;
