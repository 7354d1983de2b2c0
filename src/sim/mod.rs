pub mod telemetry_sim;
