pub mod error;
pub mod memory;
pub mod telemetry;
