//! tunnelwatch service: adapter wiring, HTTP surface and log setup.

pub mod bootstrap;
pub mod server;
pub mod telemetry;
