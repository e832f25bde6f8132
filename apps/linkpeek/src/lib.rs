pub mod cli;
pub mod config;
pub mod host;
pub mod methods;
pub mod rpc;
pub mod surface;
pub mod telemetry;
pub mod walker;
