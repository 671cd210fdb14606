//! Tracing setup shared by relay-proxy: fmt logging, optional OTLP export and
//! span helpers.

pub mod config;
pub mod otlp;
pub mod spans;

pub use config::{OtlpProtocol, TracingConfig};
pub use otlp::{init_tracing, TracingGuard};
