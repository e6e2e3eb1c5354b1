//! Prometheus adapters for runtime telemetry.

mod prometheus_telemetry;

pub use prometheus_telemetry::PrometheusTelemetry;
