//! Outbound adapters: storage and telemetry behind the domain ports.

pub mod metrics;
pub mod persistence;
