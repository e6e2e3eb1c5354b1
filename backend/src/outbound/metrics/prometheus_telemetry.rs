//! Prometheus adapter for the connection gauge and duration histograms.
//!
//! Registers three families with the shared registry exposed at `/metrics`:
//! `websocket_connections_total{user_id}`,
//! `db_query_duration_seconds{query_type}`, and
//! `websocket_event_duration_seconds{event_type}`.

use prometheus::{GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};
use uuid::Uuid;

use crate::domain::ports::Telemetry;

pub struct PrometheusTelemetry {
    websocket_connections: GaugeVec,
    db_query_duration: HistogramVec,
    websocket_event_duration: HistogramVec,
}

impl PrometheusTelemetry {
    /// Create and register the metric families with the provided registry.
    ///
    /// # Errors
    ///
    /// Returns an error when Prometheus rejects metric registration.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let websocket_connections = GaugeVec::new(
            Opts::new(
                "websocket_connections_total",
                "Number of active WebSocket connections",
            ),
            &["user_id"],
        )?;
        let db_query_duration = HistogramVec::new(
            HistogramOpts::new("db_query_duration_seconds", "Database query duration"),
            &["query_type"],
        )?;
        let websocket_event_duration = HistogramVec::new(
            HistogramOpts::new(
                "websocket_event_duration_seconds",
                "WebSocket event processing duration",
            ),
            &["event_type"],
        )?;

        registry.register(Box::new(websocket_connections.clone()))?;
        registry.register(Box::new(db_query_duration.clone()))?;
        registry.register(Box::new(websocket_event_duration.clone()))?;

        Ok(Self {
            websocket_connections,
            db_query_duration,
            websocket_event_duration,
        })
    }
}

impl Telemetry for PrometheusTelemetry {
    fn connection_opened(&self, user_id: Uuid) {
        self.websocket_connections
            .with_label_values(&[&user_id.to_string()])
            .inc();
    }

    fn connection_closed(&self, user_id: Uuid) {
        self.websocket_connections
            .with_label_values(&[&user_id.to_string()])
            .dec();
    }

    fn observe_event(&self, event_type: &str, seconds: f64) {
        self.websocket_event_duration
            .with_label_values(&[event_type])
            .observe(seconds);
    }

    fn observe_query(&self, query_type: &'static str, seconds: f64) {
        self.db_query_duration
            .with_label_values(&[query_type])
            .observe(seconds);
    }
}
