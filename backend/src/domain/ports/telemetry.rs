//! Port for runtime telemetry (connection gauge and duration histograms).

use uuid::Uuid;

/// Recorder for the metric families exposed at `/metrics`.
pub trait Telemetry: Send + Sync {
    /// A session attached for this user.
    fn connection_opened(&self, user_id: Uuid);

    /// A session detached for this user.
    fn connection_closed(&self, user_id: Uuid);

    /// An inbound event finished processing.
    fn observe_event(&self, event_type: &str, seconds: f64);

    /// A storage query finished.
    fn observe_query(&self, query_type: &'static str, seconds: f64);
}

/// Fixture that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpTelemetry;

impl Telemetry for NoOpTelemetry {
    fn connection_opened(&self, _user_id: Uuid) {}

    fn connection_closed(&self, _user_id: Uuid) {}

    fn observe_event(&self, _event_type: &str, _seconds: f64) {}

    fn observe_query(&self, _query_type: &'static str, _seconds: f64) {}
}
