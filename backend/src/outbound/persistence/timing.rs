//! Query timing instrumentation.

use std::future::Future;
use std::time::Instant;

use crate::domain::ports::Telemetry;

/// Run a storage future and record its duration under `query_type` in the
/// `db_query_duration_seconds` histogram.
pub async fn observed<T, F>(telemetry: &dyn Telemetry, query_type: &'static str, fut: F) -> T
where
    F: Future<Output = T>,
{
    let started = Instant::now();
    let out = fut.await;
    telemetry.observe_query(query_type, started.elapsed().as_secs_f64());
    out
}
