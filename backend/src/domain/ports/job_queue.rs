//! Port for the notification job queue.
//!
//! The queue is the planner→dispatcher handoff. Claiming must be atomic:
//! the adapter transitions rows to `claimed` and returns them in one storage
//! round trip, so a second dispatcher invocation can never see the same
//! pending job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{NewNotificationJob, NotificationJob};

use super::define_port_error;

define_port_error! {
    /// Errors raised by job queue adapters.
    pub enum JobQueueError {
        /// Queue storage is unavailable.
        Connection { message: String } => "job queue connection failed: {message}",
        /// The job could not be written or claimed.
        Query { message: String } => "job queue operation failed: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationJobQueue: Send + Sync {
    /// Insert or refresh a job keyed on `(occurrence_id, offset_minutes)`.
    /// Re-planning an identical job is a no-op; a done job stays done.
    async fn upsert(&self, job: &NewNotificationJob) -> Result<(), JobQueueError>;

    /// Claim up to `limit` pending jobs with `planned_send_at <= now`,
    /// atomically transitioning them to `claimed`.
    async fn claim_due(
        &self,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<NotificationJob>, JobQueueError>;
}
