//! Port for schedule and occurrence persistence adapters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{NewSchedule, Occurrence, Schedule, ScheduleEdit};

use super::define_port_error;

define_port_error! {
    /// Persistence errors raised by schedule repository adapters.
    pub enum SchedulePersistenceError {
        /// Repository connection could not be established.
        Connection { message: String } => "schedule repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "schedule repository query failed: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Insert a schedule row at revision 1.
    async fn create(&self, schedule: &NewSchedule) -> Result<Schedule, SchedulePersistenceError>;

    /// Apply an edit patch, bumping the revision, and return the updated row.
    async fn edit(&self, edit: &ScheduleEdit) -> Result<Schedule, SchedulePersistenceError>;

    /// Delete a schedule; occurrences cascade.
    async fn delete(&self, id: Uuid) -> Result<(), SchedulePersistenceError>;

    /// All schedules owned by a user, newest first.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Schedule>, SchedulePersistenceError>;

    /// All active schedules (planner input).
    async fn active(&self) -> Result<Vec<Schedule>, SchedulePersistenceError>;

    /// Insert or refresh an occurrence keyed on `(schedule_id, occurs_at)`,
    /// stamping the given revision.
    async fn upsert_occurrence(
        &self,
        schedule_id: Uuid,
        occurs_at: DateTime<Utc>,
        rev: i32,
    ) -> Result<Occurrence, SchedulePersistenceError>;

    /// Delete occurrences older than the cutoff, returning the count.
    /// Linked tasks are untouched.
    async fn delete_occurrences_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, SchedulePersistenceError>;

    /// Record how far materialization has progressed.
    async fn set_last_materialized_until(
        &self,
        schedule_id: Uuid,
        until: DateTime<Utc>,
    ) -> Result<(), SchedulePersistenceError>;

    /// Flip a schedule inactive.
    async fn deactivate(&self, schedule_id: Uuid) -> Result<(), SchedulePersistenceError>;

    /// Record the one-to-one occurrence→task link.
    async fn link_task(
        &self,
        occurrence_id: Uuid,
        task_id: Uuid,
    ) -> Result<(), SchedulePersistenceError>;

    /// Task already linked to an occurrence, if any.
    async fn task_id_for_occurrence(
        &self,
        occurrence_id: Uuid,
    ) -> Result<Option<Uuid>, SchedulePersistenceError>;
}
