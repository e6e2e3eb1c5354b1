//! Port for task persistence adapters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{NewTask, Task, TaskCompletion, TaskEdit, TaskToggle};

use super::define_port_error;

define_port_error! {
    /// Persistence errors raised by task repository adapters.
    pub enum TaskPersistenceError {
        /// Repository connection could not be established.
        Connection { message: String } => "task repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "task repository query failed: {message}",
    }
}

/// Filters applied when listing completed tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTasksFilter {
    pub user_id: Uuid,
    pub category: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Free-text match on title/description; adapters wrap it in wildcards.
    pub search: Option<String>,
    pub tags: Vec<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert a task row.
    async fn create(&self, task: &NewTask) -> Result<Task, TaskPersistenceError>;

    /// Apply an edit patch and return the updated row.
    async fn edit(&self, edit: &TaskEdit) -> Result<Task, TaskPersistenceError>;

    /// Apply an activity toggle and return the updated row.
    async fn toggle(&self, toggle: &TaskToggle) -> Result<Task, TaskPersistenceError>;

    /// Mark a task completed with its final duration.
    async fn complete(&self, completion: &TaskCompletion) -> Result<Task, TaskPersistenceError>;

    /// Delete a task row.
    async fn delete(&self, id: Uuid) -> Result<(), TaskPersistenceError>;

    /// Fetch a task by id.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Task>, TaskPersistenceError>;

    /// All non-completed tasks for a user, newest first.
    async fn active_for_user(&self, user_id: Uuid) -> Result<Vec<Task>, TaskPersistenceError>;

    /// Completed tasks matching the filter.
    async fn completed_for_user(
        &self,
        filter: &CompletedTasksFilter,
    ) -> Result<Vec<Task>, TaskPersistenceError>;

    /// All non-completed tasks across users (midnight roll-over input).
    async fn non_completed(&self) -> Result<Vec<Task>, TaskPersistenceError>;

    /// Tasks whose visibility window opened within the current sweep.
    async fn due_for_visibility(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Task>, TaskPersistenceError>;

    /// Non-completed tasks with a future due date (due-stage ladder input).
    async fn upcoming_with_due(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Task>, TaskPersistenceError>;

    /// Transactionally delete `original_id` and insert the split rows,
    /// returning the inserted tasks. Nothing is written when any insert
    /// fails.
    async fn replace_with_splits(
        &self,
        original_id: Uuid,
        splits: &[NewTask],
    ) -> Result<Vec<Task>, TaskPersistenceError>;
}
