//! Port for notification persistence adapters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{NewNotification, Notification, NotificationPriority, NotificationStatus};

use super::define_port_error;

define_port_error! {
    /// Persistence errors raised by notification repository adapters.
    pub enum NotificationPersistenceError {
        /// Repository connection could not be established.
        Connection { message: String } => "notification repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "notification repository query failed: {message}",
        /// The notifications relation does not exist; callers degrade to
        /// empty results instead of failing the event.
        MissingRelation { message: String } => "notifications relation missing: {message}",
    }
}

impl NotificationPersistenceError {
    /// Whether this error means the backing relation has not been created,
    /// in which case reads degrade to empty lists and zero counts.
    pub fn is_missing_relation(&self) -> bool {
        matches!(self, Self::MissingRelation { .. })
    }
}

/// Filters applied when listing notifications for a user.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationListFilter {
    pub user_id: Uuid,
    pub statuses: Vec<NotificationStatus>,
    pub notification_types: Vec<String>,
    pub priorities: Vec<NotificationPriority>,
    /// When false, rows whose snooze window is still open are hidden.
    pub include_snoozed: bool,
    /// When true, only rows past `expires_at` are returned; otherwise only
    /// unexpired rows are.
    pub expired_only: bool,
    pub offset: i64,
    pub limit: i64,
}

impl NotificationListFilter {
    /// First page of recent unseen/seen notifications, as loaded on connect.
    pub fn first_page(user_id: Uuid) -> Self {
        Self {
            user_id,
            statuses: vec![NotificationStatus::Unseen, NotificationStatus::Seen],
            notification_types: Vec::new(),
            priorities: Vec::new(),
            include_snoozed: false,
            expired_only: false,
            offset: 0,
            limit: 10,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Insert a notification with status `unseen`.
    async fn create(
        &self,
        notification: &NewNotification,
    ) -> Result<Notification, NotificationPersistenceError>;

    /// Page through a user's notifications, most recently modified first.
    async fn list_for_user(
        &self,
        filter: &NotificationListFilter,
    ) -> Result<Vec<Notification>, NotificationPersistenceError>;

    /// Mark the given notifications seen, returning the rows that changed.
    async fn mark_seen(
        &self,
        user_id: Uuid,
        notification_ids: &[Uuid],
        last_modified_at: i64,
    ) -> Result<Vec<Notification>, NotificationPersistenceError>;

    /// Mark every unseen notification seen, returning the rows that changed.
    async fn mark_all_seen(
        &self,
        user_id: Uuid,
        last_modified_at: i64,
    ) -> Result<Vec<Notification>, NotificationPersistenceError>;

    /// Archive one notification. Unknown ids yield `None`.
    async fn archive(
        &self,
        user_id: Uuid,
        notification_id: Uuid,
        last_modified_at: i64,
    ) -> Result<Option<Notification>, NotificationPersistenceError>;

    /// Snooze one notification until the given instant. Unknown ids yield
    /// `None`.
    async fn snooze(
        &self,
        user_id: Uuid,
        notification_id: Uuid,
        snoozed_until: DateTime<Utc>,
        last_modified_at: i64,
    ) -> Result<Option<Notification>, NotificationPersistenceError>;

    /// Atomically clear every elapsed snooze, returning the released rows.
    async fn release_due_snoozes(
        &self,
        now: DateTime<Utc>,
        last_modified_at: i64,
    ) -> Result<Vec<Notification>, NotificationPersistenceError>;

    /// Number of unseen, not-currently-snoozed notifications.
    async fn count_unseen(&self, user_id: Uuid) -> Result<i64, NotificationPersistenceError>;

    /// Whether a `due_task` notification already exists for the
    /// `(task, stage)` pair.
    async fn has_for_task_stage(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        stage: &str,
    ) -> Result<bool, NotificationPersistenceError>;

    /// Most recent notification of a type whose payload references the task.
    async fn find_by_task_and_type(
        &self,
        user_id: Uuid,
        notification_type: &str,
        task_id: Uuid,
    ) -> Result<Option<Notification>, NotificationPersistenceError>;
}
