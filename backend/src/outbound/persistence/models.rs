//! Row structs bridging the PostgreSQL schema and domain types.
//!
//! Rows deserialize defensively: unknown enum labels and malformed
//! durations are logged and mapped to safe defaults rather than failing the
//! whole query, matching the adapter's log-and-continue posture.

use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{
    JobState, NewNotification, NewNotificationJob, NewSchedule, NewTask, NewUser, Notification,
    NotificationJob, NotificationPriority, NotificationStatus, Occurrence, Schedule, ScheduleKind,
    Task, TaskDuration, User,
};

use super::schema::{
    notification_jobs, notifications, occurrence_tasks, occurrences, schedules, tasks, users,
};

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub external_id: Option<String>,
    pub categories: Option<String>,
    pub key_commands: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            external_id: row.external_id,
            categories: row.categories,
            key_commands: row.key_commands,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUserRow<'a> {
    pub id: Uuid,
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub external_id: Option<&'a str>,
}

impl<'a> NewUserRow<'a> {
    pub fn from_domain(user: &'a NewUser) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: &user.email,
            first_name: &user.first_name,
            last_name: &user.last_name,
            external_id: Some(&user.external_id),
        }
    }
}

#[derive(Debug, Queryable, Selectable, QueryableByName)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TaskRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration: String,
    pub category: String,
    pub tags: Vec<String>,
    pub toggled_at: Option<i64>,
    pub is_active: bool,
    pub is_completed: bool,
    pub last_modified_at: i64,
    pub priority: Option<i32>,
    pub due_at: Option<DateTime<Utc>>,
    pub show_before_due_time: Option<i32>,
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Self {
        let duration = TaskDuration::parse(&row.duration).unwrap_or_else(|err| {
            warn!(task_id = %row.id, value = %row.duration, error = %err, "bad stored duration");
            TaskDuration::ZERO
        });
        Self {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            description: row.description,
            created_at: row.created_at,
            completed_at: row.completed_at,
            duration,
            category: row.category,
            tags: row.tags,
            toggled_at: row.toggled_at,
            is_active: row.is_active,
            is_completed: row.is_completed,
            last_modified_at: row.last_modified_at,
            priority: row.priority,
            due_at: row.due_at,
            show_before_due_time: row.show_before_due_time,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTaskRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration: String,
    pub category: String,
    pub tags: Vec<String>,
    pub toggled_at: Option<i64>,
    pub is_active: bool,
    pub is_completed: bool,
    pub last_modified_at: i64,
    pub priority: Option<i32>,
    pub due_at: Option<DateTime<Utc>>,
    pub show_before_due_time: Option<i32>,
}

impl NewTaskRow {
    pub fn from_domain(task: &NewTask) -> Self {
        Self {
            id: task.id,
            user_id: task.user_id,
            title: task.title.clone(),
            description: task.description.clone(),
            created_at: task.created_at,
            completed_at: task.completed_at,
            duration: task.duration.to_string(),
            category: task.category.clone(),
            tags: task.tags.clone(),
            toggled_at: task.toggled_at,
            is_active: task.is_active,
            is_completed: task.is_completed,
            last_modified_at: task.last_modified_at,
            priority: task.priority,
            due_at: task.due_at,
            show_before_due_time: task.show_before_due_time,
        }
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = schedules)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ScheduleRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub title: String,
    pub category: Option<String>,
    pub tz: String,
    pub start_local: NaiveDateTime,
    pub until_local: Option<NaiveDateTime>,
    pub rrule: Option<String>,
    pub rev: i32,
    pub notify_offsets_min: Vec<i32>,
    pub muted_offsets_min: Vec<i32>,
    pub show_before_minutes: Option<i32>,
    pub last_materialized_until: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl From<ScheduleRow> for Schedule {
    fn from(row: ScheduleRow) -> Self {
        let kind = ScheduleKind::parse(&row.kind).unwrap_or_else(|| {
            warn!(schedule_id = %row.id, value = %row.kind, "unrecognised schedule kind");
            ScheduleKind::Reminder
        });
        Self {
            id: row.id,
            user_id: row.user_id,
            kind,
            title: row.title,
            category: row.category,
            tz: row.tz,
            start_local: row.start_local,
            until_local: row.until_local,
            rrule: row.rrule,
            rev: row.rev,
            notify_offsets_min: row.notify_offsets_min,
            muted_offsets_min: row.muted_offsets_min,
            show_before_minutes: row.show_before_minutes,
            last_materialized_until: row.last_materialized_until,
            is_active: row.is_active,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = schedules)]
pub struct NewScheduleRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub title: String,
    pub category: Option<String>,
    pub tz: String,
    pub start_local: NaiveDateTime,
    pub until_local: Option<NaiveDateTime>,
    pub rrule: Option<String>,
    pub rev: i32,
    pub notify_offsets_min: Vec<i32>,
    pub muted_offsets_min: Vec<i32>,
    pub show_before_minutes: Option<i32>,
    pub is_active: bool,
}

impl NewScheduleRow {
    pub fn from_domain(schedule: &NewSchedule) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: schedule.user_id,
            kind: schedule.kind.as_str().to_owned(),
            title: schedule.title.clone(),
            category: schedule.category.clone(),
            tz: schedule.tz.clone(),
            start_local: schedule.start_local,
            until_local: schedule.until_local,
            rrule: schedule.rrule.clone(),
            rev: 1,
            notify_offsets_min: schedule.notify_offsets_min.clone(),
            muted_offsets_min: schedule.muted_offsets_min.clone(),
            show_before_minutes: schedule.show_before_minutes,
            is_active: true,
        }
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = occurrences)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OccurrenceRow {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub occurs_at: DateTime<Utc>,
    pub rev: i32,
}

impl From<OccurrenceRow> for Occurrence {
    fn from(row: OccurrenceRow) -> Self {
        Self {
            id: row.id,
            schedule_id: row.schedule_id,
            occurs_at: row.occurs_at,
            rev: row.rev,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = occurrence_tasks)]
pub struct OccurrenceTaskRow {
    pub occurrence_id: Uuid,
    pub task_id: Uuid,
}

#[derive(Debug, Queryable, Selectable, QueryableByName)]
#[diesel(table_name = notification_jobs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NotificationJobRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub schedule_id: Option<Uuid>,
    pub occurrence_id: Uuid,
    pub offset_minutes: i32,
    pub planned_send_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub state: String,
    pub claimed_at: Option<DateTime<Utc>>,
}

impl From<NotificationJobRow> for NotificationJob {
    fn from(row: NotificationJobRow) -> Self {
        let state = JobState::parse(&row.state).unwrap_or_else(|| {
            warn!(job_id = %row.id, value = %row.state, "unrecognised job state");
            JobState::Pending
        });
        Self {
            id: row.id,
            user_id: row.user_id,
            schedule_id: row.schedule_id,
            occurrence_id: row.occurrence_id,
            offset_minutes: row.offset_minutes,
            planned_send_at: row.planned_send_at,
            payload: row.payload,
            state,
            claimed_at: row.claimed_at,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notification_jobs)]
pub struct NewNotificationJobRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub schedule_id: Option<Uuid>,
    pub occurrence_id: Uuid,
    pub offset_minutes: i32,
    pub planned_send_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub state: String,
}

impl NewNotificationJobRow {
    pub fn from_domain(job: &NewNotificationJob) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: job.user_id,
            schedule_id: job.schedule_id,
            occurrence_id: job.occurrence_id,
            offset_minutes: job.offset_minutes,
            planned_send_at: job.planned_send_at,
            payload: job.payload.clone(),
            state: JobState::Pending.as_str().to_owned(),
        }
    }
}

#[derive(Debug, Queryable, Selectable, QueryableByName)]
#[diesel(table_name = notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NotificationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub notification_type: String,
    pub payload: serde_json::Value,
    pub priority: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub snoozed_until: Option<DateTime<Utc>>,
    pub last_modified_at: i64,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        let status = NotificationStatus::parse(&row.status).unwrap_or_else(|| {
            warn!(notification_id = %row.id, value = %row.status, "unrecognised status");
            NotificationStatus::Unseen
        });
        let priority = NotificationPriority::parse(&row.priority).unwrap_or_else(|| {
            warn!(notification_id = %row.id, value = %row.priority, "unrecognised priority");
            NotificationPriority::Normal
        });
        Self {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            description: row.description,
            status,
            notification_type: row.notification_type,
            payload: row.payload,
            priority,
            expires_at: row.expires_at,
            snoozed_until: row.snoozed_until,
            last_modified_at: row.last_modified_at,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotificationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub notification_type: String,
    pub payload: serde_json::Value,
    pub priority: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_modified_at: i64,
}

impl NewNotificationRow {
    pub fn from_domain(notification: &NewNotification) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: notification.user_id,
            title: notification.title.clone(),
            description: notification.description.clone(),
            status: NotificationStatus::Unseen.as_str().to_owned(),
            notification_type: notification.notification_type.clone(),
            payload: notification.payload.clone(),
            priority: notification.priority.as_str().to_owned(),
            expires_at: notification.expires_at,
            last_modified_at: notification.last_modified_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn task_row(duration: &str) -> TaskRow {
        TaskRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "t".into(),
            description: String::new(),
            created_at: Utc::now(),
            completed_at: None,
            duration: duration.into(),
            category: "Life".into(),
            tags: vec![],
            toggled_at: None,
            is_active: false,
            is_completed: false,
            last_modified_at: 0,
            priority: None,
            due_at: None,
            show_before_due_time: None,
        }
    }

    #[rstest]
    fn task_row_parses_duration() {
        let task: Task = task_row("01:30:00").into();
        assert_eq!(task.duration.as_seconds(), 5_400);
    }

    #[rstest]
    fn malformed_duration_defaults_to_zero() {
        let task: Task = task_row("garbage").into();
        assert_eq!(task.duration, TaskDuration::ZERO);
    }

    #[rstest]
    fn new_schedule_rows_start_at_revision_one() {
        let row = NewScheduleRow::from_domain(&NewSchedule {
            user_id: Uuid::new_v4(),
            kind: ScheduleKind::Task,
            title: "Standup".into(),
            category: None,
            tz: "UTC".into(),
            start_local: chrono::NaiveDate::from_ymd_opt(2025, 1, 1)
                .expect("valid date")
                .and_hms_opt(9, 0, 0)
                .expect("valid time"),
            until_local: None,
            rrule: Some("FREQ=DAILY".into()),
            notify_offsets_min: vec![0],
            muted_offsets_min: vec![],
            show_before_minutes: None,
        });
        assert_eq!(row.rev, 1);
        assert!(row.is_active);
        assert_eq!(row.kind, "task");
    }

    #[rstest]
    fn new_job_rows_start_pending() {
        let row = NewNotificationJobRow::from_domain(&NewNotificationJob {
            user_id: Uuid::new_v4(),
            schedule_id: None,
            occurrence_id: Uuid::new_v4(),
            offset_minutes: 360,
            planned_send_at: Utc::now(),
            payload: serde_json::json!({}),
        });
        assert_eq!(row.state, "pending");
    }
}
