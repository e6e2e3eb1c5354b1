//! Notifications and the planned-emission job queue.
//!
//! A `NotificationJob` is a future emission keyed on
//! `(occurrence_id, offset_minutes)`; re-planning the same key is an upsert.
//! A `Notification` is the user-visible record created when a job is
//! dispatched (or when a task crosses a due stage), living through
//! unseen → seen → archived with snoozing orthogonal to status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Read state of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Unseen,
    Seen,
    Archived,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unseen => "unseen",
            Self::Seen => "seen",
            Self::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unseen" => Some(Self::Unseen),
            "seen" => Some(Self::Seen),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// Display urgency, derived from how close the emission is to the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
}

impl NotificationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    /// Priority for a job emitted `offset_minutes` before its occurrence.
    pub fn for_offset_minutes(offset_minutes: i32) -> Self {
        if offset_minutes <= 60 {
            Self::High
        } else if offset_minutes <= 360 {
            Self::Normal
        } else {
            Self::Low
        }
    }
}

/// A user-visible notification record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: NotificationStatus,
    pub notification_type: String,
    pub payload: serde_json::Value,
    pub priority: NotificationPriority,
    pub expires_at: Option<DateTime<Utc>>,
    pub snoozed_until: Option<DateTime<Utc>>,
    /// Epoch milliseconds of the last mutation.
    pub last_modified_at: i64,
}

/// Fields required to insert a notification row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub notification_type: String,
    pub payload: serde_json::Value,
    pub priority: NotificationPriority,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_modified_at: i64,
}

/// Queue state of a planned emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Claimed,
    Done,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Done => "done",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "claimed" => Some(Self::Claimed),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

/// A planned future emission tied to an occurrence and an advance offset.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub schedule_id: Option<Uuid>,
    pub occurrence_id: Uuid,
    pub offset_minutes: i32,
    pub planned_send_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub state: JobState,
    pub claimed_at: Option<DateTime<Utc>>,
}

/// Upsert shape for the job queue, keyed on `(occurrence_id, offset_minutes)`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotificationJob {
    pub user_id: Uuid,
    pub schedule_id: Option<Uuid>,
    pub occurrence_id: Uuid,
    pub offset_minutes: i32,
    pub planned_send_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Payload carried by planner-produced jobs into the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub schedule_id: Uuid,
    pub occurrence_id: Uuid,
    pub offset_minutes: i32,
    pub title: String,
    pub kind: crate::domain::ScheduleKind,
}
