//! Wire-level message definitions for the WebSocket adapter.
//!
//! Every frame in both directions is a UTF-8 JSON envelope
//! `{"event": string, "data": any}`. Inbound payloads are decoded from the
//! envelope's `data` member into the request types below.

use actix::Message;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::TaskDuration;

/// The frame envelope shared by both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// A pre-serialized outbound frame delivered to a session actor's mailbox.
#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
pub struct OutboundEvent(pub String);

/// Serialize an envelope for delivery. Serialization of `serde_json::Value`
/// cannot fail.
pub fn frame(event: &str, data: serde_json::Value) -> String {
    serde_json::to_string(&EventMessage {
        event: event.to_owned(),
        data,
    })
    .unwrap_or_default()
}

/// Error payload sent as a `connection_error` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    pub code: u16,
}

/// Handshake payload presented by the client on `connect`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub external_id: String,
}

/// Full task payload for `task_create`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskCreateRequest {
    pub id: Uuid,
    pub title: String,
    /// Older clients send a misspelled key for this field.
    #[serde(default, alias = "descripiton")]
    pub description: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub duration: TaskDuration,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub toggled_at: Option<i64>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_completed: bool,
    pub last_modified_at: i64,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub show_before_due_time: Option<i32>,
}

/// Payload for `task_edit`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskEditRequest {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub last_modified_at: i64,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub show_before_due_time: Option<i32>,
}

/// Payload for `task_toggle`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskToggleRequest {
    #[serde(alias = "uuid")]
    pub id: Uuid,
    #[serde(default)]
    pub toggled_at: Option<i64>,
    pub is_active: bool,
    pub duration: TaskDuration,
    pub last_modified_at: i64,
}

/// Payload for `task_completed`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskCompletedRequest {
    pub id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub duration: TaskDuration,
    pub last_modified_at: i64,
}

/// Payload for `task_delete`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskDeleteRequest {
    pub id: Uuid,
}

/// Payload for `task_duplicate`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskDuplicateRequest {
    pub task_id: Uuid,
}

/// One piece of a `task_split`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSplitPart {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub duration: TaskDuration,
}

/// Payload for `task_split`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSplitRequest {
    pub task_id: Uuid,
    #[serde(default)]
    pub splits: Vec<TaskSplitPart>,
}

/// Payload for `get_completed_tasks`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletedTasksRequest {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub search_query: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Payload for `notifications_fetch`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationsFetchRequest {
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub statuses: Vec<String>,
    #[serde(default)]
    pub notification_types: Vec<String>,
    #[serde(default)]
    pub priorities: Vec<String>,
    #[serde(default)]
    pub include_snoozed: Option<bool>,
    #[serde(default)]
    pub expired_only: Option<bool>,
}

/// Payload for `notification_mark_seen` and `notification_mark_all_seen`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationIdsRequest {
    #[serde(default)]
    pub notification_ids: Vec<Uuid>,
}

/// Payload for `notification_archive`.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationArchiveRequest {
    pub notification_id: Uuid,
}

/// Payload for `notification_snooze`.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationSnoozeRequest {
    pub notification_id: Uuid,
    /// Absolute target in epoch milliseconds.
    #[serde(default)]
    pub snooze_until: Option<i64>,
    #[serde(default)]
    pub snooze_minutes: Option<i64>,
    #[serde(default)]
    pub snooze_seconds: Option<i64>,
}

/// Payload for `schedule_create` and `reminder_submit`.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleCreateRequest {
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    pub tz: String,
    pub start_local: NaiveDateTime,
    #[serde(default)]
    pub until_local: Option<NaiveDateTime>,
    #[serde(default)]
    pub rrule: Option<String>,
    #[serde(default)]
    pub notify_offsets_min: Vec<i32>,
    #[serde(default)]
    pub muted_offsets_min: Vec<i32>,
    #[serde(default)]
    pub show_before_minutes: Option<i32>,
}

/// Payload for `schedule_edit`.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleEditRequest {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    pub tz: String,
    pub start_local: NaiveDateTime,
    #[serde(default)]
    pub until_local: Option<NaiveDateTime>,
    #[serde(default)]
    pub rrule: Option<String>,
    #[serde(default)]
    pub notify_offsets_min: Vec<i32>,
    #[serde(default)]
    pub muted_offsets_min: Vec<i32>,
    #[serde(default)]
    pub show_before_minutes: Option<i32>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Payload for `schedule_delete`.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleDeleteRequest {
    pub id: Uuid,
}

/// Payload for `reminder_submit`: shorthand for a one-off reminder.
#[derive(Debug, Clone, Deserialize)]
pub struct ReminderSubmitRequest {
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    pub tz: String,
    pub remind_at_local: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn envelope_round_trips() {
        let text = frame("ping", serde_json::json!(""));
        let parsed: EventMessage = serde_json::from_str(&text).expect("valid frame");
        assert_eq!(parsed.event, "ping");
        assert_eq!(parsed.data, serde_json::json!(""));
    }

    #[rstest]
    fn envelope_tolerates_missing_data() {
        let parsed: EventMessage =
            serde_json::from_str(r#"{"event":"request_hard_refresh"}"#).expect("valid frame");
        assert_eq!(parsed.event, "request_hard_refresh");
        assert!(parsed.data.is_null());
    }

    #[rstest]
    fn toggle_accepts_uuid_alias() {
        let request: TaskToggleRequest = serde_json::from_value(serde_json::json!({
            "uuid": "3fa85f64-5717-4562-b3fc-2c963f66afa6",
            "toggled_at": 1735800000000_i64,
            "is_active": true,
            "duration": "00:10:00",
            "last_modified_at": 1735800000000_i64,
        }))
        .expect("valid request");
        assert!(request.is_active);
        assert_eq!(request.duration.as_seconds(), 600);
    }

    #[rstest]
    fn snooze_request_supports_all_forms() {
        let request: NotificationSnoozeRequest = serde_json::from_value(serde_json::json!({
            "notification_id": "3fa85f64-5717-4562-b3fc-2c963f66afa6",
            "snooze_minutes": 10,
        }))
        .expect("valid request");
        assert_eq!(request.snooze_minutes, Some(10));
        assert_eq!(request.snooze_until, None);
        assert_eq!(request.snooze_seconds, None);
    }

    #[rstest]
    fn connection_error_serializes_type_field() {
        let error = ConnectionError {
            error_type: "external_id_mismatch".into(),
            message: "External id does not match".into(),
            code: 403,
        };
        let value = serde_json::to_value(&error).expect("serializable");
        assert_eq!(value["type"], "external_id_mismatch");
        assert_eq!(value["code"], 403);
    }
}
