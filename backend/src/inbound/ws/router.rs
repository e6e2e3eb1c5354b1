//! Event router: decodes inbound envelopes and applies them.
//!
//! Each handler reads through the storage ports, then echoes the change to
//! the issuer's other sessions (or the issuer alone for query-style
//! events). Unknown events are logged and ignored; handler failures are
//! answered with a `connection_error` envelope and never tear down the
//! connection.

use std::time::Instant;

use actix::Recipient;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::ports::{CompletedTasksFilter, NotificationListFilter, SessionBroadcast};
use crate::domain::unseen_count::broadcast_unseen_count;
use crate::domain::{
    NewSchedule, NewTask, NewUser, Notification, NotificationPriority, NotificationStatus,
    ScheduleEdit, ScheduleKind, TaskCompletion, TaskEdit, TaskToggle, UserSettings,
};

use super::messages::{
    frame, CompletedTasksRequest, ConnectRequest, ConnectionError, NotificationArchiveRequest,
    NotificationIdsRequest, NotificationSnoozeRequest, NotificationsFetchRequest, OutboundEvent,
    ReminderSubmitRequest, ScheduleCreateRequest, ScheduleDeleteRequest, ScheduleEditRequest,
    TaskCompletedRequest, TaskCreateRequest, TaskDeleteRequest, TaskDuplicateRequest,
    TaskEditRequest, TaskSplitRequest, TaskToggleRequest,
};
use super::state::WsState;

const DEFAULT_NOTIFICATION_PAGE: i64 = 10;
const MAX_NOTIFICATION_PAGE: i64 = 100;

/// The connection issuing the current event. Replies that must work before
/// the session is registered (handshake errors, `connected`) go straight to
/// the mailbox.
#[derive(Clone)]
pub struct Issuer {
    pub sid: Uuid,
    pub mailbox: Recipient<OutboundEvent>,
}

impl Issuer {
    fn send(&self, event: &str, payload: serde_json::Value) {
        self.mailbox.do_send(OutboundEvent(frame(event, payload)));
    }

    fn send_error(&self, error_type: &str, message: &str, code: u16) {
        warn!(sid = %self.sid, error_type, code, message, "websocket event rejected");
        self.send(
            "connection_error",
            serde_json::to_value(ConnectionError {
                error_type: error_type.to_owned(),
                message: message.to_owned(),
                code,
            })
            .unwrap_or_default(),
        );
    }
}

/// Dispatch one decoded envelope. Every handled event observes the event
/// duration histogram.
pub async fn dispatch(state: WsState, issuer: Issuer, event: String, data: serde_json::Value) {
    let started = Instant::now();
    let result = route(&state, &issuer, &event, data).await;
    state
        .telemetry
        .observe_event(&event, started.elapsed().as_secs_f64());

    if let Err(err) = result {
        match err {
            RouteError::BadRequest(message) => issuer.send_error("invalid_data", &message, 400),
            RouteError::Storage(message) => {
                issuer.send_error("database_error", &message, 500);
            }
            RouteError::Handled => {}
        }
    }
}

/// Handler outcome: `Handled` means an error envelope was already sent.
enum RouteError {
    BadRequest(String),
    Storage(String),
    Handled,
}

impl RouteError {
    fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}

fn decode<T: serde::de::DeserializeOwned>(data: serde_json::Value) -> Result<T, RouteError> {
    serde_json::from_value(data).map_err(|err| RouteError::BadRequest(err.to_string()))
}

/// Sessions must complete the handshake before anything but `connect`.
fn authed_user(state: &WsState, issuer: &Issuer) -> Result<Uuid, RouteError> {
    state
        .registry
        .user_id_of(issuer.sid)
        .ok_or_else(|| RouteError::BadRequest("session is not connected".to_owned()))
}

async fn route(
    state: &WsState,
    issuer: &Issuer,
    event: &str,
    data: serde_json::Value,
) -> Result<(), RouteError> {
    match event {
        "connect" => on_connect(state, issuer, data).await,
        "task_create" => on_task_create(state, issuer, data).await,
        "task_edit" => on_task_edit(state, issuer, data).await,
        "task_toggle" => on_task_toggle(state, issuer, data).await,
        "task_completed" => on_task_completed(state, issuer, data).await,
        "task_delete" => on_task_delete(state, issuer, data).await,
        "task_duplicate" => on_task_duplicate(state, issuer, data).await,
        "task_split" => on_task_split(state, issuer, data).await,
        "get_completed_tasks" => on_get_completed_tasks(state, issuer, data).await,
        "request_hard_refresh" => on_request_hard_refresh(state, issuer).await,
        "user_updated_categories" => on_user_updated_categories(state, issuer, data).await,
        "new_command_added" | "command_removed" => on_command_updated(state, issuer, data).await,
        "notifications_fetch" => on_notifications_fetch(state, issuer, data).await,
        "notification_mark_seen" => on_notifications_mark_seen(state, issuer, data, false).await,
        "notification_mark_all_seen" => {
            on_notifications_mark_seen(state, issuer, data, true).await
        }
        "notification_archive" => on_notification_archive(state, issuer, data).await,
        "notification_snooze" => on_notification_snooze(state, issuer, data).await,
        "schedule_create" => on_schedule_create(state, issuer, data).await,
        "schedule_edit" => on_schedule_edit(state, issuer, data).await,
        "schedule_delete" => on_schedule_delete(state, issuer, data).await,
        "schedule_list" => on_schedule_list(state, issuer).await,
        "reminder_submit" => on_reminder_submit(state, issuer, data).await,
        other => {
            debug!(event = other, sid = %issuer.sid, "unknown event ignored");
            Ok(())
        }
    }
}

async fn on_connect(
    state: &WsState,
    issuer: &Issuer,
    data: serde_json::Value,
) -> Result<(), RouteError> {
    let request: ConnectRequest = decode(data)?;

    if request.external_id.is_empty() {
        issuer.send_error("invalid_external_id", "External id is required", 400);
        return Err(RouteError::Handled);
    }

    let existing = state
        .users
        .find_by_email(&request.email)
        .await
        .map_err(|err| {
            issuer.send_error("database_error", "Database error", 500);
            warn!(error = %err, "user lookup failed during connect");
            RouteError::Handled
        })?;

    let user = match existing {
        Some(user) => {
            if !user.accepts_external_id(&request.external_id) {
                issuer.send_error("external_id_mismatch", "External id does not match", 403);
                return Err(RouteError::Handled);
            }
            user
        }
        None => state
            .users
            .create(&NewUser {
                email: request.email.clone(),
                first_name: request.first_name.clone(),
                last_name: request.last_name.clone(),
                external_id: request.external_id.clone(),
            })
            .await
            .map_err(|err| {
                issuer.send_error("user_creation_failed", "Failed to create user", 500);
                warn!(error = %err, "user creation failed during connect");
                RouteError::Handled
            })?,
    };

    state
        .registry
        .add(issuer.sid, user.id, issuer.mailbox.clone());

    let tasks = state
        .tasks
        .active_for_user(user.id)
        .await
        .map_err(|err| {
            issuer.send_error("database_error", "Failed to load tasks", 500);
            warn!(error = %err, "task load failed during connect");
            RouteError::Handled
        })?;

    let notifications = match state
        .notifications
        .list_for_user(&NotificationListFilter::first_page(user.id))
        .await
    {
        Ok(batch) => batch,
        Err(err) if err.is_missing_relation() => Vec::new(),
        Err(err) => {
            issuer.send_error("database_error", "Failed to load notifications", 500);
            warn!(error = %err, "notification load failed during connect");
            return Err(RouteError::Handled);
        }
    };

    let unseen_count = match state.notifications.count_unseen(user.id).await {
        Ok(count) => count,
        Err(err) if err.is_missing_relation() => 0,
        Err(err) => {
            issuer.send_error("database_error", "Failed to load notification metadata", 500);
            warn!(error = %err, "unseen count failed during connect");
            return Err(RouteError::Handled);
        }
    };

    issuer.send(
        "connected",
        serde_json::json!({
            "sid": issuer.sid,
            "id": user.id,
            "first_name": user.first_name,
            "last_name": user.last_name,
            "email": user.email,
            "created_at": user.created_at,
            "updated_at": user.updated_at,
            "categories": user.categories.clone().unwrap_or_default(),
            "key_commands": user.key_commands.clone().unwrap_or_default(),
            "tasks": tasks,
            "notifications": notifications,
            "notifications_unseen_count": unseen_count,
        }),
    );
    Ok(())
}

async fn on_task_create(
    state: &WsState,
    issuer: &Issuer,
    data: serde_json::Value,
) -> Result<(), RouteError> {
    let user_id = authed_user(state, issuer)?;
    let request: TaskCreateRequest = decode(data)?;

    let task = state
        .tasks
        .create(&NewTask {
            id: request.id,
            user_id,
            title: request.title,
            description: request.description,
            created_at: request.created_at,
            completed_at: request.completed_at,
            duration: request.duration,
            category: request.category,
            tags: request.tags,
            toggled_at: request.toggled_at,
            is_active: request.is_active,
            is_completed: request.is_completed,
            last_modified_at: request.last_modified_at,
            priority: request.priority,
            due_at: request.due_at,
            show_before_due_time: request.show_before_due_time.or(Some(0)),
        })
        .await
        .map_err(RouteError::storage)?;

    state.registry.broadcast_to_user_excluding(
        user_id,
        issuer.sid,
        "new_task_created",
        serde_json::to_value(&task).unwrap_or_default(),
    );
    Ok(())
}

async fn on_task_edit(
    state: &WsState,
    issuer: &Issuer,
    data: serde_json::Value,
) -> Result<(), RouteError> {
    let user_id = authed_user(state, issuer)?;
    let request: TaskEditRequest = decode(data)?;

    let task = state
        .tasks
        .edit(&TaskEdit {
            id: request.id,
            title: request.title,
            description: request.description,
            category: request.category,
            tags: request.tags,
            last_modified_at: request.last_modified_at,
            priority: request.priority,
            due_at: request.due_at,
            show_before_due_time: request.show_before_due_time,
        })
        .await
        .map_err(RouteError::storage)?;

    state.registry.broadcast_to_user_excluding(
        user_id,
        issuer.sid,
        "related_task_edited",
        serde_json::to_value(&task).unwrap_or_default(),
    );
    Ok(())
}

async fn on_task_toggle(
    state: &WsState,
    issuer: &Issuer,
    data: serde_json::Value,
) -> Result<(), RouteError> {
    let user_id = authed_user(state, issuer)?;
    let request: TaskToggleRequest = decode(data)?;

    let task = state
        .tasks
        .toggle(&TaskToggle {
            id: request.id,
            toggled_at: request.toggled_at,
            is_active: request.is_active,
            duration: request.duration,
            last_modified_at: request.last_modified_at,
        })
        .await
        .map_err(RouteError::storage)?;

    state.registry.broadcast_to_user_excluding(
        user_id,
        issuer.sid,
        "related_task_toggled",
        serde_json::to_value(&task).unwrap_or_default(),
    );
    Ok(())
}

async fn on_task_completed(
    state: &WsState,
    issuer: &Issuer,
    data: serde_json::Value,
) -> Result<(), RouteError> {
    let user_id = authed_user(state, issuer)?;
    let request: TaskCompletedRequest = decode(data)?;

    let task = state
        .tasks
        .complete(&TaskCompletion {
            id: request.id,
            completed_at: request.completed_at,
            duration: request.duration,
            last_modified_at: request.last_modified_at,
        })
        .await
        .map_err(RouteError::storage)?;

    // Completed tasks leave the active list on other devices.
    state.registry.broadcast_to_user_excluding(
        user_id,
        issuer.sid,
        "related_task_deleted",
        serde_json::json!({ "id": task.id }),
    );
    Ok(())
}

async fn on_task_delete(
    state: &WsState,
    issuer: &Issuer,
    data: serde_json::Value,
) -> Result<(), RouteError> {
    let user_id = authed_user(state, issuer)?;
    let request: TaskDeleteRequest = decode(data)?;

    state
        .tasks
        .delete(request.id)
        .await
        .map_err(RouteError::storage)?;

    state.registry.broadcast_to_user_excluding(
        user_id,
        issuer.sid,
        "related_task_deleted",
        serde_json::json!({ "id": request.id }),
    );
    Ok(())
}

async fn on_task_duplicate(
    state: &WsState,
    issuer: &Issuer,
    data: serde_json::Value,
) -> Result<(), RouteError> {
    let user_id = authed_user(state, issuer)?;
    let request: TaskDuplicateRequest = decode(data)?;

    let original = state
        .tasks
        .find_by_id(request.task_id)
        .await
        .map_err(RouteError::storage)?
        .ok_or_else(|| {
            issuer.send_error("not_found", "Task not found", 404);
            RouteError::Handled
        })?;

    if original.user_id != user_id {
        issuer.send_error("unauthorized", "Task does not belong to user", 403);
        return Err(RouteError::Handled);
    }

    let duplicate = state
        .tasks
        .create(&NewTask::duplicate_of(&original, Utc::now()))
        .await
        .map_err(RouteError::storage)?;

    state.registry.broadcast_to_user(
        user_id,
        "new_task_created",
        serde_json::to_value(&duplicate).unwrap_or_default(),
    );
    Ok(())
}

async fn on_task_split(
    state: &WsState,
    issuer: &Issuer,
    data: serde_json::Value,
) -> Result<(), RouteError> {
    let user_id = authed_user(state, issuer)?;
    let request: TaskSplitRequest = decode(data)?;

    if request.splits.is_empty() {
        issuer.send_error("invalid_request", "At least one split is required", 400);
        return Err(RouteError::Handled);
    }
    if request.task_id.is_nil() {
        issuer.send_error("invalid_request", "Invalid task ID format", 400);
        return Err(RouteError::Handled);
    }

    let original = state
        .tasks
        .find_by_id(request.task_id)
        .await
        .map_err(RouteError::storage)?
        .ok_or_else(|| {
            issuer.send_error("not_found", "Task not found", 404);
            RouteError::Handled
        })?;

    if original.user_id != user_id {
        issuer.send_error("unauthorized", "Task does not belong to user", 403);
        return Err(RouteError::Handled);
    }

    let now_ms = Utc::now().timestamp_millis();
    let splits: Vec<NewTask> = request
        .splits
        .iter()
        .map(|part| NewTask {
            id: Uuid::new_v4(),
            user_id: original.user_id,
            title: part.title.clone(),
            description: part.description.clone(),
            // Splits share the original's lifecycle timestamps and state;
            // only title, description, and duration differ.
            created_at: original.created_at,
            completed_at: original.completed_at,
            duration: part.duration,
            category: original.category.clone(),
            tags: original.tags.clone(),
            toggled_at: original.is_active.then_some(now_ms),
            is_active: original.is_active,
            is_completed: original.is_completed,
            last_modified_at: now_ms,
            priority: original.priority,
            due_at: original.due_at,
            show_before_due_time: original.show_before_due_time,
        })
        .collect();

    let inserted = state
        .tasks
        .replace_with_splits(original.id, &splits)
        .await
        .map_err(RouteError::storage)?;

    if !original.is_completed {
        state.registry.broadcast_to_user(
            user_id,
            "related_task_deleted",
            serde_json::json!({ "id": original.id }),
        );
        for task in &inserted {
            state.registry.broadcast_to_user(
                user_id,
                "new_task_created",
                serde_json::to_value(task).unwrap_or_default(),
            );
        }
    }
    Ok(())
}

async fn on_get_completed_tasks(
    state: &WsState,
    issuer: &Issuer,
    data: serde_json::Value,
) -> Result<(), RouteError> {
    let user_id = authed_user(state, issuer)?;
    let request: CompletedTasksRequest = decode(data)?;
    let now = Utc::now();

    // Without an explicit range the query covers the current UTC day.
    let start_date = request
        .start_date
        .unwrap_or_else(|| day_bound(now, 0, 0, 0));
    let end_date = request
        .end_date
        .map(|end| day_bound(end, 23, 59, 59))
        .unwrap_or_else(|| day_bound(now, 23, 59, 59));

    let filter = CompletedTasksFilter {
        user_id,
        category: (!request.category.is_empty()).then(|| request.category.clone()),
        start_date,
        end_date,
        search: (!request.search_query.is_empty()).then(|| request.search_query.clone()),
        tags: request.tags,
    };

    let tasks = state
        .tasks
        .completed_for_user(&filter)
        .await
        .map_err(RouteError::storage)?;

    issuer.send(
        "get_completed_tasks",
        serde_json::to_value(&tasks).unwrap_or_default(),
    );
    Ok(())
}

fn day_bound(at: DateTime<Utc>, h: u32, m: u32, s: u32) -> DateTime<Utc> {
    at.date_naive()
        .and_hms_opt(h, m, s)
        .map(|naive| naive.and_utc())
        .unwrap_or(at)
}

async fn on_request_hard_refresh(state: &WsState, issuer: &Issuer) -> Result<(), RouteError> {
    let user_id = authed_user(state, issuer)?;

    let settings: UserSettings = state
        .users
        .settings(user_id)
        .await
        .map_err(RouteError::storage)?;
    let tasks = state
        .tasks
        .active_for_user(user_id)
        .await
        .map_err(RouteError::storage)?;

    issuer.send(
        "request_hard_refresh",
        serde_json::json!({
            "categories": settings.categories,
            "key_commands": settings.key_commands,
            "tasks": tasks,
        }),
    );
    Ok(())
}

async fn on_user_updated_categories(
    state: &WsState,
    issuer: &Issuer,
    data: serde_json::Value,
) -> Result<(), RouteError> {
    let user_id = authed_user(state, issuer)?;
    let categories: Vec<String> = decode(data)?;

    let user = state
        .users
        .update_categories(user_id, &categories.join(","))
        .await
        .map_err(RouteError::storage)?;

    state.registry.broadcast_to_user_excluding(
        user_id,
        issuer.sid,
        "related_user_updated_categories",
        serde_json::json!(user.categories.unwrap_or_default()),
    );
    Ok(())
}

async fn on_command_updated(
    state: &WsState,
    issuer: &Issuer,
    data: serde_json::Value,
) -> Result<(), RouteError> {
    let user_id = authed_user(state, issuer)?;
    let key_commands: String = decode(data)?;

    let user = state
        .users
        .update_commands(user_id, &key_commands)
        .await
        .map_err(RouteError::storage)?;

    state.registry.broadcast_to_user_excluding(
        user_id,
        issuer.sid,
        "related_command_updated",
        serde_json::json!(user.key_commands.unwrap_or_default()),
    );
    Ok(())
}

async fn on_notifications_fetch(
    state: &WsState,
    issuer: &Issuer,
    data: serde_json::Value,
) -> Result<(), RouteError> {
    let user_id = authed_user(state, issuer)?;
    let request: NotificationsFetchRequest = decode(data)?;

    let offset = request.offset.max(0);
    let limit = if request.limit <= 0 {
        DEFAULT_NOTIFICATION_PAGE
    } else {
        request.limit.min(MAX_NOTIFICATION_PAGE)
    };

    let filter = NotificationListFilter {
        user_id,
        statuses: request
            .statuses
            .iter()
            .filter_map(|status| NotificationStatus::parse(status))
            .collect(),
        notification_types: request.notification_types,
        priorities: request
            .priorities
            .iter()
            .filter_map(|priority| NotificationPriority::parse(priority))
            .collect(),
        include_snoozed: request.include_snoozed.unwrap_or(false),
        expired_only: request.expired_only.unwrap_or(false),
        offset,
        limit,
    };

    let notifications: Vec<Notification> = match state.notifications.list_for_user(&filter).await {
        Ok(batch) => batch,
        Err(err) if err.is_missing_relation() => Vec::new(),
        Err(err) => return Err(RouteError::storage(err)),
    };

    let has_more = notifications.len() as i64 == limit;
    issuer.send(
        "notifications_batch",
        serde_json::json!({
            "notifications": notifications,
            "offset": offset,
            "limit": limit,
            "has_more": has_more,
        }),
    );
    Ok(())
}

async fn on_notifications_mark_seen(
    state: &WsState,
    issuer: &Issuer,
    data: serde_json::Value,
    mark_all_when_empty: bool,
) -> Result<(), RouteError> {
    let user_id = authed_user(state, issuer)?;
    let request: NotificationIdsRequest = decode(data)?;
    let last_modified_at = Utc::now().timestamp_millis();

    let updated = if !request.notification_ids.is_empty() {
        state
            .notifications
            .mark_seen(user_id, &request.notification_ids, last_modified_at)
            .await
    } else if mark_all_when_empty {
        state
            .notifications
            .mark_all_seen(user_id, last_modified_at)
            .await
    } else {
        return Ok(());
    }
    .map_err(RouteError::storage)?;

    if !updated.is_empty() {
        state.registry.broadcast_to_user(
            user_id,
            "notifications_marked_seen",
            serde_json::json!({ "notifications": updated }),
        );
    }
    broadcast_unseen_count(
        state.notifications.as_ref(),
        state.registry.as_ref(),
        user_id,
    )
    .await;
    Ok(())
}

async fn on_notification_archive(
    state: &WsState,
    issuer: &Issuer,
    data: serde_json::Value,
) -> Result<(), RouteError> {
    let user_id = authed_user(state, issuer)?;
    let request: NotificationArchiveRequest = decode(data)?;
    if request.notification_id.is_nil() {
        return Err(RouteError::BadRequest("notification_id is required".into()));
    }

    let archived = state
        .notifications
        .archive(user_id, request.notification_id, Utc::now().timestamp_millis())
        .await
        .map_err(RouteError::storage)?;

    // Archiving an id that no longer exists is a quiet no-op.
    let Some(notification) = archived else {
        return Ok(());
    };

    state.registry.broadcast_to_user(
        user_id,
        "notification_archived",
        serde_json::to_value(&notification).unwrap_or_default(),
    );
    broadcast_unseen_count(
        state.notifications.as_ref(),
        state.registry.as_ref(),
        user_id,
    )
    .await;
    Ok(())
}

async fn on_notification_snooze(
    state: &WsState,
    issuer: &Issuer,
    data: serde_json::Value,
) -> Result<(), RouteError> {
    let user_id = authed_user(state, issuer)?;
    let request: NotificationSnoozeRequest = decode(data)?;
    if request.notification_id.is_nil() {
        return Err(RouteError::BadRequest("notification_id is required".into()));
    }

    let now = Utc::now();
    let snoozed_until = snooze_target(&request, now);

    let snoozed = state
        .notifications
        .snooze(
            user_id,
            request.notification_id,
            snoozed_until,
            now.timestamp_millis(),
        )
        .await
        .map_err(RouteError::storage)?;

    let Some(notification) = snoozed else {
        return Ok(());
    };

    state.registry.broadcast_to_user(
        user_id,
        "notification_snoozed",
        serde_json::to_value(&notification).unwrap_or_default(),
    );
    broadcast_unseen_count(
        state.notifications.as_ref(),
        state.registry.as_ref(),
        user_id,
    )
    .await;
    Ok(())
}

/// Resolve the snooze deadline: absolute epoch-ms target, relative minutes
/// or seconds, defaulting to five minutes; anything sooner than now + 5s is
/// coerced to the default.
fn snooze_target(request: &NotificationSnoozeRequest, now: DateTime<Utc>) -> DateTime<Utc> {
    let target = if let Some(at_ms) = request.snooze_until {
        DateTime::<Utc>::from_timestamp_millis(at_ms).unwrap_or(now)
    } else if let Some(minutes) = request.snooze_minutes {
        now + Duration::minutes(minutes)
    } else if let Some(seconds) = request.snooze_seconds {
        now + Duration::seconds(seconds)
    } else {
        now + Duration::minutes(5)
    };

    if target < now + Duration::seconds(5) {
        now + Duration::minutes(5)
    } else {
        target
    }
}

async fn on_schedule_create(
    state: &WsState,
    issuer: &Issuer,
    data: serde_json::Value,
) -> Result<(), RouteError> {
    let user_id = authed_user(state, issuer)?;
    let request: ScheduleCreateRequest = decode(data)?;
    let kind = ScheduleKind::parse(&request.kind)
        .ok_or_else(|| RouteError::BadRequest(format!("unknown schedule kind: {}", request.kind)))?;

    let schedule = state
        .schedules
        .create(&NewSchedule {
            user_id,
            kind,
            title: request.title,
            category: request.category,
            tz: request.tz,
            start_local: request.start_local,
            until_local: request.until_local,
            rrule: request.rrule,
            notify_offsets_min: request.notify_offsets_min,
            muted_offsets_min: request.muted_offsets_min,
            show_before_minutes: request.show_before_minutes,
        })
        .await
        .map_err(RouteError::storage)?;

    state.registry.broadcast_to_user(
        user_id,
        "schedule_created",
        serde_json::to_value(&schedule).unwrap_or_default(),
    );
    Ok(())
}

async fn on_schedule_edit(
    state: &WsState,
    issuer: &Issuer,
    data: serde_json::Value,
) -> Result<(), RouteError> {
    let user_id = authed_user(state, issuer)?;
    let request: ScheduleEditRequest = decode(data)?;

    let schedule = state
        .schedules
        .edit(&ScheduleEdit {
            id: request.id,
            title: request.title,
            category: request.category,
            tz: request.tz,
            start_local: request.start_local,
            until_local: request.until_local,
            rrule: request.rrule,
            notify_offsets_min: request.notify_offsets_min,
            muted_offsets_min: request.muted_offsets_min,
            show_before_minutes: request.show_before_minutes,
            is_active: request.is_active,
        })
        .await
        .map_err(RouteError::storage)?;

    state.registry.broadcast_to_user(
        user_id,
        "schedule_updated",
        serde_json::to_value(&schedule).unwrap_or_default(),
    );
    Ok(())
}

async fn on_schedule_delete(
    state: &WsState,
    issuer: &Issuer,
    data: serde_json::Value,
) -> Result<(), RouteError> {
    let user_id = authed_user(state, issuer)?;
    let request: ScheduleDeleteRequest = decode(data)?;

    state
        .schedules
        .delete(request.id)
        .await
        .map_err(RouteError::storage)?;

    state.registry.broadcast_to_user(
        user_id,
        "schedule_deleted",
        serde_json::json!({ "id": request.id }),
    );
    Ok(())
}

async fn on_schedule_list(state: &WsState, issuer: &Issuer) -> Result<(), RouteError> {
    let user_id = authed_user(state, issuer)?;

    let schedules = state
        .schedules
        .list_for_user(user_id)
        .await
        .map_err(RouteError::storage)?;

    issuer.send(
        "schedule_list",
        serde_json::to_value(&schedules).unwrap_or_default(),
    );
    Ok(())
}

/// Shorthand creating a one-off reminder schedule firing exactly once.
async fn on_reminder_submit(
    state: &WsState,
    issuer: &Issuer,
    data: serde_json::Value,
) -> Result<(), RouteError> {
    let user_id = authed_user(state, issuer)?;
    let request: ReminderSubmitRequest = decode(data)?;

    let schedule = state
        .schedules
        .create(&NewSchedule {
            user_id,
            kind: ScheduleKind::Reminder,
            title: request.title,
            category: request.category,
            tz: request.tz,
            start_local: request.remind_at_local,
            until_local: None,
            rrule: None,
            notify_offsets_min: vec![0],
            muted_offsets_min: Vec::new(),
            show_before_minutes: None,
        })
        .await
        .map_err(RouteError::storage)?;

    state.registry.broadcast_to_user(
        user_id,
        "schedule_created",
        serde_json::to_value(&schedule).unwrap_or_default(),
    );
    Ok(())
}
