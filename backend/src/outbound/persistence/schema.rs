//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match the migrations exactly; Diesel uses them
//! for compile-time query validation and type-safe SQL generation.

diesel::table! {
    /// Registered users keyed by UUID, identified externally by an opaque
    /// identifier presented at handshake time.
    users (id) {
        id -> Uuid,
        email -> Varchar,
        first_name -> Varchar,
        last_name -> Varchar,
        external_id -> Nullable<Varchar>,
        /// Comma-separated category blob owned by the client.
        categories -> Nullable<Text>,
        /// Comma-separated key command blob owned by the client.
        key_commands -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// User tasks, ad-hoc or materialized from schedules.
    tasks (id) {
        id -> Uuid,
        user_id -> Uuid,
        title -> Varchar,
        description -> Text,
        created_at -> Timestamptz,
        completed_at -> Nullable<Timestamptz>,
        /// Accumulated duration as HH:MM:SS.
        duration -> Varchar,
        category -> Varchar,
        tags -> Array<Text>,
        /// Epoch milliseconds of the most recent activation toggle.
        toggled_at -> Nullable<Int8>,
        is_active -> Bool,
        is_completed -> Bool,
        last_modified_at -> Int8,
        priority -> Nullable<Int4>,
        due_at -> Nullable<Timestamptz>,
        show_before_due_time -> Nullable<Int4>,
    }
}

diesel::table! {
    /// Recurring or one-off schedules.
    schedules (id) {
        id -> Uuid,
        user_id -> Uuid,
        /// "task" or "reminder".
        kind -> Varchar,
        title -> Varchar,
        category -> Nullable<Varchar>,
        /// IANA zone name.
        tz -> Varchar,
        start_local -> Timestamp,
        until_local -> Nullable<Timestamp>,
        rrule -> Nullable<Text>,
        rev -> Int4,
        notify_offsets_min -> Array<Int4>,
        muted_offsets_min -> Array<Int4>,
        show_before_minutes -> Nullable<Int4>,
        last_materialized_until -> Nullable<Timestamptz>,
        is_active -> Bool,
    }
}

diesel::table! {
    /// Materialized schedule firings, unique on (schedule_id, occurs_at).
    occurrences (id) {
        id -> Uuid,
        schedule_id -> Uuid,
        occurs_at -> Timestamptz,
        rev -> Int4,
    }
}

diesel::table! {
    /// One-to-one link between an occurrence and its emitted task.
    occurrence_tasks (occurrence_id) {
        occurrence_id -> Uuid,
        task_id -> Uuid,
    }
}

diesel::table! {
    /// Planned notification emissions, unique on
    /// (occurrence_id, offset_minutes).
    notification_jobs (id) {
        id -> Uuid,
        user_id -> Uuid,
        schedule_id -> Nullable<Uuid>,
        occurrence_id -> Uuid,
        offset_minutes -> Int4,
        planned_send_at -> Timestamptz,
        payload -> Jsonb,
        /// "pending", "claimed", or "done".
        state -> Varchar,
        claimed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// User-visible notifications.
    notifications (id) {
        id -> Uuid,
        user_id -> Uuid,
        title -> Varchar,
        description -> Nullable<Text>,
        /// "unseen", "seen", or "archived".
        status -> Varchar,
        notification_type -> Varchar,
        payload -> Jsonb,
        /// "low", "normal", or "high".
        priority -> Varchar,
        expires_at -> Nullable<Timestamptz>,
        snoozed_until -> Nullable<Timestamptz>,
        last_modified_at -> Int8,
    }
}

diesel::joinable!(occurrences -> schedules (schedule_id));
diesel::joinable!(occurrence_tasks -> occurrences (occurrence_id));
diesel::joinable!(occurrence_tasks -> tasks (task_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    tasks,
    schedules,
    occurrences,
    occurrence_tasks,
    notification_jobs,
    notifications,
);
