//! Schedules and their materialized occurrences.
//!
//! A schedule describes either a recurring rule (`rrule` set) or a one-off
//! firing at `start_local`. The planner expands active schedules into
//! `Occurrence` rows; each occurrence snapshots the schedule revision so a
//! later edit invalidates jobs planned against the stale expansion.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a schedule materializes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    /// Occurrences become linked tasks with advance notifications.
    Task,
    /// Occurrences fire a single exact-time notification.
    Reminder,
}

impl ScheduleKind {
    /// Stable storage/wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Reminder => "reminder",
        }
    }

    /// Parse a storage label, rejecting unknown values.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "task" => Some(Self::Task),
            "reminder" => Some(Self::Reminder),
            _ => None,
        }
    }
}

/// A recurring or one-off plan owned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: ScheduleKind,
    pub title: String,
    pub category: Option<String>,
    /// IANA zone name the local times below are interpreted in.
    pub tz: String,
    pub start_local: NaiveDateTime,
    pub until_local: Option<NaiveDateTime>,
    /// iCalendar RRULE text; absent for one-off schedules.
    pub rrule: Option<String>,
    /// Monotonic revision, incremented on every user edit.
    pub rev: i32,
    pub notify_offsets_min: Vec<i32>,
    pub muted_offsets_min: Vec<i32>,
    pub show_before_minutes: Option<i32>,
    pub last_materialized_until: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl Schedule {
    /// Offsets that should produce notification jobs: the configured set
    /// minus the muted subset, in configuration order.
    pub fn effective_offsets(&self) -> Vec<i32> {
        self.notify_offsets_min
            .iter()
            .copied()
            .filter(|offset| !self.muted_offsets_min.contains(offset))
            .collect()
    }

    /// One-off schedules have no recurrence rule.
    pub fn is_one_off(&self) -> bool {
        self.rrule.as_deref().map_or(true, |text| text.is_empty())
    }
}

/// Fields required to insert a schedule row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSchedule {
    pub user_id: Uuid,
    pub kind: ScheduleKind,
    pub title: String,
    pub category: Option<String>,
    pub tz: String,
    pub start_local: NaiveDateTime,
    pub until_local: Option<NaiveDateTime>,
    pub rrule: Option<String>,
    pub notify_offsets_min: Vec<i32>,
    pub muted_offsets_min: Vec<i32>,
    pub show_before_minutes: Option<i32>,
}

/// Patch applied by a schedule edit; the adapter bumps `rev`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEdit {
    pub id: Uuid,
    pub title: String,
    pub category: Option<String>,
    pub tz: String,
    pub start_local: NaiveDateTime,
    pub until_local: Option<NaiveDateTime>,
    pub rrule: Option<String>,
    pub notify_offsets_min: Vec<i32>,
    pub muted_offsets_min: Vec<i32>,
    pub show_before_minutes: Option<i32>,
    pub is_active: bool,
}

/// A materialized firing of a schedule at a specific UTC instant.
///
/// Unique on `(schedule_id, occurs_at)`; `rev` snapshots the schedule
/// revision at materialization time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub occurs_at: DateTime<Utc>,
    pub rev: i32,
}
