//! Task aggregate and its accumulated-duration value type.
//!
//! ## Invariants
//! - `is_active` implies `toggled_at` is set.
//! - `is_completed` implies `completed_at` is set and `is_active` is false.
//! - `duration` accumulates wall-clock time between successive toggles; the
//!   open segment (since `toggled_at`) is only folded in when the task is
//!   completed or rolled over.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors raised when parsing an `HH:MM:SS` duration string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskDurationParseError {
    /// The string did not have three colon-separated fields.
    #[error("duration must be formatted as HH:MM:SS")]
    Malformed,
    /// A field was not a non-negative integer, or minutes/seconds were >= 60.
    #[error("duration field out of range: {field}")]
    FieldOutOfRange { field: &'static str },
}

/// Accumulated task duration, carried over the wire as `HH:MM:SS`.
///
/// Hours are unbounded (a task can accumulate more than a day); minutes and
/// seconds are always `0..60`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskDuration {
    total_seconds: i64,
}

impl TaskDuration {
    /// The zero duration (`00:00:00`).
    pub const ZERO: Self = Self { total_seconds: 0 };

    /// Build from a whole number of seconds. Negative input clamps to zero.
    pub fn from_seconds(seconds: i64) -> Self {
        Self {
            total_seconds: seconds.max(0),
        }
    }

    /// Build from milliseconds, truncating sub-second precision.
    pub fn from_millis(millis: i64) -> Self {
        Self::from_seconds(millis / 1_000)
    }

    /// Total seconds represented by this duration.
    pub fn as_seconds(&self) -> i64 {
        self.total_seconds
    }

    /// Total milliseconds represented by this duration.
    pub fn as_millis(&self) -> i64 {
        self.total_seconds * 1_000
    }

    /// Sum of two durations.
    #[must_use]
    pub fn plus(&self, other: Self) -> Self {
        Self::from_seconds(self.total_seconds + other.total_seconds)
    }

    /// Parse an `HH:MM:SS` string.
    pub fn parse(text: &str) -> Result<Self, TaskDurationParseError> {
        let mut parts = text.split(':');
        let (Some(h), Some(m), Some(s), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TaskDurationParseError::Malformed);
        };

        let hours: i64 = h
            .parse()
            .map_err(|_| TaskDurationParseError::FieldOutOfRange { field: "hours" })?;
        let minutes: i64 = m
            .parse()
            .map_err(|_| TaskDurationParseError::FieldOutOfRange { field: "minutes" })?;
        let seconds: i64 = s
            .parse()
            .map_err(|_| TaskDurationParseError::FieldOutOfRange { field: "seconds" })?;

        if hours < 0 {
            return Err(TaskDurationParseError::FieldOutOfRange { field: "hours" });
        }
        if !(0..60).contains(&minutes) {
            return Err(TaskDurationParseError::FieldOutOfRange { field: "minutes" });
        }
        if !(0..60).contains(&seconds) {
            return Err(TaskDurationParseError::FieldOutOfRange { field: "seconds" });
        }

        Ok(Self::from_seconds(hours * 3_600 + minutes * 60 + seconds))
    }
}

impl std::fmt::Display for TaskDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hours = self.total_seconds / 3_600;
        let minutes = (self.total_seconds / 60) % 60;
        let seconds = self.total_seconds % 60;
        write!(f, "{hours:02}:{minutes:02}:{seconds:02}")
    }
}

impl Serialize for TaskDuration {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TaskDuration {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// A user task, either ad-hoc or materialized from a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration: TaskDuration,
    pub category: String,
    pub tags: Vec<String>,
    /// Epoch milliseconds of the most recent activation toggle.
    pub toggled_at: Option<i64>,
    pub is_active: bool,
    pub is_completed: bool,
    /// Epoch milliseconds of the last mutation.
    pub last_modified_at: i64,
    pub priority: Option<i32>,
    pub due_at: Option<DateTime<Utc>>,
    /// Minutes before `due_at` at which the task becomes visible.
    pub show_before_due_time: Option<i32>,
}

impl Task {
    /// Duration of the currently open activity segment in milliseconds,
    /// clamped at zero when the toggle stamp lies in the future.
    pub fn open_segment_millis(&self, now_ms: i64) -> i64 {
        match self.toggled_at {
            Some(toggled_at) if toggled_at != 0 => (now_ms - toggled_at).max(0),
            _ => 0,
        }
    }

    /// Whether the midnight roll-over should close and reseed this task:
    /// it is not completed and has either accumulated time or an open toggle.
    pub fn carries_time(&self) -> bool {
        !self.is_completed
            && (self.duration.as_seconds() > 0 || self.toggled_at.unwrap_or(0) != 0)
    }
}

/// Fields required to insert a task row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration: TaskDuration,
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

impl NewTask {
    /// A clone of `source` with activity, completion, duration, and timing
    /// reset, stamped with `now`.
    pub fn duplicate_of(source: &Task, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: source.user_id,
            title: source.title.clone(),
            description: source.description.clone(),
            created_at: now,
            completed_at: None,
            duration: TaskDuration::ZERO,
            category: source.category.clone(),
            tags: source.tags.clone(),
            toggled_at: None,
            is_active: false,
            is_completed: false,
            last_modified_at: now.timestamp_millis(),
            priority: source.priority,
            due_at: source.due_at,
            show_before_due_time: source.show_before_due_time,
        }
    }
}

/// Patch applied by a task edit.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEdit {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub last_modified_at: i64,
    pub priority: Option<i32>,
    pub due_at: Option<DateTime<Utc>>,
    pub show_before_due_time: Option<i32>,
}

/// Patch applied by an activity toggle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskToggle {
    pub id: Uuid,
    pub toggled_at: Option<i64>,
    pub is_active: bool,
    pub duration: TaskDuration,
    pub last_modified_at: i64,
}

/// Patch applied when a task is completed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskCompletion {
    pub id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub duration: TaskDuration,
    pub last_modified_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("00:00:00", 0)]
    #[case("01:30:00", 5_400)]
    #[case("48:00:01", 172_801)]
    fn parses_valid_durations(#[case] text: &str, #[case] seconds: i64) {
        let duration = TaskDuration::parse(text).expect("valid duration");
        assert_eq!(duration.as_seconds(), seconds);
        assert_eq!(duration.to_string(), text);
    }

    #[rstest]
    #[case("90:00")]
    #[case("1:2:3:4")]
    #[case("aa:00:00")]
    #[case("00:61:00")]
    #[case("00:00:75")]
    fn rejects_malformed_durations(#[case] text: &str) {
        assert!(TaskDuration::parse(text).is_err());
    }

    #[rstest]
    fn duration_sum_and_millis_round_trip() {
        let a = TaskDuration::parse("02:15:00").expect("valid");
        let b = TaskDuration::from_millis(a.as_millis());
        assert_eq!(a, b);
        assert_eq!(a.plus(TaskDuration::from_seconds(60)).to_string(), "02:16:00");
    }

    #[rstest]
    fn negative_seconds_clamp_to_zero() {
        assert_eq!(TaskDuration::from_seconds(-5), TaskDuration::ZERO);
    }

    fn sample_task() -> Task {
        Task {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Write report".into(),
            description: String::new(),
            created_at: Utc::now(),
            completed_at: None,
            duration: TaskDuration::ZERO,
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
    fn open_segment_is_clamped_at_zero() {
        let mut task = sample_task();
        task.toggled_at = Some(10_000);
        assert_eq!(task.open_segment_millis(4_000), 0);
        assert_eq!(task.open_segment_millis(16_000), 6_000);
    }

    #[rstest]
    fn carries_time_requires_duration_or_toggle() {
        let mut task = sample_task();
        assert!(!task.carries_time());

        task.duration = TaskDuration::from_seconds(30);
        assert!(task.carries_time());

        task.duration = TaskDuration::ZERO;
        task.toggled_at = Some(1);
        assert!(task.carries_time());

        task.is_completed = true;
        assert!(!task.carries_time());
    }

    #[rstest]
    fn serializes_duration_as_clock_string() {
        let mut task = sample_task();
        task.duration = TaskDuration::parse("00:45:00").expect("valid");
        let value = serde_json::to_value(&task).expect("serializable");
        assert_eq!(value["duration"], "00:45:00");
    }

    #[rstest]
    fn duplicate_resets_activity_and_timing() {
        let mut source = sample_task();
        source.duration = TaskDuration::parse("01:00:00").expect("valid");
        source.is_active = true;
        source.toggled_at = Some(123);
        source.priority = Some(2);

        let now = Utc::now();
        let copy = NewTask::duplicate_of(&source, now);

        assert_ne!(copy.id, source.id);
        assert_eq!(copy.duration, TaskDuration::ZERO);
        assert!(!copy.is_active && !copy.is_completed);
        assert_eq!(copy.toggled_at, None);
        assert_eq!(copy.priority, Some(2));
        assert_eq!(copy.created_at, now);
    }
}
