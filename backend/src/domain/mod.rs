//! Domain entities, recurrence expansion, and the clock-driven services.
//!
//! Everything here is I/O-free except through the port traits in
//! [`ports`]; adapters live under `inbound/` and `outbound/`.

pub mod cleanup;
pub mod dispatcher;
pub mod evaluator;
pub mod notification;
pub mod planner;
pub mod ports;
pub mod recurrence;
pub mod rollover;
pub mod schedule;
pub mod snooze;
pub mod task;
pub(crate) mod unseen_count;
pub mod user;

pub use self::cleanup::OccurrenceCleanup;
pub use self::dispatcher::NotificationDispatcher;
pub use self::evaluator::TaskEvaluator;
pub use self::notification::{
    JobPayload, JobState, NewNotification, NewNotificationJob, Notification, NotificationJob,
    NotificationPriority, NotificationStatus,
};
pub use self::planner::SchedulePlanner;
pub use self::recurrence::{Frequency, RecurrenceError, RecurrenceExpansion};
pub use self::rollover::MidnightRollover;
pub use self::schedule::{NewSchedule, Occurrence, Schedule, ScheduleEdit, ScheduleKind};
pub use self::snooze::SnoozeReleaser;
pub use self::task::{
    NewTask, Task, TaskCompletion, TaskDuration, TaskDurationParseError, TaskEdit, TaskToggle,
};
pub use self::user::{NewUser, User, UserSettings};
