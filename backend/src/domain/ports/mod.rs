//! Domain ports for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod job_queue;
mod notification_repository;
mod schedule_repository;
mod session_broadcast;
mod task_repository;
mod telemetry;
mod user_repository;

#[cfg(test)]
pub use job_queue::MockNotificationJobQueue;
pub use job_queue::{JobQueueError, NotificationJobQueue};
#[cfg(test)]
pub use notification_repository::MockNotificationRepository;
pub use notification_repository::{
    NotificationListFilter, NotificationPersistenceError, NotificationRepository,
};
#[cfg(test)]
pub use schedule_repository::MockScheduleRepository;
pub use schedule_repository::{SchedulePersistenceError, ScheduleRepository};
#[cfg(test)]
pub use session_broadcast::MockSessionBroadcast;
pub use session_broadcast::{FixtureSessionBroadcast, SessionBroadcast};
#[cfg(test)]
pub use task_repository::MockTaskRepository;
pub use task_repository::{CompletedTasksFilter, TaskPersistenceError, TaskRepository};
pub use telemetry::{NoOpTelemetry, Telemetry};
#[cfg(test)]
pub use user_repository::MockUserRepository;
pub use user_repository::{UserPersistenceError, UserRepository};
