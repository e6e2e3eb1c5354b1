//! Diesel/PostgreSQL persistence adapters.

mod diesel_job_queue;
mod diesel_notification_repository;
mod diesel_schedule_repository;
mod diesel_task_repository;
mod diesel_user_repository;
mod error_mapping;
pub mod models;
pub mod pool;
pub mod schema;
mod timing;

pub use diesel_job_queue::DieselNotificationJobQueue;
pub use diesel_notification_repository::DieselNotificationRepository;
pub use diesel_schedule_repository::DieselScheduleRepository;
pub use diesel_task_repository::DieselTaskRepository;
pub use diesel_user_repository::DieselUserRepository;
pub use pool::{DbPool, PoolError};
