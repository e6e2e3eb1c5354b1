//! Shared WebSocket adapter state.
//!
//! Session actors and the event router depend on domain ports plus the
//! session registry, bundled here so handlers stay testable with
//! deterministic doubles.

use std::sync::Arc;

use crate::domain::ports::{
    NotificationRepository, ScheduleRepository, TaskRepository, Telemetry, UserRepository,
};

use super::registry::SessionRegistry;

/// Dependency bundle for WebSocket sessions and the event router.
#[derive(Clone)]
pub struct WsState {
    pub registry: Arc<SessionRegistry>,
    pub users: Arc<dyn UserRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub schedules: Arc<dyn ScheduleRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub telemetry: Arc<dyn Telemetry>,
}
