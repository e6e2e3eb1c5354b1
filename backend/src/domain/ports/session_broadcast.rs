//! Port for fanning events out to a user's live sessions.
//!
//! Implemented by the WebSocket session registry. Delivery is
//! fire-and-forget: the registry is not authoritative (clients reconnect
//! and re-sync from storage), so a failed push is logged by the adapter and
//! never propagated back into a tick.

use uuid::Uuid;

/// Fan one logical event out to sessions of a user.
#[cfg_attr(test, mockall::automock)]
pub trait SessionBroadcast: Send + Sync {
    /// Deliver `event` to every live session of `user_id`.
    fn broadcast_to_user(&self, user_id: Uuid, event: &str, payload: serde_json::Value);

    /// Whether the user currently has any live session. Lets clock-driven
    /// jobs skip per-user reloads nobody would receive.
    fn has_sessions(&self, user_id: Uuid) -> bool;
}

/// Fixture that swallows every broadcast.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureSessionBroadcast;

impl SessionBroadcast for FixtureSessionBroadcast {
    fn broadcast_to_user(&self, _user_id: Uuid, _event: &str, _payload: serde_json::Value) {}

    fn has_sessions(&self, _user_id: Uuid) -> bool {
        false
    }
}
