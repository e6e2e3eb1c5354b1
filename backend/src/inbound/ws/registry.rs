//! Process-wide registry of live WebSocket sessions.
//!
//! The registry maps session id → (user id, actor mailbox). Broadcasts take
//! the read lock; membership changes take the write lock and move the
//! per-user connection gauge. The registry is not authoritative: clients
//! that reconnect rebuild their state from storage, so delivery is
//! fire-and-forget through the actor mailbox.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use actix::Recipient;
use tracing::debug;
use uuid::Uuid;

use crate::domain::ports::{SessionBroadcast, Telemetry};

use super::messages::{frame, OutboundEvent};

struct SessionHandle {
    user_id: Uuid,
    mailbox: Recipient<OutboundEvent>,
}

/// Shared session registry; cheap to clone behind `Arc`.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
    telemetry: Arc<dyn Telemetry>,
}

impl SessionRegistry {
    pub fn new(telemetry: Arc<dyn Telemetry>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            telemetry,
        }
    }

    /// Register a session after a successful handshake.
    pub fn add(&self, sid: Uuid, user_id: Uuid, mailbox: Recipient<OutboundEvent>) {
        let mut sessions = self.sessions.write().expect("session lock poisoned");
        sessions.insert(sid, SessionHandle { user_id, mailbox });
        self.telemetry.connection_opened(user_id);
        debug!(%sid, %user_id, "session added");
    }

    /// Drop a session on disconnect. Unknown ids are a no-op.
    pub fn remove(&self, sid: Uuid) {
        let mut sessions = self.sessions.write().expect("session lock poisoned");
        if let Some(handle) = sessions.remove(&sid) {
            self.telemetry.connection_closed(handle.user_id);
            debug!(%sid, user_id = %handle.user_id, "session removed");
        }
    }

    /// The user a session authenticated as, if it completed the handshake.
    pub fn user_id_of(&self, sid: Uuid) -> Option<Uuid> {
        let sessions = self.sessions.read().expect("session lock poisoned");
        sessions.get(&sid).map(|handle| handle.user_id)
    }

    /// Deliver one event to one session.
    pub fn send_to_session(&self, sid: Uuid, event: &str, payload: serde_json::Value) {
        let sessions = self.sessions.read().expect("session lock poisoned");
        if let Some(handle) = sessions.get(&sid) {
            handle.mailbox.do_send(OutboundEvent(frame(event, payload)));
        }
    }

    /// Deliver one event to every session of a user except the issuer.
    pub fn broadcast_to_user_excluding(
        &self,
        user_id: Uuid,
        issuer: Uuid,
        event: &str,
        payload: serde_json::Value,
    ) {
        let text = frame(event, payload);
        let sessions = self.sessions.read().expect("session lock poisoned");
        for (sid, handle) in sessions.iter() {
            if handle.user_id == user_id && *sid != issuer {
                handle.mailbox.do_send(OutboundEvent(text.clone()));
            }
        }
    }

    /// Live session count (diagnostics only).
    pub fn len(&self) -> usize {
        self.sessions.read().expect("session lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionBroadcast for SessionRegistry {
    fn broadcast_to_user(&self, user_id: Uuid, event: &str, payload: serde_json::Value) {
        let text = frame(event, payload);
        let sessions = self.sessions.read().expect("session lock poisoned");
        for handle in sessions.values() {
            if handle.user_id == user_id {
                handle.mailbox.do_send(OutboundEvent(text.clone()));
            }
        }
    }

    fn has_sessions(&self, user_id: Uuid) -> bool {
        let sessions = self.sessions.read().expect("session lock poisoned");
        sessions.values().any(|handle| handle.user_id == user_id)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! A recorder actor standing in for a live connection.

    use std::sync::{Arc, Mutex};

    use actix::{Actor, Context, Handler, Recipient};

    use super::super::messages::{EventMessage, OutboundEvent};

    #[derive(Default)]
    pub struct Recorder {
        frames: Arc<Mutex<Vec<EventMessage>>>,
    }

    impl Recorder {
        pub fn start_recording() -> (Recipient<OutboundEvent>, Arc<Mutex<Vec<EventMessage>>>) {
            let frames = Arc::new(Mutex::new(Vec::new()));
            let actor = Recorder {
                frames: frames.clone(),
            };
            (actor.start().recipient(), frames)
        }
    }

    impl Actor for Recorder {
        type Context = Context<Self>;
    }

    impl Handler<OutboundEvent> for Recorder {
        type Result = ();

        fn handle(&mut self, msg: OutboundEvent, _ctx: &mut Self::Context) {
            if let Ok(event) = serde_json::from_str::<EventMessage>(&msg.0) {
                self.frames.lock().expect("recorder lock").push(event);
            }
        }
    }

    /// Let the actor mailboxes drain before asserting.
    pub async fn flush() {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{flush, Recorder};
    use super::*;
    use crate::domain::ports::NoOpTelemetry;
    use rstest::rstest;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(Arc::new(NoOpTelemetry))
    }

    #[rstest]
    #[actix_rt::test]
    async fn broadcast_reaches_every_session_of_the_user() {
        let registry = registry();
        let user = Uuid::new_v4();
        let other_user = Uuid::new_v4();

        let (mailbox_a, frames_a) = Recorder::start_recording();
        let (mailbox_b, frames_b) = Recorder::start_recording();
        let (mailbox_c, frames_c) = Recorder::start_recording();
        registry.add(Uuid::new_v4(), user, mailbox_a);
        registry.add(Uuid::new_v4(), user, mailbox_b);
        registry.add(Uuid::new_v4(), other_user, mailbox_c);

        registry.broadcast_to_user(user, "notification_created", serde_json::json!({"n": 1}));
        flush().await;

        assert_eq!(frames_a.lock().expect("lock").len(), 1);
        assert_eq!(frames_b.lock().expect("lock").len(), 1);
        assert!(frames_c.lock().expect("lock").is_empty());
    }

    #[rstest]
    #[actix_rt::test]
    async fn excluding_broadcast_skips_the_issuer() {
        let registry = registry();
        let user = Uuid::new_v4();
        let issuer_sid = Uuid::new_v4();

        let (mailbox_issuer, frames_issuer) = Recorder::start_recording();
        let (mailbox_other, frames_other) = Recorder::start_recording();
        registry.add(issuer_sid, user, mailbox_issuer);
        registry.add(Uuid::new_v4(), user, mailbox_other);

        registry.broadcast_to_user_excluding(
            user,
            issuer_sid,
            "related_task_edited",
            serde_json::json!({}),
        );
        flush().await;

        assert!(frames_issuer.lock().expect("lock").is_empty());
        assert_eq!(frames_other.lock().expect("lock").len(), 1);
        assert_eq!(
            frames_other.lock().expect("lock")[0].event,
            "related_task_edited"
        );
    }

    #[rstest]
    #[actix_rt::test]
    async fn removed_sessions_stop_receiving() {
        let registry = registry();
        let user = Uuid::new_v4();
        let sid = Uuid::new_v4();

        let (mailbox, frames) = Recorder::start_recording();
        registry.add(sid, user, mailbox);
        assert!(registry.has_sessions(user));
        assert_eq!(registry.user_id_of(sid), Some(user));

        registry.remove(sid);
        assert!(!registry.has_sessions(user));
        assert_eq!(registry.user_id_of(sid), None);

        registry.broadcast_to_user(user, "ping", serde_json::json!(""));
        flush().await;
        assert!(frames.lock().expect("lock").is_empty());
    }

    #[rstest]
    #[actix_rt::test]
    async fn send_to_session_targets_exactly_one() {
        let registry = registry();
        let user = Uuid::new_v4();
        let sid_a = Uuid::new_v4();

        let (mailbox_a, frames_a) = Recorder::start_recording();
        let (mailbox_b, frames_b) = Recorder::start_recording();
        registry.add(sid_a, user, mailbox_a);
        registry.add(Uuid::new_v4(), user, mailbox_b);

        registry.send_to_session(sid_a, "connected", serde_json::json!({"sid": sid_a}));
        flush().await;

        assert_eq!(frames_a.lock().expect("lock").len(), 1);
        assert!(frames_b.lock().expect("lock").is_empty());
    }
}
