//! Per-connection WebSocket actor.
//!
//! Keeps framing and keepalive at the edge and defers application behaviour
//! to the event router. Keepalive is envelope-level: the server sends a
//! `{"event":"ping"}` frame every five seconds and closes the connection
//! when no `pong` event arrives for a minute. Tests shorten both intervals.

use std::time::{Duration, Instant};

use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web_actors::ws::{self, CloseCode, CloseReason, Message, ProtocolError};
use tracing::{debug, warn};
use uuid::Uuid;

use super::messages::{frame, EventMessage, OutboundEvent};
use super::router::{self, Issuer};
use super::state::WsState;

/// Time between envelope pings (5s in production, shorter in tests).
#[cfg(not(test))]
const PING_INTERVAL: Duration = Duration::from_secs(5);
#[cfg(test)]
const PING_INTERVAL: Duration = Duration::from_millis(50);

/// Max silence before the connection is considered dead (60s in
/// production, shorter in tests).
#[cfg(not(test))]
const PONG_TIMEOUT: Duration = Duration::from_secs(60);
#[cfg(test)]
const PONG_TIMEOUT: Duration = Duration::from_millis(200);

pub struct WsSession {
    sid: Uuid,
    state: WsState,
    last_pong: Instant,
}

impl WsSession {
    pub fn new(state: WsState) -> Self {
        Self {
            sid: Uuid::new_v4(),
            state,
            last_pong: Instant::now(),
        }
    }

    fn handle_frame(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let message = match serde_json::from_str::<EventMessage>(text) {
            Ok(message) => message,
            Err(err) => {
                warn!(sid = %self.sid, error = %err, "malformed frame skipped");
                return;
            }
        };

        // Pongs only refresh liveness; they never queue.
        if message.event == "pong" {
            self.last_pong = Instant::now();
            return;
        }

        let issuer = Issuer {
            sid: self.sid,
            mailbox: ctx.address().recipient(),
        };
        let state = self.state.clone();
        let fut = router::dispatch(state, issuer, message.event, message.data);
        // wait, not spawn: events on one session are handled strictly in
        // arrival order.
        ctx.wait(actix::fut::wrap_future(fut));
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.last_pong = Instant::now();
        ctx.run_interval(PING_INTERVAL, |actor, ctx| {
            if Instant::now().duration_since(actor.last_pong) > PONG_TIMEOUT {
                warn!(sid = %actor.sid, "no pong received, closing connection");
                ctx.close(Some(CloseReason {
                    code: CloseCode::Normal,
                    description: Some("no pong response".into()),
                }));
                ctx.stop();
                return;
            }
            ctx.text(frame("ping", serde_json::json!("")));
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.state.registry.remove(self.sid);
        debug!(sid = %self.sid, "websocket session stopped");
    }
}

/// Outbound frames from the registry are written straight to the socket.
impl actix::Handler<OutboundEvent> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: OutboundEvent, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<Message, ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<Message, ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(Message::Text(text)) => {
                self.handle_frame(&text, ctx);
            }
            Ok(Message::Ping(payload)) => {
                self.last_pong = Instant::now();
                ctx.pong(&payload);
            }
            Ok(Message::Pong(_)) | Ok(Message::Binary(_)) => {
                self.last_pong = Instant::now();
            }
            Ok(Message::Close(reason)) => {
                debug!(sid = %self.sid, "client closed connection");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(Message::Nop) | Ok(Message::Continuation(_)) => {}
            Err(err) => {
                warn!(sid = %self.sid, error = %err, "websocket protocol error");
                ctx.close(Some(CloseReason {
                    code: CloseCode::Protocol,
                    description: Some("protocol error".into()),
                }));
                ctx.stop();
            }
        }
    }
}
