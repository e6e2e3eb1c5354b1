//! WebSocket inbound adapter.
//!
//! Responsibilities:
//! - upgrade requests on `/ws/taskbar`
//! - per-connection actors (keepalive, frame decode)
//! - the live session registry and per-user fan-out
//! - routing decoded events into the domain

use actix_web::web::{self, Payload};
use actix_web::{get, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use tracing::error;

pub mod messages;
pub mod registry;
mod router;
mod session;
pub mod state;

pub use registry::SessionRegistry;
pub use state::WsState;

/// Handle WebSocket upgrade for the `/ws/taskbar` endpoint.
#[get("/ws/taskbar")]
pub async fn ws_entry(
    state: web::Data<WsState>,
    req: HttpRequest,
    stream: Payload,
) -> actix_web::Result<HttpResponse> {
    let actor = session::WsSession::new(state.get_ref().clone());
    ws::start(actor, &req, stream).map_err(|err| {
        error!(error = %err, "websocket upgrade failed");
        actix_web::error::ErrorInternalServerError("WebSocket upgrade failed")
    })
}
