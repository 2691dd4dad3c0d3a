//! WebSocket handler: live blacklist lists.
//!
//! DESIGN
//! ======
//! `GET /api/live?view=moderation|verified|landing` upgrades to a socket that
//! mirrors one shared `LiveList`. The current snapshot goes out immediately,
//! then a `live:snapshot` push follows every completed re-fetch. Clients may
//! send `live:ping` (answered with `done`) or `live:refresh` (answered with
//! the current snapshot as an `item`, then `done`).
//!
//! ACCESS
//! ======
//! `moderation` is admin-only, `verified` needs any signed-in identity, and
//! `landing` is public. The guard runs before the upgrade.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::auth::Viewer;
use crate::frame::{Data, ErrorCode, Frame, Kind};
use crate::model::{BlacklistEntry, Role};
use crate::services::guard::{self, GuardDecision, Route};
use crate::services::live::Snapshot;
use crate::state::AppState;

pub const SNAPSHOT_OP: &str = "live:snapshot";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveView {
    Moderation,
    Verified,
    Landing,
}

impl LiveView {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "moderation" => Some(Self::Moderation),
            "verified" => Some(Self::Verified),
            "landing" => Some(Self::Landing),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Moderation => "moderation",
            Self::Verified => "verified",
            Self::Landing => "landing",
        }
    }

    /// `None` for public views; `Some(None)` admits any signed-in caller.
    fn access(self) -> Option<Option<&'static [Role]>> {
        match self {
            Self::Moderation => Some(Some(guard::ADMIN)),
            Self::Verified => Some(None),
            Self::Landing => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum LiveError {
    #[error("invalid frame: {0}")]
    Malformed(String),
    #[error("unknown op: {0}")]
    UnknownOp(String),
}

impl ErrorCode for LiveError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "E_MALFORMED_FRAME",
            Self::UnknownOp(_) => "E_UNKNOWN_OP",
        }
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

#[derive(Deserialize)]
pub struct LiveQuery {
    view: Option<String>,
}

pub async fn handle_live(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(params): Query<LiveQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(view) = params.view.as_deref().and_then(LiveView::parse) else {
        return (StatusCode::BAD_REQUEST, "view must be moderation, verified or landing").into_response();
    };

    if let Some(roles) = view.access() {
        match guard::evaluate(&viewer.0, roles) {
            GuardDecision::Render => {}
            GuardDecision::Loading => return StatusCode::SERVICE_UNAVAILABLE.into_response(),
            GuardDecision::Redirect(Route::Login) => return StatusCode::UNAUTHORIZED.into_response(),
            GuardDecision::Redirect(Route::Home) => return StatusCode::FORBIDDEN.into_response(),
        }
    }

    let list = match view {
        LiveView::Moderation => &state.live.moderation,
        LiveView::Verified => &state.live.verified,
        LiveView::Landing => &state.live.landing,
    };
    debug!(
        view = view.as_str(),
        table = list.table().as_str(),
        subscribers = list.subscriber_count(),
        "live: upgrading"
    );
    let rx = list.subscribe();
    ws.on_upgrade(move |socket| run_live(socket, view, rx))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_live(mut socket: WebSocket, view: LiveView, mut rx: watch::Receiver<Snapshot<BlacklistEntry>>) {
    info!(view = view.as_str(), "live: client connected");

    let initial = rx.borrow_and_update().clone();
    if send_frame(&mut socket, &snapshot_push(view, &initial)).await.is_err() {
        return;
    }

    'conn: loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break 'conn;
                }
                let snapshot = rx.borrow_and_update().clone();
                if send_frame(&mut socket, &snapshot_push(view, &snapshot)).await.is_err() {
                    break 'conn;
                }
            }
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break 'conn };
                match msg {
                    Message::Text(text) => {
                        let snapshot = rx.borrow().clone();
                        for frame in process_inbound_text(view, &snapshot, &text) {
                            if send_frame(&mut socket, &frame).await.is_err() {
                                break 'conn;
                            }
                        }
                    }
                    Message::Close(_) => break 'conn,
                    _ => {}
                }
            }
        }
    }

    info!(view = view.as_str(), "live: client disconnected");
}

fn snapshot_data(view: LiveView, snapshot: &Snapshot<BlacklistEntry>) -> Data {
    let mut data = Data::new();
    data.insert("view".into(), serde_json::json!(view.as_str()));
    data.insert("generation".into(), serde_json::json!(snapshot.generation));
    data.insert("items".into(), serde_json::json!(snapshot.items.as_slice()));
    data
}

pub(crate) fn snapshot_push(view: LiveView, snapshot: &Snapshot<BlacklistEntry>) -> Frame {
    Frame::push(SNAPSHOT_OP, snapshot_data(view, snapshot))
}

/// Parse one inbound text frame and return the replies for the sender.
fn process_inbound_text(view: LiveView, snapshot: &Snapshot<BlacklistEntry>, text: &str) -> Vec<Frame> {
    let req: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "live: invalid inbound frame");
            let err = LiveError::Malformed(e.to_string());
            let mut reply = Frame::request("live:error", Data::new()).error_from(&err);
            reply.reply_to = None;
            return vec![reply];
        }
    };
    if req.kind != Kind::Request {
        return Vec::new();
    }

    match req.op.as_str() {
        "live:ping" => vec![req.done()],
        "live:refresh" => vec![req.item(snapshot_data(view, snapshot)), req.done()],
        other => vec![req.error_from(&LiveError::UnknownOp(other.to_owned()))],
    }
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "live: failed to serialize frame");
            return Err(());
        }
    };
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
#[path = "live_test.rs"]
mod tests;
