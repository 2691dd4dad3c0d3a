//! Frame: the message envelope of the live-list websocket.
//!
//! PROTOCOL
//! ========
//! The server pushes `live:snapshot` frames with `kind = push` whenever a
//! watched list finishes a re-fetch. Clients send `kind = request` frames
//! (`live:ping`, `live:refresh`) and receive `item`, `done` or `error`
//! replies whose `reply_to` names the request id. A request ends with exactly
//! one `done` or `error`.
//!
//! The payload is a flat JSON object; the socket handler dispatches on `op`
//! and leaves `data` to the op.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub type Data = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Request,
    Push,
    Item,
    Done,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub id: Uuid,
    #[serde(default)]
    pub reply_to: Option<Uuid>,
    /// Unix milliseconds at construction.
    #[serde(default)]
    pub sent_at: i64,
    pub op: String,
    pub kind: Kind,
    #[serde(default)]
    pub data: Data,
}

/// Errors that can be sent back over the socket.
pub trait ErrorCode: std::fmt::Display {
    /// Stable upper-case code, e.g. `E_UNAVAILABLE`.
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

fn unix_millis() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(nanos).unwrap_or(0)
}

impl Frame {
    fn new(op: String, kind: Kind, reply_to: Option<Uuid>, data: Data) -> Self {
        Self { id: Uuid::new_v4(), reply_to, sent_at: unix_millis(), op, kind, data }
    }

    pub fn request(op: impl Into<String>, data: Data) -> Self {
        Self::new(op.into(), Kind::Request, None, data)
    }

    pub fn push(op: impl Into<String>, data: Data) -> Self {
        Self::new(op.into(), Kind::Push, None, data)
    }

    #[must_use]
    pub fn item(&self, data: Data) -> Self {
        Self::new(self.op.clone(), Kind::Item, Some(self.id), data)
    }

    #[must_use]
    pub fn done(&self) -> Self {
        Self::new(self.op.clone(), Kind::Done, Some(self.id), Data::new())
    }

    /// Terminal error reply carrying `code`, `message` and `retryable`.
    #[must_use]
    pub fn error_from(&self, err: &(impl ErrorCode + ?Sized)) -> Self {
        let mut data = Data::new();
        data.insert("code".into(), err.error_code().into());
        data.insert("message".into(), err.to_string().into());
        data.insert("retryable".into(), err.retryable().into());
        Self::new(self.op.clone(), Kind::Error, Some(self.id), data)
    }
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
