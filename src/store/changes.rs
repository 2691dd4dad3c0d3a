//! Table change feed.
//!
//! DESIGN
//! ======
//! One `tokio::sync::broadcast` channel carries every row change for every
//! watched table. Subscribers filter by table themselves; there is no
//! server-side filter and no ordering guarantee relative to the writer's own
//! response. A lagging subscriber loses events and is expected to treat the
//! lag as "something changed".

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::Table;

pub const DEFAULT_CHANGE_FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One row-level change. Also the JSON payload of the Postgres `NOTIFY`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub row_id: Option<Uuid>,
}

impl ChangeEvent {
    #[must_use]
    pub fn new(table: Table, kind: ChangeKind, row_id: Option<Uuid>) -> Self {
        Self { table, kind, row_id }
    }
}

#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Fire-and-forget. Having no subscribers is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.tx.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CHANGE_FEED_CAPACITY)
    }
}
