//! Live lists: whole-list re-fetch on change.
//!
//! DESIGN
//! ======
//! A background task subscribes to the change feed, fetches the list once,
//! and then re-fetches the complete list whenever an event for its table
//! arrives. Results go out on a `watch` channel, so readers only ever see the
//! latest completed fetch. There is no diffing or merging of events into the
//! previous snapshot.
//!
//! COALESCING
//! ==========
//! Events that arrive while a fetch is running stay queued in the broadcast
//! receiver. When the fetch finishes the task drains the queue and runs a
//! single follow-up fetch for all of them. A lagged receiver has lost events
//! and is treated the same as one change. A failed fetch is logged and the
//! previous snapshot stays published.
//!
//! LIFECYCLE
//! =========
//! Dropping the `LiveList` aborts the task.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::store::{ChangeEvent, ChangeFeed, StoreError, Table};

/// One published list. `generation` counts completed fetches; zero means the
/// first fetch has not finished yet.
#[derive(Debug)]
pub struct Snapshot<T> {
    pub generation: u64,
    pub items: Arc<Vec<T>>,
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self { generation: self.generation, items: Arc::clone(&self.items) }
    }
}

pub struct LiveList<T> {
    table: Table,
    tx: Arc<watch::Sender<Snapshot<T>>>,
    task: JoinHandle<()>,
}

impl<T> LiveList<T> {
    #[must_use]
    pub fn table(&self) -> Table {
        self.table
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.tx.subscribe()
    }

    /// Receivers currently attached, one per open socket.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T> Drop for LiveList<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start a live list over `table`, populated by `fetch`.
pub fn spawn_live_list<T, F, Fut>(feed: &ChangeFeed, table: Table, fetch: F) -> LiveList<T>
where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<T>, StoreError>> + Send + 'static,
{
    let (tx, _) = watch::channel(Snapshot { generation: 0, items: Arc::new(Vec::new()) });
    let tx = Arc::new(tx);
    // Subscribe before the first fetch so no change slips between them.
    let events = feed.subscribe();
    let task = tokio::spawn(run(events, table, fetch, tx.clone()));
    LiveList { table, tx, task }
}

async fn run<T, F, Fut>(
    mut events: broadcast::Receiver<ChangeEvent>,
    table: Table,
    fetch: F,
    tx: Arc<watch::Sender<Snapshot<T>>>,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Vec<T>, StoreError>>,
{
    let mut generation = 0;
    loop {
        match fetch().await {
            Ok(items) => {
                generation += 1;
                tx.send_replace(Snapshot { generation, items: Arc::new(items) });
                debug!(table = table.as_str(), generation, "live list refreshed");
            }
            Err(e) => warn!(error = %e, table = table.as_str(), "live list fetch failed"),
        }

        if !wait_for_change(&mut events, table).await {
            return;
        }
        drain_pending(&mut events);
    }
}

/// Block until something touches `table`. Returns false once the feed closes.
async fn wait_for_change(events: &mut broadcast::Receiver<ChangeEvent>, table: Table) -> bool {
    loop {
        match events.recv().await {
            Ok(event) if event.table == table => return true,
            Ok(_) => {}
            Err(RecvError::Lagged(missed)) => {
                debug!(table = table.as_str(), missed, "live list lagged");
                return true;
            }
            Err(RecvError::Closed) => return false,
        }
    }
}

/// Discard whatever is already queued; the next fetch covers it.
fn drain_pending(events: &mut broadcast::Receiver<ChangeEvent>) {
    loop {
        match events.try_recv() {
            Ok(_) | Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty | TryRecvError::Closed) => return,
        }
    }
}

#[cfg(test)]
#[path = "live_test.rs"]
mod tests;
