//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the store, the config, and the per-user view machines that live in
//! server memory between requests: one evidence wizard per seller and one
//! unboxing flow per opened tracking number. Opening is public, so parked
//! flows expire after `flow_ttl` and are capped at `max_open_flows`, oldest
//! first; both are enforced on insert. Each machine sits behind its own
//! `tokio::sync::Mutex`; the outer maps are only locked long enough to look
//! an entry up or insert it, never across store I/O.
//!
//! The three live lists (moderation queue, verified feed, landing feed) are
//! started once here and shared by every websocket subscriber.

use std::collections::HashMap;
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::model::BlacklistEntry;
use crate::services::auth::Identity;
use crate::services::blacklist;
use crate::services::live::{LiveList, spawn_live_list};
use crate::services::verification::UnboxingFlow;
use crate::services::wizard::EvidenceWizard;
use crate::store::{Store, Table};

pub type SharedWizard = Arc<Mutex<EvidenceWizard>>;
pub type SharedFlow = Arc<Mutex<UnboxingFlow>>;

pub struct ParkedFlow {
    opened_at: OffsetDateTime,
    flow: SharedFlow,
}

// =============================================================================
// LIVE VIEWS
// =============================================================================

/// Blacklist lists pushed to websocket subscribers.
pub struct LiveViews {
    /// Pending reports awaiting a verdict (admin).
    pub moderation: LiveList<BlacklistEntry>,
    /// Newest verified entries (dashboard sidebar).
    pub verified: LiveList<BlacklistEntry>,
    /// Verified entries promoted to the landing page.
    pub landing: LiveList<BlacklistEntry>,
}

impl LiveViews {
    /// Spawn the three list tasks. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn spawn(store: &Arc<dyn Store>) -> Self {
        let feed = store.changes();
        let s = store.clone();
        let moderation = spawn_live_list(feed, Table::Blacklist, move || {
            let s = s.clone();
            async move { blacklist::pending_queue(s.as_ref()).await }
        });
        let s = store.clone();
        let verified = spawn_live_list(feed, Table::Blacklist, move || {
            let s = s.clone();
            async move { blacklist::verified_feed(s.as_ref()).await }
        });
        let s = store.clone();
        let landing = spawn_live_list(feed, Table::Blacklist, move || {
            let s = s.clone();
            async move { blacklist::landing_feed(s.as_ref()).await }
        });
        Self { moderation, verified, landing }
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Clone is required by Axum; all inner fields are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
    /// Evidence wizards keyed by seller user id.
    pub wizards: Arc<RwLock<HashMap<Uuid, SharedWizard>>>,
    /// Unboxing flows keyed by flow id. Removed once the flow is `Done`.
    pub flows: Arc<RwLock<HashMap<Uuid, ParkedFlow>>>,
    pub live: Arc<LiveViews>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: AppConfig) -> Self {
        let live = Arc::new(LiveViews::spawn(&store));
        Self {
            store,
            config: Arc::new(config),
            wizards: Arc::new(RwLock::new(HashMap::new())),
            flows: Arc::new(RwLock::new(HashMap::new())),
            live,
        }
    }

    /// The caller's wizard, created at `Identify` on first use.
    pub async fn wizard_for(&self, identity: &Identity) -> SharedWizard {
        if let Some(wizard) = self.wizards.read().await.get(&identity.user_id) {
            return wizard.clone();
        }
        let mut wizards = self.wizards.write().await;
        wizards
            .entry(identity.user_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(EvidenceWizard::new(self.store.clone(), Some(identity.clone()))))
            })
            .clone()
    }

    /// Park a freshly opened flow, first dropping expired flows and, at the
    /// cap, the oldest ones.
    pub async fn insert_flow(&self, flow: UnboxingFlow) -> SharedFlow {
        let id = flow.id();
        let shared = Arc::new(Mutex::new(flow));
        let now = OffsetDateTime::now_utc();
        let ttl = self.config.flow_ttl;
        let cap = self.config.max_open_flows.max(1);

        let mut flows = self.flows.write().await;
        let before = flows.len();
        flows.retain(|_, parked| now - parked.opened_at < ttl);
        while flows.len() >= cap {
            let Some(oldest) = flows.iter().min_by_key(|(_, parked)| parked.opened_at).map(|(id, _)| *id) else {
                break;
            };
            flows.remove(&oldest);
        }
        let evicted = before - flows.len();
        flows.insert(id, ParkedFlow { opened_at: now, flow: shared.clone() });
        drop(flows);

        if evicted > 0 {
            tracing::debug!(evicted, "dropped stale verification flows");
        }
        shared
    }

    pub async fn flow(&self, id: Uuid) -> Option<SharedFlow> {
        self.flows.read().await.get(&id).map(|parked| parked.flow.clone())
    }

    pub async fn remove_flow(&self, id: Uuid) {
        self.flows.write().await.remove(&id);
    }
}

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use crate::model::{NewAccount, Role};
    use crate::services::session;
    use crate::store::{ChangeFeed, MemoryStore};

    /// Create a test `AppState` over a fresh `MemoryStore`. The concrete store
    /// is returned too so tests can arm faults and seed rows.
    #[must_use]
    pub fn test_app_state() -> (AppState, Arc<MemoryStore>) {
        test_app_state_with(AppConfig::memory())
    }

    /// Like `test_app_state`, with tuned configuration.
    #[must_use]
    pub fn test_app_state_with(config: AppConfig) -> (AppState, Arc<MemoryStore>) {
        let memory = Arc::new(MemoryStore::new(ChangeFeed::default()));
        let store: Arc<dyn Store> = memory.clone();
        (AppState::new(store, config), memory)
    }

    /// Seed a profile and open a session for it. Returns the identity and the
    /// raw session token.
    pub async fn seed_session(state: &AppState, email: &str, role: Role) -> (Identity, String) {
        let profile = state
            .store
            .insert_account(NewAccount {
                email: email.into(),
                full_name: "Test User".into(),
                role,
                password_hash: "unused".into(),
            })
            .await
            .expect("account insert should succeed");
        let token = session::create_session(state.store.as_ref(), profile.id, state.config.session_ttl)
            .await
            .expect("session insert should succeed");
        (Identity::from_profile(&profile), token)
    }

    /// `Cookie` header value carrying `token`.
    #[must_use]
    pub fn session_cookie(token: &str) -> String {
        format!("session_token={token}")
    }
}
