//! Data platform surface consumed by the services.
//!
//! ARCHITECTURE
//! ============
//! Services never talk to Postgres directly. They hold an `Arc<dyn Store>`
//! and perform single-row inserts, filtered selects ordered newest first, and
//! isolated field updates, the same shape of calls a hosted table API offers.
//! Every successful write is announced on the store's `ChangeFeed`.
//!
//! Two backends:
//! - `PgStore`: sqlx + Postgres, changes relayed from `NOTIFY` triggers.
//! - `MemoryStore`: in-process tables for tests and local runs.
//!
//! Nothing here spans more than one row write. Callers that need two writes
//! issue them one after another and own the partial-failure consequences.

pub mod changes;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::model::{
    BlacklistEntry, BlacklistStatus, Credentials, Dispute, DisputeStatus, Evidence, EvidenceKind, NewAccount,
    NewBlacklistEntry, NewDispute, NewEvidence, NewOrder, Order, OrderStatus, Profile, Stat,
};
pub use changes::{ChangeEvent, ChangeFeed, ChangeKind};
pub use memory::MemoryStore;
pub use postgres::PgStore;

// =============================================================================
// TABLES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Profiles,
    Orders,
    Evidences,
    Disputes,
    Blacklist,
    Stats,
}

impl Table {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::Orders => "orders",
            Self::Evidences => "evidences",
            Self::Disputes => "disputes",
            Self::Blacklist => "blacklist",
            Self::Stats => "stats",
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{table} row not found: {id}")]
    NotFound { table: &'static str, id: Uuid },
    #[error("column \"{column}\" of relation \"{table}\" does not exist")]
    MissingColumn { table: &'static str, column: &'static str },
    #[error("duplicate value: {0}")]
    Conflict(String),
    #[error("invalid {column} value in {table}: {value}")]
    InvalidValue { table: &'static str, column: &'static str, value: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl crate::frame::ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "E_NOT_FOUND",
            Self::MissingColumn { .. } => "E_SCHEMA_MISMATCH",
            Self::Conflict(_) => "E_CONFLICT",
            Self::InvalidValue { .. } => "E_INVALID_VALUE",
            Self::Unavailable(_) => "E_UNAVAILABLE",
            Self::Database(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Database(_))
    }
}

// =============================================================================
// FILTERS
// =============================================================================

/// Equality/range predicates for `orders`. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub seller_id: Option<Uuid>,
    pub buyer_email: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct DisputeFilter {
    pub buyer_id: Option<Uuid>,
    pub statuses: Option<Vec<DisputeStatus>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct BlacklistFilter {
    pub statuses: Option<Vec<BlacklistStatus>>,
    pub created_since: Option<OffsetDateTime>,
    pub show_on_landing_page: Option<bool>,
    pub limit: Option<usize>,
}

impl BlacklistFilter {
    #[must_use]
    pub fn with_status(status: BlacklistStatus) -> Self {
        Self { statuses: Some(vec![status]), ..Self::default() }
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

// =============================================================================
// STORE
// =============================================================================

#[async_trait]
pub trait Store: Send + Sync {
    // --- identity -----------------------------------------------------------

    /// Create a profile with credentials. Duplicate email is `Conflict`.
    async fn insert_account(&self, account: NewAccount) -> Result<Profile, StoreError>;
    async fn find_credentials(&self, email: &str) -> Result<Option<Credentials>, StoreError>;
    async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>, StoreError>;
    async fn create_session(&self, token_hash: &str, user_id: Uuid, expires_at: OffsetDateTime)
    -> Result<(), StoreError>;
    /// Returns the session's user if the session exists and has not expired.
    async fn session_user(&self, token_hash: &str) -> Result<Option<Uuid>, StoreError>;
    async fn delete_session(&self, token_hash: &str) -> Result<(), StoreError>;

    // --- orders -------------------------------------------------------------

    async fn insert_order(&self, order: NewOrder) -> Result<Order, StoreError>;
    /// Exact tracking-number match. Tracking numbers are not unique; the newest wins.
    async fn find_order_by_tracking(&self, tracking_number: &str) -> Result<Option<Order>, StoreError>;
    async fn update_order_status(&self, id: Uuid, status: OrderStatus) -> Result<(), StoreError>;
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError>;

    // --- evidences ----------------------------------------------------------

    async fn insert_evidence(&self, evidence: NewEvidence) -> Result<Evidence, StoreError>;
    async fn find_evidence(&self, order_id: Uuid, kind: EvidenceKind) -> Result<Option<Evidence>, StoreError>;
    async fn count_evidence(&self, kind: EvidenceKind, order_ids: &[Uuid]) -> Result<usize, StoreError>;

    // --- disputes -----------------------------------------------------------

    async fn insert_dispute(&self, dispute: NewDispute) -> Result<Dispute, StoreError>;
    async fn list_disputes(&self, filter: &DisputeFilter) -> Result<Vec<Dispute>, StoreError>;
    async fn update_dispute_status(&self, id: Uuid, status: DisputeStatus) -> Result<(), StoreError>;

    // --- blacklist ----------------------------------------------------------

    /// Fails with `MissingColumn` when `description` is set but the schema lacks it.
    async fn insert_blacklist(&self, entry: NewBlacklistEntry) -> Result<BlacklistEntry, StoreError>;
    async fn get_blacklist(&self, id: Uuid) -> Result<Option<BlacklistEntry>, StoreError>;
    async fn list_blacklist(&self, filter: &BlacklistFilter) -> Result<Vec<BlacklistEntry>, StoreError>;
    async fn update_blacklist_status(&self, id: Uuid, status: BlacklistStatus) -> Result<(), StoreError>;
    async fn set_blacklist_landing(&self, id: Uuid, show: bool) -> Result<(), StoreError>;

    // --- stats --------------------------------------------------------------

    async fn get_stats(&self, keys: &[&str]) -> Result<Vec<Stat>, StoreError>;

    // --- realtime -----------------------------------------------------------

    fn changes(&self) -> &ChangeFeed;
}

/// Look up one stat value, defaulting to zero when absent.
#[must_use]
pub fn stat_value(stats: &[Stat], key: &str) -> i64 {
    stats.iter().find(|s| s.key == key).map_or(0, |s| s.value)
}
