//! Postgres `Store` backend.
//!
//! SYSTEM CONTEXT
//! ==============
//! Status columns are TEXT with CHECK constraints; rows are decoded through
//! `FromRow` structs and converted with the model's `parse` helpers. Change
//! events come from the `notify_table_change` trigger (see migrations) and are
//! relayed onto the `ChangeFeed` by `spawn_change_listener`.
//!
//! ERROR HANDLING
//! ==============
//! SQLSTATE 42703 (undefined column) maps to `StoreError::MissingColumn` and
//! 23505 (unique violation) to `StoreError::Conflict`; callers match on the
//! variant, never on message text.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgListener;
use sqlx::{PgPool, QueryBuilder};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    BlacklistFilter, ChangeEvent, ChangeFeed, DisputeFilter, OrderFilter, Store, StoreError,
};
use crate::model::{
    BlacklistEntry, BlacklistStatus, Credentials, Dispute, DisputePriority, DisputeStatus, Evidence, EvidenceKind,
    EvidenceMetadata, NewAccount, NewBlacklistEntry, NewDispute, NewEvidence, NewOrder, Order, OrderStatus, Profile,
    Role, Stat,
};

/// `NOTIFY` channel written by the change trigger.
pub const CHANGE_CHANNEL: &str = "table_changes";

const LISTENER_RETRY_MS: u64 = 1000;

const SQLSTATE_UNDEFINED_COLUMN: &str = "42703";
const SQLSTATE_UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    feed: ChangeFeed,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool, feed: ChangeFeed) -> Self {
        Self { pool, feed }
    }

    /// Relay `NOTIFY table_changes` payloads onto the change feed.
    ///
    /// `PgListener` reconnects on its own after a dropped connection; events
    /// sent while disconnected are lost, which subscribers already tolerate.
    #[must_use]
    pub fn spawn_change_listener(&self) -> JoinHandle<()> {
        let pool = self.pool.clone();
        let feed = self.feed.clone();
        tokio::spawn(async move {
            loop {
                let mut listener = match PgListener::connect_with(&pool).await {
                    Ok(l) => l,
                    Err(e) => {
                        error!(error = %e, "change listener connect failed");
                        tokio::time::sleep(Duration::from_millis(LISTENER_RETRY_MS)).await;
                        continue;
                    }
                };
                if let Err(e) = listener.listen(CHANGE_CHANNEL).await {
                    error!(error = %e, "change listener LISTEN failed");
                    tokio::time::sleep(Duration::from_millis(LISTENER_RETRY_MS)).await;
                    continue;
                }
                info!(channel = CHANGE_CHANNEL, "change listener attached");

                loop {
                    match listener.recv().await {
                        Ok(notification) => match serde_json::from_str::<ChangeEvent>(notification.payload()) {
                            Ok(event) => feed.publish(event),
                            Err(e) => warn!(error = %e, payload = notification.payload(), "bad change payload"),
                        },
                        Err(e) => {
                            warn!(error = %e, "change listener recv failed; reconnecting");
                            break;
                        }
                    }
                }
            }
        })
    }
}

fn map_db_error(err: sqlx::Error, table: &'static str, optional_column: Option<&'static str>) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some(SQLSTATE_UNDEFINED_COLUMN) => {
                if let Some(column) = optional_column {
                    return StoreError::MissingColumn { table, column };
                }
            }
            Some(SQLSTATE_UNIQUE_VIOLATION) => return StoreError::Conflict(db.message().to_owned()),
            _ => {}
        }
    }
    StoreError::Database(err)
}

fn limit_i64(limit: Option<usize>) -> Option<i64> {
    limit.map(|n| i64::try_from(n).unwrap_or(i64::MAX))
}

// =============================================================================
// ROWS
// =============================================================================

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: Uuid,
    email: String,
    full_name: Option<String>,
    role: Option<String>,
    shop_name: Option<String>,
    trust_score: i32,
}

impl From<ProfileRow> for Profile {
    fn from(r: ProfileRow) -> Self {
        // EDGE: profiles created outside sign-up may have no role; they act as sellers.
        let role = r.role.as_deref().and_then(Role::parse).unwrap_or(Role::Seller);
        Self {
            id: r.id,
            email: r.email,
            full_name: r.full_name,
            role,
            shop_name: r.shop_name,
            trust_score: r.trust_score,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    seller_id: Uuid,
    tracking_number: String,
    status: String,
    price: Option<i64>,
    product_name: Option<String>,
    buyer_email: Option<String>,
    created_at: OffsetDateTime,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        let status = OrderStatus::parse(&r.status).ok_or_else(|| StoreError::InvalidValue {
            table: "orders",
            column: "status",
            value: r.status.clone(),
        })?;
        Ok(Self {
            id: r.id,
            seller_id: r.seller_id,
            tracking_number: r.tracking_number,
            status,
            price: r.price,
            product_name: r.product_name,
            buyer_email: r.buyer_email,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EvidenceRow {
    id: Uuid,
    order_id: Uuid,
    uploader_id: Option<Uuid>,
    #[sqlx(rename = "type")]
    kind: String,
    media_url: String,
    metadata: serde_json::Value,
    created_at: OffsetDateTime,
}

impl TryFrom<EvidenceRow> for Evidence {
    type Error = StoreError;

    fn try_from(r: EvidenceRow) -> Result<Self, Self::Error> {
        let kind = EvidenceKind::parse(&r.kind).ok_or_else(|| StoreError::InvalidValue {
            table: "evidences",
            column: "type",
            value: r.kind.clone(),
        })?;
        let metadata: EvidenceMetadata =
            serde_json::from_value(r.metadata).map_err(|e| StoreError::InvalidValue {
                table: "evidences",
                column: "metadata",
                value: e.to_string(),
            })?;
        Ok(Self {
            id: r.id,
            order_id: r.order_id,
            uploader_id: r.uploader_id,
            kind,
            media_url: r.media_url,
            metadata,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DisputeRow {
    id: Uuid,
    buyer_id: Uuid,
    buyer_email: String,
    order_id: Option<String>,
    resi: String,
    reason: String,
    description: String,
    priority: String,
    status: String,
    created_at: OffsetDateTime,
}

impl TryFrom<DisputeRow> for Dispute {
    type Error = StoreError;

    fn try_from(r: DisputeRow) -> Result<Self, Self::Error> {
        let status = DisputeStatus::parse(&r.status).ok_or_else(|| StoreError::InvalidValue {
            table: "disputes",
            column: "status",
            value: r.status.clone(),
        })?;
        let priority = DisputePriority::parse(&r.priority).unwrap_or_default();
        Ok(Self {
            id: r.id,
            buyer_id: r.buyer_id,
            buyer_email: r.buyer_email,
            order_id: r.order_id,
            resi: r.resi,
            reason: r.reason,
            description: r.description,
            priority,
            status,
            created_at: r.created_at,
        })
    }
}

const PROFILE_COLUMNS: &str = "id, email, full_name, role, shop_name, trust_score";
const ORDER_COLUMNS: &str = "id, seller_id, tracking_number, status, price, product_name, buyer_email, created_at";
const EVIDENCE_COLUMNS: &str = "id, order_id, uploader_id, type, media_url, metadata, created_at";
const DISPUTE_COLUMNS: &str =
    "id, buyer_id, buyer_email, order_id, resi, reason, description, priority, status, created_at";

// =============================================================================
// STORE
// =============================================================================

#[async_trait]
impl Store for PgStore {
    async fn insert_account(&self, account: NewAccount) -> Result<Profile, StoreError> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "INSERT INTO profiles (email, full_name, role, password_hash)
             VALUES ($1, $2, $3, $4)
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(&account.email)
        .bind(&account.full_name)
        .bind(account.role.as_str())
        .bind(&account.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_error(e, "profiles", None))?;
        Ok(row.into())
    }

    async fn find_credentials(&self, email: &str) -> Result<Option<Credentials>, StoreError> {
        let row = sqlx::query_as::<_, (Uuid, Option<String>)>(
            "SELECT id, password_hash FROM profiles WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        // EDGE: a profile without a password hash cannot sign in with credentials.
        Ok(row.and_then(|(user_id, hash)| hash.map(|password_hash| Credentials { user_id, password_hash })))
    }

    async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Profile::from))
    }

    async fn create_session(
        &self,
        token_hash: &str,
        user_id: Uuid,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO sessions (token_hash, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(token_hash)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn session_user(&self, token_hash: &str) -> Result<Option<Uuid>, StoreError> {
        let user_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM sessions WHERE token_hash = $1 AND expires_at > now()",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user_id)
    }

    async fn delete_session(&self, token_hash: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO orders (seller_id, tracking_number, status, price, product_name, buyer_email)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.seller_id)
        .bind(&order.tracking_number)
        .bind(order.status.as_str())
        .bind(order.price)
        .bind(&order.product_name)
        .bind(&order.buyer_email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_error(e, "orders", None))?;
        row.try_into()
    }

    async fn find_order_by_tracking(&self, tracking_number: &str) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE tracking_number = $1
             ORDER BY created_at DESC
             LIMIT 1"
        ))
        .bind(tracking_number)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Order::try_from).transpose()
    }

    async fn update_order_status(&self, id: Uuid, status: OrderStatus) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { table: "orders", id });
        }
        Ok(())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let mut builder = QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders WHERE TRUE"));
        if let Some(seller_id) = filter.seller_id {
            builder.push(" AND seller_id = ").push_bind(seller_id);
        }
        if let Some(email) = &filter.buyer_email {
            builder.push(" AND buyer_email = ").push_bind(email.clone());
        }
        builder.push(" ORDER BY created_at DESC");
        if let Some(limit) = limit_i64(filter.limit) {
            builder.push(" LIMIT ").push_bind(limit);
        }

        let rows = builder.build_query_as::<OrderRow>().fetch_all(&self.pool).await?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn insert_evidence(&self, evidence: NewEvidence) -> Result<Evidence, StoreError> {
        let metadata = serde_json::to_value(&evidence.metadata).unwrap_or_default();
        let row = sqlx::query_as::<_, EvidenceRow>(&format!(
            "INSERT INTO evidences (order_id, uploader_id, type, media_url, metadata)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {EVIDENCE_COLUMNS}"
        ))
        .bind(evidence.order_id)
        .bind(evidence.uploader_id)
        .bind(evidence.kind.as_str())
        .bind(&evidence.media_url)
        .bind(&metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_error(e, "evidences", None))?;
        row.try_into()
    }

    async fn find_evidence(&self, order_id: Uuid, kind: EvidenceKind) -> Result<Option<Evidence>, StoreError> {
        let row = sqlx::query_as::<_, EvidenceRow>(&format!(
            "SELECT {EVIDENCE_COLUMNS} FROM evidences
             WHERE order_id = $1 AND type = $2
             ORDER BY created_at DESC
             LIMIT 1"
        ))
        .bind(order_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Evidence::try_from).transpose()
    }

    async fn count_evidence(&self, kind: EvidenceKind, order_ids: &[Uuid]) -> Result<usize, StoreError> {
        if order_ids.is_empty() {
            return Ok(0);
        }
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM evidences WHERE type = $1 AND order_id = ANY($2)")
            .bind(kind.as_str())
            .bind(order_ids)
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn insert_dispute(&self, dispute: NewDispute) -> Result<Dispute, StoreError> {
        let row = sqlx::query_as::<_, DisputeRow>(&format!(
            "INSERT INTO disputes (buyer_id, buyer_email, order_id, resi, reason, description, priority, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {DISPUTE_COLUMNS}"
        ))
        .bind(dispute.buyer_id)
        .bind(&dispute.buyer_email)
        .bind(&dispute.order_id)
        .bind(&dispute.resi)
        .bind(&dispute.reason)
        .bind(&dispute.description)
        .bind(dispute.priority.as_str())
        .bind(dispute.status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_error(e, "disputes", None))?;
        row.try_into()
    }

    async fn list_disputes(&self, filter: &DisputeFilter) -> Result<Vec<Dispute>, StoreError> {
        let mut builder = QueryBuilder::new(format!("SELECT {DISPUTE_COLUMNS} FROM disputes WHERE TRUE"));
        if let Some(buyer_id) = filter.buyer_id {
            builder.push(" AND buyer_id = ").push_bind(buyer_id);
        }
        if let Some(statuses) = &filter.statuses {
            let raw: Vec<String> = statuses.iter().map(|s| s.as_str().to_owned()).collect();
            builder.push(" AND status = ANY(").push_bind(raw).push(")");
        }
        builder.push(" ORDER BY created_at DESC");
        if let Some(limit) = limit_i64(filter.limit) {
            builder.push(" LIMIT ").push_bind(limit);
        }

        let rows = builder.build_query_as::<DisputeRow>().fetch_all(&self.pool).await?;
        rows.into_iter().map(Dispute::try_from).collect()
    }

    async fn update_dispute_status(&self, id: Uuid, status: DisputeStatus) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE disputes SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { table: "disputes", id });
        }
        Ok(())
    }

    async fn insert_blacklist(&self, entry: NewBlacklistEntry) -> Result<BlacklistEntry, StoreError> {
        // PHASE: INSERT
        // The description column is only named when a value is supplied, so a
        // pre-migration schema still accepts the reduced insert.
        let mut builder = QueryBuilder::new("INSERT INTO blacklist (reported_by, subject_name, platform, reason, status");
        if entry.description.is_some() {
            builder.push(", description");
        }
        builder.push(") VALUES (");
        {
            let mut values = builder.separated(", ");
            values.push_bind(entry.reported_by);
            values.push_bind(entry.subject_name.clone());
            values.push_bind(entry.platform.clone());
            values.push_bind(entry.reason.clone());
            values.push_bind(entry.status.as_str());
            if let Some(description) = &entry.description {
                values.push_bind(description.clone());
            }
        }
        builder.push(") RETURNING id");

        let id: Uuid = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_db_error(e, "blacklist", Some("description")))?;

        // PHASE: READ BACK
        let row = sqlx::query("SELECT * FROM blacklist WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        blacklist_from_any_row(&row)
    }

    async fn get_blacklist(&self, id: Uuid) -> Result<Option<BlacklistEntry>, StoreError> {
        let row = sqlx::query("SELECT * FROM blacklist WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(blacklist_from_any_row).transpose()
    }

    async fn list_blacklist(&self, filter: &BlacklistFilter) -> Result<Vec<BlacklistEntry>, StoreError> {
        let mut builder = QueryBuilder::new("SELECT * FROM blacklist WHERE TRUE");
        if let Some(statuses) = &filter.statuses {
            let raw: Vec<String> = statuses.iter().map(|s| s.as_str().to_owned()).collect();
            builder.push(" AND status = ANY(").push_bind(raw).push(")");
        }
        if let Some(since) = filter.created_since {
            builder.push(" AND created_at >= ").push_bind(since);
        }
        if let Some(show) = filter.show_on_landing_page {
            builder.push(" AND show_on_landing_page = ").push_bind(show);
        }
        builder.push(" ORDER BY created_at DESC");
        if let Some(limit) = limit_i64(filter.limit) {
            builder.push(" LIMIT ").push_bind(limit);
        }

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_db_error(e, "blacklist", Some("show_on_landing_page")))?;
        rows.iter().map(blacklist_from_any_row).collect()
    }

    async fn update_blacklist_status(&self, id: Uuid, status: BlacklistStatus) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE blacklist SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { table: "blacklist", id });
        }
        Ok(())
    }

    async fn set_blacklist_landing(&self, id: Uuid, show: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE blacklist SET show_on_landing_page = $2 WHERE id = $1")
            .bind(id)
            .bind(show)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { table: "blacklist", id });
        }
        Ok(())
    }

    async fn get_stats(&self, keys: &[&str]) -> Result<Vec<Stat>, StoreError> {
        let keys: Vec<String> = keys.iter().map(|k| (*k).to_owned()).collect();
        let rows = sqlx::query_as::<_, (String, i64)>("SELECT key, value FROM stats WHERE key = ANY($1)")
            .bind(&keys)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(key, value)| Stat { key, value }).collect())
    }

    fn changes(&self) -> &ChangeFeed {
        &self.feed
    }
}

/// Decode a blacklist row whose optional columns may be absent. Blacklist
/// reads select `*` so schemas predating `description` and
/// `show_on_landing_page` still decode.
fn blacklist_from_any_row(row: &sqlx::postgres::PgRow) -> Result<BlacklistEntry, StoreError> {
    use sqlx::Row;

    let status: String = row.try_get("status")?;
    let status = BlacklistStatus::parse(&status).ok_or_else(|| StoreError::InvalidValue {
        table: "blacklist",
        column: "status",
        value: status.clone(),
    })?;
    Ok(BlacklistEntry {
        id: row.try_get("id")?,
        reported_by: row.try_get("reported_by")?,
        subject_name: row.try_get("subject_name")?,
        platform: row.try_get("platform")?,
        reason: row.try_get("reason")?,
        description: row.try_get("description").unwrap_or(None),
        status,
        trust_score: row.try_get::<Option<i32>, _>("trust_score")?.unwrap_or(0),
        show_on_landing_page: row.try_get("show_on_landing_page").unwrap_or(false),
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(all(test, feature = "live-db-tests"))]
#[path = "postgres_test.rs"]
mod tests;
