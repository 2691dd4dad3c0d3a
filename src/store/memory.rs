//! In-process `Store` backend.
//!
//! DESIGN
//! ======
//! Tables are plain vectors in insertion order behind one `RwLock`; "newest
//! first" is reverse iteration. Writes publish to the change feed after the
//! lock is released. Test builds can arm one-shot faults per operation and
//! switch the blacklist table to its pre-`description` schema.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    BlacklistFilter, ChangeEvent, ChangeFeed, ChangeKind, DisputeFilter, OrderFilter, Store, StoreError, Table,
};
use crate::model::{
    BlacklistEntry, BlacklistStatus, Credentials, DEFAULT_TRUST_SCORE, Dispute, DisputeStatus, Evidence, EvidenceKind,
    NewAccount, NewBlacklistEntry, NewDispute, NewEvidence, NewOrder, Order, OrderStatus, Profile, Stat,
};

/// Operations that can be armed to fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(not(test), allow(dead_code))]
pub enum Fault {
    InsertOrder,
    FindOrder,
    UpdateOrderStatus,
    InsertEvidence,
    FindEvidence,
    InsertDispute,
    InsertBlacklist,
    ListBlacklist,
}

struct StoredProfile {
    profile: Profile,
    password_hash: String,
}

#[derive(Default)]
struct Tables {
    profiles: Vec<StoredProfile>,
    sessions: HashMap<String, (Uuid, OffsetDateTime)>,
    orders: Vec<Order>,
    evidences: Vec<Evidence>,
    disputes: Vec<Dispute>,
    blacklist: Vec<BlacklistEntry>,
    stats: HashMap<String, i64>,
}

pub struct MemoryStore {
    tables: RwLock<Tables>,
    feed: ChangeFeed,
    faults: Mutex<HashMap<Fault, String>>,
    legacy_blacklist_schema: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new(feed: ChangeFeed) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            feed,
            faults: Mutex::new(HashMap::new()),
            legacy_blacklist_schema: AtomicBool::new(false),
        }
    }

    fn check_fault(&self, fault: Fault) -> Result<(), StoreError> {
        let mut faults = self.faults.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match faults.remove(&fault) {
            Some(message) => Err(StoreError::Unavailable(message)),
            None => Ok(()),
        }
    }

    fn announce(&self, table: Table, kind: ChangeKind, row_id: Option<Uuid>) {
        self.feed.publish(ChangeEvent::new(table, kind, row_id));
    }
}

#[cfg(test)]
impl MemoryStore {
    /// Make the next call of `fault` fail with `message`.
    pub fn fail_next(&self, fault: Fault, message: &str) {
        let mut faults = self.faults.lock().expect("fault map should lock");
        faults.insert(fault, message.to_owned());
    }

    /// Simulate a deployment whose `blacklist` table has no `description` column.
    pub fn use_legacy_blacklist_schema(&self) {
        self.legacy_blacklist_schema.store(true, Ordering::SeqCst);
    }

    pub async fn set_stat(&self, key: &str, value: i64) {
        self.tables.write().await.stats.insert(key.to_owned(), value);
    }

    pub async fn set_order_fields(&self, id: Uuid, price: Option<i64>, buyer_email: Option<&str>) {
        let mut tables = self.tables.write().await;
        if let Some(order) = tables.orders.iter_mut().find(|o| o.id == id) {
            order.price = price;
            order.buyer_email = buyer_email.map(str::to_owned);
        }
    }

    pub async fn orders_snapshot(&self) -> Vec<Order> {
        self.tables.read().await.orders.clone()
    }

    pub async fn evidences_snapshot(&self) -> Vec<Evidence> {
        self.tables.read().await.evidences.clone()
    }

    pub async fn set_profile_shop(&self, id: Uuid, shop_name: Option<&str>, trust_score: i32) {
        let mut tables = self.tables.write().await;
        if let Some(stored) = tables.profiles.iter_mut().find(|p| p.profile.id == id) {
            stored.profile.shop_name = shop_name.map(str::to_owned);
            stored.profile.trust_score = trust_score;
        }
    }
}

fn take_limit<T>(iter: impl Iterator<Item = T>, limit: Option<usize>) -> Vec<T> {
    match limit {
        Some(n) => iter.take(n).collect(),
        None => iter.collect(),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_account(&self, account: NewAccount) -> Result<Profile, StoreError> {
        let profile = {
            let mut tables = self.tables.write().await;
            if tables.profiles.iter().any(|p| p.profile.email == account.email) {
                return Err(StoreError::Conflict(format!("email {}", account.email)));
            }
            let profile = Profile {
                id: Uuid::new_v4(),
                email: account.email,
                full_name: Some(account.full_name),
                role: account.role,
                shop_name: None,
                trust_score: DEFAULT_TRUST_SCORE,
            };
            tables
                .profiles
                .push(StoredProfile { profile: profile.clone(), password_hash: account.password_hash });
            profile
        };
        self.announce(Table::Profiles, ChangeKind::Insert, Some(profile.id));
        Ok(profile)
    }

    async fn find_credentials(&self, email: &str) -> Result<Option<Credentials>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .profiles
            .iter()
            .find(|p| p.profile.email == email)
            .map(|p| Credentials { user_id: p.profile.id, password_hash: p.password_hash.clone() }))
    }

    async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .profiles
            .iter()
            .find(|p| p.profile.id == id)
            .map(|p| p.profile.clone()))
    }

    async fn create_session(
        &self,
        token_hash: &str,
        user_id: Uuid,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables
            .sessions
            .insert(token_hash.to_owned(), (user_id, expires_at));
        Ok(())
    }

    async fn session_user(&self, token_hash: &str) -> Result<Option<Uuid>, StoreError> {
        let tables = self.tables.read().await;
        let now = OffsetDateTime::now_utc();
        Ok(tables
            .sessions
            .get(token_hash)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(user_id, _)| *user_id))
    }

    async fn delete_session(&self, token_hash: &str) -> Result<(), StoreError> {
        self.tables.write().await.sessions.remove(token_hash);
        Ok(())
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, StoreError> {
        self.check_fault(Fault::InsertOrder)?;
        let row = Order {
            id: Uuid::new_v4(),
            seller_id: order.seller_id,
            tracking_number: order.tracking_number,
            status: order.status,
            price: order.price,
            product_name: order.product_name,
            buyer_email: order.buyer_email,
            created_at: OffsetDateTime::now_utc(),
        };
        self.tables.write().await.orders.push(row.clone());
        self.announce(Table::Orders, ChangeKind::Insert, Some(row.id));
        Ok(row)
    }

    async fn find_order_by_tracking(&self, tracking_number: &str) -> Result<Option<Order>, StoreError> {
        self.check_fault(Fault::FindOrder)?;
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .iter()
            .rev()
            .find(|o| o.tracking_number == tracking_number)
            .cloned())
    }

    async fn update_order_status(&self, id: Uuid, status: OrderStatus) -> Result<(), StoreError> {
        self.check_fault(Fault::UpdateOrderStatus)?;
        {
            let mut tables = self.tables.write().await;
            let order = tables
                .orders
                .iter_mut()
                .find(|o| o.id == id)
                .ok_or(StoreError::NotFound { table: "orders", id })?;
            order.status = status;
        }
        self.announce(Table::Orders, ChangeKind::Update, Some(id));
        Ok(())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let tables = self.tables.read().await;
        let iter = tables
            .orders
            .iter()
            .rev()
            .filter(|o| filter.seller_id.is_none_or(|id| o.seller_id == id))
            .filter(|o| {
                filter
                    .buyer_email
                    .as_deref()
                    .is_none_or(|email| o.buyer_email.as_deref() == Some(email))
            })
            .cloned();
        Ok(take_limit(iter, filter.limit))
    }

    async fn insert_evidence(&self, evidence: NewEvidence) -> Result<Evidence, StoreError> {
        self.check_fault(Fault::InsertEvidence)?;
        let row = {
            let mut tables = self.tables.write().await;
            if !tables.orders.iter().any(|o| o.id == evidence.order_id) {
                return Err(StoreError::NotFound { table: "orders", id: evidence.order_id });
            }
            let row = Evidence {
                id: Uuid::new_v4(),
                order_id: evidence.order_id,
                uploader_id: evidence.uploader_id,
                kind: evidence.kind,
                media_url: evidence.media_url,
                metadata: evidence.metadata,
                created_at: OffsetDateTime::now_utc(),
            };
            tables.evidences.push(row.clone());
            row
        };
        self.announce(Table::Evidences, ChangeKind::Insert, Some(row.id));
        Ok(row)
    }

    async fn find_evidence(&self, order_id: Uuid, kind: EvidenceKind) -> Result<Option<Evidence>, StoreError> {
        self.check_fault(Fault::FindEvidence)?;
        let tables = self.tables.read().await;
        Ok(tables
            .evidences
            .iter()
            .rev()
            .find(|e| e.order_id == order_id && e.kind == kind)
            .cloned())
    }

    async fn count_evidence(&self, kind: EvidenceKind, order_ids: &[Uuid]) -> Result<usize, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .evidences
            .iter()
            .filter(|e| e.kind == kind && order_ids.contains(&e.order_id))
            .count())
    }

    async fn insert_dispute(&self, dispute: NewDispute) -> Result<Dispute, StoreError> {
        self.check_fault(Fault::InsertDispute)?;
        let row = Dispute {
            id: Uuid::new_v4(),
            buyer_id: dispute.buyer_id,
            buyer_email: dispute.buyer_email,
            order_id: dispute.order_id,
            resi: dispute.resi,
            reason: dispute.reason,
            description: dispute.description,
            priority: dispute.priority,
            status: dispute.status,
            created_at: OffsetDateTime::now_utc(),
        };
        self.tables.write().await.disputes.push(row.clone());
        self.announce(Table::Disputes, ChangeKind::Insert, Some(row.id));
        Ok(row)
    }

    async fn list_disputes(&self, filter: &DisputeFilter) -> Result<Vec<Dispute>, StoreError> {
        let tables = self.tables.read().await;
        let iter = tables
            .disputes
            .iter()
            .rev()
            .filter(|d| filter.buyer_id.is_none_or(|id| d.buyer_id == id))
            .filter(|d| {
                filter
                    .statuses
                    .as_ref()
                    .is_none_or(|statuses| statuses.contains(&d.status))
            })
            .cloned();
        Ok(take_limit(iter, filter.limit))
    }

    async fn update_dispute_status(&self, id: Uuid, status: DisputeStatus) -> Result<(), StoreError> {
        {
            let mut tables = self.tables.write().await;
            let dispute = tables
                .disputes
                .iter_mut()
                .find(|d| d.id == id)
                .ok_or(StoreError::NotFound { table: "disputes", id })?;
            dispute.status = status;
        }
        self.announce(Table::Disputes, ChangeKind::Update, Some(id));
        Ok(())
    }

    async fn insert_blacklist(&self, entry: NewBlacklistEntry) -> Result<BlacklistEntry, StoreError> {
        self.check_fault(Fault::InsertBlacklist)?;
        if entry.description.is_some() && self.legacy_blacklist_schema.load(Ordering::SeqCst) {
            return Err(StoreError::MissingColumn { table: "blacklist", column: "description" });
        }
        let row = BlacklistEntry {
            id: Uuid::new_v4(),
            reported_by: entry.reported_by,
            subject_name: entry.subject_name,
            platform: entry.platform,
            reason: entry.reason,
            description: entry.description,
            status: entry.status,
            trust_score: 0,
            show_on_landing_page: false,
            created_at: OffsetDateTime::now_utc(),
        };
        self.tables.write().await.blacklist.push(row.clone());
        self.announce(Table::Blacklist, ChangeKind::Insert, Some(row.id));
        Ok(row)
    }

    async fn get_blacklist(&self, id: Uuid) -> Result<Option<BlacklistEntry>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.blacklist.iter().find(|b| b.id == id).cloned())
    }

    async fn list_blacklist(&self, filter: &BlacklistFilter) -> Result<Vec<BlacklistEntry>, StoreError> {
        self.check_fault(Fault::ListBlacklist)?;
        let tables = self.tables.read().await;
        let iter = tables
            .blacklist
            .iter()
            .rev()
            .filter(|b| {
                filter
                    .statuses
                    .as_ref()
                    .is_none_or(|statuses| statuses.contains(&b.status))
            })
            .filter(|b| filter.created_since.is_none_or(|since| b.created_at >= since))
            .filter(|b| {
                filter
                    .show_on_landing_page
                    .is_none_or(|show| b.show_on_landing_page == show)
            })
            .cloned();
        Ok(take_limit(iter, filter.limit))
    }

    async fn update_blacklist_status(&self, id: Uuid, status: BlacklistStatus) -> Result<(), StoreError> {
        {
            let mut tables = self.tables.write().await;
            let entry = tables
                .blacklist
                .iter_mut()
                .find(|b| b.id == id)
                .ok_or(StoreError::NotFound { table: "blacklist", id })?;
            entry.status = status;
        }
        self.announce(Table::Blacklist, ChangeKind::Update, Some(id));
        Ok(())
    }

    async fn set_blacklist_landing(&self, id: Uuid, show: bool) -> Result<(), StoreError> {
        {
            let mut tables = self.tables.write().await;
            let entry = tables
                .blacklist
                .iter_mut()
                .find(|b| b.id == id)
                .ok_or(StoreError::NotFound { table: "blacklist", id })?;
            entry.show_on_landing_page = show;
        }
        self.announce(Table::Blacklist, ChangeKind::Update, Some(id));
        Ok(())
    }

    async fn get_stats(&self, keys: &[&str]) -> Result<Vec<Stat>, StoreError> {
        let tables = self.tables.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| {
                tables
                    .stats
                    .get(*key)
                    .map(|value| Stat { key: (*key).to_owned(), value: *value })
            })
            .collect())
    }

    fn changes(&self) -> &ChangeFeed {
        &self.feed
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
