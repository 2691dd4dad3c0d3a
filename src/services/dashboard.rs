//! Read-only dashboard aggregates for each role and the public landing page.
//!
//! Every number here is computed from a fresh read; nothing is cached.

use serde::Serialize;

use super::auth::Identity;
use super::{blacklist, dispute};
use crate::model::{
    BlacklistEntry, BlacklistStatus, DEFAULT_TRUST_SCORE, EvidenceKind, Order, OrderStatus, STAT_TOTAL_FRAUD_BLOCKED,
    STAT_TOTAL_RESOLVED_DISPUTES, STAT_TOTAL_UMKM_USERS,
};
use crate::store::{OrderFilter, Store, StoreError, stat_value};

const RECENT_ORDERS_LIMIT: usize = 5;
const DEFAULT_STORE_LABEL: &str = "Toko Online";
const DEFAULT_SELLER_NAME: &str = "Seller";
/// Shown on the landing page until the counter is populated.
const DEFAULT_UMKM_USERS: i64 = 10_000;

// =============================================================================
// FORMATTING
// =============================================================================

/// Millions of rupiah with one decimal, e.g. `Rp 12.5M`.
#[must_use]
pub fn format_revenue(rupiah: i64) -> String {
    // Tenths of a million, rounded half up.
    let tenths = (rupiah.max(0) + 50_000) / 100_000;
    format!("Rp {}.{}M", tenths / 10, tenths % 10)
}

/// Whole rupiah with `.` thousands separators, e.g. `Rp 1.250.000`.
#[must_use]
pub fn format_price(rupiah: i64) -> String {
    let digits = rupiah.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    let sign = if rupiah < 0 { "-" } else { "" };
    format!("Rp {sign}{grouped}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrustLevel {
    Elite,
    Trusted,
    Safe,
    Risky,
}

#[must_use]
pub fn trust_level(score: i32) -> TrustLevel {
    match score {
        s if s >= 90 => TrustLevel::Elite,
        s if s >= 70 => TrustLevel::Trusted,
        s if s >= 50 => TrustLevel::Safe,
        _ => TrustLevel::Risky,
    }
}

#[must_use]
pub fn order_status_label(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Delivered => "Received",
        OrderStatus::Shipped => "In Transit",
        OrderStatus::Disputed => "Unboxing Verification",
    }
}

// =============================================================================
// SELLER
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct SellerDashboard {
    pub display_name: String,
    pub total_protected: usize,
    pub ongoing_disputes: usize,
    pub saved_revenue: String,
    pub fraud_attempts: usize,
    pub verified_blacklist: Vec<BlacklistEntry>,
}

pub async fn seller(store: &dyn Store, identity: &Identity) -> Result<SellerDashboard, StoreError> {
    let profile = store.get_profile(identity.user_id).await?;
    let display_name = profile
        .as_ref()
        .and_then(|p| p.shop_name.clone().filter(|s| !s.trim().is_empty()))
        .or_else(|| {
            identity
                .email
                .split('@')
                .next()
                .filter(|local| !local.is_empty())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| DEFAULT_SELLER_NAME.to_owned());

    let orders = store
        .list_orders(&OrderFilter { seller_id: Some(identity.user_id), ..OrderFilter::default() })
        .await?;
    let revenue: i64 = orders.iter().filter_map(|o| o.price).sum();

    Ok(SellerDashboard {
        display_name,
        total_protected: orders.len(),
        ongoing_disputes: dispute::count_open(store, None).await?,
        saved_revenue: format_revenue(revenue),
        fraud_attempts: blacklist::count_with_status(store, BlacklistStatus::Verified).await?,
        verified_blacklist: blacklist::verified_feed(store).await?,
    })
}

// =============================================================================
// BUYER
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RecentOrder {
    pub tracking_number: String,
    pub store: String,
    pub status: OrderStatus,
    pub status_label: &'static str,
    pub amount: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
}

impl From<&Order> for RecentOrder {
    fn from(order: &Order) -> Self {
        Self {
            tracking_number: order.tracking_number.clone(),
            store: order
                .product_name
                .clone()
                .unwrap_or_else(|| DEFAULT_STORE_LABEL.to_owned()),
            status: order.status,
            status_label: order_status_label(order.status),
            amount: format_price(order.price.unwrap_or(0)),
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuyerDashboard {
    pub active_disputes: usize,
    pub trust_score: i32,
    pub trust_level: TrustLevel,
    pub recent_orders: Vec<RecentOrder>,
    pub total_received: usize,
    pub total_unboxing: usize,
}

pub async fn buyer(store: &dyn Store, identity: &Identity) -> Result<BuyerDashboard, StoreError> {
    let active_disputes = dispute::count_open(store, Some(identity.user_id)).await?;
    let trust_score = store
        .get_profile(identity.user_id)
        .await?
        .map_or(DEFAULT_TRUST_SCORE, |p| p.trust_score);

    let orders = store
        .list_orders(&OrderFilter {
            buyer_email: Some(identity.email.clone()),
            limit: Some(RECENT_ORDERS_LIMIT),
            ..OrderFilter::default()
        })
        .await?;
    let order_ids: Vec<_> = orders.iter().map(|o| o.id).collect();
    let total_unboxing = store
        .count_evidence(EvidenceKind::Unboxing, &order_ids)
        .await?;

    Ok(BuyerDashboard {
        active_disputes,
        trust_score,
        trust_level: trust_level(trust_score),
        total_received: orders
            .iter()
            .filter(|o| o.status == OrderStatus::Delivered)
            .count(),
        recent_orders: orders.iter().map(RecentOrder::from).collect(),
        total_unboxing,
    })
}

// =============================================================================
// ADMIN
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct AdminDashboard {
    pub pending_reports: Vec<BlacklistEntry>,
    pub blacklisted: usize,
    pub pending: usize,
    pub total_resolved_disputes: i64,
    pub total_fraud_blocked: i64,
}

pub async fn admin(store: &dyn Store) -> Result<AdminDashboard, StoreError> {
    let pending_reports = blacklist::pending_queue(store).await?;
    let stats = store
        .get_stats(&[STAT_TOTAL_RESOLVED_DISPUTES, STAT_TOTAL_FRAUD_BLOCKED])
        .await?;

    Ok(AdminDashboard {
        pending: pending_reports.len(),
        pending_reports,
        blacklisted: blacklist::count_with_status(store, BlacklistStatus::Verified).await?,
        total_resolved_disputes: stat_value(&stats, STAT_TOTAL_RESOLVED_DISPUTES),
        total_fraud_blocked: stat_value(&stats, STAT_TOTAL_FRAUD_BLOCKED),
    })
}

// =============================================================================
// LANDING
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct LandingPage {
    pub total_umkm_users: i64,
    pub featured_blacklist: Vec<BlacklistEntry>,
}

pub async fn landing(store: &dyn Store) -> Result<LandingPage, StoreError> {
    let stats = store.get_stats(&[STAT_TOTAL_UMKM_USERS]).await?;
    let total = stat_value(&stats, STAT_TOTAL_UMKM_USERS);
    Ok(LandingPage {
        total_umkm_users: if total > 0 { total } else { DEFAULT_UMKM_USERS },
        featured_blacklist: blacklist::landing_feed(store).await?,
    })
}

#[cfg(test)]
#[path = "dashboard_test.rs"]
mod tests;
