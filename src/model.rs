//! Domain rows shared by the store, services, and routes.
//!
//! DESIGN
//! ======
//! Each struct mirrors one table. Status-like columns are stored as text and
//! converted through `as_str` / `parse` at the store boundary, so the enums
//! here are the only place the allowed values are spelled out.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Placeholder media URL recorded with seller packing evidence.
pub const PACKING_MEDIA_PLACEHOLDER: &str = "https://vimeo.com/placeholder-packing-video";

/// Placeholder media URL recorded with buyer unboxing evidence.
pub const UNBOXING_MEDIA_PLACEHOLDER: &str = "https://vimeo.com/placeholder-unboxing-video";

/// Starting trust score for new profiles.
pub const DEFAULT_TRUST_SCORE: i32 = 100;

// =============================================================================
// ROLES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Seller,
    Buyer,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Seller => "seller",
            Self::Buyer => "buyer",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "seller" => Some(Self::Seller),
            "buyer" => Some(Self::Buyer),
            _ => None,
        }
    }
}

// =============================================================================
// PROFILE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Role,
    pub shop_name: Option<String>,
    pub trust_score: i32,
}

/// Insert payload for a freshly registered identity.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub password_hash: String,
}

/// Stored credential for password sign-in.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user_id: Uuid,
    pub password_hash: String,
}

// =============================================================================
// ORDERS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Shipped,
    Delivered,
    Disputed,
}

impl OrderStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Disputed => "disputed",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "shipped" => Some(Self::Shipped),
            "delivered" => Some(Self::Delivered),
            "disputed" => Some(Self::Disputed),
            _ => None,
        }
    }
}

/// A tracked shipment. `price` is whole rupiah.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub tracking_number: String,
    pub status: OrderStatus,
    pub price: Option<i64>,
    pub product_name: Option<String>,
    pub buyer_email: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub seller_id: Uuid,
    pub tracking_number: String,
    pub status: OrderStatus,
    pub price: Option<i64>,
    pub product_name: Option<String>,
    pub buyer_email: Option<String>,
}

impl NewOrder {
    /// A shipment registered by the packing wizard: only seller and tracking number are known.
    #[must_use]
    pub fn shipped(seller_id: Uuid, tracking_number: impl Into<String>) -> Self {
        Self {
            seller_id,
            tracking_number: tracking_number.into(),
            status: OrderStatus::Shipped,
            price: None,
            product_name: None,
            buyer_email: None,
        }
    }
}

// =============================================================================
// EVIDENCE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    Packing,
    Unboxing,
}

impl EvidenceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Packing => "packing",
            Self::Unboxing => "unboxing",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "packing" => Some(Self::Packing),
            "unboxing" => Some(Self::Unboxing),
            _ => None,
        }
    }
}

/// Capture context locked into an evidence record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceMetadata {
    pub device: String,
    pub location: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Free-form capture attributes (fps, quality, sensor status, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl EvidenceMetadata {
    #[must_use]
    pub fn captured_now(device: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            location: location.into(),
            timestamp: OffsetDateTime::now_utc(),
            extra: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub id: Uuid,
    pub order_id: Uuid,
    pub uploader_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: EvidenceKind,
    pub media_url: String,
    pub metadata: EvidenceMetadata,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewEvidence {
    pub order_id: Uuid,
    pub uploader_id: Option<Uuid>,
    pub kind: EvidenceKind,
    pub media_url: String,
    pub metadata: EvidenceMetadata,
}

// =============================================================================
// DISPUTES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Pending,
    InReview,
    Resolved,
    Rejected,
}

impl DisputeStatus {
    /// Statuses counted as "still open" on dashboards.
    pub const OPEN: [Self; 2] = [Self::Pending, Self::InReview];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InReview => "in_review",
            Self::Resolved => "resolved",
            Self::Rejected => "rejected",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "in_review" => Some(Self::InReview),
            "resolved" => Some(Self::Resolved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DisputePriority {
    Low,
    #[default]
    Medium,
    High,
}

impl DisputePriority {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub buyer_email: String,
    /// Marketplace order reference as typed by the buyer, not an `orders.id`.
    pub order_id: Option<String>,
    pub resi: String,
    pub reason: String,
    pub description: String,
    pub priority: DisputePriority,
    pub status: DisputeStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewDispute {
    pub buyer_id: Uuid,
    pub buyer_email: String,
    pub order_id: Option<String>,
    pub resi: String,
    pub reason: String,
    pub description: String,
    pub priority: DisputePriority,
    pub status: DisputeStatus,
}

// =============================================================================
// BLACKLIST
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlacklistStatus {
    Pending,
    Verified,
    /// Older admin clients send `dismissed` for the same verdict.
    #[serde(alias = "dismissed")]
    Rejected,
}

impl BlacklistStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "verified" => Some(Self::Verified),
            "rejected" | "dismissed" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub id: Uuid,
    pub reported_by: Uuid,
    pub subject_name: String,
    pub platform: String,
    pub reason: String,
    pub description: Option<String>,
    pub status: BlacklistStatus,
    pub trust_score: i32,
    pub show_on_landing_page: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewBlacklistEntry {
    pub reported_by: Uuid,
    pub subject_name: String,
    pub platform: String,
    pub reason: String,
    pub status: BlacklistStatus,
    /// `None` when the deployed schema predates the description column.
    pub description: Option<String>,
}

// =============================================================================
// STATS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    pub key: String,
    pub value: i64,
}

pub const STAT_TOTAL_RESOLVED_DISPUTES: &str = "total_resolved_disputes";
pub const STAT_TOTAL_FRAUD_BLOCKED: &str = "total_fraud_blocked";
pub const STAT_TOTAL_UMKM_USERS: &str = "total_umkm_users";

#[cfg(test)]
#[path = "model_test.rs"]
mod tests;
