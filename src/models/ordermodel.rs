use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use uuid::Uuid;

use crate::utils::money::{serialize_cents, serialize_cents_opt};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    InProgress,
    Delivered,
    RevisionRequested,
    Completed,
    Cancelled,
    Disputed,
}

impl OrderStatus {
    pub fn to_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Delivered => "delivered",
            OrderStatus::RevisionRequested => "revision_requested",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Disputed => "disputed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "order_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Small,
    Big,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "package_tier", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PackageTier {
    Basic,
    Standard,
    Premium,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Held,
    Released,
    Refunded,
    Partial,
}

impl PaymentStatus {
    pub fn to_str(&self) -> &'static str {
        match self {
            PaymentStatus::Held => "held",
            PaymentStatus::Released => "released",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Partial => "partial",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ServiceListing {
    pub id: Uuid,
    pub freelancer_id: Uuid,
    pub title: String,
    pub category: Option<String>,
    pub package_tier: Option<PackageTier>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub service_id: Uuid,
    pub client_id: Uuid,
    pub freelancer_id: Uuid,
    pub status: OrderStatus,
    pub order_type: OrderType,
    #[serde(serialize_with = "serialize_cents")]
    pub total_price: BigDecimal,
    pub revision_count: i32,
    pub included_revision_limit: Option<i32>,
    pub extra_revisions_purchased: i32,
    pub review_given: bool,
    pub requirements: Option<serde_json::Value>,
    pub required_hours: Option<i32>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub milestone_count: Option<i32>,
    pub current_phase: Option<i32>,
    pub milestone_delivery_date: Option<DateTime<Utc>>,
    pub order_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.client_id == user_id || self.freelancer_id == user_id
    }
}

/// Order joined with its listing, parties and escrow state.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderDetail {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub order: Order,
    pub service_title: Option<String>,
    pub service_category: Option<String>,
    pub client_name: Option<String>,
    pub freelancer_name: Option<String>,
    pub payment_status: Option<PaymentStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    #[serde(serialize_with = "serialize_cents")]
    pub amount: BigDecimal,
    pub status: PaymentStatus,
    #[serde(serialize_with = "serialize_cents")]
    pub released_amount: BigDecimal,
    #[serde(serialize_with = "serialize_cents")]
    pub refunded_amount: BigDecimal,
    pub released_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Revision {
    pub id: Uuid,
    pub order_id: Uuid,
    pub client_id: Uuid,
    pub revision_no: i32,
    pub revision_text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RevisionPurchase {
    pub id: Uuid,
    pub order_id: Uuid,
    pub client_id: Uuid,
    pub quantity: i32,
    #[serde(serialize_with = "serialize_cents")]
    pub amount: BigDecimal,
    pub payment_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Delivery {
    pub id: Uuid,
    pub order_id: Uuid,
    pub freelancer_id: Uuid,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Review {
    pub id: Uuid,
    pub order_id: Uuid,
    pub service_id: Uuid,
    pub client_id: Uuid,
    pub freelancer_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
    pub highlights: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderEvent {
    pub id: Uuid,
    pub order_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub event_type: String,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Timeline entry written in the same transaction as the change it records.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderEvent {
    pub actor_id: Option<Uuid>,
    pub event_type: &'static str,
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl NewOrderEvent {
    /// `actor_id` is `None` for system actions such as auto-completion.
    pub fn new(actor_id: Option<Uuid>, event_type: &'static str) -> Self {
        NewOrderEvent {
            actor_id,
            event_type,
            details: serde_json::Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
        self.details.insert(key.to_string(), value);
        self
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "deliverable_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliverableStatus {
    Pending,
    InProgress,
    Completed,
}

impl DeliverableStatus {
    pub fn to_str(&self) -> &'static str {
        match self {
            DeliverableStatus::Pending => "pending",
            DeliverableStatus::InProgress => "in_progress",
            DeliverableStatus::Completed => "completed",
        }
    }

    /// Milestones only move forward.
    pub fn can_move_to(&self, next: DeliverableStatus) -> bool {
        matches!(
            (self, next),
            (DeliverableStatus::Pending, DeliverableStatus::InProgress)
                | (DeliverableStatus::Pending, DeliverableStatus::Completed)
                | (DeliverableStatus::InProgress, DeliverableStatus::Completed)
        )
    }
}

impl std::fmt::Display for DeliverableStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

/// One milestone of a big order. `phase` numbers them from 1.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Deliverable {
    pub id: Uuid,
    pub order_id: Uuid,
    pub phase: i32,
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
    #[serde(serialize_with = "serialize_cents_opt")]
    pub payment_amount: Option<BigDecimal>,
    pub status: DeliverableStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDeliverable {
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
    pub payment_amount: Option<BigDecimal>,
}

/// Validated input for a new order, snapshot of the listing included.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub service_id: Uuid,
    pub client_id: Uuid,
    pub freelancer_id: Uuid,
    pub order_type: OrderType,
    pub total_price: BigDecimal,
    pub included_revision_limit: Option<i32>,
    pub requirements: Option<serde_json::Value>,
    pub required_hours: Option<i32>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub milestone_count: Option<i32>,
    pub milestone_delivery_date: Option<DateTime<Utc>>,
    pub addon_service_ids: Vec<Uuid>,
}
