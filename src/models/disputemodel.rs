use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use uuid::Uuid;

use super::ordermodel::PaymentStatus;
use crate::utils::money::serialize_cents;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "dispute_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    Resolved,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "resolution_type", rename_all = "snake_case")]
#[serde(rename_all = "UPPERCASE")]
pub enum ResolutionType {
    #[serde(alias = "refund")]
    Refund,
    #[serde(alias = "release")]
    Release,
    #[serde(alias = "split")]
    Split,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Dispute {
    pub id: Uuid,
    pub order_id: Uuid,
    pub client_id: Uuid,
    pub freelancer_id: Uuid,
    pub admin_id: Option<Uuid>,
    pub status: DisputeStatus,
    pub reason: String,
    pub freelancer_response: Option<String>,
    pub freelancer_response_at: Option<DateTime<Utc>>,
    pub admin_notes: Option<String>,
    pub decision: Option<ResolutionType>,
    pub resolution_message: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Dispute {
    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.client_id == user_id || self.freelancer_id == user_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DisputeEvidence {
    pub id: Uuid,
    pub dispute_id: Uuid,
    pub submitted_by: Uuid,
    pub description: String,
    pub file_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DisputeResolution {
    pub id: Uuid,
    pub dispute_id: Uuid,
    pub admin_id: Uuid,
    pub resolution_type: ResolutionType,
    #[serde(serialize_with = "serialize_cents")]
    pub client_amount: BigDecimal,
    #[serde(serialize_with = "serialize_cents")]
    pub freelancer_amount: BigDecimal,
    pub payment_status: PaymentStatus,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}
