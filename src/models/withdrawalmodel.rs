use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use uuid::Uuid;

use crate::utils::money::serialize_cents;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "withdrawal_method_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalMethodType {
    BankAccount,
    Paypal,
    Stripe,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "withdrawal_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
    Failed,
}

impl WithdrawalStatus {
    pub fn to_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Processing => "processing",
            WithdrawalStatus::Completed => "completed",
            WithdrawalStatus::Cancelled => "cancelled",
            WithdrawalStatus::Failed => "failed",
        }
    }

    /// Funds are still reserved while a withdrawal is in one of these states.
    pub fn is_open(&self) -> bool {
        matches!(self, WithdrawalStatus::Pending | WithdrawalStatus::Processing)
    }
}

impl std::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WithdrawalMethod {
    pub id: Uuid,
    pub freelancer_id: Uuid,
    pub method_type: WithdrawalMethodType,
    pub account_holder_name: String,
    pub account_number: Option<String>,
    pub bank_name: Option<String>,
    pub swift_code: Option<String>,
    pub paypal_email: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Withdrawal {
    pub id: Uuid,
    pub freelancer_id: Uuid,
    pub withdrawal_method_id: Option<Uuid>,
    #[serde(serialize_with = "serialize_cents")]
    pub amount: BigDecimal,
    #[serde(serialize_with = "serialize_cents")]
    pub fee: BigDecimal,
    #[serde(serialize_with = "serialize_cents")]
    pub net_amount: BigDecimal,
    pub status: WithdrawalStatus,
    pub requested_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub transaction_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WithdrawalWithMethod {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub withdrawal: Withdrawal,
    pub method_type: Option<WithdrawalMethodType>,
    pub account_holder_name: Option<String>,
    pub bank_name: Option<String>,
    pub paypal_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WalletSummary {
    #[serde(serialize_with = "serialize_cents")]
    pub wallet_balance: BigDecimal,
    #[serde(serialize_with = "serialize_cents")]
    pub pending_withdrawals: BigDecimal,
    #[serde(serialize_with = "serialize_cents")]
    pub total_withdrawn: BigDecimal,
    #[serde(serialize_with = "serialize_cents")]
    pub total_fees_paid: BigDecimal,
}
