use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use uuid::Uuid;

use crate::utils::money::{serialize_cents, serialize_cents_opt};

/// Marketplace role. Maps to the `user_role` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Client,
    Freelancer,
    Admin,
}

impl UserRole {
    pub fn to_str(&self) -> &str {
        match self {
            Self::Client => "client",
            Self::Freelancer => "freelancer",
            Self::Admin => "admin",
        }
    }

    /// Admins are provisioned out of band.
    pub fn is_self_registrable(&self) -> bool {
        !matches!(self, Self::Admin)
    }
}

/// Row of the `users` table. `wallet_balance` holds released freelancer earnings.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub role: UserRole,
    #[serde(serialize_with = "serialize_cents")]
    pub wallet_balance: BigDecimal,
    #[serde(serialize_with = "serialize_cents_opt")]
    pub avg_rating: Option<BigDecimal>,
    pub total_reviews: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_admin_is_not_self_registrable() {
        assert!(UserRole::Client.is_self_registrable());
        assert!(UserRole::Freelancer.is_self_registrable());
        assert!(!UserRole::Admin.is_self_registrable());
    }

    #[test]
    fn role_names_match_database_labels() {
        assert_eq!(UserRole::Freelancer.to_str(), "freelancer");
        assert_eq!(
            serde_json::to_value(UserRole::Admin).unwrap(),
            serde_json::json!("admin")
        );
    }
}
