use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    models::usermodel::{User, UserRole},
    utils::money::{serialize_cents, serialize_cents_opt},
};

#[derive(Validate, Debug, Clone, Deserialize)]
pub struct RegisterUserDto {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,

    #[validate(length(min = 3, max = 50, message = "Username must be between 3 and 50 characters"))]
    pub username: String,

    #[validate(email(message = "A valid email address is required"))]
    pub email: String,

    #[validate(length(min = 6, max = 128, message = "Password must be between 6 and 128 characters"))]
    pub password: String,

    #[validate(must_match(other = "password", message = "Password confirmation does not match"))]
    #[serde(rename = "passwordConfirm")]
    pub password_confirm: String,

    /// Defaults to `client` when omitted.
    #[validate(custom = "registrable_role")]
    pub role: Option<UserRole>,
}

fn registrable_role(role: &UserRole) -> Result<(), ValidationError> {
    if role.is_self_registrable() {
        return Ok(());
    }
    let mut err = ValidationError::new("role");
    err.message = Some("Admin accounts cannot be self-registered".into());
    Err(err)
}

#[derive(Validate, Debug, Clone, Deserialize)]
pub struct LoginUserDto {
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Public view of an account. Never carries the password hash.
#[derive(Debug, Serialize)]
pub struct UserProfileDto {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    #[serde(serialize_with = "serialize_cents")]
    pub wallet_balance: BigDecimal,
    #[serde(serialize_with = "serialize_cents_opt")]
    pub avg_rating: Option<BigDecimal>,
    pub total_reviews: i32,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfileDto {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            wallet_balance: user.wallet_balance.clone(),
            avg_rating: user.avg_rating.clone(),
            total_reviews: user.total_reviews,
            created_at: user.created_at,
        }
    }
}

/// Login payload: the token is also set as a cookie.
#[derive(Debug, Serialize)]
pub struct LoginResponseDto {
    pub token: String,
    pub user: UserProfileDto,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(role: Option<UserRole>) -> RegisterUserDto {
        RegisterUserDto {
            name: "Ada".to_string(),
            username: "ada_l".to_string(),
            email: "ada@example.com".to_string(),
            password: "secret123".to_string(),
            password_confirm: "secret123".to_string(),
            role,
        }
    }

    #[test]
    fn freelancer_and_default_signups_are_valid() {
        assert!(register(Some(UserRole::Freelancer)).validate().is_ok());
        assert!(register(None).validate().is_ok());
    }

    #[test]
    fn admin_signup_is_rejected() {
        assert!(register(Some(UserRole::Admin)).validate().is_err());
    }

    #[test]
    fn password_confirmation_must_match() {
        let mut dto = register(None);
        dto.password_confirm = "different".to_string();
        assert!(dto.validate().is_err());
    }

    #[test]
    fn short_username_is_rejected() {
        let mut dto = register(None);
        dto.username = "ab".to_string();
        assert!(dto.validate().is_err());
    }

    #[test]
    fn login_requires_valid_email() {
        let dto = LoginUserDto {
            email: "not-an-email".to_string(),
            password: "secret123".to_string(),
        };
        assert!(dto.validate().is_err());
    }

    #[test]
    fn profile_omits_password() {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            username: "ada_l".to_string(),
            email: "ada@example.com".to_string(),
            password: "$argon2id$hash".to_string(),
            role: UserRole::Client,
            wallet_balance: BigDecimal::from(0),
            avg_rating: None,
            total_reviews: 0,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(UserProfileDto::from(&user)).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["role"], "client");
    }
}
