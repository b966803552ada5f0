use axum::http::StatusCode;
use sqlx::types::BigDecimal;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    error::HttpError,
    models::{disputemodel::DisputeStatus, ordermodel::OrderStatus, withdrawalmodel::WithdrawalStatus},
    service::order_state::OrderAction,
    utils::money::QuoteError,
};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Order {0} not found")]
    OrderNotFound(Uuid),

    #[error("Service {0} not found")]
    ServiceNotFound(Uuid),

    #[error("Dispute {0} not found")]
    DisputeNotFound(Uuid),

    #[error("Withdrawal {0} not found")]
    WithdrawalNotFound(Uuid),

    #[error("Withdrawal method {0} not found")]
    WithdrawalMethodNotFound(Uuid),

    #[error("User {0} not found")]
    UserNotFound(Uuid),

    #[error("Deliverable {0} not found")]
    DeliverableNotFound(Uuid),

    #[error("User {0} is not allowed to perform this action on order {1}")]
    UnauthorizedOrderAccess(Uuid, Uuid),

    #[error("User {0} is not allowed to perform this action on dispute {1}")]
    UnauthorizedDisputeAccess(Uuid, Uuid),

    #[error("Cannot {action} an order that is {status}")]
    InvalidOrderTransition { action: OrderAction, status: OrderStatus },

    #[error("Revision limit reached: {used} of {allowed} revisions used")]
    RevisionLimitReached { allowed: i32, used: i32 },

    #[error("Invalid escrow state transition: {0}")]
    InvalidEscrowTransition(String),

    #[error("Dispute {0} is not in status {1:?}")]
    InvalidDisputeStatus(Uuid, DisputeStatus),

    #[error("Withdrawal {0} cannot be changed while {1}")]
    InvalidWithdrawalStatus(Uuid, WithdrawalStatus),

    #[error("Insufficient balance. Available: ${available}, Required: ${required}")]
    InsufficientBalance {
        required: BigDecimal,
        available: BigDecimal,
    },

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<QuoteError> for ServiceError {
    fn from(err: QuoteError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::OrderNotFound(_)
            | ServiceError::ServiceNotFound(_)
            | ServiceError::DisputeNotFound(_)
            | ServiceError::WithdrawalNotFound(_)
            | ServiceError::WithdrawalMethodNotFound(_)
            | ServiceError::UserNotFound(_)
            | ServiceError::DeliverableNotFound(_) => StatusCode::NOT_FOUND,

            ServiceError::UnauthorizedOrderAccess(_, _)
            | ServiceError::UnauthorizedDisputeAccess(_, _) => StatusCode::FORBIDDEN,

            ServiceError::InvalidOrderTransition { .. }
            | ServiceError::RevisionLimitReached { .. }
            | ServiceError::InvalidEscrowTransition(_)
            | ServiceError::InvalidDisputeStatus(_, _)
            | ServiceError::InvalidWithdrawalStatus(_, _)
            | ServiceError::InsufficientBalance { .. }
            | ServiceError::Validation(_) => StatusCode::BAD_REQUEST,

            ServiceError::Conflict(_) => StatusCode::CONFLICT,

            ServiceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// A lost race on a guarded write.
    pub fn conflict(message: impl Into<String>) -> Self {
        ServiceError::Conflict(message.into())
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        let status = error.status_code();
        match error {
            ServiceError::Database(ref err) => {
                tracing::error!("database error: {}", err);
                HttpError::server_error("Something went wrong, please try again later")
            }
            _ => HttpError::new(error.to_string(), status),
        }
    }
}

/// Postgres unique_violation (23505).
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn not_found_maps_to_404() {
        let err: HttpError = ServiceError::OrderNotFound(Uuid::new_v4()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn wrong_party_maps_to_403() {
        let err: HttpError =
            ServiceError::UnauthorizedOrderAccess(Uuid::new_v4(), Uuid::new_v4()).into();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn rule_violations_map_to_400() {
        let transition = ServiceError::InvalidOrderTransition {
            action: OrderAction::Complete,
            status: OrderStatus::Pending,
        };
        assert_eq!(transition.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(transition.to_string(), "Cannot complete an order that is pending");

        let quota = ServiceError::RevisionLimitReached { allowed: 1, used: 1 };
        assert_eq!(quota.status_code(), StatusCode::BAD_REQUEST);

        let balance = ServiceError::InsufficientBalance {
            required: BigDecimal::from_str("50.00").unwrap(),
            available: BigDecimal::from_str("20.00").unwrap(),
        };
        assert_eq!(balance.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            balance.to_string(),
            "Insufficient balance. Available: $20.00, Required: $50.00"
        );
    }

    #[test]
    fn lost_race_maps_to_409() {
        let err: HttpError = ServiceError::conflict("Order was modified concurrently").into();
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.message, "Order was modified concurrently");
    }

    #[test]
    fn database_errors_are_opaque() {
        let err: HttpError = ServiceError::Database(sqlx::Error::RowNotFound).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("RowNotFound"));
    }

    #[test]
    fn quote_errors_become_validation() {
        let err: ServiceError = QuoteError::NonPositive.into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
