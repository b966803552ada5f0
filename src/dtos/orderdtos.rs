use chrono::{DateTime, Utc};
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use uuid::Uuid;
use validator::Validate;

use crate::{
    models::ordermodel::{
        Deliverable, DeliverableStatus, Delivery, Order, OrderDetail, OrderEvent, OrderStatus,
        OrderType, Revision, RevisionPurchase,
    },
    service::revision_policy::RevisionQuota,
    utils::money::{max_amount, serialize_cents, to_cents},
};

fn amount_error(message: String) -> validator::ValidationError {
    let mut err = validator::ValidationError::new("amount");
    err.message = Some(message.into());
    err
}

fn ensure_storable(amount: &BigDecimal) -> Result<(), validator::ValidationError> {
    if to_cents(amount) > max_amount() {
        return Err(amount_error(format!(
            "Amount must not exceed {}",
            max_amount()
        )));
    }
    Ok(())
}

pub(crate) fn validate_positive_amount(amount: &BigDecimal) -> Result<(), validator::ValidationError> {
    if *amount <= BigDecimal::zero() {
        return Err(amount_error("Amount must be greater than 0".to_string()));
    }
    ensure_storable(amount)
}

pub(crate) fn validate_non_negative_amount(amount: &BigDecimal) -> Result<(), validator::ValidationError> {
    if *amount < BigDecimal::zero() {
        return Err(amount_error("Amount must not be negative".to_string()));
    }
    ensure_storable(amount)
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderDto {
    pub service_id: Uuid,

    #[validate(custom = "validate_positive_amount")]
    pub total_price: BigDecimal,

    pub order_type: Option<OrderType>,

    pub requirements: Option<serde_json::Value>,

    #[validate(range(min = 1, max = 10000, message = "Required hours must be between 1 and 10000"))]
    pub required_hours: Option<i32>,

    /// Small orders only; defaults to seven days out.
    pub delivery_date: Option<DateTime<Utc>>,

    /// Big orders only; defaults to three milestones.
    #[validate(range(min = 1, max = 50, message = "Milestone count must be between 1 and 50"))]
    pub milestone_count: Option<i32>,

    pub milestone_delivery_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub addon_service_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderQueryDto {
    pub status: Option<OrderStatus>,
}

#[derive(Validate, Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliverOrderDto {
    #[validate(length(max = 5000, message = "Delivery message is too long"))]
    pub message: Option<String>,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct RevisionRequestDto {
    #[validate(length(min = 1, max = 5000, message = "Revision text must be between 1 and 5000 characters"))]
    pub revision_text: String,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseRevisionsDto {
    #[validate(range(min = 1, max = 10, message = "You can buy between 1 and 10 revisions at a time"))]
    pub quantity: i32,

    #[validate(custom = "validate_non_negative_amount")]
    pub amount: Option<BigDecimal>,

    #[validate(length(max = 255))]
    pub payment_ref: Option<String>,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct CreateReviewDto {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i32,

    #[validate(length(max = 2000))]
    pub comment: Option<String>,

    #[validate(length(max = 500))]
    pub highlights: Option<String>,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct CreateDeliverableDto {
    #[validate(length(min = 1, max = 2000, message = "Description must be between 1 and 2000 characters"))]
    pub description: String,

    pub due_date: Option<DateTime<Utc>>,

    /// Part of the order total earmarked for this milestone.
    #[validate(custom = "validate_non_negative_amount")]
    pub payment_amount: Option<BigDecimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDeliverableDto {
    pub status: DeliverableStatus,
}

/// An order as returned after a state change.
#[derive(Debug, Serialize)]
pub struct OrderDto {
    #[serde(flatten)]
    pub order: Order,
    #[serde(flatten)]
    pub revision_policy: RevisionQuota,
}

impl OrderDto {
    pub fn from_order(order: Order) -> Self {
        let revision_policy = RevisionQuota::for_order(&order);
        OrderDto {
            order,
            revision_policy,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderDetailDto {
    #[serde(flatten)]
    pub detail: OrderDetail,
    pub addon_service_ids: Vec<Uuid>,
    #[serde(flatten)]
    pub revision_policy: RevisionQuota,
}

impl OrderDetailDto {
    pub fn new(detail: OrderDetail, addon_service_ids: Vec<Uuid>) -> Self {
        let revision_policy = RevisionQuota::for_order(&detail.order);
        OrderDetailDto {
            detail,
            addon_service_ids,
            revision_policy,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlacedOrderDto {
    #[serde(flatten)]
    pub order: OrderDto,
    pub addon_service_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct DeliveredOrderDto {
    #[serde(flatten)]
    pub order: OrderDto,
    pub delivery: Delivery,
}

#[derive(Debug, Serialize)]
pub struct RevisionRequestedDto {
    #[serde(flatten)]
    pub order: OrderDto,
    pub revision: Revision,
}

#[derive(Debug, Serialize)]
pub struct RevisionPurchasedDto {
    #[serde(flatten)]
    pub order: OrderDto,
    pub purchase: RevisionPurchase,
}

#[derive(Debug, Serialize)]
pub struct RevisionHistoryDto {
    pub order_id: Uuid,
    pub revisions: Vec<Revision>,
    pub purchases: Vec<RevisionPurchase>,
    pub deliveries: Vec<Delivery>,
    #[serde(flatten)]
    pub revision_policy: RevisionQuota,
}

#[derive(Debug, Serialize)]
pub struct MilestonePlanDto {
    pub order_id: Uuid,
    pub milestone_count: Option<i32>,
    pub current_phase: Option<i32>,
    #[serde(serialize_with = "serialize_cents")]
    pub allocated_amount: BigDecimal,
    pub deliverables: Vec<Deliverable>,
}

#[derive(Debug, Serialize)]
pub struct DeliverableUpdatedDto {
    #[serde(flatten)]
    pub order: OrderDto,
    pub deliverable: Deliverable,
}

#[derive(Debug, Serialize)]
pub struct OrderTimelineDto {
    pub order_id: Uuid,
    pub events: Vec<OrderEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn create_dto(price: &str) -> CreateOrderDto {
        CreateOrderDto {
            service_id: Uuid::new_v4(),
            total_price: BigDecimal::from_str(price).unwrap(),
            order_type: None,
            requirements: None,
            required_hours: None,
            delivery_date: None,
            milestone_count: None,
            milestone_delivery_date: None,
            addon_service_ids: Vec::new(),
        }
    }

    #[test]
    fn price_must_be_positive() {
        assert!(create_dto("49.99").validate().is_ok());
        assert!(create_dto("0").validate().is_err());
        assert!(create_dto("-10").validate().is_err());
    }

    #[test]
    fn price_must_fit_the_money_column() {
        assert!(create_dto("9999999999.99").validate().is_ok());

        let err = create_dto("100000000000").validate().unwrap_err();
        assert!(err.to_string().contains("must not exceed 9999999999.99"));
    }

    #[test]
    fn milestone_count_is_bounded() {
        let mut dto = create_dto("100");
        dto.milestone_count = Some(0);
        assert!(dto.validate().is_err());
        dto.milestone_count = Some(4);
        assert!(dto.validate().is_ok());
    }

    #[test]
    fn create_order_accepts_numeric_json() {
        let body = serde_json::json!({
            "service_id": Uuid::new_v4(),
            "total_price": 120.5,
            "order_type": "big",
            "addon_service_ids": []
        });
        let dto: CreateOrderDto = serde_json::from_value(body).unwrap();
        assert_eq!(dto.order_type, Some(OrderType::Big));
        assert!(dto.validate().is_ok());
    }

    #[test]
    fn revision_purchase_bounds() {
        let ok = PurchaseRevisionsDto {
            quantity: 10,
            amount: None,
            payment_ref: None,
        };
        assert!(ok.validate().is_ok());

        let too_many = PurchaseRevisionsDto {
            quantity: 11,
            amount: None,
            payment_ref: None,
        };
        assert!(too_many.validate().is_err());

        let negative = PurchaseRevisionsDto {
            quantity: 1,
            amount: Some(BigDecimal::from(-5)),
            payment_ref: None,
        };
        assert!(negative.validate().is_err());

        let oversized = PurchaseRevisionsDto {
            quantity: 1,
            amount: Some(BigDecimal::from(10_000_000_000i64)),
            payment_ref: None,
        };
        assert!(oversized.validate().is_err());
    }

    #[test]
    fn rating_is_one_to_five() {
        for (rating, ok) in [(0, false), (1, true), (5, true), (6, false)] {
            let dto = CreateReviewDto {
                rating,
                comment: None,
                highlights: None,
            };
            assert_eq!(dto.validate().is_ok(), ok, "rating {rating}");
        }
    }

    #[test]
    fn deliverable_status_uses_snake_case() {
        let dto: UpdateDeliverableDto =
            serde_json::from_value(serde_json::json!({ "status": "in_progress" })).unwrap();
        assert_eq!(dto.status, DeliverableStatus::InProgress);
    }

    #[test]
    fn deliverable_needs_a_description() {
        let dto = CreateDeliverableDto {
            description: String::new(),
            due_date: None,
            payment_amount: None,
        };
        assert!(dto.validate().is_err());

        let dto = CreateDeliverableDto {
            description: "Wireframes for the checkout flow".to_string(),
            due_date: None,
            payment_amount: Some(BigDecimal::from(-1)),
        };
        assert!(dto.validate().is_err());
    }

    #[test]
    fn empty_revision_text_is_rejected() {
        let dto = RevisionRequestDto {
            revision_text: String::new(),
        };
        assert!(dto.validate().is_err());
    }
}
