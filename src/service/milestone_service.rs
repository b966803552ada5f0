// service/milestone_service.rs
use std::sync::Arc;

use chrono::Utc;
use num_traits::Zero;
use sqlx::types::BigDecimal;
use uuid::Uuid;

use crate::{
    db::{orderdb::OrderExt, DBClient},
    dtos::orderdtos::{CreateDeliverableDto, DeliverableUpdatedDto, MilestonePlanDto, OrderDto},
    models::{
        ordermodel::{Deliverable, DeliverableStatus, NewDeliverable, NewOrderEvent, Order, OrderStatus, OrderType},
        usermodel::User,
    },
    service::{
        audit_service::{EVENT_DELIVERABLE_ADDED, EVENT_DELIVERABLE_UPDATED},
        error::ServiceError,
        order_service::ensure_can_view,
    },
    utils::money::to_cents,
};

/// Milestones can be planned until the work is handed over.
const PLANNING_STATES: [OrderStatus; 3] = [
    OrderStatus::Pending,
    OrderStatus::InProgress,
    OrderStatus::RevisionRequested,
];

/// Milestones progress only while the freelancer is working.
const WORKING_STATES: [OrderStatus; 2] = [OrderStatus::InProgress, OrderStatus::RevisionRequested];

#[derive(Debug, Clone)]
pub struct MilestoneService {
    db_client: Arc<DBClient>,
}

impl MilestoneService {
    pub fn new(db_client: Arc<DBClient>) -> Self {
        Self { db_client }
    }

    pub async fn add_deliverable(
        &self,
        freelancer_id: Uuid,
        order_id: Uuid,
        body: CreateDeliverableDto,
    ) -> Result<Deliverable, ServiceError> {
        let order = self.get_order(order_id).await?;
        if order.freelancer_id != freelancer_id {
            return Err(ServiceError::UnauthorizedOrderAccess(freelancer_id, order_id));
        }
        ensure_milestone_order(&order)?;
        ensure_state(&order, &PLANNING_STATES)?;

        if matches!(body.due_date, Some(due) if due <= Utc::now()) {
            return Err(ServiceError::Validation(
                "Deliverable due date must be in the future".to_string(),
            ));
        }

        let payment_amount = body.payment_amount.as_ref().map(to_cents);
        let existing = self.db_client.get_deliverables(order_id).await?;
        ensure_capacity(&order, &existing, payment_amount.as_ref())?;

        let event = NewOrderEvent::new(Some(freelancer_id), EVENT_DELIVERABLE_ADDED)
            .with("payment_amount", &payment_amount);
        let new_deliverable = NewDeliverable {
            description: body.description,
            due_date: body.due_date,
            payment_amount: payment_amount.clone(),
        };

        let created = self
            .db_client
            .create_deliverable(
                order_id,
                freelancer_id,
                state_names(&PLANNING_STATES),
                new_deliverable,
                event,
            )
            .await?;

        let Some(deliverable) = created else {
            let order = self.get_order(order_id).await?;
            ensure_state(&order, &PLANNING_STATES)?;
            let existing = self.db_client.get_deliverables(order_id).await?;
            ensure_capacity(&order, &existing, payment_amount.as_ref())?;
            return Err(ServiceError::conflict(format!(
                "Order {} was modified by another request, please retry",
                order_id
            )));
        };

        tracing::info!(
            "Milestone {} added to order {} by freelancer {}",
            deliverable.phase,
            order_id,
            freelancer_id
        );

        Ok(deliverable)
    }

    pub async fn list_deliverables(
        &self,
        user: &User,
        order_id: Uuid,
    ) -> Result<MilestonePlanDto, ServiceError> {
        let order = self.get_order(order_id).await?;
        ensure_can_view(user, &order)?;

        let deliverables = self.db_client.get_deliverables(order_id).await?;

        Ok(MilestonePlanDto {
            order_id,
            milestone_count: order.milestone_count,
            current_phase: order.current_phase,
            allocated_amount: allocated(&deliverables),
            deliverables,
        })
    }

    pub async fn update_deliverable_status(
        &self,
        freelancer_id: Uuid,
        order_id: Uuid,
        deliverable_id: Uuid,
        next: DeliverableStatus,
    ) -> Result<DeliverableUpdatedDto, ServiceError> {
        let order = self.get_order(order_id).await?;
        if order.freelancer_id != freelancer_id {
            return Err(ServiceError::UnauthorizedOrderAccess(freelancer_id, order_id));
        }
        ensure_state(&order, &WORKING_STATES)?;

        let current = self
            .db_client
            .get_deliverables(order_id)
            .await?
            .into_iter()
            .find(|d| d.id == deliverable_id)
            .ok_or(ServiceError::DeliverableNotFound(deliverable_id))?;

        if !current.status.can_move_to(next) {
            return Err(ServiceError::Validation(format!(
                "Cannot move a deliverable from {} to {}",
                current.status, next
            )));
        }

        let event = NewOrderEvent::new(Some(freelancer_id), EVENT_DELIVERABLE_UPDATED)
            .with("from", current.status)
            .with("to", next);

        let (deliverable, order) = self
            .db_client
            .update_deliverable_status(
                order_id,
                deliverable_id,
                freelancer_id,
                state_names(&WORKING_STATES),
                current.status,
                next,
                event,
            )
            .await?
            .ok_or_else(|| {
                ServiceError::conflict(format!(
                    "Deliverable {} was modified by another request, please retry",
                    deliverable_id
                ))
            })?;

        tracing::info!(
            "Milestone {} of order {} is now {} (current phase {:?})",
            deliverable.phase,
            order_id,
            deliverable.status,
            order.current_phase
        );

        Ok(DeliverableUpdatedDto {
            order: OrderDto::from_order(order),
            deliverable,
        })
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        self.db_client
            .get_order(order_id)
            .await?
            .ok_or(ServiceError::OrderNotFound(order_id))
    }
}

fn state_names(states: &[OrderStatus]) -> Vec<String> {
    states.iter().map(|s| s.to_str().to_string()).collect()
}

fn allocated(deliverables: &[Deliverable]) -> BigDecimal {
    deliverables
        .iter()
        .filter_map(|d| d.payment_amount.as_ref())
        .fold(BigDecimal::zero(), |acc, amount| acc + amount)
}

fn ensure_milestone_order(order: &Order) -> Result<(), ServiceError> {
    match order.order_type {
        OrderType::Big => Ok(()),
        OrderType::Small => Err(ServiceError::Validation(
            "Only big orders are split into milestones".to_string(),
        )),
    }
}

fn ensure_state(order: &Order, allowed: &[OrderStatus]) -> Result<(), ServiceError> {
    if allowed.contains(&order.status) {
        Ok(())
    } else {
        Err(ServiceError::Validation(format!(
            "Milestones cannot be changed while the order is {}",
            order.status
        )))
    }
}

/// Every phase up to `milestone_count` gets one deliverable, and the
/// earmarked payments never exceed the order total.
fn ensure_capacity(
    order: &Order,
    existing: &[Deliverable],
    payment_amount: Option<&BigDecimal>,
) -> Result<(), ServiceError> {
    let milestones = order.milestone_count.unwrap_or(0);
    if existing.len() as i32 >= milestones {
        return Err(ServiceError::Validation(format!(
            "All {} milestones of this order are already planned",
            milestones
        )));
    }

    if let Some(amount) = payment_amount {
        let planned = allocated(existing) + amount;
        if planned > order.total_price {
            return Err(ServiceError::Validation(format!(
                "Milestone payments {} would exceed the order total {}",
                to_cents(&planned),
                to_cents(&order.total_price)
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn big_order(milestones: i32, total: &str) -> Order {
        Order {
            id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            freelancer_id: Uuid::new_v4(),
            status: OrderStatus::InProgress,
            order_type: OrderType::Big,
            total_price: dec(total),
            revision_count: 0,
            included_revision_limit: Some(3),
            extra_revisions_purchased: 0,
            review_given: false,
            requirements: None,
            required_hours: None,
            delivery_date: None,
            milestone_count: Some(milestones),
            current_phase: Some(1),
            milestone_delivery_date: None,
            order_date: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn deliverable(order: &Order, phase: i32, amount: Option<&str>) -> Deliverable {
        Deliverable {
            id: Uuid::new_v4(),
            order_id: order.id,
            phase,
            description: format!("Phase {phase}"),
            due_date: None,
            payment_amount: amount.map(dec),
            status: DeliverableStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn small_orders_have_no_milestones() {
        let mut order = big_order(3, "300.00");
        assert!(ensure_milestone_order(&order).is_ok());

        order.order_type = OrderType::Small;
        assert!(matches!(
            ensure_milestone_order(&order),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn phases_are_capped_by_milestone_count() {
        let order = big_order(2, "300.00");
        let one = vec![deliverable(&order, 1, None)];
        assert!(ensure_capacity(&order, &one, None).is_ok());

        let two = vec![deliverable(&order, 1, None), deliverable(&order, 2, None)];
        let err = ensure_capacity(&order, &two, None).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn milestone_payments_stay_within_total() {
        let order = big_order(3, "300.00");
        let existing = vec![
            deliverable(&order, 1, Some("100.00")),
            deliverable(&order, 2, None),
        ];

        assert!(ensure_capacity(&order, &existing, Some(&dec("200.00"))).is_ok());
        assert!(ensure_capacity(&order, &existing, Some(&dec("200.01"))).is_err());
        assert_eq!(allocated(&existing), dec("100.00"));
    }

    #[test]
    fn work_states_exclude_delivered_and_closed_orders() {
        let mut order = big_order(3, "300.00");
        for status in [OrderStatus::InProgress, OrderStatus::RevisionRequested] {
            order.status = status;
            assert!(ensure_state(&order, &WORKING_STATES).is_ok());
        }
        for status in [
            OrderStatus::Pending,
            OrderStatus::Delivered,
            OrderStatus::Disputed,
            OrderStatus::Completed,
        ] {
            order.status = status;
            assert!(ensure_state(&order, &WORKING_STATES).is_err(), "{status}");
        }

        order.status = OrderStatus::Pending;
        assert!(ensure_state(&order, &PLANNING_STATES).is_ok());
    }
}
