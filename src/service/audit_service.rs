// service/audit_service.rs
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    db::{orderdb::OrderExt, DBClient},
    models::ordermodel::{NewOrder, NewOrderEvent, OrderEvent, OrderStatus},
    service::{error::ServiceError, order_state::OrderAction},
};

pub const EVENT_ORDER_PLACED: &str = "order_placed";
pub const EVENT_REVISIONS_PURCHASED: &str = "revisions_purchased";
pub const EVENT_REVIEW_SUBMITTED: &str = "review_submitted";
pub const EVENT_EVIDENCE_ADDED: &str = "dispute_evidence_added";
pub const EVENT_FREELANCER_RESPONSE: &str = "dispute_freelancer_response";
pub const EVENT_DELIVERABLE_ADDED: &str = "deliverable_added";
pub const EVENT_DELIVERABLE_UPDATED: &str = "deliverable_updated";

/// The order timeline. Events are built here and written by the db layer
/// inside the transaction of the change they describe.
#[derive(Debug, Clone)]
pub struct AuditService {
    db_client: Arc<DBClient>,
}

impl AuditService {
    pub fn new(db_client: Arc<DBClient>) -> Self {
        Self { db_client }
    }

    pub async fn get_order_timeline(&self, order_id: Uuid) -> Result<Vec<OrderEvent>, ServiceError> {
        Ok(self.db_client.get_order_events(order_id).await?)
    }
}

pub fn order_placed_event(new_order: &NewOrder) -> NewOrderEvent {
    NewOrderEvent::new(Some(new_order.client_id), EVENT_ORDER_PLACED)
        .with("status", OrderStatus::Pending)
        .with("service_id", new_order.service_id)
        .with("order_type", new_order.order_type)
        .with("total_price", &new_order.total_price)
        .with("included_revision_limit", new_order.included_revision_limit)
}

/// A status change. `status` is the state the order lands in.
pub fn transition_event(
    actor_id: Option<Uuid>,
    action: OrderAction,
    status: OrderStatus,
) -> NewOrderEvent {
    NewOrderEvent::new(actor_id, action.event_type()).with("status", status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ordermodel::OrderType;
    use sqlx::types::BigDecimal;

    #[test]
    fn placement_event_snapshots_the_order() {
        let new_order = NewOrder {
            service_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            freelancer_id: Uuid::new_v4(),
            order_type: OrderType::Small,
            total_price: BigDecimal::from(250),
            included_revision_limit: Some(3),
            requirements: None,
            required_hours: None,
            delivery_date: None,
            milestone_count: None,
            milestone_delivery_date: None,
            addon_service_ids: Vec::new(),
        };

        let event = order_placed_event(&new_order);
        assert_eq!(event.event_type, EVENT_ORDER_PLACED);
        assert_eq!(event.actor_id, Some(new_order.client_id));
        assert_eq!(event.details["status"], "pending");
        assert_eq!(event.details["included_revision_limit"], 3);
    }

    #[test]
    fn auto_completion_has_no_actor() {
        let event = transition_event(None, OrderAction::AutoComplete, OrderStatus::Completed);
        assert_eq!(event.actor_id, None);
        assert_eq!(event.event_type, OrderAction::AutoComplete.event_type());
        assert_eq!(event.details["status"], "completed");
    }
}
