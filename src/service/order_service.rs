// service/order_service.rs
use std::{collections::HashMap, sync::Arc};

use chrono::{Duration, Utc};
use num_traits::Zero;
use sqlx::types::BigDecimal;
use uuid::Uuid;

use crate::{
    db::{
        orderdb::{OrderExt, OrderGuard},
        DBClient,
    },
    dtos::orderdtos::*,
    models::{
        ordermodel::*,
        usermodel::User,
    },
    service::{
        audit_service::{
            order_placed_event, transition_event, AuditService, EVENT_REVIEW_SUBMITTED,
            EVENT_REVISIONS_PURCHASED,
        },
        error::ServiceError,
        escrow_service::{ensure_held, EscrowSettlement},
        order_state::{self, Actor, OrderAction},
        revision_policy::{included_revisions, RevisionQuota, MAX_REVISION_PURCHASE},
    },
    utils::money::to_cents,
};

const DEFAULT_SMALL_ORDER_DAYS: i64 = 7;
const DEFAULT_MILESTONE_COUNT: i32 = 3;

#[derive(Debug, Clone)]
pub struct OrderService {
    db_client: Arc<DBClient>,
    audit_service: Arc<AuditService>,
}

impl OrderService {
    pub fn new(db_client: Arc<DBClient>, audit_service: Arc<AuditService>) -> Self {
        Self {
            db_client,
            audit_service,
        }
    }

    pub async fn place_order(
        &self,
        client: &User,
        body: CreateOrderDto,
    ) -> Result<PlacedOrderDto, ServiceError> {
        let listing = self
            .db_client
            .get_service_listing(body.service_id)
            .await?
            .ok_or(ServiceError::ServiceNotFound(body.service_id))?;

        if listing.freelancer_id == client.id {
            return Err(ServiceError::Validation(
                "You cannot order your own service".to_string(),
            ));
        }

        let total_price = to_cents(&body.total_price);
        if total_price <= BigDecimal::zero() {
            return Err(ServiceError::Validation(
                "Total price must be greater than 0".to_string(),
            ));
        }

        let now = Utc::now();
        for date in [body.delivery_date, body.milestone_delivery_date].into_iter().flatten() {
            if date <= now {
                return Err(ServiceError::Validation(
                    "Delivery dates must be in the future".to_string(),
                ));
            }
        }

        let order_type = body.order_type.unwrap_or(OrderType::Small);
        let (delivery_date, milestone_count, milestone_delivery_date) = match order_type {
            OrderType::Small => (
                Some(
                    body.delivery_date
                        .unwrap_or_else(|| now + Duration::days(DEFAULT_SMALL_ORDER_DAYS)),
                ),
                None,
                None,
            ),
            OrderType::Big => (
                body.delivery_date,
                Some(body.milestone_count.unwrap_or(DEFAULT_MILESTONE_COUNT)),
                body.milestone_delivery_date,
            ),
        };

        let mut addon_service_ids = body.addon_service_ids;
        addon_service_ids.sort();
        addon_service_ids.dedup();
        addon_service_ids.retain(|id| *id != listing.id);

        let new_order = NewOrder {
            service_id: listing.id,
            client_id: client.id,
            freelancer_id: listing.freelancer_id,
            order_type,
            total_price,
            included_revision_limit: included_revisions(listing.package_tier),
            requirements: body.requirements,
            required_hours: body.required_hours,
            delivery_date,
            milestone_count,
            milestone_delivery_date,
            addon_service_ids,
        };

        let event = order_placed_event(&new_order);
        let (order, addons) = self.db_client.create_order(new_order, event).await?;

        tracing::info!(
            "Order {} placed by {} for service {} ({})",
            order.id,
            client.id,
            listing.id,
            order.total_price
        );

        Ok(PlacedOrderDto {
            order: OrderDto::from_order(order),
            addon_service_ids: addons,
        })
    }

    pub async fn list_orders(
        &self,
        user_id: Uuid,
        status: Option<OrderStatus>,
    ) -> Result<Vec<OrderDetailDto>, ServiceError> {
        let details = self.db_client.get_orders_for_user(user_id, status).await?;

        let order_ids: Vec<Uuid> = details.iter().map(|d| d.order.id).collect();
        let mut addons: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for (order_id, addon_id) in self.db_client.get_addons_for_orders(&order_ids).await? {
            addons.entry(order_id).or_default().push(addon_id);
        }

        Ok(details
            .into_iter()
            .map(|detail| {
                let ids = addons.remove(&detail.order.id).unwrap_or_default();
                OrderDetailDto::new(detail, ids)
            })
            .collect())
    }

    pub async fn get_order_detail(
        &self,
        user: &User,
        order_id: Uuid,
    ) -> Result<OrderDetailDto, ServiceError> {
        let detail = self
            .db_client
            .get_order_detail(order_id)
            .await?
            .ok_or(ServiceError::OrderNotFound(order_id))?;

        ensure_can_view(user, &detail.order)?;

        let addons = self
            .db_client
            .get_addons_for_orders(&[order_id])
            .await?
            .into_iter()
            .map(|(_, addon_id)| addon_id)
            .collect();

        Ok(OrderDetailDto::new(detail, addons))
    }

    pub async fn get_order_timeline(
        &self,
        user: &User,
        order_id: Uuid,
    ) -> Result<OrderTimelineDto, ServiceError> {
        let order = self.get_order(order_id).await?;
        ensure_can_view(user, &order)?;

        let events = self.audit_service.get_order_timeline(order_id).await?;
        Ok(OrderTimelineDto { order_id, events })
    }

    pub async fn accept_order(&self, freelancer_id: Uuid, order_id: Uuid) -> Result<Order, ServiceError> {
        let action = OrderAction::Accept;
        let order = self.load_for_actor(freelancer_id, order_id, action).await?;
        let target = order_state::next_status(order.status, action)?;

        let updated = self
            .db_client
            .transition_order(
                order_id,
                action.allowed_from_sql(),
                target,
                OrderGuard::freelancer(freelancer_id),
                transition_event(Some(freelancer_id), action, target),
            )
            .await?
            .ok_or_else(|| lost_race(order_id))?;
        tracing::info!("Order {} accepted by freelancer {}", order_id, freelancer_id);

        Ok(updated)
    }

    pub async fn reject_order(&self, freelancer_id: Uuid, order_id: Uuid) -> Result<Order, ServiceError> {
        let action = OrderAction::Reject;
        let order = self.load_for_actor(freelancer_id, order_id, action).await?;
        let settlement = EscrowSettlement::full_refund(&order.total_price);

        self.close_order(
            Some(freelancer_id),
            &order,
            action,
            OrderGuard::freelancer(freelancer_id),
            settlement,
        )
        .await
    }

    pub async fn deliver_order(
        &self,
        freelancer_id: Uuid,
        order_id: Uuid,
        message: Option<String>,
    ) -> Result<DeliveredOrderDto, ServiceError> {
        let action = OrderAction::Deliver;
        let order = self.load_for_actor(freelancer_id, order_id, action).await?;
        let target = order_state::next_status(order.status, action)?;

        let (updated, delivery) = self
            .db_client
            .deliver_order(
                order_id,
                freelancer_id,
                action.allowed_from_sql(),
                message,
                transition_event(Some(freelancer_id), action, target),
            )
            .await?
            .ok_or_else(|| lost_race(order_id))?;
        tracing::info!("Order {} delivered by freelancer {}", order_id, freelancer_id);

        Ok(DeliveredOrderDto {
            order: OrderDto::from_order(updated),
            delivery,
        })
    }

    pub async fn cancel_order(&self, client_id: Uuid, order_id: Uuid) -> Result<Order, ServiceError> {
        let action = OrderAction::Cancel;
        let order = self.load_for_actor(client_id, order_id, action).await?;
        let settlement = EscrowSettlement::full_refund(&order.total_price);

        self.close_order(
            Some(client_id),
            &order,
            action,
            OrderGuard::client(client_id),
            settlement,
        )
        .await
    }

    pub async fn complete_order(&self, client_id: Uuid, order_id: Uuid) -> Result<Order, ServiceError> {
        let action = OrderAction::Complete;
        let order = self.load_for_actor(client_id, order_id, action).await?;
        let settlement = EscrowSettlement::full_release(&order.total_price);

        self.close_order(
            Some(client_id),
            &order,
            action,
            OrderGuard::client(client_id),
            settlement,
        )
        .await
    }

    /// Completes delivered orders nobody has touched for `after_days`. Returns how many closed.
    pub async fn auto_complete_stale_orders(&self, after_days: i64) -> Result<usize, ServiceError> {
        let cutoff = Utc::now() - Duration::days(after_days);
        let candidates = self.db_client.get_stale_delivered_orders(cutoff).await?;

        let mut completed = 0;
        for order_id in candidates {
            let Some(order) = self.db_client.get_order(order_id).await? else {
                continue;
            };

            let guard = OrderGuard {
                updated_before: Some(cutoff),
                ..Default::default()
            };
            let settlement = EscrowSettlement::full_release(&order.total_price);

            match self
                .close_order(None, &order, OrderAction::AutoComplete, guard, settlement)
                .await
            {
                Ok(_) => completed += 1,
                Err(ServiceError::Conflict(_)) | Err(ServiceError::InvalidOrderTransition { .. }) => {
                    tracing::debug!("Order {} changed before auto-completion, skipping", order_id);
                }
                Err(e) => tracing::error!("Failed to auto-complete order {}: {}", order_id, e),
            }
        }

        Ok(completed)
    }

    pub async fn request_revision(
        &self,
        client_id: Uuid,
        order_id: Uuid,
        revision_text: String,
    ) -> Result<RevisionRequestedDto, ServiceError> {
        let action = OrderAction::RequestRevision;
        let order = self.load_for_actor(client_id, order_id, action).await?;
        let target = order_state::next_status(order.status, action)?;
        RevisionQuota::for_order(&order).ensure_available()?;

        let result = self
            .db_client
            .request_revision(
                order_id,
                client_id,
                revision_text,
                transition_event(Some(client_id), action, target),
            )
            .await?;

        let Some((updated, revision)) = result else {
            // Someone else consumed the last slot or moved the order first.
            let current = self.get_order(order_id).await?;
            order_state::next_status(current.status, action)?;
            RevisionQuota::for_order(&current).ensure_available()?;
            return Err(lost_race(order_id));
        };

        tracing::info!(
            "Revision {} requested on order {} by {}",
            revision.revision_no,
            order_id,
            client_id
        );

        Ok(RevisionRequestedDto {
            order: OrderDto::from_order(updated),
            revision,
        })
    }

    pub async fn purchase_revisions(
        &self,
        client_id: Uuid,
        order_id: Uuid,
        body: PurchaseRevisionsDto,
    ) -> Result<RevisionPurchasedDto, ServiceError> {
        let order = self.get_order(order_id).await?;
        if order.client_id != client_id {
            return Err(ServiceError::UnauthorizedOrderAccess(client_id, order_id));
        }
        if order_state::is_terminal(order.status) {
            return Err(ServiceError::Validation(format!(
                "Cannot purchase revisions for an order that is {}",
                order.status
            )));
        }
        if order.included_revision_limit.is_none() {
            return Err(ServiceError::Validation(
                "This order already includes unlimited revisions".to_string(),
            ));
        }
        if !(1..=MAX_REVISION_PURCHASE).contains(&body.quantity) {
            return Err(ServiceError::Validation(format!(
                "You can buy between 1 and {} revisions at a time",
                MAX_REVISION_PURCHASE
            )));
        }

        let amount = to_cents(&body.amount.unwrap_or_else(BigDecimal::zero));
        if amount < BigDecimal::zero() {
            return Err(ServiceError::Validation(
                "Amount must not be negative".to_string(),
            ));
        }

        let event = NewOrderEvent::new(Some(client_id), EVENT_REVISIONS_PURCHASED)
            .with("quantity", body.quantity)
            .with("amount", &amount);

        let (updated, purchase) = self
            .db_client
            .purchase_revisions(
                order_id,
                client_id,
                body.quantity,
                amount,
                body.payment_ref,
                event,
            )
            .await?
            .ok_or_else(|| lost_race(order_id))?;

        Ok(RevisionPurchasedDto {
            order: OrderDto::from_order(updated),
            purchase,
        })
    }

    pub async fn get_revision_history(
        &self,
        user: &User,
        order_id: Uuid,
    ) -> Result<RevisionHistoryDto, ServiceError> {
        let order = self.get_order(order_id).await?;
        ensure_can_view(user, &order)?;

        let revisions = self.db_client.get_revisions(order_id).await?;
        let purchases = self.db_client.get_revision_purchases(order_id).await?;
        let deliveries = self.db_client.get_deliveries(order_id).await?;

        Ok(RevisionHistoryDto {
            order_id,
            revisions,
            purchases,
            deliveries,
            revision_policy: RevisionQuota::for_order(&order),
        })
    }

    pub async fn create_review(
        &self,
        client_id: Uuid,
        order_id: Uuid,
        body: CreateReviewDto,
    ) -> Result<Review, ServiceError> {
        let order = self.get_order(order_id).await?;
        if order.client_id != client_id {
            return Err(ServiceError::UnauthorizedOrderAccess(client_id, order_id));
        }
        if order.status != OrderStatus::Completed {
            return Err(ServiceError::Validation(
                "Only completed orders can be reviewed".to_string(),
            ));
        }
        if order.review_given {
            return Err(ServiceError::Validation(
                "This order has already been reviewed".to_string(),
            ));
        }
        if !(1..=5).contains(&body.rating) {
            return Err(ServiceError::Validation(
                "Rating must be between 1 and 5".to_string(),
            ));
        }

        let event =
            NewOrderEvent::new(Some(client_id), EVENT_REVIEW_SUBMITTED).with("rating", body.rating);

        let review = self
            .db_client
            .create_review(
                order_id,
                client_id,
                body.rating,
                body.comment,
                body.highlights,
                event,
            )
            .await?
            .ok_or_else(|| ServiceError::conflict("This order has already been reviewed"))?;

        Ok(review)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        self.db_client
            .get_order(order_id)
            .await?
            .ok_or(ServiceError::OrderNotFound(order_id))
    }

    /// Loads the order and checks the caller is the party `action` belongs to.
    async fn load_for_actor(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        action: OrderAction,
    ) -> Result<Order, ServiceError> {
        let order = self.get_order(order_id).await?;

        let allowed = match action.actor() {
            Actor::Client => order.client_id == user_id,
            Actor::Freelancer => order.freelancer_id == user_id,
            Actor::Admin | Actor::System => true,
        };
        if !allowed {
            return Err(ServiceError::UnauthorizedOrderAccess(user_id, order_id));
        }

        Ok(order)
    }

    async fn close_order(
        &self,
        actor_id: Option<Uuid>,
        order: &Order,
        action: OrderAction,
        guard: OrderGuard,
        settlement: EscrowSettlement,
    ) -> Result<Order, ServiceError> {
        let target = order_state::next_status(order.status, action)?;

        if let Some(payment) = self.db_client.get_payment(order.id).await? {
            ensure_held(payment.status)?;
        }

        let event = transition_event(actor_id, action, target)
            .with("payment_status", settlement.payment_status)
            .with("client_amount", &settlement.client_amount)
            .with("freelancer_amount", &settlement.freelancer_amount);

        let updated = self
            .db_client
            .settle_order(
                order.id,
                action.allowed_from_sql(),
                target,
                guard,
                &settlement,
                event,
            )
            .await?
            .ok_or_else(|| lost_race(order.id))?;

        tracing::info!(
            "Order {} moved to {} ({}), payment {}",
            updated.id,
            updated.status,
            action.event_type(),
            settlement.payment_status.to_str()
        );

        Ok(updated)
    }
}

fn lost_race(order_id: Uuid) -> ServiceError {
    ServiceError::conflict(format!(
        "Order {} was modified by another request, please retry",
        order_id
    ))
}

/// Parties and admins may read an order.
pub fn ensure_can_view(user: &User, order: &Order) -> Result<(), ServiceError> {
    if order.is_party(user.id) || user.is_admin() {
        Ok(())
    } else {
        Err(ServiceError::UnauthorizedOrderAccess(user.id, order.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::usermodel::UserRole;
    use std::str::FromStr;

    fn user(role: UserRole) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Test".to_string(),
            username: "test".to_string(),
            email: "test@example.com".to_string(),
            password: String::new(),
            role,
            wallet_balance: BigDecimal::zero(),
            avg_rating: None,
            total_reviews: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn order(client_id: Uuid, freelancer_id: Uuid) -> Order {
        Order {
            id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            client_id,
            freelancer_id,
            status: OrderStatus::Delivered,
            order_type: OrderType::Small,
            total_price: BigDecimal::from_str("100.00").unwrap(),
            revision_count: 0,
            included_revision_limit: Some(1),
            extra_revisions_purchased: 0,
            review_given: false,
            requirements: None,
            required_hours: None,
            delivery_date: None,
            milestone_count: None,
            current_phase: None,
            milestone_delivery_date: None,
            order_date: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn parties_and_admins_can_view() {
        let client = user(UserRole::Client);
        let freelancer = user(UserRole::Freelancer);
        let admin = user(UserRole::Admin);
        let stranger = user(UserRole::Client);
        let order = order(client.id, freelancer.id);

        assert!(ensure_can_view(&client, &order).is_ok());
        assert!(ensure_can_view(&freelancer, &order).is_ok());
        assert!(ensure_can_view(&admin, &order).is_ok());
        assert!(matches!(
            ensure_can_view(&stranger, &order),
            Err(ServiceError::UnauthorizedOrderAccess(_, _))
        ));
    }

    #[test]
    fn lost_race_is_a_conflict() {
        assert_eq!(
            lost_race(Uuid::nil()).status_code(),
            axum::http::StatusCode::CONFLICT
        );
    }
}
