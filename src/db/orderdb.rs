// db/orderdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use num_traits::Zero;
use sqlx::{types::BigDecimal, Error, Postgres, Transaction};
use uuid::Uuid;

use super::DBClient;
use crate::{
    models::ordermodel::*,
    service::escrow_service::EscrowSettlement,
};

pub(crate) const ORDER_COLUMNS: &str = r#"
    id, service_id, client_id, freelancer_id, status, order_type, total_price,
    revision_count, included_revision_limit, extra_revisions_purchased, review_given,
    requirements, required_hours, delivery_date, milestone_count, current_phase,
    milestone_delivery_date, order_date, updated_at
"#;

const ORDER_DETAIL_SELECT: &str = r#"
    SELECT
        o.id, o.service_id, o.client_id, o.freelancer_id, o.status, o.order_type, o.total_price,
        o.revision_count, o.included_revision_limit, o.extra_revisions_purchased, o.review_given,
        o.requirements, o.required_hours, o.delivery_date, o.milestone_count, o.current_phase,
        o.milestone_delivery_date, o.order_date, o.updated_at,
        s.title AS service_title,
        s.category AS service_category,
        c.name AS client_name,
        f.name AS freelancer_name,
        p.status AS payment_status
    FROM orders o
    LEFT JOIN services s ON s.id = o.service_id
    LEFT JOIN users c ON c.id = o.client_id
    LEFT JOIN users f ON f.id = o.freelancer_id
    LEFT JOIN payments p ON p.order_id = o.id
"#;

/// Optional constraints on who may move an order and when.
#[derive(Debug, Clone, Default)]
pub struct OrderGuard {
    pub client_id: Option<Uuid>,
    pub freelancer_id: Option<Uuid>,
    /// Only match orders last touched before this instant.
    pub updated_before: Option<DateTime<Utc>>,
}

impl OrderGuard {
    pub fn client(client_id: Uuid) -> Self {
        OrderGuard {
            client_id: Some(client_id),
            ..Default::default()
        }
    }

    pub fn freelancer(freelancer_id: Uuid) -> Self {
        OrderGuard {
            freelancer_id: Some(freelancer_id),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait OrderExt {
    async fn get_service_listing(&self, service_id: Uuid) -> Result<Option<ServiceListing>, Error>;

    async fn create_order(
        &self,
        new_order: NewOrder,
        event: NewOrderEvent,
    ) -> Result<(Order, Vec<Uuid>), Error>;

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, Error>;

    async fn get_order_detail(&self, order_id: Uuid) -> Result<Option<OrderDetail>, Error>;

    async fn get_orders_for_user(
        &self,
        user_id: Uuid,
        status: Option<OrderStatus>,
    ) -> Result<Vec<OrderDetail>, Error>;

    async fn get_addons_for_orders(&self, order_ids: &[Uuid]) -> Result<Vec<(Uuid, Uuid)>, Error>;

    async fn get_payment(&self, order_id: Uuid) -> Result<Option<Payment>, Error>;

    /// Conditional status change. `None` when no row matched the guard.
    async fn transition_order(
        &self,
        order_id: Uuid,
        from: Vec<String>,
        to: OrderStatus,
        guard: OrderGuard,
        event: NewOrderEvent,
    ) -> Result<Option<Order>, Error>;

    async fn deliver_order(
        &self,
        order_id: Uuid,
        freelancer_id: Uuid,
        from: Vec<String>,
        message: Option<String>,
        event: NewOrderEvent,
    ) -> Result<Option<(Order, Delivery)>, Error>;

    /// Moves the order to a closed state and settles the held payment in one transaction.
    async fn settle_order(
        &self,
        order_id: Uuid,
        from: Vec<String>,
        to: OrderStatus,
        guard: OrderGuard,
        settlement: &EscrowSettlement,
        event: NewOrderEvent,
    ) -> Result<Option<Order>, Error>;

    async fn request_revision(
        &self,
        order_id: Uuid,
        client_id: Uuid,
        revision_text: String,
        event: NewOrderEvent,
    ) -> Result<Option<(Order, Revision)>, Error>;

    async fn purchase_revisions(
        &self,
        order_id: Uuid,
        client_id: Uuid,
        quantity: i32,
        amount: BigDecimal,
        payment_ref: Option<String>,
        event: NewOrderEvent,
    ) -> Result<Option<(Order, RevisionPurchase)>, Error>;

    async fn get_revisions(&self, order_id: Uuid) -> Result<Vec<Revision>, Error>;

    async fn get_revision_purchases(&self, order_id: Uuid) -> Result<Vec<RevisionPurchase>, Error>;

    async fn get_deliveries(&self, order_id: Uuid) -> Result<Vec<Delivery>, Error>;

    async fn create_review(
        &self,
        order_id: Uuid,
        client_id: Uuid,
        rating: i32,
        comment: Option<String>,
        highlights: Option<String>,
        event: NewOrderEvent,
    ) -> Result<Option<Review>, Error>;

    async fn get_order_events(&self, order_id: Uuid) -> Result<Vec<OrderEvent>, Error>;

    async fn get_stale_delivered_orders(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, Error>;

    /// Appends the next milestone of a big order. `None` when the order no longer
    /// accepts milestones, every phase is taken, or the payments would exceed the total.
    async fn create_deliverable(
        &self,
        order_id: Uuid,
        freelancer_id: Uuid,
        from: Vec<String>,
        deliverable: NewDeliverable,
        event: NewOrderEvent,
    ) -> Result<Option<Deliverable>, Error>;

    async fn get_deliverables(&self, order_id: Uuid) -> Result<Vec<Deliverable>, Error>;

    /// Moves a milestone from `current` to `next` and recomputes the order's `current_phase`.
    async fn update_deliverable_status(
        &self,
        order_id: Uuid,
        deliverable_id: Uuid,
        freelancer_id: Uuid,
        order_from: Vec<String>,
        current: DeliverableStatus,
        next: DeliverableStatus,
        event: NewOrderEvent,
    ) -> Result<Option<(Deliverable, Order)>, Error>;
}

const DELIVERABLE_COLUMNS: &str = r#"
    id, order_id, phase, description, due_date, payment_amount, status, created_at, updated_at
"#;

/// Appends a timeline row inside an open transaction.
pub(crate) async fn record_event(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    event: NewOrderEvent,
) -> Result<(), Error> {
    sqlx::query(
        r#"
        INSERT INTO order_events (order_id, actor_id, event_type, details)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(order_id)
    .bind(event.actor_id)
    .bind(event.event_type)
    .bind(serde_json::Value::Object(event.details))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Adds `amount` to a user's wallet inside an open transaction.
pub(crate) async fn credit_wallet(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    amount: &BigDecimal,
) -> Result<(), Error> {
    if amount.is_zero() {
        return Ok(());
    }

    sqlx::query(
        r#"
        UPDATE users
        SET wallet_balance = wallet_balance + $2,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Settles a held payment. `None` when the payment was already settled.
pub(crate) async fn settle_payment(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    settlement: &EscrowSettlement,
) -> Result<Option<Payment>, Error> {
    sqlx::query_as::<_, Payment>(
        r#"
        UPDATE payments
        SET status = $2,
            released_amount = $3,
            refunded_amount = $4,
            released_at = CASE WHEN $3 > 0 THEN NOW() ELSE released_at END,
            refunded_at = CASE WHEN $4 > 0 THEN NOW() ELSE refunded_at END
        WHERE order_id = $1 AND status = 'held'
        RETURNING id, order_id, amount, status, released_amount, refunded_amount,
                  released_at, refunded_at, created_at
        "#,
    )
    .bind(order_id)
    .bind(settlement.payment_status)
    .bind(&settlement.freelancer_amount)
    .bind(&settlement.client_amount)
    .fetch_optional(&mut **tx)
    .await
}

#[async_trait]
impl OrderExt for DBClient {
    async fn get_service_listing(&self, service_id: Uuid) -> Result<Option<ServiceListing>, Error> {
        sqlx::query_as::<_, ServiceListing>(
            r#"
            SELECT id, freelancer_id, title, category, package_tier
            FROM services
            WHERE id = $1
            "#,
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_order(
        &self,
        new_order: NewOrder,
        event: NewOrderEvent,
    ) -> Result<(Order, Vec<Uuid>), Error> {
        let mut tx = self.pool.begin().await?;

        let current_phase = new_order.milestone_count.map(|_| 1);
        let order = sqlx::query_as::<_, Order>(&format!(
            r#"
            INSERT INTO orders (
                service_id, client_id, freelancer_id, order_type, total_price,
                included_revision_limit, requirements, required_hours, delivery_date,
                milestone_count, current_phase, milestone_delivery_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(new_order.service_id)
        .bind(new_order.client_id)
        .bind(new_order.freelancer_id)
        .bind(new_order.order_type)
        .bind(&new_order.total_price)
        .bind(new_order.included_revision_limit)
        .bind(&new_order.requirements)
        .bind(new_order.required_hours)
        .bind(new_order.delivery_date)
        .bind(new_order.milestone_count)
        .bind(current_phase)
        .bind(new_order.milestone_delivery_date)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO payments (order_id, amount, status)
            VALUES ($1, $2, 'held')
            "#,
        )
        .bind(order.id)
        .bind(&order.total_price)
        .execute(&mut *tx)
        .await?;

        // Only add-ons the listing actually offers are linked.
        let addons: Vec<Uuid> = if new_order.addon_service_ids.is_empty() {
            Vec::new()
        } else {
            sqlx::query_scalar::<_, Uuid>(
                r#"
                INSERT INTO order_addons (order_id, addon_service_id)
                SELECT $1, sa.addon_service_id
                FROM service_addons sa
                WHERE sa.service_id = $2 AND sa.addon_service_id = ANY($3)
                ON CONFLICT DO NOTHING
                RETURNING addon_service_id
                "#,
            )
            .bind(order.id)
            .bind(order.service_id)
            .bind(&new_order.addon_service_ids)
            .fetch_all(&mut *tx)
            .await?
        };

        record_event(&mut tx, order.id, event.with("addons", &addons)).await?;

        tx.commit().await?;
        Ok((order, addons))
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, Error> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_order_detail(&self, order_id: Uuid) -> Result<Option<OrderDetail>, Error> {
        sqlx::query_as::<_, OrderDetail>(&format!("{} WHERE o.id = $1", ORDER_DETAIL_SELECT))
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_orders_for_user(
        &self,
        user_id: Uuid,
        status: Option<OrderStatus>,
    ) -> Result<Vec<OrderDetail>, Error> {
        sqlx::query_as::<_, OrderDetail>(&format!(
            r#"
            {}
            WHERE (o.client_id = $1 OR o.freelancer_id = $1)
              AND ($2::order_status IS NULL OR o.status = $2)
            ORDER BY o.order_date DESC
            "#,
            ORDER_DETAIL_SELECT
        ))
        .bind(user_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_addons_for_orders(&self, order_ids: &[Uuid]) -> Result<Vec<(Uuid, Uuid)>, Error> {
        if order_ids.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, (Uuid, Uuid)>(
            r#"
            SELECT order_id, addon_service_id
            FROM order_addons
            WHERE order_id = ANY($1)
            "#,
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_payment(&self, order_id: Uuid) -> Result<Option<Payment>, Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, order_id, amount, status, released_amount, refunded_amount,
                   released_at, refunded_at, created_at
            FROM payments
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn transition_order(
        &self,
        order_id: Uuid,
        from: Vec<String>,
        to: OrderStatus,
        guard: OrderGuard,
        event: NewOrderEvent,
    ) -> Result<Option<Order>, Error> {
        let mut tx = self.pool.begin().await?;

        let order = sqlx::query_as::<_, Order>(&format!(
            r#"
            UPDATE orders
            SET status = $2, updated_at = NOW()
            WHERE id = $1
              AND status::text = ANY($3)
              AND ($4::uuid IS NULL OR client_id = $4)
              AND ($5::uuid IS NULL OR freelancer_id = $5)
              AND ($6::timestamptz IS NULL OR updated_at < $6)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .bind(to)
        .bind(&from)
        .bind(guard.client_id)
        .bind(guard.freelancer_id)
        .bind(guard.updated_before)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order) = order else {
            return Ok(None);
        };

        record_event(&mut tx, order.id, event).await?;

        tx.commit().await?;
        Ok(Some(order))
    }

    async fn deliver_order(
        &self,
        order_id: Uuid,
        freelancer_id: Uuid,
        from: Vec<String>,
        message: Option<String>,
        event: NewOrderEvent,
    ) -> Result<Option<(Order, Delivery)>, Error> {
        let mut tx = self.pool.begin().await?;

        let order = sqlx::query_as::<_, Order>(&format!(
            r#"
            UPDATE orders
            SET status = 'delivered', updated_at = NOW()
            WHERE id = $1 AND freelancer_id = $2 AND status::text = ANY($3)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .bind(freelancer_id)
        .bind(&from)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order) = order else {
            return Ok(None);
        };

        let delivery = sqlx::query_as::<_, Delivery>(
            r#"
            INSERT INTO deliveries (order_id, freelancer_id, message)
            VALUES ($1, $2, $3)
            RETURNING id, order_id, freelancer_id, message, created_at
            "#,
        )
        .bind(order_id)
        .bind(freelancer_id)
        .bind(message)
        .fetch_one(&mut *tx)
        .await?;

        record_event(&mut tx, order_id, event.with("delivery_id", delivery.id)).await?;

        tx.commit().await?;
        Ok(Some((order, delivery)))
    }

    async fn settle_order(
        &self,
        order_id: Uuid,
        from: Vec<String>,
        to: OrderStatus,
        guard: OrderGuard,
        settlement: &EscrowSettlement,
        event: NewOrderEvent,
    ) -> Result<Option<Order>, Error> {
        let mut tx = self.pool.begin().await?;

        let order = sqlx::query_as::<_, Order>(&format!(
            r#"
            UPDATE orders
            SET status = $2, updated_at = NOW()
            WHERE id = $1
              AND status::text = ANY($3)
              AND ($4::uuid IS NULL OR client_id = $4)
              AND ($5::uuid IS NULL OR freelancer_id = $5)
              AND ($6::timestamptz IS NULL OR updated_at < $6)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .bind(to)
        .bind(&from)
        .bind(guard.client_id)
        .bind(guard.freelancer_id)
        .bind(guard.updated_before)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order) = order else {
            return Ok(None);
        };

        if settle_payment(&mut tx, order_id, settlement).await?.is_none() {
            // Payment already settled; leave the order untouched.
            return Ok(None);
        }

        // The client's share is recorded as refunded on the payment only.
        credit_wallet(&mut tx, order.freelancer_id, &settlement.freelancer_amount).await?;
        record_event(&mut tx, order.id, event).await?;

        tx.commit().await?;
        Ok(Some(order))
    }

    async fn request_revision(
        &self,
        order_id: Uuid,
        client_id: Uuid,
        revision_text: String,
        event: NewOrderEvent,
    ) -> Result<Option<(Order, Revision)>, Error> {
        let mut tx = self.pool.begin().await?;

        let order = sqlx::query_as::<_, Order>(&format!(
            r#"
            UPDATE orders
            SET revision_count = revision_count + 1,
                status = 'revision_requested',
                updated_at = NOW()
            WHERE id = $1
              AND client_id = $2
              AND status = 'delivered'
              AND (
                  included_revision_limit IS NULL
                  OR revision_count < included_revision_limit + extra_revisions_purchased
              )
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .bind(client_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order) = order else {
            return Ok(None);
        };

        let revision = sqlx::query_as::<_, Revision>(
            r#"
            INSERT INTO revisions (order_id, client_id, revision_no, revision_text)
            VALUES ($1, $2, $3, $4)
            RETURNING id, order_id, client_id, revision_no, revision_text, created_at
            "#,
        )
        .bind(order_id)
        .bind(client_id)
        .bind(order.revision_count)
        .bind(revision_text)
        .fetch_one(&mut *tx)
        .await?;

        let event = event
            .with("revision_no", revision.revision_no)
            .with("revision_id", revision.id);
        record_event(&mut tx, order_id, event).await?;

        tx.commit().await?;
        Ok(Some((order, revision)))
    }

    async fn purchase_revisions(
        &self,
        order_id: Uuid,
        client_id: Uuid,
        quantity: i32,
        amount: BigDecimal,
        payment_ref: Option<String>,
        event: NewOrderEvent,
    ) -> Result<Option<(Order, RevisionPurchase)>, Error> {
        let mut tx = self.pool.begin().await?;

        let order = sqlx::query_as::<_, Order>(&format!(
            r#"
            UPDATE orders
            SET extra_revisions_purchased = extra_revisions_purchased + $3,
                updated_at = NOW()
            WHERE id = $1
              AND client_id = $2
              AND status NOT IN ('completed', 'cancelled')
              AND included_revision_limit IS NOT NULL
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .bind(client_id)
        .bind(quantity)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order) = order else {
            return Ok(None);
        };

        let purchase = sqlx::query_as::<_, RevisionPurchase>(
            r#"
            INSERT INTO revision_purchases (order_id, client_id, quantity, amount, payment_ref)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, order_id, client_id, quantity, amount, payment_ref, created_at
            "#,
        )
        .bind(order_id)
        .bind(client_id)
        .bind(quantity)
        .bind(amount)
        .bind(payment_ref)
        .fetch_one(&mut *tx)
        .await?;

        let event = event
            .with("purchase_id", purchase.id)
            .with("extra_revisions_purchased", order.extra_revisions_purchased);
        record_event(&mut tx, order_id, event).await?;

        tx.commit().await?;
        Ok(Some((order, purchase)))
    }

    async fn get_revisions(&self, order_id: Uuid) -> Result<Vec<Revision>, Error> {
        sqlx::query_as::<_, Revision>(
            r#"
            SELECT id, order_id, client_id, revision_no, revision_text, created_at
            FROM revisions
            WHERE order_id = $1
            ORDER BY revision_no ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_revision_purchases(&self, order_id: Uuid) -> Result<Vec<RevisionPurchase>, Error> {
        sqlx::query_as::<_, RevisionPurchase>(
            r#"
            SELECT id, order_id, client_id, quantity, amount, payment_ref, created_at
            FROM revision_purchases
            WHERE order_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_deliveries(&self, order_id: Uuid) -> Result<Vec<Delivery>, Error> {
        sqlx::query_as::<_, Delivery>(
            r#"
            SELECT id, order_id, freelancer_id, message, created_at
            FROM deliveries
            WHERE order_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn create_review(
        &self,
        order_id: Uuid,
        client_id: Uuid,
        rating: i32,
        comment: Option<String>,
        highlights: Option<String>,
        event: NewOrderEvent,
    ) -> Result<Option<Review>, Error> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query_as::<_, (Uuid, Uuid)>(
            r#"
            UPDATE orders
            SET review_given = TRUE, updated_at = NOW()
            WHERE id = $1 AND client_id = $2 AND status = 'completed' AND review_given = FALSE
            RETURNING service_id, freelancer_id
            "#,
        )
        .bind(order_id)
        .bind(client_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((service_id, freelancer_id)) = claimed else {
            return Ok(None);
        };

        let review = sqlx::query_as::<_, Review>(
            r#"
            INSERT INTO reviews (order_id, service_id, client_id, freelancer_id, rating, comment, highlights)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, order_id, service_id, client_id, freelancer_id, rating, comment, highlights, created_at
            "#,
        )
        .bind(order_id)
        .bind(service_id)
        .bind(client_id)
        .bind(freelancer_id)
        .bind(rating)
        .bind(comment)
        .bind(highlights)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE users
            SET avg_rating = stats.avg_rating,
                total_reviews = stats.total_reviews,
                updated_at = NOW()
            FROM (
                SELECT ROUND(AVG(rating)::numeric, 2) AS avg_rating,
                       COUNT(*)::int AS total_reviews
                FROM reviews
                WHERE freelancer_id = $1
            ) AS stats
            WHERE users.id = $1
            "#,
        )
        .bind(freelancer_id)
        .execute(&mut *tx)
        .await?;

        record_event(&mut tx, order_id, event.with("review_id", review.id)).await?;

        tx.commit().await?;
        Ok(Some(review))
    }

    async fn get_order_events(&self, order_id: Uuid) -> Result<Vec<OrderEvent>, Error> {
        sqlx::query_as::<_, OrderEvent>(
            r#"
            SELECT id, order_id, actor_id, event_type, details, created_at
            FROM order_events
            WHERE order_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_stale_delivered_orders(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id
            FROM orders
            WHERE status = 'delivered' AND updated_at < $1
            ORDER BY updated_at ASC
            LIMIT 500
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
    }

    async fn create_deliverable(
        &self,
        order_id: Uuid,
        freelancer_id: Uuid,
        from: Vec<String>,
        deliverable: NewDeliverable,
        event: NewOrderEvent,
    ) -> Result<Option<Deliverable>, Error> {
        let mut tx = self.pool.begin().await?;

        // The row lock serialises phase numbering per order.
        let order = sqlx::query_as::<_, Order>(&format!(
            r#"
            SELECT {}
            FROM orders
            WHERE id = $1 AND freelancer_id = $2 AND order_type = 'big' AND status::text = ANY($3)
            FOR UPDATE
            "#,
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .bind(freelancer_id)
        .bind(&from)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order) = order else {
            return Ok(None);
        };

        let (last_phase, allocated) = sqlx::query_as::<_, (i32, BigDecimal)>(
            r#"
            SELECT COALESCE(MAX(phase), 0), COALESCE(SUM(payment_amount), 0)
            FROM deliverables
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_one(&mut *tx)
        .await?;

        let phase = last_phase + 1;
        if phase > order.milestone_count.unwrap_or(0) {
            return Ok(None);
        }
        if let Some(amount) = &deliverable.payment_amount {
            if &allocated + amount > order.total_price {
                return Ok(None);
            }
        }

        let created = sqlx::query_as::<_, Deliverable>(&format!(
            r#"
            INSERT INTO deliverables (order_id, phase, description, due_date, payment_amount)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            DELIVERABLE_COLUMNS
        ))
        .bind(order_id)
        .bind(phase)
        .bind(deliverable.description)
        .bind(deliverable.due_date)
        .bind(deliverable.payment_amount)
        .fetch_one(&mut *tx)
        .await?;

        let event = event
            .with("deliverable_id", created.id)
            .with("phase", created.phase);
        record_event(&mut tx, order_id, event).await?;

        tx.commit().await?;
        Ok(Some(created))
    }

    async fn get_deliverables(&self, order_id: Uuid) -> Result<Vec<Deliverable>, Error> {
        sqlx::query_as::<_, Deliverable>(&format!(
            "SELECT {} FROM deliverables WHERE order_id = $1 ORDER BY phase ASC",
            DELIVERABLE_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn update_deliverable_status(
        &self,
        order_id: Uuid,
        deliverable_id: Uuid,
        freelancer_id: Uuid,
        order_from: Vec<String>,
        current: DeliverableStatus,
        next: DeliverableStatus,
        event: NewOrderEvent,
    ) -> Result<Option<(Deliverable, Order)>, Error> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, Deliverable>(
            r#"
            UPDATE deliverables d
            SET status = $5, updated_at = NOW()
            FROM orders o
            WHERE d.id = $1
              AND d.order_id = $2
              AND d.status = $4
              AND o.id = d.order_id
              AND o.freelancer_id = $3
              AND o.status::text = ANY($6)
            RETURNING d.id, d.order_id, d.phase, d.description, d.due_date, d.payment_amount,
                      d.status, d.created_at, d.updated_at
            "#,
        )
        .bind(deliverable_id)
        .bind(order_id)
        .bind(freelancer_id)
        .bind(current)
        .bind(next)
        .bind(&order_from)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(updated) = updated else {
            return Ok(None);
        };

        // current_phase points at the first unfinished milestone.
        let order = sqlx::query_as::<_, Order>(&format!(
            r#"
            UPDATE orders
            SET current_phase = LEAST(
                    milestone_count,
                    (SELECT COUNT(*) FROM deliverables
                     WHERE order_id = $1 AND status = 'completed')::int + 1
                ),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_one(&mut *tx)
        .await?;

        let event = event
            .with("deliverable_id", updated.id)
            .with("phase", updated.phase)
            .with("current_phase", order.current_phase);
        record_event(&mut tx, order_id, event).await?;

        tx.commit().await?;
        Ok(Some((updated, order)))
    }
}
