// db/disputedb.rs
use async_trait::async_trait;
use sqlx::Error;
use uuid::Uuid;

use super::{
    orderdb::{credit_wallet, record_event, settle_payment, ORDER_COLUMNS},
    DBClient,
};
use crate::{
    models::{
        disputemodel::*,
        ordermodel::{NewOrderEvent, Order, OrderStatus},
    },
    service::escrow_service::EscrowSettlement,
};

const DISPUTE_COLUMNS: &str = r#"
    id, order_id, client_id, freelancer_id, admin_id, status, reason,
    freelancer_response, freelancer_response_at, admin_notes, decision,
    resolution_message, opened_at, resolved_at
"#;

#[async_trait]
pub trait DisputeExt {
    /// Moves the order to `disputed` and opens the dispute in one transaction.
    async fn open_dispute(
        &self,
        order_id: Uuid,
        client_id: Uuid,
        from: Vec<String>,
        reason: String,
        event: NewOrderEvent,
    ) -> Result<Option<(Order, Dispute)>, Error>;

    async fn get_dispute(&self, dispute_id: Uuid) -> Result<Option<Dispute>, Error>;

    async fn get_open_dispute_for_order(&self, order_id: Uuid) -> Result<Option<Dispute>, Error>;

    /// `party_id = None` lists every dispute.
    async fn get_disputes(
        &self,
        party_id: Option<Uuid>,
        status: Option<DisputeStatus>,
    ) -> Result<Vec<Dispute>, Error>;

    async fn add_dispute_evidence(
        &self,
        dispute: &Dispute,
        submitted_by: Uuid,
        description: String,
        file_url: String,
        event: NewOrderEvent,
    ) -> Result<Option<DisputeEvidence>, Error>;

    async fn get_dispute_evidence(&self, dispute_id: Uuid) -> Result<Vec<DisputeEvidence>, Error>;

    async fn set_freelancer_response(
        &self,
        dispute_id: Uuid,
        freelancer_id: Uuid,
        response: String,
        event: NewOrderEvent,
    ) -> Result<Option<Dispute>, Error>;

    async fn assign_dispute(&self, dispute_id: Uuid, admin_id: Uuid) -> Result<Option<Dispute>, Error>;

    async fn update_admin_notes(&self, dispute_id: Uuid, notes: String) -> Result<Option<Dispute>, Error>;

    async fn get_dispute_resolution(&self, dispute_id: Uuid) -> Result<Option<DisputeResolution>, Error>;

    /// Settles the escrow and closes both the dispute and its order.
    /// `None` when the dispute was no longer open or the order no longer disputed.
    async fn resolve_dispute(
        &self,
        dispute_id: Uuid,
        admin_id: Uuid,
        resolution_type: ResolutionType,
        settlement: &EscrowSettlement,
        order_status: OrderStatus,
        message: Option<String>,
        event: NewOrderEvent,
    ) -> Result<Option<(Dispute, DisputeResolution)>, Error>;
}

#[async_trait]
impl DisputeExt for DBClient {
    async fn open_dispute(
        &self,
        order_id: Uuid,
        client_id: Uuid,
        from: Vec<String>,
        reason: String,
        event: NewOrderEvent,
    ) -> Result<Option<(Order, Dispute)>, Error> {
        let mut tx = self.pool.begin().await?;

        let order = sqlx::query_as::<_, Order>(&format!(
            r#"
            UPDATE orders
            SET status = 'disputed', updated_at = NOW()
            WHERE id = $1 AND client_id = $2 AND status::text = ANY($3)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .bind(client_id)
        .bind(&from)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order) = order else {
            return Ok(None);
        };

        let dispute = sqlx::query_as::<_, Dispute>(&format!(
            r#"
            INSERT INTO disputes (order_id, client_id, freelancer_id, reason)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            DISPUTE_COLUMNS
        ))
        .bind(order.id)
        .bind(order.client_id)
        .bind(order.freelancer_id)
        .bind(reason)
        .fetch_one(&mut *tx)
        .await?;

        record_event(&mut tx, order.id, event.with("dispute_id", dispute.id)).await?;

        tx.commit().await?;
        Ok(Some((order, dispute)))
    }

    async fn get_dispute(&self, dispute_id: Uuid) -> Result<Option<Dispute>, Error> {
        sqlx::query_as::<_, Dispute>(&format!(
            "SELECT {} FROM disputes WHERE id = $1",
            DISPUTE_COLUMNS
        ))
        .bind(dispute_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_open_dispute_for_order(&self, order_id: Uuid) -> Result<Option<Dispute>, Error> {
        sqlx::query_as::<_, Dispute>(&format!(
            "SELECT {} FROM disputes WHERE order_id = $1 AND status = 'open'",
            DISPUTE_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_disputes(
        &self,
        party_id: Option<Uuid>,
        status: Option<DisputeStatus>,
    ) -> Result<Vec<Dispute>, Error> {
        sqlx::query_as::<_, Dispute>(&format!(
            r#"
            SELECT {}
            FROM disputes
            WHERE ($1::uuid IS NULL OR client_id = $1 OR freelancer_id = $1)
              AND ($2::dispute_status IS NULL OR status = $2)
            ORDER BY opened_at DESC
            "#,
            DISPUTE_COLUMNS
        ))
        .bind(party_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await
    }

    async fn add_dispute_evidence(
        &self,
        dispute: &Dispute,
        submitted_by: Uuid,
        description: String,
        file_url: String,
        event: NewOrderEvent,
    ) -> Result<Option<DisputeEvidence>, Error> {
        let mut tx = self.pool.begin().await?;

        let evidence = sqlx::query_as::<_, DisputeEvidence>(
            r#"
            INSERT INTO dispute_evidence (dispute_id, submitted_by, description, file_url)
            SELECT d.id, $2, $3, $4
            FROM disputes d
            WHERE d.id = $1 AND d.status = 'open'
            RETURNING id, dispute_id, submitted_by, description, file_url, created_at
            "#,
        )
        .bind(dispute.id)
        .bind(submitted_by)
        .bind(description)
        .bind(file_url)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(evidence) = evidence else {
            return Ok(None);
        };

        let event = event
            .with("dispute_id", dispute.id)
            .with("evidence_id", evidence.id);
        record_event(&mut tx, dispute.order_id, event).await?;

        tx.commit().await?;
        Ok(Some(evidence))
    }

    async fn get_dispute_evidence(&self, dispute_id: Uuid) -> Result<Vec<DisputeEvidence>, Error> {
        sqlx::query_as::<_, DisputeEvidence>(
            r#"
            SELECT id, dispute_id, submitted_by, description, file_url, created_at
            FROM dispute_evidence
            WHERE dispute_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(dispute_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn set_freelancer_response(
        &self,
        dispute_id: Uuid,
        freelancer_id: Uuid,
        response: String,
        event: NewOrderEvent,
    ) -> Result<Option<Dispute>, Error> {
        let mut tx = self.pool.begin().await?;

        let dispute = sqlx::query_as::<_, Dispute>(&format!(
            r#"
            UPDATE disputes
            SET freelancer_response = $3, freelancer_response_at = NOW()
            WHERE id = $1 AND freelancer_id = $2 AND status = 'open'
            RETURNING {}
            "#,
            DISPUTE_COLUMNS
        ))
        .bind(dispute_id)
        .bind(freelancer_id)
        .bind(response)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(dispute) = dispute else {
            return Ok(None);
        };

        record_event(&mut tx, dispute.order_id, event.with("dispute_id", dispute.id)).await?;

        tx.commit().await?;
        Ok(Some(dispute))
    }

    async fn assign_dispute(&self, dispute_id: Uuid, admin_id: Uuid) -> Result<Option<Dispute>, Error> {
        sqlx::query_as::<_, Dispute>(&format!(
            r#"
            UPDATE disputes
            SET admin_id = $2
            WHERE id = $1 AND status = 'open'
            RETURNING {}
            "#,
            DISPUTE_COLUMNS
        ))
        .bind(dispute_id)
        .bind(admin_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn update_admin_notes(&self, dispute_id: Uuid, notes: String) -> Result<Option<Dispute>, Error> {
        sqlx::query_as::<_, Dispute>(&format!(
            r#"
            UPDATE disputes
            SET admin_notes = $2
            WHERE id = $1
            RETURNING {}
            "#,
            DISPUTE_COLUMNS
        ))
        .bind(dispute_id)
        .bind(notes)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_dispute_resolution(&self, dispute_id: Uuid) -> Result<Option<DisputeResolution>, Error> {
        sqlx::query_as::<_, DisputeResolution>(
            r#"
            SELECT id, dispute_id, admin_id, resolution_type, client_amount,
                   freelancer_amount, payment_status, message, created_at
            FROM dispute_resolutions
            WHERE dispute_id = $1
            "#,
        )
        .bind(dispute_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn resolve_dispute(
        &self,
        dispute_id: Uuid,
        admin_id: Uuid,
        resolution_type: ResolutionType,
        settlement: &EscrowSettlement,
        order_status: OrderStatus,
        message: Option<String>,
        event: NewOrderEvent,
    ) -> Result<Option<(Dispute, DisputeResolution)>, Error> {
        let mut tx = self.pool.begin().await?;

        let dispute = sqlx::query_as::<_, Dispute>(&format!(
            "SELECT {} FROM disputes WHERE id = $1 FOR UPDATE",
            DISPUTE_COLUMNS
        ))
        .bind(dispute_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(dispute) = dispute else {
            return Ok(None);
        };
        if dispute.status != DisputeStatus::Open {
            return Ok(None);
        }

        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE id = $1 FOR UPDATE",
            ORDER_COLUMNS
        ))
        .bind(dispute.order_id)
        .fetch_one(&mut *tx)
        .await?;

        if order.status != OrderStatus::Disputed {
            return Ok(None);
        }

        if settle_payment(&mut tx, order.id, settlement).await?.is_none() {
            return Ok(None);
        }

        // The client's share is recorded as refunded on the payment only.
        credit_wallet(&mut tx, order.freelancer_id, &settlement.freelancer_amount).await?;

        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(order.id)
        .bind(order_status)
        .execute(&mut *tx)
        .await?;

        let dispute = sqlx::query_as::<_, Dispute>(&format!(
            r#"
            UPDATE disputes
            SET status = 'resolved',
                admin_id = $2,
                decision = $3,
                resolution_message = $4,
                resolved_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            DISPUTE_COLUMNS
        ))
        .bind(dispute_id)
        .bind(admin_id)
        .bind(resolution_type)
        .bind(&message)
        .fetch_one(&mut *tx)
        .await?;

        let resolution = sqlx::query_as::<_, DisputeResolution>(
            r#"
            INSERT INTO dispute_resolutions (
                dispute_id, admin_id, resolution_type, client_amount,
                freelancer_amount, payment_status, message
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, dispute_id, admin_id, resolution_type, client_amount,
                      freelancer_amount, payment_status, message, created_at
            "#,
        )
        .bind(dispute_id)
        .bind(admin_id)
        .bind(resolution_type)
        .bind(&settlement.client_amount)
        .bind(&settlement.freelancer_amount)
        .bind(settlement.payment_status)
        .bind(message)
        .fetch_one(&mut *tx)
        .await?;

        record_event(&mut tx, order.id, event.with("resolution_id", resolution.id)).await?;

        tx.commit().await?;
        Ok(Some((dispute, resolution)))
    }
}
