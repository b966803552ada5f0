// service/dispute_service.rs
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    db::{disputedb::DisputeExt, orderdb::OrderExt, userdb::UserExt, DBClient},
    dtos::{
        disputedtos::{DisputeDetailDto, DisputeResolvedDto, ResolveDisputeDto},
        orderdtos::OrderDto,
    },
    models::{
        disputemodel::{Dispute, DisputeEvidence, DisputeStatus},
        ordermodel::NewOrderEvent,
        usermodel::{User, UserRole},
    },
    service::{
        audit_service::{
            transition_event, AuditService, EVENT_EVIDENCE_ADDED, EVENT_FREELANCER_RESPONSE,
        },
        error::{is_unique_violation, ServiceError},
        escrow_service::{ensure_held, EscrowSettlement},
        order_state::{self, OrderAction},
    },
};

#[derive(Debug, Clone)]
pub struct DisputeService {
    db_client: Arc<DBClient>,
    audit_service: Arc<AuditService>,
}

impl DisputeService {
    pub fn new(db_client: Arc<DBClient>, audit_service: Arc<AuditService>) -> Self {
        Self {
            db_client,
            audit_service,
        }
    }

    pub async fn open_dispute(
        &self,
        client_id: Uuid,
        order_id: Uuid,
        reason: String,
    ) -> Result<Dispute, ServiceError> {
        let action = OrderAction::OpenDispute;
        let order = self
            .db_client
            .get_order(order_id)
            .await?
            .ok_or(ServiceError::OrderNotFound(order_id))?;

        if order.client_id != client_id {
            return Err(ServiceError::UnauthorizedOrderAccess(client_id, order_id));
        }

        if self.db_client.get_open_dispute_for_order(order_id).await?.is_some() {
            return Err(ServiceError::Validation(
                "An open dispute already exists for this order".to_string(),
            ));
        }

        let target = order_state::next_status(order.status, action)?;

        let opened = match self
            .db_client
            .open_dispute(
                order_id,
                client_id,
                action.allowed_from_sql(),
                reason,
                transition_event(Some(client_id), action, target),
            )
            .await
        {
            Ok(opened) => opened,
            Err(e) if is_unique_violation(&e) => {
                return Err(ServiceError::conflict(
                    "An open dispute already exists for this order",
                ))
            }
            Err(e) => return Err(e.into()),
        };

        let (_, dispute) = opened.ok_or_else(|| {
            ServiceError::conflict(format!(
                "Order {} was modified by another request, please retry",
                order_id
            ))
        })?;

        tracing::info!(
            "Dispute {} opened on order {} by client {}",
            dispute.id,
            order_id,
            client_id
        );

        Ok(dispute)
    }

    pub async fn list_disputes(
        &self,
        user: &User,
        status: Option<DisputeStatus>,
    ) -> Result<Vec<Dispute>, ServiceError> {
        let party_id = match user.role {
            UserRole::Admin => None,
            _ => Some(user.id),
        };

        Ok(self.db_client.get_disputes(party_id, status).await?)
    }

    pub async fn get_dispute_detail(
        &self,
        user: &User,
        dispute_id: Uuid,
    ) -> Result<DisputeDetailDto, ServiceError> {
        let dispute = self.load_visible(user, dispute_id).await?;
        let order_id = dispute.order_id;

        let order = self.db_client.get_order(order_id).await?.map(OrderDto::from_order);
        let revisions = self.db_client.get_revisions(order_id).await?;
        let deliverables = self.db_client.get_deliverables(order_id).await?;
        let evidence = self.db_client.get_dispute_evidence(dispute_id).await?;
        let timeline = self.audit_service.get_order_timeline(order_id).await?;
        let resolution = self.db_client.get_dispute_resolution(dispute_id).await?;

        Ok(DisputeDetailDto {
            dispute,
            order,
            revisions,
            deliverables,
            evidence,
            timeline,
            resolution,
        })
    }

    pub async fn add_evidence(
        &self,
        user: &User,
        dispute_id: Uuid,
        description: String,
        file_url: String,
    ) -> Result<DisputeEvidence, ServiceError> {
        let dispute = self.get_dispute(dispute_id).await?;
        if !dispute.is_party(user.id) {
            return Err(ServiceError::UnauthorizedDisputeAccess(user.id, dispute_id));
        }
        ensure_open(&dispute)?;

        let evidence = self
            .db_client
            .add_dispute_evidence(
                &dispute,
                user.id,
                description,
                file_url,
                NewOrderEvent::new(Some(user.id), EVENT_EVIDENCE_ADDED),
            )
            .await?
            .ok_or(ServiceError::InvalidDisputeStatus(dispute_id, DisputeStatus::Open))?;

        Ok(evidence)
    }

    pub async fn freelancer_response(
        &self,
        freelancer_id: Uuid,
        dispute_id: Uuid,
        response: String,
    ) -> Result<Dispute, ServiceError> {
        let dispute = self.get_dispute(dispute_id).await?;
        if dispute.freelancer_id != freelancer_id {
            return Err(ServiceError::UnauthorizedDisputeAccess(freelancer_id, dispute_id));
        }
        ensure_open(&dispute)?;

        let updated = self
            .db_client
            .set_freelancer_response(
                dispute_id,
                freelancer_id,
                response,
                NewOrderEvent::new(Some(freelancer_id), EVENT_FREELANCER_RESPONSE),
            )
            .await?
            .ok_or(ServiceError::InvalidDisputeStatus(dispute_id, DisputeStatus::Open))?;

        Ok(updated)
    }

    pub async fn assign_dispute(
        &self,
        caller_id: Uuid,
        dispute_id: Uuid,
        admin_id: Option<Uuid>,
    ) -> Result<Dispute, ServiceError> {
        let dispute = self.get_dispute(dispute_id).await?;
        ensure_open(&dispute)?;

        let admin_id = admin_id.unwrap_or(caller_id);
        if admin_id != caller_id {
            self.ensure_admin(admin_id).await?;
        }

        let updated = self
            .db_client
            .assign_dispute(dispute_id, admin_id)
            .await?
            .ok_or(ServiceError::InvalidDisputeStatus(dispute_id, DisputeStatus::Open))?;

        tracing::info!("Dispute {} assigned to admin {}", dispute_id, admin_id);
        Ok(updated)
    }

    pub async fn update_notes(&self, dispute_id: Uuid, notes: String) -> Result<Dispute, ServiceError> {
        self.db_client
            .update_admin_notes(dispute_id, notes)
            .await?
            .ok_or(ServiceError::DisputeNotFound(dispute_id))
    }

    pub async fn resolve_dispute(
        &self,
        admin_id: Uuid,
        dispute_id: Uuid,
        body: ResolveDisputeDto,
    ) -> Result<DisputeResolvedDto, ServiceError> {
        let dispute = self.get_dispute(dispute_id).await?;
        ensure_open(&dispute)?;

        let order = self
            .db_client
            .get_order(dispute.order_id)
            .await?
            .ok_or(ServiceError::OrderNotFound(dispute.order_id))?;

        let settlement = EscrowSettlement::for_resolution(
            body.resolution_type,
            &order.total_price,
            body.client_amount.as_ref(),
            body.freelancer_amount.as_ref(),
        )?;
        let action = settlement.order_action();
        let target = order_state::next_status(order.status, action)?;

        if let Some(payment) = self.db_client.get_payment(order.id).await? {
            ensure_held(payment.status)?;
        }

        let event = transition_event(Some(admin_id), action, target)
            .with("dispute_id", dispute_id)
            .with("resolution_type", body.resolution_type)
            .with("client_amount", &settlement.client_amount)
            .with("freelancer_amount", &settlement.freelancer_amount)
            .with("payment_status", settlement.payment_status);

        let resolved = self
            .db_client
            .resolve_dispute(
                dispute_id,
                admin_id,
                body.resolution_type,
                &settlement,
                target,
                body.message,
                event,
            )
            .await?;

        let Some((dispute, resolution)) = resolved else {
            let current = self.get_dispute(dispute_id).await?;
            ensure_open(&current)?;
            return Err(ServiceError::conflict(format!(
                "Dispute {} was modified by another request, please retry",
                dispute_id
            )));
        };

        let platform_remainder = settlement.platform_remainder(&order.total_price);

        tracing::info!(
            "Dispute {} resolved by admin {} ({:?}): client {} freelancer {} platform {}",
            dispute_id,
            admin_id,
            resolution.resolution_type,
            resolution.client_amount,
            resolution.freelancer_amount,
            platform_remainder
        );

        Ok(DisputeResolvedDto {
            dispute,
            resolution,
            platform_remainder,
        })
    }

    async fn get_dispute(&self, dispute_id: Uuid) -> Result<Dispute, ServiceError> {
        self.db_client
            .get_dispute(dispute_id)
            .await?
            .ok_or(ServiceError::DisputeNotFound(dispute_id))
    }

    async fn load_visible(&self, user: &User, dispute_id: Uuid) -> Result<Dispute, ServiceError> {
        let dispute = self.get_dispute(dispute_id).await?;
        if dispute.is_party(user.id) || user.is_admin() {
            Ok(dispute)
        } else {
            Err(ServiceError::UnauthorizedDisputeAccess(user.id, dispute_id))
        }
    }

    async fn ensure_admin(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let user = self
            .db_client
            .get_user(Some(user_id), None, None)
            .await?
            .ok_or(ServiceError::UserNotFound(user_id))?;

        if !user.is_admin() {
            return Err(ServiceError::Validation(format!(
                "User {} is not an admin",
                user_id
            )));
        }
        Ok(())
    }
}

fn ensure_open(dispute: &Dispute) -> Result<(), ServiceError> {
    match dispute.status {
        DisputeStatus::Open => Ok(()),
        DisputeStatus::Resolved => Err(ServiceError::InvalidDisputeStatus(
            dispute.id,
            DisputeStatus::Open,
        )),
    }
}
