// service/withdrawal_service.rs
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    db::{userdb::UserExt, withdrawaldb::WithdrawalExt, DBClient},
    dtos::withdrawaldtos::{CreateWithdrawalDto, CreateWithdrawalMethodDto},
    models::withdrawalmodel::{
        WalletSummary, Withdrawal, WithdrawalMethod, WithdrawalStatus, WithdrawalWithMethod,
    },
    service::error::ServiceError,
    utils::money::{quote_withdrawal, to_cents},
};

#[derive(Debug, Clone)]
pub struct WithdrawalService {
    db_client: Arc<DBClient>,
}

impl WithdrawalService {
    pub fn new(db_client: Arc<DBClient>) -> Self {
        Self { db_client }
    }

    pub async fn add_method(
        &self,
        freelancer_id: Uuid,
        body: CreateWithdrawalMethodDto,
    ) -> Result<WithdrawalMethod, ServiceError> {
        body.check_method_details().map_err(ServiceError::Validation)?;

        let method = self
            .db_client
            .create_withdrawal_method(
                freelancer_id,
                body.method_type,
                body.account_holder_name,
                body.account_number,
                body.bank_name,
                body.swift_code,
                body.paypal_email,
                body.is_default,
            )
            .await?;

        tracing::info!(
            "Withdrawal method {} added for freelancer {}",
            method.id,
            freelancer_id
        );
        Ok(method)
    }

    pub async fn list_methods(&self, freelancer_id: Uuid) -> Result<Vec<WithdrawalMethod>, ServiceError> {
        Ok(self.db_client.get_withdrawal_methods(freelancer_id).await?)
    }

    pub async fn delete_method(&self, freelancer_id: Uuid, method_id: Uuid) -> Result<(), ServiceError> {
        self.owned_method(freelancer_id, method_id).await?;

        if self.db_client.method_has_open_withdrawals(method_id).await? {
            return Err(ServiceError::Validation(
                "Cannot delete withdrawal method with pending withdrawals".to_string(),
            ));
        }

        if !self
            .db_client
            .delete_withdrawal_method(method_id, freelancer_id)
            .await?
        {
            return Err(ServiceError::conflict(
                "Withdrawal method is now used by a pending withdrawal",
            ));
        }

        Ok(())
    }

    pub async fn request_withdrawal(
        &self,
        freelancer_id: Uuid,
        body: CreateWithdrawalDto,
    ) -> Result<Withdrawal, ServiceError> {
        self.owned_method(freelancer_id, body.withdrawal_method_id)
            .await?;

        let quote = quote_withdrawal(&body.amount)?;

        let Some(withdrawal) = self
            .db_client
            .create_withdrawal(freelancer_id, body.withdrawal_method_id, &quote)
            .await?
        else {
            let user = self
                .db_client
                .get_user(Some(freelancer_id), None, None)
                .await?
                .ok_or(ServiceError::UserNotFound(freelancer_id))?;

            return Err(ServiceError::InsufficientBalance {
                required: quote.amount,
                available: to_cents(&user.wallet_balance),
            });
        };

        tracing::info!(
            "Withdrawal {} requested by {}: amount {} fee {} net {}",
            withdrawal.id,
            freelancer_id,
            withdrawal.amount,
            withdrawal.fee,
            withdrawal.net_amount
        );

        Ok(withdrawal)
    }

    pub async fn list_withdrawals(
        &self,
        freelancer_id: Uuid,
        status: Option<WithdrawalStatus>,
    ) -> Result<Vec<WithdrawalWithMethod>, ServiceError> {
        Ok(self.db_client.get_withdrawals(freelancer_id, status).await?)
    }

    pub async fn get_withdrawal(
        &self,
        freelancer_id: Uuid,
        withdrawal_id: Uuid,
    ) -> Result<WithdrawalWithMethod, ServiceError> {
        match self.db_client.get_withdrawal(withdrawal_id).await? {
            Some(w) if w.withdrawal.freelancer_id == freelancer_id => Ok(w),
            _ => Err(ServiceError::WithdrawalNotFound(withdrawal_id)),
        }
    }

    pub async fn get_summary(&self, freelancer_id: Uuid) -> Result<WalletSummary, ServiceError> {
        Ok(self.db_client.get_wallet_summary(freelancer_id).await?)
    }

    pub async fn cancel_withdrawal(
        &self,
        freelancer_id: Uuid,
        withdrawal_id: Uuid,
    ) -> Result<Withdrawal, ServiceError> {
        let current = self.get_withdrawal(freelancer_id, withdrawal_id).await?;
        if !current.withdrawal.status.is_open() {
            return Err(ServiceError::InvalidWithdrawalStatus(
                withdrawal_id,
                current.withdrawal.status,
            ));
        }

        let withdrawal = self
            .db_client
            .cancel_withdrawal(withdrawal_id, freelancer_id)
            .await?
            .ok_or_else(|| lost_race(withdrawal_id))?;

        tracing::info!(
            "Withdrawal {} cancelled, {} returned to freelancer {}",
            withdrawal_id,
            withdrawal.amount,
            freelancer_id
        );
        Ok(withdrawal)
    }

    pub async fn start_processing(&self, withdrawal_id: Uuid) -> Result<Withdrawal, ServiceError> {
        self.expect_status(withdrawal_id, WithdrawalStatus::Pending)
            .await?;

        let withdrawal = self
            .db_client
            .start_processing_withdrawal(withdrawal_id)
            .await?
            .ok_or_else(|| lost_race(withdrawal_id))?;

        tracing::info!("Withdrawal {} is processing", withdrawal_id);
        Ok(withdrawal)
    }

    pub async fn complete(&self, withdrawal_id: Uuid) -> Result<Withdrawal, ServiceError> {
        self.expect_status(withdrawal_id, WithdrawalStatus::Processing)
            .await?;

        let withdrawal = self
            .db_client
            .complete_withdrawal(withdrawal_id, transaction_reference())
            .await?
            .ok_or_else(|| lost_race(withdrawal_id))?;

        tracing::info!(
            "Withdrawal {} completed with reference {}",
            withdrawal_id,
            withdrawal.transaction_reference.as_deref().unwrap_or_default()
        );
        Ok(withdrawal)
    }

    pub async fn fail(&self, withdrawal_id: Uuid, notes: String) -> Result<Withdrawal, ServiceError> {
        self.expect_status(withdrawal_id, WithdrawalStatus::Processing)
            .await?;

        let withdrawal = self
            .db_client
            .fail_withdrawal(withdrawal_id, notes)
            .await?
            .ok_or_else(|| lost_race(withdrawal_id))?;

        tracing::warn!(
            "Withdrawal {} failed, {} refunded to freelancer {}",
            withdrawal_id,
            withdrawal.amount,
            withdrawal.freelancer_id
        );
        Ok(withdrawal)
    }

    async fn owned_method(
        &self,
        freelancer_id: Uuid,
        method_id: Uuid,
    ) -> Result<WithdrawalMethod, ServiceError> {
        match self.db_client.get_withdrawal_method(method_id).await? {
            Some(method) if method.freelancer_id == freelancer_id => Ok(method),
            _ => Err(ServiceError::WithdrawalMethodNotFound(method_id)),
        }
    }

    async fn expect_status(
        &self,
        withdrawal_id: Uuid,
        expected: WithdrawalStatus,
    ) -> Result<(), ServiceError> {
        let current = self
            .db_client
            .get_withdrawal(withdrawal_id)
            .await?
            .ok_or(ServiceError::WithdrawalNotFound(withdrawal_id))?;

        if current.withdrawal.status != expected {
            return Err(ServiceError::InvalidWithdrawalStatus(
                withdrawal_id,
                current.withdrawal.status,
            ));
        }
        Ok(())
    }
}

fn lost_race(withdrawal_id: Uuid) -> ServiceError {
    ServiceError::conflict(format!(
        "Withdrawal {} was modified by another request, please retry",
        withdrawal_id
    ))
}

/// Payout reference in the form `TXN-` followed by 12 uppercase hex digits.
pub fn transaction_reference() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("TXN-{}", id[..12].to_uppercase())
}
