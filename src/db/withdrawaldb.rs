// db/withdrawaldb.rs
use async_trait::async_trait;
use sqlx::Error;
use uuid::Uuid;

use super::{orderdb::credit_wallet, DBClient};
use crate::{models::withdrawalmodel::*, utils::money::WithdrawalQuote};

const WITHDRAWAL_COLUMNS: &str = r#"
    id, freelancer_id, withdrawal_method_id, amount, fee, net_amount, status,
    requested_at, processing_started_at, completed_at, notes, transaction_reference
"#;

const WITHDRAWAL_WITH_METHOD_SELECT: &str = r#"
    SELECT
        w.id, w.freelancer_id, w.withdrawal_method_id, w.amount, w.fee, w.net_amount, w.status,
        w.requested_at, w.processing_started_at, w.completed_at, w.notes, w.transaction_reference,
        m.method_type, m.account_holder_name, m.bank_name, m.paypal_email
    FROM withdrawals w
    LEFT JOIN withdrawal_methods m ON m.id = w.withdrawal_method_id
"#;

const METHOD_COLUMNS: &str = r#"
    id, freelancer_id, method_type, account_holder_name, account_number,
    bank_name, swift_code, paypal_email, is_default, created_at
"#;

#[async_trait]
pub trait WithdrawalExt {
    async fn create_withdrawal_method(
        &self,
        freelancer_id: Uuid,
        method_type: WithdrawalMethodType,
        account_holder_name: String,
        account_number: Option<String>,
        bank_name: Option<String>,
        swift_code: Option<String>,
        paypal_email: Option<String>,
        is_default: bool,
    ) -> Result<WithdrawalMethod, Error>;

    async fn get_withdrawal_methods(&self, freelancer_id: Uuid) -> Result<Vec<WithdrawalMethod>, Error>;

    async fn get_withdrawal_method(&self, method_id: Uuid) -> Result<Option<WithdrawalMethod>, Error>;

    async fn method_has_open_withdrawals(&self, method_id: Uuid) -> Result<bool, Error>;

    /// `false` when the method is owned by someone else or still backs an open withdrawal.
    async fn delete_withdrawal_method(&self, method_id: Uuid, freelancer_id: Uuid) -> Result<bool, Error>;

    /// Debits the wallet and records the withdrawal. `None` on insufficient balance.
    async fn create_withdrawal(
        &self,
        freelancer_id: Uuid,
        method_id: Uuid,
        quote: &WithdrawalQuote,
    ) -> Result<Option<Withdrawal>, Error>;

    async fn get_withdrawals(
        &self,
        freelancer_id: Uuid,
        status: Option<WithdrawalStatus>,
    ) -> Result<Vec<WithdrawalWithMethod>, Error>;

    async fn get_withdrawal(&self, withdrawal_id: Uuid) -> Result<Option<WithdrawalWithMethod>, Error>;

    async fn get_wallet_summary(&self, freelancer_id: Uuid) -> Result<WalletSummary, Error>;

    /// Cancels a pending or processing withdrawal owned by `freelancer_id` and refunds it.
    async fn cancel_withdrawal(
        &self,
        withdrawal_id: Uuid,
        freelancer_id: Uuid,
    ) -> Result<Option<Withdrawal>, Error>;

    async fn start_processing_withdrawal(&self, withdrawal_id: Uuid) -> Result<Option<Withdrawal>, Error>;

    async fn complete_withdrawal(
        &self,
        withdrawal_id: Uuid,
        transaction_reference: String,
    ) -> Result<Option<Withdrawal>, Error>;

    /// Marks a processing withdrawal failed and returns the funds to the wallet.
    async fn fail_withdrawal(&self, withdrawal_id: Uuid, notes: String) -> Result<Option<Withdrawal>, Error>;
}

#[async_trait]
impl WithdrawalExt for DBClient {
    async fn create_withdrawal_method(
        &self,
        freelancer_id: Uuid,
        method_type: WithdrawalMethodType,
        account_holder_name: String,
        account_number: Option<String>,
        bank_name: Option<String>,
        swift_code: Option<String>,
        paypal_email: Option<String>,
        is_default: bool,
    ) -> Result<WithdrawalMethod, Error> {
        let mut tx = self.pool.begin().await?;

        if is_default {
            sqlx::query(
                r#"
                UPDATE withdrawal_methods
                SET is_default = FALSE
                WHERE freelancer_id = $1 AND is_default = TRUE
                "#,
            )
            .bind(freelancer_id)
            .execute(&mut *tx)
            .await?;
        }

        let method = sqlx::query_as::<_, WithdrawalMethod>(&format!(
            r#"
            INSERT INTO withdrawal_methods (
                freelancer_id, method_type, account_holder_name, account_number,
                bank_name, swift_code, paypal_email, is_default
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            METHOD_COLUMNS
        ))
        .bind(freelancer_id)
        .bind(method_type)
        .bind(account_holder_name)
        .bind(account_number)
        .bind(bank_name)
        .bind(swift_code)
        .bind(paypal_email)
        .bind(is_default)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(method)
    }

    async fn get_withdrawal_methods(&self, freelancer_id: Uuid) -> Result<Vec<WithdrawalMethod>, Error> {
        sqlx::query_as::<_, WithdrawalMethod>(&format!(
            r#"
            SELECT {}
            FROM withdrawal_methods
            WHERE freelancer_id = $1
            ORDER BY is_default DESC, created_at DESC
            "#,
            METHOD_COLUMNS
        ))
        .bind(freelancer_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_withdrawal_method(&self, method_id: Uuid) -> Result<Option<WithdrawalMethod>, Error> {
        sqlx::query_as::<_, WithdrawalMethod>(&format!(
            "SELECT {} FROM withdrawal_methods WHERE id = $1",
            METHOD_COLUMNS
        ))
        .bind(method_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn method_has_open_withdrawals(&self, method_id: Uuid) -> Result<bool, Error> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM withdrawals
                WHERE withdrawal_method_id = $1 AND status IN ('pending', 'processing')
            )
            "#,
        )
        .bind(method_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn delete_withdrawal_method(&self, method_id: Uuid, freelancer_id: Uuid) -> Result<bool, Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM withdrawal_methods
            WHERE id = $1
              AND freelancer_id = $2
              AND NOT EXISTS (
                  SELECT 1 FROM withdrawals
                  WHERE withdrawal_method_id = $1 AND status IN ('pending', 'processing')
              )
            "#,
        )
        .bind(method_id)
        .bind(freelancer_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_withdrawal(
        &self,
        freelancer_id: Uuid,
        method_id: Uuid,
        quote: &WithdrawalQuote,
    ) -> Result<Option<Withdrawal>, Error> {
        let mut tx = self.pool.begin().await?;

        let debited = sqlx::query(
            r#"
            UPDATE users
            SET wallet_balance = wallet_balance - $2,
                updated_at = NOW()
            WHERE id = $1 AND wallet_balance >= $2
            "#,
        )
        .bind(freelancer_id)
        .bind(&quote.amount)
        .execute(&mut *tx)
        .await?;

        if debited.rows_affected() == 0 {
            return Ok(None);
        }

        let withdrawal = sqlx::query_as::<_, Withdrawal>(&format!(
            r#"
            INSERT INTO withdrawals (freelancer_id, withdrawal_method_id, amount, fee, net_amount, status)
            VALUES ($1, $2, $3, $4, $5, 'pending')
            RETURNING {}
            "#,
            WITHDRAWAL_COLUMNS
        ))
        .bind(freelancer_id)
        .bind(method_id)
        .bind(&quote.amount)
        .bind(&quote.fee)
        .bind(&quote.net_amount)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(withdrawal))
    }

    async fn get_withdrawals(
        &self,
        freelancer_id: Uuid,
        status: Option<WithdrawalStatus>,
    ) -> Result<Vec<WithdrawalWithMethod>, Error> {
        sqlx::query_as::<_, WithdrawalWithMethod>(&format!(
            r#"
            {}
            WHERE w.freelancer_id = $1
              AND ($2::withdrawal_status IS NULL OR w.status = $2)
            ORDER BY w.requested_at DESC
            "#,
            WITHDRAWAL_WITH_METHOD_SELECT
        ))
        .bind(freelancer_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_withdrawal(&self, withdrawal_id: Uuid) -> Result<Option<WithdrawalWithMethod>, Error> {
        sqlx::query_as::<_, WithdrawalWithMethod>(&format!(
            "{} WHERE w.id = $1",
            WITHDRAWAL_WITH_METHOD_SELECT
        ))
        .bind(withdrawal_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_wallet_summary(&self, freelancer_id: Uuid) -> Result<WalletSummary, Error> {
        sqlx::query_as::<_, WalletSummary>(
            r#"
            SELECT
                u.wallet_balance,
                COALESCE(SUM(w.amount) FILTER (WHERE w.status IN ('pending', 'processing')), 0)::NUMERIC(12, 2)
                    AS pending_withdrawals,
                COALESCE(SUM(w.amount) FILTER (WHERE w.status = 'completed'), 0)::NUMERIC(12, 2)
                    AS total_withdrawn,
                COALESCE(SUM(w.fee) FILTER (WHERE w.status = 'completed'), 0)::NUMERIC(12, 2)
                    AS total_fees_paid
            FROM users u
            LEFT JOIN withdrawals w ON w.freelancer_id = u.id
            WHERE u.id = $1
            GROUP BY u.id, u.wallet_balance
            "#,
        )
        .bind(freelancer_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn cancel_withdrawal(
        &self,
        withdrawal_id: Uuid,
        freelancer_id: Uuid,
    ) -> Result<Option<Withdrawal>, Error> {
        let mut tx = self.pool.begin().await?;

        let withdrawal = sqlx::query_as::<_, Withdrawal>(&format!(
            r#"
            UPDATE withdrawals
            SET status = 'cancelled', completed_at = NOW()
            WHERE id = $1 AND freelancer_id = $2 AND status IN ('pending', 'processing')
            RETURNING {}
            "#,
            WITHDRAWAL_COLUMNS
        ))
        .bind(withdrawal_id)
        .bind(freelancer_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(withdrawal) = withdrawal else {
            return Ok(None);
        };

        credit_wallet(&mut tx, withdrawal.freelancer_id, &withdrawal.amount).await?;

        tx.commit().await?;
        Ok(Some(withdrawal))
    }

    async fn start_processing_withdrawal(&self, withdrawal_id: Uuid) -> Result<Option<Withdrawal>, Error> {
        sqlx::query_as::<_, Withdrawal>(&format!(
            r#"
            UPDATE withdrawals
            SET status = 'processing', processing_started_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            WITHDRAWAL_COLUMNS
        ))
        .bind(withdrawal_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn complete_withdrawal(
        &self,
        withdrawal_id: Uuid,
        transaction_reference: String,
    ) -> Result<Option<Withdrawal>, Error> {
        sqlx::query_as::<_, Withdrawal>(&format!(
            r#"
            UPDATE withdrawals
            SET status = 'completed',
                completed_at = NOW(),
                transaction_reference = $2,
                notes = COALESCE(notes, 'Payment processed successfully')
            WHERE id = $1 AND status = 'processing'
            RETURNING {}
            "#,
            WITHDRAWAL_COLUMNS
        ))
        .bind(withdrawal_id)
        .bind(transaction_reference)
        .fetch_optional(&self.pool)
        .await
    }

    async fn fail_withdrawal(&self, withdrawal_id: Uuid, notes: String) -> Result<Option<Withdrawal>, Error> {
        let mut tx = self.pool.begin().await?;

        let withdrawal = sqlx::query_as::<_, Withdrawal>(&format!(
            r#"
            UPDATE withdrawals
            SET status = 'failed', completed_at = NOW(), notes = $2
            WHERE id = $1 AND status = 'processing'
            RETURNING {}
            "#,
            WITHDRAWAL_COLUMNS
        ))
        .bind(withdrawal_id)
        .bind(notes)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(withdrawal) = withdrawal else {
            return Ok(None);
        };

        credit_wallet(&mut tx, withdrawal.freelancer_id, &withdrawal.amount).await?;

        tx.commit().await?;
        Ok(Some(withdrawal))
    }
}
