use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use uuid::Uuid;
use validator::Validate;

use super::orderdtos::validate_positive_amount;
use crate::models::withdrawalmodel::{WithdrawalMethodType, WithdrawalStatus};

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct CreateWithdrawalMethodDto {
    pub method_type: WithdrawalMethodType,

    #[validate(length(min = 1, max = 200, message = "Account holder name is required"))]
    pub account_holder_name: String,

    #[validate(length(min = 4, max = 100, message = "Account number is invalid"))]
    pub account_number: Option<String>,

    #[validate(length(min = 1, max = 200))]
    pub bank_name: Option<String>,

    #[validate(length(min = 8, max = 20, message = "SWIFT code is invalid"))]
    pub swift_code: Option<String>,

    #[validate(email(message = "PayPal email is invalid"))]
    pub paypal_email: Option<String>,

    #[serde(default)]
    pub is_default: bool,
}

impl CreateWithdrawalMethodDto {
    /// Field requirements that depend on the method type.
    pub fn check_method_details(&self) -> Result<(), String> {
        match self.method_type {
            WithdrawalMethodType::BankAccount => {
                if self.account_number.is_none() || self.bank_name.is_none() {
                    return Err("Account number and bank name required for bank accounts".to_string());
                }
            }
            WithdrawalMethodType::Paypal => {
                if self.paypal_email.is_none() {
                    return Err("PayPal email required".to_string());
                }
            }
            WithdrawalMethodType::Stripe => {}
        }
        Ok(())
    }
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct CreateWithdrawalDto {
    pub withdrawal_method_id: Uuid,

    #[validate(custom = "validate_positive_amount")]
    pub amount: BigDecimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WithdrawalQueryDto {
    pub status: Option<WithdrawalStatus>,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct FailWithdrawalDto {
    #[validate(length(min = 1, max = 2000, message = "A failure reason is required"))]
    pub notes: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(method_type: WithdrawalMethodType) -> CreateWithdrawalMethodDto {
        CreateWithdrawalMethodDto {
            method_type,
            account_holder_name: "Grace Hopper".to_string(),
            account_number: None,
            bank_name: None,
            swift_code: None,
            paypal_email: None,
            is_default: false,
        }
    }

    #[test]
    fn bank_accounts_need_number_and_bank() {
        let mut dto = method(WithdrawalMethodType::BankAccount);
        assert!(dto.check_method_details().is_err());

        dto.account_number = Some("12345678".to_string());
        assert!(dto.check_method_details().is_err());

        dto.bank_name = Some("First Bank".to_string());
        assert!(dto.check_method_details().is_ok());
        assert!(dto.validate().is_ok());
    }

    #[test]
    fn paypal_needs_an_email() {
        let mut dto = method(WithdrawalMethodType::Paypal);
        assert!(dto.check_method_details().is_err());

        dto.paypal_email = Some("grace@example.com".to_string());
        assert!(dto.check_method_details().is_ok());

        dto.paypal_email = Some("grace".to_string());
        assert!(dto.validate().is_err());
    }

    #[test]
    fn method_type_uses_snake_case() {
        let dto: CreateWithdrawalMethodDto = serde_json::from_value(serde_json::json!({
            "method_type": "bank_account",
            "account_holder_name": "Grace Hopper",
            "account_number": "12345678",
            "bank_name": "First Bank"
        }))
        .unwrap();
        assert_eq!(dto.method_type, WithdrawalMethodType::BankAccount);
        assert!(!dto.is_default);
    }

    #[test]
    fn withdrawal_amount_must_be_positive() {
        let dto = CreateWithdrawalDto {
            withdrawal_method_id: Uuid::new_v4(),
            amount: BigDecimal::from(0),
        };
        assert!(dto.validate().is_err());
    }

    #[test]
    fn withdrawal_amount_is_capped_at_column_range() {
        let dto: CreateWithdrawalDto = serde_json::from_value(serde_json::json!({
            "withdrawal_method_id": Uuid::new_v4(),
            "amount": "100000000000.00"
        }))
        .unwrap();
        assert!(dto.validate().is_err());
    }
}
