// service/escrow_service.rs
use num_traits::Zero;
use serde::Serialize;
use sqlx::types::BigDecimal;

use crate::{
    models::{disputemodel::ResolutionType, ordermodel::PaymentStatus},
    service::{error::ServiceError, order_state::OrderAction},
    utils::money::to_cents,
};

/// How an escrowed payment is divided when it leaves `held`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EscrowSettlement {
    pub client_amount: BigDecimal,
    pub freelancer_amount: BigDecimal,
    pub payment_status: PaymentStatus,
}

impl EscrowSettlement {
    pub fn full_release(total: &BigDecimal) -> Self {
        EscrowSettlement {
            client_amount: to_cents(&BigDecimal::zero()),
            freelancer_amount: to_cents(total),
            payment_status: PaymentStatus::Released,
        }
    }

    pub fn full_refund(total: &BigDecimal) -> Self {
        EscrowSettlement {
            client_amount: to_cents(total),
            freelancer_amount: to_cents(&BigDecimal::zero()),
            payment_status: PaymentStatus::Refunded,
        }
    }

    /// Amounts owed to each party for an admin decision on a disputed order.
    pub fn for_resolution(
        resolution: ResolutionType,
        total: &BigDecimal,
        client_amount: Option<&BigDecimal>,
        freelancer_amount: Option<&BigDecimal>,
    ) -> Result<Self, ServiceError> {
        let total = to_cents(total);
        let (client, freelancer) = match resolution {
            ResolutionType::Refund => (total.clone(), BigDecimal::zero()),
            ResolutionType::Release => (BigDecimal::zero(), total.clone()),
            ResolutionType::Split => {
                let (client, freelancer) = match (client_amount, freelancer_amount) {
                    (Some(client), Some(freelancer)) => (to_cents(client), to_cents(freelancer)),
                    _ => {
                        return Err(ServiceError::Validation(
                            "Split resolution requires both client_amount and freelancer_amount"
                                .to_string(),
                        ))
                    }
                };
                if client < BigDecimal::zero() || freelancer < BigDecimal::zero() {
                    return Err(ServiceError::Validation(
                        "Split amounts must not be negative".to_string(),
                    ));
                }
                if &client + &freelancer > total {
                    return Err(ServiceError::Validation(format!(
                        "Split amounts {} + {} exceed the order total {}",
                        client, freelancer, total
                    )));
                }
                (client, freelancer)
            }
        };

        let payment_status = settlement_status(&client, &freelancer, &total);
        Ok(EscrowSettlement {
            client_amount: to_cents(&client),
            freelancer_amount: to_cents(&freelancer),
            payment_status,
        })
    }

    /// Order transition implied by the settlement.
    pub fn order_action(&self) -> OrderAction {
        if self.freelancer_amount > BigDecimal::zero() {
            OrderAction::ResolveForFreelancer
        } else {
            OrderAction::ResolveForClient
        }
    }

    /// Share kept by the platform when a split does not cover the whole total.
    pub fn platform_remainder(&self, total: &BigDecimal) -> BigDecimal {
        to_cents(&(to_cents(total) - &self.client_amount - &self.freelancer_amount))
    }
}

pub fn settlement_status(
    client: &BigDecimal,
    freelancer: &BigDecimal,
    total: &BigDecimal,
) -> PaymentStatus {
    if *client > BigDecimal::zero() && freelancer.is_zero() {
        PaymentStatus::Refunded
    } else if freelancer == total {
        PaymentStatus::Released
    } else {
        PaymentStatus::Partial
    }
}

/// Only a held payment may be settled.
pub fn ensure_held(status: PaymentStatus) -> Result<(), ServiceError> {
    match status {
        PaymentStatus::Held => Ok(()),
        other => Err(ServiceError::InvalidEscrowTransition(format!(
            "Cannot transition payment from {} once settled",
            other.to_str()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn refund_returns_everything_to_client() {
        let s = EscrowSettlement::for_resolution(ResolutionType::Refund, &dec("120"), None, None)
            .unwrap();
        assert_eq!(s.client_amount, dec("120.00"));
        assert_eq!(s.freelancer_amount, dec("0"));
        assert_eq!(s.payment_status, PaymentStatus::Refunded);
        assert_eq!(s.order_action(), OrderAction::ResolveForClient);
    }

    #[test]
    fn release_pays_freelancer_in_full() {
        let s = EscrowSettlement::for_resolution(ResolutionType::Release, &dec("120"), None, None)
            .unwrap();
        assert_eq!(s.freelancer_amount, dec("120.00"));
        assert_eq!(s.payment_status, PaymentStatus::Released);
        assert_eq!(s.order_action(), OrderAction::ResolveForFreelancer);
    }

    #[test]
    fn even_split_is_partial() {
        let s = EscrowSettlement::for_resolution(
            ResolutionType::Split,
            &dec("100"),
            Some(&dec("40")),
            Some(&dec("60")),
        )
        .unwrap();
        assert_eq!(s.payment_status, PaymentStatus::Partial);
        assert_eq!(s.platform_remainder(&dec("100")), dec("0"));
        assert_eq!(s.order_action(), OrderAction::ResolveForFreelancer);
    }

    #[test]
    fn split_may_leave_a_platform_remainder() {
        let s = EscrowSettlement::for_resolution(
            ResolutionType::Split,
            &dec("100"),
            Some(&dec("30")),
            Some(&dec("50")),
        )
        .unwrap();
        assert_eq!(s.platform_remainder(&dec("100")), dec("20.00"));
    }

    #[test]
    fn split_with_zero_freelancer_share_is_a_refund() {
        let s = EscrowSettlement::for_resolution(
            ResolutionType::Split,
            &dec("100"),
            Some(&dec("70")),
            Some(&dec("0")),
        )
        .unwrap();
        assert_eq!(s.payment_status, PaymentStatus::Refunded);
        assert_eq!(s.order_action(), OrderAction::ResolveForClient);
    }

    #[test]
    fn split_giving_freelancer_everything_is_a_release() {
        let s = EscrowSettlement::for_resolution(
            ResolutionType::Split,
            &dec("100"),
            Some(&dec("0")),
            Some(&dec("100")),
        )
        .unwrap();
        assert_eq!(s.payment_status, PaymentStatus::Released);
    }

    #[test]
    fn split_over_total_is_rejected() {
        let err = EscrowSettlement::for_resolution(
            ResolutionType::Split,
            &dec("100"),
            Some(&dec("60")),
            Some(&dec("40.01")),
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn split_requires_both_amounts_and_no_negatives() {
        assert!(EscrowSettlement::for_resolution(
            ResolutionType::Split,
            &dec("100"),
            Some(&dec("60")),
            None,
        )
        .is_err());
        assert!(EscrowSettlement::for_resolution(
            ResolutionType::Split,
            &dec("100"),
            Some(&dec("-1")),
            Some(&dec("50")),
        )
        .is_err());
    }

    #[test]
    fn only_held_payments_settle() {
        assert!(ensure_held(PaymentStatus::Held).is_ok());
        assert!(ensure_held(PaymentStatus::Released).is_err());
        assert!(ensure_held(PaymentStatus::Partial).is_err());
    }

    #[test]
    fn full_release_and_refund_helpers() {
        assert_eq!(
            EscrowSettlement::full_release(&dec("75.5")).freelancer_amount.to_string(),
            "75.50"
        );
        assert_eq!(
            EscrowSettlement::full_refund(&dec("75.5")).payment_status,
            PaymentStatus::Refunded
        );
    }
}
