//! Money helpers: cents rounding, the NUMERIC(12,2) ceiling and the withdrawal fee model.
//!
//! All monetary values are stored as NUMERIC(12,2) and handled as `BigDecimal`.

use num_traits::Zero;
use serde::{Serialize, Serializer};
use sqlx::types::BigDecimal;

/// Smallest withdrawal a freelancer may request, in dollars.
pub fn min_withdrawal_amount() -> BigDecimal {
    BigDecimal::from(10)
}

/// Percentage part of the withdrawal fee (2%).
pub fn withdrawal_fee_rate() -> BigDecimal {
    BigDecimal::new(2.into(), 2)
}

/// Fixed part of the withdrawal fee ($1.00).
pub fn withdrawal_fee_fixed() -> BigDecimal {
    BigDecimal::from(1)
}

/// Largest value a NUMERIC(12,2) column holds.
pub fn max_amount() -> BigDecimal {
    BigDecimal::new(999_999_999_999i64.into(), 2)
}

/// Rounds to cents and pins the scale so responses always show two decimals.
pub fn to_cents(value: &BigDecimal) -> BigDecimal {
    value.round(2).with_scale(2)
}

/// `serialize_with` for money columns; Postgres hands back NUMERIC with a wider scale.
pub fn serialize_cents<S: Serializer>(value: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error> {
    to_cents(value).serialize(serializer)
}

pub fn serialize_cents_opt<S: Serializer>(
    value: &Option<BigDecimal>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    value.as_ref().map(to_cents).serialize(serializer)
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawalQuote {
    pub amount: BigDecimal,
    pub fee: BigDecimal,
    pub net_amount: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QuoteError {
    #[error("Amount must be greater than 0")]
    NonPositive,

    #[error("Minimum withdrawal amount is ${0}")]
    BelowMinimum(BigDecimal),

    #[error("Withdrawal fee of ${fee} exceeds amount ${amount}")]
    FeeExceedsAmount { amount: BigDecimal, fee: BigDecimal },
}

/// fee = amount * 2% + $1, rounded to cents; net = amount - fee.
pub fn withdrawal_fee(amount: &BigDecimal) -> Result<BigDecimal, QuoteError> {
    if *amount <= BigDecimal::zero() {
        return Err(QuoteError::NonPositive);
    }
    Ok(to_cents(&(amount * withdrawal_fee_rate() + withdrawal_fee_fixed())))
}

pub fn quote_withdrawal(amount: &BigDecimal) -> Result<WithdrawalQuote, QuoteError> {
    let amount = to_cents(amount);
    if amount <= BigDecimal::zero() {
        return Err(QuoteError::NonPositive);
    }
    if amount < min_withdrawal_amount() {
        return Err(QuoteError::BelowMinimum(to_cents(&min_withdrawal_amount())));
    }

    let fee = withdrawal_fee(&amount)?;
    let net_amount = &amount - &fee;
    if net_amount < BigDecimal::zero() {
        return Err(QuoteError::FeeExceedsAmount { amount, fee });
    }

    Ok(WithdrawalQuote {
        amount,
        fee,
        net_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_fee_on_round_amount() {
        assert_eq!(withdrawal_fee(&dec("100")).unwrap(), dec("3.00"));
    }

    #[test]
    fn test_fee_rounds_to_cents() {
        // 55.55 * 0.02 = 1.111
        assert_eq!(withdrawal_fee(&dec("55.55")).unwrap(), dec("2.11"));
        assert_eq!(withdrawal_fee(&dec("55.55")).unwrap().to_string(), "2.11");
    }

    #[test]
    fn test_fee_rejects_non_positive() {
        assert_eq!(withdrawal_fee(&dec("0")), Err(QuoteError::NonPositive));
        assert_eq!(withdrawal_fee(&dec("-5")), Err(QuoteError::NonPositive));
    }

    #[test]
    fn test_quote_at_minimum() {
        let quote = quote_withdrawal(&dec("10")).unwrap();
        assert_eq!(quote.fee, dec("1.20"));
        assert_eq!(quote.net_amount, dec("8.80"));
        assert_eq!(quote.amount.to_string(), "10.00");
    }

    #[test]
    fn test_quote_below_minimum() {
        assert_eq!(
            quote_withdrawal(&dec("9.99")),
            Err(QuoteError::BelowMinimum(dec("10.00")))
        );
    }

    #[test]
    fn test_quote_net_plus_fee_equals_amount() {
        for raw in ["10.00", "12.34", "250.00", "999.99", "5000"] {
            let quote = quote_withdrawal(&dec(raw)).unwrap();
            assert_eq!(&quote.net_amount + &quote.fee, quote.amount);
            assert!(quote.net_amount >= BigDecimal::zero());
        }
    }

    #[derive(Serialize)]
    struct Amounts {
        #[serde(serialize_with = "serialize_cents")]
        fee: BigDecimal,
        #[serde(serialize_with = "serialize_cents_opt")]
        share: Option<BigDecimal>,
    }

    #[test]
    fn test_serialized_money_has_two_decimals() {
        let json = serde_json::to_value(Amounts {
            fee: dec("2.2000"),
            share: Some(dec("40")),
        })
        .unwrap();
        assert_eq!(json["fee"], serde_json::json!("2.20"));
        assert_eq!(json["share"], serde_json::json!("40.00"));

        let json = serde_json::to_value(Amounts {
            fee: dec("57.8000"),
            share: None,
        })
        .unwrap();
        assert_eq!(json["fee"], serde_json::json!("57.80"));
        assert!(json["share"].is_null());
    }

    #[test]
    fn test_max_amount_matches_column_precision() {
        assert_eq!(max_amount().to_string(), "9999999999.99");
    }

    #[test]
    fn test_to_cents_pads_scale() {
        assert_eq!(to_cents(&dec("7")).to_string(), "7.00");
        assert_eq!(to_cents(&dec("7.126")).to_string(), "7.13");
    }
}
