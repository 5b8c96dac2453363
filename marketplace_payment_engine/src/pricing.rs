//! The discount engine: computes a line item's charged total from its price snapshot, quantity and discount policy.
//!
//! All intermediate arithmetic is decimal, never floating point. The discount is rounded half-up to two places
//! before it is applied, and the final total is rounded the same way, so the charged amount is always a whole
//! number of cents.

use mpe_common::{Money, MoneyConversionError};
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use thiserror::Error;

use crate::db_types::{DiscountKind, DiscountPolicy};

#[derive(Debug, Clone, Error)]
pub enum PricingError {
    #[error("Line item total cannot be represented: {0}")]
    Overflow(#[from] MoneyConversionError),
}

/// The total charged for `quantity` units at `unit_price` under the given discount policy.
///
/// The discount never exceeds the undiscounted subtotal: a fixed-value discount larger than the unit price clamps
/// the total at zero rather than paying the customer.
pub fn charged_total(
    unit_price: Money,
    quantity: i64,
    policy: Option<&DiscountPolicy>,
) -> Result<Money, PricingError> {
    let price = unit_price.to_decimal();
    let subtotal = price * Decimal::from(quantity);
    let discount = match policy {
        Some(policy) => discount_amount(price, quantity, policy),
        None => Decimal::ZERO,
    };
    let discount = discount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero).min(subtotal);
    Ok(Money::try_from_decimal(subtotal - discount)?)
}

fn discount_amount(price: Decimal, quantity: i64, policy: &DiscountPolicy) -> Decimal {
    let value_1 = policy.value_1.unwrap_or(Decimal::ZERO);
    match policy.kind {
        DiscountKind::Percent => {
            let units = eligible_units(quantity, policy.max_per_client);
            price * Decimal::from(units) * value_1 / Decimal::ONE_HUNDRED
        },
        DiscountKind::PercentOnSecond => {
            // The promo only activates from a minimum quantity, carried in value_2.
            let minimum = policy.value_2.unwrap_or(Decimal::ZERO);
            if Decimal::from(quantity) < minimum {
                return Decimal::ZERO;
            }
            let units = eligible_units(quantity / 2, policy.max_per_client);
            price * Decimal::from(units) * value_1 / Decimal::ONE_HUNDRED
        },
        DiscountKind::FixedValue => {
            let units = eligible_units(quantity, policy.max_per_client);
            value_1 * Decimal::from(units)
        },
        DiscountKind::OneFree => {
            // value_1 is the group size: every value_1 units bought earns one free unit.
            let group = value_1.trunc().to_i64().unwrap_or(0);
            if group <= 0 {
                return Decimal::ZERO;
            }
            let free = eligible_units(quantity / group, policy.max_per_client);
            price * Decimal::from(free)
        },
    }
}

fn eligible_units(units: i64, max_per_client: Option<i64>) -> i64 {
    max_per_client.map_or(units, |cap| units.min(cap)).max(0)
}
