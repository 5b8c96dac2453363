//! The customer credit/debit ledger.
//!
//! There is no ledger table. A customer's per-market running balance is derived on demand from their order
//! history: completed orders contribute their `customer_debit`, non-canceled orders contribute debt settlements
//! (`debit_amount`, credited to the settled market) and credit spends (`credit_used`, debited from the order's
//! market). A negative balance means the customer owes that market.
//!
//! The reconciliation logic assumes a customer owes at most one market at a time: [`find_first_debit`] returns the
//! first net-negative market in first-seen order and the payment workflow settles only that one. The assumption is
//! inherited behavior and deliberately not generalized; the tests pin it down.

use log::warn;
use mpe_common::Money;

use crate::db_types::{MarketId, Order, OrderStatus};

/// An outstanding debt: the customer owes `amount` (positive) to `market_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerDebit {
    pub market_id: MarketId,
    pub amount: Money,
}

/// Per-market running balances derived from `orders`, in the order each market first appears in the history.
pub fn market_balances(orders: &[Order]) -> Vec<(MarketId, Money)> {
    let mut balances: Vec<(MarketId, Money)> = Vec::new();
    for order in orders {
        if order.status == OrderStatus::Completed {
            if let Some(debit) = order.customer_debit {
                accumulate(&mut balances, &order.market_id, debit);
            }
        }
        if order.status != OrderStatus::Canceled {
            if let Some(amount) = order.debit_amount {
                match &order.debit_market_id {
                    Some(market_id) => accumulate(&mut balances, market_id, amount),
                    None => warn!(
                        "📒️ Order [{}] has debit_amount {amount} but no debit_market_id; skipping the entry",
                        order.order_id
                    ),
                }
            }
            if let Some(credit_used) = order.credit_used {
                accumulate(&mut balances, &order.market_id, -credit_used);
            }
        }
    }
    balances
}

/// The first market the customer currently owes money to, if any.
pub fn find_first_debit(orders: &[Order]) -> Option<CustomerDebit> {
    market_balances(orders)
        .into_iter()
        .find(|(_, balance)| balance.is_negative())
        .map(|(market_id, balance)| CustomerDebit { market_id, amount: -balance })
}

/// The customer's overall balance across all markets. This is what the stored running balance tracks.
pub fn total_balance(orders: &[Order]) -> Money {
    market_balances(orders).into_iter().map(|(_, balance)| balance).sum()
}

fn accumulate(balances: &mut Vec<(MarketId, Money)>, market_id: &MarketId, amount: Money) {
    match balances.iter_mut().find(|(id, _)| id == market_id) {
        Some((_, balance)) => *balance += amount,
        None => balances.push((market_id.clone(), amount)),
    }
}
