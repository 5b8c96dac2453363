use log::*;

use crate::{
    coordinator::OrderStatusCoordinator,
    db_types::{OrderAction, OrderId, OrderStatus, StatusFields},
    ledger,
    traits::{LockService, OrderDatabase, PaymentGateway},
    OrderFlowError,
};

/// Finishes an order in `Canceling`: refunds the gateway charge for in-app payments, reverses any debt settlement
/// this order carried and marks the order canceled.
pub struct CancellationWorkflow<B, L, G> {
    db: B,
    gateway: G,
    coordinator: OrderStatusCoordinator<B, L>,
}

impl<B, L, G> CancellationWorkflow<B, L, G>
where
    B: OrderDatabase,
    L: LockService,
    G: PaymentGateway,
{
    pub fn new(db: B, gateway: G, coordinator: OrderStatusCoordinator<B, L>) -> Self {
        Self { db, gateway, coordinator }
    }

    pub async fn exec(&self, order_id: &OrderId) -> Result<(), OrderFlowError> {
        let order = self
            .db
            .fetch_order(order_id)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
        if order.status != OrderStatus::Canceling {
            debug!("❌️ Order [{order_id}] is in {}; cancellation is a no-op", order.status);
            return Ok(());
        }

        if order.paid_in_app {
            // an in-app order without a gateway reference means an earlier invariant was broken;
            // refusing to guess beats silently skipping a refund
            let payment_id = order.payment_id.as_deref().ok_or_else(|| {
                OrderFlowError::InvariantViolation(format!(
                    "order [{order_id}] was paid in app but has no gateway payment id"
                ))
            })?;
            info!("❌️ Refunding gateway payment {payment_id} for order [{order_id}]");
            self.gateway.refund_payment(payment_id).await?;
        }

        if let (Some(debit_market), Some(debit_amount)) = (&order.debit_market_id, order.debit_amount) {
            // this order settled a standing debt; canceling it un-settles the debt
            debug!(
                "📒️ Order [{order_id}] settled {debit_amount} owed to market [{debit_market}]; reversing"
            );
            let history = self.db.fetch_customer_orders(&order.customer_id).await?;
            // the order is still Canceling, so its settlement is still part of the derived balance
            let current = ledger::total_balance(&history);
            let stored = self.db.fetch_customer_balance(&order.customer_id).await?;
            if stored != current {
                error!(
                    "📒️ Data integrity: customer [{}] has stored balance {stored} but the order history yields \
                     {current}",
                    order.customer_id
                );
            }
            self.db.update_customer_balance(&order.customer_id, current - debit_amount).await?;
        }

        self.coordinator.update(order_id, OrderAction::MarkAsCanceled, StatusFields::default()).await?;
        Ok(())
    }
}
