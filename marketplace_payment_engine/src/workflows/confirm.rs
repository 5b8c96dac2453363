use crate::{
    coordinator::OrderStatusCoordinator,
    db_types::{Order, OrderAction, OrderId, StatusFields},
    traits::{LockService, OrderDatabase},
    OrderFlowError,
};

/// Confirms an order's payment out of band, typically when a gateway webhook reports a settled Pix charge.
pub struct ConfirmOrderPaymentWorkflow<B, L> {
    coordinator: OrderStatusCoordinator<B, L>,
}

impl<B, L> ConfirmOrderPaymentWorkflow<B, L>
where
    B: OrderDatabase,
    L: LockService,
{
    pub fn new(coordinator: OrderStatusCoordinator<B, L>) -> Self {
        Self { coordinator }
    }

    pub async fn exec(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        self.coordinator.update(order_id, OrderAction::ConfirmPayment, StatusFields::default()).await
    }
}
