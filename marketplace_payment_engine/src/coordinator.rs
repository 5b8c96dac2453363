//! The order status coordinator: the only writer of order status and payment fields.
//!
//! Every trigger source (customer/market actions, gateway webhooks, async jobs, the re-drive timer) funnels its
//! status changes through here. The coordinator serializes updates per order with the distributed lock service,
//! validates the transition against the state machine, persists atomically and publishes an update event. Invalid
//! transitions surface as [`OrderFlowError::Conflict`] with nothing written.

use std::time::Duration;

use log::*;

use crate::{
    db_types::{Order, OrderAction, OrderId, StatusFields},
    events::{EventProducers, OrderUpdatedEvent},
    state_machine,
    traits::{LockService, OrderDatabase},
    OrderFlowError,
};

pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(10);

pub struct OrderStatusCoordinator<B, L> {
    db: B,
    locks: L,
    lock_wait: Duration,
    producers: EventProducers,
}

impl<B: Clone, L: Clone> Clone for OrderStatusCoordinator<B, L> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            locks: self.locks.clone(),
            lock_wait: self.lock_wait,
            producers: self.producers.clone(),
        }
    }
}

impl<B, L> OrderStatusCoordinator<B, L>
where
    B: OrderDatabase,
    L: LockService,
{
    pub fn new(db: B, locks: L, producers: EventProducers) -> Self {
        Self { db, locks, lock_wait: DEFAULT_LOCK_WAIT, producers }
    }

    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    /// Applies `action` to the order and persists the resulting status together with `fields`.
    pub async fn update(
        &self,
        order_id: &OrderId,
        action: OrderAction,
        fields: StatusFields,
    ) -> Result<Order, OrderFlowError> {
        self.transition(None, order_id, action, fields).await
    }

    /// The customer-scoped variant of [`Self::update`]: the order must belong to `customer_id`, so one customer
    /// can never act on another customer's order.
    pub async fn customer_update(
        &self,
        customer_id: &str,
        order_id: &OrderId,
        action: OrderAction,
        fields: StatusFields,
    ) -> Result<Order, OrderFlowError> {
        self.transition(Some(customer_id), order_id, action, fields).await
    }

    async fn transition(
        &self,
        customer_id: Option<&str>,
        order_id: &OrderId,
        action: OrderAction,
        fields: StatusFields,
    ) -> Result<Order, OrderFlowError> {
        let key = format!("update-order-status:{order_id}");
        // the lock covers read-validate-write only; the publish happens after release
        let updated = {
            let _guard = self.locks.acquire(&key, self.lock_wait).await?;
            let order = match customer_id {
                Some(customer_id) => self.db.fetch_order_for_customer(customer_id, order_id).await?,
                None => self.db.fetch_order(order_id).await?,
            }
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
            let next = state_machine::reduce(order.status, action)
                .ok_or(OrderFlowError::Conflict { status: order.status, action })?;
            debug!("🚦️ Order [{order_id}]: {} --{action}--> {next}", order.status);
            self.db.update_order_status(order_id, next, &fields).await?
        };
        self.publish_update(&updated, &fields).await;
        Ok(updated)
    }

    async fn publish_update(&self, order: &Order, fields: &StatusFields) {
        for producer in &self.producers.order_updated_producer {
            let event = OrderUpdatedEvent::new(order, fields);
            producer.publish_event(event).await;
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use mpe_common::Money;

    use super::*;
    use crate::{
        db_types::{OrderAction, OrderStatus},
        mem::{MemoryDatabase, MemoryLockService},
        test_utils::fixtures,
    };

    fn coordinator(db: MemoryDatabase) -> OrderStatusCoordinator<MemoryDatabase, MemoryLockService> {
        OrderStatusCoordinator::new(db, MemoryLockService::default(), EventProducers::default())
    }

    #[tokio::test]
    async fn valid_transition_is_persisted() {
        let db = MemoryDatabase::default();
        db.push_order(fixtures::order("o1", OrderStatus::ApprovalPending)).await;
        let updated = coordinator(db.clone())
            .update(&"o1".into(), OrderAction::Approve, StatusFields::default())
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Processing);
        let stored = db.fetch_order(&"o1".into()).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn invalid_transition_is_a_conflict_and_writes_nothing() {
        let db = MemoryDatabase::default();
        db.push_order(fixtures::order("o1", OrderStatus::PaymentProcessing)).await;
        let err = coordinator(db.clone())
            .update(&"o1".into(), OrderAction::Approve, StatusFields::default())
            .await
            .unwrap_err();
        match err {
            OrderFlowError::Conflict { status, action } => {
                assert_eq!(status, OrderStatus::PaymentProcessing);
                assert_eq!(action, OrderAction::Approve);
            },
            other => panic!("expected Conflict, got {other}"),
        }
        let stored = db.fetch_order(&"o1".into()).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::PaymentProcessing);
    }

    #[tokio::test]
    async fn customer_update_rejects_foreign_orders() {
        let db = MemoryDatabase::default();
        db.push_order(fixtures::order("o1", OrderStatus::ApprovalPending)).await;
        let err = coordinator(db)
            .customer_update("someone-else", &"o1".into(), OrderAction::Cancel, StatusFields::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderFlowError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn extra_fields_are_persisted_with_the_transition() {
        let db = MemoryDatabase::default();
        db.push_order(fixtures::order("o1", OrderStatus::Completing)).await;
        let fields = StatusFields {
            finished_at: Some(chrono::Utc::now()),
            customer_debit: Some(Money::from_major(-5)),
            ..Default::default()
        };
        let updated =
            coordinator(db).update(&"o1".into(), OrderAction::MarkAsCompleted, fields).await.unwrap();
        assert_eq!(updated.status, OrderStatus::Completed);
        assert!(updated.finished_at.is_some());
        assert_eq!(updated.customer_debit, Some(Money::from_major(-5)));
    }

    #[tokio::test]
    async fn bounded_wait_on_a_stuck_lock() {
        let db = MemoryDatabase::default();
        db.push_order(fixtures::order("o1", OrderStatus::ApprovalPending)).await;
        let locks = MemoryLockService::default();
        // simulate a holder that never releases
        let _held = locks.acquire("update-order-status:o1", Duration::from_secs(1)).await.unwrap();
        let coordinator = OrderStatusCoordinator::new(db, locks, EventProducers::default())
            .with_lock_wait(Duration::from_millis(50));
        let err = coordinator
            .update(&"o1".into(), OrderAction::Approve, StatusFields::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderFlowError::Lock(crate::traits::LockError::Timeout(_, _))));
    }

    #[tokio::test]
    async fn a_stalled_subscriber_does_not_hold_the_order_lock() {
        let db = MemoryDatabase::default();
        db.push_order(fixtures::order("o1", OrderStatus::ApprovalPending)).await;
        let locks = MemoryLockService::default();
        // a one-slot channel that nobody drains, pre-filled so the next publish blocks
        let (sender, receiver) = tokio::sync::mpsc::channel(1);
        let stale =
            OrderUpdatedEvent::new(&fixtures::order("o1", OrderStatus::ApprovalPending), &StatusFields::default());
        sender.send(stale).await.unwrap();
        let producers =
            EventProducers { order_updated_producer: vec![crate::events::EventProducer::new(sender)] };
        let coordinator = OrderStatusCoordinator::new(db.clone(), locks.clone(), producers);
        let pending = tokio::spawn(async move {
            coordinator.update(&"o1".into(), OrderAction::Approve, StatusFields::default()).await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        // the transition is persisted and the lock is free even while the publish is stuck
        let stored = db.fetch_order(&"o1".into()).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Processing);
        let guard = locks.acquire("update-order-status:o1", Duration::from_millis(100)).await;
        assert!(guard.is_ok());

        // closing the receiver fails the pending send; the update still reports success
        drop(receiver);
        let updated = pending.await.unwrap().unwrap();
        assert_eq!(updated.status, OrderStatus::Processing);
    }
}
