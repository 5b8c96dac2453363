//! The engine's front door, mirroring the trigger surface an HTTP layer would expose: order intake, the market's
//! accept/dispatch actions, token-gated delivery completion, cancellation and the gateway webhook.
//!
//! Trigger methods apply their synchronous transition (so the caller sees conflicts immediately) and schedule the
//! follow-up job. Jobs are executed by [`OrderFlowApi::process_jobs`], which the embedding service calls after the
//! trigger returns; the re-drive worker picks up anything that slips through.

use chrono::Utc;
use log::*;
use mpe_common::Money;
use serde::{Deserialize, Serialize};

use crate::{
    coordinator::OrderStatusCoordinator,
    db_types::{
        DiscountPolicy,
        KitComponent,
        LineItem,
        MarketId,
        MissingItem,
        NewOrder,
        Order,
        OrderAction,
        OrderId,
        OrderStatus,
        PaymentMethod,
        StatusFields,
    },
    helpers::CompletionTokenIssuer,
    orchestrator::PaymentOrchestrator,
    pricing,
    traits::{JobQueue, LockService, OrderDatabase, PaymentGateway},
    OrderFlowError,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLineItem {
    pub product_id: String,
    pub unit_price: Money,
    pub quantity: i64,
    pub discount: Option<DiscountPolicy>,
    pub kit_items: Option<Vec<KitComponent>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderRequest {
    pub order_id: OrderId,
    pub market_id: MarketId,
    pub customer_id: String,
    pub payment_method: PaymentMethod,
    pub card_token: Option<String>,
    pub delivery_fee: Money,
    /// Standing credit the customer chose to spend on this order.
    pub credit_used: Option<Money>,
    pub items: Vec<NewLineItem>,
}

pub struct OrderFlowApi<B, L, Q, G> {
    db: B,
    coordinator: OrderStatusCoordinator<B, L>,
    orchestrator: PaymentOrchestrator<B, L, Q, G>,
    tokens: CompletionTokenIssuer,
}

impl<B, L, Q, G> OrderFlowApi<B, L, Q, G>
where
    B: OrderDatabase,
    L: LockService,
    Q: JobQueue,
    G: PaymentGateway,
{
    pub fn new(
        db: B,
        coordinator: OrderStatusCoordinator<B, L>,
        orchestrator: PaymentOrchestrator<B, L, Q, G>,
        tokens: CompletionTokenIssuer,
    ) -> Self {
        Self { db, coordinator, orchestrator, tokens }
    }

    /// Prices the requested items, stores the order and, for in-app payments, schedules the payment job.
    ///
    /// Idempotent on order id: replaying a request returns the stored order without scheduling anything.
    pub async fn place_order(&self, req: NewOrderRequest) -> Result<Order, OrderFlowError> {
        if req.items.is_empty() {
            return Err(OrderFlowError::InvariantViolation(format!(
                "order [{}] was placed with no line items",
                req.order_id
            )));
        }
        let mut items = Vec::with_capacity(req.items.len());
        for item in req.items {
            let total = pricing::charged_total(item.unit_price, item.quantity, item.discount.as_ref())?;
            items.push(LineItem {
                product_id: item.product_id,
                unit_price: item.unit_price,
                quantity: item.quantity,
                discount: item.discount,
                kit_items: item.kit_items,
                total,
            });
        }
        let market_amount: Money = items.iter().map(|i| i.total).sum();
        let credit = req.credit_used.unwrap_or(Money::ZERO);
        // spent credit reduces the charge but never below zero
        let total = (market_amount + req.delivery_fee - credit).max(Money::ZERO);
        let paid_in_app = req.payment_method.paid_in_app();
        let status =
            if paid_in_app { OrderStatus::PaymentProcessing } else { OrderStatus::ApprovalPending };

        let order = NewOrder {
            order_id: req.order_id,
            market_id: req.market_id,
            customer_id: req.customer_id,
            status,
            payment_method: req.payment_method,
            paid_in_app,
            card_token: req.card_token,
            total,
            market_amount,
            delivery_fee: req.delivery_fee,
            credit_used: req.credit_used,
            items,
            created_at: Utc::now(),
        };
        let (order, created) = self.db.insert_order(order).await?;
        if !created {
            info!("🧾️ Order [{}] was already placed; returning the stored order", order.order_id);
            return Ok(order);
        }
        info!(
            "🧾️ Order [{}] placed for market [{}], {} via {}",
            order.order_id, order.market_id, order.total, order.payment_method
        );
        if order.paid_in_app {
            self.orchestrator.pay(&order.order_id).await?;
        }
        Ok(order)
    }

    /// The market accepts the order.
    pub async fn approve(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        self.coordinator.update(order_id, OrderAction::Approve, StatusFields::default()).await
    }

    /// The market hands the order to a courier.
    pub async fn start_delivery(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        self.coordinator.update(order_id, OrderAction::Delivery, StatusFields::default()).await
    }

    /// Issues the confirmation token the customer's device shows at handover, embedding the agreed missing-item
    /// list. Only available while the order is out for delivery.
    pub async fn issue_completion_token(
        &self,
        order_id: &OrderId,
        missing_items: Option<Vec<MissingItem>>,
    ) -> Result<String, OrderFlowError> {
        let order = self
            .db
            .fetch_order(order_id)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
        if order.status != OrderStatus::DeliveryPending {
            return Err(OrderFlowError::Conflict { status: order.status, action: OrderAction::Complete });
        }
        Ok(self.tokens.issue(order_id, missing_items)?)
    }

    /// The courier presents the customer's token; the order moves to `Completing` with the token's missing items
    /// recorded, and the completion job is scheduled.
    pub async fn complete_delivery(&self, order_id: &OrderId, token: &str) -> Result<Order, OrderFlowError> {
        let claims = self.tokens.verify(token, order_id)?;
        let fields = StatusFields { missing_items: claims.missing_items, ..Default::default() };
        let order = self.coordinator.update(order_id, OrderAction::Complete, fields).await?;
        self.orchestrator.complete(order_id).await?;
        Ok(order)
    }

    /// The customer asks to cancel their own order.
    pub async fn request_cancellation(
        &self,
        customer_id: &str,
        order_id: &OrderId,
    ) -> Result<Order, OrderFlowError> {
        let order = self
            .coordinator
            .customer_update(customer_id, order_id, OrderAction::Cancel, StatusFields::default())
            .await?;
        self.orchestrator.cancel(order_id).await?;
        Ok(order)
    }

    /// The customer retries after a failed charge (e.g. with a new card token).
    pub async fn retry_payment(
        &self,
        customer_id: &str,
        order_id: &OrderId,
        card_token: Option<String>,
    ) -> Result<Order, OrderFlowError> {
        if card_token.is_some() {
            debug!("💳️ Order [{order_id}] retrying payment with a fresh card token");
        }
        let fields = StatusFields { card_token, ..Default::default() };
        let order =
            self.coordinator.customer_update(customer_id, order_id, OrderAction::ProcessPayment, fields).await?;
        self.orchestrator.pay(order_id).await?;
        Ok(order)
    }

    /// The gateway reports a settled charge (a paid Pix code). The heavy lifting runs as a job.
    pub async fn confirm_payment_webhook(&self, order_id: &OrderId) -> Result<(), OrderFlowError> {
        debug!("📡️ Gateway webhook: payment settled for order [{order_id}]");
        self.orchestrator.confirm_payment(order_id).await
    }

    /// Runs the order's scheduled jobs to completion. Returns whether any job ran.
    pub async fn process_jobs(&self, order_id: &OrderId) -> Result<bool, OrderFlowError> {
        self.orchestrator.run_pending(order_id).await
    }
}

#[cfg(test)]
mod test {
    use chrono::Duration;
    use mpe_common::Secret;
    use rust_decimal::Decimal;

    use super::*;
    use crate::{
        db_types::{DiscountKind, MissingItem},
        events::EventProducers,
        mem::{MemoryDatabase, MemoryGateway, MemoryJobQueue, MemoryLockService},
    };

    fn api(
        db: MemoryDatabase,
        gateway: MemoryGateway,
    ) -> OrderFlowApi<MemoryDatabase, MemoryLockService, MemoryJobQueue, MemoryGateway> {
        let locks = MemoryLockService::default();
        let coordinator = OrderStatusCoordinator::new(db.clone(), locks.clone(), EventProducers::default());
        let orchestrator = PaymentOrchestrator::new(
            db.clone(),
            locks,
            MemoryJobQueue::default(),
            gateway,
            coordinator.clone(),
        );
        let tokens = CompletionTokenIssuer::new(Secret::new("test-secret".to_string()), Duration::minutes(10));
        OrderFlowApi::new(db, coordinator, orchestrator, tokens)
    }

    fn item(price: i64, quantity: i64) -> NewLineItem {
        NewLineItem {
            product_id: "prod-1".to_string(),
            unit_price: Money::from_major(price),
            quantity,
            discount: None,
            kit_items: None,
        }
    }

    fn request(order_id: &str, payment_method: PaymentMethod) -> NewOrderRequest {
        NewOrderRequest {
            order_id: order_id.into(),
            market_id: "market-a".into(),
            customer_id: "cust-1".to_string(),
            payment_method,
            card_token: Some("tok-1".to_string()),
            delivery_fee: Money::from_major(10),
            credit_used: None,
            items: vec![item(30, 3)],
        }
    }

    #[tokio::test]
    async fn cash_orders_skip_payment_processing() {
        let db = MemoryDatabase::default();
        let api = api(db.clone(), MemoryGateway::default());
        let order = api.place_order(request("o1", PaymentMethod::Cash)).await.unwrap();
        assert_eq!(order.status, OrderStatus::ApprovalPending);
        assert!(!order.paid_in_app);
        assert_eq!(order.total, Money::from_major(100));
        assert_eq!(order.market_amount, Money::from_major(90));
        // no payment job was scheduled
        assert!(!api.process_jobs(&"o1".into()).await.unwrap());
    }

    #[tokio::test]
    async fn card_orders_are_charged_through_the_gateway() {
        let db = MemoryDatabase::default();
        let gateway = MemoryGateway::default();
        db.register_market(&"market-a".into(), "wallet-a").await.unwrap();
        let api = api(db.clone(), gateway.clone());
        let order = api.place_order(request("o1", PaymentMethod::Card)).await.unwrap();
        assert_eq!(order.status, OrderStatus::PaymentProcessing);

        assert!(api.process_jobs(&"o1".into()).await.unwrap());
        let order = db.fetch_order(&"o1".into()).await.unwrap().unwrap();
        // card capture is synchronous, so the charge settles in one pass
        assert_eq!(order.status, OrderStatus::ApprovalPending);
        assert!(order.payment_id.is_some());
        assert_eq!(gateway.payments().await.len(), 1);
    }

    #[tokio::test]
    async fn replaying_an_order_request_changes_nothing() {
        let db = MemoryDatabase::default();
        db.register_market(&"market-a".into(), "wallet-a").await.unwrap();
        let api = api(db.clone(), MemoryGateway::default());
        api.place_order(request("o1", PaymentMethod::Card)).await.unwrap();
        api.process_jobs(&"o1".into()).await.unwrap();
        let replay = api.place_order(request("o1", PaymentMethod::Card)).await.unwrap();
        assert_eq!(replay.status, OrderStatus::ApprovalPending);
        // the replay scheduled no new job
        assert!(!api.process_jobs(&"o1".into()).await.unwrap());
    }

    #[tokio::test]
    async fn discounts_flow_into_the_stored_totals() {
        let db = MemoryDatabase::default();
        let api = api(db, MemoryGateway::default());
        let mut req = request("o1", PaymentMethod::Cash);
        req.items = vec![NewLineItem {
            discount: Some(DiscountPolicy {
                kind: DiscountKind::Percent,
                value_1: Some(Decimal::from(10)),
                value_2: None,
                max_per_client: None,
            }),
            ..item(30, 3)
        }];
        let order = api.place_order(req).await.unwrap();
        // 90.00 less 10%
        assert_eq!(order.items[0].total, Money::from_major(81));
        assert_eq!(order.market_amount, Money::from_major(81));
        assert_eq!(order.total, Money::from_major(91));
    }

    #[tokio::test]
    async fn spent_credit_reduces_the_charge() {
        let db = MemoryDatabase::default();
        let api = api(db, MemoryGateway::default());
        let mut req = request("o1", PaymentMethod::Cash);
        req.credit_used = Some(Money::from_major(25));
        let order = api.place_order(req).await.unwrap();
        assert_eq!(order.total, Money::from_major(75));
        assert_eq!(order.credit_used, Some(Money::from_major(25)));
    }

    #[tokio::test]
    async fn empty_orders_are_rejected() {
        let api = api(MemoryDatabase::default(), MemoryGateway::default());
        let mut req = request("o1", PaymentMethod::Cash);
        req.items = vec![];
        let err = api.place_order(req).await.unwrap_err();
        assert!(matches!(err, OrderFlowError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn completion_requires_a_matching_token() {
        let db = MemoryDatabase::default();
        let api = api(db.clone(), MemoryGateway::default());
        db.push_order(crate::test_utils::fixtures::order("o1", OrderStatus::DeliveryPending)).await;
        db.push_order(crate::test_utils::fixtures::order("o2", OrderStatus::DeliveryPending)).await;

        let token = api.issue_completion_token(&"o1".into(), None).await.unwrap();
        let err = api.complete_delivery(&"o2".into(), &token).await.unwrap_err();
        assert!(matches!(err, OrderFlowError::Token(_)));

        let order = api.complete_delivery(&"o1".into(), &token).await.unwrap();
        assert_eq!(order.status, OrderStatus::Completing);
    }

    #[tokio::test]
    async fn completion_token_records_the_missing_items() {
        let db = MemoryDatabase::default();
        db.register_market(&"market-a".into(), "wallet-a").await.unwrap();
        let api = api(db.clone(), MemoryGateway::default());
        db.push_order(crate::test_utils::fixtures::order("o1", OrderStatus::DeliveryPending)).await;
        let missing =
            vec![MissingItem { product_id: "prod-1".to_string(), price: Money::from_major(10), quantity: 1 }];
        let token = api.issue_completion_token(&"o1".into(), Some(missing.clone())).await.unwrap();
        let order = api.complete_delivery(&"o1".into(), &token).await.unwrap();
        assert_eq!(order.missing_items, Some(missing));
    }

    #[tokio::test]
    async fn tokens_are_only_issued_while_out_for_delivery() {
        let db = MemoryDatabase::default();
        let api = api(db.clone(), MemoryGateway::default());
        db.push_order(crate::test_utils::fixtures::order("o1", OrderStatus::Processing)).await;
        let err = api.issue_completion_token(&"o1".into(), None).await.unwrap_err();
        assert!(matches!(err, OrderFlowError::Conflict { .. }));
    }

    #[tokio::test]
    async fn customers_cannot_cancel_foreign_orders() {
        let db = MemoryDatabase::default();
        let api = api(db.clone(), MemoryGateway::default());
        db.push_order(crate::test_utils::fixtures::order("o1", OrderStatus::Processing)).await;
        let err = api.request_cancellation("someone-else", &"o1".into()).await.unwrap_err();
        assert!(matches!(err, OrderFlowError::OrderNotFound(_)));
    }
}
