use chrono::{Duration, Utc};
use log::*;

use crate::{
    coordinator::OrderStatusCoordinator,
    db_types::{Order, OrderAction, OrderId, OrderStatus, PaymentMethod, StatusFields},
    ledger,
    traits::{
        BillingType,
        GatewayError,
        GatewayPayment,
        GatewayPaymentStatus,
        LockService,
        NewGatewayPayment,
        OrderDatabase,
        PaymentGateway,
        PaymentSplit,
        PixData,
    },
    OrderFlowError,
};

/// How long a charge stays payable before the gateway marks it overdue.
const PAYMENT_DUE: Duration = Duration::days(1);

/// The next step for an order in payment processing, decided from the gateway's view of the charge.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentDecision {
    /// No gateway charge exists yet.
    Create,
    /// The existing charge is stale; delete it and create a fresh one.
    Recreate { payment_id: String },
    /// The charge already tells us what the order's next transition is.
    Update {
        action: OrderAction,
        payment_id: String,
        payment_method: Option<PaymentMethod>,
        pix: Option<PixData>,
    },
    /// Nothing to do (the order has already moved on).
    None,
}

/// Decides the next payment step for `order` given the gateway payments carrying its external reference.
pub async fn decide<G: PaymentGateway>(
    order: &Order,
    payments: &[GatewayPayment],
    gateway: &G,
) -> Result<PaymentDecision, OrderFlowError> {
    if order.status != OrderStatus::PaymentProcessing {
        return Ok(PaymentDecision::None);
    }
    if payments.len() > 1 {
        error!(
            "💳️ Data integrity: order [{}] has {} gateway payments; proceeding with the first",
            order.order_id,
            payments.len()
        );
    }
    let payment = match payments.first() {
        Some(payment) => payment,
        None => return Ok(PaymentDecision::Create),
    };
    match payment.status {
        GatewayPaymentStatus::Overdue => Ok(PaymentDecision::Recreate { payment_id: payment.id.clone() }),
        GatewayPaymentStatus::Pending => {
            if order.payment_method == PaymentMethod::Pix {
                let pix = gateway.find_pix_data(&payment.id).await?;
                Ok(PaymentDecision::Update {
                    action: OrderAction::QuasiConfirmPayment,
                    payment_id: payment.id.clone(),
                    payment_method: None,
                    pix: Some(pix),
                })
            } else {
                // a pending card charge is not expected; treat it as stale
                Ok(PaymentDecision::Recreate { payment_id: payment.id.clone() })
            }
        },
        _ => {
            let method = payment.billing_type.payment_method().ok_or_else(|| {
                OrderFlowError::InvariantViolation(format!(
                    "gateway payment {} for order [{}] settled with unsupported billing type {:?}",
                    payment.id, order.order_id, payment.billing_type
                ))
            })?;
            Ok(PaymentDecision::Update {
                action: OrderAction::ConfirmPayment,
                payment_id: payment.id.clone(),
                payment_method: Some(method),
                pix: None,
            })
        },
    }
}

/// Drives an order in `PaymentProcessing` to its next status by creating, recreating or reading back the gateway
/// charge. Any standing debt the customer has (to any market) is settled alongside the new charge via a split.
pub struct PayOrderWorkflow<B, L, G> {
    db: B,
    gateway: G,
    coordinator: OrderStatusCoordinator<B, L>,
}

impl<B, L, G> PayOrderWorkflow<B, L, G>
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
        let payments = self.gateway.find_payments_by_external_ref(order.order_id.as_str()).await?;
        match decide(&order, &payments, &self.gateway).await? {
            PaymentDecision::None => {
                debug!("💳️ Order [{order_id}] needs no payment work (status {})", order.status);
                Ok(())
            },
            PaymentDecision::Create => self.create_payment(&order).await,
            PaymentDecision::Recreate { payment_id } => {
                info!("💳️ Recreating stale gateway payment {payment_id} for order [{order_id}]");
                self.gateway.delete_payment(&payment_id).await?;
                self.create_payment(&order).await
            },
            PaymentDecision::Update { action, payment_id, payment_method, pix } => {
                let fields = StatusFields {
                    payment_id: Some(payment_id),
                    payment_method,
                    pix_code: pix.as_ref().map(|p| p.code.clone()),
                    pix_expires_at: pix.as_ref().map(|p| p.expires_at),
                    ..Default::default()
                };
                self.coordinator.update(&order.order_id, action, fields).await?;
                Ok(())
            },
        }
    }

    async fn create_payment(&self, order: &Order) -> Result<(), OrderFlowError> {
        let billing_type = match order.payment_method {
            PaymentMethod::Card => BillingType::CreditCard,
            PaymentMethod::Pix => BillingType::Pix,
            PaymentMethod::Cash => {
                return Err(OrderFlowError::InvariantViolation(format!(
                    "cash order [{}] reached the payment workflow",
                    order.order_id
                )))
            },
        };
        if order.payment_method == PaymentMethod::Pix {
            // the gateway cannot charge Pix for a payer without a tax document
            let customer = self.gateway.find_customer(&order.customer_id).await?;
            if customer.document.is_none() {
                return Err(OrderFlowError::PayerDocumentMissing(order.customer_id.clone()));
            }
        }

        // Settle the customer's standing debt (if any) on the back of this charge.
        let history = self.db.fetch_customer_orders(&order.customer_id).await?;
        let debt = ledger::find_first_debit(&history);
        let mut amount = order.total;
        let market_wallet = self.db.fetch_market_wallet(&order.market_id).await?;
        let mut splits = vec![PaymentSplit { wallet_id: market_wallet, amount: order.market_amount }];
        if let Some(debt) = &debt {
            debug!(
                "💳️ Order [{}] also settles a debt of {} owed to market [{}]",
                order.order_id, debt.amount, debt.market_id
            );
            amount += debt.amount;
            let debt_wallet = self.db.fetch_market_wallet(&debt.market_id).await?;
            splits.push(PaymentSplit { wallet_id: debt_wallet, amount: debt.amount });
        }

        let description = format!("Marketplace order {}", order.order_id);
        let request = NewGatewayPayment {
            customer_id: order.customer_id.clone(),
            billing_type,
            amount,
            due_date: Utc::now() + PAYMENT_DUE,
            external_ref: order.order_id.as_str().to_string(),
            splits,
            card_token: order.card_token.clone(),
            description: Some(description.clone()),
        };
        let payment = match self.gateway.create_payment(request).await {
            Ok(payment) => payment,
            Err(GatewayError::InvalidCard(reason)) => {
                // a business rejection, not an infrastructure failure
                warn!("💳️ Card declined for order [{}]: {reason}", order.order_id);
                self.coordinator
                    .update(&order.order_id, OrderAction::FailPayment, StatusFields::default())
                    .await?;
                return Ok(());
            },
            Err(e) => return Err(e.into()),
        };

        let mut fields = StatusFields {
            payment_id: Some(payment.id.clone()),
            payment_description: Some(description),
            ..Default::default()
        };
        if let Some(debt) = debt {
            fields.debit_market_id = Some(debt.market_id);
            fields.debit_amount = Some(debt.amount);
        }
        let action = match payment.billing_type {
            // card capture is synchronous, so the charge is already settled
            BillingType::CreditCard => OrderAction::ConfirmPayment,
            BillingType::Pix => {
                let pix = self.gateway.find_pix_data(&payment.id).await?;
                fields.pix_code = Some(pix.code);
                fields.pix_expires_at = Some(pix.expires_at);
                OrderAction::QuasiConfirmPayment
            },
            BillingType::Boleto => {
                return Err(OrderFlowError::InvariantViolation(format!(
                    "gateway created a boleto charge for order [{}]",
                    order.order_id
                )))
            },
        };
        self.coordinator.update(&order.order_id, action, fields).await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        coordinator::OrderStatusCoordinator,
        events::EventProducers,
        mem::{MemoryDatabase, MemoryGateway, MemoryLockService},
        test_utils::fixtures,
    };

    fn workflow(
        db: MemoryDatabase,
        gateway: MemoryGateway,
    ) -> PayOrderWorkflow<MemoryDatabase, MemoryLockService, MemoryGateway> {
        let coordinator =
            OrderStatusCoordinator::new(db.clone(), MemoryLockService::default(), EventProducers::default());
        PayOrderWorkflow::new(db, gateway, coordinator)
    }

    fn payment(id: &str, status: GatewayPaymentStatus, billing_type: BillingType) -> GatewayPayment {
        GatewayPayment {
            id: id.to_string(),
            status,
            billing_type,
            external_ref: "o1".to_string(),
            amount: mpe_common::Money::from_major(100),
        }
    }

    #[tokio::test]
    async fn decide_skips_orders_past_payment_processing() {
        let gateway = MemoryGateway::default();
        let order = fixtures::order("o1", OrderStatus::ApprovalPending);
        let decision = decide(&order, &[], &gateway).await.unwrap();
        assert_eq!(decision, PaymentDecision::None);
    }

    #[tokio::test]
    async fn decide_creates_when_no_payment_exists() {
        let gateway = MemoryGateway::default();
        let order = fixtures::order("o1", OrderStatus::PaymentProcessing);
        let decision = decide(&order, &[], &gateway).await.unwrap();
        assert_eq!(decision, PaymentDecision::Create);
    }

    #[tokio::test]
    async fn decide_recreates_overdue_payments() {
        let gateway = MemoryGateway::default();
        let order = fixtures::order("o1", OrderStatus::PaymentProcessing);
        let p = payment("pay_1", GatewayPaymentStatus::Overdue, BillingType::Pix);
        let decision = decide(&order, &[p], &gateway).await.unwrap();
        assert_eq!(decision, PaymentDecision::Recreate { payment_id: "pay_1".to_string() });
    }

    #[tokio::test]
    async fn decide_recreates_pending_card_charges() {
        let gateway = MemoryGateway::default();
        let order = fixtures::order("o1", OrderStatus::PaymentProcessing);
        let p = payment("pay_1", GatewayPaymentStatus::Pending, BillingType::CreditCard);
        let decision = decide(&order, &[p], &gateway).await.unwrap();
        assert_eq!(decision, PaymentDecision::Recreate { payment_id: "pay_1".to_string() });
    }

    #[tokio::test]
    async fn decide_quasi_confirms_pending_pix() {
        let gateway = MemoryGateway::default();
        let mut order = fixtures::order("o1", OrderStatus::PaymentProcessing);
        order.payment_method = PaymentMethod::Pix;
        let p = payment("pay_1", GatewayPaymentStatus::Pending, BillingType::Pix);
        gateway.push_pix_data("pay_1", "pix-code-1").await;
        match decide(&order, &[p], &gateway).await.unwrap() {
            PaymentDecision::Update { action, payment_id, pix, .. } => {
                assert_eq!(action, OrderAction::QuasiConfirmPayment);
                assert_eq!(payment_id, "pay_1");
                assert_eq!(pix.unwrap().code, "pix-code-1");
            },
            other => panic!("expected Update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn decide_confirms_settled_payments_with_the_gateway_billing_type() {
        let gateway = MemoryGateway::default();
        let order = fixtures::order("o1", OrderStatus::PaymentProcessing);
        let p = payment("pay_1", GatewayPaymentStatus::Confirmed, BillingType::Pix);
        match decide(&order, &[p], &gateway).await.unwrap() {
            PaymentDecision::Update { action, payment_method, .. } => {
                assert_eq!(action, OrderAction::ConfirmPayment);
                assert_eq!(payment_method, Some(PaymentMethod::Pix));
            },
            other => panic!("expected Update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn decide_survives_duplicate_gateway_payments() {
        let gateway = MemoryGateway::default();
        let order = fixtures::order("o1", OrderStatus::PaymentProcessing);
        let first = payment("pay_1", GatewayPaymentStatus::Confirmed, BillingType::CreditCard);
        let second = payment("pay_2", GatewayPaymentStatus::Pending, BillingType::CreditCard);
        match decide(&order, &[first, second], &gateway).await.unwrap() {
            PaymentDecision::Update { payment_id, .. } => assert_eq!(payment_id, "pay_1"),
            other => panic!("expected Update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stale_charges_are_deleted_and_recreated() {
        let db = MemoryDatabase::default();
        let gateway = MemoryGateway::default();
        db.register_market(&"market-a".into(), "wallet-a").await.unwrap();
        db.push_order(fixtures::order("o1", OrderStatus::PaymentProcessing)).await;
        gateway.push_payment(payment("pay_stale", GatewayPaymentStatus::Overdue, BillingType::CreditCard)).await;
        workflow(db.clone(), gateway.clone()).exec(&"o1".into()).await.unwrap();

        assert_eq!(gateway.deleted().await, vec!["pay_stale".to_string()]);
        let order = db.fetch_order(&"o1".into()).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::ApprovalPending);
        assert_ne!(order.payment_id.as_deref(), Some("pay_stale"));
    }

    #[tokio::test]
    async fn the_charge_description_is_stored_on_the_order() {
        let db = MemoryDatabase::default();
        let gateway = MemoryGateway::default();
        db.register_market(&"market-a".into(), "wallet-a").await.unwrap();
        db.push_order(fixtures::order("o1", OrderStatus::PaymentProcessing)).await;
        workflow(db.clone(), gateway).exec(&"o1".into()).await.unwrap();
        let order = db.fetch_order(&"o1".into()).await.unwrap().unwrap();
        assert_eq!(order.payment_description.as_deref(), Some("Marketplace order o1"));
    }

    #[tokio::test]
    async fn declined_card_fails_the_payment_instead_of_erroring() {
        let db = MemoryDatabase::default();
        let gateway = MemoryGateway::default();
        db.register_market(&"market-a".into(), "wallet-a").await.unwrap();
        db.push_order(fixtures::order("o1", OrderStatus::PaymentProcessing)).await;
        gateway.set_decline_cards(true).await;
        workflow(db.clone(), gateway).exec(&"o1".into()).await.unwrap();
        let order = db.fetch_order(&"o1".into()).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::PaymentFailed);
    }

    #[tokio::test]
    async fn pix_without_document_is_a_hard_error() {
        let db = MemoryDatabase::default();
        let gateway = MemoryGateway::default();
        db.register_market(&"market-a".into(), "wallet-a").await.unwrap();
        let mut order = fixtures::order("o1", OrderStatus::PaymentProcessing);
        order.payment_method = PaymentMethod::Pix;
        db.push_order(order).await;
        gateway.register_customer("cust-1", None).await;
        let err = workflow(db, gateway).exec(&"o1".into()).await.unwrap_err();
        assert!(matches!(err, OrderFlowError::PayerDocumentMissing(_)));
    }

    #[tokio::test]
    async fn standing_debt_rides_along_as_a_second_split() {
        let db = MemoryDatabase::default();
        let gateway = MemoryGateway::default();
        db.register_market(&"market-a".into(), "wallet-a").await.unwrap();
        db.register_market(&"market-b".into(), "wallet-b").await.unwrap();
        // historical debt of 10 to market-b
        let mut debt = fixtures::order("old", OrderStatus::Completed);
        debt.market_id = "market-b".into();
        debt.customer_debit = Some(mpe_common::Money::from_major(-10));
        db.push_order(debt).await;
        db.push_order(fixtures::order("o1", OrderStatus::PaymentProcessing)).await;
        workflow(db.clone(), gateway.clone()).exec(&"o1".into()).await.unwrap();

        let order = db.fetch_order(&"o1".into()).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::ApprovalPending);
        assert_eq!(order.debit_market_id, Some("market-b".into()));
        assert_eq!(order.debit_amount, Some(mpe_common::Money::from_major(10)));

        let created = gateway.payments().await;
        assert_eq!(created.len(), 1);
        // order total 100 plus the 10 owed
        assert_eq!(created[0].amount, mpe_common::Money::from_major(110));
        let splits = gateway.splits_for(&created[0].id).await;
        assert_eq!(splits.len(), 2);
        assert_eq!(splits[1].wallet_id, "wallet-b");
        assert_eq!(splits[1].amount, mpe_common::Money::from_major(10));
    }
}
