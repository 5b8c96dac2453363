use chrono::Utc;
use log::*;
use mpe_common::Money;

use crate::{
    coordinator::OrderStatusCoordinator,
    db_types::{Order, OrderAction, OrderId, OrderStatus, StatusFields},
    helpers::month_key,
    ledger,
    traits::{LockService, OrderDatabase, PaymentGateway, WalletTransfer},
    OrderFlowError,
};

/// Finishes an order in `Completing`: reconciles the customer's credit ledger against any recorded missing items,
/// moves funds between the platform escrow and the market's payout wallet, credits the market's monthly earnings
/// and marks the order completed.
pub struct CompletionWorkflow<B, L, G> {
    db: B,
    gateway: G,
    coordinator: OrderStatusCoordinator<B, L>,
}

impl<B, L, G> CompletionWorkflow<B, L, G>
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
        if order.status != OrderStatus::Completing {
            // duplicate trigger (webhook replay, re-drive); the first run already did the work
            debug!("🏁️ Order [{order_id}] is in {}; completion is a no-op", order.status);
            return Ok(());
        }

        let mut fields = StatusFields { finished_at: Some(Utc::now()), ..Default::default() };
        let missing = order.missing_items.as_deref().unwrap_or_default();
        if !missing.is_empty() {
            let delta: Money = missing.iter().map(|item| item.price * item.quantity).sum();
            info!("🏁️ Order [{order_id}] completed with missing items; ledger delta is {delta}");
            fields.customer_debit = Some(delta);
            self.reconcile(&order, delta).await?;
        }

        if order.paid_in_app {
            self.db
                .credit_monthly_earnings(&order.market_id, &month_key(Utc::now()), order.market_amount)
                .await?;
        }
        self.coordinator.update(order_id, OrderAction::MarkAsCompleted, fields).await?;
        Ok(())
    }

    /// Updates the customer's stored running balance and settles funds between escrow and the market.
    ///
    /// The ledger balance is derived before this order's delta becomes visible in the aggregate: the order is
    /// still `Completing` and its `customer_debit` is only persisted by the final transition.
    async fn reconcile(&self, order: &Order, delta: Money) -> Result<(), OrderFlowError> {
        let history = self.db.fetch_customer_orders(&order.customer_id).await?;
        let current = ledger::total_balance(&history);
        let stored = self.db.fetch_customer_balance(&order.customer_id).await?;
        if stored != current {
            // fail open with an audit trail; the derived history wins
            error!(
                "📒️ Data integrity: customer [{}] has stored balance {stored} but the order history yields \
                 {current}",
                order.customer_id
            );
        }
        self.db.update_customer_balance(&order.customer_id, current + delta).await?;

        let wallet_id = self.db.fetch_market_wallet(&order.market_id).await?;
        if delta.is_negative() && current > Money::ZERO {
            // the customer owes this market and has standing credit: pay the market out of escrow
            let settled = current.min(delta.abs());
            debug!("📒️ Transferring {settled} from escrow to market [{}]", order.market_id);
            self.gateway.transfer(WalletTransfer::EscrowToWallet { wallet_id, amount: settled }).await?;
        } else if delta > Money::ZERO {
            // the customer was under-delivered: the market funds the credit
            debug!("📒️ Transferring {delta} from market [{}] to escrow", order.market_id);
            self.gateway.transfer(WalletTransfer::WalletToEscrow { wallet_id, amount: delta }).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use mpe_common::Money;

    use super::*;
    use crate::{
        db_types::MissingItem,
        events::EventProducers,
        mem::{MemoryDatabase, MemoryGateway, MemoryLockService},
        test_utils::fixtures,
    };

    fn workflow(
        db: MemoryDatabase,
        gateway: MemoryGateway,
    ) -> CompletionWorkflow<MemoryDatabase, MemoryLockService, MemoryGateway> {
        let coordinator =
            OrderStatusCoordinator::new(db.clone(), MemoryLockService::default(), EventProducers::default());
        CompletionWorkflow::new(db, gateway, coordinator)
    }

    fn missing(price: i64, quantity: i64) -> MissingItem {
        MissingItem { product_id: "prod-1".to_string(), price: Money::from_major(price), quantity }
    }

    #[tokio::test]
    async fn completion_without_missing_items_skips_the_transfer_branch() {
        let db = MemoryDatabase::default();
        let gateway = MemoryGateway::default();
        db.register_market(&"market-a".into(), "wallet-a").await.unwrap();
        db.push_order(fixtures::order("o1", OrderStatus::Completing)).await;
        workflow(db.clone(), gateway.clone()).exec(&"o1".into()).await.unwrap();

        let order = db.fetch_order(&"o1".into()).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert!(order.finished_at.is_some());
        assert_eq!(order.customer_debit, None);
        assert!(gateway.transfers().await.is_empty());
        // the market's payout aggregate was still credited
        assert_eq!(db.monthly_earnings(&"market-a".into()).await, Money::from_major(90));
    }

    #[tokio::test]
    async fn completion_is_idempotent_past_completing() {
        let db = MemoryDatabase::default();
        let gateway = MemoryGateway::default();
        db.push_order(fixtures::order("o1", OrderStatus::Completed)).await;
        workflow(db.clone(), gateway.clone()).exec(&"o1".into()).await.unwrap();
        assert!(gateway.transfers().await.is_empty());
        assert_eq!(db.monthly_earnings(&"market-a".into()).await, Money::ZERO);
    }

    #[tokio::test]
    async fn under_delivery_moves_funds_from_market_to_escrow() {
        let db = MemoryDatabase::default();
        let gateway = MemoryGateway::default();
        db.register_market(&"market-a".into(), "wallet-a").await.unwrap();
        let mut order = fixtures::order("o1", OrderStatus::Completing);
        // one unit of a 10.00 product was not delivered
        order.missing_items = Some(vec![missing(10, 1)]);
        db.push_order(order).await;
        workflow(db.clone(), gateway.clone()).exec(&"o1".into()).await.unwrap();

        let order = db.fetch_order(&"o1".into()).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.customer_debit, Some(Money::from_major(10)));
        assert_eq!(db.fetch_customer_balance("cust-1").await.unwrap(), Money::from_major(10));
        assert_eq!(
            gateway.transfers().await,
            vec![WalletTransfer::WalletToEscrow { wallet_id: "wallet-a".to_string(), amount: Money::from_major(10) }]
        );
    }

    #[tokio::test]
    async fn over_delivery_settles_against_standing_credit() {
        let db = MemoryDatabase::default();
        let gateway = MemoryGateway::default();
        db.register_market(&"market-a".into(), "wallet-a").await.unwrap();
        // the customer holds a credit of 10 from an earlier under-delivery
        let mut credit = fixtures::order("old", OrderStatus::Completed);
        credit.customer_debit = Some(Money::from_major(10));
        db.push_order(credit).await;
        db.update_customer_balance("cust-1", Money::from_major(10)).await.unwrap();
        // this order delivered 15.00 more than was ordered
        let mut order = fixtures::order("o1", OrderStatus::Completing);
        order.missing_items = Some(vec![missing(15, -1)]);
        db.push_order(order).await;
        workflow(db.clone(), gateway.clone()).exec(&"o1".into()).await.unwrap();

        // only the available credit is paid out, not the full 15
        assert_eq!(
            gateway.transfers().await,
            vec![WalletTransfer::EscrowToWallet { wallet_id: "wallet-a".to_string(), amount: Money::from_major(10) }]
        );
        assert_eq!(db.fetch_customer_balance("cust-1").await.unwrap(), Money::from_major(-5));
    }
}
