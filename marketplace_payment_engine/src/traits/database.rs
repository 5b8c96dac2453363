use mpe_common::Money;
use thiserror::Error;

use crate::db_types::{MarketId, NewOrder, Order, OrderId, OrderStatus, StatusFields};

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Database failure: {0}")]
    Database(String),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Market {0} is not registered")]
    MarketNotFound(MarketId),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}

/// The persistence contract for the order lifecycle. The relational store is the single source of truth for order
/// status; there is no shared in-process state between workers.
///
/// Implementations must make `update_order_status` an atomic read-modify-write of the order row. Serialization of
/// concurrent updates per order is the coordinator's job (via the lock service), not the store's.
#[allow(async_fn_in_trait)]
pub trait OrderDatabase: Clone + Send + Sync + 'static {
    /// Stores a new order. Idempotent: if the order id already exists the stored order is returned with `false`.
    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), StorageError>;

    fn fetch_order(
        &self,
        order_id: &OrderId,
    ) -> impl std::future::Future<Output = Result<Option<Order>, StorageError>> + Send;

    /// Like [`OrderDatabase::fetch_order`], but scoped to the owning customer so one customer can never act on
    /// another customer's order.
    fn fetch_order_for_customer(
        &self,
        customer_id: &str,
        order_id: &OrderId,
    ) -> impl std::future::Future<Output = Result<Option<Order>, StorageError>> + Send;

    /// Persists `status` plus any `Some` fields of `fields` in one atomic statement, returning the stored order.
    fn update_order_status(
        &self,
        order_id: &OrderId,
        status: OrderStatus,
        fields: &StatusFields,
    ) -> impl std::future::Future<Output = Result<Order, StorageError>> + Send;

    /// All orders currently in one of the given statuses, oldest first. Feeds the re-drive scan.
    fn fetch_orders_in_status(
        &self,
        statuses: &[OrderStatus],
    ) -> impl std::future::Future<Output = Result<Vec<Order>, StorageError>> + Send;

    /// A customer's full order history in creation order. The credit ledger is derived from this; it is not a
    /// separate stored entity.
    fn fetch_customer_orders(
        &self,
        customer_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Order>, StorageError>> + Send;

    /// The customer's stored running balance (zero when the customer has no ledger history yet).
    fn fetch_customer_balance(
        &self,
        customer_id: &str,
    ) -> impl std::future::Future<Output = Result<Money, StorageError>> + Send;

    fn update_customer_balance(
        &self,
        customer_id: &str,
        balance: Money,
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// The gateway payout wallet for a market. Missing markets are an error, not `None`: no order can exist for an
    /// unregistered market.
    fn fetch_market_wallet(
        &self,
        market_id: &MarketId,
    ) -> impl std::future::Future<Output = Result<String, StorageError>> + Send;

    async fn register_market(&self, market_id: &MarketId, wallet_id: &str) -> Result<(), StorageError>;

    /// Atomically adds `amount` to the market's earnings aggregate for the given `YYYY-MM` month key.
    fn credit_monthly_earnings(
        &self,
        market_id: &MarketId,
        month: &str,
        amount: Money,
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;
}
