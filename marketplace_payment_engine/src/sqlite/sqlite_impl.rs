//! `SqliteDatabase` is the concrete [`OrderDatabase`] backend over SQLite.

use std::fmt::Debug;

use mpe_common::Money;
use sqlx::SqlitePool;

use super::db::{db_url, ledger, new_pool, orders};
use crate::{
    db_types::{MarketId, NewOrder, Order, OrderId, OrderStatus, StatusFields},
    traits::{OrderDatabase, StorageError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connects to the database named by `MPE_DATABASE_URL` (or the bundled default path).
    pub async fn new_default() -> Result<Self, StorageError> {
        Self::new_with_url(&db_url(), 25).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl OrderDatabase for SqliteDatabase {
    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), StorageError> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::from)?;
        orders::idempotent_insert(order, &mut conn).await
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::from)?;
        orders::fetch_order_by_order_id(order_id, &mut conn).await
    }

    async fn fetch_order_for_customer(
        &self,
        customer_id: &str,
        order_id: &OrderId,
    ) -> Result<Option<Order>, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::from)?;
        orders::fetch_order_for_customer(customer_id, order_id, &mut conn).await
    }

    async fn update_order_status(
        &self,
        order_id: &OrderId,
        status: OrderStatus,
        fields: &StatusFields,
    ) -> Result<Order, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::from)?;
        orders::update_order_status(order_id, status, fields, &mut conn).await
    }

    async fn fetch_orders_in_status(&self, statuses: &[OrderStatus]) -> Result<Vec<Order>, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::from)?;
        orders::fetch_orders_in_status(statuses, &mut conn).await
    }

    async fn fetch_customer_orders(&self, customer_id: &str) -> Result<Vec<Order>, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::from)?;
        orders::fetch_customer_orders(customer_id, &mut conn).await
    }

    async fn fetch_customer_balance(&self, customer_id: &str) -> Result<Money, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::from)?;
        ledger::fetch_customer_balance(customer_id, &mut conn).await
    }

    async fn update_customer_balance(&self, customer_id: &str, balance: Money) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::from)?;
        ledger::update_customer_balance(customer_id, balance, &mut conn).await
    }

    async fn fetch_market_wallet(&self, market_id: &MarketId) -> Result<String, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::from)?;
        ledger::fetch_market_wallet(market_id, &mut conn).await
    }

    async fn register_market(&self, market_id: &MarketId, wallet_id: &str) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::from)?;
        ledger::register_market(market_id, wallet_id, &mut conn).await
    }

    async fn credit_monthly_earnings(
        &self,
        market_id: &MarketId,
        month: &str,
        amount: Money,
    ) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::from)?;
        ledger::credit_monthly_earnings(market_id, month, amount, &mut conn).await
    }
}
