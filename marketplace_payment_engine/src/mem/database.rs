use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use mpe_common::Money;
use tokio::sync::Mutex;

use crate::{
    db_types::{MarketId, NewOrder, Order, OrderId, OrderStatus, StatusFields},
    traits::{OrderDatabase, StorageError},
};

#[derive(Default)]
struct Inner {
    orders: Vec<Order>,
    balances: HashMap<String, Money>,
    wallets: HashMap<MarketId, String>,
    earnings: HashMap<(MarketId, String), Money>,
    next_id: i64,
}

/// A vector-backed order store. Orders keep insertion order, which doubles as creation order for the ledger.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDatabase {
    /// Stores a pre-built order as-is (test seeding; bypasses intake pricing).
    pub async fn push_order(&self, mut order: Order) {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        order.id = inner.next_id;
        inner.orders.push(order);
    }

    /// The market's earnings summed across every month bucket.
    pub async fn monthly_earnings(&self, market_id: &MarketId) -> Money {
        let inner = self.inner.lock().await;
        inner.earnings.iter().filter(|((m, _), _)| m == market_id).map(|(_, amount)| *amount).sum()
    }
}

fn apply_fields(order: &mut Order, fields: &StatusFields) {
    if let Some(v) = &fields.payment_id {
        order.payment_id = Some(v.clone());
    }
    if let Some(v) = fields.payment_method {
        order.payment_method = v;
    }
    if let Some(v) = &fields.card_token {
        order.card_token = Some(v.clone());
    }
    if let Some(v) = &fields.payment_description {
        order.payment_description = Some(v.clone());
    }
    if let Some(v) = &fields.pix_code {
        order.pix_code = Some(v.clone());
    }
    if let Some(v) = fields.pix_expires_at {
        order.pix_expires_at = Some(v);
    }
    if let Some(v) = fields.finished_at {
        order.finished_at = Some(v);
    }
    if let Some(v) = fields.customer_debit {
        order.customer_debit = Some(v);
    }
    if let Some(v) = &fields.debit_market_id {
        order.debit_market_id = Some(v.clone());
    }
    if let Some(v) = fields.debit_amount {
        order.debit_amount = Some(v);
    }
    if let Some(v) = &fields.missing_items {
        order.missing_items = Some(v.clone());
    }
}

impl OrderDatabase for MemoryDatabase {
    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), StorageError> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.orders.iter().find(|o| o.order_id == order.order_id) {
            return Ok((existing.clone(), false));
        }
        inner.next_id += 1;
        let order = Order {
            id: inner.next_id,
            order_id: order.order_id,
            market_id: order.market_id,
            customer_id: order.customer_id,
            status: order.status,
            payment_method: order.payment_method,
            paid_in_app: order.paid_in_app,
            payment_id: None,
            payment_description: None,
            card_token: order.card_token,
            pix_code: None,
            pix_expires_at: None,
            total: order.total,
            market_amount: order.market_amount,
            delivery_fee: order.delivery_fee,
            customer_debit: None,
            credit_used: order.credit_used,
            debit_market_id: None,
            debit_amount: None,
            items: order.items,
            missing_items: None,
            finished_at: None,
            created_at: order.created_at,
            updated_at: order.created_at,
        };
        inner.orders.push(order.clone());
        Ok((order, true))
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, StorageError> {
        let inner = self.inner.lock().await;
        Ok(inner.orders.iter().find(|o| &o.order_id == order_id).cloned())
    }

    async fn fetch_order_for_customer(
        &self,
        customer_id: &str,
        order_id: &OrderId,
    ) -> Result<Option<Order>, StorageError> {
        let inner = self.inner.lock().await;
        Ok(inner.orders.iter().find(|o| &o.order_id == order_id && o.customer_id == customer_id).cloned())
    }

    async fn update_order_status(
        &self,
        order_id: &OrderId,
        status: OrderStatus,
        fields: &StatusFields,
    ) -> Result<Order, StorageError> {
        let mut inner = self.inner.lock().await;
        let order = inner
            .orders
            .iter_mut()
            .find(|o| &o.order_id == order_id)
            .ok_or_else(|| StorageError::OrderNotFound(order_id.clone()))?;
        order.status = status;
        apply_fields(order, fields);
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn fetch_orders_in_status(&self, statuses: &[OrderStatus]) -> Result<Vec<Order>, StorageError> {
        let inner = self.inner.lock().await;
        Ok(inner.orders.iter().filter(|o| statuses.contains(&o.status)).cloned().collect())
    }

    async fn fetch_customer_orders(&self, customer_id: &str) -> Result<Vec<Order>, StorageError> {
        let inner = self.inner.lock().await;
        Ok(inner.orders.iter().filter(|o| o.customer_id == customer_id).cloned().collect())
    }

    async fn fetch_customer_balance(&self, customer_id: &str) -> Result<Money, StorageError> {
        let inner = self.inner.lock().await;
        Ok(inner.balances.get(customer_id).copied().unwrap_or(Money::ZERO))
    }

    async fn update_customer_balance(&self, customer_id: &str, balance: Money) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().await;
        inner.balances.insert(customer_id.to_string(), balance);
        Ok(())
    }

    async fn fetch_market_wallet(&self, market_id: &MarketId) -> Result<String, StorageError> {
        let inner = self.inner.lock().await;
        inner.wallets.get(market_id).cloned().ok_or_else(|| StorageError::MarketNotFound(market_id.clone()))
    }

    async fn register_market(&self, market_id: &MarketId, wallet_id: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().await;
        inner.wallets.insert(market_id.clone(), wallet_id.to_string());
        Ok(())
    }

    async fn credit_monthly_earnings(
        &self,
        market_id: &MarketId,
        month: &str,
        amount: Money,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().await;
        let entry =
            inner.earnings.entry((market_id.clone(), month.to_string())).or_insert(Money::ZERO);
        *entry += amount;
        Ok(())
    }
}
