use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use mpe_common::Money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

//--------------------------------------       OrderId       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------       MarketId       --------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct MarketId(pub String);

impl MarketId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MarketId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MarketId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for MarketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------     OrderStatus       -------------------------------------------------------
/// The lifecycle status of an order. Only the [`crate::coordinator::OrderStatusCoordinator`] may move an order
/// between statuses, and only along the transitions in [`crate::state_machine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Payment is being created or collected through the gateway.
    PaymentProcessing,
    /// The gateway rejected the charge (e.g. invalid card). The customer may retry.
    PaymentFailed,
    /// Payment needs a customer-side step to settle, e.g. paying a Pix code.
    PaymentRequireAction,
    /// Paid (or cash), waiting for the market to accept the order.
    ApprovalPending,
    /// Accepted by the market and being prepared.
    Processing,
    /// Out for delivery.
    DeliveryPending,
    /// Delivery confirmed; ledger reconciliation in flight.
    Completing,
    /// Terminal.
    Completed,
    /// Cancellation requested; refunds/reversals in flight.
    Canceling,
    /// Terminal.
    Canceled,
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order status: {0}")]
pub struct StatusConversionError(String);

impl FromStr for OrderStatus {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PaymentProcessing" => Ok(Self::PaymentProcessing),
            "PaymentFailed" => Ok(Self::PaymentFailed),
            "PaymentRequireAction" => Ok(Self::PaymentRequireAction),
            "ApprovalPending" => Ok(Self::ApprovalPending),
            "Processing" => Ok(Self::Processing),
            "DeliveryPending" => Ok(Self::DeliveryPending),
            "Completing" => Ok(Self::Completing),
            "Completed" => Ok(Self::Completed),
            "Canceling" => Ok(Self::Canceling),
            "Canceled" => Ok(Self::Canceled),
            s => Err(StatusConversionError(s.to_string())),
        }
    }
}

//--------------------------------------     OrderAction       -------------------------------------------------------
/// An action requested against an order, from any trigger source (customer/market actions, gateway webhooks,
/// async jobs, the re-drive timer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderAction {
    ProcessPayment,
    ConfirmPayment,
    QuasiConfirmPayment,
    FailPayment,
    Approve,
    Delivery,
    Complete,
    Cancel,
    MarkAsCompleted,
    MarkAsCanceled,
}

impl Display for OrderAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

//--------------------------------------    PaymentMethod      -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentMethod {
    Card,
    Pix,
    Cash,
}

impl PaymentMethod {
    /// Whether this method is collected through the in-app gateway.
    pub fn paid_in_app(&self) -> bool {
        !matches!(self, PaymentMethod::Cash)
    }
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

//--------------------------------------   DiscountPolicy      -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscountKind {
    /// `value_1` percent off every eligible unit.
    Percent,
    /// `value_1` percent off every second unit, active from a minimum quantity of `value_2`.
    PercentOnSecond,
    /// `value_1` currency units off every eligible unit.
    FixedValue,
    /// One unit free for every `value_1` units bought.
    OneFree,
}

/// A discount policy snapshot taken at order time. The parameters are copied onto the line item so later catalog
/// edits never change what a customer was charged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountPolicy {
    pub kind: DiscountKind,
    pub value_1: Option<Decimal>,
    pub value_2: Option<Decimal>,
    /// Caps how many units (or free units, for [`DiscountKind::OneFree`]) the discount applies to.
    pub max_per_client: Option<i64>,
}

//--------------------------------------       LineItem        -------------------------------------------------------
/// A component of a kit line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KitComponent {
    pub product_id: String,
    pub quantity: i64,
}

/// A line item with its price and discount snapshot. Immutable once the order is created; `total` is the charged
/// amount computed by the discount engine at order time and is never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    pub unit_price: Money,
    pub quantity: i64,
    pub discount: Option<DiscountPolicy>,
    pub kit_items: Option<Vec<KitComponent>>,
    pub total: Money,
}

//--------------------------------------     MissingItem       -------------------------------------------------------
/// A delivered-quantity delta recorded when the market completes an order. `quantity` is the undelivered count
/// (negative when more was delivered than ordered).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingItem {
    pub product_id: String,
    pub price: Money,
    pub quantity: i64,
}

//--------------------------------------        Order          -------------------------------------------------------
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub market_id: MarketId,
    pub customer_id: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub paid_in_app: bool,
    /// Gateway reference for the charge, once one exists.
    pub payment_id: Option<String>,
    /// Statement descriptor attached to the gateway charge.
    pub payment_description: Option<String>,
    pub card_token: Option<String>,
    pub pix_code: Option<String>,
    pub pix_expires_at: Option<DateTime<Utc>>,
    pub total: Money,
    pub market_amount: Money,
    pub delivery_fee: Money,
    /// Signed amount this order contributed to the customer's credit ledger, written once when the order completes.
    pub customer_debit: Option<Money>,
    /// Standing credit consumed by this order at checkout.
    pub credit_used: Option<Money>,
    /// Which market this order settled a standing debt for. Set together with `debit_amount` or not at all.
    pub debit_market_id: Option<MarketId>,
    pub debit_amount: Option<Money>,
    pub items: Vec<LineItem>,
    pub missing_items: Option<Vec<MissingItem>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------       NewOrder        -------------------------------------------------------
/// A fully priced order ready for insertion. Built by [`crate::api::OrderFlowApi::place_order`]; the line-item
/// totals have already been through the discount engine.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub market_id: MarketId,
    pub customer_id: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub paid_in_app: bool,
    pub card_token: Option<String>,
    pub total: Money,
    pub market_amount: Money,
    pub delivery_fee: Money,
    pub credit_used: Option<Money>,
    pub items: Vec<LineItem>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------     StatusFields      -------------------------------------------------------
/// Extra fields persisted along with a status transition. `None` leaves the stored column untouched.
///
/// Only the subset in [`crate::events::OrderUpdatedEvent`] is ever shown to subscribers; the rest is engine
/// bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct StatusFields {
    pub payment_id: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub card_token: Option<String>,
    pub payment_description: Option<String>,
    pub pix_code: Option<String>,
    pub pix_expires_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub customer_debit: Option<Money>,
    pub debit_market_id: Option<MarketId>,
    pub debit_amount: Option<Money>,
    pub missing_items: Option<Vec<MissingItem>>,
}
