//! The subset of the third-party payment gateway's API that the engine consumes.

use chrono::{DateTime, Utc};
use mpe_common::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::PaymentMethod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayPaymentStatus {
    /// Awaiting customer action (e.g. an unpaid Pix code).
    Pending,
    /// Past its due date without settling.
    Overdue,
    /// Settled.
    Confirmed,
    /// Settled and the funds have landed.
    Received,
    Refunded,
}

impl GatewayPaymentStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, GatewayPaymentStatus::Confirmed | GatewayPaymentStatus::Received)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillingType {
    CreditCard,
    Pix,
    Boleto,
}

impl BillingType {
    /// Maps the gateway's billing type back to the in-app payment method. The gateway never issues boleto charges
    /// for marketplace orders, so seeing one is a data-integrity failure, not a supported case.
    pub fn payment_method(&self) -> Option<PaymentMethod> {
        match self {
            BillingType::CreditCard => Some(PaymentMethod::Card),
            BillingType::Pix => Some(PaymentMethod::Pix),
            BillingType::Boleto => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPayment {
    pub id: String,
    pub status: GatewayPaymentStatus,
    pub billing_type: BillingType,
    pub external_ref: String,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixData {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// One leg of a split payment: `amount` of the charge is routed to `wallet_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSplit {
    pub wallet_id: String,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewGatewayPayment {
    pub customer_id: String,
    pub billing_type: BillingType,
    pub amount: Money,
    pub due_date: DateTime<Utc>,
    /// Our order id; lets webhooks and the decision function find the charge again.
    pub external_ref: String,
    pub splits: Vec<PaymentSplit>,
    pub card_token: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayCustomer {
    pub id: String,
    /// Tax document (CPF/CNPJ). The gateway refuses Pix charges for payers without one.
    pub document: Option<String>,
}

/// A transfer between the platform's escrow balance and a market's payout wallet.
#[derive(Debug, Clone, PartialEq)]
pub enum WalletTransfer {
    EscrowToWallet { wallet_id: String, amount: Money },
    WalletToEscrow { wallet_id: String, amount: Money },
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// A business rejection, distinguishable from infrastructure failures: the charge itself was declined.
    #[error("The card was declined by the gateway: {0}")]
    InvalidCard(String),
    #[error("Gateway object not found: {0}")]
    NotFound(String),
    #[error("Gateway API failure: {0}")]
    Api(String),
}

#[allow(async_fn_in_trait)]
pub trait PaymentGateway: Clone + Send + Sync + 'static {
    fn find_customer(
        &self,
        customer_id: &str,
    ) -> impl std::future::Future<Output = Result<GatewayCustomer, GatewayError>> + Send;

    fn create_payment(
        &self,
        payment: NewGatewayPayment,
    ) -> impl std::future::Future<Output = Result<GatewayPayment, GatewayError>> + Send;

    /// All gateway payments carrying the given external reference. More than one is a data-integrity anomaly
    /// the caller must log and survive.
    fn find_payments_by_external_ref(
        &self,
        external_ref: &str,
    ) -> impl std::future::Future<Output = Result<Vec<GatewayPayment>, GatewayError>> + Send;

    fn delete_payment(&self, payment_id: &str) -> impl std::future::Future<Output = Result<(), GatewayError>> + Send;

    fn refund_payment(&self, payment_id: &str) -> impl std::future::Future<Output = Result<(), GatewayError>> + Send;

    fn find_pix_data(
        &self,
        payment_id: &str,
    ) -> impl std::future::Future<Output = Result<PixData, GatewayError>> + Send;

    fn transfer(&self, transfer: WalletTransfer) -> impl std::future::Future<Output = Result<(), GatewayError>> + Send;
}
