use std::{collections::HashMap, sync::Arc};

use chrono::{Duration, Utc};
use tokio::sync::Mutex;

use crate::traits::{
    BillingType,
    GatewayCustomer,
    GatewayError,
    GatewayPayment,
    GatewayPaymentStatus,
    NewGatewayPayment,
    PaymentGateway,
    PaymentSplit,
    PixData,
    WalletTransfer,
};

#[derive(Default)]
struct Inner {
    customers: HashMap<String, GatewayCustomer>,
    decline_cards: bool,
    payments: Vec<GatewayPayment>,
    splits: HashMap<String, Vec<PaymentSplit>>,
    pix: HashMap<String, PixData>,
    transfers: Vec<WalletTransfer>,
    refunds: Vec<String>,
    deleted: Vec<String>,
    next_id: u64,
}

/// A scriptable gateway. Card charges settle synchronously, Pix charges come back `Pending` with a fresh Pix code,
/// and every mutation is recorded for assertions.
#[derive(Clone, Default)]
pub struct MemoryGateway {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryGateway {
    /// Registers the gateway-side customer record. Unregistered customers are auto-created with a document on
    /// first lookup; register with `None` to model a payer without one.
    pub async fn register_customer(&self, customer_id: &str, document: Option<&str>) {
        let customer =
            GatewayCustomer { id: format!("gw_{customer_id}"), document: document.map(String::from) };
        self.inner.lock().await.customers.insert(customer_id.to_string(), customer);
    }

    /// When set, every card charge is rejected as invalid.
    pub async fn set_decline_cards(&self, decline: bool) {
        self.inner.lock().await.decline_cards = decline;
    }

    pub async fn push_pix_data(&self, payment_id: &str, code: &str) {
        let pix = PixData { code: code.to_string(), expires_at: Utc::now() + Duration::hours(1) };
        self.inner.lock().await.pix.insert(payment_id.to_string(), pix);
    }

    /// Seeds a pre-existing gateway payment (e.g. an overdue charge from an earlier attempt).
    pub async fn push_payment(&self, payment: GatewayPayment) {
        self.inner.lock().await.payments.push(payment);
    }

    /// Marks a pending charge as settled, as the real gateway does when the customer pays the Pix code.
    pub async fn settle_payment(&self, payment_id: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(payment) = inner.payments.iter_mut().find(|p| p.id == payment_id) {
            payment.status = GatewayPaymentStatus::Received;
        }
    }

    pub async fn payments(&self) -> Vec<GatewayPayment> {
        self.inner.lock().await.payments.clone()
    }

    pub async fn splits_for(&self, payment_id: &str) -> Vec<PaymentSplit> {
        self.inner.lock().await.splits.get(payment_id).cloned().unwrap_or_default()
    }

    pub async fn transfers(&self) -> Vec<WalletTransfer> {
        self.inner.lock().await.transfers.clone()
    }

    pub async fn refunds(&self) -> Vec<String> {
        self.inner.lock().await.refunds.clone()
    }

    pub async fn deleted(&self) -> Vec<String> {
        self.inner.lock().await.deleted.clone()
    }
}

impl PaymentGateway for MemoryGateway {
    async fn find_customer(&self, customer_id: &str) -> Result<GatewayCustomer, GatewayError> {
        let mut inner = self.inner.lock().await;
        let customer = inner.customers.entry(customer_id.to_string()).or_insert_with(|| GatewayCustomer {
            id: format!("gw_{customer_id}"),
            document: Some("00000000000".to_string()),
        });
        Ok(customer.clone())
    }

    async fn create_payment(&self, payment: NewGatewayPayment) -> Result<GatewayPayment, GatewayError> {
        let mut inner = self.inner.lock().await;
        if payment.billing_type == BillingType::CreditCard && inner.decline_cards {
            return Err(GatewayError::InvalidCard("insufficient funds".to_string()));
        }
        inner.next_id += 1;
        let id = format!("pay_{}", inner.next_id);
        let status = match payment.billing_type {
            BillingType::CreditCard => GatewayPaymentStatus::Confirmed,
            _ => GatewayPaymentStatus::Pending,
        };
        if payment.billing_type == BillingType::Pix {
            let pix = PixData { code: format!("pix-{id}"), expires_at: payment.due_date };
            inner.pix.insert(id.clone(), pix);
        }
        let created = GatewayPayment {
            id: id.clone(),
            status,
            billing_type: payment.billing_type,
            external_ref: payment.external_ref,
            amount: payment.amount,
        };
        inner.payments.push(created.clone());
        inner.splits.insert(id, payment.splits);
        Ok(created)
    }

    async fn find_payments_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Vec<GatewayPayment>, GatewayError> {
        let inner = self.inner.lock().await;
        Ok(inner.payments.iter().filter(|p| p.external_ref == external_ref).cloned().collect())
    }

    async fn delete_payment(&self, payment_id: &str) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().await;
        inner.payments.retain(|p| p.id != payment_id);
        inner.deleted.push(payment_id.to_string());
        Ok(())
    }

    async fn refund_payment(&self, payment_id: &str) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().await;
        if let Some(payment) = inner.payments.iter_mut().find(|p| p.id == payment_id) {
            payment.status = GatewayPaymentStatus::Refunded;
        }
        inner.refunds.push(payment_id.to_string());
        Ok(())
    }

    async fn find_pix_data(&self, payment_id: &str) -> Result<PixData, GatewayError> {
        let inner = self.inner.lock().await;
        inner.pix.get(payment_id).cloned().ok_or_else(|| GatewayError::NotFound(payment_id.to_string()))
    }

    async fn transfer(&self, transfer: WalletTransfer) -> Result<(), GatewayError> {
        self.inner.lock().await.transfers.push(transfer);
        Ok(())
    }
}
