use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderId, OrderStatus, PaymentMethod, StatusFields};

/// Published whenever the coordinator applies a status transition.
///
/// Only a public subset of the transition's extra fields rides along; ledger bookkeeping (customer debit, debt
/// settlement) and gateway internals stay inside the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdatedEvent {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub finished_at: Option<DateTime<Utc>>,
    pub payment_description: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub pix_code: Option<String>,
    pub pix_expires_at: Option<DateTime<Utc>>,
}

impl OrderUpdatedEvent {
    pub fn new(order: &Order, fields: &StatusFields) -> Self {
        Self {
            order_id: order.order_id.clone(),
            status: order.status,
            finished_at: fields.finished_at,
            payment_description: fields.payment_description.clone(),
            payment_method: fields.payment_method,
            pix_code: fields.pix_code.clone(),
            pix_expires_at: fields.pix_expires_at,
        }
    }
}
