use thiserror::Error;

use crate::{
    db_types::{OrderAction, OrderId, OrderStatus},
    helpers::TokenError,
    pricing::PricingError,
    traits::{GatewayError, LockError, QueueError, StorageError},
};

/// The engine-level error type returned by the coordinator, the workflows and the orchestrator.
#[derive(Debug, Error)]
pub enum OrderFlowError {
    /// The requested action is not valid for the order's current status (stale client, race, or replay).
    /// Surfaced synchronously to the caller and never auto-retried by the coordinator.
    #[error("Action {action} is not valid for an order in status {status}")]
    Conflict { status: OrderStatus, action: OrderAction },
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    /// Required upstream data is missing or inconsistent in a way that makes the operation unrecoverable.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    /// The payer has no tax document on file with the gateway, so a Pix charge cannot be created.
    #[error("Customer {0} has no document registered with the payment gateway")]
    PayerDocumentMissing(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("Completion token rejected: {0}")]
    Token(#[from] TokenError),
    #[error(transparent)]
    Pricing(#[from] PricingError),
}
