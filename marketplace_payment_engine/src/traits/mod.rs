//! Contracts consumed by the engine: the relational store, the payment gateway, the distributed lock service and
//! the job queue. The engine only depends on these traits; concrete backends live in [`crate::mem`] and (for the
//! store) the SQLite module.

mod database;
mod gateway;
mod lock;
mod queue;

pub use database::{OrderDatabase, StorageError};
pub use gateway::{
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
pub use lock::{LockError, LockService};
pub use queue::{JobQueue, JobType, OrderJob, QueueError};
