use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::OrderId;

/// The named job types the orchestrator schedules. Each maps to one of the four order-update workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    Pay,
    ConfirmPayment,
    Complete,
    Cancel,
}

impl Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderJob {
    pub order_id: OrderId,
    pub job_type: JobType,
}

#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("Job queue failure: {0}")]
    Backend(String),
}

/// A job queue keyed by order id, holding at most one pending job per order. Workers deliver at least once;
/// every handler is idempotent, so redelivery is harmless.
///
/// `enqueue` replaces whatever job is pending under the same order id. Callers that need the replace-or-block
/// discipline (see [`crate::orchestrator::supersedes`]) must inspect [`JobQueue::pending`] under the per-order
/// job lock before enqueueing.
#[allow(async_fn_in_trait)]
pub trait JobQueue: Clone + Send + Sync + 'static {
    fn enqueue(&self, job: OrderJob) -> impl std::future::Future<Output = Result<(), QueueError>> + Send;

    fn pending(
        &self,
        order_id: &OrderId,
    ) -> impl std::future::Future<Output = Result<Option<OrderJob>, QueueError>> + Send;

    fn remove(&self, order_id: &OrderId) -> impl std::future::Future<Output = Result<(), QueueError>> + Send;
}
