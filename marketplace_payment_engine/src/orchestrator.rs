//! Job orchestration for the asynchronous order-update workflows.
//!
//! Triggers (checkout, webhooks, customer actions) never run payment work inline. They schedule a job keyed by
//! order id; the queue holds at most one pending job per order and [`supersedes`] decides whether a newcomer
//! replaces the incumbent or is dropped. A timer re-drives orders stuck in a transient status, so a crashed worker
//! or a lost job only delays progress.

use std::time::Duration;

use log::*;
use tokio::task::JoinHandle;

use crate::{
    coordinator::OrderStatusCoordinator,
    db_types::{OrderId, OrderStatus},
    traits::{JobQueue, JobType, LockService, OrderDatabase, OrderJob, PaymentGateway},
    workflows::{CancellationWorkflow, CompletionWorkflow, ConfirmOrderPaymentWorkflow, PayOrderWorkflow},
    OrderFlowError,
};

/// Whether an `incoming` job replaces a `pending` one for the same order.
///
/// A fresh `Pay` always wins (the charge may need recreating). `ConfirmPayment` only outranks the `Pay` that
/// produced the charge. `Complete` and `Cancel` outrank everything except each other: whichever terminal intent
/// was queued first stays.
pub fn supersedes(incoming: JobType, pending: JobType) -> bool {
    match incoming {
        JobType::Pay => true,
        JobType::ConfirmPayment => pending == JobType::Pay,
        JobType::Complete => pending != JobType::Cancel,
        JobType::Cancel => pending != JobType::Complete,
    }
}

pub struct PaymentOrchestrator<B, L, Q, G> {
    db: B,
    locks: L,
    queue: Q,
    gateway: G,
    coordinator: OrderStatusCoordinator<B, L>,
    lock_wait: Duration,
}

impl<B: Clone, L: Clone, Q: Clone, G: Clone> Clone for PaymentOrchestrator<B, L, Q, G> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            locks: self.locks.clone(),
            queue: self.queue.clone(),
            gateway: self.gateway.clone(),
            coordinator: self.coordinator.clone(),
            lock_wait: self.lock_wait,
        }
    }
}

impl<B, L, Q, G> PaymentOrchestrator<B, L, Q, G>
where
    B: OrderDatabase,
    L: LockService,
    Q: JobQueue,
    G: PaymentGateway,
{
    pub fn new(db: B, locks: L, queue: Q, gateway: G, coordinator: OrderStatusCoordinator<B, L>) -> Self {
        Self { db, locks, queue, gateway, coordinator, lock_wait: crate::coordinator::DEFAULT_LOCK_WAIT }
    }

    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    pub async fn pay(&self, order_id: &OrderId) -> Result<(), OrderFlowError> {
        self.schedule(OrderJob { order_id: order_id.clone(), job_type: JobType::Pay }).await
    }

    pub async fn confirm_payment(&self, order_id: &OrderId) -> Result<(), OrderFlowError> {
        self.schedule(OrderJob { order_id: order_id.clone(), job_type: JobType::ConfirmPayment }).await
    }

    pub async fn complete(&self, order_id: &OrderId) -> Result<(), OrderFlowError> {
        self.schedule(OrderJob { order_id: order_id.clone(), job_type: JobType::Complete }).await
    }

    pub async fn cancel(&self, order_id: &OrderId) -> Result<(), OrderFlowError> {
        self.schedule(OrderJob { order_id: order_id.clone(), job_type: JobType::Cancel }).await
    }

    /// Enqueues `job`, replacing or yielding to whatever is already pending for the order per [`supersedes`].
    async fn schedule(&self, job: OrderJob) -> Result<(), OrderFlowError> {
        let key = format!("order-jobs:{}", job.order_id);
        let _guard = self.locks.acquire(&key, self.lock_wait).await?;
        if let Some(pending) = self.queue.pending(&job.order_id).await? {
            if supersedes(job.job_type, pending.job_type) {
                info!(
                    "📬️ Order [{}]: {} supersedes the pending {}",
                    job.order_id, job.job_type, pending.job_type
                );
                self.queue.remove(&job.order_id).await?;
            } else {
                info!(
                    "📬️ Order [{}]: dropping {}; a {} is already pending",
                    job.order_id, job.job_type, pending.job_type
                );
                return Ok(());
            }
        }
        self.queue.enqueue(job).await?;
        Ok(())
    }

    /// Runs jobs for the order until none are pending. Returns whether any job ran.
    ///
    /// Each job is taken under the per-order job lock but executed outside it, so a long gateway call never
    /// blocks a trigger from scheduling the next step.
    pub async fn run_pending(&self, order_id: &OrderId) -> Result<bool, OrderFlowError> {
        let mut ran = false;
        while let Some(job) = self.take_pending(order_id).await? {
            info!("📬️ Order [{order_id}]: running {} job", job.job_type);
            self.run_job(&job).await?;
            ran = true;
        }
        Ok(ran)
    }

    async fn take_pending(&self, order_id: &OrderId) -> Result<Option<OrderJob>, OrderFlowError> {
        let key = format!("order-jobs:{order_id}");
        let _guard = self.locks.acquire(&key, self.lock_wait).await?;
        let job = self.queue.pending(order_id).await?;
        if job.is_some() {
            self.queue.remove(order_id).await?;
        }
        Ok(job)
    }

    async fn run_job(&self, job: &OrderJob) -> Result<(), OrderFlowError> {
        match job.job_type {
            JobType::Pay => {
                PayOrderWorkflow::new(self.db.clone(), self.gateway.clone(), self.coordinator.clone())
                    .exec(&job.order_id)
                    .await
            },
            JobType::ConfirmPayment => {
                let workflow = ConfirmOrderPaymentWorkflow::new(self.coordinator.clone());
                match workflow.exec(&job.order_id).await {
                    Ok(_) => Ok(()),
                    // the payment was already confirmed by an earlier delivery of this job
                    Err(OrderFlowError::Conflict { status, action }) => {
                        debug!(
                            "📬️ Order [{}]: {action} is a no-op in {status}; treating as already done",
                            job.order_id
                        );
                        Ok(())
                    },
                    Err(e) => Err(e),
                }
            },
            JobType::Complete => {
                CompletionWorkflow::new(self.db.clone(), self.gateway.clone(), self.coordinator.clone())
                    .exec(&job.order_id)
                    .await
            },
            JobType::Cancel => {
                CancellationWorkflow::new(self.db.clone(), self.gateway.clone(), self.coordinator.clone())
                    .exec(&job.order_id)
                    .await
            },
        }
    }

    /// Finds orders stuck in a transient status and schedules the job that moves them forward. A failure on one
    /// order is logged and does not stop the scan. Returns the number of orders driven.
    pub async fn redrive_stuck_orders(&self) -> Result<usize, OrderFlowError> {
        let stuck = self
            .db
            .fetch_orders_in_status(&[OrderStatus::PaymentProcessing, OrderStatus::Completing, OrderStatus::Canceling])
            .await?;
        let mut driven = 0;
        for order in stuck {
            let job_type = match order.status {
                OrderStatus::PaymentProcessing => JobType::Pay,
                OrderStatus::Completing => JobType::Complete,
                _ => JobType::Cancel,
            };
            debug!("🕰️ Order [{}] is stuck in {}; scheduling {job_type}", order.order_id, order.status);
            let result = async {
                self.schedule(OrderJob { order_id: order.order_id.clone(), job_type }).await?;
                self.run_pending(&order.order_id).await
            }
            .await;
            match result {
                Ok(true) => driven += 1,
                Ok(false) => {},
                Err(e) => error!("🕰️ Error re-driving order [{}]: {e}", order.order_id),
            }
        }
        Ok(driven)
    }
}

/// Starts the re-drive worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_redrive_worker<B, L, Q, G>(
    orchestrator: PaymentOrchestrator<B, L, Q, G>,
    interval: Duration,
) -> JoinHandle<()>
where
    B: OrderDatabase,
    L: LockService,
    Q: JobQueue,
    G: PaymentGateway,
{
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Stuck order re-drive worker started");
        loop {
            timer.tick().await;
            debug!("🕰️ Running stuck order scan");
            match orchestrator.redrive_stuck_orders().await {
                Ok(driven) => {
                    if driven > 0 {
                        info!("🕰️ {driven} stuck orders re-driven");
                    }
                },
                Err(e) => error!("🕰️ Error running stuck order scan: {e}"),
            }
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        events::EventProducers,
        mem::{MemoryDatabase, MemoryGateway, MemoryJobQueue, MemoryLockService},
        test_utils::fixtures,
    };

    #[test]
    fn pay_supersedes_everything() {
        for pending in [JobType::Pay, JobType::ConfirmPayment, JobType::Complete, JobType::Cancel] {
            assert!(supersedes(JobType::Pay, pending));
        }
    }

    #[test]
    fn confirm_only_supersedes_pay() {
        assert!(supersedes(JobType::ConfirmPayment, JobType::Pay));
        assert!(!supersedes(JobType::ConfirmPayment, JobType::ConfirmPayment));
        assert!(!supersedes(JobType::ConfirmPayment, JobType::Complete));
        assert!(!supersedes(JobType::ConfirmPayment, JobType::Cancel));
    }

    #[test]
    fn terminal_intents_never_displace_each_other() {
        assert!(!supersedes(JobType::Complete, JobType::Cancel));
        assert!(!supersedes(JobType::Cancel, JobType::Complete));
        assert!(supersedes(JobType::Complete, JobType::Pay));
        assert!(supersedes(JobType::Cancel, JobType::ConfirmPayment));
    }

    fn orchestrator(
        db: MemoryDatabase,
        queue: MemoryJobQueue,
        gateway: MemoryGateway,
    ) -> PaymentOrchestrator<MemoryDatabase, MemoryLockService, MemoryJobQueue, MemoryGateway> {
        let locks = MemoryLockService::default();
        let coordinator =
            OrderStatusCoordinator::new(db.clone(), locks.clone(), EventProducers::default());
        PaymentOrchestrator::new(db, locks, queue, gateway, coordinator)
    }

    #[tokio::test]
    async fn cancel_displaces_a_pending_pay_job() {
        let db = MemoryDatabase::default();
        let queue = MemoryJobQueue::default();
        let orch = orchestrator(db, queue.clone(), MemoryGateway::default());
        orch.pay(&"o1".into()).await.unwrap();
        orch.cancel(&"o1".into()).await.unwrap();
        let pending = queue.pending(&"o1".into()).await.unwrap().unwrap();
        assert_eq!(pending.job_type, JobType::Cancel);
    }

    #[tokio::test]
    async fn complete_is_dropped_when_a_cancel_is_pending() {
        let db = MemoryDatabase::default();
        let queue = MemoryJobQueue::default();
        let orch = orchestrator(db, queue.clone(), MemoryGateway::default());
        orch.cancel(&"o1".into()).await.unwrap();
        orch.complete(&"o1".into()).await.unwrap();
        let pending = queue.pending(&"o1".into()).await.unwrap().unwrap();
        assert_eq!(pending.job_type, JobType::Cancel);
    }

    #[tokio::test]
    async fn run_pending_drains_the_order_queue() {
        let db = MemoryDatabase::default();
        let queue = MemoryJobQueue::default();
        let gateway = MemoryGateway::default();
        db.push_order(fixtures::order("o1", crate::db_types::OrderStatus::Completing)).await;
        let orch = orchestrator(db.clone(), queue.clone(), gateway);
        orch.complete(&"o1".into()).await.unwrap();
        assert!(orch.run_pending(&"o1".into()).await.unwrap());
        assert!(queue.pending(&"o1".into()).await.unwrap().is_none());
        let order = db.fetch_order(&"o1".into()).await.unwrap().unwrap();
        assert_eq!(order.status, crate::db_types::OrderStatus::Completed);
    }

    #[tokio::test]
    async fn run_pending_with_nothing_queued_is_a_no_op() {
        let db = MemoryDatabase::default();
        let orch = orchestrator(db, MemoryJobQueue::default(), MemoryGateway::default());
        assert!(!orch.run_pending(&"o1".into()).await.unwrap());
    }

    #[tokio::test]
    async fn redrive_moves_a_stuck_order_forward() {
        let db = MemoryDatabase::default();
        let queue = MemoryJobQueue::default();
        db.push_order(fixtures::order("o1", crate::db_types::OrderStatus::Completing)).await;
        let orch = orchestrator(db.clone(), queue, MemoryGateway::default());
        let driven = orch.redrive_stuck_orders().await.unwrap();
        assert_eq!(driven, 1);
        let order = db.fetch_order(&"o1".into()).await.unwrap().unwrap();
        assert_eq!(order.status, crate::db_types::OrderStatus::Completed);
    }

    #[tokio::test]
    async fn redrive_isolates_per_order_failures() {
        let db = MemoryDatabase::default();
        let queue = MemoryJobQueue::default();
        // an in-app order in Canceling with no payment id fails its refund step
        db.push_order(fixtures::order("bad", crate::db_types::OrderStatus::Canceling)).await;
        db.push_order(fixtures::order("ok", crate::db_types::OrderStatus::Completing)).await;
        let orch = orchestrator(db.clone(), queue, MemoryGateway::default());
        let driven = orch.redrive_stuck_orders().await.unwrap();
        assert_eq!(driven, 1);
        let order = db.fetch_order(&"ok".into()).await.unwrap().unwrap();
        assert_eq!(order.status, crate::db_types::OrderStatus::Completed);
        let stuck = db.fetch_order(&"bad".into()).await.unwrap().unwrap();
        assert_eq!(stuck.status, crate::db_types::OrderStatus::Canceling);
    }
}
