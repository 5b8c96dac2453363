use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;

use crate::{
    db_types::OrderId,
    traits::{JobQueue, OrderJob, QueueError},
};

/// A hash map keyed by order id, so it holds at most one pending job per order by construction.
#[derive(Clone, Default)]
pub struct MemoryJobQueue {
    jobs: Arc<Mutex<HashMap<OrderId, OrderJob>>>,
}

impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: OrderJob) -> Result<(), QueueError> {
        self.jobs.lock().await.insert(job.order_id.clone(), job);
        Ok(())
    }

    async fn pending(&self, order_id: &OrderId) -> Result<Option<OrderJob>, QueueError> {
        Ok(self.jobs.lock().await.get(order_id).cloned())
    }

    async fn remove(&self, order_id: &OrderId) -> Result<(), QueueError> {
        self.jobs.lock().await.remove(order_id);
        Ok(())
    }
}
