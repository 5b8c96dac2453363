//! Simple stateless pub-sub event handling.
//!
//! Components subscribe to engine events and react to them without access to engine internals: a handler receives
//! the event and nothing else. Handlers run as spawned tasks so a slow subscriber never blocks the coordinator.

use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, listener) = mpsc::channel(buffer_size);
        Self { listener, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Runs the handler until every producer has been dropped, then drains any in-flight handler tasks.
    pub async fn start_handler(mut self) {
        debug!("📬️ Event handler started");
        // the internal sender would otherwise keep the channel open forever
        drop(self.sender);
        let mut tasks = JoinSet::new();
        while let Some(event) = self.listener.recv().await {
            trace!("📬️ Dispatching event");
            let handler = Arc::clone(&self.handler);
            tasks.spawn(async move { (handler)(event).await });
            // reap whatever has already finished so the set does not grow unbounded
            while tasks.try_join_next().is_some() {}
        }
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!("📬️ Event handler task panicked: {e}");
            }
        }
        debug!("📬️ Event handler has shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to publish event: {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    #[tokio::test]
    async fn events_from_all_producers_are_handled() {
        let _ = env_logger::try_init();
        let sum = Arc::new(AtomicU64::new(0));
        let sum2 = Arc::clone(&sum);
        let handler = Arc::new(move |v: u64| {
            let sum = Arc::clone(&sum);
            Box::pin(async move {
                sum.fetch_add(v, Ordering::SeqCst);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let event_handler = EventHandler::new(4, handler);
        let producer_a = event_handler.subscribe();
        let producer_b = event_handler.subscribe();
        tokio::spawn(async move {
            for v in 0..5u64 {
                producer_a.publish_event(v * 2 + 1).await;
            }
        });
        tokio::spawn(async move {
            for v in 0..5u64 {
                producer_b.publish_event(v * 2).await;
            }
        });
        event_handler.start_handler().await;
        assert_eq!(sum2.load(Ordering::SeqCst), 45);
    }
}
