use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, OrderUpdatedEvent};

/// The producer ends of every registered subscriber. Cloned into the coordinator, which publishes each
/// transition to all of them.
///
/// The engine has a single event type, so registration is one call: [`Self::subscribe_order_updates`] wires a
/// handler to a fresh channel, spawns its dispatch task and keeps the producer end here. Call it once per
/// subscriber before the coordinator is built; an empty `EventProducers` publishes to nobody.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_updated_producer: Vec<EventProducer<OrderUpdatedEvent>>,
}

impl EventProducers {
    /// Registers `handler` for order-update events. Must run inside a tokio runtime; the handler task lives
    /// until every clone of this producer set has been dropped.
    pub fn subscribe_order_updates<F>(&mut self, buffer_size: usize, handler: F)
    where F: (Fn(OrderUpdatedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        let handler = EventHandler::new(buffer_size, Arc::new(handler));
        self.order_updated_producer.push(handler.subscribe());
        tokio::spawn(handler.start_handler());
    }
}
