//! An in-memory queue used by tests and the single-process demo binaries. A nacked
//! delivery is pushed back to the front of the queue so the next `next()` call
//! redelivers it, modeling the AMQP backend's redelivery behavior closely enough for
//! the idempotent-redelivery tests in §8 to exercise real queue semantics.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use data_types::ChunkMessage;
use metric::{Metric, Registry};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::core::{BrokerError, ChunkConsumer, ChunkPublisher, Delivery};

#[derive(Debug, Default)]
struct Shared {
    queue: Mutex<VecDeque<ChunkMessage>>,
    notify: Notify,
}

/// A [`ChunkPublisher`]/[`ChunkConsumer`] pair sharing one underlying queue.
#[derive(Debug, Clone)]
pub struct MemQueue {
    shared: Arc<Shared>,
    ops: Arc<Metric>,
}

impl MemQueue {
    pub fn new(metrics: &Registry) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            ops: metrics.register_counter("broker_ops", "publish/consume/settle counts"),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.shared.queue.lock().len()
    }
}

#[async_trait]
impl ChunkPublisher for MemQueue {
    async fn publish(&self, message: &ChunkMessage) -> Result<(), BrokerError> {
        self.shared.queue.lock().push_back(message.clone());
        self.shared.notify.notify_one();
        self.ops
            .recorder(vec![("op", "publish".to_string())])
            .inc(1);
        Ok(())
    }

    fn type_name(&self) -> &'static str {
        "mock"
    }
}

#[async_trait]
impl ChunkConsumer for MemQueue {
    async fn next(&self) -> Result<Delivery, BrokerError> {
        loop {
            if let Some(message) = self.shared.queue.lock().pop_front() {
                self.ops
                    .recorder(vec![("op", "consume".to_string())])
                    .inc(1);
                let shared = Arc::clone(&self.shared);
                let redelivery = message.clone();
                let settle = move |acked: bool| {
                    let shared = Arc::clone(&shared);
                    let redelivery = redelivery.clone();
                    Box::pin(async move {
                        if !acked {
                            shared.queue.lock().push_front(redelivery);
                            shared.notify.notify_one();
                        }
                    }) as futures::future::BoxFuture<'static, ()>
                };
                return Ok(Delivery::new(message, settle));
            }
            self.shared.notify.notified().await;
        }
    }

    fn type_name(&self) -> &'static str {
        "mock"
    }
}
