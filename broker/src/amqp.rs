//! The production queue backend: AMQP via `lapin` (§6).
//!
//! Matches the teacher's `write_buffer` convention of one trait surface with a mock
//! backend for tests and a real broker backend selected by runtime configuration,
//! substituting `lapin`/AMQP for the teacher's `rskafka`/Kafka since this system's
//! external interface spec calls for an AMQP broker.

use async_trait::async_trait;
use data_types::ChunkMessage;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use metric::{Metric, Registry};
use observability_deps::tracing::error;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::core::{BrokerError, ChunkConsumer, ChunkPublisher, Delivery};

/// Durable queue name for chunk payloads (§6).
pub const FILE_CHUNKS_QUEUE: &str = "fileChunksQueue";

#[derive(Debug)]
pub struct AmqpQueue {
    channel: Channel,
    ops: Arc<Metric>,
}

/// Connect to `amqp_addr`, open a channel, and declare the durable chunk queue.
/// Shared by [`AmqpQueue::connect`] and by worker processes that need a bare [`Channel`]
/// to build an [`AmqpConsumer`] from.
pub async fn connect_channel(amqp_addr: &str) -> Result<Channel, BrokerError> {
    let connection = Connection::connect(amqp_addr, ConnectionProperties::default())
        .await
        .map_err(BrokerError::unavailable)?;
    let channel = connection.create_channel().await.map_err(BrokerError::unavailable)?;
    channel
        .queue_declare(
            FILE_CHUNKS_QUEUE,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(BrokerError::unavailable)?;
    Ok(channel)
}

impl AmqpQueue {
    /// Connect to `amqp_addr` and declare the durable chunk queue.
    pub async fn connect(amqp_addr: &str, metrics: &Registry) -> Result<Self, BrokerError> {
        let channel = connect_channel(amqp_addr).await?;
        Ok(Self {
            channel,
            ops: metrics.register_counter("broker_ops", "publish/consume/settle counts"),
        })
    }
}

#[async_trait]
impl ChunkPublisher for AmqpQueue {
    async fn publish(&self, message: &ChunkMessage) -> Result<(), BrokerError> {
        let payload = message.to_json()?;
        self.channel
            .basic_publish(
                "",
                FILE_CHUNKS_QUEUE,
                BasicPublishOptions::default(),
                payload.as_bytes(),
                BasicProperties::default(),
            )
            .await
            .map_err(BrokerError::unavailable)?
            .await
            .map_err(BrokerError::unavailable)?;
        self.ops
            .recorder(vec![("op", "publish".to_string())])
            .inc(1);
        Ok(())
    }

    fn type_name(&self) -> &'static str {
        "amqp"
    }
}

/// Wraps the channel's consumer stream behind a mutex so [`ChunkConsumer::next`] can
/// take `&self`, matching the rest of this crate's trait shape.
#[derive(Debug)]
pub struct AmqpConsumer {
    channel: Channel,
    consumer: Mutex<lapin::Consumer>,
    ops: Arc<Metric>,
}

impl AmqpConsumer {
    pub async fn new(channel: Channel, consumer_tag: &str, metrics: &Registry) -> Result<Self, BrokerError> {
        let consumer = channel
            .basic_consume(
                FILE_CHUNKS_QUEUE,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(BrokerError::unavailable)?;
        Ok(Self {
            channel,
            consumer: Mutex::new(consumer),
            ops: metrics.register_counter("broker_ops", "publish/consume/settle counts"),
        })
    }
}

#[async_trait]
impl ChunkConsumer for AmqpConsumer {
    /// A message that fails to parse as [`ChunkMessage`] is a poison message (§4.5 step
    /// 1): it is acked and dropped here rather than surfaced to the caller, since no
    /// number of redeliveries will make it parseable.
    async fn next(&self) -> Result<Delivery, BrokerError> {
        loop {
            let delivery = {
                let mut consumer = self.consumer.lock().await;
                consumer
                    .next()
                    .await
                    .ok_or_else(|| BrokerError::unavailable("AMQP consumer stream closed"))?
                    .map_err(BrokerError::unavailable)?
            };

            let payload = String::from_utf8_lossy(&delivery.data).into_owned();
            let delivery_tag = delivery.delivery_tag;
            let message = match ChunkMessage::from_json(&payload) {
                Ok(message) => message,
                Err(e) => {
                    error!(error = %e, delivery_tag, "dropping unparseable chunk message");
                    if let Err(e) = self
                        .channel
                        .basic_ack(delivery_tag, BasicAckOptions::default())
                        .await
                    {
                        error!(error = %e, delivery_tag, "failed to ack poison message");
                    }
                    continue;
                }
            };

            self.ops
                .recorder(vec![("op", "consume".to_string())])
                .inc(1);

            let channel = self.channel.clone();
            let settle = move |acked: bool| {
                let channel = channel.clone();
                Box::pin(async move {
                    let result = if acked {
                        channel
                            .basic_ack(delivery_tag, BasicAckOptions::default())
                            .await
                    } else {
                        channel
                            .basic_nack(
                                delivery_tag,
                                BasicNackOptions {
                                    requeue: true,
                                    ..BasicNackOptions::default()
                                },
                            )
                            .await
                    };
                    if let Err(e) = result {
                        error!(error = %e, delivery_tag, "failed to settle AMQP delivery");
                    }
                }) as futures::future::BoxFuture<'static, ()>
            };

            return Ok(Delivery::new(message, settle));
        }
    }

    fn type_name(&self) -> &'static str {
        "amqp"
    }
}
