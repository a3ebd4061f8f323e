use std::fmt::{Debug, Display, Formatter};

use async_trait::async_trait;
use data_types::ChunkMessage;

/// Generic boxed error type used throughout this crate.
///
/// The dynamic boxing makes it easier to deal with errors from different backend
/// implementations (in-memory queue vs. AMQP) behind one trait surface.
#[derive(Debug)]
pub struct BrokerError {
    inner: Box<dyn std::error::Error + Sync + Send>,
    kind: BrokerErrorKind,
}

impl BrokerError {
    pub fn new(kind: BrokerErrorKind, e: impl Into<Box<dyn std::error::Error + Sync + Send>>) -> Self {
        Self { inner: e.into(), kind }
    }

    pub fn invalid_data(e: impl Into<Box<dyn std::error::Error + Sync + Send>>) -> Self {
        Self::new(BrokerErrorKind::InvalidData, e)
    }

    pub fn unavailable(e: impl Into<Box<dyn std::error::Error + Sync + Send>>) -> Self {
        Self::new(BrokerErrorKind::Unavailable, e)
    }

    pub fn kind(&self) -> BrokerErrorKind {
        self.kind
    }

    pub fn inner(&self) -> &dyn std::error::Error {
        self.inner.as_ref()
    }
}

impl Display for BrokerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "BrokerError({:?}): {}", self.kind, self.inner)
    }
}

impl std::error::Error for BrokerError {}

impl From<serde_json::Error> for BrokerError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(BrokerErrorKind::InvalidData, e)
    }
}

impl From<lapin::Error> for BrokerError {
    fn from(e: lapin::Error) -> Self {
        Self::new(BrokerErrorKind::Unavailable, e)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BrokerErrorKind {
    /// The payload could not be parsed as a [`ChunkMessage`].
    InvalidData,
    /// The broker connection is down or the queue is closed.
    Unavailable,
}

/// A single delivered message plus the means to settle it.
///
/// Settling is mandatory: dropping a [`Delivery`] without calling [`ack`](Self::ack) or
/// [`nack`](Self::nack) leaves the backend's delivery state untouched, which for the AMQP
/// backend means the broker will eventually redeliver it once the channel closes.
pub struct Delivery {
    pub message: ChunkMessage,
    settle: Box<dyn FnOnce(bool) -> futures::future::BoxFuture<'static, ()> + Send>,
}

impl Delivery {
    pub fn new(
        message: ChunkMessage,
        settle: impl FnOnce(bool) -> futures::future::BoxFuture<'static, ()> + Send + 'static,
    ) -> Self {
        Self {
            message,
            settle: Box::new(settle),
        }
    }

    /// Acknowledge successful processing; the broker will not redeliver this message.
    pub async fn ack(self) {
        (self.settle)(true).await;
    }

    /// Negative-acknowledge; the broker should redeliver this message (§4.5 step 3/4).
    pub async fn nack(self) {
        (self.settle)(false).await;
    }
}

impl Debug for Delivery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Publishes [`ChunkMessage`]s to the chunk queue (§4.4 upload path).
#[async_trait]
pub trait ChunkPublisher: Debug + Send + Sync + 'static {
    async fn publish(&self, message: &ChunkMessage) -> Result<(), BrokerError>;

    /// Return type (like `"mock"` or `"amqp"`) of this publisher.
    fn type_name(&self) -> &'static str;
}

/// Consumes [`ChunkMessage`]s from the chunk queue with at-least-once delivery (§4.5).
#[async_trait]
pub trait ChunkConsumer: Debug + Send + Sync + 'static {
    /// Block until the next message is available.
    async fn next(&self) -> Result<Delivery, BrokerError>;

    fn type_name(&self) -> &'static str;
}
