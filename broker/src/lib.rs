//! Chunk message queue abstraction (§6): a trait pair ([`ChunkPublisher`]/
//! [`ChunkConsumer`]) with an in-memory backend for tests/demos and an AMQP backend
//! (`lapin`) for production, matching the teacher's `write_buffer` crate's pattern of a
//! single trait surface over swappable backends.

pub mod amqp;
pub mod core;
pub mod mem;

pub use amqp::{connect_channel, AmqpConsumer, AmqpQueue, FILE_CHUNKS_QUEUE};
pub use core::{BrokerError, BrokerErrorKind, ChunkConsumer, ChunkPublisher, Delivery};
pub use mem::MemQueue;
