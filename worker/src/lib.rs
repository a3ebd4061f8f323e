//! The worker process: chunk consumer loop (C5), storage engine (C6), `WorkerService` RPC
//! surface, and heartbeat loop (C7).
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_debug_implementations, clippy::clone_on_ref_ptr)]

pub mod consumer;
pub mod heartbeat;
pub mod service;
pub mod storage;

pub use consumer::ChunkConsumerLoop;
pub use heartbeat::{HeartbeatLoop, HEARTBEAT_PERIOD};
pub use service::WorkerServiceImpl;
pub use storage::{StorageEngine, StorageError};
