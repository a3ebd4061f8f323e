//! The scheduler process: HTTP ingress (C4), the `SchedulerService` RPC surface (C1/C2),
//! and the registry reaper (§4.7). `scheduler_cli` is the binary that wires these three
//! onto one [`metric::Registry`], catalog, and broker publisher and runs them
//! concurrently.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_debug_implementations, clippy::clone_on_ref_ptr)]

pub mod grpc;
pub mod http;
pub mod ingest;
pub mod reaper;

pub use grpc::SchedulerServiceImpl;
pub use http::HttpServer;
pub use ingest::{IngestError, IngestPipeline};
pub use reaper::{ReaperLoop, REAPER_PERIOD};
