//! Cached `tonic` channel pool (C8).

pub mod pool;

pub use pool::{ClientError, ClientPool};
