//! A crate containing all the dependencies for tracing/logging purposes, in particular
//! `tracing` and its companion crates.
//!
//! Every other crate in this workspace should use `observability_deps::tracing` rather
//! than depending on `tracing` directly, so the version can be bumped in one place.

pub use tracing;
