//! A small, dependency-free metrics registry.
//!
//! Each process (scheduler, worker) owns one [`Registry`] and threads it through the
//! components that want to publish counters — the placement oracle's assignment
//! outcomes, the broker's publish/consume counts, the storage engine's store/retrieve
//! counts. There is no export path here (no Prometheus endpoint); the registry exists so
//! that instrumentation is wired in from the start rather than bolted on later, and so
//! that components under test can inspect counts instead of grepping logs.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_debug_implementations, clippy::clone_on_ref_ptr)]

use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use parking_lot::Mutex;

/// A monotonically increasing counter, keyed by a set of attributes (e.g. `result=ok`).
#[derive(Debug, Default)]
pub struct U64Counter {
    value: std::sync::atomic::AtomicU64,
}

impl U64Counter {
    /// Increment the counter by `delta`.
    pub fn inc(&self, delta: u64) {
        self.value.fetch_add(delta, std::sync::atomic::Ordering::Relaxed);
    }

    /// Current value.
    pub fn fetch(&self) -> u64 {
        self.value.load(std::sync::atomic::Ordering::Relaxed)
    }
}

/// Attributes attached to one observation of a metric, e.g. `[("result", "already_exists")]`.
pub type Attributes = Vec<(&'static str, String)>;

/// A named metric, holding one [`U64Counter`] per distinct [`Attributes`] it has been
/// recorded under.
#[derive(Debug)]
pub struct Metric {
    name: &'static str,
    description: &'static str,
    counters: Mutex<BTreeMap<Attributes, Arc<U64Counter>>>,
}

impl Metric {
    fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            counters: Mutex::new(BTreeMap::new()),
        }
    }

    /// Name this metric was registered under.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Description this metric was registered with.
    pub fn description(&self) -> &'static str {
        self.description
    }

    /// Fetch (creating if necessary) the counter for a given set of attributes.
    pub fn recorder(&self, attributes: Attributes) -> Arc<U64Counter> {
        self.counters
            .lock()
            .entry(attributes)
            .or_insert_with(|| Arc::new(U64Counter::default()))
            .clone()
    }

    /// Snapshot of every attribute set recorded so far and its current value. Intended
    /// for tests.
    pub fn observations(&self) -> Vec<(Attributes, u64)> {
        self.counters
            .lock()
            .iter()
            .map(|(attrs, counter)| (attrs.clone(), counter.fetch()))
            .collect()
    }
}

/// A process-wide collection of named [`Metric`]s.
#[derive(Debug, Default)]
pub struct Registry {
    metrics: Mutex<BTreeMap<&'static str, Arc<Metric>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or fetch the already-registered) counter metric with the given name.
    pub fn register_counter(&self, name: &'static str, description: &'static str) -> Arc<Metric> {
        self.metrics
            .lock()
            .entry(name)
            .or_insert_with(|| Arc::new(Metric::new(name, description)))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_keyed_by_attributes() {
        let registry = Registry::new();
        let metric = registry.register_counter("placements", "placement decisions made");

        metric
            .recorder(vec![("result", "assigned".to_string())])
            .inc(2);
        metric
            .recorder(vec![("result", "already_exists".to_string())])
            .inc(1);
        metric
            .recorder(vec![("result", "assigned".to_string())])
            .inc(1);

        let observations: BTreeMap<_, _> = metric.observations().into_iter().collect();
        assert_eq!(
            observations[&vec![("result", "assigned".to_string())]],
            3
        );
        assert_eq!(
            observations[&vec![("result", "already_exists".to_string())]],
            1
        );
    }

    #[test]
    fn registering_twice_returns_the_same_metric() {
        let registry = Registry::new();
        let a = registry.register_counter("x", "first registration");
        let b = registry.register_counter("x", "second registration wins no override");
        a.recorder(vec![]).inc(5);
        assert_eq!(b.recorder(vec![]).fetch(), 5);
    }
}
