//! The worker registry (C1): an in-memory, liveness-filtered directory of workers.
//!
//! Insertion order is tracked by an [`IndexMap`] rather than a plain `HashMap` so the
//! placement oracle's round-robin counter (§4.2) has a stable candidate ordering across
//! calls. Reaping removes an entry outright; a worker that re-registers after being
//! reaped is appended at the end as a brand new entry, per §4.1.

use clock::{Time, TimeProvider};
use data_types::WorkerId;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// A worker is active iff its last heartbeat is within this of `now`.
pub const LIVENESS_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct WorkerEntry {
    address: String,
    last_heartbeat: Time,
}

/// The shared, mutex-protected worker directory.
#[derive(Debug)]
pub struct WorkerRegistry {
    time_provider: Arc<dyn TimeProvider>,
    workers: Mutex<IndexMap<WorkerId, WorkerEntry>>,
}

impl WorkerRegistry {
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            time_provider,
            workers: Mutex::new(IndexMap::new()),
        }
    }

    /// Insert or refresh a worker's entry. The address is overwritten on every call
    /// since a worker may move between restarts.
    pub fn upsert(&self, worker_id: WorkerId, address: String) {
        let now = self.time_provider.now();
        let mut workers = self.workers.lock();
        workers.insert(
            worker_id,
            WorkerEntry {
                address,
                last_heartbeat: now,
            },
        );
    }

    /// A snapshot of `{workerId -> address}` restricted to entries whose last
    /// heartbeat is within [`LIVENESS_TIMEOUT`] of now, in registration order.
    pub fn active(&self) -> Vec<(WorkerId, String)> {
        let now = self.time_provider.now();
        self.workers
            .lock()
            .iter()
            .filter(|(_, entry)| is_live(now, entry.last_heartbeat))
            .map(|(id, entry)| (id.clone(), entry.address.clone()))
            .collect()
    }

    /// Remove every entry whose last heartbeat has aged out. Returns the ids reaped.
    pub fn reap(&self) -> Vec<WorkerId> {
        let now = self.time_provider.now();
        let mut workers = self.workers.lock();
        let stale: Vec<WorkerId> = workers
            .iter()
            .filter(|(_, entry)| !is_live(now, entry.last_heartbeat))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            workers.shift_remove(id);
        }
        stale
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.workers.lock().len()
    }
}

fn is_live(now: Time, last_heartbeat: Time) -> bool {
    now.checked_duration_since(last_heartbeat)
        .map(|age| age <= LIVENESS_TIMEOUT)
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clock::MockProvider;

    fn registry_with_clock() -> (WorkerRegistry, Arc<MockProvider>) {
        let clock = Arc::new(MockProvider::new(Time::from_timestamp_nanos(0)));
        let registry = WorkerRegistry::new(Arc::clone(&clock) as Arc<dyn TimeProvider>);
        (registry, clock)
    }

    #[test]
    fn upsert_then_active_contains_worker() {
        let (registry, _clock) = registry_with_clock();
        registry.upsert(WorkerId::new("w1"), "host:1".to_string());
        let active = registry.active();
        assert_eq!(active, vec![(WorkerId::new("w1"), "host:1".to_string())]);
    }

    #[test]
    fn worker_becomes_inactive_after_timeout() {
        let (registry, clock) = registry_with_clock();
        registry.upsert(WorkerId::new("w1"), "host:1".to_string());
        clock.inc(LIVENESS_TIMEOUT + Duration::from_millis(1));
        assert!(registry.active().is_empty());
    }

    #[test]
    fn reap_removes_stale_and_keeps_live() {
        let (registry, clock) = registry_with_clock();
        registry.upsert(WorkerId::new("w1"), "host:1".to_string());
        clock.inc(Duration::from_secs(3));
        registry.upsert(WorkerId::new("w2"), "host:2".to_string());
        clock.inc(Duration::from_secs(3));

        let reaped = registry.reap();
        assert_eq!(reaped, vec![WorkerId::new("w1")]);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.active(),
            vec![(WorkerId::new("w2"), "host:2".to_string())]
        );
    }

    #[test]
    fn reregistration_after_reap_is_appended_at_the_end() {
        let (registry, clock) = registry_with_clock();
        registry.upsert(WorkerId::new("w1"), "host:1".to_string());
        registry.upsert(WorkerId::new("w2"), "host:2".to_string());
        clock.inc(LIVENESS_TIMEOUT + Duration::from_secs(1));
        registry.reap();

        registry.upsert(WorkerId::new("w1"), "host:1-new".to_string());
        let active = registry.active();
        assert_eq!(active, vec![(WorkerId::new("w1"), "host:1-new".to_string())]);
    }

    #[test]
    fn round_robin_order_survives_churn() {
        let (registry, _clock) = registry_with_clock();
        registry.upsert(WorkerId::new("w1"), "a".to_string());
        registry.upsert(WorkerId::new("w2"), "b".to_string());
        registry.upsert(WorkerId::new("w3"), "c".to_string());
        // Re-upserting an existing worker refreshes its heartbeat but keeps its slot.
        registry.upsert(WorkerId::new("w2"), "b-new".to_string());
        let active = registry.active();
        assert_eq!(
            active,
            vec![
                (WorkerId::new("w1"), "a".to_string()),
                (WorkerId::new("w2"), "b-new".to_string()),
                (WorkerId::new("w3"), "c".to_string()),
            ]
        );
    }
}
