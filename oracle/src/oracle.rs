//! The placement oracle (C2): chooses a worker for a `(fileId, chunkId)` and records
//! the decision. See §4.2.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use catalog::{MetadataCatalog, SaveOutcome};
use clock::TimeProvider;
use data_types::{ChunkId, FileId};
use metric::{Metric, Registry};
use observability_deps::tracing::warn;

use crate::interface::{AlreadyAssignedSnafu, CatalogSnafu, NoActiveWorkersSnafu, Placement, Result};
use crate::registry::WorkerRegistry;
use snafu::ResultExt;

/// Selects a worker for a chunk and persists the placement via the catalog.
///
/// The only writer of placement rows; the ingest pipeline must not write them
/// directly (§4.2).
#[derive(Debug)]
pub struct Oracle {
    registry: Arc<WorkerRegistry>,
    catalog: Arc<dyn MetadataCatalog>,
    time_provider: Arc<dyn TimeProvider>,
    next: AtomicU64,
    placements: Arc<Metric>,
}

impl Oracle {
    pub fn new(
        registry: Arc<WorkerRegistry>,
        catalog: Arc<dyn MetadataCatalog>,
        time_provider: Arc<dyn TimeProvider>,
        metrics: &Registry,
    ) -> Self {
        Self {
            registry,
            catalog,
            time_provider,
            next: AtomicU64::new(0),
            placements: metrics.register_counter("oracle_placements", "placement decisions by outcome"),
        }
    }

    fn record(&self, result: &'static str) {
        self.placements
            .recorder(vec![("result", result.to_string())])
            .inc(1);
    }

    /// Choose a worker for `(file_id, chunk_id)`, record the choice, and return it. If
    /// one already exists, returns [`crate::OracleError::AlreadyAssigned`] carrying the
    /// pre-existing decision rather than overwriting it.
    pub async fn assign_worker(&self, file_id: &FileId, chunk_id: ChunkId) -> Result<Placement> {
        if let Some(existing) = self
            .catalog
            .find_by_file_id_and_chunk_id(file_id, chunk_id)
            .await
            .context(CatalogSnafu)?
        {
            if existing.is_assigned() {
                self.record("already_exists");
                return AlreadyAssignedSnafu {
                    file_id: file_id.clone(),
                    chunk_id,
                    worker_id: existing.worker_id().expect("is_assigned implies Some"),
                    worker_address: existing.worker_address.clone().unwrap_or_default(),
                }
                .fail();
            }
        }

        let active = self.registry.active();
        if active.is_empty() {
            self.record("no_active_workers");
            return NoActiveWorkersSnafu {
                file_id: file_id.clone(),
                chunk_id,
            }
            .fail();
        }

        let index = (self.next.fetch_add(1, Ordering::SeqCst) as usize) % active.len();
        let (worker_id, worker_address) = active[index].clone();

        let (filename, size) = self.propagate_filename_and_size(file_id, chunk_id).await?;
        let now = self.time_provider.now();

        let outcome = self
            .catalog
            .assign(
                file_id,
                chunk_id,
                &filename,
                size,
                &worker_id,
                &worker_address,
                now,
            )
            .await
            .context(CatalogSnafu)?;

        match outcome {
            SaveOutcome::Inserted(row) => {
                self.record("assigned");
                Ok(Placement {
                    worker_id: row.worker_id().expect("just assigned"),
                    worker_address: row.worker_address.expect("just assigned"),
                })
            }
            SaveOutcome::AlreadyExists(row) => {
                self.record("already_exists");
                AlreadyAssignedSnafu {
                    file_id: file_id.clone(),
                    chunk_id,
                    worker_id: row.worker_id().expect("is_assigned implies Some"),
                    worker_address: row.worker_address.unwrap_or_default(),
                }
                .fail()
            }
        }
    }

    /// Copy `filename`/`size` forward from the chunk-0 placeholder row so every row for
    /// `file_id` agrees on them, since `AssignWorkerForChunk` carries neither (§4.2).
    async fn propagate_filename_and_size(
        &self,
        file_id: &FileId,
        chunk_id: ChunkId,
    ) -> Result<(String, i64)> {
        match self
            .catalog
            .find_by_file_id_and_chunk_id(file_id, 0)
            .await
            .context(CatalogSnafu)?
        {
            Some(row) => Ok((row.filename, row.size)),
            None => {
                warn!(%file_id, chunk_id, "no chunk-0 placeholder visible yet, writing placement with empty filename");
                Ok((String::new(), 0))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::MemCatalog;
    use clock::{MockProvider, Time};
    use data_types::WorkerId;
    use std::collections::HashMap;

    fn test_oracle() -> (Oracle, Arc<WorkerRegistry>, Arc<MockProvider>) {
        let clock = Arc::new(MockProvider::new(Time::from_timestamp_nanos(0)));
        let registry = Arc::new(WorkerRegistry::new(Arc::clone(&clock) as Arc<dyn TimeProvider>));
        let catalog: Arc<dyn MetadataCatalog> = Arc::new(MemCatalog::new());
        let metrics = metric::Registry::new();
        let oracle = Oracle::new(
            Arc::clone(&registry),
            catalog,
            Arc::clone(&clock) as Arc<dyn TimeProvider>,
            &metrics,
        );
        (oracle, registry, clock)
    }

    #[tokio::test]
    async fn no_active_workers_fails() {
        let (oracle, _registry, _clock) = test_oracle();
        let err = oracle
            .assign_worker(&FileId::new("f"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::OracleError::NoActiveWorkers { .. }));
    }

    #[tokio::test]
    async fn placement_is_immutable_across_calls() {
        let (oracle, registry, _clock) = test_oracle();
        registry.upsert(WorkerId::new("w1"), "a:1".to_string());

        let first = oracle.assign_worker(&FileId::new("f"), 0).await.unwrap();
        let second = oracle.assign_worker(&FileId::new("f"), 0).await.unwrap_err();
        match second {
            crate::OracleError::AlreadyAssigned { worker_id, .. } => {
                assert_eq!(worker_id, first.worker_id);
            }
            other => panic!("expected AlreadyAssigned, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn round_robin_is_fair_across_fresh_placements() {
        let (oracle, registry, _clock) = test_oracle();
        registry.upsert(WorkerId::new("w1"), "a:1".to_string());
        registry.upsert(WorkerId::new("w2"), "a:2".to_string());
        registry.upsert(WorkerId::new("w3"), "a:3".to_string());

        let mut counts: HashMap<WorkerId, u32> = HashMap::new();
        for chunk_id in 0..9 {
            let placement = oracle
                .assign_worker(&FileId::new("big"), chunk_id)
                .await
                .unwrap();
            *counts.entry(placement.worker_id).or_default() += 1;
        }
        assert_eq!(counts.len(), 3);
        for count in counts.values() {
            assert_eq!(*count, 3);
        }
    }

    #[tokio::test]
    async fn filename_and_size_propagate_from_chunk_zero() {
        let (_oracle, registry, clock) = test_oracle();
        registry.upsert(WorkerId::new("w1"), "a:1".to_string());
        let file_id = FileId::new("f");

        // Simulate the ingest pipeline's placeholder write.
        let catalog = MemCatalog::new();
        catalog
            .create_placeholder(&file_id, "big.bin", 999, clock.now())
            .await
            .unwrap();
        let metrics = metric::Registry::new();
        let oracle = Oracle::new(
            Arc::clone(&registry),
            Arc::new(catalog),
            Arc::clone(&clock) as Arc<dyn TimeProvider>,
            &metrics,
        );

        let placement0 = oracle.assign_worker(&file_id, 0).await.unwrap();
        assert_eq!(placement0.worker_id, WorkerId::new("w1"));
        let placement1 = oracle.assign_worker(&file_id, 1).await.unwrap();
        assert_eq!(placement1.worker_id, WorkerId::new("w1"));
    }
}
