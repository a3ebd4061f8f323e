//! An in-memory [`MetadataCatalog`], used by tests and by single-process demo runs. The
//! whole-map mutex gives the same "one write wins per key" guarantee the Postgres
//! backend gets from `ON CONFLICT`, just coarser-grained.

use std::collections::BTreeMap;

use async_trait::async_trait;
use clock::Time;
use data_types::{ChunkId, ChunkPlacementRow, FileId, WorkerId};
use parking_lot::Mutex;

use crate::interface::{CatalogError, MetadataCatalog, Result, SaveOutcome};

#[derive(Debug, Default)]
pub struct MemCatalog {
    rows: Mutex<BTreeMap<(String, ChunkId), ChunkPlacementRow>>,
}

impl MemCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataCatalog for MemCatalog {
    async fn find_by_filename(&self, filename: &str) -> Result<Option<ChunkPlacementRow>> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|row| row.filename == filename)
            .min_by_key(|row| (row.file_id.clone(), row.chunk_id))
            .cloned())
    }

    async fn find_all_by_file_id(&self, file_id: &FileId) -> Result<Vec<ChunkPlacementRow>> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|row| row.file_id == file_id.as_str())
            .cloned()
            .collect())
    }

    async fn find_by_file_id_and_chunk_id(
        &self,
        file_id: &FileId,
        chunk_id: ChunkId,
    ) -> Result<Option<ChunkPlacementRow>> {
        Ok(self
            .rows
            .lock()
            .get(&(file_id.as_str().to_string(), chunk_id))
            .cloned())
    }

    async fn create_placeholder(
        &self,
        file_id: &FileId,
        filename: &str,
        size: i64,
        upload_time: Time,
    ) -> Result<()> {
        let mut rows = self.rows.lock();
        rows.entry((file_id.as_str().to_string(), 0))
            .or_insert_with(|| ChunkPlacementRow::placeholder(file_id, filename, size, upload_time));
        Ok(())
    }

    async fn assign(
        &self,
        file_id: &FileId,
        chunk_id: ChunkId,
        filename: &str,
        size: i64,
        worker_id: &WorkerId,
        worker_address: &str,
        upload_time: Time,
    ) -> Result<SaveOutcome> {
        let mut rows = self.rows.lock();
        let key = (file_id.as_str().to_string(), chunk_id);

        match rows.get(&key) {
            Some(existing) if existing.is_assigned() => {
                Ok(SaveOutcome::AlreadyExists(existing.clone()))
            }
            _ => {
                let row = ChunkPlacementRow::assigned(
                    file_id,
                    chunk_id,
                    filename,
                    size,
                    worker_id,
                    worker_address,
                    upload_time,
                );
                rows.insert(key, row.clone());
                Ok(SaveOutcome::Inserted(row))
            }
        }
    }
}

#[allow(dead_code)]
fn _assert_error_is_send_sync() {
    fn assert<T: Send + Sync>() {}
    assert::<CatalogError>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clock::Time;

    fn t(n: i64) -> Time {
        Time::from_timestamp_nanos(n)
    }

    #[tokio::test]
    async fn assign_is_idempotent() {
        let catalog = MemCatalog::new();
        let file_id = FileId::new("f1");
        let w1 = WorkerId::new("w1");
        let w2 = WorkerId::new("w2");

        let first = catalog
            .assign(&file_id, 0, "a.txt", 5, &w1, "1.2.3.4:9000", t(1))
            .await
            .unwrap();
        assert_eq!(first, SaveOutcome::Inserted(first.row().clone()));
        assert_eq!(first.row().worker_id(), Some(w1.clone()));

        let second = catalog
            .assign(&file_id, 0, "a.txt", 5, &w2, "5.6.7.8:9000", t(2))
            .await
            .unwrap();
        assert_eq!(second, SaveOutcome::AlreadyExists(first.row().clone()));
        assert_eq!(second.row().worker_id(), Some(w1));
    }

    #[tokio::test]
    async fn placeholder_is_merged_by_assign() {
        let catalog = MemCatalog::new();
        let file_id = FileId::new("f2");
        catalog
            .create_placeholder(&file_id, "b.bin", 42, t(1))
            .await
            .unwrap();

        let assigned = catalog
            .assign(
                &file_id,
                0,
                "b.bin",
                42,
                &WorkerId::new("w1"),
                "addr:1",
                t(2),
            )
            .await
            .unwrap();
        assert!(matches!(assigned, SaveOutcome::Inserted(_)));
        assert_eq!(assigned.row().filename, "b.bin");
        assert_eq!(assigned.row().worker_id(), Some(WorkerId::new("w1")));

        // Only one row exists for (f2, 0) — the placeholder was updated, not duplicated.
        let all = catalog.find_all_by_file_id(&file_id).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn find_by_filename_is_deterministic_across_duplicates() {
        let catalog = MemCatalog::new();
        catalog
            .create_placeholder(&FileId::new("zzz"), "dup.txt", 1, t(1))
            .await
            .unwrap();
        catalog
            .create_placeholder(&FileId::new("aaa"), "dup.txt", 1, t(2))
            .await
            .unwrap();

        let found = catalog.find_by_filename("dup.txt").await.unwrap().unwrap();
        assert_eq!(found.file_id, "aaa");
    }
}
