//! The worker storage engine (C6): disk I/O for chunks, keyed by
//! `<fileId>_<chunkId>.chunk` under `STORAGE_ROOT/<workerId>/` (§4.6, resolving §9's
//! chunk-key collision question — the reference used `chunk_<chunkId>.chunk` alone,
//! which collides across files sharing a `chunkId`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use data_types::{ChunkId, FileId, WorkerId};
use metric::{Metric, Registry};
use observability_deps::tracing::warn;
use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[derive(Debug, Snafu)]
pub enum StorageError {
    #[snafu(display("could not create storage directory {}: {}", path.display(), source))]
    CreateDir { path: PathBuf, source: std::io::Error },

    #[snafu(display("could not write chunk to {}: {}", path.display(), source))]
    Write { path: PathBuf, source: std::io::Error },

    #[snafu(display("could not read chunk from {}: {}", path.display(), source))]
    Read { path: PathBuf, source: std::io::Error },
}

pub type Result<T, E = StorageError> = std::result::Result<T, E>;

/// Disk-backed chunk store for one worker identity.
#[derive(Debug, Clone)]
pub struct StorageEngine {
    root: PathBuf,
    worker_id: WorkerId,
    ops: Arc<Metric>,
}

impl StorageEngine {
    /// `storage_root` is the configured `STORAGE_ROOT`; chunks for this worker land
    /// under `storage_root/<worker_id>/`.
    pub fn new(storage_root: impl Into<PathBuf>, worker_id: WorkerId, metrics: &Registry) -> Self {
        Self {
            root: storage_root.into(),
            worker_id,
            ops: metrics.register_counter("worker_storage_ops", "chunk store/retrieve outcomes"),
        }
    }

    fn record(&self, op: &'static str, result: &'static str) {
        self.ops
            .recorder(vec![("op", op.to_string()), ("result", result.to_string())])
            .inc(1);
    }

    fn chunk_path(&self, file_id: &FileId, chunk_id: ChunkId) -> PathBuf {
        self.root
            .join(self.worker_id.as_str())
            .join(format!("{}_{}.chunk", file_id.as_str(), chunk_id))
    }

    /// Write `bytes` for `(file_id, chunk_id)`, creating directories as needed.
    /// Overwrites any existing file at that path (§4.6 idempotence note).
    pub async fn store(&self, file_id: &FileId, chunk_id: ChunkId, bytes: &[u8]) -> Result<()> {
        match self.store_inner(file_id, chunk_id, bytes).await {
            Ok(()) => {
                self.record("store", "ok");
                Ok(())
            }
            Err(e) => {
                self.record("store", "error");
                Err(e)
            }
        }
    }

    async fn store_inner(&self, file_id: &FileId, chunk_id: ChunkId, bytes: &[u8]) -> Result<()> {
        let path = self.chunk_path(file_id, chunk_id);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .context(CreateDirSnafu { path: dir.to_path_buf() })?;
        }
        let mut file = tokio::fs::File::create(&path)
            .await
            .context(WriteSnafu { path: path.clone() })?;
        file.write_all(bytes).await.context(WriteSnafu { path })?;
        Ok(())
    }

    /// Read back the bytes for `(file_id, chunk_id)`, or `Ok(None)` if no chunk is
    /// stored at that key. I/O errors other than "not found" are also treated as "not
    /// found" at the RPC layer (§4.6) but logged here for diagnosis.
    pub async fn retrieve(&self, file_id: &FileId, chunk_id: ChunkId) -> Option<Vec<u8>> {
        let path = self.chunk_path(file_id, chunk_id);
        match read_file(&path).await {
            Ok(bytes) => {
                self.record("retrieve", "found");
                Some(bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.record("retrieve", "not_found");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "chunk read failed, treating as not found");
                self.record("retrieve", "not_found");
                None
            }
        }
    }
}

async fn read_file(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).await?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_then_retrieve_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let engine = StorageEngine::new(dir.path(), WorkerId::new("w1"), &metric::Registry::new());
        let file_id = FileId::new("f1");

        engine.store(&file_id, 0, b"hello").await.unwrap();
        let bytes = engine.retrieve(&file_id, 0).await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn retrieve_missing_chunk_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let engine = StorageEngine::new(dir.path(), WorkerId::new("w1"), &metric::Registry::new());
        assert!(engine.retrieve(&FileId::new("nope"), 0).await.is_none());
    }

    #[tokio::test]
    async fn store_overwrites_existing_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let engine = StorageEngine::new(dir.path(), WorkerId::new("w1"), &metric::Registry::new());
        let file_id = FileId::new("f1");

        engine.store(&file_id, 0, b"first").await.unwrap();
        engine.store(&file_id, 0, b"second").await.unwrap();
        assert_eq!(engine.retrieve(&file_id, 0).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn no_cross_contamination_between_files_sharing_a_chunk_id() {
        let dir = tempfile::tempdir().unwrap();
        let engine = StorageEngine::new(dir.path(), WorkerId::new("w1"), &metric::Registry::new());

        engine.store(&FileId::new("a"), 0, b"from a").await.unwrap();
        engine.store(&FileId::new("b"), 0, b"from b").await.unwrap();

        assert_eq!(engine.retrieve(&FileId::new("a"), 0).await.unwrap(), b"from a");
        assert_eq!(engine.retrieve(&FileId::new("b"), 0).await.unwrap(), b"from b");
    }
}
