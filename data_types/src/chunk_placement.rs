use clock::Time;
use serde::{Deserialize, Serialize};

use crate::ids::{ChunkId, FileId, WorkerId};

/// Size, in bytes, of a single chunk. The last chunk of a file may be shorter.
pub const CHUNK_SIZE: usize = 128 * 1024;

/// A row of the persistent `file_metadata` table (§3, §6): the immutable record of where
/// one chunk of one file lives, plus the file-level bookkeeping (`filename`, `size`) that
/// is carried on every row so a reader never needs a second table to resolve a filename.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, Deserialize)]
pub struct ChunkPlacementRow {
    pub file_id: String,
    pub chunk_id: ChunkId,
    pub filename: String,
    pub size: i64,
    pub worker_id: Option<String>,
    pub worker_address: Option<String>,
    pub upload_time: i64,
}

impl ChunkPlacementRow {
    /// Build the placeholder row the ingest pipeline writes for chunk 0 before chunking
    /// starts (§4.4): it records the file's existence but carries no worker assignment.
    pub fn placeholder(file_id: &FileId, filename: &str, size: i64, upload_time: Time) -> Self {
        Self {
            file_id: file_id.as_str().to_string(),
            chunk_id: 0,
            filename: filename.to_string(),
            size,
            worker_id: None,
            worker_address: None,
            upload_time: upload_time.timestamp_nanos(),
        }
    }

    /// Build a fully-assigned row, as written by the placement oracle (§4.2).
    pub fn assigned(
        file_id: &FileId,
        chunk_id: ChunkId,
        filename: &str,
        size: i64,
        worker_id: &WorkerId,
        worker_address: &str,
        upload_time: Time,
    ) -> Self {
        Self {
            file_id: file_id.as_str().to_string(),
            chunk_id,
            filename: filename.to_string(),
            size,
            worker_id: Some(worker_id.as_str().to_string()),
            worker_address: Some(worker_address.to_string()),
            upload_time: upload_time.timestamp_nanos(),
        }
    }

    /// True once a worker has been recorded for this row.
    pub fn is_assigned(&self) -> bool {
        self.worker_id.is_some()
    }

    pub fn worker_id(&self) -> Option<WorkerId> {
        self.worker_id.as_deref().map(WorkerId::new)
    }
}

/// Number of chunks a file of `size` bytes splits into (§3): `ceil(size / CHUNK_SIZE)`,
/// with the empty file yielding zero chunks.
pub fn chunk_count(size: u64) -> u64 {
    if size == 0 {
        0
    } else {
        (size + CHUNK_SIZE as u64 - 1) / CHUNK_SIZE as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_count_matches_spec_boundaries() {
        assert_eq!(chunk_count(0), 0);
        assert_eq!(chunk_count(1), 1);
        assert_eq!(chunk_count(CHUNK_SIZE as u64 - 1), 1);
        assert_eq!(chunk_count(CHUNK_SIZE as u64), 1);
        assert_eq!(chunk_count(CHUNK_SIZE as u64 + 1), 2);
        assert_eq!(chunk_count(10 * CHUNK_SIZE as u64), 10);
    }
}
