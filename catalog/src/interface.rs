use async_trait::async_trait;
use clock::Time;
use data_types::{ChunkId, ChunkPlacementRow, FileId, WorkerId};
use snafu::Snafu;

/// Errors surfaced by a [`MetadataCatalog`] implementation.
#[derive(Debug, Snafu)]
pub enum CatalogError {
    #[snafu(display("error querying the metadata store: {}", source))]
    Query { source: sqlx::Error },

    #[snafu(display(
        "composite-key conflict on ({}, {}) could not be resolved as an idempotent re-assignment",
        file_id,
        chunk_id
    ))]
    IntegrityViolation { file_id: String, chunk_id: ChunkId },
}

pub type Result<T, E = CatalogError> = std::result::Result<T, E>;

/// The outcome of [`MetadataCatalog::assign`] (§4.2 step 5): either this call won the
/// race and created the placement, or a placement already existed and must be honored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// This call created the row.
    Inserted(ChunkPlacementRow),
    /// A row already existed for this `(file_id, chunk_id)`; it was left untouched.
    AlreadyExists(ChunkPlacementRow),
}

impl SaveOutcome {
    pub fn row(&self) -> &ChunkPlacementRow {
        match self {
            SaveOutcome::Inserted(row) | SaveOutcome::AlreadyExists(row) => row,
        }
    }
}

/// Typed surface over the persistent `file_metadata` table (§4.3).
///
/// The oracle is the only caller of [`assign`](Self::assign); the ingest pipeline only
/// ever calls [`create_placeholder`](Self::create_placeholder) and the two `find_*`
/// lookups.
#[async_trait]
pub trait MetadataCatalog: std::fmt::Debug + Send + Sync {
    /// Any single row matching `filename`, deterministically the lowest
    /// `(file_id, chunk_id)` when more than one file shares a name.
    async fn find_by_filename(&self, filename: &str) -> Result<Option<ChunkPlacementRow>>;

    /// Every chunk placement row for `file_id`, in no particular order.
    async fn find_all_by_file_id(&self, file_id: &FileId) -> Result<Vec<ChunkPlacementRow>>;

    /// The row for one specific chunk, if it exists.
    async fn find_by_file_id_and_chunk_id(
        &self,
        file_id: &FileId,
        chunk_id: ChunkId,
    ) -> Result<Option<ChunkPlacementRow>>;

    /// Record a file's existence before chunking starts (§4.4): a row with `filename`
    /// and `size` set but no worker assignment. A no-op if the row already exists.
    async fn create_placeholder(
        &self,
        file_id: &FileId,
        filename: &str,
        size: i64,
        upload_time: Time,
    ) -> Result<()>;

    /// Atomically create the placement row for `(file_id, chunk_id)` if one doesn't
    /// already carry a worker assignment, or report the existing one (§4.2 step 5).
    #[allow(clippy::too_many_arguments)]
    async fn assign(
        &self,
        file_id: &FileId,
        chunk_id: ChunkId,
        filename: &str,
        size: i64,
        worker_id: &WorkerId,
        worker_address: &str,
        upload_time: Time,
    ) -> Result<SaveOutcome>;
}
