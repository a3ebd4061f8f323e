use data_types::{ChunkId, FileId, WorkerId};
use snafu::Snafu;

/// Errors surfaced by [`crate::Oracle::assign_worker`].
#[derive(Debug, Snafu)]
pub enum OracleError {
    #[snafu(display("no active workers available to place ({}, {})", file_id, chunk_id))]
    NoActiveWorkers { file_id: FileId, chunk_id: ChunkId },

    #[snafu(display(
        "chunk ({}, {}) is already assigned to worker {} at {}",
        file_id,
        chunk_id,
        worker_id,
        worker_address
    ))]
    AlreadyAssigned {
        file_id: FileId,
        chunk_id: ChunkId,
        worker_id: WorkerId,
        worker_address: String,
    },

    #[snafu(display("error persisting placement: {}", source))]
    Catalog { source: catalog::CatalogError },
}

pub type Result<T, E = OracleError> = std::result::Result<T, E>;

/// The decision a successful [`crate::Oracle::assign_worker`] call returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub worker_id: WorkerId,
    pub worker_address: String,
}
