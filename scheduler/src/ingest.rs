//! The ingest pipeline (C4, §4.4): framework-agnostic upload/download business logic.
//! [`crate::http`] is the thin hyper wiring on top of this.

use std::sync::Arc;

use broker::ChunkPublisher;
use catalog::MetadataCatalog;
use clock::TimeProvider;
use data_types::{chunk_count, ChunkMessage, FileId, CHUNK_SIZE};
use observability_deps::tracing::warn;
use rpc_client::ClientPool;
use rpc_types::worker::worker_service_client::WorkerServiceClient;
use rpc_types::worker::RetrieveChunkRequest;
use snafu::{OptionExt, ResultExt, Snafu};
use tonic::transport::Channel;

#[derive(Debug, Snafu)]
pub enum IngestError {
    #[snafu(display("error accessing the metadata store: {}", source))]
    Catalog { source: catalog::CatalogError },

    #[snafu(display("error publishing chunk to the broker: {}", source))]
    Publish { source: broker::BrokerError },

    #[snafu(display("no file is recorded under filename {:?}", filename))]
    NotFound { filename: String },

    #[snafu(display("chunk ({}, {}) has no recorded placement, file is incomplete", file_id, chunk_id))]
    ChunkUnavailable { file_id: FileId, chunk_id: data_types::ChunkId },

    #[snafu(display("could not reach worker at {}: {}", address, source))]
    Client { address: String, source: rpc_client::ClientError },

    #[snafu(display("RetrieveChunk({}, {}) failed: {}", file_id, chunk_id, source))]
    Retrieve { file_id: FileId, chunk_id: data_types::ChunkId, source: tonic::Status },

    #[snafu(display("worker reported chunk ({}, {}) not found", file_id, chunk_id))]
    ChunkNotFound { file_id: FileId, chunk_id: data_types::ChunkId },
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

/// Drives the upload (chunk + publish) and download (resolve + fan-out retrieve +
/// reassemble) paths over the catalog, broker, and worker RPC pool.
#[derive(Debug)]
pub struct IngestPipeline {
    catalog: Arc<dyn MetadataCatalog>,
    publisher: Arc<dyn ChunkPublisher>,
    worker_pool: Arc<ClientPool<WorkerServiceClient<Channel>>>,
    time_provider: Arc<dyn TimeProvider>,
}

impl IngestPipeline {
    pub fn new(
        catalog: Arc<dyn MetadataCatalog>,
        publisher: Arc<dyn ChunkPublisher>,
        worker_pool: Arc<ClientPool<WorkerServiceClient<Channel>>>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            catalog,
            publisher,
            worker_pool,
            time_provider,
        }
    }

    /// Split `bytes` into `CHUNK_SIZE` chunks, write the chunk-0 placeholder, and publish
    /// one `ChunkMessage` per chunk. Returns the number of chunks sent (`0` for an empty
    /// file).
    pub async fn upload(&self, filename: &str, bytes: &[u8]) -> Result<usize> {
        let file_id = FileId::generate();
        let now = self.time_provider.now();
        self.catalog
            .create_placeholder(&file_id, filename, bytes.len() as i64, now)
            .await
            .context(CatalogSnafu)?;

        for (i, chunk) in bytes.chunks(CHUNK_SIZE).enumerate() {
            let message = ChunkMessage::new(file_id.clone(), i as i64, chunk.to_vec());
            self.publisher.publish(&message).await.context(PublishSnafu)?;
        }
        Ok(chunk_count(bytes.len() as u64) as usize)
    }

    /// Resolve `filename` to a `fileId`, fetch every chunk row, and reassemble the bytes
    /// in `chunkId` order by calling `RetrieveChunk` against each recorded worker.
    pub async fn download(&self, filename: &str) -> Result<Vec<u8>> {
        let head = self
            .catalog
            .find_by_filename(filename)
            .await
            .context(CatalogSnafu)?
            .context(NotFoundSnafu { filename: filename.to_string() })?;

        if head.size == 0 {
            return Ok(Vec::new());
        }

        let file_id = FileId::new(head.file_id.clone());
        let mut rows = self
            .catalog
            .find_all_by_file_id(&file_id)
            .await
            .context(CatalogSnafu)?;
        rows.sort_by_key(|row| row.chunk_id);

        let mut out = Vec::with_capacity(head.size.max(0) as usize);
        for row in rows {
            let chunk_id = row.chunk_id;
            let worker_id = row
                .worker_id()
                .context(ChunkUnavailableSnafu { file_id: file_id.clone(), chunk_id })?;
            let address = row
                .worker_address
                .context(ChunkUnavailableSnafu { file_id: file_id.clone(), chunk_id })?;

            let mut client = self
                .worker_pool
                .get(&address)
                .await
                .context(ClientSnafu { address: address.clone() })?;

            let resp = match client
                .retrieve_chunk(RetrieveChunkRequest {
                    worker_id: worker_id.as_str().to_string(),
                    file_id: file_id.as_str().to_string(),
                    chunk_id,
                })
                .await
            {
                Ok(resp) => resp.into_inner(),
                Err(status) => {
                    self.worker_pool.invalidate(&address);
                    return Err(IngestError::Retrieve { file_id, chunk_id, source: status });
                }
            };

            if !resp.found {
                warn!(%file_id, chunk_id, address, "worker reported chunk not found");
                return ChunkNotFoundSnafu { file_id, chunk_id }.fail();
            }
            out.extend(resp.chunk_data);
        }
        Ok(out)
    }
}
