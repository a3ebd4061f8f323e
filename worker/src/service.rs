//! The `WorkerService` RPC surface (§4.6, §6): `StoreChunk`/`RetrieveChunk`.

use data_types::{FileId, WorkerId};
use observability_deps::tracing::{error, warn};
use rpc_types::worker::worker_service_server::WorkerService;
use rpc_types::worker::{
    RetrieveChunkRequest, RetrieveChunkResponse, StoreChunkRequest, StoreChunkResponse,
};
use tonic::{Request, Response, Status};

use crate::storage::StorageEngine;

/// Implements the generated [`WorkerService`] trait over a [`StorageEngine`].
#[derive(Debug)]
pub struct WorkerServiceImpl {
    worker_id: WorkerId,
    storage: StorageEngine,
}

impl WorkerServiceImpl {
    pub fn new(worker_id: WorkerId, storage: StorageEngine) -> Self {
        Self { worker_id, storage }
    }

    fn check_worker_id(&self, requested: &str) -> Result<(), Status> {
        if requested != self.worker_id.as_str() {
            return Err(Status::invalid_argument(format!(
                "worker_id mismatch: request addressed {requested:?}, this engine is {:?}",
                self.worker_id.as_str()
            )));
        }
        Ok(())
    }
}

#[tonic::async_trait]
impl WorkerService for WorkerServiceImpl {
    async fn store_chunk(
        &self,
        request: Request<StoreChunkRequest>,
    ) -> Result<Response<StoreChunkResponse>, Status> {
        let req = request.into_inner();
        self.check_worker_id(&req.worker_id)?;

        let file_id = FileId::new(req.file_id);
        match self.storage.store(&file_id, req.chunk_id, &req.chunk_data).await {
            Ok(()) => Ok(Response::new(StoreChunkResponse {
                success: true,
                message: String::new(),
            })),
            Err(e) => {
                error!(error = %e, %file_id, chunk_id = req.chunk_id, "store_chunk failed");
                Ok(Response::new(StoreChunkResponse {
                    success: false,
                    message: e.to_string(),
                }))
            }
        }
    }

    async fn retrieve_chunk(
        &self,
        request: Request<RetrieveChunkRequest>,
    ) -> Result<Response<RetrieveChunkResponse>, Status> {
        let req = request.into_inner();
        self.check_worker_id(&req.worker_id)?;

        let file_id = FileId::new(req.file_id);
        match self.storage.retrieve(&file_id, req.chunk_id).await {
            Some(bytes) => Ok(Response::new(RetrieveChunkResponse {
                chunk_data: bytes,
                found: true,
            })),
            None => {
                warn!(%file_id, chunk_id = req.chunk_id, "retrieve_chunk found nothing");
                Ok(Response::new(RetrieveChunkResponse {
                    chunk_data: Vec::new(),
                    found: false,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_mismatched_worker_id() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageEngine::new(dir.path(), WorkerId::new("w1"), &metric::Registry::new());
        let service = WorkerServiceImpl::new(WorkerId::new("w1"), storage);

        let err = service
            .store_chunk(Request::new(StoreChunkRequest {
                worker_id: "w2".to_string(),
                file_id: "f".to_string(),
                chunk_id: 0,
                chunk_data: vec![1],
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn store_then_retrieve_through_the_service() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageEngine::new(dir.path(), WorkerId::new("w1"), &metric::Registry::new());
        let service = WorkerServiceImpl::new(WorkerId::new("w1"), storage);

        service
            .store_chunk(Request::new(StoreChunkRequest {
                worker_id: "w1".to_string(),
                file_id: "f".to_string(),
                chunk_id: 0,
                chunk_data: vec![9, 9, 9],
            }))
            .await
            .unwrap();

        let resp = service
            .retrieve_chunk(Request::new(RetrieveChunkRequest {
                worker_id: "w1".to_string(),
                file_id: "f".to_string(),
                chunk_id: 0,
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(resp.found);
        assert_eq!(resp.chunk_data, vec![9, 9, 9]);
    }

    #[tokio::test]
    async fn retrieve_not_found_reports_found_false() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageEngine::new(dir.path(), WorkerId::new("w1"), &metric::Registry::new());
        let service = WorkerServiceImpl::new(WorkerId::new("w1"), storage);

        let resp = service
            .retrieve_chunk(Request::new(RetrieveChunkRequest {
                worker_id: "w1".to_string(),
                file_id: "nope".to_string(),
                chunk_id: 0,
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(!resp.found);
        assert!(resp.chunk_data.is_empty());
    }
}
