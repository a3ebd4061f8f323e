//! The `SchedulerService` RPC surface (C1/C2 wiring, §6): workers call this to register
//! liveness and to ask the placement oracle for a chunk's assigned worker.

use std::sync::Arc;

use oracle::{Oracle, OracleError, WorkerRegistry};
use rpc_types::scheduler::scheduler_service_server::SchedulerService;
use rpc_types::scheduler::{
    AssignWorkerRequest, AssignWorkerResponse, HeartbeatRequest, HeartbeatResponse,
};
use tonic::{Request, Response, Status};

use data_types::{FileId, WorkerId};

#[derive(Debug)]
pub struct SchedulerServiceImpl {
    registry: Arc<WorkerRegistry>,
    oracle: Arc<Oracle>,
}

impl SchedulerServiceImpl {
    pub fn new(registry: Arc<WorkerRegistry>, oracle: Arc<Oracle>) -> Self {
        Self { registry, oracle }
    }
}

#[tonic::async_trait]
impl SchedulerService for SchedulerServiceImpl {
    async fn send_heartbeat(
        &self,
        request: Request<HeartbeatRequest>,
    ) -> Result<Response<HeartbeatResponse>, Status> {
        let req = request.into_inner();
        self.registry
            .upsert(WorkerId::new(req.worker_id), req.address);
        Ok(Response::new(HeartbeatResponse {
            acknowledged: true,
            message: String::new(),
        }))
    }

    /// Maps [`OracleError`] to the `tonic::Status` codes documented on
    /// [`rpc_types::scheduler::AssignWorkerResponse`]: `UNAVAILABLE` when no worker is
    /// active, `ALREADY_EXISTS` (message `"<worker_id>|<worker_address>"`) when the pair
    /// was already placed.
    async fn assign_worker_for_chunk(
        &self,
        request: Request<AssignWorkerRequest>,
    ) -> Result<Response<AssignWorkerResponse>, Status> {
        let req = request.into_inner();
        let file_id = FileId::new(req.file_id);

        match self.oracle.assign_worker(&file_id, req.chunk_id).await {
            Ok(placement) => Ok(Response::new(AssignWorkerResponse {
                assigned_worker_id: placement.worker_id.as_str().to_string(),
                assigned_worker_address: placement.worker_address,
            })),
            Err(OracleError::AlreadyAssigned {
                worker_id,
                worker_address,
                ..
            }) => Err(Status::already_exists(format!("{worker_id}|{worker_address}"))),
            Err(e @ OracleError::NoActiveWorkers { .. }) => Err(Status::unavailable(e.to_string())),
            Err(e @ OracleError::Catalog { .. }) => Err(Status::internal(e.to_string())),
        }
    }
}
