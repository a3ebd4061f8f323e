//! End-to-end test of the chunk consumer loop (C5) against a real `SchedulerService`
//! RPC server backed by the placement oracle (C2) and worker registry (C1): a published
//! chunk is placed with the active worker and lands on disk (§8).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use broker::{ChunkPublisher, MemQueue};
use catalog::{MemCatalog, MetadataCatalog};
use clock::{SystemProvider, TimeProvider};
use data_types::{ChunkMessage, FileId, WorkerId};
use oracle::{Oracle, OracleError, WorkerRegistry};
use rpc_client::ClientPool;
use rpc_types::scheduler::scheduler_service_server::{SchedulerService, SchedulerServiceServer};
use rpc_types::scheduler::scheduler_service_client::SchedulerServiceClient;
use rpc_types::scheduler::{
    AssignWorkerRequest, AssignWorkerResponse, HeartbeatRequest, HeartbeatResponse,
};
use rpc_types::worker::worker_service_client::WorkerServiceClient;
use tonic::{Request, Response, Status};
use worker::{ChunkConsumerLoop, StorageEngine};

/// A minimal `SchedulerService` over the same `Oracle`/`WorkerRegistry` pair
/// [`scheduler::grpc::SchedulerServiceImpl`] wraps in the scheduler binary; duplicated
/// here so this integration test doesn't need to pull in the scheduler crate's HTTP
/// stack just to stand up a gRPC endpoint.
struct TestScheduler {
    registry: Arc<WorkerRegistry>,
    oracle: Arc<Oracle>,
}

#[tonic::async_trait]
impl SchedulerService for TestScheduler {
    async fn send_heartbeat(
        &self,
        request: Request<HeartbeatRequest>,
    ) -> Result<Response<HeartbeatResponse>, Status> {
        let req = request.into_inner();
        self.registry.upsert(WorkerId::new(req.worker_id), req.address);
        Ok(Response::new(HeartbeatResponse { acknowledged: true, message: String::new() }))
    }

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
            Err(OracleError::AlreadyAssigned { worker_id, worker_address, .. }) => {
                Err(Status::already_exists(format!("{worker_id}|{worker_address}")))
            }
            Err(e @ OracleError::NoActiveWorkers { .. }) => Err(Status::unavailable(e.to_string())),
            Err(e @ OracleError::Catalog { .. }) => Err(Status::internal(e.to_string())),
        }
    }
}

async fn spawn_scheduler() -> (SocketAddr, Arc<WorkerRegistry>, Arc<dyn MetadataCatalog>) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemProvider::new());
    let registry = Arc::new(WorkerRegistry::new(Arc::clone(&time_provider)));
    let catalog: Arc<dyn MetadataCatalog> = Arc::new(MemCatalog::new());
    let metrics = metric::Registry::new();
    let oracle = Arc::new(Oracle::new(
        Arc::clone(&registry),
        Arc::clone(&catalog),
        time_provider,
        &metrics,
    ));
    let service = TestScheduler { registry: Arc::clone(&registry), oracle };

    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(SchedulerServiceServer::new(service))
            .serve(addr)
            .await
            .unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, registry, catalog)
}

#[tokio::test]
async fn published_chunk_lands_on_disk_and_is_retrievable() {
    let (scheduler_addr, registry, catalog) = spawn_scheduler().await;
    registry.upsert(WorkerId::new("w1"), "unused:0".to_string());

    let dir = tempfile::tempdir().unwrap();
    let metrics = metric::Registry::new();
    let storage = StorageEngine::new(dir.path(), WorkerId::new("w1"), &metrics);

    let queue = Arc::new(MemQueue::new(&metrics));
    let scheduler_pool = Arc::new(ClientPool::new(SchedulerServiceClient::new));
    let worker_pool = Arc::new(ClientPool::new(WorkerServiceClient::new));

    let consumer_loop = ChunkConsumerLoop::new(
        WorkerId::new("w1"),
        "w1-addr:0".to_string(),
        Arc::clone(&queue) as Arc<dyn broker::ChunkConsumer>,
        storage.clone(),
        scheduler_addr.to_string(),
        scheduler_pool,
        worker_pool,
    );
    tokio::spawn(async move { consumer_loop.run().await });

    let file_id = FileId::new("f1");
    queue
        .publish(&ChunkMessage::new(file_id.clone(), 0, b"hello world".to_vec()))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let bytes = storage.retrieve(&file_id, 0).await;
    assert_eq!(bytes, Some(b"hello world".to_vec()));

    let row = catalog
        .find_by_file_id_and_chunk_id(&file_id, 0)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.worker_id().unwrap(), WorkerId::new("w1"));
}

/// When the oracle assigns a chunk to a peer, the consumer forwards it over
/// `StoreChunk` rather than writing it locally (§4.5 step 4).
#[tokio::test]
async fn chunk_assigned_to_a_peer_is_forwarded_and_stored_there() {
    let (scheduler_addr, registry, _catalog) = spawn_scheduler().await;

    let peer_dir = tempfile::tempdir().unwrap();
    let peer_metrics = metric::Registry::new();
    let peer_storage = StorageEngine::new(peer_dir.path(), WorkerId::new("w2"), &peer_metrics);
    let peer_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let peer_addr = peer_listener.local_addr().unwrap();
    drop(peer_listener);
    {
        let service = worker::WorkerServiceImpl::new(WorkerId::new("w2"), peer_storage.clone());
        tokio::spawn(async move {
            tonic::transport::Server::builder()
                .add_service(rpc_types::worker::worker_service_server::WorkerServiceServer::new(service))
                .serve(peer_addr)
                .await
                .unwrap();
        });
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Registration order decides round-robin: w2 first so the oracle's first
    // assignment lands on it, forcing the "w1" consumer below to forward.
    registry.upsert(WorkerId::new("w2"), peer_addr.to_string());
    registry.upsert(WorkerId::new("w1"), "unused:0".to_string());

    let own_dir = tempfile::tempdir().unwrap();
    let own_metrics = metric::Registry::new();
    let own_storage = StorageEngine::new(own_dir.path(), WorkerId::new("w1"), &own_metrics);

    let queue = Arc::new(MemQueue::new(&own_metrics));
    let scheduler_pool = Arc::new(ClientPool::new(SchedulerServiceClient::new));
    let worker_pool = Arc::new(ClientPool::new(WorkerServiceClient::new));

    let consumer_loop = ChunkConsumerLoop::new(
        WorkerId::new("w1"),
        "w1-addr:0".to_string(),
        Arc::clone(&queue) as Arc<dyn broker::ChunkConsumer>,
        own_storage.clone(),
        scheduler_addr.to_string(),
        scheduler_pool,
        worker_pool,
    );
    tokio::spawn(async move { consumer_loop.run().await });

    let file_id = FileId::new("f2");
    queue
        .publish(&ChunkMessage::new(file_id.clone(), 0, b"forwarded".to_vec()))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(peer_storage.retrieve(&file_id, 0).await, Some(b"forwarded".to_vec()));
    assert_eq!(own_storage.retrieve(&file_id, 0).await, None);
}
