//! The chunk consumer (C5, §4.5): reads chunk messages off the broker, asks the
//! scheduler's placement oracle where they belong, and stores locally or forwards to
//! the assigned peer.

use std::sync::Arc;

use backoff::{Backoff, BackoffConfig};
use broker::{ChunkConsumer, Delivery};
use data_types::WorkerId;
use observability_deps::tracing::{info, warn};
use rpc_client::ClientPool;
use rpc_types::scheduler::scheduler_service_client::SchedulerServiceClient;
use rpc_types::scheduler::AssignWorkerRequest;
use rpc_types::worker::worker_service_client::WorkerServiceClient;
use rpc_types::worker::StoreChunkRequest;
use tonic::transport::Channel;
use tonic::Code;

use crate::storage::StorageEngine;

/// Runs the consume loop for one worker process. Single-threaded by design (§4.5
/// backpressure note): placements are handled one at a time.
pub struct ChunkConsumerLoop {
    worker_id: WorkerId,
    self_address: String,
    consumer: Arc<dyn ChunkConsumer>,
    storage: StorageEngine,
    scheduler_address: String,
    scheduler_pool: Arc<ClientPool<SchedulerServiceClient<Channel>>>,
    worker_pool: Arc<ClientPool<WorkerServiceClient<Channel>>>,
    backoff_config: BackoffConfig,
}

impl ChunkConsumerLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker_id: WorkerId,
        self_address: String,
        consumer: Arc<dyn ChunkConsumer>,
        storage: StorageEngine,
        scheduler_address: String,
        scheduler_pool: Arc<ClientPool<SchedulerServiceClient<Channel>>>,
        worker_pool: Arc<ClientPool<WorkerServiceClient<Channel>>>,
    ) -> Self {
        Self {
            worker_id,
            self_address,
            consumer,
            storage,
            scheduler_address,
            scheduler_pool,
            worker_pool,
            backoff_config: BackoffConfig::default(),
        }
    }

    /// Run forever, processing one delivery at a time.
    pub async fn run(&self) {
        loop {
            let delivery = match self.consumer.next().await {
                Ok(delivery) => delivery,
                Err(e) => {
                    warn!(error = %e, "broker consumer error, retrying");
                    continue;
                }
            };
            self.process(delivery).await;
        }
    }

    async fn process(&self, delivery: Delivery) {
        let file_id = delivery.message.file_id();
        let chunk_id = delivery.message.chunk_id();
        let bytes = delivery.message.into_bytes();

        // The client-pool lookup is the only step retried with backoff: it only fails
        // on a transport-level connect error. The RPC's own Status (ALREADY_EXISTS,
        // UNAVAILABLE) is a business-level outcome handled explicitly below, not
        // retried here (§4.5 step 3).
        let mut client = Backoff::new(&self.backoff_config)
            .retry_all_errors("scheduler_client_connect", || {
                self.scheduler_pool.get(&self.scheduler_address)
            })
            .await
            .expect("retry_all_errors never gives up");

        let outcome = match client
            .assign_worker_for_chunk(AssignWorkerRequest {
                requester_worker_id: self.worker_id.as_str().to_string(),
                file_id: file_id.as_str().to_string(),
                chunk_id,
            })
            .await
        {
            Ok(resp) => AssignOutcome::Assigned(resp.into_inner()),
            Err(status) if status.code() == Code::AlreadyExists => {
                AssignOutcome::AlreadyAssigned(status.message().to_string())
            }
            Err(status) => {
                self.scheduler_pool.invalidate(&self.scheduler_address);
                AssignOutcome::Unavailable(status.message().to_string())
            }
        };

        let (assigned_worker_id, assigned_worker_address) = match outcome {
            AssignOutcome::Assigned(resp) => (resp.assigned_worker_id, resp.assigned_worker_address),
            AssignOutcome::AlreadyAssigned(message) => match message.split_once('|') {
                Some((worker_id, worker_address)) => {
                    (worker_id.to_string(), worker_address.to_string())
                }
                None => {
                    warn!(%file_id, chunk_id, message, "malformed ALREADY_EXISTS message, nacking");
                    delivery.nack().await;
                    return;
                }
            },
            AssignOutcome::Unavailable(message) => {
                warn!(%file_id, chunk_id, message, "no active workers, nacking for redelivery");
                delivery.nack().await;
                return;
            }
        };

        let stored = if assigned_worker_id == self.worker_id.as_str() {
            self.storage.store(&file_id, chunk_id, &bytes).await.is_ok()
        } else {
            self.forward_to_peer(&assigned_worker_address, &assigned_worker_id, &file_id, chunk_id, &bytes)
                .await
        };

        if stored {
            info!(%file_id, chunk_id, assigned_worker_id, "chunk placed");
            delivery.ack().await;
        } else {
            warn!(%file_id, chunk_id, assigned_worker_id, "store failed, nacking for redelivery");
            delivery.nack().await;
        }
    }

    async fn forward_to_peer(
        &self,
        address: &str,
        worker_id: &str,
        file_id: &data_types::FileId,
        chunk_id: data_types::ChunkId,
        bytes: &[u8],
    ) -> bool {
        let mut client = match self.worker_pool.get(address).await {
            Ok(client) => client,
            Err(e) => {
                warn!(address, error = %e, "could not reach peer worker");
                return false;
            }
        };

        match client
            .store_chunk(StoreChunkRequest {
                worker_id: worker_id.to_string(),
                file_id: file_id.as_str().to_string(),
                chunk_id,
                chunk_data: bytes.to_vec(),
            })
            .await
        {
            Ok(resp) => resp.into_inner().success,
            Err(status) => {
                warn!(address, error = %status, "peer StoreChunk RPC failed");
                self.worker_pool.invalidate(address);
                false
            }
        }
    }

    /// The address this worker advertises to peers and the scheduler.
    pub fn self_address(&self) -> &str {
        &self.self_address
    }
}

enum AssignOutcome {
    Assigned(rpc_types::scheduler::AssignWorkerResponse),
    AlreadyAssigned(String),
    Unavailable(String),
}
