//! The worker-side heartbeat loop (C7, §4.7): tells the scheduler this worker is alive
//! once per `HEARTBEAT_PERIOD`.

use std::sync::Arc;
use std::time::Duration;

use backoff::{Backoff, BackoffConfig};
use observability_deps::tracing::warn;
use rpc_client::ClientPool;
use rpc_types::scheduler::scheduler_service_client::SchedulerServiceClient;
use rpc_types::scheduler::HeartbeatRequest;
use tonic::transport::Channel;

/// Default period between heartbeats (§4.7).
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(2);

/// Runs the periodic `SendHeartbeat` loop for one worker process.
#[derive(Debug)]
pub struct HeartbeatLoop {
    worker_id: String,
    self_address: String,
    scheduler_address: String,
    scheduler_pool: Arc<ClientPool<SchedulerServiceClient<Channel>>>,
    period: Duration,
}

impl HeartbeatLoop {
    pub fn new(
        worker_id: String,
        self_address: String,
        scheduler_address: String,
        scheduler_pool: Arc<ClientPool<SchedulerServiceClient<Channel>>>,
    ) -> Self {
        Self {
            worker_id,
            self_address,
            scheduler_address,
            scheduler_pool,
            period: HEARTBEAT_PERIOD,
        }
    }

    /// Runs forever, sleeping `period` between each heartbeat. The connection lookup is
    /// retried with backoff (transport errors only); a heartbeat RPC that itself fails is
    /// logged and retried on the next tick rather than blocking the loop.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.period);
        loop {
            interval.tick().await;
            self.send_one().await;
        }
    }

    async fn send_one(&self) {
        let mut client = Backoff::new(&BackoffConfig::default())
            .retry_all_errors("scheduler_client_connect", || {
                self.scheduler_pool.get(&self.scheduler_address)
            })
            .await
            .expect("retry_all_errors never gives up");

        match client
            .send_heartbeat(HeartbeatRequest {
                worker_id: self.worker_id.clone(),
                address: self.self_address.clone(),
            })
            .await
        {
            Ok(resp) => {
                let resp = resp.into_inner();
                if !resp.acknowledged {
                    warn!(message = %resp.message, "scheduler did not acknowledge heartbeat");
                }
            }
            Err(status) => {
                self.scheduler_pool.invalidate(&self.scheduler_address);
                warn!(error = %status, "heartbeat RPC failed, will retry next tick");
            }
        }
    }
}
