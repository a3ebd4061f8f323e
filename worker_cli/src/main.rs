//! The worker binary: wires the chunk consumer loop (C5), storage engine (C6),
//! `WorkerService` RPC surface, and heartbeat loop (C7) onto one configuration and runs
//! them concurrently, the way `ioxd_ingester` wires `ingester`'s components onto one
//! `Config` in the teacher workspace.

mod config;

use std::sync::Arc;
use std::time::Duration;

use broker::AmqpConsumer;
use clap::Parser;
use config::{Config, LogFormat};
use data_types::WorkerId;
use metric::Registry;
use observability_deps::tracing::{info, warn};
use rpc_client::ClientPool;
use rpc_types::scheduler::scheduler_service_client::SchedulerServiceClient;
use rpc_types::worker::worker_service_client::WorkerServiceClient;
use rpc_types::worker::worker_service_server::WorkerServiceServer;
use tonic::transport::Server;
use worker::{ChunkConsumerLoop, HeartbeatLoop, StorageEngine, WorkerServiceImpl};

/// Bound on draining in-flight `StoreChunk`/`RetrieveChunk` RPCs after a shutdown signal
/// (§5), after which the process exits regardless of what's still outstanding.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("invalid bind address: {0}")]
    Bind(#[from] std::net::AddrParseError),

    #[error("could not connect to the broker: {0}")]
    Broker(#[from] broker::BrokerError),

    #[error("RPC server failed: {0}")]
    Transport(#[from] tonic::transport::Error),
}

fn init_logging(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::new(config.log_filter.clone());
    match config.log_format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(env_filter).pretty().init(),
        LogFormat::Compact => tracing_subscriber::fmt().with_env_filter(env_filter).compact().init(),
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(env_filter).json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = dotenvy::dotenv();
    let config = Config::parse();
    init_logging(&config);

    let worker_id = WorkerId::new(config.worker_id.clone());
    let advertise_address = config.advertise_address();
    let bind_addr = config.bind_addr()?;
    let metrics = Registry::new();

    info!(worker_id = %worker_id, %advertise_address, %bind_addr, "starting worker");

    let amqp_channel = broker::connect_channel(&config.amqp_addr).await?;
    let consumer = Arc::new(
        AmqpConsumer::new(amqp_channel, worker_id.as_str(), &metrics).await?,
    );

    let storage = StorageEngine::new(config.storage_root(), worker_id.clone(), &metrics);

    let scheduler_pool = Arc::new(ClientPool::new(SchedulerServiceClient::new));
    let worker_pool = Arc::new(ClientPool::new(WorkerServiceClient::new));

    let consumer_loop = ChunkConsumerLoop::new(
        worker_id.clone(),
        advertise_address.clone(),
        consumer,
        storage.clone(),
        config.scheduler_address(),
        Arc::clone(&scheduler_pool),
        Arc::clone(&worker_pool),
    );

    let heartbeat_loop = HeartbeatLoop::new(
        worker_id.as_str().to_string(),
        advertise_address,
        config.scheduler_address(),
        Arc::clone(&scheduler_pool),
    );

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

    let rpc_service = WorkerServiceImpl::new(worker_id, storage);
    let rpc_server = Server::builder()
        .add_service(WorkerServiceServer::new(rpc_service))
        .serve_with_shutdown(bind_addr, async move {
            let _ = shutdown_rx.changed().await;
        });

    info!(%bind_addr, "WorkerService RPC listening");

    let consumer_handle = tokio::spawn(async move { consumer_loop.run().await });
    let heartbeat_handle = tokio::spawn(async move { heartbeat_loop.run().await });
    let mut rpc_handle = tokio::spawn(rpc_server);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!(grace = ?SHUTDOWN_GRACE, "shutdown signal received, draining in-flight RPCs");
        }
        result = &mut rpc_handle => {
            consumer_handle.abort();
            heartbeat_handle.abort();
            return result.expect("RPC server task panicked").map_err(Error::from);
        }
    }

    consumer_handle.abort();
    heartbeat_handle.abort();
    let _ = shutdown_tx.send(true);

    if tokio::time::timeout(SHUTDOWN_GRACE, rpc_handle).await.is_err() {
        warn!("shutdown grace period elapsed with RPCs still in flight, exiting anyway");
    }

    Ok(())
}
