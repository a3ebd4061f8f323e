//! The scheduler binary: wires the worker registry (C1), placement oracle (C2),
//! metadata gateway (C3), ingest pipeline (C4), `SchedulerService` RPC surface, and
//! reaper (§4.7) onto one configuration and runs them concurrently, the way
//! `ioxd_router` wires `router`'s components onto one `Config` in the teacher workspace.

mod config;

use std::sync::Arc;
use std::time::Duration;

use broker::{AmqpQueue, ChunkPublisher};
use catalog::{MetadataCatalog, PostgresCatalog};
use clap::Parser;
use clock::{SystemProvider, TimeProvider};
use config::{Config, LogFormat};
use metric::Registry;
use observability_deps::tracing::{info, warn};
use oracle::{Oracle, WorkerRegistry};
use rpc_client::ClientPool;
use rpc_types::scheduler::scheduler_service_server::SchedulerServiceServer;
use rpc_types::worker::worker_service_client::WorkerServiceClient;
use scheduler::{HttpServer, IngestPipeline, ReaperLoop, SchedulerServiceImpl};
use tonic::transport::Server;

/// Bound on draining in-flight RPCs/requests after a shutdown signal (§5), after which
/// the process exits regardless of what's still outstanding.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("invalid listen address: {0}")]
    Bind(#[from] std::net::AddrParseError),

    #[error("could not connect to the database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("could not connect to the broker: {0}")]
    Broker(#[from] broker::BrokerError),

    #[error("RPC server failed: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("HTTP server failed: {0}")]
    Http(#[from] hyper::Error),
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

    let http_addr = config.http_addr()?;
    let rpc_addr = config.rpc_addr()?;
    let metrics = Registry::new();
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemProvider::new());

    info!(%http_addr, %rpc_addr, "starting scheduler");

    let catalog: Arc<dyn MetadataCatalog> =
        Arc::new(PostgresCatalog::connect(&config.database_url).await?);
    let publisher: Arc<dyn ChunkPublisher> =
        Arc::new(AmqpQueue::connect(&config.amqp_addr, &metrics).await?);
    let worker_pool = Arc::new(ClientPool::new(WorkerServiceClient::new));

    let registry = Arc::new(WorkerRegistry::new(Arc::clone(&time_provider)));
    let oracle = Arc::new(Oracle::new(
        Arc::clone(&registry),
        Arc::clone(&catalog),
        Arc::clone(&time_provider),
        &metrics,
    ));

    let pipeline = Arc::new(IngestPipeline::new(
        Arc::clone(&catalog),
        publisher,
        worker_pool,
        time_provider,
    ));

    let (shutdown_tx, shutdown_rx_http) = tokio::sync::watch::channel(false);
    let mut shutdown_rx_rpc = shutdown_rx_http.clone();

    let http_server = HttpServer::new(pipeline).serve_with_shutdown(http_addr, {
        let mut rx = shutdown_rx_http;
        async move {
            let _ = rx.changed().await;
        }
    });

    let grpc_service = SchedulerServiceImpl::new(Arc::clone(&registry), oracle);
    let rpc_server = Server::builder()
        .add_service(SchedulerServiceServer::new(grpc_service))
        .serve_with_shutdown(rpc_addr, async move {
            let _ = shutdown_rx_rpc.changed().await;
        });

    let reaper_loop = ReaperLoop::new(registry);

    info!(%rpc_addr, "SchedulerService RPC listening");

    let mut http_handle = tokio::spawn(http_server);
    let mut rpc_handle = tokio::spawn(rpc_server);
    let reaper_handle = tokio::spawn(async move { reaper_loop.run().await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!(grace = ?SHUTDOWN_GRACE, "shutdown signal received, draining in-flight requests");
        }
        result = &mut http_handle => {
            reaper_handle.abort();
            return result.expect("HTTP server task panicked").map_err(Error::from);
        }
        result = &mut rpc_handle => {
            reaper_handle.abort();
            return result.expect("RPC server task panicked").map_err(Error::from);
        }
    }

    let _ = shutdown_tx.send(true);
    reaper_handle.abort();

    let drain = async {
        let _ = tokio::join!(http_handle, rpc_handle);
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!("shutdown grace period elapsed with requests still in flight, exiting anyway");
    }

    Ok(())
}
