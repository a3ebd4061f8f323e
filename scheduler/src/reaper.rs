//! The registry reaper (§4.1, §4.7): periodically drops workers whose heartbeat has
//! aged out of [`oracle::LIVENESS_TIMEOUT`], matching the teacher's pattern of a small
//! standalone `tokio::time::interval` loop per background duty rather than one
//! monolithic scheduler task.

use std::sync::Arc;
use std::time::Duration;

use observability_deps::tracing::info;
use oracle::WorkerRegistry;

pub const REAPER_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct ReaperLoop {
    registry: Arc<WorkerRegistry>,
    period: Duration,
}

impl ReaperLoop {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self { registry, period: REAPER_PERIOD }
    }

    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.period);
        loop {
            interval.tick().await;
            let reaped = self.registry.reap();
            if !reaped.is_empty() {
                info!(count = reaped.len(), ?reaped, "reaped stale workers");
            }
        }
    }
}
