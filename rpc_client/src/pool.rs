//! A cached pool of `tonic` channels keyed by `host:port` (C8, §4.8).
//!
//! Generic over which generated client type it hands back so both the scheduler
//! process (retrieving from workers) and the worker process (heartbeating and
//! requesting placements from the scheduler, storing onto peers) can share one cache
//! implementation, matching the teacher's `client_util` crate's role as shared plumbing
//! underneath several generated-client wrappers.

use std::collections::HashMap;
use std::time::Duration;

use observability_deps::tracing::debug;
use parking_lot::Mutex;
use tonic::transport::{Channel, Endpoint};

/// Default per-RPC deadline (§5): the consumer aborts and nacks a placement RPC that
/// exceeds this rather than waiting indefinitely on a wedged peer.
pub const RPC_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid RPC address {address:?}: {source}")]
    InvalidAddress {
        address: String,
        source: tonic::transport::Error,
    },

    #[error("could not connect to {address:?}: {source}")]
    Connect {
        address: String,
        source: tonic::transport::Error,
    },
}

/// Caches one [`Channel`] per `host:port` and hands back a `T` built from it.
///
/// `T` is expected to be a generated `tonic` client, which is cheap to clone (it just
/// clones the underlying channel handle), so the pool stores channels rather than built
/// clients and re-wraps on every [`get`](Self::get).
pub struct ClientPool<T> {
    channels: Mutex<HashMap<String, Channel>>,
    build: fn(Channel) -> T,
}

impl<T> std::fmt::Debug for ClientPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientPool")
            .field("cached_addresses", &self.channels.lock().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<T: Clone> ClientPool<T> {
    pub fn new(build: fn(Channel) -> T) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            build,
        }
    }

    /// Return a client for `address`, reusing a cached channel if one exists.
    pub async fn get(&self, address: &str) -> Result<T, ClientError> {
        if let Some(channel) = self.channels.lock().get(address).cloned() {
            return Ok((self.build)(channel));
        }

        let channel = connect(address).await?;
        self.channels.lock().insert(address.to_string(), channel.clone());
        debug!(address, "opened new RPC channel");
        Ok((self.build)(channel))
    }

    /// Drop the cached channel for `address`, forcing the next [`get`](Self::get) to
    /// reconnect. Call this after an RPC on this address fails.
    pub fn invalidate(&self, address: &str) {
        if self.channels.lock().remove(address).is_some() {
            debug!(address, "invalidated RPC channel");
        }
    }
}

async fn connect(address: &str) -> Result<Channel, ClientError> {
    let uri = format!("http://{address}");
    let endpoint = Endpoint::from_shared(uri)
        .map_err(|source| ClientError::InvalidAddress {
            address: address.to_string(),
            source,
        })?
        .timeout(RPC_DEADLINE);
    endpoint
        .connect()
        .await
        .map_err(|source| ClientError::Connect {
            address: address.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalidate_on_empty_cache_is_a_no_op() {
        let pool: ClientPool<()> = ClientPool::new(|_channel| ());
        pool.invalidate("127.0.0.1:9000");
    }
}
