use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Opaque identifier for a worker, unique within a cluster.
///
/// Workers choose their own id (typically via `WORKER_ID` at startup) and present it on
/// every heartbeat and RPC; the scheduler never generates one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(String);

impl WorkerId {
    /// Wrap an existing id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a plain string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for WorkerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WorkerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WorkerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque identifier for an uploaded file, generated fresh on every upload.
///
/// Collision-free in practice: backed by a random (v4) UUID.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileId(String);

impl FileId {
    /// Generate a fresh, random file id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an existing id string, e.g. one read back from the metadata store.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a plain string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FileId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for FileId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A chunk's position within its file's byte stream. Non-negative, contiguous from 0.
pub type ChunkId = i64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_ids_are_unique() {
        assert_ne!(FileId::generate(), FileId::generate());
    }

    #[test]
    fn worker_id_round_trips_through_display() {
        let id = WorkerId::new("worker-7");
        assert_eq!(id.to_string(), "worker-7");
        assert_eq!(id.as_str(), "worker-7");
    }
}
