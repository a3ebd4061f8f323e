use serde::{Deserialize, Serialize};

use crate::ids::{ChunkId, FileId};

/// The JSON payload published to the broker's `fileChunksQueue` for each chunk (§3, §6).
///
/// `data` is base64-encoded on the wire to keep the payload valid JSON text; callers
/// work with raw bytes via [`ChunkMessage::new`]/[`ChunkMessage::into_bytes`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMessage {
    #[serde(rename = "fileId")]
    file_id: String,
    #[serde(rename = "chunkId")]
    chunk_id: ChunkId,
    #[serde(with = "base64_bytes")]
    data: Vec<u8>,
}

impl ChunkMessage {
    /// Build a message from raw chunk bytes.
    pub fn new(file_id: FileId, chunk_id: ChunkId, data: Vec<u8>) -> Self {
        Self {
            file_id: file_id.as_str().to_string(),
            chunk_id,
            data,
        }
    }

    pub fn file_id(&self) -> FileId {
        FileId::new(self.file_id.clone())
    }

    pub fn chunk_id(&self) -> ChunkId {
        self.chunk_id
    }

    /// Consume the message, returning the decoded chunk bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Serialize to the JSON form published on the broker.
    pub fn to_json(&self) -> Result<String, serde_json_like::Error> {
        serde_json_like::to_string(self)
    }

    /// Parse the JSON form received from the broker.
    pub fn from_json(s: &str) -> Result<Self, serde_json_like::Error> {
        serde_json_like::from_str(s)
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

/// Re-exported so [`ChunkMessage::to_json`]/[`ChunkMessage::from_json`] don't force every
/// caller to add a direct `serde_json` dependency just to name the error type.
pub mod serde_json_like {
    pub use serde_json::{from_str, to_string, Error};
}
