use pixpack_core::types::ArraySpec;
use serde::{Deserialize, Serialize};

/// Location of one compressed chunk inside `arrays/<name>.bin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub offset: u64,
    pub len: u64,
    pub raw_len: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderArray {
    #[serde(flatten)]
    pub spec: ArraySpec,
    pub chunks: Vec<ChunkEntry>,
}

/// The `header.json` document. Written once by `Store::close`; its presence
/// is what makes a store directory reopenable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreHeader {
    pub schema_version: u32,
    pub arrays: Vec<HeaderArray>,
}
