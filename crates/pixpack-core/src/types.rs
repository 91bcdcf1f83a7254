use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// On-disk store layout version. Bumped whenever `header.json` or the chunk
/// blob format changes incompatibly.
pub const STORE_SCHEMA_VERSION: u32 = 1;

/// Element type of a stored array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dtype {
    /// 8-bit unsigned integer (image data).
    U8,
    /// 16-bit unsigned integer, little-endian (labels).
    U16,
    /// 32-bit IEEE 754 float, little-endian (derived statistics).
    F32,
}

impl Dtype {
    pub const fn element_bytes(&self) -> u64 {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::F32 => 4,
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8 => write!(f, "u8"),
            Self::U16 => write!(f, "u16"),
            Self::F32 => write!(f, "f32"),
        }
    }
}

/// Per-chunk compression applied to array data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    None,
    Deflate { level: u32 },
}

impl Compression {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn validate(&self) -> Result<(), ArraySpecError> {
        match self {
            Self::None => Ok(()),
            Self::Deflate { level } => {
                if (1..=9).contains(level) {
                    Ok(())
                } else {
                    Err(ArraySpecError::DeflateLevel(*level))
                }
            }
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Deflate { level } => write!(f, "deflate_{level}"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArraySpecError {
    #[error("array name must be non-empty and free of path separators")]
    InvalidName,
    #[error("array shape must be non-empty with no zero dimensions")]
    InvalidShape,
    #[error("chunk_rows must be > 0")]
    ZeroChunkRows,
    #[error("deflate level {0} out of range 1..=9")]
    DeflateLevel(u32),
}

/// Declaration of one named array inside a store.
///
/// `shape[0]` is the row count; rows are the unit of indexed access, chunks
/// (groups of `chunk_rows` consecutive rows) the unit of compression and I/O.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArraySpec {
    pub name: String,
    pub shape: Vec<u64>,
    pub chunk_rows: u64,
    pub dtype: Dtype,
    pub compression: Compression,
}

impl ArraySpec {
    pub fn validate(&self) -> Result<(), ArraySpecError> {
        let name = self.name.trim();
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(ArraySpecError::InvalidName);
        }
        if self.shape.is_empty() || self.shape.iter().any(|d| *d == 0) {
            return Err(ArraySpecError::InvalidShape);
        }
        if self.chunk_rows == 0 {
            return Err(ArraySpecError::ZeroChunkRows);
        }
        self.compression.validate()
    }

    pub fn rows(&self) -> u64 {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Elements in one row (product of the non-leading dimensions).
    pub fn row_len(&self) -> u64 {
        self.shape.iter().skip(1).product()
    }

    pub fn row_bytes(&self) -> u64 {
        self.row_len().saturating_mul(self.dtype.element_bytes())
    }
}

/// One enumerated input item: a source image path and its 0-based label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    pub path: PathBuf,
    pub label_id: u16,
}
