#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

pub mod build;
pub mod enumerate;
pub mod labels;
pub mod normalize;
pub mod stats;
pub mod subsample;

use std::path::PathBuf;

use thiserror::Error;

/// Structural build failures. Every variant names the invariant that broke;
/// none of these are recoverable mid-build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("training mode requires a class table")]
    MissingClassTable,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("class directory {0} has no class-table entry")]
    UnknownSynset(String),
    #[error("converted class labels must start at 0, table minimum is {min}")]
    LabelBaseInvariant { min: u64 },
    #[error("no input files under {}", .0.display())]
    EmptyInput(PathBuf),
    #[error("enumerating {}: {}", .path.display(), .source)]
    Walk {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("stats pass saw {seen} rows but {expected} were written")]
    StatsPass { expected: u64, seen: u64 },
}
