//! Batched copy of leading index ranges between stores.
//!
//! Each job copies the first `count` records of a finalized source store
//! into a freshly created destination store, possibly with different chunk
//! sizing and compression. Jobs are fully independent. Batches are
//! contiguous row ranges; a trailing batch smaller than `batch_rows` is
//! copied, not dropped.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use pixpack_core::types::{ArraySpec, Compression};
use pixpack_store::Store;

use crate::BuildError;

/// The record arrays every dataset store carries. Derived stats arrays are
/// not copied: they describe the full source population, not the subset.
const COPIED_ARRAYS: [&str; 2] = ["x", "y"];

#[derive(Debug, Clone)]
pub struct SubsampleJob {
    pub source: PathBuf,
    pub dest: PathBuf,
    /// `None` copies every record.
    pub count: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SubsampleConfig {
    pub jobs: Vec<SubsampleJob>,
    pub batch_rows: u64,
    pub chunk_rows: u64,
    pub compression: Compression,
}

impl SubsampleConfig {
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.jobs.is_empty() {
            return Err(BuildError::InvalidConfig("no subsample jobs given".to_string()));
        }
        if self.batch_rows == 0 {
            return Err(BuildError::InvalidConfig("batch_rows must be > 0".to_string()));
        }
        if self.chunk_rows == 0 {
            return Err(BuildError::InvalidConfig("chunk_rows must be > 0".to_string()));
        }
        self.compression
            .validate()
            .map_err(|e| BuildError::InvalidConfig(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct SubsampleSummary {
    pub source: PathBuf,
    pub dest: PathBuf,
    pub rows_copied: u64,
}

pub fn subsample(cfg: &SubsampleConfig) -> Result<Vec<SubsampleSummary>> {
    cfg.validate()?;
    let mut summaries = Vec::with_capacity(cfg.jobs.len());
    for job in &cfg.jobs {
        summaries.push(copy_job(job, cfg)?);
    }
    Ok(summaries)
}

fn copy_job(job: &SubsampleJob, cfg: &SubsampleConfig) -> Result<SubsampleSummary> {
    let mut source = Store::open(&job.source)
        .with_context(|| format!("opening source store {}", job.source.display()))?;

    let source_rows = source.rows("x")?;
    anyhow::ensure!(
        source.rows("y")? == source_rows,
        "source store {}: x has {source_rows} rows but y has {}",
        job.source.display(),
        source.rows("y")?
    );
    let count = match job.count {
        Some(requested) => {
            anyhow::ensure!(
                requested <= source_rows,
                "requested {requested} rows but source {} holds only {source_rows}",
                job.source.display()
            );
            anyhow::ensure!(requested > 0, "requested row count must be > 0");
            requested
        }
        None => source_rows,
    };

    let mut specs = Vec::with_capacity(COPIED_ARRAYS.len());
    for name in COPIED_ARRAYS {
        let src_spec = source.spec(name)?;
        let mut shape = src_spec.shape.clone();
        shape[0] = count;
        specs.push(ArraySpec {
            name: name.to_string(),
            shape,
            chunk_rows: cfg.chunk_rows,
            dtype: src_spec.dtype,
            compression: cfg.compression,
        });
    }
    let mut dest = Store::create(&job.dest, &specs)
        .with_context(|| format!("creating destination store {}", job.dest.display()))?;

    info!(
        target: "pixpack",
        event = "subsample_start",
        source = %job.source.display(),
        dest = %job.dest.display(),
        rows = count,
        batch_rows = cfg.batch_rows,
        "copying records"
    );

    let mut start = 0u64;
    while start < count {
        let rows = cfg.batch_rows.min(count - start);
        for name in COPIED_ARRAYS {
            let bytes = source.read_rows(name, start, rows)?;
            dest.write_rows(name, start, &bytes)?;
        }
        start += rows;
    }
    dest.close()?;

    info!(
        target: "pixpack",
        event = "subsample_complete",
        dest = %job.dest.display(),
        rows = count,
        "copy complete"
    );
    Ok(SubsampleSummary {
        source: job.source.clone(),
        dest: job.dest.clone(),
        rows_copied: count,
    })
}
