//! Dataset build orchestration.
//!
//! Fixed state order: enumerate → (optional) shuffle → allocate store →
//! normalize-and-write → stats pass → persist stats → close. The stats pass
//! runs strictly after the last indexed write so it observes final values.

use std::path::PathBuf;

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{info, warn};

use pixpack_core::element;
use pixpack_core::shuffle;
use pixpack_core::types::{ArraySpec, Compression, Dtype, SourceRecord};
use pixpack_observe::metrics::{Counter, DurationAgg, ScopedTimer};
use pixpack_store::Store;

use crate::enumerate::{enumerate_evaluation, enumerate_training};
use crate::labels::{ClassTable, DEFAULT_CLASS_COUNT};
use crate::normalize::load_and_normalize;
use crate::stats::{OnlineStats, StatsResult};
use crate::BuildError;

pub const DEFAULT_IMAGE_SIDE: u32 = 256;
pub const DEFAULT_CHUNK_ROWS: u64 = 64;

const PROGRESS_EVERY_BATCHES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Training,
    Evaluation,
}

/// What to do when a single source image cannot be decoded.
///
/// `Abort` fails the whole build: the store's row count is fixed up front,
/// and a silently missing row would leave an artifact that lies about its
/// contents. `ZeroFill` writes a zeroed image at the enumerated index (the
/// label is kept) and reports how many items were filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePolicy {
    Abort,
    ZeroFill,
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub image_dir: PathBuf,
    pub class_table: Option<PathBuf>,
    pub out_dir: PathBuf,
    pub out_name: String,
    pub mode: Mode,
    pub randomize: bool,
    pub compression: Compression,
    pub chunk_rows: u64,
    pub image_side: u32,
    pub decode_policy: DecodePolicy,
}

impl BuildConfig {
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.mode == Mode::Training && self.class_table.is_none() {
            return Err(BuildError::MissingClassTable);
        }
        if self.out_name.trim().is_empty() {
            return Err(BuildError::InvalidConfig("out_name must be non-empty".to_string()));
        }
        if self.chunk_rows == 0 {
            return Err(BuildError::InvalidConfig("chunk_rows must be > 0".to_string()));
        }
        if self.image_side == 0 {
            return Err(BuildError::InvalidConfig("image_side must be > 0".to_string()));
        }
        self.compression
            .validate()
            .map_err(|e| BuildError::InvalidConfig(e.to_string()))
    }

    /// Compressed artifacts carry the codec and level in their name, the way
    /// the uncompressed/compressed variants of the same dataset are told
    /// apart on disk.
    pub fn store_path(&self) -> PathBuf {
        let suffix = if self.compression.is_none() {
            String::new()
        } else {
            format!("_{}", self.compression)
        };
        self.out_dir.join(format!("{}{}.ppk", self.out_name, suffix))
    }
}

#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub records: u64,
    pub zero_filled: u64,
    pub store_path: PathBuf,
}

pub fn build_dataset(cfg: &BuildConfig) -> Result<BuildSummary> {
    cfg.validate()?;

    let table = match (cfg.mode, &cfg.class_table) {
        (Mode::Training, Some(path)) => Some(
            ClassTable::load(path, DEFAULT_CLASS_COUNT)
                .with_context(|| format!("loading class table {}", path.display()))?,
        ),
        _ => None,
    };

    info!(
        target: "pixpack",
        event = "build_start",
        image_dir = %cfg.image_dir.display(),
        out = %cfg.store_path().display(),
        mode = ?cfg.mode,
        randomize = cfg.randomize,
        "collecting image and label information"
    );

    let mut records = match (cfg.mode, table.as_ref()) {
        (Mode::Training, Some(table)) => enumerate_training(&cfg.image_dir, table)?,
        (Mode::Training, None) => return Err(BuildError::MissingClassTable.into()),
        (Mode::Evaluation, _) => enumerate_evaluation(&cfg.image_dir)?,
    };
    let num_records = records.len() as u64;

    if cfg.randomize {
        shuffle::shuffle_in_place(&mut records);
    }

    let side = u64::from(cfg.image_side);
    let specs = [
        ArraySpec {
            name: "x".to_string(),
            shape: vec![num_records, 3, side, side],
            chunk_rows: cfg.chunk_rows,
            dtype: Dtype::U8,
            compression: cfg.compression,
        },
        ArraySpec {
            name: "y".to_string(),
            shape: vec![num_records, 1],
            chunk_rows: cfg.chunk_rows,
            dtype: Dtype::U16,
            compression: cfg.compression,
        },
    ];
    let mut store = Store::create(cfg.store_path(), &specs)?;

    let zero_filled = write_all_records(&mut store, &records, cfg)?;

    let stats = accumulate_store_stats(&mut store, num_records, cfg)?;
    let feature_len = 3 * side * side;
    store.append_whole_array(
        "x_mean",
        Dtype::F32,
        &[feature_len],
        &element::encode_f32s(&stats.mean),
    )?;
    store.append_whole_array(
        "x_std_dev",
        Dtype::F32,
        &[feature_len],
        &element::encode_f32s(&stats.std),
    )?;
    let store_path = store.close()?;

    info!(
        target: "pixpack",
        event = "build_complete",
        store = %store_path.display(),
        records = num_records,
        zero_filled,
        "build complete"
    );
    Ok(BuildSummary {
        records: num_records,
        zero_filled,
        store_path,
    })
}

/// Normalizes and writes every record. Batches are chunk-aligned so each
/// completed batch flushes whole store chunks; normalization within a batch
/// runs on the rayon pool with the enumerated index carried alongside, and
/// the write lands at exactly that index regardless of completion order.
fn write_all_records(store: &mut Store, records: &[SourceRecord], cfg: &BuildConfig) -> Result<u64> {
    let feature_bytes = 3 * cfg.image_side as usize * cfg.image_side as usize;
    let normalize_time = DurationAgg::default();
    let zero_filled = Counter::default();
    let total = records.len();
    let batch_rows = usize::try_from(cfg.chunk_rows).unwrap_or(usize::MAX);

    for (batch_idx, batch) in records.chunks(batch_rows).enumerate() {
        let base = batch_idx as u64 * cfg.chunk_rows;
        let normalized: Vec<_> = batch
            .par_iter()
            .map(|record| {
                let _timer = ScopedTimer::new(&normalize_time);
                load_and_normalize(&record.path, cfg.image_side)
            })
            .collect();

        let mut x_batch = Vec::with_capacity(batch.len() * feature_bytes);
        let mut y_batch = Vec::with_capacity(batch.len());
        for (offset, result) in normalized.into_iter().enumerate() {
            let index = base + offset as u64;
            match result {
                Ok(pixels) => x_batch.extend_from_slice(&pixels),
                Err(err) => match cfg.decode_policy {
                    DecodePolicy::Abort => {
                        return Err(err)
                            .with_context(|| format!("item {index} failed to decode"));
                    }
                    DecodePolicy::ZeroFill => {
                        warn!(
                            target: "pixpack",
                            event = "decode_zero_filled",
                            index,
                            error = %err,
                            "source image could not be decoded; writing zeroed record"
                        );
                        zero_filled.inc();
                        x_batch.resize(x_batch.len() + feature_bytes, 0);
                    }
                },
            }
            y_batch.push(batch[offset].label_id);
        }
        store.write_rows("x", base, &x_batch)?;
        store.write_rows("y", base, &element::encode_u16s(&y_batch))?;

        if batch_idx % PROGRESS_EVERY_BATCHES == 0 {
            info!(
                target: "pixpack",
                event = "build_progress",
                done = base + batch.len() as u64,
                total = total as u64,
                "processing files"
            );
        }
    }

    let timing = normalize_time.snapshot();
    info!(
        target: "pixpack",
        event = "normalize_timing",
        items = timing.count,
        avg_us = timing.avg_ns() / 1_000,
        max_us = timing.max_ns / 1_000,
        "normalization timing"
    );
    Ok(zero_filled.get())
}

/// Second pass: streams the fully written `x` array back out of the store.
/// The accumulated row count must equal the enumerated count, otherwise the
/// artifact is partially built and the run aborts.
fn accumulate_store_stats(
    store: &mut Store,
    expected: u64,
    cfg: &BuildConfig,
) -> Result<StatsResult> {
    info!(
        target: "pixpack",
        event = "stats_start",
        rows = expected,
        "collecting image stats"
    );
    let rows = store.rows("x")?;
    let feature_bytes = 3 * cfg.image_side as usize * cfg.image_side as usize;
    let mut acc = OnlineStats::new(feature_bytes);
    let mut index = 0u64;
    while index < rows {
        let batch = cfg.chunk_rows.min(rows - index);
        let bytes = store.read_rows("x", index, batch)?;
        for row in bytes.chunks_exact(feature_bytes) {
            acc.push(row)?;
        }
        index += batch;
    }
    if acc.count() != expected {
        return Err(BuildError::StatsPass {
            expected,
            seen: acc.count(),
        }
        .into());
    }
    Ok(acc.finish()?)
}
