#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use pixpack_build::stats::OnlineStats;
use pixpack_core::element;
use pixpack_store::Store;

/// Recomputes per-position mean/std over a finalized store's image array and
/// compares against the persisted `x_mean`/`x_std_dev`, when present.
#[derive(Debug, Parser)]
#[command(name = "pixpack-stats")]
struct Args {
    #[arg(long, env = "PIXPACK_STORE")]
    store: PathBuf,

    /// Rows per read batch.
    #[arg(long, default_value_t = 64)]
    batch_rows: u64,
}

fn main() -> Result<()> {
    pixpack_observe::logging::init_tracing();
    let args = Args::parse();

    let mut store = Store::open(&args.store)
        .with_context(|| format!("opening store {}", args.store.display()))?;
    let rows = store.rows("x")?;
    let row_bytes = store.spec("x")?.row_bytes();
    let feature_len = usize::try_from(row_bytes).context("row size exceeds usize")?;

    let mut acc = OnlineStats::new(feature_len);
    let mut index = 0u64;
    while index < rows {
        let batch = args.batch_rows.min(rows - index);
        let bytes = store.read_rows("x", index, batch)?;
        for row in bytes.chunks_exact(feature_len) {
            acc.push(row)?;
        }
        index += batch;
    }
    let result = acc.finish()?;

    let grand_mean = result.mean.iter().copied().sum::<f32>() / result.mean.len() as f32;
    let grand_std = result.std.iter().copied().sum::<f32>() / result.std.len() as f32;
    println!("rows: {rows}");
    println!("feature_len: {feature_len}");
    println!("mean(mean): {grand_mean:.4}");
    println!("mean(std):  {grand_std:.4}");

    if store.array_names().any(|n| n == "x_mean") {
        let stored_rows = store.rows("x_mean")?;
        let stored = store.read_rows("x_mean", 0, stored_rows)?;
        let stored_mean =
            element::decode_f32s(&stored).context("x_mean is not an f32 array")?;
        let max_delta = result
            .mean
            .iter()
            .zip(&stored_mean)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        println!("max |mean - stored x_mean|: {max_delta:.6}");
    }
    Ok(())
}
