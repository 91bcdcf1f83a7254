#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use pixpack_build::build::{
    build_dataset, BuildConfig, DecodePolicy, Mode, DEFAULT_CHUNK_ROWS, DEFAULT_IMAGE_SIDE,
};
use pixpack_core::types::Compression;

/// Materializes a directory of classification images into a chunked,
/// compressed dataset store with per-position mean/std statistics.
#[derive(Debug, Parser)]
#[command(name = "pixpack-make")]
struct Args {
    #[arg(long, env = "PIXPACK_IMAGE_DIR")]
    image_dir: PathBuf,

    /// TSV class table (`id<TAB>synset<TAB>name`); required with --training.
    #[arg(long, env = "PIXPACK_CLASS_TABLE")]
    class_table: Option<PathBuf>,

    /// Ground-truth label list for evaluation sets. Accepted for parity with
    /// the out-of-band verification flow; the build itself stores
    /// placeholder labels in evaluation mode.
    #[arg(long, env = "PIXPACK_GROUND_TRUTH")]
    ground_truth: Option<PathBuf>,

    #[arg(long, env = "PIXPACK_OUT_DIR", default_value = ".")]
    out_dir: PathBuf,

    #[arg(long, env = "PIXPACK_OUT_NAME")]
    out_name: String,

    /// Treat subdirectories as synset class directories.
    #[arg(long)]
    training: bool,

    /// Apply the fixed-seed storage-order shuffle.
    #[arg(long)]
    randomize: bool,

    /// Deflate level 1..=9; 0 stores chunks uncompressed.
    #[arg(long, default_value_t = 0)]
    complevel: u32,

    #[arg(long, default_value_t = DEFAULT_CHUNK_ROWS)]
    chunk_rows: u64,

    #[arg(long, default_value_t = DEFAULT_IMAGE_SIDE)]
    image_side: u32,

    /// Per-item decode failure policy: "abort" or "zero-fill".
    #[arg(long, default_value = "abort")]
    decode_policy: String,
}

fn main() -> Result<()> {
    pixpack_observe::logging::init_tracing();
    let args = Args::parse();

    let decode_policy = match args.decode_policy.as_str() {
        "abort" => DecodePolicy::Abort,
        "zero-fill" => DecodePolicy::ZeroFill,
        other => anyhow::bail!("unknown decode policy {other:?} (expected abort or zero-fill)"),
    };
    let compression = if args.complevel == 0 {
        Compression::None
    } else {
        Compression::Deflate {
            level: args.complevel,
        }
    };

    let cfg = BuildConfig {
        image_dir: args.image_dir,
        class_table: args.class_table,
        out_dir: args.out_dir,
        out_name: args.out_name,
        mode: if args.training {
            Mode::Training
        } else {
            Mode::Evaluation
        },
        randomize: args.randomize,
        compression,
        chunk_rows: args.chunk_rows,
        image_side: args.image_side,
        decode_policy,
    };
    let summary = build_dataset(&cfg)?;

    println!("store: {}", summary.store_path.display());
    println!("records: {}", summary.records);
    if summary.zero_filled > 0 {
        println!("zero_filled: {}", summary.zero_filled);
    }
    Ok(())
}
