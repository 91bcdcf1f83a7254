#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use pixpack_build::build::DEFAULT_CHUNK_ROWS;
use pixpack_build::subsample::{subsample, SubsampleConfig, SubsampleJob};
use pixpack_core::types::Compression;

/// Copies leading index ranges of existing dataset stores into new stores,
/// optionally recompressed. Source/dest pairs are independent jobs.
#[derive(Debug, Parser)]
#[command(name = "pixpack-subsample")]
struct Args {
    /// Source store; repeat for multiple jobs.
    #[arg(long, required = true)]
    source: Vec<PathBuf>,

    /// Destination store; one per --source, in order.
    #[arg(long, required = true)]
    dest: Vec<PathBuf>,

    /// Records to copy per job; omit to copy all.
    #[arg(long)]
    count: Option<u64>,

    /// Rows per copy batch.
    #[arg(long, default_value_t = DEFAULT_CHUNK_ROWS)]
    batch_rows: u64,

    /// Chunk sizing of the destination stores.
    #[arg(long, default_value_t = DEFAULT_CHUNK_ROWS)]
    chunk_rows: u64,

    /// Deflate level 1..=9; 0 stores chunks uncompressed.
    #[arg(long, default_value_t = 1)]
    complevel: u32,
}

fn main() -> Result<()> {
    pixpack_observe::logging::init_tracing();
    let args = Args::parse();

    anyhow::ensure!(
        args.source.len() == args.dest.len(),
        "{} sources but {} destinations",
        args.source.len(),
        args.dest.len()
    );

    let jobs = args
        .source
        .into_iter()
        .zip(args.dest)
        .map(|(source, dest)| SubsampleJob {
            source,
            dest,
            count: args.count,
        })
        .collect();
    let cfg = SubsampleConfig {
        jobs,
        batch_rows: args.batch_rows,
        chunk_rows: args.chunk_rows,
        compression: if args.complevel == 0 {
            Compression::None
        } else {
            Compression::Deflate {
                level: args.complevel,
            }
        },
    };

    for summary in subsample(&cfg)? {
        println!(
            "{} -> {} ({} rows)",
            summary.source.display(),
            summary.dest.display(),
            summary.rows_copied
        );
    }
    Ok(())
}
