#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;

use pixpack_build::labels::{sample_random, ClassTable, DEFAULT_CLASS_COUNT};
use pixpack_store::Store;

/// Reads one random record from a finalized store, resolves its label and
/// writes the image back out as a viewable file.
#[derive(Debug, Parser)]
#[command(name = "pixpack-sample")]
struct Args {
    #[arg(long, env = "PIXPACK_STORE")]
    store: PathBuf,

    #[arg(long, env = "PIXPACK_CLASS_TABLE")]
    class_table: PathBuf,

    #[arg(long, default_value = "sample.png")]
    out: PathBuf,

    /// Fixed RNG seed; omit for a different record each run.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    pixpack_observe::logging::init_tracing();
    let args = Args::parse();

    let table = ClassTable::load(&args.class_table, DEFAULT_CLASS_COUNT)
        .with_context(|| format!("loading class table {}", args.class_table.display()))?;
    let mut store = Store::open(&args.store)
        .with_context(|| format!("opening store {}", args.store.display()))?;

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let sampled = sample_random(&mut store, &table, &mut rng)?;

    let side = sampled.side;
    let plane = side as usize * side as usize;
    let data = sampled.image;
    let img = image::RgbImage::from_fn(side, side, |x, y| {
        let idx = y as usize * side as usize + x as usize;
        image::Rgb([data[idx], data[plane + idx], data[2 * plane + idx]])
    });
    img.save(&args.out)
        .with_context(|| format!("writing {}", args.out.display()))?;

    println!("index: {}", sampled.index);
    println!("stored_label: {}", sampled.stored_label);
    println!("label: {}", sampled.resolved);
    println!("image: {}", args.out.display());
    Ok(())
}
