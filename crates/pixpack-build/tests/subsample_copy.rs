use std::path::{Path, PathBuf};

use anyhow::Result;

use pixpack_build::subsample::{subsample, SubsampleConfig, SubsampleJob};
use pixpack_core::types::{ArraySpec, Compression, Dtype};
use pixpack_store::Store;

const ROW_BYTES: usize = 3 * 4 * 4;

fn temp_root(test_name: &str) -> Result<PathBuf> {
    let mut root = std::env::temp_dir();
    root.push(format!(
        "pixpack-subsample-{test_name}-{}-{}",
        std::process::id(),
        pixpack_observe::time::unix_time_ms()
    ));
    std::fs::create_dir_all(&root)?;
    Ok(root)
}

fn patterned_row(i: u64) -> Vec<u8> {
    (0..ROW_BYTES).map(|b| (i as u8).wrapping_mul(7).wrapping_add(b as u8)).collect()
}

fn make_source(path: &Path, rows: u64) -> Result<()> {
    let specs = [
        ArraySpec {
            name: "x".to_string(),
            shape: vec![rows, 3, 4, 4],
            chunk_rows: 4,
            dtype: Dtype::U8,
            compression: Compression::Deflate { level: 1 },
        },
        ArraySpec {
            name: "y".to_string(),
            shape: vec![rows, 1],
            chunk_rows: 4,
            dtype: Dtype::U16,
            compression: Compression::Deflate { level: 1 },
        },
    ];
    let mut store = Store::create(path, &specs)?;
    for i in 0..rows {
        store.write_rows("x", i, &patterned_row(i))?;
        store.write_rows("y", i, &(i as u16 * 3).to_le_bytes())?;
    }
    store.close()?;
    Ok(())
}

fn assert_copied(dest: &Path, rows: u64) -> Result<()> {
    let mut store = Store::open(dest)?;
    assert_eq!(store.rows("x")?, rows);
    assert_eq!(store.rows("y")?, rows);
    for i in 0..rows {
        assert_eq!(store.read_rows("x", i, 1)?, patterned_row(i), "row {i}");
        assert_eq!(store.read_rows("y", i, 1)?, (i as u16 * 3).to_le_bytes());
    }
    Ok(())
}

fn config_for(jobs: Vec<SubsampleJob>, batch_rows: u64) -> SubsampleConfig {
    SubsampleConfig {
        jobs,
        batch_rows,
        chunk_rows: 2,
        compression: Compression::None,
    }
}

#[test]
fn even_batches_copy_every_record() -> Result<()> {
    let root = temp_root("even")?;
    let source = root.join("source");
    make_source(&source, 10)?;

    let dest = root.join("dest");
    let cfg = config_for(
        vec![SubsampleJob {
            source: source.clone(),
            dest: dest.clone(),
            count: Some(10),
        }],
        2,
    );
    let summaries = subsample(&cfg)?;
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].rows_copied, 10);
    assert_copied(&dest, 10)
}

#[test]
fn remainder_batch_is_copied_not_dropped() -> Result<()> {
    let root = temp_root("remainder")?;
    let source = root.join("source");
    make_source(&source, 10)?;

    let dest = root.join("dest");
    // 10 = 2 full batches of 4 plus a remainder of 2
    let cfg = config_for(
        vec![SubsampleJob {
            source: source.clone(),
            dest: dest.clone(),
            count: Some(10),
        }],
        4,
    );
    subsample(&cfg)?;
    assert_copied(&dest, 10)
}

#[test]
fn omitted_count_copies_the_whole_store() -> Result<()> {
    let root = temp_root("all")?;
    let source = root.join("source");
    make_source(&source, 7)?;

    let dest = root.join("dest");
    let cfg = config_for(
        vec![SubsampleJob {
            source: source.clone(),
            dest: dest.clone(),
            count: None,
        }],
        3,
    );
    subsample(&cfg)?;
    assert_copied(&dest, 7)
}

#[test]
fn destination_compression_can_differ_from_source() -> Result<()> {
    let root = temp_root("recompress")?;
    let source = root.join("source");
    make_source(&source, 6)?;

    let dest = root.join("dest");
    let cfg = SubsampleConfig {
        jobs: vec![SubsampleJob {
            source: source.clone(),
            dest: dest.clone(),
            count: Some(6),
        }],
        batch_rows: 2,
        chunk_rows: 3,
        compression: Compression::Deflate { level: 9 },
    };
    subsample(&cfg)?;

    let store = Store::open(&dest)?;
    assert_eq!(store.spec("x")?.compression, Compression::Deflate { level: 9 });
    assert_eq!(store.spec("x")?.chunk_rows, 3);
    assert_copied(&dest, 6)
}

#[test]
fn independent_jobs_each_get_their_own_destination() -> Result<()> {
    let root = temp_root("multi-job")?;
    let train = root.join("train");
    let test = root.join("test");
    make_source(&train, 8)?;
    make_source(&test, 4)?;

    let cfg = config_for(
        vec![
            SubsampleJob {
                source: train.clone(),
                dest: root.join("train_small"),
                count: Some(4),
            },
            SubsampleJob {
                source: test.clone(),
                dest: root.join("test_small"),
                count: Some(4),
            },
        ],
        2,
    );
    let summaries = subsample(&cfg)?;
    assert_eq!(summaries.len(), 2);
    assert_copied(&root.join("train_small"), 4)?;
    assert_copied(&root.join("test_small"), 4)
}

#[test]
fn requesting_more_rows_than_available_fails() -> Result<()> {
    let root = temp_root("too-many")?;
    let source = root.join("source");
    make_source(&source, 4)?;

    let cfg = config_for(
        vec![SubsampleJob {
            source,
            dest: root.join("dest"),
            count: Some(10),
        }],
        2,
    );
    assert!(subsample(&cfg).is_err());
    Ok(())
}

#[test]
fn existing_destination_is_never_overwritten() -> Result<()> {
    let root = temp_root("dest-exists")?;
    let source = root.join("source");
    make_source(&source, 4)?;

    let dest = root.join("dest");
    let cfg = config_for(
        vec![SubsampleJob {
            source,
            dest: dest.clone(),
            count: None,
        }],
        2,
    );
    subsample(&cfg)?;
    let err = subsample(&cfg).unwrap_err();
    assert!(err.to_string().contains("already exists") || format!("{err:#}").contains("already exists"));
    Ok(())
}
