#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

//! Chunked, compressed, fixed-shape array store.
//!
//! A store is a directory:
//!
//! ```text
//! <store>/
//!   header.json          written once by close(); the store is reopenable
//!                        iff it is present
//!   arrays/<name>.bin    compressed chunk blobs; ordering in the file is
//!                        irrelevant, the header's chunk table locates them
//! ```
//!
//! Array shapes are fixed at creation and never grow. Rows are the unit of
//! indexed access; chunks (groups of `chunk_rows` consecutive rows) are the
//! unit of compression and I/O. A chunk is staged in memory until every one
//! of its rows has been written exactly once, then compressed and appended
//! to its array's data file. Each row must be written exactly once before
//! `close` will finalize the store.

mod codec;
mod header;

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use pixpack_core::types::{ArraySpec, ArraySpecError, Compression, Dtype, STORE_SCHEMA_VERSION};
use thiserror::Error;
use tracing::info;

pub use crate::header::{ChunkEntry, HeaderArray, StoreHeader};

pub const HEADER_FILE: &str = "header.json";
pub const ARRAYS_DIR: &str = "arrays";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store path already exists: {} (remove it before rebuilding)", .0.display())]
    AlreadyExists(PathBuf),
    #[error("no finalized store at {} (header.json missing)", .0.display())]
    NotAStore(PathBuf),
    #[error("store header: {0}")]
    CorruptHeader(String),
    #[error("unsupported store schema_version {0}")]
    UnsupportedSchema(u32),
    #[error("invalid spec for array {name}: {source}")]
    InvalidSpec {
        name: String,
        #[source]
        source: ArraySpecError,
    },
    #[error("duplicate array name: {0}")]
    DuplicateArray(String),
    #[error("no such array: {0}")]
    NoSuchArray(String),
    #[error("array {name}: {got} bytes is not a positive multiple of the {row_bytes}-byte row size")]
    ShapeMismatch {
        name: String,
        got: usize,
        row_bytes: u64,
    },
    #[error("array {name}: appended payload is {got} bytes, declared shape needs {expected}")]
    AppendSize {
        name: String,
        got: usize,
        expected: u64,
    },
    #[error("array {name}: rows {start}..{end} out of bounds for {rows} declared rows")]
    OutOfBounds {
        name: String,
        start: u64,
        end: u64,
        rows: u64,
    },
    #[error("array {name}: row {index} already written")]
    DuplicateWrite { name: String, index: u64 },
    #[error("array {name}: chunk {chunk} is not fully written yet and cannot be read")]
    UnflushedChunk { name: String, chunk: u64 },
    #[error("array {name}: {missing} of {rows} rows were never written")]
    IncompleteArray {
        name: String,
        missing: u64,
        rows: u64,
    },
    #[error("store is read-only")]
    ReadOnly,
    #[error("codec: {0}")]
    Codec(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
struct StagedChunk {
    written: Vec<bool>,
    filled: u64,
    buf: Vec<u8>,
}

#[derive(Debug)]
struct ArrayState {
    spec: ArraySpec,
    file: File,
    append_offset: u64,
    chunks: Vec<Option<ChunkEntry>>,
    staged: BTreeMap<u64, StagedChunk>,
    cache: Option<(u64, Vec<u8>)>,
}

impl ArrayState {
    fn chunk_count(&self) -> u64 {
        self.spec.rows().div_ceil(self.spec.chunk_rows)
    }

    /// The tail chunk may hold fewer than `chunk_rows` rows.
    fn rows_in_chunk(&self, chunk: u64) -> u64 {
        let start = chunk.saturating_mul(self.spec.chunk_rows);
        self.spec.chunk_rows.min(self.spec.rows().saturating_sub(start))
    }
}

#[derive(Debug)]
pub struct Store {
    root: PathBuf,
    writable: bool,
    arrays: BTreeMap<String, ArrayState>,
}

impl Store {
    /// Creates a new store directory with the given array declarations.
    ///
    /// Fails with [`StoreError::AlreadyExists`] if anything is already at
    /// `path`, finalized or not: a store is expensive to build and is never
    /// silently overwritten.
    pub fn create(path: impl Into<PathBuf>, specs: &[ArraySpec]) -> Result<Store, StoreError> {
        let root = path.into();
        for spec in specs {
            spec.validate().map_err(|source| StoreError::InvalidSpec {
                name: spec.name.clone(),
                source,
            })?;
        }

        if let Some(parent) = root.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        match std::fs::create_dir(&root) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(root));
            }
            Err(err) => return Err(err.into()),
        }
        std::fs::create_dir(root.join(ARRAYS_DIR))?;

        let mut arrays = BTreeMap::new();
        for spec in specs {
            if arrays.contains_key(&spec.name) {
                return Err(StoreError::DuplicateArray(spec.name.clone()));
            }
            let file = OpenOptions::new()
                .create_new(true)
                .read(true)
                .write(true)
                .open(array_data_path(&root, &spec.name))?;
            let chunk_count = spec.rows().div_ceil(spec.chunk_rows);
            arrays.insert(
                spec.name.clone(),
                ArrayState {
                    spec: spec.clone(),
                    file,
                    append_offset: 0,
                    chunks: vec![None; usize::try_from(chunk_count).unwrap_or(usize::MAX)],
                    staged: BTreeMap::new(),
                    cache: None,
                },
            );
        }

        info!(
            target: "pixpack",
            event = "store_created",
            path = %root.display(),
            arrays = specs.len(),
            "store created"
        );
        Ok(Store {
            root,
            writable: true,
            arrays,
        })
    }

    /// Opens a finalized store read-only.
    pub fn open(path: impl Into<PathBuf>) -> Result<Store, StoreError> {
        let root = path.into();
        let bytes = match std::fs::read(root.join(HEADER_FILE)) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotAStore(root));
            }
            Err(err) => return Err(err.into()),
        };
        let header: StoreHeader =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::CorruptHeader(e.to_string()))?;
        if header.schema_version != STORE_SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchema(header.schema_version));
        }

        let mut arrays = BTreeMap::new();
        for ha in header.arrays {
            ha.spec.validate().map_err(|source| StoreError::InvalidSpec {
                name: ha.spec.name.clone(),
                source,
            })?;
            let file = File::open(array_data_path(&root, &ha.spec.name))?;
            let name = ha.spec.name.clone();
            let append_offset = ha
                .chunks
                .iter()
                .map(|c| c.offset.saturating_add(c.len))
                .max()
                .unwrap_or(0);
            arrays.insert(
                name,
                ArrayState {
                    spec: ha.spec,
                    file,
                    append_offset,
                    chunks: ha.chunks.into_iter().map(Some).collect(),
                    staged: BTreeMap::new(),
                    cache: None,
                },
            );
        }
        Ok(Store {
            root,
            writable: false,
            arrays,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn array_names(&self) -> impl Iterator<Item = &str> {
        self.arrays.keys().map(String::as_str)
    }

    pub fn spec(&self, name: &str) -> Result<&ArraySpec, StoreError> {
        self.arrays
            .get(name)
            .map(|s| &s.spec)
            .ok_or_else(|| StoreError::NoSuchArray(name.to_string()))
    }

    pub fn rows(&self, name: &str) -> Result<u64, StoreError> {
        Ok(self.spec(name)?.rows())
    }

    /// Writes one or more consecutive rows starting at `index`.
    ///
    /// Every row of a declared array must be written exactly once before
    /// `close`; a chunk whose rows are all present is compressed and flushed
    /// immediately, so out-of-order writers stage at most the chunks they
    /// have partially filled.
    pub fn write_rows(&mut self, name: &str, index: u64, bytes: &[u8]) -> Result<(), StoreError> {
        if !self.writable {
            return Err(StoreError::ReadOnly);
        }
        let state = self
            .arrays
            .get_mut(name)
            .ok_or_else(|| StoreError::NoSuchArray(name.to_string()))?;
        let row_bytes = state.spec.row_bytes();
        if bytes.is_empty() || bytes.len() as u64 % row_bytes != 0 {
            return Err(StoreError::ShapeMismatch {
                name: name.to_string(),
                got: bytes.len(),
                row_bytes,
            });
        }
        let rows = bytes.len() as u64 / row_bytes;
        let total = state.spec.rows();
        let end = index.saturating_add(rows);
        if end > total {
            return Err(StoreError::OutOfBounds {
                name: name.to_string(),
                start: index,
                end,
                rows: total,
            });
        }

        let chunk_rows = state.spec.chunk_rows;
        for r in 0..rows {
            let abs = index + r;
            let chunk = abs / chunk_rows;
            let row_in_chunk = abs % chunk_rows;
            if state.chunks[usize::try_from(chunk).unwrap_or(usize::MAX)].is_some() {
                // chunk already flushed, so this row was written before
                return Err(StoreError::DuplicateWrite {
                    name: name.to_string(),
                    index: abs,
                });
            }
            let expected_rows = state.rows_in_chunk(chunk);
            let complete = {
                let staged = state.staged.entry(chunk).or_insert_with(|| StagedChunk {
                    written: vec![false; usize::try_from(expected_rows).unwrap_or(usize::MAX)],
                    filled: 0,
                    buf: vec![
                        0u8;
                        usize::try_from(expected_rows.saturating_mul(row_bytes))
                            .unwrap_or(usize::MAX)
                    ],
                });
                let slot = usize::try_from(row_in_chunk).unwrap_or(usize::MAX);
                if staged.written[slot] {
                    return Err(StoreError::DuplicateWrite {
                        name: name.to_string(),
                        index: abs,
                    });
                }
                staged.written[slot] = true;
                staged.filled += 1;
                let dst_start = usize::try_from(row_in_chunk * row_bytes).unwrap_or(usize::MAX);
                let dst_end = dst_start + usize::try_from(row_bytes).unwrap_or(usize::MAX);
                let src_start = usize::try_from(r * row_bytes).unwrap_or(usize::MAX);
                let src_end = src_start + usize::try_from(row_bytes).unwrap_or(usize::MAX);
                staged.buf[dst_start..dst_end].copy_from_slice(&bytes[src_start..src_end]);
                staged.filled == expected_rows
            };
            if complete {
                flush_chunk(state, chunk)?;
            }
        }
        Ok(())
    }

    /// Reads `rows` consecutive rows starting at `index` as raw row bytes.
    ///
    /// Only flushed chunks are readable; in a writable store that means
    /// chunks whose rows have all been written.
    pub fn read_rows(&mut self, name: &str, index: u64, rows: u64) -> Result<Vec<u8>, StoreError> {
        let state = self
            .arrays
            .get_mut(name)
            .ok_or_else(|| StoreError::NoSuchArray(name.to_string()))?;
        let total = state.spec.rows();
        let end = index.saturating_add(rows);
        if end > total {
            return Err(StoreError::OutOfBounds {
                name: name.to_string(),
                start: index,
                end,
                rows: total,
            });
        }
        let row_bytes = state.spec.row_bytes();
        let mut out =
            Vec::with_capacity(usize::try_from(rows.saturating_mul(row_bytes)).unwrap_or(0));
        let chunk_rows = state.spec.chunk_rows;
        let mut abs = index;
        while abs < end {
            let chunk = abs / chunk_rows;
            let row_in_chunk = abs % chunk_rows;
            let rows_here = (chunk_rows - row_in_chunk).min(end - abs);

            let cached = matches!(state.cache, Some((c, _)) if c == chunk);
            if !cached {
                let decoded = load_chunk(state, name, chunk)?;
                state.cache = Some((chunk, decoded));
            }
            if let Some((_, buf)) = state.cache.as_ref() {
                let start = usize::try_from(row_in_chunk * row_bytes).unwrap_or(usize::MAX);
                let stop = start + usize::try_from(rows_here * row_bytes).unwrap_or(usize::MAX);
                out.extend_from_slice(&buf[start..stop]);
            }
            abs += rows_here;
        }
        Ok(out)
    }

    /// Adds a small derived array after creation, written in one piece.
    ///
    /// Meant for results whose size is only known once an earlier pass over
    /// the main arrays has completed (per-position mean/std). The payload is
    /// stored as a single uncompressed chunk.
    pub fn append_whole_array(
        &mut self,
        name: &str,
        dtype: Dtype,
        shape: &[u64],
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        if !self.writable {
            return Err(StoreError::ReadOnly);
        }
        if self.arrays.contains_key(name) {
            return Err(StoreError::DuplicateArray(name.to_string()));
        }
        let spec = ArraySpec {
            name: name.to_string(),
            shape: shape.to_vec(),
            chunk_rows: shape.first().copied().unwrap_or(0),
            dtype,
            compression: Compression::None,
        };
        spec.validate().map_err(|source| StoreError::InvalidSpec {
            name: name.to_string(),
            source,
        })?;
        let expected = spec.rows().saturating_mul(spec.row_bytes());
        if bytes.len() as u64 != expected {
            return Err(StoreError::AppendSize {
                name: name.to_string(),
                got: bytes.len(),
                expected,
            });
        }

        let mut file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(array_data_path(&self.root, name))?;
        file.write_all(bytes)?;
        let entry = ChunkEntry {
            offset: 0,
            len: bytes.len() as u64,
            raw_len: bytes.len() as u64,
        };
        self.arrays.insert(
            name.to_string(),
            ArrayState {
                spec,
                file,
                append_offset: bytes.len() as u64,
                chunks: vec![Some(entry)],
                staged: BTreeMap::new(),
                cache: None,
            },
        );
        Ok(())
    }

    /// Verifies completeness, flushes and fsyncs data files, and atomically
    /// writes `header.json`. The store on disk is immutable afterwards.
    pub fn close(mut self) -> Result<PathBuf, StoreError> {
        if !self.writable {
            return Err(StoreError::ReadOnly);
        }
        let mut header_arrays = Vec::with_capacity(self.arrays.len());
        for (name, state) in &mut self.arrays {
            let mut missing = 0u64;
            for chunk in 0..state.chunk_count() {
                if state.chunks[usize::try_from(chunk).unwrap_or(usize::MAX)].is_some() {
                    continue;
                }
                let expected = state.rows_in_chunk(chunk);
                let filled = state.staged.get(&chunk).map(|s| s.filled).unwrap_or(0);
                missing += expected - filled;
            }
            if missing > 0 {
                return Err(StoreError::IncompleteArray {
                    name: name.clone(),
                    missing,
                    rows: state.spec.rows(),
                });
            }
            state.file.sync_all()?;
            let chunks: Vec<ChunkEntry> = state.chunks.iter().flatten().cloned().collect();
            header_arrays.push(HeaderArray {
                spec: state.spec.clone(),
                chunks,
            });
        }

        let header = StoreHeader {
            schema_version: STORE_SCHEMA_VERSION,
            arrays: header_arrays,
        };
        let doc = serde_json::to_vec_pretty(&header)
            .map_err(|e| StoreError::CorruptHeader(e.to_string()))?;
        write_atomic(&self.root.join(HEADER_FILE), &doc)?;

        info!(
            target: "pixpack",
            event = "store_closed",
            path = %self.root.display(),
            arrays = self.arrays.len(),
            "store finalized"
        );
        Ok(self.root.clone())
    }
}

fn array_data_path(root: &Path, name: &str) -> PathBuf {
    root.join(ARRAYS_DIR).join(format!("{name}.bin"))
}

fn flush_chunk(state: &mut ArrayState, chunk: u64) -> Result<(), StoreError> {
    let Some(staged) = state.staged.remove(&chunk) else {
        return Ok(());
    };
    let compressed = codec::compress(&state.spec.compression, &staged.buf)?;
    state.file.seek(SeekFrom::Start(state.append_offset))?;
    state.file.write_all(&compressed)?;
    state.chunks[usize::try_from(chunk).unwrap_or(usize::MAX)] = Some(ChunkEntry {
        offset: state.append_offset,
        len: compressed.len() as u64,
        raw_len: staged.buf.len() as u64,
    });
    state.append_offset = state.append_offset.saturating_add(compressed.len() as u64);
    Ok(())
}

fn load_chunk(state: &mut ArrayState, name: &str, chunk: u64) -> Result<Vec<u8>, StoreError> {
    let entry = state
        .chunks
        .get(usize::try_from(chunk).unwrap_or(usize::MAX))
        .and_then(|e| e.clone())
        .ok_or_else(|| StoreError::UnflushedChunk {
            name: name.to_string(),
            chunk,
        })?;
    let mut stored = vec![0u8; usize::try_from(entry.len).unwrap_or(usize::MAX)];
    state.file.seek(SeekFrom::Start(entry.offset))?;
    state.file.read_exact(&mut stored)?;
    codec::decompress(&state.spec.compression, &stored, entry.raw_len)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path must have parent")
    })?;
    std::fs::create_dir_all(parent)?;

    let mut tmp = path.to_path_buf();
    let suffix = format!("tmp.{}.{}", std::process::id(), unix_time_ms());
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "bad filename"))?;
    tmp.set_file_name(format!("{file_name}.{suffix}"));

    {
        let mut f = OpenOptions::new().create_new(true).write(true).open(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }

    std::fs::rename(tmp, path)?;
    Ok(())
}

fn unix_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(test_name: &str) -> anyhow::Result<PathBuf> {
        let mut root = std::env::temp_dir();
        root.push(format!(
            "pixpack-store-{test_name}-{}-{}",
            std::process::id(),
            unix_time_ms()
        ));
        std::fs::create_dir_all(&root)?;
        Ok(root)
    }

    fn small_specs(rows: u64, compression: Compression) -> Vec<ArraySpec> {
        vec![
            ArraySpec {
                name: "x".to_string(),
                shape: vec![rows, 3, 4, 4],
                chunk_rows: 4,
                dtype: Dtype::U8,
                compression,
            },
            ArraySpec {
                name: "y".to_string(),
                shape: vec![rows, 1],
                chunk_rows: 4,
                dtype: Dtype::U16,
                compression,
            },
        ]
    }

    fn patterned_row(i: u64, row_bytes: usize) -> Vec<u8> {
        (0..row_bytes).map(|b| (i as u8).wrapping_add(b as u8)).collect()
    }

    #[test]
    fn create_refuses_existing_path() -> anyhow::Result<()> {
        let root = temp_root("already-exists")?;
        let path = root.join("store");
        let store = Store::create(&path, &small_specs(4, Compression::None))?;
        drop(store);

        let err = Store::create(&path, &small_specs(4, Compression::None)).unwrap_err();
        match err {
            StoreError::AlreadyExists(p) => assert_eq!(p, path),
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn indexed_write_read_round_trip_is_bit_identical() -> anyhow::Result<()> {
        let root = temp_root("round-trip")?;
        let path = root.join("store");
        let mut store = Store::create(&path, &small_specs(10, Compression::Deflate { level: 1 }))?;

        let row_bytes = 3 * 4 * 4;
        for i in 0..10u64 {
            store.write_rows("x", i, &patterned_row(i, row_bytes))?;
            store.write_rows("y", i, &(i as u16 * 3).to_le_bytes())?;
        }
        store.close()?;

        let mut reopened = Store::open(&path)?;
        for i in 0..10u64 {
            assert_eq!(reopened.read_rows("x", i, 1)?, patterned_row(i, row_bytes));
            assert_eq!(reopened.read_rows("y", i, 1)?, (i as u16 * 3).to_le_bytes());
        }
        Ok(())
    }

    #[test]
    fn out_of_order_writes_land_at_their_index() -> anyhow::Result<()> {
        let root = temp_root("out-of-order")?;
        let path = root.join("store");
        let mut store = Store::create(&path, &small_specs(8, Compression::None))?;

        let row_bytes = 3 * 4 * 4;
        // complete chunk 1 before chunk 0
        for i in [4u64, 5, 6, 7, 3, 2, 1, 0] {
            store.write_rows("x", i, &patterned_row(i, row_bytes))?;
            store.write_rows("y", i, &(i as u16).to_le_bytes())?;
        }
        store.close()?;

        let mut reopened = Store::open(&path)?;
        for i in 0..8u64 {
            assert_eq!(reopened.read_rows("x", i, 1)?, patterned_row(i, row_bytes));
        }
        Ok(())
    }

    #[test]
    fn batch_read_spans_chunk_boundaries() -> anyhow::Result<()> {
        let root = temp_root("span-read")?;
        let path = root.join("store");
        let mut store = Store::create(&path, &small_specs(10, Compression::Deflate { level: 2 }))?;

        let row_bytes = 3 * 4 * 4;
        let mut all = Vec::new();
        for i in 0..10u64 {
            let row = patterned_row(i, row_bytes);
            store.write_rows("x", i, &row)?;
            store.write_rows("y", i, &(i as u16).to_le_bytes())?;
            all.extend_from_slice(&row);
        }
        store.close()?;

        let mut reopened = Store::open(&path)?;
        // rows 2..9 cover parts of chunks 0, 1 and 2
        let got = reopened.read_rows("x", 2, 7)?;
        assert_eq!(got, all[2 * row_bytes..9 * row_bytes]);
        Ok(())
    }

    #[test]
    fn duplicate_write_is_rejected() -> anyhow::Result<()> {
        let root = temp_root("dup-write")?;
        let mut store = Store::create(root.join("store"), &small_specs(8, Compression::None))?;

        let row_bytes = 3 * 4 * 4;
        store.write_rows("x", 5, &patterned_row(5, row_bytes))?;
        let err = store.write_rows("x", 5, &patterned_row(5, row_bytes)).unwrap_err();
        match err {
            StoreError::DuplicateWrite { index, .. } => assert_eq!(index, 5),
            other => panic!("expected DuplicateWrite, got {other:?}"),
        }

        // same error once the chunk has been flushed
        for i in [0u64, 1, 2, 3] {
            store.write_rows("x", i, &patterned_row(i, row_bytes))?;
        }
        let err = store.write_rows("x", 2, &patterned_row(2, row_bytes)).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateWrite { index: 2, .. }));
        Ok(())
    }

    #[test]
    fn write_beyond_declared_rows_is_rejected() -> anyhow::Result<()> {
        let root = temp_root("oob")?;
        let mut store = Store::create(root.join("store"), &small_specs(4, Compression::None))?;
        let err = store
            .write_rows("x", 4, &patterned_row(0, 3 * 4 * 4))
            .unwrap_err();
        assert!(matches!(err, StoreError::OutOfBounds { start: 4, .. }));
        Ok(())
    }

    #[test]
    fn misaligned_write_is_a_shape_mismatch() -> anyhow::Result<()> {
        let root = temp_root("misaligned")?;
        let mut store = Store::create(root.join("store"), &small_specs(4, Compression::None))?;
        let err = store.write_rows("x", 0, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, StoreError::ShapeMismatch { got: 3, .. }));
        Ok(())
    }

    #[test]
    fn close_reports_missing_rows() -> anyhow::Result<()> {
        let root = temp_root("incomplete")?;
        let mut store = Store::create(root.join("store"), &small_specs(10, Compression::None))?;
        let row_bytes = 3 * 4 * 4;
        for i in 0..7u64 {
            store.write_rows("x", i, &patterned_row(i, row_bytes))?;
        }
        let err = store.close().unwrap_err();
        match err {
            StoreError::IncompleteArray { missing, rows, .. } => {
                assert_eq!(missing, 3);
                assert_eq!(rows, 10);
            }
            other => panic!("expected IncompleteArray, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn appended_arrays_survive_reopen() -> anyhow::Result<()> {
        let root = temp_root("append")?;
        let path = root.join("store");
        let mut store = Store::create(&path, &small_specs(4, Compression::None))?;
        let row_bytes = 3 * 4 * 4;
        for i in 0..4u64 {
            store.write_rows("x", i, &patterned_row(i, row_bytes))?;
            store.write_rows("y", i, &(i as u16).to_le_bytes())?;
        }

        let mean: Vec<f32> = (0..48).map(|i| i as f32 / 2.0).collect();
        let bytes = pixpack_core::element::encode_f32s(&mean);
        store.append_whole_array("x_mean", Dtype::F32, &[48], &bytes)?;
        store.close()?;

        let mut reopened = Store::open(&path)?;
        assert_eq!(reopened.rows("x_mean")?, 48);
        assert_eq!(reopened.spec("x_mean")?.dtype, Dtype::F32);
        let got = reopened.read_rows("x_mean", 0, 48)?;
        assert_eq!(pixpack_core::element::decode_f32s(&got), Some(mean));
        Ok(())
    }

    #[test]
    fn append_rejects_wrong_payload_size() -> anyhow::Result<()> {
        let root = temp_root("append-size")?;
        let mut store = Store::create(root.join("store"), &small_specs(4, Compression::None))?;
        let err = store
            .append_whole_array("x_mean", Dtype::F32, &[48], &[0u8; 100])
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::AppendSize {
                got: 100,
                expected: 192,
                ..
            }
        ));
        Ok(())
    }

    #[test]
    fn header_preserves_spec_metadata() -> anyhow::Result<()> {
        let root = temp_root("header-meta")?;
        let path = root.join("store");
        let compression = Compression::Deflate { level: 4 };
        let mut store = Store::create(&path, &small_specs(4, compression))?;
        let row_bytes = 3 * 4 * 4;
        for i in 0..4u64 {
            store.write_rows("x", i, &patterned_row(i, row_bytes))?;
            store.write_rows("y", i, &(i as u16).to_le_bytes())?;
        }
        store.close()?;

        let reopened = Store::open(&path)?;
        let spec = reopened.spec("x")?;
        assert_eq!(spec.shape, vec![4, 3, 4, 4]);
        assert_eq!(spec.chunk_rows, 4);
        assert_eq!(spec.dtype, Dtype::U8);
        assert_eq!(spec.compression, compression);
        assert_eq!(
            reopened.array_names().collect::<Vec<_>>(),
            vec!["x", "y"]
        );
        Ok(())
    }

    #[test]
    fn open_requires_finalized_header() -> anyhow::Result<()> {
        let root = temp_root("not-a-store")?;
        let path = root.join("store");
        let store = Store::create(&path, &small_specs(4, Compression::None))?;
        drop(store); // never closed: no header.json
        assert!(matches!(Store::open(&path), Err(StoreError::NotAStore(_))));
        Ok(())
    }

    #[test]
    fn reopened_store_is_read_only() -> anyhow::Result<()> {
        let root = temp_root("read-only")?;
        let path = root.join("store");
        let mut store = Store::create(&path, &small_specs(4, Compression::None))?;
        let row_bytes = 3 * 4 * 4;
        for i in 0..4u64 {
            store.write_rows("x", i, &patterned_row(i, row_bytes))?;
            store.write_rows("y", i, &(i as u16).to_le_bytes())?;
        }
        store.close()?;

        let mut reopened = Store::open(&path)?;
        let err = reopened
            .write_rows("x", 0, &patterned_row(0, row_bytes))
            .unwrap_err();
        assert!(matches!(err, StoreError::ReadOnly));
        Ok(())
    }
}
