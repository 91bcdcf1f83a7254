//! Class-table loading and read-back sampling.
//!
//! The class table is an external TSV, one line per class:
//! `class_id<TAB>synset<TAB>name`. Ids are 1-based and contiguous; only the
//! first `max_classes` ids are kept, extras are discarded. The loaded table
//! is immutable for the life of the process.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use rand::Rng;
use thiserror::Error;

use pixpack_core::element;
use pixpack_store::Store;

/// Class count of the reference task; ids beyond this are discarded at load.
pub const DEFAULT_CLASS_COUNT: u64 = 1000;

#[derive(Debug, Error)]
pub enum ClassTableError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("class table line {line}: {msg}")]
    Parse { line: usize, msg: String },
    #[error("duplicate class id {0}")]
    DuplicateId(u64),
    #[error("class ids must be contiguous from 1; id {0} is missing")]
    MissingId(u64),
    #[error("class table is empty")]
    Empty,
}

pub struct ClassTable {
    /// index i holds class id i + 1
    names: Vec<String>,
    synset_to_id: HashMap<String, u64>,
}

/// Result of resolving a stored label id against the table. `Unknown` is an
/// expected outcome, not a failure: placeholder-labeled stores hold 0, which
/// has no entry in the 1-based table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedLabel<'a> {
    Known(&'a str),
    Unknown,
}

impl fmt::Display for ResolvedLabel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedLabel::Known(name) => write!(f, "{name}"),
            ResolvedLabel::Unknown => write!(f, "Unknown"),
        }
    }
}

impl ClassTable {
    pub fn load(path: &Path, max_classes: u64) -> Result<Self, ClassTableError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, max_classes)
    }

    pub fn parse(text: &str, max_classes: u64) -> Result<Self, ClassTableError> {
        let mut slots: Vec<Option<(String, String)>> = Vec::new();
        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.splitn(3, '\t');
            let id_s = fields.next().unwrap_or("");
            let synset = fields.next().ok_or_else(|| ClassTableError::Parse {
                line: line_no + 1,
                msg: "expected id<TAB>synset<TAB>name".to_string(),
            })?;
            let name = fields.next().ok_or_else(|| ClassTableError::Parse {
                line: line_no + 1,
                msg: "missing name column".to_string(),
            })?;
            let id: u64 = id_s.trim().parse().map_err(|_| ClassTableError::Parse {
                line: line_no + 1,
                msg: format!("bad class id {id_s:?}"),
            })?;
            if id == 0 {
                return Err(ClassTableError::Parse {
                    line: line_no + 1,
                    msg: "class ids are 1-based".to_string(),
                });
            }
            if id > max_classes {
                continue;
            }
            let slot = usize::try_from(id - 1).unwrap_or(usize::MAX);
            if slots.len() <= slot {
                slots.resize(slot + 1, None);
            }
            if slots[slot].is_some() {
                return Err(ClassTableError::DuplicateId(id));
            }
            slots[slot] = Some((synset.trim().to_string(), name.trim().to_string()));
        }

        let mut names = Vec::with_capacity(slots.len());
        let mut synset_to_id = HashMap::with_capacity(slots.len());
        for (i, slot) in slots.into_iter().enumerate() {
            let Some((synset, name)) = slot else {
                return Err(ClassTableError::MissingId(i as u64 + 1));
            };
            synset_to_id.insert(synset, i as u64 + 1);
            names.push(name);
        }
        if names.is_empty() {
            return Err(ClassTableError::Empty);
        }
        Ok(Self { names, synset_to_id })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Looks up a 1-based class id. 0 and out-of-range ids resolve to the
    /// explicit `Unknown` marker, never an error.
    pub fn resolve(&self, id: u64) -> ResolvedLabel<'_> {
        if id == 0 {
            return ResolvedLabel::Unknown;
        }
        match self.names.get(usize::try_from(id - 1).unwrap_or(usize::MAX)) {
            Some(name) => ResolvedLabel::Known(name),
            None => ResolvedLabel::Unknown,
        }
    }

    /// 0-based storage label for a synset directory name.
    pub fn label_for_synset(&self, synset: &str) -> Option<u16> {
        self.synset_to_id
            .get(synset)
            .and_then(|id| u16::try_from(id - 1).ok())
    }

    /// Smallest storage label the table induces (0 when the table is valid).
    pub fn min_storage_label(&self) -> Option<u64> {
        if self.names.is_empty() {
            None
        } else {
            Some(0)
        }
    }
}

#[derive(Debug, Clone)]
pub struct SampledRecord {
    pub index: u64,
    pub stored_label: u16,
    pub resolved: String,
    pub side: u32,
    /// Channel-first `(3, side, side)` u8 image data.
    pub image: Vec<u8>,
}

/// Reads one uniformly random record from a finalized store and resolves its
/// stored label against the table.
pub fn sample_random(
    store: &mut Store,
    table: &ClassTable,
    rng: &mut impl Rng,
) -> Result<SampledRecord> {
    let rows = store.rows("x")?;
    anyhow::ensure!(rows > 0, "store holds no records");
    let shape = store.spec("x")?.shape.clone();
    anyhow::ensure!(
        shape.len() == 4 && shape[1] == 3 && shape[2] == shape[3],
        "array x has shape {shape:?}, expected (n, 3, side, side)"
    );
    let side = u32::try_from(shape[2]).context("image side exceeds u32")?;

    let index = rng.gen_range(0..rows);
    let image = store.read_rows("x", index, 1)?;
    let y = store.read_rows("y", index, 1)?;
    let stored_label = element::decode_u16s(&y)
        .and_then(|v| v.first().copied())
        .context("label row is not a u16")?;

    let resolved = table.resolve(u64::from(stored_label)).to_string();
    Ok(SampledRecord {
        index,
        stored_label,
        resolved,
        side,
        image,
    })
}
