//! Input enumeration. The full ordered record list, and therefore the store
//! row count, is produced before any storage is allocated.

use std::path::{Path, PathBuf};

use pixpack_core::types::SourceRecord;

use crate::labels::ClassTable;
use crate::BuildError;

/// Training layout: every subdirectory of `root` is a synset directory whose
/// files all carry that synset's 0-based label. Directories and files are
/// visited in sorted order so enumeration is deterministic.
pub fn enumerate_training(root: &Path, table: &ClassTable) -> Result<Vec<SourceRecord>, BuildError> {
    match table.min_storage_label() {
        Some(0) => {}
        other => {
            return Err(BuildError::LabelBaseInvariant {
                min: other.unwrap_or(u64::MAX),
            })
        }
    }

    let mut class_dirs: Vec<PathBuf> = Vec::new();
    for entry in read_dir_checked(root)? {
        if entry.is_dir() {
            class_dirs.push(entry);
        }
    }
    class_dirs.sort();

    let mut records = Vec::new();
    for dir in class_dirs {
        let synset = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let label_id = table
            .label_for_synset(&synset)
            .ok_or_else(|| BuildError::UnknownSynset(synset.clone()))?;
        for path in walk_files(&dir)? {
            records.push(SourceRecord { path, label_id });
        }
    }
    if records.is_empty() {
        return Err(BuildError::EmptyInput(root.to_path_buf()));
    }
    Ok(records)
}

/// Evaluation layout: every file under `root`, lexicographically sorted,
/// with placeholder label 0. Ground-truth labels are resolved out of band.
pub fn enumerate_evaluation(root: &Path) -> Result<Vec<SourceRecord>, BuildError> {
    let files = walk_files(root)?;
    if files.is_empty() {
        return Err(BuildError::EmptyInput(root.to_path_buf()));
    }
    Ok(files
        .into_iter()
        .map(|path| SourceRecord { path, label_id: 0 })
        .collect())
}

fn read_dir_checked(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let walk_err = |source| BuildError::Walk {
        path: dir.to_path_buf(),
        source,
    };
    let rd = std::fs::read_dir(dir).map_err(walk_err)?;
    let mut out = Vec::new();
    for entry in rd {
        out.push(entry.map_err(walk_err)?.path());
    }
    Ok(out)
}

fn walk_files(root: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for path in read_dir_checked(&dir)? {
            if path.is_dir() {
                stack.push(path);
            } else if path.is_file() {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}
