//! Utility functions

use crate::error::{IndexerError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

/// Returns the path to the file if the path is a file and exists, canonicalized without UNC
/// prefixes on windows.
pub fn canonicalize(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    dunce::canonicalize(path).map_err(|err| IndexerError::io(err, path))
}

/// Reads the json file and deserializes it into the provided type.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path).map_err(|err| IndexerError::io(err, path))?;
    serde_json::from_str(&contents).map_err(Into::into)
}

/// Serializes the value to pretty JSON and writes it to the file atomically.
pub fn write_json_file<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    write_atomic(&data, path)
}

/// Writes `data` to `path` via a temp file in the same directory followed by a rename, so
/// concurrent readers never observe a partially written file.
pub fn write_atomic(data: &[u8], path: &Path) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| IndexerError::msg(format!("\"{}\" has no parent directory", path.display())))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|err| IndexerError::io(err, dir))?;
    tmp.write_all(data).map_err(|err| IndexerError::io(err, path))?;
    tmp.persist(path).map_err(|err| IndexerError::io(err.error, path))?;
    Ok(())
}

/// Creates the parent directory of the `file` and all its ancestors if it does not exist.
///
/// See [`fs::create_dir_all()`].
pub fn create_parent_dir_all(file: &Path) -> Result<()> {
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent).map_err(|err| IndexerError::io(err, parent))?;
    }
    Ok(())
}
