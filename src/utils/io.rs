use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;
use serde::{Serialize, de::DeserializeOwned};
use bincode;

/// Error type for I/O operations
#[derive(Error, Debug)]
pub enum IoError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("IO error: {0}")]
    StdIo(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

/// Serializes data to a binary file using bincode, creating parent
/// directories if needed
pub fn serialize_to_file<T: Serialize>(
    path: impl AsRef<Path>,
    data: &T,
) -> Result<(), IoError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    bincode::serialize_into(writer, data)?;
    Ok(())
}

/// Deserializes data from a binary file using bincode
pub fn deserialize_from_file<T: DeserializeOwned>(
    path: impl AsRef<Path>,
) -> Result<T, IoError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            IoError::FileNotFound(path.to_path_buf())
        } else {
            IoError::StdIo(e)
        }
    })?;
    let reader = BufReader::new(file);
    let data = bincode::deserialize_from(reader)?;
    Ok(data)
}
