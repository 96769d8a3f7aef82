//! Fixed-size initrd placeholder.
//!
//! The minimal ISO reserves a zero-filled slot that the image service later
//! overwrites with per-cluster data. Only its length matters.

use anyhow::Result;
use log::{error, info};
use std::fs::File;
use std::path::Path;

use crate::error::EditError;

/// Size of the reserved placeholder (1 MiB).
pub const PLACEHOLDER_LEN: u64 = 1024 * 1024;

/// Create (or truncate) `path` as a zeroed file of exactly `len` bytes.
pub fn write_placeholder(path: &Path, len: u64) -> Result<()> {
    let file = File::create(path).map_err(|e| EditError::io(path, e))?;
    file.set_len(len).map_err(|e| EditError::io(path, e))?;
    if let Err(e) = file.sync_all() {
        error!("Failed to sync placeholder {}: {}", path.display(), e);
    }
    info!("Reserved {} bytes at {}", len, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_placeholder_has_exact_length_and_zeroes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.img");

        write_placeholder(&path, PLACEHOLDER_LEN).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len() as u64, PLACEHOLDER_LEN);
        assert!(bytes.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_placeholder_truncates_existing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.img");
        fs::write(&path, vec![0xFFu8; 4096]).unwrap();

        write_placeholder(&path, 16).unwrap();

        assert_eq!(fs::read(&path).unwrap(), vec![0u8; 16]);
    }

    #[test]
    fn test_missing_parent_is_io_error() {
        let temp = TempDir::new().unwrap();
        let err = write_placeholder(&temp.path().join("no/such/dir.img"), 16).unwrap_err();
        assert!(matches!(EditError::of(&err), Some(EditError::Io { .. })));
    }
}
