//! Pull one named executable out of the rootfs payload.

use anyhow::Result;
use log::{info, warn};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use super::{RootfsTools, EXTRACT_ROOT, INNER_SQUASHFS};
use crate::error::EditError;

/// An extracted binary together with the scratch directory holding it.
///
/// The directory is removed when this value is dropped.
#[derive(Debug)]
pub struct ExtractedBinary {
    dir: TempDir,
    path: PathBuf,
}

impl ExtractedBinary {
    /// Path of the extracted file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Extraction directory (contains the decompressed squashfs too).
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Pick the listing entry whose final component is exactly `name`.
///
/// Entries are normalised to a leading `/`. When several entries match, the
/// first in listing order wins and the rest are logged.
pub fn select_entry(listing: &str, name: &str) -> Option<String> {
    let mut matches = listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| Path::new(line).file_name().is_some_and(|f| f == name))
        .map(|line| {
            if line.starts_with('/') {
                line.to_string()
            } else {
                format!("/{}", line)
            }
        });

    let first = matches.next()?;
    let others: Vec<String> = matches.collect();
    if !others.is_empty() {
        warn!(
            "Multiple '{}' entries in rootfs, using {} (ignoring {})",
            name,
            first,
            others.join(", ")
        );
    }
    Some(first)
}

/// Extract the executable called `name` from the rootfs payload at `rootfs_img`.
///
/// A fresh extraction directory is created under `scratch`; it is owned by
/// the returned value and removed on any failure.
pub fn extract_binary<T: RootfsTools + ?Sized>(
    tools: &T,
    rootfs_img: &Path,
    scratch: &Path,
    name: &str,
) -> Result<ExtractedBinary> {
    if !rootfs_img.exists() {
        return Err(
            EditError::not_found(format!("rootfs image {}", rootfs_img.display())).into(),
        );
    }

    let dir = tempfile::Builder::new()
        .prefix(name)
        .tempdir_in(scratch)
        .map_err(|e| EditError::io(scratch, e))?;

    info!("Extracting {} from {}", name, rootfs_img.display());
    tools.decompress_outer(rootfs_img, dir.path())?;

    let squashfs = dir.path().join(INNER_SQUASHFS);
    if !squashfs.exists() {
        return Err(EditError::not_found(format!(
            "{} inside {}",
            INNER_SQUASHFS,
            rootfs_img.display()
        ))
        .into());
    }

    let listing = tools.list_inner(&squashfs)?;
    let entry = select_entry(&listing, name)
        .ok_or_else(|| EditError::not_found(format!("'{}' in {}", name, INNER_SQUASHFS)))?;

    let dest_root = dir.path().join(EXTRACT_ROOT);
    tools.extract_one(&squashfs, &entry, &dest_root)?;

    let path = dest_root.join(entry.trim_start_matches('/'));
    if !path.is_file() {
        return Err(EditError::FormatError(format!(
            "extraction of {} reported success but {} is missing",
            entry,
            path.display()
        ))
        .into());
    }

    info!("Extracted {}", path.display());
    Ok(ExtractedBinary { dir, path })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
/usr
/usr/bin/nmcli
/usr/bin/nmstatectl
/usr/lib/nmstatectl.d/readme
/usr/libexec/nmstatectl
";

    #[test]
    fn test_exact_basename_match() {
        assert_eq!(
            select_entry(LISTING, "nmstatectl").as_deref(),
            Some("/usr/bin/nmstatectl")
        );
    }

    #[test]
    fn test_suffix_is_not_a_match() {
        let listing = "/usr/bin/not-nmstatectl\n/usr/share/doc/nmstatectl.1\n";
        assert_eq!(select_entry(listing, "nmstatectl"), None);
    }

    #[test]
    fn test_first_of_several_matches_wins() {
        let listing = "/usr/libexec/nmstatectl\n/usr/bin/nmstatectl\n";
        assert_eq!(
            select_entry(listing, "nmstatectl").as_deref(),
            Some("/usr/libexec/nmstatectl")
        );
    }

    #[test]
    fn test_relative_entries_are_normalised() {
        assert_eq!(
            select_entry("  usr/bin/nmstatectl  \n\n", "nmstatectl").as_deref(),
            Some("/usr/bin/nmstatectl")
        );
    }

    #[test]
    fn test_empty_listing() {
        assert_eq!(select_entry("", "nmstatectl"), None);
    }
}
