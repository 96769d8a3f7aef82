//! Auxiliary ram disk builder.
//!
//! The ram disk is a gzip-compressed cpio "newc" archive holding exactly one
//! file. The bootloader loads it after the placeholder initrd so the file is
//! overlaid onto the live environment's root.
//!
//! Output is reproducible: inode, owner, link count and mtime are pinned, and
//! the gzip header carries no timestamp or file name. The same content, path
//! and mode always give the same bytes.
//!
//! Format reference: https://www.kernel.org/doc/Documentation/early-userspace/buffer-format.txt

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};
use log::info;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::EditError;

const NEWC_MAGIC: &str = "070701";
const NEWC_HEADER_LEN: usize = 110;
const TRAILER: &str = "TRAILER!!!";

/// Inode assigned to the single archive entry.
const ENTRY_INO: u32 = 1;

/// Permissions of the written ram disk file.
pub const RAM_DISK_FILE_MODE: u32 = 0o600;

/// The tool carried in the ram disk and where it lands at boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RamDiskTool {
    /// Basename looked up in the rootfs listing.
    pub name: String,
    /// Absolute destination inside the archive.
    pub path_in_archive: String,
    /// Full st_mode (file type and permission bits).
    pub mode: u32,
}

impl Default for RamDiskTool {
    fn default() -> Self {
        Self {
            name: "nmstatectl".to_string(),
            path_in_archive: "/usr/bin/nmstatectl".to_string(),
            mode: 0o100_755,
        }
    }
}

/// One decoded archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RamDiskEntry {
    /// Absolute path (the archive stores it without the leading `/`).
    pub path: String,
    pub mode: u32,
    pub data: Vec<u8>,
}

impl RamDiskEntry {
    pub fn sha256(&self) -> String {
        Sha256::digest(&self.data)
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

/// Build the compressed single-entry archive in memory.
pub fn encode_ram_disk(content: &[u8], path_in_archive: &str, mode: u32) -> Result<Vec<u8>> {
    let name = path_in_archive.trim_start_matches('/');
    if name.is_empty() || name.contains('\0') {
        return Err(EditError::FormatError(format!(
            "invalid ram disk entry path '{}'",
            path_in_archive
        ))
        .into());
    }
    let size = u32::try_from(content.len()).map_err(|_| {
        EditError::FormatError(format!(
            "{} bytes does not fit in a newc entry",
            content.len()
        ))
    })?;

    let mut archive = Vec::with_capacity(content.len() + 256);
    write_newc_entry(&mut archive, name, ENTRY_INO, mode, 1, content, size);
    write_newc_entry(&mut archive, TRAILER, 0, 0, 1, &[], 0);

    let mut encoder = GzBuilder::new()
        .mtime(0)
        .write(Vec::new(), Compression::best());
    encoder
        .write_all(&archive)
        .context("Failed to compress ram disk")?;
    let compressed = encoder.finish().context("Failed to compress ram disk")?;

    Ok(compressed)
}

/// Build the ram disk for `content` and write it to `output`.
///
/// The file is written to a sibling temp file and renamed over `output`, so
/// a failure leaves any previous file untouched.
pub fn build_ram_disk(
    content: &[u8],
    path_in_archive: &str,
    mode: u32,
    output: &Path,
) -> Result<()> {
    let compressed = encode_ram_disk(content, path_in_archive, mode)?;

    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| EditError::io(parent, e))?;
    tmp.write_all(&compressed)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| EditError::io(tmp.path(), e))?;
    fs::set_permissions(tmp.path(), fs::Permissions::from_mode(RAM_DISK_FILE_MODE))
        .map_err(|e| EditError::io(tmp.path(), e))?;
    tmp.persist(output)
        .map_err(|e| EditError::io(output, e.error))?;

    info!(
        "Wrote ram disk {} ({} bytes, entry {})",
        output.display(),
        compressed.len(),
        path_in_archive
    );
    Ok(())
}

/// Read the tool binary at `binary` and write its ram disk to `output`.
///
/// Fails with `NotFound` before touching `output` if `binary` is missing.
pub fn create_ram_disk(binary: &Path, tool: &RamDiskTool, output: &Path) -> Result<()> {
    if !binary.exists() {
        return Err(EditError::not_found(format!(
            "{} binary at {}",
            tool.name,
            binary.display()
        ))
        .into());
    }
    let content = fs::read(binary).map_err(|e| EditError::io(binary, e))?;

    build_ram_disk(&content, &tool.path_in_archive, tool.mode, output)
        .with_context(|| format!("Failed to create {} ram disk", tool.name))
}

/// Decode a compressed ram disk into its entries (trailer excluded).
pub fn decode_ram_disk(compressed: &[u8]) -> Result<Vec<RamDiskEntry>> {
    let mut archive = Vec::new();
    GzDecoder::new(compressed)
        .read_to_end(&mut archive)
        .map_err(|e| EditError::FormatError(format!("ram disk is not valid gzip: {}", e)))?;

    let mut entries = Vec::new();
    let mut pos = 0;
    loop {
        let header = archive
            .get(pos..pos + NEWC_HEADER_LEN)
            .ok_or_else(|| truncated(pos))?;
        if !header.starts_with(NEWC_MAGIC.as_bytes()) {
            return Err(EditError::FormatError(format!("bad cpio magic at offset {}", pos)).into());
        }

        // fields are read from raw bytes; a corrupt header may hold any byte
        let field = |idx: usize| -> Result<usize> {
            let start = 6 + idx * 8;
            let raw = &header[start..start + 8];
            std::str::from_utf8(raw)
                .ok()
                .and_then(|hex| usize::from_str_radix(hex, 16).ok())
                .ok_or_else(|| {
                    EditError::FormatError(format!(
                        "bad cpio header field {:?} at offset {}",
                        String::from_utf8_lossy(raw),
                        pos + start
                    ))
                    .into()
                })
        };
        let mode = field(1)? as u32;
        let filesize = field(6)?;
        let namesize = field(11)?;

        let name_start = pos + NEWC_HEADER_LEN;
        let name_bytes = archive
            .get(name_start..name_start + namesize)
            .ok_or_else(|| truncated(name_start))?;
        let name = String::from_utf8_lossy(name_bytes.strip_suffix(b"\0").unwrap_or(name_bytes))
            .into_owned();

        let data_start = align4(name_start + namesize);
        if name == TRAILER {
            break;
        }
        let data = archive
            .get(data_start..data_start + filesize)
            .ok_or_else(|| truncated(data_start))?
            .to_vec();

        entries.push(RamDiskEntry {
            path: format!("/{}", name),
            mode,
            data,
        });
        pos = align4(data_start + filesize);
    }

    Ok(entries)
}

/// Read and decode the ram disk at `path`.
pub fn read_ram_disk(path: &Path) -> Result<Vec<RamDiskEntry>> {
    if !path.exists() {
        return Err(EditError::not_found(format!("ram disk {}", path.display())).into());
    }
    let bytes = fs::read(path).map_err(|e| EditError::io(path, e))?;
    decode_ram_disk(&bytes).with_context(|| format!("Failed to read ram disk {}", path.display()))
}

fn truncated(offset: usize) -> EditError {
    EditError::FormatError(format!("cpio archive truncated at offset {}", offset))
}

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// Append one newc entry. uid, gid, mtime and device numbers are always 0.
fn write_newc_entry(
    archive: &mut Vec<u8>,
    name: &str,
    ino: u32,
    mode: u32,
    nlink: u32,
    data: &[u8],
    filesize: u32,
) {
    // namesize includes the trailing NUL
    let namesize = name.len() + 1;

    let header = format!(
        "{}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}",
        NEWC_MAGIC,
        ino,
        mode,
        0u32, // uid
        0u32, // gid
        nlink,
        0u32, // mtime
        filesize,
        0u32, // devmajor
        0u32, // devminor
        0u32, // rdevmajor
        0u32, // rdevminor
        namesize,
        0u32, // checksum (always 0 for newc)
    );
    debug_assert_eq!(header.len(), NEWC_HEADER_LEN);
    archive.extend_from_slice(header.as_bytes());

    archive.extend_from_slice(name.as_bytes());
    archive.push(0);
    archive.resize(align4(archive.len()), 0);

    archive.extend_from_slice(data);
    archive.resize(align4(archive.len()), 0);
}
