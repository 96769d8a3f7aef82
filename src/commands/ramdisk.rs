//! Ramdisk command - wraps a binary in a single-entry ram disk.

use anyhow::Result;
use std::path::Path;

use crate::artifact::{create_ram_disk, read_ram_disk, RamDiskTool};

/// Execute the ramdisk command.
pub fn cmd_ramdisk(binary: &Path, output: &Path, path_in_archive: &str) -> Result<()> {
    let tool = RamDiskTool {
        path_in_archive: path_in_archive.to_string(),
        ..RamDiskTool::default()
    };
    create_ram_disk(binary, &tool, output)?;

    // read back so the printed digest is what landed on disk
    for entry in read_ram_disk(output)? {
        println!("{}  {}", entry.sha256(), entry.path);
    }
    println!("Created: {}", output.display());
    Ok(())
}
