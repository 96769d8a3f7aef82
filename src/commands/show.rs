//! Show command - displays information.

use anyhow::Result;
use std::path::PathBuf;

use crate::artifact::read_ram_disk;
use crate::config::Config;
use crate::iso::{IsoImage, Xorriso};

pub enum ShowTarget {
    Config { json: bool },
    /// Entries of a ram disk image
    RamDisk(PathBuf),
    /// Volume id of an ISO
    VolumeId(PathBuf),
}

/// Execute the show command.
pub fn cmd_show(target: ShowTarget, config: &Config) -> Result<()> {
    match target {
        ShowTarget::Config { json: true } => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        ShowTarget::Config { json: false } => config.print(),
        ShowTarget::RamDisk(path) => {
            for entry in read_ram_disk(&path)? {
                println!(
                    "{:o}  {:>10}  {}  {}",
                    entry.mode,
                    entry.data.len(),
                    entry.sha256(),
                    entry.path
                );
            }
        }
        ShowTarget::VolumeId(iso) => {
            let xorriso = Xorriso::new(super::host_runner(config));
            println!("{}", xorriso.volume_id(&iso)?);
        }
    }
    Ok(())
}
