//! Extract command - pulls the ram disk tool out of a rootfs image.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::EditError;
use crate::rootfs::{extract_binary, SquashfsTools, UNSQUASHFS_FILE_LIMIT};

/// Execute the extract-tool command.
///
/// Copies the tool to `output`, or `./<name>` when not given.
pub fn cmd_extract_tool(
    rootfs_img: &Path,
    name: &str,
    output: Option<PathBuf>,
    config: &Config,
) -> Result<()> {
    let tools =
        SquashfsTools::new(super::host_runner(config)).with_open_file_limit(UNSQUASHFS_FILE_LIMIT);
    let output = output.unwrap_or_else(|| PathBuf::from(name));

    let extracted = extract_binary(&tools, rootfs_img, &config.work_dir, name)
        .with_context(|| format!("Failed to extract {} from {}", name, rootfs_img.display()))?;
    fs::copy(extracted.path(), &output).map_err(|e| EditError::io(&output, e))?;

    println!("Extracted {} to: {}", name, output.display());
    Ok(())
}
