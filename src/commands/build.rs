//! Build command - creates a minimal ISO from a full one.

use anyhow::Result;
use std::path::PathBuf;

use crate::config::Config;
use crate::minimal::{HostIsoBuilder, MinimalIsoRequest};
use crate::timing::{format_duration, Timer};

pub struct BuildArgs {
    pub full_iso: PathBuf,
    pub output: PathBuf,
    pub rootfs_url: String,
    pub arch: String,
    pub version: String,
    /// Overrides the configured work dir.
    pub work_dir: Option<PathBuf>,
}

/// Execute the build command.
pub fn cmd_build(args: BuildArgs, config: &Config) -> Result<()> {
    let mut editor = config.editor_config();
    if let Some(dir) = args.work_dir {
        editor.work_dir = dir;
    }

    let builder = HostIsoBuilder::on_host(editor);

    println!("=== Building minimal ISO ===\n");
    let timer = Timer::start("Minimal ISO");
    let summary = builder.create_minimal_iso(&MinimalIsoRequest {
        full_iso: &args.full_iso,
        output: &args.output,
        rootfs_url: &args.rootfs_url,
        arch: &args.arch,
        version: &args.version,
    })?;
    let elapsed = timer.finish();

    println!("  Volume id: {}", summary.volume_id);
    println!(
        "  nmstate ram disk: {}",
        if summary.ram_disk { "included" } else { "skipped" }
    );
    for report in &summary.patched {
        println!("  Patched: {}", report.path.display());
    }
    println!(
        "\nCreated {} in {}",
        args.output.display(),
        format_duration(elapsed)
    );
    Ok(())
}
