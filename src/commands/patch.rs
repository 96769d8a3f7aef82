//! Patch command - patches the boot configs of an unpacked ISO tree.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::minimal::patch_boot_configs;

pub struct PatchArgs<'a> {
    pub tree: &'a Path,
    pub rootfs_url: &'a str,
    /// Reference the ram disk even if the tree doesn't carry it yet.
    pub with_ram_disk: bool,
    pub arch: &'a str,
}

/// Execute the patch command.
pub fn cmd_patch(args: PatchArgs<'_>, config: &Config) -> Result<()> {
    let editor = config.editor_config();
    let include = args.with_ram_disk || args.tree.join(&editor.layout.ram_disk).is_file();

    let reports = patch_boot_configs(args.tree, &editor, args.rootfs_url, args.arch, include)?;
    for report in reports {
        let counts: Vec<String> = report
            .matches
            .iter()
            .map(|(rule, n)| format!("{}={}", rule, n))
            .collect();
        println!("Patched {} ({})", report.path.display(), counts.join(", "));
    }
    Ok(())
}
