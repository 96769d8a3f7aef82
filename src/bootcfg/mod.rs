//! Boot config patching for the minimal ISO.
//!
//! The minimal ISO boots the same kernel and initrd as the full ISO, but
//! must fetch its rootfs over the network and load the extra initrds.
//! Both bootloader syntaxes are rewritten in place:
//!
//! - grub: `linux ... 'coreos.live.rootfs_url=URL'` and
//!   `initrd ... /images/assisted_installer_custom.img [/images/nmstate.img]`
//! - isolinux: `append initrd=...,/images/assisted_installer_custom.img[,/images/nmstate.img] ... coreos.live.rootfs_url=URL`
//!
//! The `coreos.liveiso=` parameter is dropped, since the minimal ISO no
//! longer carries the rootfs the live system would look for.
//!
//! Patching is a single pass: a config that already carries the rootfs URL
//! parameter is rejected rather than patched twice.

pub mod rules;

use anyhow::{Context, Result};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::EditError;
use crate::layout::{iso_path, Layout};

pub use rules::{rules_for, Rule};

pub const ROOTFS_URL_PARAM: &str = "coreos.live.rootfs_url";
pub const LIVE_ISO_PARAM: &str = "coreos.liveiso";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootLoader {
    /// UEFI (and ppc64le/s390x) boot.
    Grub,
    /// Legacy BIOS boot, x86_64 only.
    Isolinux,
}

impl BootLoader {
    pub fn name(self) -> &'static str {
        match self {
            BootLoader::Grub => "grub",
            BootLoader::Isolinux => "isolinux",
        }
    }

    /// Candidate config paths for this bootloader, in priority order.
    pub fn candidates(self, layout: &Layout) -> &[PathBuf] {
        match self {
            BootLoader::Grub => &layout.grub_configs,
            BootLoader::Isolinux => &layout.isolinux_configs,
        }
    }
}

/// Outcome of patching one config file.
#[derive(Debug, Clone)]
pub struct PatchReport {
    pub path: PathBuf,
    /// Match count per rule, in application order.
    pub matches: Vec<(&'static str, usize)>,
}

/// Find the first existing config for `loader` under `root`.
pub fn locate(loader: BootLoader, root: &Path, layout: &Layout) -> Result<PathBuf> {
    let candidates = loader.candidates(layout);
    candidates
        .iter()
        .map(|rel| root.join(rel))
        .find(|path| path.is_file())
        .ok_or_else(|| {
            let list: Vec<String> = candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            EditError::not_found(format!(
                "no {} config found, possible paths are [{}]",
                loader.name(),
                list.join(", ")
            ))
            .into()
        })
}

/// Initrd references appended to the boot entry, in load order.
pub fn initrd_refs(layout: &Layout, include_ram_disk: bool) -> Vec<String> {
    let mut refs = vec![iso_path(&layout.placeholder)];
    if include_ram_disk {
        refs.push(iso_path(&layout.ram_disk));
    }
    refs
}

/// Apply one rule to the file at `path`, rewriting it in full.
pub fn apply_rule(path: &Path, rule: &Rule) -> Result<usize> {
    let content = fs::read_to_string(path).map_err(|e| EditError::io(path, e))?;
    let (rewritten, count) = rule.apply(&content);
    debug!(
        "{}: rule '{}' matched {} time(s)",
        path.display(),
        rule.name,
        count
    );

    if count == 0 {
        if rule.required {
            return Err(missing_line(path, rule).into());
        }
        return Ok(0);
    }

    fs::write(path, rewritten).map_err(|e| EditError::io(path, e))?;
    Ok(count)
}

/// Run `rules` over `content` in memory and fail if a required one would
/// not match. Nothing is written.
pub fn check_rules(path: &Path, content: &str, rules: &[Rule]) -> Result<()> {
    let mut text = content.to_string();
    for rule in rules {
        let (next, count) = rule.apply(&text);
        if count == 0 && rule.required {
            return Err(missing_line(path, rule).into());
        }
        text = next;
    }
    Ok(())
}

fn missing_line(path: &Path, rule: &Rule) -> EditError {
    EditError::not_found(format!(
        "line for rule '{}' (/{}/) in {}",
        rule.name,
        rule.pattern(),
        path.display()
    ))
}

/// Locate and patch the `loader` config under `root`.
///
/// Every required rule is checked against the current text before the
/// first write, so a config that cannot be fully patched is left as it was.
pub fn patch_boot_config(
    loader: BootLoader,
    root: &Path,
    layout: &Layout,
    rootfs_url: &str,
    include_ram_disk: bool,
) -> Result<PatchReport> {
    let path = locate(loader, root, layout)?;

    let current = fs::read_to_string(&path).map_err(|e| EditError::io(&path, e))?;
    if current.contains(&format!("{}=", ROOTFS_URL_PARAM)) {
        return Err(EditError::FormatError(format!(
            "{} already sets {}; refusing to patch twice",
            path.display(),
            ROOTFS_URL_PARAM
        ))
        .into());
    }

    let refs = initrd_refs(layout, include_ram_disk);
    let rules = rules_for(loader, rootfs_url, &refs)?;
    check_rules(&path, &current, &rules)
        .with_context(|| format!("Failed to edit {} config", loader.name()))?;

    let mut matches = Vec::with_capacity(rules.len());
    for rule in &rules {
        let count = apply_rule(&path, rule)
            .with_context(|| format!("Failed to edit {} config", loader.name()))?;
        matches.push((rule.name, count));
    }

    info!(
        "Patched {} ({})",
        path.display(),
        matches
            .iter()
            .map(|(name, n)| format!("{}={}", name, n))
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(PatchReport { path, matches })
}
