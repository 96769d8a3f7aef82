//! Fixed paths inside an unpacked installer ISO.
//!
//! All paths are relative to the ISO root. Boot configs reference files by
//! their absolute ISO path, see [`iso_path`].

use std::path::{Path, PathBuf};

/// Grub configs in priority order, one per distribution variant.
pub const GRUB_CONFIGS: &[&str] = &[
    "EFI/redhat/grub.cfg",
    "EFI/fedora/grub.cfg",
    "boot/grub/grub.cfg",
    "EFI/centos/grub.cfg",
];

pub const ISOLINUX_CONFIGS: &[&str] = &["isolinux/isolinux.cfg"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Live rootfs payload, removed from the minimal ISO.
    pub rootfs: PathBuf,
    /// Zero-filled initrd slot reserved for per-cluster data.
    pub placeholder: PathBuf,
    /// Auxiliary ram disk carrying the extracted tool.
    pub ram_disk: PathBuf,
    pub grub_configs: Vec<PathBuf>,
    pub isolinux_configs: Vec<PathBuf>,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            rootfs: "images/pxeboot/rootfs.img".into(),
            placeholder: "images/assisted_installer_custom.img".into(),
            ram_disk: "images/nmstate.img".into(),
            grub_configs: GRUB_CONFIGS.iter().map(PathBuf::from).collect(),
            isolinux_configs: ISOLINUX_CONFIGS.iter().map(PathBuf::from).collect(),
        }
    }
}

/// Render a tree-relative path the way boot configs reference it (`/images/x.img`).
pub fn iso_path(relative: &Path) -> String {
    format!("/{}", relative.to_string_lossy().trim_start_matches('/'))
}
