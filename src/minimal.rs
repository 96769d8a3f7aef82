//! Minimal ISO builder.
//!
//! Turns a full live installer ISO into a minimal one:
//!
//! ```text
//! full.iso ──unpack──▶ tree/
//!   1. read volume id
//!   2. move images/pxeboot/rootfs.img to scratch, reserve 1 MiB placeholder
//!   3. version >= floor?  extract nmstatectl from the moved rootfs
//!                         └─▶ images/nmstate.img (cpio.gz)
//!   4. patch grub (+ isolinux unless the arch has none)
//!   5. repack tree/ ──▶ minimal.iso (same volume id)
//! ```
//!
//! All scratch space lives in one temp dir under the configured work dir and
//! is removed when the build returns, on success or failure. The output file
//! only appears once the repack has completed.

use anyhow::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::artifact::{create_ram_disk, write_placeholder, RamDiskTool, PLACEHOLDER_LEN};
use crate::bootcfg::{patch_boot_config, BootLoader, PatchReport};
use crate::error::EditError;
use crate::iso::{IsoImage, Xorriso};
use crate::layout::Layout;
use crate::process::HostRunner;
use crate::rootfs::{extract_binary, RootfsTools, SquashfsTools, UNSQUASHFS_FILE_LIMIT};
use crate::timing::Timer;
use crate::version;

/// Earliest release whose installer can use the nmstatectl ram disk.
pub const MIN_RAM_DISK_VERSION: &str = "4.14";

/// Architectures whose ISOs ship no isolinux config.
pub const NO_ISOLINUX_ARCHES: &[&str] = &["ppc64le"];

#[derive(Debug, Clone)]
pub struct EditorConfig {
    /// Parent for per-build scratch directories.
    pub work_dir: PathBuf,
    /// Releases below this get no ram disk.
    pub min_ram_disk_version: String,
    pub layout: Layout,
    pub tool: RamDiskTool,
    pub no_isolinux_arches: Vec<String>,
    /// Per-command bound for the external tools, `None` for no limit.
    pub timeout: Option<Duration>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir(),
            min_ram_disk_version: MIN_RAM_DISK_VERSION.to_string(),
            layout: Layout::default(),
            tool: RamDiskTool::default(),
            no_isolinux_arches: NO_ISOLINUX_ARCHES.iter().map(|s| s.to_string()).collect(),
            timeout: None,
        }
    }
}

impl EditorConfig {
    pub fn has_isolinux(&self, arch: &str) -> bool {
        !self.no_isolinux_arches.iter().any(|a| a == arch)
    }

    /// Host runner bounded by `timeout`.
    pub fn host_runner(&self) -> HostRunner {
        HostRunner::new().with_timeout(self.timeout)
    }
}

/// What a build produced.
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub volume_id: String,
    pub ram_disk: bool,
    pub patched: Vec<PatchReport>,
}

/// Inputs for one minimal ISO build.
#[derive(Debug, Clone)]
pub struct MinimalIsoRequest<'a> {
    pub full_iso: &'a Path,
    pub output: &'a Path,
    pub rootfs_url: &'a str,
    pub arch: &'a str,
    /// Product release, compared against the ram disk version floor.
    pub version: &'a str,
}

pub struct MinimalIsoBuilder<I, T> {
    config: EditorConfig,
    iso: I,
    tools: T,
}

/// Builder running the real `xorriso`, `7z` and `unsquashfs`.
pub type HostIsoBuilder = MinimalIsoBuilder<Xorriso<HostRunner>, SquashfsTools<HostRunner>>;

impl HostIsoBuilder {
    /// Wire the host tools with the config's per-command timeout.
    pub fn on_host(config: EditorConfig) -> Self {
        let runner = config.host_runner();
        Self::new(
            config,
            Xorriso::new(runner.clone()),
            SquashfsTools::new(runner).with_open_file_limit(UNSQUASHFS_FILE_LIMIT),
        )
    }
}

impl<I: IsoImage, T: RootfsTools> MinimalIsoBuilder<I, T> {
    pub fn new(config: EditorConfig, iso: I, tools: T) -> Self {
        Self { config, iso, tools }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Build a minimal ISO from `req.full_iso` at `req.output`.
    pub fn create_minimal_iso(&self, req: &MinimalIsoRequest<'_>) -> Result<BuildSummary> {
        let layout = &self.config.layout;
        let scratch = tempfile::Builder::new()
            .prefix("isoutil")
            .tempdir_in(&self.config.work_dir)
            .map_err(|e| EditError::io(&self.config.work_dir, e))?;
        let tree = scratch.path().join("tree");
        fs::create_dir(&tree).map_err(|e| EditError::io(&tree, e))?;

        let timer = Timer::start("Unpack ISO");
        self.iso
            .unpack(req.full_iso, &tree)
            .with_context(|| format!("Failed to unpack {}", req.full_iso.display()))?;
        timer.finish();

        let volume_id = self
            .iso
            .volume_id(req.full_iso)
            .with_context(|| format!("Failed to read volume id of {}", req.full_iso.display()))?;
        info!("Volume id: {}", volume_id);

        let rootfs = scratch.path().join("rootfs.img");
        strip_rootfs(&tree, layout, &rootfs)?;

        if version::is_at_least(req.version, &self.config.min_ram_disk_version)? {
            let timer = Timer::start("Build nmstate ram disk");
            self.build_ram_disk(&rootfs, scratch.path(), &tree.join(&layout.ram_disk))
                .with_context(|| {
                    format!("Failed to create nmstate ram disk for arch {}", req.arch)
                })?;
            timer.finish();
        } else {
            info!(
                "Version {} is below {}, skipping ram disk",
                req.version, self.config.min_ram_disk_version
            );
        }

        // the file itself is the signal, whichever way it got there
        let ram_disk = tree.join(&layout.ram_disk).is_file();
        let patched = patch_boot_configs(&tree, &self.config, req.rootfs_url, req.arch, ram_disk)?;

        let timer = Timer::start("Repack ISO");
        self.iso
            .repack(req.output, &tree, &volume_id)
            .with_context(|| format!("Failed to create {}", req.output.display()))?;
        timer.finish();

        Ok(BuildSummary {
            volume_id,
            ram_disk,
            patched,
        })
    }

    /// Extract the tool from `rootfs` and write its ram disk to `output`.
    fn build_ram_disk(&self, rootfs: &Path, scratch: &Path, output: &Path) -> Result<()> {
        let tool = &self.config.tool;
        let extracted = extract_binary(&self.tools, rootfs, scratch, &tool.name)?;
        create_ram_disk(extracted.path(), tool, output)
    }
}

/// Move the rootfs payload out of `tree` to `keep_at` and reserve the
/// placeholder in its stead.
pub fn strip_rootfs(tree: &Path, layout: &Layout, keep_at: &Path) -> Result<()> {
    let payload = tree.join(&layout.rootfs);
    if !payload.is_file() {
        return Err(EditError::not_found(format!("rootfs payload {}", payload.display())).into());
    }
    fs::rename(&payload, keep_at).map_err(|e| EditError::io(&payload, e))?;
    info!("Removed {}", layout.rootfs.display());

    write_placeholder(&tree.join(&layout.placeholder), PLACEHOLDER_LEN)
        .context("Failed to embed initrd placeholder")
}

/// Patch every boot config the ISO for `arch` carries.
pub fn patch_boot_configs(
    tree: &Path,
    config: &EditorConfig,
    rootfs_url: &str,
    arch: &str,
    include_ram_disk: bool,
) -> Result<Vec<PatchReport>> {
    let mut loaders = vec![BootLoader::Grub];
    if config.has_isolinux(arch) {
        loaders.push(BootLoader::Isolinux);
    }

    loaders
        .into_iter()
        .map(|loader| {
            patch_boot_config(loader, tree, &config.layout, rootfs_url, include_ram_disk)
                .with_context(|| format!("Failed to edit {} config", loader.name()))
        })
        .collect()
}

/// Turn an already unpacked full ISO tree into a minimal one and repack it.
///
/// Unlike [`MinimalIsoBuilder::create_minimal_iso`] this never builds a ram
/// disk; one already present at the layout's path is referenced.
pub fn finish_minimal_tree<I: IsoImage + ?Sized>(
    iso: &I,
    tree: &Path,
    volume_id: &str,
    config: &EditorConfig,
    rootfs_url: &str,
    arch: &str,
    output: &Path,
) -> Result<BuildSummary> {
    let layout = &config.layout;
    let payload = tree.join(&layout.rootfs);
    if !payload.is_file() {
        return Err(EditError::not_found(format!("rootfs payload {}", payload.display())).into());
    }
    fs::remove_file(&payload).map_err(|e| EditError::io(&payload, e))?;
    write_placeholder(&tree.join(&layout.placeholder), PLACEHOLDER_LEN)
        .context("Failed to embed initrd placeholder")?;

    let ram_disk = tree.join(&layout.ram_disk).is_file();
    let patched = patch_boot_configs(tree, config, rootfs_url, arch, ram_disk)?;

    iso.repack(output, tree, volume_id)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    Ok(BuildSummary {
        volume_id: volume_id.to_string(),
        ram_disk,
        patched,
    })
}
