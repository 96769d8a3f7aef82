//! Outer ISO image handling via xorriso.
//!
//! Unpacking, repacking and reading the volume id are delegated to
//! `xorriso`. The rebuilt image keeps the source's volume id so boot
//! configs that look the ISO up by label (`root=live:CDLABEL=...`) still
//! find it.

use anyhow::{Context, Result};
use log::{info, warn};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::EditError;
use crate::process::{Cmd, Runner};

/// BIOS El Torito image, present on x86_64 ISOs.
pub const ISOLINUX_BIN: &str = "isolinux/isolinux.bin";
pub const ISOLINUX_CATALOG: &str = "isolinux/boot.cat";
pub const ISOHYBRID_MBR: &str = "isolinux/isohdpfx.bin";
/// UEFI El Torito image.
pub const EFIBOOT_IMG: &str = "images/efiboot.img";

/// Unpack, repack and identify ISO images.
pub trait IsoImage {
    /// Extract the full contents of `iso` into `dest`, leaving it writable.
    fn unpack(&self, iso: &Path, dest: &Path) -> Result<()>;

    /// Build a bootable image at `output` from `source` with `volume_id`.
    fn repack(&self, output: &Path, source: &Path, volume_id: &str) -> Result<()>;

    /// Read the primary volume descriptor's volume id.
    fn volume_id(&self, iso: &Path) -> Result<String>;
}

impl<T: IsoImage + ?Sized> IsoImage for &T {
    fn unpack(&self, iso: &Path, dest: &Path) -> Result<()> {
        (**self).unpack(iso, dest)
    }

    fn repack(&self, output: &Path, source: &Path, volume_id: &str) -> Result<()> {
        (**self).repack(output, source, volume_id)
    }

    fn volume_id(&self, iso: &Path) -> Result<String> {
        (**self).volume_id(iso)
    }
}

#[derive(Debug, Clone)]
pub struct Xorriso<R> {
    runner: R,
}

impl<R: Runner> Xorriso<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: Runner> IsoImage for Xorriso<R> {
    fn unpack(&self, iso: &Path, dest: &Path) -> Result<()> {
        require_file(iso)?;
        info!("Unpacking {} to {}", iso.display(), dest.display());

        self.runner.run(
            Cmd::new("xorriso")
                .args(["-osirrox", "on", "-indev"])
                .arg_path(iso)
                .args(["-extract", "/"])
                .arg_path(dest)
                .error_msg(format!("xorriso failed to unpack {}", iso.display())),
        )?;

        // xorriso copies the read-only ISO permissions
        make_writable(dest)
    }

    fn repack(&self, output: &Path, source: &Path, volume_id: &str) -> Result<()> {
        let tmp = temp_sibling(output);
        info!("Repacking {} as {} ({})", source.display(), output.display(), volume_id);

        let result = self.runner.run(
            Cmd::new("xorriso")
                .args(mkisofs_args(source, &tmp, volume_id))
                .error_msg(format!("xorriso failed to create {}", output.display())),
        );
        if let Err(e) = result {
            if tmp.exists() {
                if let Err(rm) = fs::remove_file(&tmp) {
                    warn!("Failed to remove {}: {}", tmp.display(), rm);
                }
            }
            return Err(e);
        }

        fs::rename(&tmp, output).map_err(|e| EditError::io(output, e))?;
        Ok(())
    }

    fn volume_id(&self, iso: &Path) -> Result<String> {
        require_file(iso)?;
        let result = self.runner.run(
            Cmd::new("xorriso")
                .arg("-indev")
                .arg_path(iso)
                .arg("-pvd_info")
                .error_msg(format!("xorriso failed to read {}", iso.display())),
        )?;

        parse_volume_id(&result.stdout)
            .or_else(|| parse_volume_id(&result.stderr))
            .ok_or_else(|| {
                EditError::FormatError(format!(
                    "no 'Volume Id' in xorriso -pvd_info output for {}",
                    iso.display()
                ))
                .into()
            })
    }
}

fn require_file(iso: &Path) -> Result<()> {
    if !iso.is_file() {
        return Err(EditError::not_found(format!("ISO image {}", iso.display())).into());
    }
    Ok(())
}

/// Extract the value of the `Volume Id : ...` line.
pub fn parse_volume_id(pvd_info: &str) -> Option<String> {
    pvd_info
        .lines()
        .filter(|line| line.trim_start().starts_with("Volume Id"))
        .find_map(|line| line.split_once(':'))
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// `xorriso -as mkisofs` arguments for rebuilding `source` into `output`.
///
/// Boot records are added for whichever El Torito images the tree carries.
pub fn mkisofs_args(source: &Path, output: &Path, volume_id: &str) -> Vec<String> {
    let mut args: Vec<String> = ["-as", "mkisofs", "-o"]
        .into_iter()
        .map(String::from)
        .collect();
    args.push(output.to_string_lossy().into_owned());
    args.extend(
        ["-V", volume_id, "-J", "-joliet-long", "-rational-rock"]
            .into_iter()
            .map(String::from),
    );

    let has_isolinux = source.join(ISOLINUX_BIN).is_file();
    let has_efiboot = source.join(EFIBOOT_IMG).is_file();

    if has_isolinux {
        if source.join(ISOHYBRID_MBR).is_file() {
            args.push("-isohybrid-mbr".into());
            args.push(source.join(ISOHYBRID_MBR).to_string_lossy().into_owned());
        }
        args.extend(
            [
                "-b",
                ISOLINUX_BIN,
                "-c",
                ISOLINUX_CATALOG,
                "-no-emul-boot",
                "-boot-load-size",
                "4",
                "-boot-info-table",
            ]
            .into_iter()
            .map(String::from),
        );
    }

    if has_efiboot {
        if has_isolinux {
            args.push("-eltorito-alt-boot".into());
        }
        args.extend(
            ["-e", EFIBOOT_IMG, "-no-emul-boot", "-isohybrid-gpt-basdat"]
                .into_iter()
                .map(String::from),
        );
    }

    args.push(source.to_string_lossy().into_owned());
    args
}

/// Give the owner write access to everything under `root`.
pub fn make_writable(root: &Path) -> Result<()> {
    for entry in WalkDir::new(root) {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        let path = entry.path();
        let metadata = entry
            .metadata()
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        if metadata.file_type().is_symlink() {
            continue;
        }
        let mode = metadata.permissions().mode();
        let wanted = if metadata.is_dir() {
            mode | 0o700
        } else {
            mode | 0o200
        };
        if wanted != mode {
            fs::set_permissions(path, fs::Permissions::from_mode(wanted))
                .map_err(|e| EditError::io(path, e))?;
        }
    }
    Ok(())
}

fn temp_sibling(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    output.with_file_name(name)
}
