//! Shared test utilities for miniso tests.
//!
//! The fakes stand in for the external tools:
//! - [`FakeIso`] treats an "ISO" as a plain directory plus a `.volume-id`
//!   file, and "repacks" by copying the tree to the output path.
//! - [`FakeRootfs`] treats `rootfs.img` as opaque, materialises a
//!   `root.squashfs` on decompress, and serves a canned listing and binary.

#![allow(dead_code)]

use anyhow::{bail, Result};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

use miniso::iso::IsoImage;
use miniso::rootfs::RootfsTools;

pub const VOLUME_ID_FILE: &str = ".volume-id";

pub const GRUB_CFG: &str = "\
set default=\"1\"
menuentry 'RHEL CoreOS (Live)' --class fedora --class gnu-linux --class gnu --class os {
\tlinux /images/pxeboot/vmlinuz random.trust_cpu=on coreos.liveiso=rhcos-414 ignition.firstboot ignition.platform.id=metal
\tinitrd /images/pxeboot/initrd.img /images/ignition.img
}
";

pub const ISOLINUX_CFG: &str = "\
default vesamenu.c32
label linux
  menu label ^RHEL CoreOS (Live)
  kernel /images/pxeboot/vmlinuz
  append initrd=/images/pxeboot/initrd.img,/images/ignition.img random.trust_cpu=on coreos.liveiso=rhcos-414 ignition.firstboot ignition.platform.id=metal
";

/// Test environment with a work dir and a fake full ISO.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Fake full ISO (a directory)
    pub full_iso: PathBuf,
    /// Parent for scratch dirs
    pub work_dir: PathBuf,
    /// Where outputs are written
    pub out_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path();

        let full_iso = base.join("full-iso");
        let work_dir = base.join("work");
        let out_dir = base.join("out");
        for dir in [&full_iso, &work_dir, &out_dir] {
            fs::create_dir_all(dir).expect("Failed to create test dir");
        }

        Self {
            _temp_dir: temp_dir,
            full_iso,
            work_dir,
            out_dir,
        }
    }

    /// Populate the fake ISO the way an x86_64 live ISO is laid out.
    pub fn with_full_iso(self, volume_id: &str) -> Self {
        let iso = &self.full_iso;
        write_file(&iso.join(VOLUME_ID_FILE), volume_id);
        write_file(&iso.join("images/pxeboot/rootfs.img"), "rootfs payload");
        write_file(&iso.join("images/pxeboot/vmlinuz"), "kernel");
        write_file(&iso.join("images/pxeboot/initrd.img"), "initrd");
        write_file(&iso.join("images/ignition.img"), "");
        write_file(&iso.join("EFI/redhat/grub.cfg"), GRUB_CFG);
        write_file(&iso.join("isolinux/isolinux.cfg"), ISOLINUX_CFG);
        self
    }

    pub fn output(&self) -> PathBuf {
        self.out_dir.join("minimal.iso")
    }

    /// Entries left in the work dir after a build.
    pub fn scratch_leftovers(&self) -> Vec<PathBuf> {
        fs::read_dir(&self.work_dir)
            .expect("Failed to read work dir")
            .map(|e| e.expect("Failed to read entry").path())
            .collect()
    }
}

pub fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    fs::write(path, content).expect("Failed to write file");
}

fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry?;
        let rel = entry.path().strip_prefix(src)?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// ISO images as directories.
#[derive(Default)]
pub struct FakeIso {
    pub fail_repack: bool,
    pub repacked: RefCell<Vec<(PathBuf, String)>>,
}

impl IsoImage for FakeIso {
    fn unpack(&self, iso: &Path, dest: &Path) -> Result<()> {
        copy_tree(iso, dest)?;
        let marker = dest.join(VOLUME_ID_FILE);
        if marker.exists() {
            fs::remove_file(marker)?;
        }
        Ok(())
    }

    fn repack(&self, output: &Path, source: &Path, volume_id: &str) -> Result<()> {
        if self.fail_repack {
            bail!("xorriso exploded");
        }
        copy_tree(source, output)?;
        fs::write(output.join(VOLUME_ID_FILE), volume_id)?;
        self.repacked
            .borrow_mut()
            .push((output.to_path_buf(), volume_id.to_string()));
        Ok(())
    }

    fn volume_id(&self, iso: &Path) -> Result<String> {
        Ok(fs::read_to_string(iso.join(VOLUME_ID_FILE))?.trim().to_string())
    }
}

/// Rootfs payload with a canned listing and binary content.
pub struct FakeRootfs {
    pub listing: String,
    pub binary: Vec<u8>,
    pub calls: RefCell<Vec<String>>,
}

impl FakeRootfs {
    pub fn with_binary(binary: &[u8]) -> Self {
        Self {
            listing: "/usr\n/usr/bin\n/usr/bin/nmstatectl\n/usr/lib/nmstate\n".to_string(),
            binary: binary.to_vec(),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn with_listing(mut self, listing: &str) -> Self {
        self.listing = listing.to_string();
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl RootfsTools for FakeRootfs {
    fn decompress_outer(&self, container: &Path, dest: &Path) -> Result<String> {
        self.calls.borrow_mut().push("decompress".to_string());
        if !container.is_file() {
            bail!("no container at {}", container.display());
        }
        fs::write(dest.join("root.squashfs"), "squashfs")?;
        Ok(String::new())
    }

    fn list_inner(&self, _squashfs: &Path) -> Result<String> {
        self.calls.borrow_mut().push("list".to_string());
        Ok(self.listing.clone())
    }

    fn extract_one(&self, _squashfs: &Path, entry: &str, dest_root: &Path) -> Result<()> {
        self.calls.borrow_mut().push(format!("extract {}", entry));
        let path = dest_root.join(entry.trim_start_matches('/'));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &self.binary)?;
        Ok(())
    }
}

/// Assert that a file exists.
pub fn assert_file_exists(path: &Path) {
    assert!(path.is_file(), "Expected file at {}", path.display());
}

/// Assert that a file does not exist.
pub fn assert_file_absent(path: &Path) {
    assert!(!path.exists(), "Expected nothing at {}", path.display());
}

/// Assert that a file contains a specific string.
pub fn assert_file_contains(path: &Path, needle: &str) {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));
    assert!(
        content.contains(needle),
        "Expected {} to contain '{}', got:\n{}",
        path.display(),
        needle,
        content
    );
}

/// Assert that a file does not contain a specific string.
pub fn assert_file_lacks(path: &Path, needle: &str) {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));
    assert!(
        !content.contains(needle),
        "Expected {} not to contain '{}', got:\n{}",
        path.display(),
        needle,
        content
    );
}
