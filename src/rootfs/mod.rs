//! Access to the live rootfs payload (`images/pxeboot/rootfs.img`).
//!
//! The payload is a compressed container wrapping `root.squashfs`, which in
//! turn holds the live system. Reading a single binary out of it takes three
//! tool invocations, wrapped here as the [`RootfsTools`] capability:
//!
//! ```text
//! rootfs.img ──7z x──▶ root.squashfs ──unsquashfs -lc──▶ listing
//!                            └────────unsquashfs <entry>──▶ squashfs-root/<entry>
//! ```
//!
//! [`binary`] builds the extraction on top of this capability.

pub mod binary;

use anyhow::{Context, Result};
use std::path::Path;

use crate::process::{Cmd, Runner};

pub use binary::{extract_binary, select_entry, ExtractedBinary};

/// File produced by decompressing the outer container.
pub const INNER_SQUASHFS: &str = "root.squashfs";

/// Directory (under the extraction dir) that receives extracted entries.
pub const EXTRACT_ROOT: &str = "squashfs-root";

/// Soft open-file limit for unsquashfs.
///
/// squashfs-tools 4.5 on el9 and older aborts when RLIMIT_NOFILE is very
/// large (plougher/squashfs-tools#125).
pub const UNSQUASHFS_FILE_LIMIT: u64 = 1024;

/// Operations on the compressed rootfs payload.
pub trait RootfsTools {
    /// Decompress the outer container into `dest`. Returns the tool's output.
    fn decompress_outer(&self, container: &Path, dest: &Path) -> Result<String>;

    /// List every file path inside the inner squashfs, one per line.
    fn list_inner(&self, squashfs: &Path) -> Result<String>;

    /// Extract the single `entry` from the squashfs into `dest_root`, without
    /// extended attributes. The file lands at `dest_root/<entry>`.
    fn extract_one(&self, squashfs: &Path, entry: &str, dest_root: &Path) -> Result<()>;
}

impl<T: RootfsTools + ?Sized> RootfsTools for &T {
    fn decompress_outer(&self, container: &Path, dest: &Path) -> Result<String> {
        (**self).decompress_outer(container, dest)
    }

    fn list_inner(&self, squashfs: &Path) -> Result<String> {
        (**self).list_inner(squashfs)
    }

    fn extract_one(&self, squashfs: &Path, entry: &str, dest_root: &Path) -> Result<()> {
        (**self).extract_one(squashfs, entry, dest_root)
    }
}

/// [`RootfsTools`] backed by `7z` and `unsquashfs`.
#[derive(Debug, Clone)]
pub struct SquashfsTools<R> {
    runner: R,
    open_file_limit: u64,
}

impl<R: Runner> SquashfsTools<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            open_file_limit: UNSQUASHFS_FILE_LIMIT,
        }
    }

    pub fn with_open_file_limit(mut self, limit: u64) -> Self {
        self.open_file_limit = limit;
        self
    }

    fn unsquashfs(&self, squashfs: &Path) -> Cmd {
        let cmd = Cmd::new("unsquashfs").open_file_limit(self.open_file_limit);
        match squashfs.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => cmd.dir(dir),
            _ => cmd,
        }
    }
}

impl<R: Runner> RootfsTools for SquashfsTools<R> {
    fn decompress_outer(&self, container: &Path, dest: &Path) -> Result<String> {
        let result = self
            .runner
            .run(
                Cmd::new("7z")
                    .args(["x", "-y"])
                    .arg_path(container)
                    .dir(dest)
                    .error_msg(format!("7z failed to unpack {}", container.display())),
            )
            .with_context(|| format!("Failed to decompress {}", container.display()))?;
        Ok(result.output().to_string())
    }

    fn list_inner(&self, squashfs: &Path) -> Result<String> {
        let result = self
            .runner
            .run(
                self.unsquashfs(squashfs)
                    .args(["-d", "", "-lc"])
                    .arg_path(squashfs)
                    .error_msg(format!("unsquashfs failed to list {}", squashfs.display())),
            )
            .with_context(|| format!("Failed to list {}", squashfs.display()))?;
        Ok(result.output().to_string())
    }

    fn extract_one(&self, squashfs: &Path, entry: &str, dest_root: &Path) -> Result<()> {
        self.runner
            .run(
                self.unsquashfs(squashfs)
                    .args(["-no-xattrs", "-f", "-d"])
                    .arg_path(dest_root)
                    .arg_path(squashfs)
                    .arg(entry)
                    .error_msg(format!(
                        "unsquashfs failed to extract {} from {}",
                        entry,
                        squashfs.display()
                    )),
            )
            .with_context(|| format!("Failed to extract {}", entry))?;
        Ok(())
    }
}
