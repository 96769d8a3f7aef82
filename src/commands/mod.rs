//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `build` - Build a minimal ISO from a full one
//! - `extract` - Pull the ram disk tool out of a rootfs image
//! - `ramdisk` - Wrap a binary in a ram disk
//! - `patch` - Patch the boot configs of an unpacked ISO tree
//! - `show` - Display information
//! - `preflight` - Run preflight checks

pub mod build;
pub mod extract;
pub mod patch;
mod preflight;
pub mod ramdisk;
pub mod show;

pub use build::cmd_build;
pub use extract::cmd_extract_tool;
pub use patch::cmd_patch;
pub use preflight::cmd_preflight;
pub use ramdisk::cmd_ramdisk;
pub use show::cmd_show;

use crate::config::Config;
use crate::process::HostRunner;

/// Host runner bounded by the configured tool timeout.
pub(crate) fn host_runner(config: &Config) -> HostRunner {
    config.editor_config().host_runner()
}
