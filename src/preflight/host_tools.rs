//! Host tool availability checks.

use crate::process;

use super::types::CheckResult;

/// (tool, package, purpose) for every external program a build runs.
pub const REQUIRED_TOOLS: &[(&str, &str, &str)] = &[
    ("7z", "p7zip", "Required to unpack rootfs.img"),
    ("unsquashfs", "squashfs-tools", "Required to list and extract root.squashfs"),
    ("xorriso", "xorriso", "Required to unpack and repack the ISO"),
];

pub fn check_host_tools() -> Vec<CheckResult> {
    REQUIRED_TOOLS
        .iter()
        .map(|(tool, package, purpose)| check_tool_exists(tool, package, purpose))
        .collect()
}

fn check_tool_exists(tool: &str, package: &str, purpose: &str) -> CheckResult {
    match process::which(tool) {
        Some(path) => CheckResult::pass_with(tool, &path),
        None => CheckResult::fail(
            tool,
            &format!("Not found. Install '{}' package. {}", package, purpose),
        ),
    }
}
