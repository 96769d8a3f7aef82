//! Preflight checks for a minimal ISO build.
//!
//! Validates host tools and the work directory before a build starts.
//! Run with `miniso preflight` to check everything is ready.

mod host_tools;
mod types;

use anyhow::{bail, Result};
use log::info;

use crate::config::Config;

pub use host_tools::{check_host_tools, REQUIRED_TOOLS};
pub use types::{CheckResult, CheckStatus, PreflightReport};

/// Run all preflight checks.
pub fn run_preflight(config: &Config) -> PreflightReport {
    let mut checks = Vec::new();

    info!("Checking host tools");
    checks.extend(check_host_tools());

    info!("Checking work directory");
    checks.push(check_work_dir(config));

    PreflightReport { checks }
}

/// Run preflight and bail if any checks fail.
pub fn run_preflight_or_fail(config: &Config) -> Result<()> {
    let report = run_preflight(config);
    report.print();

    if !report.all_passed() {
        bail!(
            "Preflight failed: {} check(s) failed. Fix the issues above before building.",
            report.fail_count()
        );
    }

    println!("All preflight checks passed!\n");
    Ok(())
}

/// The work dir must exist and accept new directories.
fn check_work_dir(config: &Config) -> CheckResult {
    const NAME: &str = "work directory";
    let dir = &config.work_dir;
    if !dir.is_dir() {
        return CheckResult::fail(NAME, &format!("{} does not exist", dir.display()));
    }
    match tempfile::Builder::new().prefix("preflight").tempdir_in(dir) {
        Ok(probe) => {
            let path = probe.path().to_path_buf();
            if let Err(e) = probe.close() {
                return CheckResult::warn(
                    NAME,
                    &format!("could not remove probe {}: {}", path.display(), e),
                );
            }
            CheckResult::pass_with(NAME, &dir.display().to_string())
        }
        Err(e) => CheckResult::fail(NAME, &format!("{} is not writable: {}", dir.display(), e)),
    }
}
