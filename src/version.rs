//! Product version gate.
//!
//! Release versions arrive as `4.14`, `4.14.3` or `4.15.0-ec.2`. They are
//! padded to three components before being parsed as semver, and compared
//! with semver ordering, so a pre-release sorts below its release.

use anyhow::Result;
use semver::Version;

use crate::error::EditError;

/// Parse a possibly-short release version string.
pub fn parse_release(version: &str) -> Result<Version> {
    let trimmed = version.trim().trim_start_matches('v');
    let (core, suffix) = match trimmed.find(['-', '+']) {
        Some(idx) => trimmed.split_at(idx),
        None => (trimmed, ""),
    };

    let components = core.split('.').count();
    let padded = match components {
        1 => format!("{}.0.0{}", core, suffix),
        2 => format!("{}.0{}", core, suffix),
        _ => trimmed.to_string(),
    };

    Version::parse(&padded).map_err(|e| {
        EditError::FormatError(format!("invalid version '{}': {}", version, e)).into()
    })
}

/// Returns true if `version` is at or above `minimum`.
pub fn is_at_least(version: &str, minimum: &str) -> Result<bool> {
    let version = parse_release(version)?;
    let minimum = parse_release(minimum)?;
    Ok(version >= minimum)
}
