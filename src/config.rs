//! Configuration for miniso.
//!
//! Reads configuration from a .env file and environment variables.
//! Environment variables take precedence over the .env file, and CLI flags
//! take precedence over both.

use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::EditError;
use crate::minimal::{EditorConfig, MIN_RAM_DISK_VERSION};

pub const WORK_DIR_VAR: &str = "MINISO_WORK_DIR";
pub const TOOL_TIMEOUT_VAR: &str = "MINISO_TOOL_TIMEOUT_SECS";
pub const MIN_RAM_DISK_VERSION_VAR: &str = "MINISO_MIN_RAMDISK_VERSION";

/// Generous enough for unsquashfs on a slow disk.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30 * 60;

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Parent directory for per-build scratch space.
    pub work_dir: PathBuf,
    /// Per-command timeout, 0 disables it.
    pub tool_timeout_secs: u64,
    pub min_ram_disk_version: String,
}

impl Config {
    /// Load configuration from `<base_dir>/.env` and the environment.
    pub fn load(base_dir: &Path) -> Result<Self> {
        let mut vars = read_env_file(&base_dir.join(".env"));
        vars.extend(std::env::vars());
        Self::from_vars(base_dir, &vars)
    }

    /// Build a config from already merged variables.
    pub fn from_vars(base_dir: &Path, vars: &HashMap<String, String>) -> Result<Self> {
        let work_dir = vars
            .get(WORK_DIR_VAR)
            .filter(|s| !s.is_empty())
            .map(|s| {
                let path = PathBuf::from(s);
                if path.is_absolute() {
                    path
                } else {
                    base_dir.join(path)
                }
            })
            .unwrap_or_else(std::env::temp_dir);

        let tool_timeout_secs = match vars.get(TOOL_TIMEOUT_VAR) {
            Some(s) => s.trim().parse::<u64>().map_err(|_| {
                EditError::FormatError(format!(
                    "{} must be a whole number of seconds, got '{}'",
                    TOOL_TIMEOUT_VAR, s
                ))
            })?,
            None => DEFAULT_TOOL_TIMEOUT_SECS,
        };

        let min_ram_disk_version = vars
            .get(MIN_RAM_DISK_VERSION_VAR)
            .cloned()
            .unwrap_or_else(|| MIN_RAM_DISK_VERSION.to_string());
        // fail at startup, not halfway through a build
        crate::version::parse_release(&min_ram_disk_version)?;

        Ok(Self {
            work_dir,
            tool_timeout_secs,
            min_ram_disk_version,
        })
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        match self.tool_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Library settings derived from this config.
    pub fn editor_config(&self) -> EditorConfig {
        EditorConfig {
            work_dir: self.work_dir.clone(),
            min_ram_disk_version: self.min_ram_disk_version.clone(),
            timeout: self.tool_timeout(),
            ..EditorConfig::default()
        }
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  {}: {}", WORK_DIR_VAR, self.work_dir.display());
        match self.tool_timeout() {
            Some(t) => println!("  {}: {}s", TOOL_TIMEOUT_VAR, t.as_secs()),
            None => println!("  {}: disabled", TOOL_TIMEOUT_VAR),
        }
        println!(
            "  {}: {}",
            MIN_RAM_DISK_VERSION_VAR, self.min_ram_disk_version
        );
        if self.work_dir.is_dir() {
            println!("  Work dir: FOUND");
        } else {
            println!("  Work dir: NOT FOUND (create it or set {})", WORK_DIR_VAR);
        }
    }
}

/// Parse `KEY=value` lines, skipping comments and blanks. A missing file is empty.
fn read_env_file(path: &Path) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    let Ok(content) = fs::read_to_string(path) else {
        return vars;
    };
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            vars.insert(key.trim().to_string(), value.to_string());
        }
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(Path::new("/base"), &HashMap::new()).unwrap();
        assert_eq!(config.work_dir, std::env::temp_dir());
        assert_eq!(config.tool_timeout(), Some(Duration::from_secs(1800)));
        assert_eq!(config.min_ram_disk_version, "4.14");
    }

    #[test]
    fn test_relative_work_dir_is_under_base() {
        let config =
            Config::from_vars(Path::new("/base"), &vars(&[(WORK_DIR_VAR, "scratch")])).unwrap();
        assert_eq!(config.work_dir, Path::new("/base/scratch"));
    }

    #[test]
    fn test_zero_timeout_disables() {
        let config =
            Config::from_vars(Path::new("/b"), &vars(&[(TOOL_TIMEOUT_VAR, "0")])).unwrap();
        assert_eq!(config.tool_timeout(), None);
        assert_eq!(config.editor_config().timeout, None);
    }

    #[test]
    fn test_timeout_reaches_host_runner() {
        use crate::process::{Cmd, Runner};

        let config =
            Config::from_vars(Path::new("/b"), &vars(&[(TOOL_TIMEOUT_VAR, "1")])).unwrap();
        let err = config
            .editor_config()
            .host_runner()
            .run(Cmd::new("sleep").arg("5"))
            .unwrap_err();
        assert!(matches!(
            EditError::of(&err),
            Some(EditError::TimedOut { after, .. }) if *after == Duration::from_secs(1)
        ));
    }

    #[test]
    fn test_bad_values_are_format_errors() {
        let err = Config::from_vars(Path::new("/b"), &vars(&[(TOOL_TIMEOUT_VAR, "soon")]))
            .unwrap_err();
        assert!(matches!(EditError::of(&err), Some(EditError::FormatError(_))));

        let err =
            Config::from_vars(Path::new("/b"), &vars(&[(MIN_RAM_DISK_VERSION_VAR, "four")]))
                .unwrap_err();
        assert!(matches!(EditError::of(&err), Some(EditError::FormatError(_))));
    }

    #[test]
    fn test_read_env_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".env");
        fs::write(
            &path,
            "# comment\n\nMINISO_WORK_DIR=\"/var/tmp/miniso\"\nMINISO_TOOL_TIMEOUT_SECS = '60'\n",
        )
        .unwrap();

        let vars = read_env_file(&path);
        assert_eq!(vars[WORK_DIR_VAR], "/var/tmp/miniso");
        assert_eq!(vars[TOOL_TIMEOUT_VAR], "60");
        assert!(read_env_file(&temp.path().join("missing")).is_empty());
    }

    #[test]
    #[serial]
    fn test_environment_overrides_env_file() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(".env"),
            "MINISO_MIN_RAMDISK_VERSION=4.12\nMINISO_TOOL_TIMEOUT_SECS=60\n",
        )
        .unwrap();

        std::env::set_var(MIN_RAM_DISK_VERSION_VAR, "4.16");
        std::env::remove_var(TOOL_TIMEOUT_VAR);
        let config = Config::load(temp.path());
        std::env::remove_var(MIN_RAM_DISK_VERSION_VAR);

        let config = config.unwrap();
        assert_eq!(config.min_ram_disk_version, "4.16");
        assert_eq!(config.tool_timeout_secs, 60);
    }

    #[test]
    fn test_serializes_to_json() {
        let config = Config::from_vars(Path::new("/b"), &vars(&[(WORK_DIR_VAR, "/w")])).unwrap();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["work_dir"], "/w");
        assert_eq!(json["tool_timeout_secs"], 1800);
    }
}
