//! Error taxonomy for minimal ISO builds.
//!
//! Functions across the crate return `anyhow::Result` and attach context at
//! each component boundary. The root cause is always one of these variants,
//! so callers can classify a failure with `err.downcast_ref::<EditError>()`
//! no matter how much context was layered on top.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EditError {
    /// An expected input file, program, or pattern match is absent.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// An external process exited non-zero.
    #[error("'{command}' failed (exit code {code}){}", fmt_stderr(.stderr))]
    ExternalToolFailure {
        command: String,
        code: i32,
        stderr: String,
    },

    /// An external tool or file produced output of an unexpected shape.
    #[error("unexpected format: {0}")]
    FormatError(String),

    /// Local read/write failure.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The command ran past its deadline and was killed.
    #[error("'{command}' timed out after {}s", .after.as_secs())]
    TimedOut { command: String, after: Duration },

    /// The command was cancelled by the caller and killed.
    #[error("'{command}' was cancelled")]
    Cancelled { command: String },
}

fn fmt_stderr(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(":\n{}", stderr)
    }
}

impl EditError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify an `anyhow::Error` chain, if it is rooted in an `EditError`.
    pub fn of(err: &anyhow::Error) -> Option<&EditError> {
        err.downcast_ref::<EditError>()
    }

    pub fn is_not_found(err: &anyhow::Error) -> bool {
        matches!(Self::of(err), Some(EditError::NotFound { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_downcast_survives_context() {
        let err = Err::<(), _>(EditError::not_found("grub.cfg"))
            .context("patching boot config")
            .context("building minimal ISO")
            .unwrap_err();

        assert!(EditError::is_not_found(&err));
        assert!(format!("{:#}", err).contains("grub.cfg"));
    }

    #[test]
    fn test_tool_failure_message_includes_stderr() {
        let err = EditError::ExternalToolFailure {
            command: "unsquashfs -lc root.squashfs".into(),
            code: 1,
            stderr: "FATAL ERROR: Can't open root.squashfs".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("exit code 1"));
        assert!(msg.contains("Can't open root.squashfs"));
    }

    #[test]
    fn test_tool_failure_without_stderr() {
        let err = EditError::ExternalToolFailure {
            command: "false".into(),
            code: 1,
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "'false' failed (exit code 1)");
    }
}
