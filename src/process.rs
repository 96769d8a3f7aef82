//! Centralized command execution with consistent error handling.
//!
//! Every external tool the build touches (`7z`, `unsquashfs`, `xorriso`) is
//! launched through [`Cmd`]. Commands capture stdout and stderr separately,
//! may carry a deadline and a cancellation token, and fail with an
//! [`EditError`] that carries the captured stderr.
//!
//! The [`Runner`] trait is the seam used by the rest of the crate, so tests
//! can script tool behaviour without spawning real processes.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::io::{self, Read};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::EditError;

/// How often a running child is polled when a deadline or token is set.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long output readers may drain after the child is killed.
const READER_GRACE: Duration = Duration::from_millis(500);

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit status of the command.
    pub status: ExitStatus,
    /// Captured stdout as a string.
    pub stdout: String,
    /// Captured stderr as a string.
    pub stderr: String,
}

impl CommandResult {
    /// Returns true if the command exited successfully.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Get the exit code, or -1 if terminated by signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    /// Stdout with a single trailing line terminator removed.
    pub fn output(&self) -> &str {
        let out = self.stdout.strip_suffix('\n').unwrap_or(&self.stdout);
        out.strip_suffix('\r').unwrap_or(out)
    }

    /// Get stdout, trimmed of whitespace.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Get stderr, trimmed of whitespace.
    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// Shared flag used to abort running commands from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Builder for configuring command execution.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    /// If true, don't fail on non-zero exit.
    allow_fail: bool,
    /// Custom error message prefix.
    error_prefix: Option<String>,
    timeout: Option<Duration>,
    cancel: Option<CancelToken>,
    /// Soft RLIMIT_NOFILE applied to the child before exec.
    open_file_limit: Option<u64>,
}

impl Cmd {
    /// Create a new command builder.
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            current_dir: None,
            allow_fail: false,
            error_prefix: None,
            timeout: None,
            cancel: None,
            open_file_limit: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Set the working directory.
    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Allow non-zero exit codes without failing.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Set a custom error message prefix.
    pub fn error_msg(mut self, msg: impl AsRef<str>) -> Self {
        self.error_prefix = Some(msg.as_ref().to_string());
        self
    }

    /// Kill the command and fail with `TimedOut` if it runs longer than `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Kill the command and fail with `Cancelled` once `token` is cancelled.
    pub fn cancel_on(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Set the child's soft open-file limit (the `ulimit -n` equivalent).
    pub fn open_file_limit(mut self, limit: u64) -> Self {
        self.open_file_limit = Some(limit);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn get_open_file_limit(&self) -> Option<u64> {
        self.open_file_limit
    }

    /// Render the command as a shell-like line for logs and errors.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push('\'');
                line.push_str(arg);
                line.push('\'');
            } else {
                line.push_str(arg);
            }
        }
        line
    }

    /// Run the command and capture output.
    pub fn run(self) -> Result<CommandResult> {
        let line = self.command_line();
        info!("Running cmd: {}", line);

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }

        if let Some(limit) = self.open_file_limit {
            // SAFETY: the closure only calls async-signal-safe libc functions.
            unsafe {
                cmd.pre_exec(move || set_open_file_limit(limit));
            }
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(EditError::not_found(format!(
                    "program '{}' (is it installed?)",
                    self.program
                ))
                .into());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to execute '{}'", self.program))
            }
        };

        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let status = match self.wait(&mut child, &line) {
            Ok(status) => status,
            Err(e) => {
                reap_readers(&line, [stdout_reader, stderr_reader], READER_GRACE);
                return Err(e);
            }
        };

        let result = CommandResult {
            status,
            stdout: join_reader(stdout_reader),
            stderr: join_reader(stderr_reader),
        };
        debug!(
            "'{}' exited with {} ({} bytes stdout, {} bytes stderr)",
            self.program,
            result.code(),
            result.stdout.len(),
            result.stderr.len()
        );

        if !self.allow_fail && !result.success() {
            let failure = EditError::ExternalToolFailure {
                command: line,
                code: result.code(),
                stderr: result.stderr_trimmed().to_string(),
            };
            return match self.error_prefix {
                Some(prefix) => Err(anyhow::Error::new(failure).context(prefix)),
                None => Err(failure.into()),
            };
        }

        Ok(result)
    }

    fn wait(&self, child: &mut Child, line: &str) -> Result<ExitStatus> {
        if self.timeout.is_none() && self.cancel.is_none() {
            return child
                .wait()
                .with_context(|| format!("Failed to wait for '{}'", self.program));
        }

        let start = Instant::now();
        loop {
            if let Some(status) = child
                .try_wait()
                .with_context(|| format!("Failed to wait for '{}'", self.program))?
            {
                return Ok(status);
            }

            if let Some(timeout) = self.timeout {
                if start.elapsed() >= timeout {
                    kill(child);
                    return Err(EditError::TimedOut {
                        command: line.to_string(),
                        after: timeout,
                    }
                    .into());
                }
            }

            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                kill(child);
                return Err(EditError::Cancelled {
                    command: line.to_string(),
                }
                .into());
            }

            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn set_open_file_limit(limit: u64) -> io::Result<()> {
    let mut rl = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: rl is a valid, writable rlimit.
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut rl) } != 0 {
        return Err(io::Error::last_os_error());
    }
    let wanted = limit as libc::rlim_t;
    rl.rlim_cur = if rl.rlim_max != libc::RLIM_INFINITY && wanted > rl.rlim_max {
        rl.rlim_max
    } else {
        wanted
    };
    // SAFETY: rl is a valid rlimit.
    if unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &rl) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn join_reader(handle: JoinHandle<Vec<u8>>) -> String {
    let bytes = handle.join().unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Join readers that finish within `grace`. The rest are detached; each
/// exits once the last process holding its pipe (a grandchild) does.
/// Returns how many were detached.
fn reap_readers<const N: usize>(
    line: &str,
    readers: [JoinHandle<Vec<u8>>; N],
    grace: Duration,
) -> usize {
    let deadline = Instant::now() + grace;
    while Instant::now() < deadline && !readers.iter().all(JoinHandle::is_finished) {
        thread::sleep(POLL_INTERVAL);
    }

    let mut detached = 0;
    for reader in readers {
        if reader.is_finished() {
            let _ = reader.join();
        } else {
            detached += 1;
        }
    }
    if detached > 0 {
        warn!(
            "'{}' was killed but its output is still held open, not waiting for it",
            line
        );
    }
    detached
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

// =============================================================================
// Runner seam
// =============================================================================

/// Something that can execute a [`Cmd`].
pub trait Runner {
    fn run(&self, cmd: Cmd) -> Result<CommandResult>;
}

/// Runs commands on the host, applying a default deadline and token to any
/// command that doesn't set its own.
#[derive(Debug, Clone, Default)]
pub struct HostRunner {
    timeout: Option<Duration>,
    cancel: Option<CancelToken>,
}

impl HostRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

impl Runner for HostRunner {
    fn run(&self, mut cmd: Cmd) -> Result<CommandResult> {
        if cmd.timeout.is_none() {
            cmd.timeout = self.timeout;
        }
        if cmd.cancel.is_none() {
            cmd.cancel = self.cancel.clone();
        }
        cmd.run()
    }
}

impl<R: Runner + ?Sized> Runner for &R {
    fn run(&self, cmd: Cmd) -> Result<CommandResult> {
        (**self).run(cmd)
    }
}

// =============================================================================
// Convenience functions
// =============================================================================

/// Run a command with arguments. Fails with stderr on error.
pub fn run<I, S>(program: &str, args: I) -> Result<CommandResult>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Cmd::new(program).args(args).run()
}

/// Run a command in a specific directory.
pub fn run_in<I, S>(program: &str, args: I, dir: &Path) -> Result<CommandResult>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Cmd::new(program).dir(dir).args(args).run()
}

/// Check if a program exists in PATH.
///
/// Returns the full path if found, None otherwise.
pub fn which(program: &str) -> Option<String> {
    which::which(program)
        .ok()
        .map(|p| p.to_string_lossy().into_owned())
}

/// Check if a program exists in PATH (bool version).
pub fn exists(program: &str) -> bool {
    which(program).is_some()
}

// =============================================================================
// Tests
// =============================================================================
