//! gpg process spawning.
//!
//! The launcher owns the fixed global flags applied to every invocation and
//! hands back a [`GpgProcess`] whose pipes the invokers wire up themselves.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

/// Default external tool binary.
pub const GPG_BINARY: &str = "gpg";

/// Flags prepended to every invocation. `--batch` keeps gpg from prompting.
pub const GLOBAL_ARGS: &[&str] = &["--batch"];

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The binary was not found.
    #[error("gpg binary not found")]
    NotFound,
    /// Permission denied when spawning.
    #[error("Permission denied")]
    PermissionDenied,
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound,
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::Io(err),
        }
    }
}

/// Concatenate per-call arguments with a command's default arguments.
///
/// Per-call `args` come first, `default_args` follow.
#[must_use]
pub fn assemble_args<A, D>(args: &[A], default_args: &[D]) -> Vec<String>
where
    A: AsRef<str>,
    D: AsRef<str>,
{
    args.iter()
        .map(|s| s.as_ref().to_string())
        .chain(default_args.iter().map(|s| s.as_ref().to_string()))
        .collect()
}

/// Spawns the external tool with the global flags ahead of caller arguments.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    binary: String,
    global_args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl ProcessLauncher {
    /// Create a launcher for `gpg` with the default global flags.
    #[must_use]
    pub fn new() -> Self {
        Self::with_binary(GPG_BINARY)
    }

    /// Create a launcher for a custom binary (alternate gpg builds, test stubs).
    #[must_use]
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            global_args: GLOBAL_ARGS.iter().map(|s| (*s).to_string()).collect(),
            working_dir: None,
        }
    }

    /// Replace the global flag set.
    #[must_use]
    pub fn global_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.global_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the working directory for spawned processes.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Get the binary name.
    #[must_use]
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Get the working directory, if set.
    #[must_use]
    pub fn get_working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    /// Build the full argument vector: global flags, then `args`.
    #[must_use]
    pub fn build_args<S: AsRef<str>>(&self, args: &[S]) -> Vec<String> {
        self.global_args
            .iter()
            .cloned()
            .chain(args.iter().map(|s| s.as_ref().to_string()))
            .collect()
    }

    /// Spawn the tool with all three standard streams piped.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process fails to spawn.
    pub fn spawn<S: AsRef<str>>(&self, args: &[S]) -> Result<GpgProcess, SpawnError> {
        let argv = self.build_args(args);
        tracing::debug!(binary = %self.binary, args = ?argv, "Spawning gpg");

        let mut cmd = Command::new(&self.binary);
        cmd.args(&argv)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(SpawnError::from_io)?;
        tracing::debug!(pid = ?child.id(), "gpg spawned");

        Ok(GpgProcess { child })
    }

    /// Spawn the tool, routing a spawn failure to `on_error`.
    ///
    /// Returns `None` when the process could not be started; `on_error` has
    /// then already been called with the failure.
    pub fn launch<S, F>(&self, args: &[S], on_error: F) -> Option<GpgProcess>
    where
        S: AsRef<str>,
        F: FnOnce(SpawnError),
    {
        match self.spawn(args) {
            Ok(process) => Some(process),
            Err(e) => {
                tracing::debug!(binary = %self.binary, error = %e, "gpg failed to spawn");
                on_error(e);
                None
            }
        }
    }
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

/// A running gpg process.
#[derive(Debug)]
pub struct GpgProcess {
    child: Child,
}

impl GpgProcess {
    /// Take ownership of the stdin handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    /// Take ownership of the stdout handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take ownership of the stderr handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Get the process ID, if still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }
}
