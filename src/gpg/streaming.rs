//! Streaming gpg invocation: source stream in, destination stream out.
//!
//! The source is piped into gpg's stdin and gpg's stdout into the
//! destination while stderr is scanned for known failure phrases. Four
//! tasks run per invocation (feeder, drain, stderr monitor, exit watcher)
//! and all settle the same [`CompletionGuard`].

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};
use tokio::task::JoinHandle;

use super::error::{InvokeError, RejectKind};
use super::guard::CompletionGuard;
use super::launcher::ProcessLauncher;
use super::pipe;

/// Message reported on a successful streaming invocation.
pub const STREAM_SUCCESS_MESSAGE: &str = "Stream successfully processed";

const STDERR_CHUNK_SIZE: usize = 8 * 1024;

/// Boxed readable stream.
pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed writable stream.
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Where streamed input comes from.
pub enum Source {
    /// A file opened for reading at invocation time.
    Path(PathBuf),
    /// A caller-supplied stream.
    Reader(BoxReader),
}

impl Source {
    /// Read from the file at `path`.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Read from a caller-supplied stream.
    pub fn reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::Reader(Box::new(reader))
    }

    async fn open(self) -> Result<BoxReader, InvokeError> {
        match self {
            Self::Reader(reader) => Ok(reader),
            Self::Path(path) => match tokio::fs::File::open(&path).await {
                Ok(file) => Ok(Box::new(file)),
                Err(source) => Err(InvokeError::SourceOpen { path, source }),
            },
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

/// Where streamed output goes.
pub enum Dest {
    /// A file created (or truncated) at invocation time.
    Path(PathBuf),
    /// A caller-supplied stream.
    Writer(BoxWriter),
}

impl Dest {
    /// Write to the file at `path`.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Write to a caller-supplied stream.
    pub fn writer(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self::Writer(Box::new(writer))
    }

    async fn open(self) -> Result<BoxWriter, InvokeError> {
        match self {
            Self::Writer(writer) => Ok(writer),
            Self::Path(path) => match tokio::fs::File::create(&path).await {
                Ok(file) => Ok(Box::new(file)),
                Err(source) => Err(InvokeError::DestOpen { path, source }),
            },
        }
    }
}

impl fmt::Debug for Dest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

/// Source and destination for a streaming invocation.
#[derive(Debug, Default)]
pub struct StreamingRequest {
    source: Option<Source>,
    dest: Option<Dest>,
}

impl StreamingRequest {
    /// Create an empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a request between two file paths.
    #[must_use]
    pub fn from_paths(source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self::new()
            .source(Source::path(source))
            .dest(Dest::path(dest))
    }

    /// Set the source.
    #[must_use]
    pub fn source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the destination.
    #[must_use]
    pub fn dest(mut self, dest: Dest) -> Self {
        self.dest = Some(dest);
        self
    }

    /// Split into source and destination, failing if either is missing.
    ///
    /// # Errors
    ///
    /// Returns `InvokeError::MissingSource` or `InvokeError::MissingDest`.
    pub fn validate(self) -> Result<(Source, Dest), InvokeError> {
        let source = self.source.ok_or(InvokeError::MissingSource)?;
        let dest = self.dest.ok_or(InvokeError::MissingDest)?;
        Ok((source, dest))
    }
}

/// A stderr substring and the failure it signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectPattern {
    /// Case-sensitive substring to look for.
    pub needle: String,
    /// Failure reported when the substring appears.
    pub kind: RejectKind,
}

impl RejectPattern {
    /// Create a pattern.
    pub fn new(needle: impl Into<String>, kind: RejectKind) -> Self {
        Self {
            needle: needle.into(),
            kind,
        }
    }
}

/// Heuristic scan of gpg's stderr for known failure phrases.
///
/// Each chunk is checked on its own as it arrives. A phrase split across
/// two reads is not detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectMatcher {
    patterns: Vec<RejectPattern>,
}

impl RejectMatcher {
    /// Create a matcher over the given patterns, checked in order.
    ///
    /// Patterns with an empty needle are dropped: they would match every
    /// chunk of stderr.
    #[must_use]
    pub fn new(patterns: Vec<RejectPattern>) -> Self {
        let patterns = patterns
            .into_iter()
            .filter(|p| {
                if p.needle.is_empty() {
                    tracing::warn!(kind = %p.kind, "Ignoring reject pattern with empty needle");
                }
                !p.needle.is_empty()
            })
            .collect();
        Self { patterns }
    }

    /// The phrases gpg prints for a wrong passphrase and a missing key.
    #[must_use]
    pub fn default_patterns() -> Vec<RejectPattern> {
        vec![
            RejectPattern::new("Bad passphrase", RejectKind::BadPassphrase),
            RejectPattern::new("No secret key", RejectKind::NoSecretKey),
        ]
    }

    /// Return the first pattern kind found in `chunk`.
    #[must_use]
    pub fn scan(&self, chunk: &[u8]) -> Option<RejectKind> {
        let text = String::from_utf8_lossy(chunk);
        self.patterns
            .iter()
            .find(|p| text.contains(p.needle.as_str()))
            .map(|p| p.kind)
    }
}

impl Default for RejectMatcher {
    fn default() -> Self {
        Self::new(Self::default_patterns())
    }
}

/// Result of a successful streaming invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamOutcome {
    /// Bytes copied from gpg's stdout to the destination.
    pub bytes_written: u64,
    /// Informational text gpg wrote to stderr.
    pub stderr: String,
}

impl StreamOutcome {
    /// Human-readable success message.
    #[must_use]
    pub fn message(&self) -> &'static str {
        STREAM_SUCCESS_MESSAGE
    }
}

/// Result type delivered to streaming callbacks.
pub type StreamResult = Result<StreamOutcome, InvokeError>;

/// Runs gpg between a source stream and a destination stream.
#[derive(Debug, Clone, Default)]
pub struct StreamingInvoker {
    launcher: ProcessLauncher,
    matcher: RejectMatcher,
}

impl StreamingInvoker {
    /// Create an invoker over the given launcher with the default matcher.
    #[must_use]
    pub fn new(launcher: ProcessLauncher) -> Self {
        Self {
            launcher,
            matcher: RejectMatcher::default(),
        }
    }

    /// Replace the stderr reject matcher.
    #[must_use]
    pub fn with_matcher(mut self, matcher: RejectMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Stream `request.source` through gpg into `request.dest`.
    ///
    /// `args` is the complete per-call argument list; only the launcher's
    /// global flags are added.
    ///
    /// # Errors
    ///
    /// Fails before spawning on a missing or unopenable source/destination.
    /// After spawning, fails on a known stderr reject, a pipe error, or a
    /// nonzero exit status. An empty output is a success.
    pub async fn invoke<S: AsRef<str>>(
        &self,
        request: StreamingRequest,
        args: &[S],
    ) -> StreamResult {
        let (guard, rx) = CompletionGuard::channel();
        let args = args.iter().map(|s| s.as_ref().to_string()).collect();
        self.start(request, args, guard).await;
        rx.await.unwrap_or(Err(InvokeError::Abandoned))
    }

    /// Run a streaming invocation in the background and hand the result to
    /// `callback`, which fires exactly once.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn invoke_with<F>(
        &self,
        request: StreamingRequest,
        args: Vec<String>,
        callback: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(StreamResult) + Send + 'static,
    {
        let guard = CompletionGuard::wrap(callback);
        let this = self.clone();
        tokio::spawn(async move { this.start(request, args, guard).await })
    }

    async fn start(
        &self,
        request: StreamingRequest,
        args: Vec<String>,
        guard: CompletionGuard<StreamResult>,
    ) {
        let (source, dest) = match open_endpoints(request).await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                tracing::debug!(error = %e, "Streaming request rejected before spawn");
                guard.complete(Err(e));
                return;
            }
        };

        let on_error = guard.clone();
        let Some(mut process) = self.launcher.launch(args.as_slice(), move |e| {
            on_error.complete(Err(e.into()));
        }) else {
            return;
        };

        let feeder = guard.clone();
        let stdin = process.take_stdin();
        let feeding = tokio::spawn(async move {
            if let Err(e) = feed(source, stdin).await {
                feeder.complete(Err(InvokeError::Pipe(e)));
            }
        });

        let drainer = guard.clone();
        let stdout = process.take_stdout();
        let output = tokio::spawn(async move {
            let result = drain(stdout, dest).await;
            if let Err(ref e) = result {
                drainer.complete(Err(InvokeError::Pipe(io::Error::new(e.kind(), e.to_string()))));
            }
            result
        });

        let monitor = tokio::spawn(monitor_stderr(
            process.take_stderr(),
            self.matcher.clone(),
            guard.clone(),
        ));

        tokio::spawn(async move {
            let written = pipe::joined(output.await);
            let stderr = pipe::joined(monitor.await);
            let status = process.wait().await;

            // gpg is gone; a feeder still parked on the caller's source must
            // release it before the invocation settles.
            feeding.abort();
            let _ = feeding.await;

            let result = settle(status, written, stderr);
            tracing::debug!(ok = result.is_ok(), "Streaming gpg invocation finished");
            guard.complete(result);
        });
    }
}

async fn open_endpoints(request: StreamingRequest) -> Result<(BoxReader, BoxWriter), InvokeError> {
    let (source, dest) = request.validate()?;
    let source = source.open().await?;
    let dest = dest.open().await?;
    Ok((source, dest))
}

async fn feed(mut source: BoxReader, stdin: Option<ChildStdin>) -> io::Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    let result = async {
        tokio::io::copy(&mut source, &mut stdin).await?;
        stdin.shutdown().await
    }
    .await;
    pipe::ignore_broken_pipe(result)
}

async fn drain(stdout: Option<ChildStdout>, mut dest: BoxWriter) -> io::Result<u64> {
    let written = match stdout {
        Some(mut stdout) => tokio::io::copy(&mut stdout, &mut dest).await?,
        None => 0,
    };
    dest.shutdown().await?;
    Ok(written)
}

async fn monitor_stderr(
    stderr: Option<ChildStderr>,
    matcher: RejectMatcher,
    guard: CompletionGuard<StreamResult>,
) -> io::Result<String> {
    let mut text = String::new();
    let Some(mut stderr) = stderr else {
        return Ok(text);
    };

    let mut buf = vec![0u8; STDERR_CHUNK_SIZE];
    loop {
        let n = stderr.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let chunk = &buf[..n];
        tracing::debug!(chunk = %String::from_utf8_lossy(chunk), "gpg stderr");

        if let Some(kind) = matcher.scan(chunk) {
            tracing::warn!(%kind, "gpg reported a known failure");
            guard.complete(Err(InvokeError::Rejected(kind)));
        }
        text.push_str(&String::from_utf8_lossy(chunk));
    }
    Ok(text)
}

fn settle(
    status: io::Result<ExitStatus>,
    written: io::Result<u64>,
    stderr: io::Result<String>,
) -> StreamResult {
    let bytes_written = written.map_err(InvokeError::Pipe)?;
    let stderr = stderr.map_err(InvokeError::Io)?;
    let status = status.map_err(InvokeError::Io)?;

    if !status.success() {
        let message = if stderr.is_empty() {
            format!("gpg exited with {status}")
        } else {
            stderr
        };
        return Err(InvokeError::ProcessFailure {
            code: status.code(),
            message,
        });
    }

    Ok(StreamOutcome {
        bytes_written,
        stderr,
    })
}
