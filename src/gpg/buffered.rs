//! Buffered gpg invocation: one in-memory input, collected output.

use std::io;
use std::process::ExitStatus;

use tokio::task::JoinHandle;

use super::error::InvokeError;
use super::guard::CompletionGuard;
use super::launcher::{assemble_args, ProcessLauncher};
use super::pipe;

const NO_ARGS: &[&str] = &[];

/// Output of a successful buffered invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GpgOutput {
    /// Everything gpg wrote to stdout, in arrival order.
    pub stdout: Vec<u8>,
    /// Informational text gpg wrote to stderr.
    pub stderr: String,
}

impl GpgOutput {
    /// Stdout decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Result type delivered to buffered callbacks.
pub type BufferedResult = Result<GpgOutput, InvokeError>;

/// Runs gpg against a single in-memory input.
#[derive(Debug, Clone, Default)]
pub struct BufferedInvoker {
    launcher: ProcessLauncher,
}

impl BufferedInvoker {
    /// Create an invoker over the given launcher.
    #[must_use]
    pub fn new(launcher: ProcessLauncher) -> Self {
        Self { launcher }
    }

    /// Run gpg with `args ++ default_args`, feeding `input` on stdin.
    ///
    /// # Errors
    ///
    /// Returns `InvokeError::Spawn` if gpg cannot start and
    /// `InvokeError::ProcessFailure` on a nonzero exit. The failure message
    /// is the stderr text, or the stdout text when stderr was empty.
    pub async fn invoke<D, A>(
        &self,
        input: impl Into<Vec<u8>>,
        default_args: &[D],
        args: &[A],
    ) -> BufferedResult
    where
        D: AsRef<str>,
        A: AsRef<str>,
    {
        let (guard, rx) = CompletionGuard::channel();
        self.start(input.into(), assemble_args(args, default_args), guard);
        rx.await.unwrap_or(Err(InvokeError::Abandoned))
    }

    /// Run gpg with only the command's default arguments.
    ///
    /// # Errors
    ///
    /// Same as [`BufferedInvoker::invoke`].
    pub async fn run<D: AsRef<str>>(
        &self,
        input: impl Into<Vec<u8>>,
        default_args: &[D],
    ) -> BufferedResult {
        self.invoke(input, default_args, NO_ARGS).await
    }

    /// Run gpg in the background and hand the result to `callback`.
    ///
    /// `args: None` behaves exactly like an empty argument list. The callback
    /// fires exactly once.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn invoke_with<F>(
        &self,
        input: Vec<u8>,
        default_args: Vec<String>,
        args: Option<Vec<String>>,
        callback: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(BufferedResult) + Send + 'static,
    {
        let guard = CompletionGuard::wrap(callback);
        let argv = assemble_args(args.unwrap_or_default().as_slice(), default_args.as_slice());
        let this = self.clone();
        tokio::spawn(async move { this.start(input, argv, guard) })
    }

    fn start(&self, input: Vec<u8>, argv: Vec<String>, guard: CompletionGuard<BufferedResult>) {
        let on_error = guard.clone();
        let Some(mut process) = self.launcher.launch(argv.as_slice(), move |e| {
            on_error.complete(Err(e.into()));
        }) else {
            return;
        };

        let stdin = process.take_stdin();
        let stdout = tokio::spawn(pipe::read_all(process.take_stdout()));
        let stderr = tokio::spawn(pipe::read_all(process.take_stderr()));

        let writer = guard.clone();
        tokio::spawn(async move {
            if let Err(e) = pipe::write_and_close(stdin, &input).await {
                writer.complete(Err(InvokeError::Pipe(e)));
            }
        });

        tokio::spawn(async move {
            let stdout = pipe::joined(stdout.await);
            let stderr = pipe::joined(stderr.await);
            let status = process.wait().await;
            let result = settle(status, stdout, stderr);
            tracing::debug!(ok = result.is_ok(), "Buffered gpg invocation finished");
            guard.complete(result);
        });
    }
}

/// Message for a failed invocation: stderr text, falling back to stdout.
///
/// Some gpg commands (signature verification, key import) report on stdout
/// when stderr is redirected.
#[must_use]
pub fn failure_message(stdout: &[u8], stderr: &str) -> String {
    if stderr.is_empty() {
        String::from_utf8_lossy(stdout).into_owned()
    } else {
        stderr.to_string()
    }
}

fn settle(
    status: io::Result<ExitStatus>,
    stdout: io::Result<Vec<u8>>,
    stderr: io::Result<Vec<u8>>,
) -> BufferedResult {
    let stdout = stdout.map_err(InvokeError::Io)?;
    let stderr = String::from_utf8_lossy(&stderr.map_err(InvokeError::Io)?).into_owned();
    let status = status.map_err(InvokeError::Io)?;

    if !status.success() {
        return Err(InvokeError::ProcessFailure {
            code: status.code(),
            message: failure_message(&stdout, &stderr),
        });
    }

    Ok(GpgOutput { stdout, stderr })
}
