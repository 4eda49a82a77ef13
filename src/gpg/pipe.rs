//! Shared helpers for moving bytes in and out of the child process.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinError;

/// Treat a closed child stdin as a normal end of input.
///
/// gpg may exit before consuming all input (for instance after rejecting a
/// passphrase); its exit status and stderr decide the outcome, not the
/// write failure.
pub(crate) fn ignore_broken_pipe(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            tracing::debug!("gpg closed stdin before all input was written");
            Ok(())
        }
        other => other,
    }
}

/// Write `input` into the child's stdin and close it.
pub(crate) async fn write_and_close<W>(stdin: Option<W>, input: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    let result = async {
        stdin.write_all(input).await?;
        stdin.shutdown().await
    }
    .await;
    ignore_broken_pipe(result)
}

/// Read a pipe to its end. A missing pipe reads as empty.
pub(crate) async fn read_all<R>(reader: Option<R>) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Flatten a join result from a pipe task into an I/O result.
pub(crate) fn joined<T>(result: Result<io::Result<T>, JoinError>) -> io::Result<T> {
    result.map_err(io::Error::other)?
}
