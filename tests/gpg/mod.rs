//! gpg module tests.
//!
//! The external tool is replaced by `sh -c` scripts so no gpg install is
//! needed. The script sees `--batch` as `$1`, then the invocation arguments.

#![cfg(unix)]

mod guard_test;
mod launcher_test;

use gpg_shim::gpg::ProcessLauncher;

/// A launcher that runs `script` in place of gpg.
pub fn stub(script: &str) -> ProcessLauncher {
    ProcessLauncher::with_binary("sh").global_args(["-c", script, "gpg-stub", "--batch"])
}

/// A launcher whose binary does not exist.
pub fn missing_binary() -> ProcessLauncher {
    ProcessLauncher::with_binary("/nonexistent/gpg-shim-test-binary")
}

/// Verify all public gpg types are exported from the library.
#[test]
fn test_all_gpg_types_exported() {
    use gpg_shim::gpg::{
        assemble_args, BufferedInvoker, CompletionGuard, Dest, GpgOutput, InvokeError,
        RejectKind, RejectMatcher, RejectPattern, Source, SpawnError, StreamOutcome,
        StreamingInvoker, StreamingRequest, GLOBAL_ARGS, GPG_BINARY, STREAM_SUCCESS_MESSAGE,
    };

    let _ = BufferedInvoker::default();
    let _ = StreamingInvoker::default();
    let _ = StreamingRequest::new()
        .source(Source::path("in"))
        .dest(Dest::path("out"));
    let _ = CompletionGuard::wrap(|_: ()| {});
    let _ = RejectMatcher::new(vec![RejectPattern::new("x", RejectKind::NoSecretKey)]);
    let _ = GpgOutput::default();
    let _ = StreamOutcome::default();
    let _: fn() -> InvokeError = || InvokeError::Spawn(SpawnError::NotFound);

    assert_eq!(GPG_BINARY, "gpg");
    assert_eq!(GLOBAL_ARGS, &["--batch"]);
    assert!(!STREAM_SUCCESS_MESSAGE.is_empty());
    assert_eq!(assemble_args(&["a"], &["b"]), vec!["a", "b"]);
}
