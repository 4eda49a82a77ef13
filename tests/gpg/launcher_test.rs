//! Tests for gpg process launching.

use std::path::PathBuf;

use gpg_shim::gpg::{ProcessLauncher, SpawnError};
use tokio::io::AsyncReadExt;

use super::{missing_binary, stub};

#[test]
fn default_launcher_targets_gpg_in_batch_mode() {
    let launcher = ProcessLauncher::new();
    assert_eq!(launcher.binary(), "gpg");
    assert_eq!(
        launcher.build_args(&["--decrypt"]),
        vec!["--batch", "--decrypt"]
    );
}

#[test]
fn global_args_precede_call_args() {
    let launcher = ProcessLauncher::with_binary("gpg2").global_args(["--batch", "--no-tty"]);
    assert_eq!(
        launcher.build_args(&["--armor", "--encrypt"]),
        vec!["--batch", "--no-tty", "--armor", "--encrypt"]
    );
}

#[test]
fn launcher_is_clone() {
    let launcher = ProcessLauncher::new().working_dir("/tmp");
    let cloned = launcher.clone();
    assert_eq!(launcher.build_args(&["-k"]), cloned.build_args(&["-k"]));
    assert_eq!(cloned.get_working_dir(), Some(&PathBuf::from("/tmp")));
}

#[tokio::test]
async fn spawn_passes_full_argv() {
    let launcher = stub(r#"printf '%s\n' "$@""#);
    let mut process = launcher.spawn(&["--list-keys"]).unwrap();
    assert!(process.id().is_some());

    let mut stdout = process.take_stdout().unwrap();
    let mut output = String::new();
    stdout.read_to_string(&mut output).await.unwrap();

    assert!(process.wait().await.unwrap().success());
    assert_eq!(output, "--batch\n--list-keys\n");
}

#[tokio::test]
async fn handles_can_be_taken_once() {
    let mut process = stub("exit 0").spawn::<&str>(&[]).unwrap();

    assert!(process.take_stdin().is_some());
    assert!(process.take_stdin().is_none());
    assert!(process.take_stdout().is_some());
    assert!(process.take_stdout().is_none());
    assert!(process.take_stderr().is_some());
    assert!(process.take_stderr().is_none());

    process.wait().await.unwrap();
}

#[test]
fn spawn_missing_binary_is_not_found() {
    let result = missing_binary().spawn(&["--version"]);
    assert!(matches!(result, Err(SpawnError::NotFound)));
}

#[test]
fn launch_routes_spawn_error_to_handler() {
    let mut seen = None;
    let process = missing_binary().launch(&["--version"], |e| seen = Some(e));

    assert!(process.is_none());
    assert!(matches!(seen, Some(SpawnError::NotFound)));
}

#[tokio::test]
async fn launch_success_skips_handler() {
    let mut called = false;
    let process = stub("exit 0").launch::<&str, _>(&[], |_| called = true);

    assert!(process.is_some());
    assert!(!called);
    process.unwrap().wait().await.unwrap();
}

#[tokio::test]
async fn spawn_applies_working_dir() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let temp_path = temp_dir.path().canonicalize().unwrap();

    let launcher = stub("pwd").working_dir(&temp_path);
    let mut process = launcher.spawn::<&str>(&[]).unwrap();

    let mut output = String::new();
    process
        .take_stdout()
        .unwrap()
        .read_to_string(&mut output)
        .await
        .unwrap();
    process.wait().await.unwrap();

    assert_eq!(output.trim(), temp_path.to_str().unwrap());
}
