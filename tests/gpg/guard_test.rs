//! Tests for single-fire completion.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use gpg_shim::gpg::CompletionGuard;

#[tokio::test]
async fn concurrent_completions_fire_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let guard = CompletionGuard::wrap(move |_: usize| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let guard = guard.clone();
            tokio::spawn(async move { guard.complete(i) })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(guard.is_settled());
}

#[tokio::test]
async fn error_then_data_keeps_error() {
    let (guard, rx) = CompletionGuard::<Result<&str, &str>>::channel();

    let spawn_error = guard.clone();
    let close = guard.clone();
    spawn_error.complete(Err("spawn failed"));
    close.complete(Ok("late data"));

    assert_eq!(rx.await.unwrap(), Err("spawn failed"));
}

#[test]
fn debug_reports_settled_state() {
    let guard = CompletionGuard::wrap(|_: ()| {});
    assert!(format!("{guard:?}").contains("settled: false"));
    guard.complete(());
    assert!(format!("{guard:?}").contains("settled: true"));
}
