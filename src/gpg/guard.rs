//! Single-fire completion for invocations with several event sources.
//!
//! An invocation's stdin writer, stdout reader, stderr monitor and exit
//! watcher can all produce a result, in any order. Each holds a clone of the
//! same [`CompletionGuard`]; only the first `complete` reaches the callback.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

type Callback<T> = Box<dyn FnOnce(T) + Send>;

/// A callback that runs at most once, shared between event sources.
pub struct CompletionGuard<T> {
    slot: Arc<Mutex<Option<Callback<T>>>>,
}

impl<T: Send + 'static> CompletionGuard<T> {
    /// Wrap `callback` so that only the first completion is forwarded.
    #[must_use]
    pub fn wrap<F>(callback: F) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        Self {
            slot: Arc::new(Mutex::new(Some(Box::new(callback)))),
        }
    }

    /// Create a guard that settles into a oneshot receiver.
    #[must_use]
    pub fn channel() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let guard = Self::wrap(move |value| {
            // The receiver may be gone if the caller stopped waiting.
            let _ = tx.send(value);
        });
        (guard, rx)
    }

    /// Forward `value` to the callback if nothing has completed yet.
    ///
    /// Returns `true` if this call settled the guard. Later calls drop their
    /// value and return `false`.
    pub fn complete(&self, value: T) -> bool {
        let callback = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match callback {
            Some(callback) => {
                callback(value);
                true
            }
            None => false,
        }
    }

    /// Whether the guard has already fired.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl<T> Clone for CompletionGuard<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> fmt::Debug for CompletionGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let settled = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none();
        f.debug_struct("CompletionGuard")
            .field("settled", &settled)
            .finish()
    }
}
