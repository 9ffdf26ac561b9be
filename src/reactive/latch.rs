//! One‑shot completion latch.
//!
//! A latch starts unset, can be set exactly once and never resets.
//! Any number of tasks may wait on it; waiters registered before or
//! after the set all observe it.  Setting an already set latch is a
//! no‑op.  Interactions use latches so that a caller can await the
//! termination of a stream without polling.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::watch;

/// Single‑set, multi‑waiter boolean signal.  Cloning yields another
/// handle to the same latch.
#[derive(Clone, Debug)]
pub struct CompletionLatch {
    state: Arc<watch::Sender<bool>>,
}

impl CompletionLatch {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    /// Set the latch.  Returns `true` if this call performed the
    /// transition and `false` if the latch was already set.
    pub fn set(&self) -> bool {
        self.state.send_if_modified(|set| {
            if *set {
                false
            } else {
                *set = true;
                true
            }
        })
    }

    pub fn is_set(&self) -> bool {
        *self.state.borrow()
    }

    /// Suspend until the latch is set.  Returns immediately if it
    /// already is.
    pub async fn wait(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|set| *set).await;
    }

    /// Wait on several latches concurrently and return once every
    /// one of them has been set.
    pub async fn wait_all(latches: &[&CompletionLatch]) {
        join_all(latches.iter().map(|latch| latch.wait())).await;
    }
}

impl Default for CompletionLatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn set_is_idempotent() {
        let latch = CompletionLatch::new();
        assert!(!latch.is_set());
        assert!(latch.set());
        assert!(!latch.set());
        assert!(latch.is_set());
    }

    #[tokio::test]
    async fn waiters_before_and_after_set_wake() {
        let latch = CompletionLatch::new();
        let early = {
            let latch = latch.clone();
            tokio::spawn(async move { latch.wait().await })
        };
        tokio::task::yield_now().await;

        latch.set();
        tokio::time::timeout(Duration::from_secs(1), early)
            .await
            .expect("early waiter timed out")
            .expect("early waiter panicked");

        // A waiter that arrives after the set returns immediately.
        tokio::time::timeout(Duration::from_secs(1), latch.wait())
            .await
            .expect("late waiter timed out");
    }

    #[tokio::test]
    async fn wait_all_requires_every_latch() {
        let a = CompletionLatch::new();
        let b = CompletionLatch::new();
        a.set();

        let pending = tokio::time::timeout(
            Duration::from_millis(50),
            CompletionLatch::wait_all(&[&a, &b]),
        )
        .await;
        assert!(pending.is_err());

        b.set();
        tokio::time::timeout(Duration::from_secs(1), CompletionLatch::wait_all(&[&a, &b]))
            .await
            .expect("both latches were set");
    }
}
