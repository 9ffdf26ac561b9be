//! Subscriptions and credit bookkeeping.
//!
//! A [`Subscription`] is the flow‑control handle a publisher hands
//! to its subscriber.  The subscriber calls
//! [`request`](Subscription::request) to grant credit for more items
//! and [`cancel`](Subscription::cancel) to withdraw interest.
//!
//! [`Credit`] is the counter behind every subscription in the
//! engine.  It is only ever raised by a grant and lowered by one per
//! delivered item; once cancelled it refuses both.  [`DemandSignal`]
//! wraps a credit counter with a wakeup so that an async producer can
//! sleep until credit arrives.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;
use tracing::warn;

use crate::error::{Result, RSocketError};

/// Flow‑control handle passed to [`Subscriber::on_subscribe`].
///
/// Both methods are synchronous and may be called from inside
/// subscriber callbacks.
///
/// [`Subscriber::on_subscribe`]: crate::reactive::Subscriber::on_subscribe
pub trait Subscription: Send + Sync {
    /// Grant credit for `n` more items.  Zero is ignored.
    fn request(&self, n: u64);

    /// Withdraw interest.  Idempotent; never raises an error to the
    /// subscriber.
    fn cancel(&self);
}

/// Outstanding credit for one subscription.
#[derive(Debug, Default, Clone)]
pub struct Credit {
    outstanding: u64,
    granted: u64,
    delivered: u64,
    cancelled: bool,
}

impl Credit {
    /// Credit with an initial grant already applied.
    pub fn with_initial(n: u64) -> Self {
        let mut credit = Self::default();
        credit.grant(n);
        credit
    }

    /// Add `n` units of credit.  Returns `false` and changes nothing
    /// when `n` is zero or the subscription is cancelled.  Grants
    /// saturate at `u64::MAX`, which is treated as unbounded.
    pub fn grant(&mut self, n: u64) -> bool {
        if n == 0 || self.cancelled {
            return false;
        }
        self.outstanding = self.outstanding.saturating_add(n);
        self.granted = self.granted.saturating_add(n);
        true
    }

    /// Consume one unit of credit for an item about to be delivered.
    pub fn consume(&mut self) -> Result<()> {
        if self.cancelled {
            return Err(RSocketError::Cancelled);
        }
        if self.outstanding == 0 {
            return Err(RSocketError::DemandViolation);
        }
        if self.outstanding != u64::MAX {
            self.outstanding -= 1;
        }
        self.delivered += 1;
        Ok(())
    }

    /// Mark as cancelled.  Returns `true` on the first call only.
    pub fn cancel(&mut self) -> bool {
        let first = !self.cancelled;
        self.cancelled = true;
        self.outstanding = 0;
        first
    }

    pub fn outstanding(&self) -> u64 {
        self.outstanding
    }

    /// Sum of every grant accepted so far.
    pub fn granted(&self) -> u64 {
        self.granted
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// A [`Credit`] counter shared between a subscriber (which grants)
/// and an async producer (which waits for credit and consumes it).
#[derive(Debug, Default)]
pub struct DemandSignal {
    credit: Mutex<Credit>,
    wake: Notify,
}

impl DemandSignal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wait until credit is available or the subscription is
    /// cancelled.  Returns `false` on cancellation.  Does not consume.
    pub async fn acquire(&self) -> bool {
        loop {
            {
                let credit = self.lock();
                if credit.is_cancelled() {
                    return false;
                }
                if credit.outstanding() > 0 {
                    return true;
                }
            }
            self.wake.notified().await;
        }
    }

    pub fn consume(&self) -> Result<()> {
        self.lock().consume()
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().is_cancelled()
    }

    /// Snapshot of the counter, mostly for diagnostics and tests.
    pub fn snapshot(&self) -> Credit {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Credit> {
        // Credit updates never panic midway, so a poisoned lock still
        // holds a consistent counter.
        self.credit.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Subscription for DemandSignal {
    fn request(&self, n: u64) {
        if n == 0 {
            warn!("request(0) ignored");
            return;
        }
        if self.lock().grant(n) {
            self.wake.notify_one();
        }
    }

    fn cancel(&self) {
        if self.lock().cancel() {
            self.wake.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn credit_never_goes_negative() {
        let mut credit = Credit::with_initial(2);
        assert!(credit.consume().is_ok());
        assert!(credit.consume().is_ok());
        assert!(matches!(
            credit.consume(),
            Err(RSocketError::DemandViolation)
        ));
        assert_eq!(credit.delivered(), 2);
        assert_eq!(credit.granted(), 2);
    }

    #[test]
    fn zero_grant_and_cancelled_grant_are_refused() {
        let mut credit = Credit::default();
        assert!(!credit.grant(0));
        assert!(credit.grant(3));
        assert!(credit.cancel());
        assert!(!credit.cancel());
        assert!(!credit.grant(1));
        assert!(matches!(credit.consume(), Err(RSocketError::Cancelled)));
    }

    #[test]
    fn saturated_credit_is_unbounded() {
        let mut credit = Credit::with_initial(u64::MAX);
        for _ in 0..10 {
            credit.consume().unwrap();
        }
        assert_eq!(credit.outstanding(), u64::MAX);
    }

    #[tokio::test]
    async fn acquire_waits_for_request() {
        let demand = DemandSignal::new();
        let waiter = {
            let demand = demand.clone();
            tokio::spawn(async move { demand.acquire().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        demand.request(1);
        let acquired = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(acquired);
    }

    #[tokio::test]
    async fn acquire_observes_cancel() {
        let demand = DemandSignal::new();
        demand.cancel();
        assert!(!demand.acquire().await);
        demand.cancel();
        assert!(demand.is_cancelled());
    }
}
