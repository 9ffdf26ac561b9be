//! The subscriber contract and its terminal guard.
//!
//! A subscriber moves through `Unsubscribed → Active → Terminal`.
//! The engine never hands a raw subscriber its signals directly;
//! every delivery goes through [`SafeSubscriber`], which enforces
//! the ordering rules:
//!
//! * `on_subscribe` is delivered once, before anything else.
//! * `on_next` is only delivered while active, and not after an item
//!   flagged `is_complete`.
//! * exactly one of `on_complete` / `on_error` is delivered, and
//!   nothing follows it.
//!
//! Violations are logged and dropped rather than forwarded.

use std::sync::Arc;

use tracing::warn;

use crate::error::RSocketError;
use crate::payload::Payload;
use crate::reactive::subscription::Subscription;

/// Consumer side of a stream.  Callbacks are synchronous and must
/// not block; they run on the task that drives the stream.
pub trait Subscriber: Send {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>);

    /// Deliver one item.  `is_complete` marks the last item of the
    /// stream; `on_complete` follows immediately.
    fn on_next(&mut self, payload: Payload, is_complete: bool);

    fn on_error(&mut self, error: RSocketError);

    fn on_complete(&mut self);
}

/// Lifecycle of a guarded subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Unsubscribed,
    Active,
    /// The last item has been delivered; only a terminal signal may
    /// follow.
    Completing,
    Terminated,
}

/// Wraps a subscriber and drops every signal that would break the
/// reactive‑streams ordering rules.
pub struct SafeSubscriber {
    inner: Box<dyn Subscriber>,
    state: SubscriberState,
}

impl SafeSubscriber {
    pub fn new(inner: Box<dyn Subscriber>) -> Self {
        Self {
            inner,
            state: SubscriberState::Unsubscribed,
        }
    }

    pub fn state(&self) -> SubscriberState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == SubscriberState::Terminated
    }

    pub fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        if self.state != SubscriberState::Unsubscribed {
            warn!("duplicate on_subscribe; cancelling the new subscription");
            subscription.cancel();
            return;
        }
        self.state = SubscriberState::Active;
        self.inner.on_subscribe(subscription);
    }

    pub fn on_next(&mut self, payload: Payload, is_complete: bool) {
        if self.state != SubscriberState::Active {
            warn!(state = ?self.state, "on_next outside the active state dropped");
            return;
        }
        if is_complete {
            self.state = SubscriberState::Completing;
        }
        self.inner.on_next(payload, is_complete);
    }

    pub fn on_error(&mut self, error: RSocketError) {
        if !self.begin_terminal("on_error") {
            return;
        }
        self.inner.on_error(error);
    }

    pub fn on_complete(&mut self) {
        if !self.begin_terminal("on_complete") {
            return;
        }
        self.inner.on_complete();
    }

    fn begin_terminal(&mut self, signal: &str) -> bool {
        match self.state {
            SubscriberState::Active | SubscriberState::Completing => {
                self.state = SubscriberState::Terminated;
                true
            }
            state => {
                warn!(?state, signal, "terminal signal dropped");
                false
            }
        }
    }
}
