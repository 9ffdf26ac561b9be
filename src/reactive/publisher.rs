//! Publishers and the initial‑demand wrapper.
//!
//! A [`Publisher`] is a one‑shot producer: subscribing consumes it.
//! [`Subscribable`] pairs a publisher with an initial request so a
//! caller can write `requested.initial_request_n(5).subscribe(sub)`
//! and have the first grant issued as soon as the subscription
//! exists.

use std::sync::Arc;

use crate::error::RSocketError;
use crate::payload::Payload;
use crate::reactive::subscriber::Subscriber;
use crate::reactive::subscription::Subscription;

/// Largest request‑n a peer may send in a single grant (2³¹ − 1).
/// Also the default initial request, which amounts to "unbounded".
pub const MAX_REQUEST_N: u64 = 0x7fff_ffff;

/// Producer side of a stream.  The publisher must call
/// `on_subscribe` before any other signal and must not deliver more
/// items than the subscriber has requested.
pub trait Publisher: Send {
    fn subscribe(self: Box<Self>, subscriber: Box<dyn Subscriber>);
}

/// A publisher waiting for a subscriber, with the demand to grant
/// once it arrives.
pub struct Subscribable {
    publisher: Box<dyn Publisher>,
    initial_request_n: u64,
}

impl Subscribable {
    pub fn new(publisher: Box<dyn Publisher>) -> Self {
        Self {
            publisher,
            initial_request_n: MAX_REQUEST_N,
        }
    }

    /// Credit granted right after `on_subscribe`.  Zero means the
    /// subscriber drives all demand itself.
    pub fn initial_request_n(mut self, n: u64) -> Self {
        self.initial_request_n = n;
        self
    }

    pub fn subscribe<S: Subscriber + 'static>(self, subscriber: S) {
        self.subscribe_boxed(Box::new(subscriber));
    }

    pub fn subscribe_boxed(self, subscriber: Box<dyn Subscriber>) {
        self.publisher.subscribe(Box::new(InitialDemand {
            inner: subscriber,
            initial: self.initial_request_n,
        }));
    }
}

/// Forwards every signal and issues the initial request after the
/// wrapped subscriber has seen its subscription.
struct InitialDemand {
    inner: Box<dyn Subscriber>,
    initial: u64,
}

impl Subscriber for InitialDemand {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        self.inner.on_subscribe(subscription.clone());
        if self.initial > 0 {
            subscription.request(self.initial);
        }
    }

    fn on_next(&mut self, payload: Payload, is_complete: bool) {
        self.inner.on_next(payload, is_complete);
    }

    fn on_error(&mut self, error: RSocketError) {
        self.inner.on_error(error);
    }

    fn on_complete(&mut self) {
        self.inner.on_complete();
    }
}
