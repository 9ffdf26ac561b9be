//! Inbound leg: remote items flowing into a local subscriber.
//!
//! The leg owns the local subscriber (behind a [`SafeSubscriber`]
//! guard) and the credit it has granted.  Grants made while the
//! subscriber is still inside `on_subscribe` are collected and sent
//! with the request frame.  Grants made before that frame is queued
//! are held back so no `REQUEST_N` overtakes it; later grants go out
//! as `REQUEST_N` frames.  A `PAYLOAD` that arrives without credit is a demand
//! violation: the subscriber gets an error and the peer a `CANCEL`.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, warn};

use crate::engine::link::Link;
use crate::error::RSocketError;
use crate::payload::Payload;
use crate::protocol::frame::Frame;
use crate::reactive::publisher::MAX_REQUEST_N;
use crate::reactive::subscriber::{SafeSubscriber, Subscriber};
use crate::reactive::subscription::{Credit, Subscription};

#[derive(Default)]
struct InboundState {
    credit: Credit,
    started: bool,
    pending_request: u64,
    finished: bool,
}

pub(crate) struct InboundLeg {
    stream_id: u32,
    link: Link,
    subscriber: Mutex<SafeSubscriber>,
    state: Mutex<InboundState>,
}

impl InboundLeg {
    pub fn new(stream_id: u32, link: Link, subscriber: Box<dyn Subscriber>) -> Arc<Self> {
        Arc::new(Self {
            stream_id,
            link,
            subscriber: Mutex::new(SafeSubscriber::new(subscriber)),
            state: Mutex::new(InboundState::default()),
        })
    }

    /// Leg with credit granted up front and no frame traffic for it,
    /// as used by request‑response.
    pub fn with_credit(
        stream_id: u32,
        link: Link,
        subscriber: Box<dyn Subscriber>,
        credit: u64,
    ) -> Arc<Self> {
        let leg = Self::new(stream_id, link, subscriber);
        leg.lock_state().credit = Credit::with_initial(credit);
        leg
    }

    /// Deliver `on_subscribe`.  Returns the credit requested during
    /// the callback, or `None` if the subscriber cancelled right away.
    /// Grants made after this returns are held until [`start`](Self::start).
    pub fn subscribe(self: &Arc<Self>) -> Option<u64> {
        let handle: Arc<dyn Subscription> = Arc::new(InboundHandle(Arc::downgrade(self)));
        self.lock_subscriber().on_subscribe(handle);
        let mut state = self.lock_state();
        if state.finished {
            return None;
        }
        Some(std::mem::take(&mut state.pending_request))
    }

    /// Mark the stream as known to the peer.  Call once the frame that
    /// opens it has been queued.  Credit granted since `subscribe`
    /// goes out as one `REQUEST_N`; a cancel in the same window goes
    /// out as `CANCEL`.
    pub fn start(&self) {
        let (pending, finished) = {
            let mut state = self.lock_state();
            if state.started {
                return;
            }
            state.started = true;
            (std::mem::take(&mut state.pending_request), state.finished)
        };
        if finished {
            self.link.send(Frame::cancel(self.stream_id));
            self.link.streams.release_inbound(self.stream_id);
        } else if pending > 0 {
            self.link
                .send(Frame::request_n(self.stream_id, pending.min(MAX_REQUEST_N)));
        }
    }

    /// Deliver one remote item.
    pub fn deliver_next(&self, payload: Payload, is_complete: bool) {
        {
            let mut state = self.lock_state();
            if state.finished {
                return;
            }
            if let Err(err) = state.credit.consume() {
                drop(state);
                warn!(stream_id = self.stream_id, "peer sent an item without credit");
                self.link.send(Frame::cancel(self.stream_id));
                self.terminate(|subscriber| subscriber.on_error(err));
                return;
            }
        }
        self.lock_subscriber().on_next(payload, is_complete);
        if is_complete {
            self.complete();
        }
    }

    pub fn complete(&self) {
        self.terminate(|subscriber| subscriber.on_complete());
    }

    pub fn fail(&self, err: RSocketError) {
        self.terminate(|subscriber| subscriber.on_error(err));
    }

    fn terminate(&self, signal: impl FnOnce(&mut SafeSubscriber)) {
        {
            let mut state = self.lock_state();
            if state.finished {
                return;
            }
            state.finished = true;
        }
        self.link.streams.release_inbound(self.stream_id);
        signal(&mut self.lock_subscriber());
        debug!(stream_id = self.stream_id, "inbound leg terminated");
    }

    fn request(&self, n: u64) {
        if n == 0 {
            warn!(stream_id = self.stream_id, "request(0) ignored");
            return;
        }
        let send = {
            let mut state = self.lock_state();
            if state.finished || !state.credit.grant(n) {
                return;
            }
            if !state.started {
                state.pending_request = state.pending_request.saturating_add(n);
            }
            state.started
        };
        if send {
            self.link
                .send(Frame::request_n(self.stream_id, n.min(MAX_REQUEST_N)));
        }
    }

    fn cancel(&self) {
        let started = {
            let mut state = self.lock_state();
            if state.finished {
                return;
            }
            state.finished = true;
            state.credit.cancel();
            state.started
        };
        debug!(stream_id = self.stream_id, "inbound leg cancelled by subscriber");
        if started {
            self.link.send(Frame::cancel(self.stream_id));
        }
        self.link.streams.release_inbound(self.stream_id);
    }

    fn lock_state(&self) -> MutexGuard<'_, InboundState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_subscriber(&self) -> MutexGuard<'_, SafeSubscriber> {
        self.subscriber
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// The subscription handed to the local subscriber.  Holds the leg
/// weakly so a subscriber that keeps its subscription around does not
/// keep a finished stream alive.
struct InboundHandle(Weak<InboundLeg>);

impl Subscription for InboundHandle {
    fn request(&self, n: u64) {
        if let Some(leg) = self.0.upgrade() {
            leg.request(n);
        }
    }

    fn cancel(&self) {
        if let Some(leg) = self.0.upgrade() {
            leg.cancel();
        }
    }
}
