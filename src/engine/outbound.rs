//! Outbound leg: a local publisher drained to the peer.
//!
//! The leg subscribes a [`FrameSender`] to the local publisher and
//! turns the peer's `REQUEST_N` and `CANCEL` frames into calls on the
//! publisher's subscription.  Requests that arrive before the
//! publisher has called `on_subscribe` are held and replayed.  The
//! leg keeps its own credit count so a publisher that overruns the
//! peer's demand is stopped with an error rather than flooding it.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::engine::link::Link;
use crate::error::RSocketError;
use crate::payload::Payload;
use crate::protocol::frame::Frame;
use crate::reactive::publisher::Publisher;
use crate::reactive::subscriber::Subscriber;
use crate::reactive::subscription::{Credit, Subscription};

#[derive(Default)]
struct OutboundState {
    subscription: Option<Arc<dyn Subscription>>,
    credit: Credit,
    pending_request: u64,
    finished: bool,
}

pub(crate) struct OutboundLeg {
    stream_id: u32,
    link: Link,
    state: Mutex<OutboundState>,
}

impl OutboundLeg {
    pub fn new(stream_id: u32, link: Link) -> Arc<Self> {
        Arc::new(Self {
            stream_id,
            link,
            state: Mutex::new(OutboundState::default()),
        })
    }

    /// Subscribe to the local publisher.  Its items are written to the
    /// peer as they are produced.
    pub fn attach(self: &Arc<Self>, publisher: Box<dyn Publisher>) {
        publisher.subscribe(Box::new(FrameSender { leg: self.clone() }));
    }

    /// Credit granted by the peer.
    pub fn request(&self, n: u64) {
        if n == 0 {
            return;
        }
        let target = {
            let mut state = self.lock();
            if state.finished || !state.credit.grant(n) {
                return;
            }
            match &state.subscription {
                Some(subscription) => Some(subscription.clone()),
                None => {
                    state.pending_request = state.pending_request.saturating_add(n);
                    None
                }
            }
        };
        if let Some(subscription) = target {
            subscription.request(n);
        }
    }

    /// The peer is no longer interested.  Silent: nothing is sent back.
    pub fn cancel(&self) {
        let Some(subscription) = self.mark_finished() else {
            return;
        };
        debug!(stream_id = self.stream_id, "outbound leg cancelled");
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }

    /// Stop the publisher and report `err` to the peer.
    pub fn fail(&self, err: RSocketError) {
        let Some(subscription) = self.mark_finished() else {
            return;
        };
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
        self.abort_stream(err);
    }

    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        let pending = {
            let mut state = self.lock();
            if state.finished {
                None
            } else {
                state.subscription = Some(subscription.clone());
                Some(std::mem::take(&mut state.pending_request))
            }
        };
        match pending {
            None => subscription.cancel(),
            Some(0) => {}
            Some(n) => subscription.request(n),
        }
    }

    fn emit(&self, payload: Payload, is_complete: bool) {
        let consumed = {
            let mut state = self.lock();
            if state.finished {
                return;
            }
            state.credit.consume()
        };
        if let Err(err) = consumed {
            warn!(stream_id = self.stream_id, "local publisher overran peer demand");
            self.fail(err);
            return;
        }
        if is_complete && self.mark_finished().is_none() {
            return;
        }
        self.link
            .send(Frame::payload(self.stream_id, Some(&payload), is_complete));
    }

    fn finish_complete(&self) {
        if self.mark_finished().is_some() {
            self.link.send(Frame::payload(self.stream_id, None, true));
        }
    }

    fn finish_error(&self, err: RSocketError) {
        if self.mark_finished().is_some() {
            self.abort_stream(err);
        }
    }

    /// An `ERROR` frame ends the whole stream, so the local inbound
    /// leg of the same channel goes down as well.
    fn abort_stream(&self, err: RSocketError) {
        let message = err.to_string();
        self.link.send(Frame::error(self.stream_id, &err));
        if let Some(inbound) = self.link.streams.inbound(self.stream_id) {
            inbound.fail(RSocketError::Aborted(message));
        }
    }

    /// Flip to finished and release the table entry.  Returns `None`
    /// if the leg had already finished, otherwise the subscription it
    /// held (if the publisher had subscribed yet).
    fn mark_finished(&self) -> Option<Option<Arc<dyn Subscription>>> {
        let subscription = {
            let mut state = self.lock();
            if state.finished {
                return None;
            }
            state.finished = true;
            state.credit.cancel();
            state.subscription.take()
        };
        self.link.streams.release_outbound(self.stream_id);
        Some(subscription)
    }

    fn lock(&self) -> MutexGuard<'_, OutboundState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Subscriber that writes a local publisher's signals to the peer.
struct FrameSender {
    leg: Arc<OutboundLeg>,
}

impl Subscriber for FrameSender {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        self.leg.on_subscribe(subscription);
    }

    fn on_next(&mut self, payload: Payload, is_complete: bool) {
        self.leg.emit(payload, is_complete);
    }

    fn on_error(&mut self, err: RSocketError) {
        self.leg.finish_error(err);
    }

    fn on_complete(&mut self) {
        self.leg.finish_complete();
    }
}
