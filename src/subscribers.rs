//! Reference subscriber implementations.
//!
//! * [`ChannelSubscriber`] records every inbound value and sets its
//!   latch when the stream ends.  Errors are logged and absorbed into
//!   the latch; callers learn about termination, not about the cause.
//! * [`StreamSubscriber`] keeps a steady pipeline of credit by
//!   requesting `r` more items after every `r` items it consumes,
//!   and keeps the error so the orchestrator can raise it.
//!
//! Both write what they see into a [`Recorder`] that the caller can
//! keep a handle to after the subscriber has been moved into a
//! stream.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{error, info};

use crate::error::RSocketError;
use crate::payload::Payload;
use crate::reactive::latch::CompletionLatch;
use crate::reactive::subscriber::Subscriber;
use crate::reactive::subscription::Subscription;

/// One observed signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Next(Vec<u8>, bool),
    /// The subscriber itself issued `request(n)`.
    Requested(u64),
    Error(String),
    Complete,
}

#[derive(Default)]
struct Recorded {
    events: Vec<Event>,
    payloads: Vec<Payload>,
    error: Option<RSocketError>,
}

/// Shared log of what a subscriber observed.
#[derive(Clone, Default)]
pub struct Recorder {
    inner: Arc<Mutex<Recorded>>,
}

impl Recorder {
    pub fn push(&self, event: Event) {
        self.lock().events.push(event);
    }

    /// Record a received item, keeping the whole payload alongside
    /// the event.
    pub fn record_next(&self, payload: Payload, is_complete: bool) {
        let mut recorded = self.lock();
        recorded
            .events
            .push(Event::Next(payload.data().to_vec(), is_complete));
        recorded.payloads.push(payload);
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    /// Data of every received item, in arrival order.
    pub fn values(&self) -> Vec<Vec<u8>> {
        self.lock()
            .events
            .iter()
            .filter_map(|event| match event {
                Event::Next(data, _) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every received item with its metadata, in arrival order.
    pub fn payloads(&self) -> Vec<Payload> {
        self.lock().payloads.clone()
    }

    pub fn requests_issued(&self) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|event| matches!(event, Event::Requested(_)))
            .count()
    }

    fn record_error(&self, error: RSocketError) {
        let mut recorded = self.lock();
        recorded.events.push(Event::Error(error.to_string()));
        recorded.error = Some(error);
    }

    /// Take the captured error, if the stream failed.
    pub fn take_error(&self) -> Option<RSocketError> {
        self.lock().error.take()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Inbound side of a channel interaction.
pub struct ChannelSubscriber {
    complete: CompletionLatch,
    recorder: Recorder,
    request_on_subscribe: u64,
    subscription: Option<Arc<dyn Subscription>>,
}

impl ChannelSubscriber {
    pub fn new(complete: CompletionLatch) -> Self {
        Self::with_recorder(complete, Recorder::default())
    }

    /// Record into an existing recorder, e.g. one shared by several
    /// channels.
    pub fn with_recorder(complete: CompletionLatch, recorder: Recorder) -> Self {
        Self {
            complete,
            recorder,
            request_on_subscribe: 0,
            subscription: None,
        }
    }

    /// Grant `n` items as soon as the subscription arrives.  Needed
    /// where no [`Subscribable`](crate::reactive::Subscribable) issues
    /// the first request, as on the responder side of a channel.
    pub fn requesting(mut self, n: u64) -> Self {
        self.request_on_subscribe = n;
        self
    }

    pub fn recorder(&self) -> Recorder {
        self.recorder.clone()
    }

    /// The latch this subscriber sets on termination.
    pub fn latch(&self) -> CompletionLatch {
        self.complete.clone()
    }
}

impl Subscriber for ChannelSubscriber {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        if self.request_on_subscribe > 0 {
            subscription.request(self.request_on_subscribe);
        }
        self.subscription = Some(subscription);
    }

    fn on_next(&mut self, payload: Payload, is_complete: bool) {
        info!("from peer on channel: {}", payload.data_utf8());
        self.recorder.record_next(payload, is_complete);
        if is_complete {
            self.complete.set();
        }
    }

    fn on_error(&mut self, err: RSocketError) {
        error!("error from peer on channel: {}", err);
        self.recorder.push(Event::Error(err.to_string()));
        self.complete.set();
    }

    fn on_complete(&mut self) {
        info!("channel completed by peer");
        self.recorder.push(Event::Complete);
        self.complete.set();
    }
}

/// Request‑stream consumer with batch replenishment.
pub struct StreamSubscriber {
    complete: CompletionLatch,
    request_n_size: u64,
    consumed_since_request: u64,
    finished: bool,
    recorder: Recorder,
    subscription: Option<Arc<dyn Subscription>>,
}

impl StreamSubscriber {
    /// `request_n_size` of zero disables replenishment; the stream
    /// then only receives what the initial request allows.
    pub fn new(complete: CompletionLatch, request_n_size: u64) -> Self {
        Self {
            complete,
            request_n_size,
            consumed_since_request: 0,
            finished: false,
            recorder: Recorder::default(),
            subscription: None,
        }
    }

    pub fn recorder(&self) -> Recorder {
        self.recorder.clone()
    }

    pub fn latch(&self) -> CompletionLatch {
        self.complete.clone()
    }

    fn finish(&mut self) {
        self.finished = true;
        self.subscription = None;
        self.complete.set();
    }
}

impl Subscriber for StreamSubscriber {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        self.subscription = Some(subscription);
    }

    fn on_next(&mut self, payload: Payload, is_complete: bool) {
        info!("stream item: {}", payload.data_utf8());
        self.recorder.record_next(payload, is_complete);
        if is_complete {
            self.finish();
            return;
        }
        if self.finished || self.request_n_size == 0 {
            return;
        }
        self.consumed_since_request += 1;
        if self.consumed_since_request >= self.request_n_size {
            self.consumed_since_request = 0;
            if let Some(subscription) = &self.subscription {
                self.recorder.push(Event::Requested(self.request_n_size));
                subscription.request(self.request_n_size);
            }
        }
    }

    fn on_error(&mut self, err: RSocketError) {
        info!("stream error: {}", err);
        self.recorder.record_error(err);
        self.finish();
    }

    fn on_complete(&mut self) {
        info!("stream complete");
        self.recorder.push(Event::Complete);
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct Counting {
        requested: AtomicU64,
        calls: AtomicU64,
    }

    impl Subscription for Counting {
        fn request(&self, n: u64) {
            self.requested.fetch_add(n, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
        fn cancel(&self) {}
    }

    #[test]
    fn channel_subscriber_absorbs_errors_into_latch() {
        let latch = CompletionLatch::new();
        let mut subscriber = ChannelSubscriber::new(latch.clone());
        let recorder = subscriber.recorder();
        subscriber.on_subscribe(Arc::new(Counting::default()));
        subscriber.on_next(Payload::from("a"), false);
        assert!(!latch.is_set());
        subscriber.on_error(RSocketError::Remote("gone".into()));

        assert!(latch.is_set());
        assert_eq!(recorder.values(), vec![b"a".to_vec()]);
        // The error is logged, not kept for re‑raising.
        assert!(recorder.take_error().is_none());
    }

    #[test]
    fn recorder_keeps_item_metadata() {
        let mut subscriber = StreamSubscriber::new(CompletionLatch::new(), 0);
        let recorder = subscriber.recorder();
        subscriber.on_next(Payload::new(b"d".to_vec(), Some(b"meta".to_vec())), false);
        subscriber.on_next(Payload::from("bare"), true);

        let payloads = recorder.payloads();
        assert_eq!(payloads[0].metadata(), Some(&b"meta"[..]));
        assert_eq!(payloads[1].metadata(), None);
        assert_eq!(recorder.values(), vec![b"d".to_vec(), b"bare".to_vec()]);
    }

    #[test]
    fn channel_subscriber_can_request_on_subscribe() {
        let counting = Arc::new(Counting::default());
        let mut subscriber = ChannelSubscriber::new(CompletionLatch::new()).requesting(4);
        subscriber.on_subscribe(counting.clone());
        assert_eq!(counting.requested.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn channel_subscriber_sets_latch_on_last_item() {
        let latch = CompletionLatch::new();
        let mut subscriber = ChannelSubscriber::new(latch.clone());
        subscriber.on_next(Payload::from("only"), true);
        assert!(latch.is_set());
        assert_eq!(subscriber.recorder().values(), vec![b"only".to_vec()]);
    }

    #[test]
    fn stream_subscriber_replenishes_per_batch() {
        let latch = CompletionLatch::new();
        let counting = Arc::new(Counting::default());
        let mut subscriber = StreamSubscriber::new(latch.clone(), 3);
        subscriber.on_subscribe(counting.clone());
        for i in 0..7 {
            subscriber.on_next(Payload::from(i.to_string()), false);
        }
        assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
        assert_eq!(counting.requested.load(Ordering::SeqCst), 6);
        assert!(!latch.is_set());
    }

    #[test]
    fn stream_subscriber_never_requests_after_termination() {
        let latch = CompletionLatch::new();
        let counting = Arc::new(Counting::default());
        let mut subscriber = StreamSubscriber::new(latch.clone(), 1);
        let recorder = subscriber.recorder();
        subscriber.on_subscribe(counting.clone());
        subscriber.on_error(RSocketError::Remote("denied".into()));
        subscriber.on_next(Payload::from("late"), false);

        assert!(latch.is_set());
        assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(recorder.take_error(), Some(RSocketError::Remote(_))));
    }
}
