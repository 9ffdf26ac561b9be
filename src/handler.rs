//! Responder side request handling.
//!
//! Every endpoint owns a [`RequestHandler`] that answers the
//! interactions its peer starts.  Handlers are called from the
//! connection's reader task and must not block: request‑response
//! returns a future, streams and channels return publishers that the
//! engine drives under the peer's demand.
//!
//! The default methods refuse the interaction, so a handler only
//! implements the shapes it supports.  [`DemoResponder`] is a small
//! but complete responder used by the demo binary and the loopback
//! tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::stream::{self, StreamExt};
use tracing::info;

use crate::error::{Result, RSocketError};
use crate::payload::Payload;
use crate::reactive::generator::StreamFromGenerator;
use crate::reactive::latch::CompletionLatch;
use crate::reactive::publisher::Publisher;
use crate::reactive::subscriber::Subscriber;
use crate::subscribers::{ChannelSubscriber, Recorder};

/// What a responder hands back for a request‑channel: the publisher
/// feeding the peer and, optionally, the subscriber consuming the
/// peer's items.  Without a subscriber the peer's direction is
/// cancelled straight away.
pub type ChannelResponse = (Box<dyn Publisher>, Option<Box<dyn Subscriber>>);

pub trait RequestHandler: Send + Sync {
    fn request_response(&self, _payload: Payload) -> BoxFuture<'static, Result<Payload>> {
        future::ready(Err(RSocketError::Rejected(
            "request-response not supported".into(),
        )))
        .boxed()
    }

    /// Fire‑and‑forget has no reply and no error path.
    fn fire_and_forget(&self, payload: Payload) {
        info!(len = payload.data().len(), "fire-and-forget ignored");
    }

    fn request_stream(&self, _payload: Payload) -> Result<Box<dyn Publisher>> {
        Err(RSocketError::Rejected("request-stream not supported".into()))
    }

    fn request_channel(&self, _payload: Payload) -> Result<ChannelResponse> {
        Err(RSocketError::Rejected("request-channel not supported".into()))
    }
}

/// Refuses every interaction.  The usual handler for a pure client.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHandler;

impl RequestHandler for DefaultHandler {}

/// Demonstration responder.
///
/// * request‑response echoes the request data back;
/// * fire‑and‑forget counts the requests it sees;
/// * request‑stream emits `Item on stream: i` for `stream_items` items;
/// * request‑channel emits `Item on channel: i` for `channel_items`
///   items and records what the requester sends, requesting
///   `channel_request_n` items up front.
#[derive(Clone)]
pub struct DemoResponder {
    stream_items: usize,
    channel_items: usize,
    channel_request_n: u64,
    received: Recorder,
    received_done: CompletionLatch,
    fire_and_forget_count: Arc<AtomicUsize>,
}

impl DemoResponder {
    pub fn new(stream_items: usize, channel_items: usize) -> Self {
        Self {
            stream_items,
            channel_items,
            channel_request_n: 5,
            received: Recorder::default(),
            received_done: CompletionLatch::new(),
            fire_and_forget_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_channel_request_n(mut self, n: u64) -> Self {
        self.channel_request_n = n;
        self
    }

    /// Everything the responder received on channels, in order.
    pub fn received(&self) -> Recorder {
        self.received.clone()
    }

    /// Set when the requester's side of the last channel terminated.
    pub fn received_done(&self) -> CompletionLatch {
        self.received_done.clone()
    }

    pub fn fire_and_forget_count(&self) -> usize {
        self.fire_and_forget_count.load(Ordering::SeqCst)
    }

    fn items(prefix: &'static str, count: usize) -> StreamFromGenerator {
        StreamFromGenerator::new(stream::iter(0..count).map(move |i| {
            let payload = Payload::from(format!("{}: {}", prefix, i));
            Ok((payload, i + 1 == count))
        }))
    }
}

impl Default for DemoResponder {
    fn default() -> Self {
        Self::new(5, 3)
    }
}

impl RequestHandler for DemoResponder {
    fn request_response(&self, payload: Payload) -> BoxFuture<'static, Result<Payload>> {
        info!("request-response: {}", payload.data_utf8());
        future::ready(Ok(Payload::from_data(payload.data().to_vec()))).boxed()
    }

    fn fire_and_forget(&self, payload: Payload) {
        info!("fire-and-forget: {}", payload.data_utf8());
        self.fire_and_forget_count.fetch_add(1, Ordering::SeqCst);
    }

    fn request_stream(&self, payload: Payload) -> Result<Box<dyn Publisher>> {
        info!("request-stream: {}", payload.data_utf8());
        Ok(Box::new(Self::items("Item on stream", self.stream_items)))
    }

    fn request_channel(&self, payload: Payload) -> Result<ChannelResponse> {
        info!("request-channel: {}", payload.data_utf8());
        let inbound = ChannelSubscriber::with_recorder(
            self.received_done.clone(),
            self.received.clone(),
        )
        .requesting(self.channel_request_n);
        Ok((
            Box::new(Self::items("Item on channel", self.channel_items)),
            Some(Box::new(inbound)),
        ))
    }
}
