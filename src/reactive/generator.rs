//! Demand pump: adapts a pull‑based item source to a [`Publisher`].
//!
//! The source is any `Stream` of `(payload, is_last)` results.  The
//! pump pulls from it one item at a time and only while the
//! subscriber has outstanding credit, so a lazy source never runs
//! ahead of demand.  Each pull ends in one of three ways (see
//! [`Pulled`]):
//!
//! * an item, delivered with `on_next` and followed by `on_complete`
//!   when it carries the last flag;
//! * the end of the source, delivered as `on_complete`;
//! * a failure, delivered as `on_error`.
//!
//! After any of the terminal outcomes, or after the subscriber
//! cancels, the source is dropped and never polled again.

use std::sync::Arc;

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use tracing::debug;

use crate::error::{Result, RSocketError};
use crate::payload::Payload;
use crate::reactive::latch::CompletionLatch;
use crate::reactive::publisher::Publisher;
use crate::reactive::subscriber::{SafeSubscriber, Subscriber};
use crate::reactive::subscription::DemandSignal;

/// Outcome of a single pull from the source.
#[derive(Debug)]
pub enum Pulled {
    Item(Payload, bool),
    End,
    Failed(RSocketError),
}

impl From<Option<Result<(Payload, bool)>>> for Pulled {
    fn from(next: Option<Result<(Payload, bool)>>) -> Self {
        match next {
            Some(Ok((payload, is_last))) => Pulled::Item(payload, is_last),
            Some(Err(err)) => Pulled::Failed(err),
            None => Pulled::End,
        }
    }
}

/// Publisher backed by a lazily pulled item source.
pub struct StreamFromGenerator {
    source: BoxStream<'static, Result<(Payload, bool)>>,
    latch: Option<CompletionLatch>,
}

impl StreamFromGenerator {
    pub fn new<S>(source: S) -> Self
    where
        S: Stream<Item = Result<(Payload, bool)>> + Send + 'static,
    {
        Self {
            source: source.boxed(),
            latch: None,
        }
    }

    /// Publisher over a fixed list of payloads; the last one carries
    /// the completion flag.
    pub fn from_payloads(payloads: Vec<Payload>) -> Self {
        let count = payloads.len();
        Self::new(stream::iter(
            payloads
                .into_iter()
                .enumerate()
                .map(move |(i, payload)| Ok((payload, i + 1 == count))),
        ))
    }

    /// Set `latch` once the pump stops for any reason: completion,
    /// error or cancellation.
    pub fn with_latch(mut self, latch: CompletionLatch) -> Self {
        self.latch = Some(latch);
        self
    }

    async fn run(mut self, mut subscriber: SafeSubscriber, demand: Arc<DemandSignal>) {
        loop {
            if !demand.acquire().await {
                debug!("generator cancelled by subscriber");
                break;
            }
            let pulled = Pulled::from(self.source.next().await);
            if demand.is_cancelled() {
                debug!("generator cancelled while pulling; item dropped");
                break;
            }
            match pulled {
                Pulled::Item(payload, is_last) => {
                    if let Err(err) = demand.consume() {
                        subscriber.on_error(err);
                        break;
                    }
                    subscriber.on_next(payload, is_last);
                    if is_last {
                        subscriber.on_complete();
                        break;
                    }
                }
                Pulled::End => {
                    subscriber.on_complete();
                    break;
                }
                Pulled::Failed(err) => {
                    debug!(error = %err, "generator source failed");
                    subscriber.on_error(err);
                    break;
                }
            }
        }
        if let Some(latch) = self.latch.take() {
            latch.set();
        }
    }
}

impl Publisher for StreamFromGenerator {
    /// Calls `on_subscribe` synchronously, then spawns the pump on
    /// the current tokio runtime.
    fn subscribe(self: Box<Self>, subscriber: Box<dyn Subscriber>) {
        let demand = DemandSignal::new();
        let mut subscriber = SafeSubscriber::new(subscriber);
        subscriber.on_subscribe(demand.clone());
        tokio::spawn(self.run(subscriber, demand));
    }
}
