//! Requester side: publishers and subscribers standing in for a
//! remote interaction.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::debug;

use crate::engine::inbound::InboundLeg;
use crate::engine::link::Link;
use crate::engine::outbound::OutboundLeg;
use crate::error::{Result, RSocketError};
use crate::payload::Payload;
use crate::protocol::frame::{Frame, FrameKind};
use crate::protocol::stream_id::StreamIdAllocator;
use crate::protocol::stream_table::StreamEntry;
use crate::reactive::publisher::{Publisher, MAX_REQUEST_N};
use crate::reactive::subscriber::Subscriber;
use crate::reactive::subscription::Subscription;

pub(crate) enum RemoteShape {
    Stream,
    /// Channel with the local publisher feeding the outbound direction.
    Channel(Box<dyn Publisher>),
}

/// Publisher for a request‑stream or request‑channel.  Subscribing
/// opens the stream: the request frame carries whatever credit the
/// subscriber granted during `on_subscribe`, and anything granted
/// after that follows it as `REQUEST_N`.
pub(crate) struct RemoteRequest {
    pub link: Link,
    pub ids: Arc<StreamIdAllocator>,
    pub payload: Payload,
    pub shape: RemoteShape,
}

impl Publisher for RemoteRequest {
    fn subscribe(self: Box<Self>, subscriber: Box<dyn Subscriber>) {
        let RemoteRequest {
            link,
            ids,
            payload,
            shape,
        } = *self;
        let stream_id = ids.next_unused(|id| link.streams.contains(id));
        let inbound = InboundLeg::new(stream_id, link.clone(), subscriber);
        let publisher = match shape {
            RemoteShape::Stream => None,
            RemoteShape::Channel(publisher) => Some(publisher),
        };

        let Some(initial) = inbound.subscribe() else {
            debug!(stream_id, "cancelled during on_subscribe; request not sent");
            if let Some(publisher) = publisher {
                publisher.subscribe(Box::new(Refused));
            }
            return;
        };

        let kind = if publisher.is_some() {
            FrameKind::RequestChannel
        } else {
            FrameKind::RequestStream
        };
        let outbound = publisher
            .as_ref()
            .map(|_| OutboundLeg::new(stream_id, link.clone()));
        let entry = StreamEntry {
            inbound: Some(inbound.clone()),
            outbound: outbound.clone(),
        };
        if let Err(err) = link.streams.insert(stream_id, entry) {
            inbound.fail(err);
            if let Some(publisher) = publisher {
                publisher.subscribe(Box::new(Refused));
            }
            return;
        }

        debug!(stream_id, %kind, initial, "opening stream");
        link.send(Frame::request(
            kind,
            stream_id,
            &payload,
            Some(initial.min(MAX_REQUEST_N)),
        ));
        inbound.start();
        if let (Some(leg), Some(publisher)) = (outbound, publisher) {
            leg.attach(publisher);
        }
    }
}

/// Subscriber for a publisher whose stream could not be opened: it
/// cancels on subscribe and ignores everything after.
pub(crate) struct Refused;

impl Subscriber for Refused {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        subscription.cancel();
    }
    fn on_next(&mut self, _payload: Payload, _is_complete: bool) {}
    fn on_error(&mut self, _err: RSocketError) {}
    fn on_complete(&mut self) {}
}

/// Collects the single outcome of a request‑response.
pub(crate) struct ResponseSubscriber {
    value: Option<Payload>,
    reply: Option<oneshot::Sender<Result<Payload>>>,
}

impl ResponseSubscriber {
    pub fn new(reply: oneshot::Sender<Result<Payload>>) -> Self {
        Self {
            value: None,
            reply: Some(reply),
        }
    }

    fn resolve(&mut self, outcome: Result<Payload>) {
        if let Some(reply) = self.reply.take() {
            // The caller may have stopped waiting; nothing to do then.
            let _ = reply.send(outcome);
        }
    }
}

impl Subscriber for ResponseSubscriber {
    fn on_subscribe(&mut self, _subscription: Arc<dyn Subscription>) {}

    fn on_next(&mut self, payload: Payload, _is_complete: bool) {
        self.value = Some(payload);
    }

    fn on_error(&mut self, err: RSocketError) {
        self.resolve(Err(err));
    }

    fn on_complete(&mut self) {
        let value = self.value.take().unwrap_or_default();
        self.resolve(Ok(value));
    }
}
