//! Frame dispatch for one connection.
//!
//! The reader task hands every decoded frame to the [`Dispatcher`].
//! Request frames start a responder interaction through the
//! [`RequestHandler`]; the remaining frames are routed by stream id
//! to the inbound or outbound leg they belong to.  Frames for
//! unknown streams are logged and dropped: they are the normal
//! aftermath of a cancel racing with in‑flight items.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::engine::inbound::InboundLeg;
use crate::engine::link::Link;
use crate::engine::outbound::OutboundLeg;
use crate::engine::requester::Refused;
use crate::error::{Result, RSocketError};
use crate::handler::RequestHandler;
use crate::protocol::frame::{Frame, FrameKind};
use crate::protocol::stream_table::StreamEntry;
use crate::reactive::publisher::MAX_REQUEST_N;

pub(crate) struct Dispatcher {
    link: Link,
    handler: Arc<dyn RequestHandler>,
}

impl Dispatcher {
    pub fn new(link: Link, handler: Arc<dyn RequestHandler>) -> Self {
        Self { link, handler }
    }

    pub fn handle(&self, frame: Frame) {
        let stream_id = frame.stream_id;
        let outcome = match frame.kind {
            FrameKind::RequestResponse => self.on_request_response(&frame),
            FrameKind::RequestFnf => self.on_fire_and_forget(&frame),
            FrameKind::RequestStream => self.on_request_stream(&frame),
            FrameKind::RequestChannel => self.on_request_channel(&frame),
            FrameKind::RequestN => {
                self.on_request_n(&frame);
                Ok(())
            }
            FrameKind::Cancel => {
                match self.link.streams.outbound(stream_id) {
                    Some(leg) => leg.cancel(),
                    None => debug!(stream_id, "CANCEL for unknown stream"),
                }
                Ok(())
            }
            FrameKind::Payload => {
                self.on_payload(&frame);
                Ok(())
            }
            FrameKind::Error => {
                self.on_error(&frame);
                Ok(())
            }
        };
        if let Err(err) = outcome {
            warn!(stream_id, kind = %frame.kind, error = %err, "request refused");
            if frame.kind != FrameKind::RequestFnf {
                self.link.send(Frame::error(stream_id, &err));
            }
        }
    }

    fn on_request_response(&self, frame: &Frame) -> Result<()> {
        let stream_id = frame.stream_id;
        let response = self.handler.request_response(frame.to_payload()?);
        let link = self.link.clone();
        tokio::spawn(async move {
            match response.await {
                Ok(payload) => link.send(Frame::payload(stream_id, Some(&payload), true)),
                Err(err) => link.send(Frame::error(stream_id, &err)),
            }
        });
        Ok(())
    }

    fn on_fire_and_forget(&self, frame: &Frame) -> Result<()> {
        self.handler.fire_and_forget(frame.to_payload()?);
        Ok(())
    }

    fn on_request_stream(&self, frame: &Frame) -> Result<()> {
        let stream_id = frame.stream_id;
        let initial = frame.request_n_value()?;
        let publisher = self.handler.request_stream(frame.to_payload()?)?;

        let leg = OutboundLeg::new(stream_id, self.link.clone());
        let entry = StreamEntry {
            inbound: None,
            outbound: Some(leg.clone()),
        };
        if let Err(err) = self.link.streams.insert(stream_id, entry) {
            warn!(stream_id, error = %err, "request-stream not opened");
            publisher.subscribe(Box::new(Refused));
            return Ok(());
        }
        debug!(stream_id, initial, "responding to request-stream");
        leg.request(initial);
        leg.attach(publisher);
        Ok(())
    }

    fn on_request_channel(&self, frame: &Frame) -> Result<()> {
        let stream_id = frame.stream_id;
        let initial = frame.request_n_value()?;
        let (publisher, subscriber) = self.handler.request_channel(frame.to_payload()?)?;

        let outbound = OutboundLeg::new(stream_id, self.link.clone());
        let mut inbound_request = None;
        let inbound = match subscriber {
            Some(subscriber) => {
                let leg = InboundLeg::new(stream_id, self.link.clone(), subscriber);
                inbound_request = leg.subscribe();
                inbound_request.map(|_| leg)
            }
            None => None,
        };
        if inbound.is_none() {
            // Nobody wants the requester's items.
            self.link.send(Frame::cancel(stream_id));
        }

        let entry = StreamEntry {
            inbound: inbound.clone(),
            outbound: Some(outbound.clone()),
        };
        if let Err(err) = self.link.streams.insert(stream_id, entry) {
            warn!(stream_id, error = %err, "request-channel not opened");
            if let Some(leg) = inbound {
                leg.fail(err);
            }
            publisher.subscribe(Box::new(Refused));
            return Ok(());
        }
        debug!(stream_id, initial, "responding to request-channel");
        if let Some(n) = inbound_request.filter(|n| *n > 0) {
            self.link
                .send(Frame::request_n(stream_id, n.min(MAX_REQUEST_N)));
        }
        if let Some(leg) = &inbound {
            leg.start();
        }
        outbound.request(initial);
        outbound.attach(publisher);
        Ok(())
    }

    fn on_request_n(&self, frame: &Frame) {
        let stream_id = frame.stream_id;
        let Some(leg) = self.link.streams.outbound(stream_id) else {
            debug!(stream_id, "REQUEST_N for unknown stream");
            return;
        };
        match frame.request_n_value() {
            Ok(n) => leg.request(n),
            Err(err) => leg.fail(err),
        }
    }

    fn on_payload(&self, frame: &Frame) {
        let stream_id = frame.stream_id;
        let Some(leg) = self.link.streams.inbound(stream_id) else {
            debug!(stream_id, "PAYLOAD for unknown stream");
            return;
        };
        if frame.has_next() {
            match frame.to_payload() {
                Ok(payload) => leg.deliver_next(payload, frame.is_complete()),
                Err(err) => {
                    self.link.send(Frame::cancel(stream_id));
                    leg.fail(err);
                }
            }
        } else if frame.is_complete() {
            leg.complete();
        }
    }

    /// `ERROR` ends both directions of the stream.
    fn on_error(&self, frame: &Frame) {
        let stream_id = frame.stream_id;
        let message = frame.error_message();
        debug!(stream_id, %message, "stream failed remotely");
        if let Some(leg) = self.link.streams.outbound(stream_id) {
            leg.cancel();
        }
        match self.link.streams.inbound(stream_id) {
            Some(leg) => leg.fail(RSocketError::Remote(message)),
            None => debug!(stream_id, "ERROR for unknown stream"),
        }
    }
}
