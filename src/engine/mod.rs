//! The protocol endpoint.
//!
//! An [`RSocket`] owns one full‑duplex connection.  It runs two tasks:
//! a writer draining a frame queue into the connection and a reader
//! feeding every decoded frame to the dispatcher.  Both ends of a
//! connection are symmetric; the [`Role`] only decides which stream
//! ids an endpoint allocates.
//!
//! Each interaction is split into legs.  An inbound leg carries remote
//! items into a local subscriber and accounts for the credit that
//! subscriber granted; an outbound leg drains a local publisher to the
//! peer under the peer's credit.  A stream table keyed by stream id
//! holds the legs of every open interaction until they terminate.
//!
//! When the connection goes away, every open stream is terminated:
//! subscribers see [`RSocketError::ConnectionClosed`] and publishers
//! are cancelled.

mod inbound;
pub(crate) mod link;
mod outbound;
mod requester;
mod responder;

pub(crate) use inbound::InboundLeg;
pub(crate) use outbound::OutboundLeg;

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ConnectionSection;
use crate::error::{Result, RSocketError};
use crate::handler::RequestHandler;
use crate::network::transport::{FrameReader, FrameWriter};
use crate::payload::Payload;
use crate::protocol::frame::{Frame, FrameKind};
use crate::protocol::stream_id::{Role, StreamIdAllocator};
use crate::protocol::stream_table::{StreamEntry, StreamTable};
use crate::reactive::latch::CompletionLatch;
use crate::reactive::publisher::{Publisher, Subscribable};

use link::Link;
use requester::{RemoteRequest, RemoteShape, ResponseSubscriber};
use responder::Dispatcher;

struct Inner {
    role: Role,
    ids: Arc<StreamIdAllocator>,
    link: Link,
    closed: CompletionLatch,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Inner {
    fn lock_tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for task in self.lock_tasks().drain(..) {
            task.abort();
        }
    }
}

/// One end of an RSocket connection.  Cheap to clone; all clones
/// share the connection.
#[derive(Clone)]
pub struct RSocket {
    inner: Arc<Inner>,
}

impl RSocket {
    /// Start an endpoint over `io`.  Must be called from within a
    /// tokio runtime.
    pub fn new<T>(
        io: T,
        role: Role,
        handler: Arc<dyn RequestHandler>,
        settings: &ConnectionSection,
    ) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(io);
        let (tx, rx) = mpsc::unbounded_channel();
        let link = Link::new(tx);
        let closed = CompletionLatch::new();

        let writer = tokio::spawn(write_loop(
            FrameWriter::new(write_half),
            rx,
            closed.clone(),
        ));
        let reader = tokio::spawn(read_loop(
            FrameReader::new(read_half, settings.max_frame_size),
            Dispatcher::new(link.clone(), handler),
            link.streams.clone(),
            closed.clone(),
        ));
        debug!(?role, "endpoint started");

        RSocket {
            inner: Arc::new(Inner {
                role,
                ids: Arc::new(StreamIdAllocator::new(role)),
                link,
                closed,
                tasks: Mutex::new(vec![reader, writer]),
            }),
        }
    }

    pub fn role(&self) -> Role {
        self.inner.role
    }

    /// Send one request and await its single outcome.  A response
    /// that completes without a value yields an empty payload.
    pub async fn request_response(&self, payload: Payload) -> Result<Payload> {
        let link = &self.inner.link;
        let stream_id = self.inner.ids.next_unused(|id| link.streams.contains(id));
        let (reply, outcome) = oneshot::channel();
        let leg = InboundLeg::with_credit(
            stream_id,
            link.clone(),
            Box::new(ResponseSubscriber::new(reply)),
            1,
        );
        let _ = leg.subscribe();
        let entry = StreamEntry {
            inbound: Some(leg.clone()),
            outbound: None,
        };
        link.streams.insert(stream_id, entry)?;
        debug!(stream_id, "request-response");
        link.send(Frame::request(
            FrameKind::RequestResponse,
            stream_id,
            &payload,
            None,
        ));
        leg.start();
        outcome.await.unwrap_or(Err(RSocketError::Cancelled))
    }

    /// Send a request that has no response.
    pub fn fire_and_forget(&self, payload: Payload) -> Result<()> {
        if self.is_closed() {
            return Err(RSocketError::ConnectionClosed);
        }
        let link = &self.inner.link;
        let stream_id = self.inner.ids.next_unused(|id| link.streams.contains(id));
        debug!(stream_id, "fire-and-forget");
        link.send(Frame::request(
            FrameKind::RequestFnf,
            stream_id,
            &payload,
            None,
        ));
        Ok(())
    }

    /// Handle for a request‑stream.  Nothing is sent until a
    /// subscriber is attached; the request frame then carries the
    /// handle's initial demand.
    pub fn request_stream(&self, payload: Payload) -> Subscribable {
        self.remote(payload, RemoteShape::Stream)
    }

    /// Handle for a request‑channel.  Once a subscriber is attached,
    /// `publisher` is drained to the peer under the peer's demand
    /// while the subscriber receives the peer's items.
    pub fn request_channel(&self, payload: Payload, publisher: Box<dyn Publisher>) -> Subscribable {
        self.remote(payload, RemoteShape::Channel(publisher))
    }

    fn remote(&self, payload: Payload, shape: RemoteShape) -> Subscribable {
        Subscribable::new(Box::new(RemoteRequest {
            link: self.inner.link.clone(),
            ids: self.inner.ids.clone(),
            payload,
            shape,
        }))
    }

    /// Close the connection.  Stops both tasks and waits for them to
    /// exit, which releases the underlying connection, then fails
    /// every stream still open.  Closing twice is harmless.
    pub async fn close(&self) {
        let tasks: Vec<JoinHandle<()>> = self.inner.lock_tasks().drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            let _ = task.await;
        }
        if link::shutdown(&self.inner.link.streams, &self.inner.closed) {
            info!(role = ?self.inner.role, "connection closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_set()
    }

    /// Resolves once the connection has closed, from either side.
    pub async fn closed(&self) {
        self.inner.closed.wait().await
    }

    /// Number of streams with at least one open direction.
    pub fn active_streams(&self) -> usize {
        self.inner.link.streams.len()
    }
}

async fn write_loop<W>(
    mut writer: FrameWriter<W>,
    mut queue: mpsc::UnboundedReceiver<Frame>,
    closed: CompletionLatch,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            frame = queue.recv() => frame,
            _ = closed.wait() => None,
        };
        let Some(frame) = frame else { break };
        if let Err(err) = writer.send_frame(&frame).await {
            warn!(%err, "write failed");
            break;
        }
    }
    if let Err(err) = writer.shutdown().await {
        debug!(%err, "shutdown of write half failed");
    }
}

async fn read_loop<R>(
    mut reader: FrameReader<R>,
    dispatcher: Dispatcher,
    streams: StreamTable,
    closed: CompletionLatch,
) where
    R: AsyncRead + Unpin,
{
    loop {
        match reader.read_frame().await {
            Ok(Some(frame)) => dispatcher.handle(frame),
            Ok(None) => {
                debug!("peer closed the connection");
                break;
            }
            Err(err) => {
                warn!(%err, "read failed; closing connection");
                break;
            }
        }
    }
    if link::shutdown(&streams, &closed) {
        info!("connection closed by peer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{DefaultHandler, DemoResponder};
    use crate::subscribers::StreamSubscriber;
    use tokio::io::duplex;

    fn pair(handler: Arc<dyn RequestHandler>) -> (RSocket, RSocket) {
        let settings = ConnectionSection::default();
        let (a, b) = duplex(64 * 1024);
        let server = RSocket::new(a, Role::Server, handler, &settings);
        let client = RSocket::new(b, Role::Client, Arc::new(DefaultHandler), &settings);
        (server, client)
    }

    #[tokio::test]
    async fn request_response_over_duplex() {
        let (_server, client) = pair(Arc::new(DemoResponder::default()));
        let reply = client.request_response(Payload::from("ping")).await.unwrap();
        assert_eq!(reply.data(), b"ping");
        assert_eq!(client.active_streams(), 0);
    }

    #[tokio::test]
    async fn rejected_request_surfaces_as_remote_error() {
        let (_server, client) = pair(Arc::new(DefaultHandler));
        let err = client
            .request_response(Payload::from("ping"))
            .await
            .unwrap_err();
        assert!(matches!(err, RSocketError::Remote(msg) if msg.contains("not supported")));
    }

    #[tokio::test]
    async fn close_fails_open_streams_and_is_idempotent() {
        let settings = ConnectionSection::default();
        let (a, _b) = duplex(64 * 1024);
        let client = RSocket::new(a, Role::Client, Arc::new(DefaultHandler), &settings);

        let latch = CompletionLatch::new();
        let subscriber = StreamSubscriber::new(latch.clone(), 0);
        let recorder = subscriber.recorder();
        client
            .request_stream(Payload::from("never answered"))
            .initial_request_n(1)
            .subscribe(subscriber);
        assert_eq!(client.active_streams(), 1);

        client.close().await;
        client.close().await;
        latch.wait().await;
        assert!(client.is_closed());
        assert!(matches!(
            recorder.take_error(),
            Some(RSocketError::ConnectionClosed)
        ));
        assert!(client.request_response(Payload::from("late")).await.is_err());
        assert!(client.fire_and_forget(Payload::from("late")).is_err());
    }

    #[tokio::test]
    async fn peer_hangup_closes_endpoint() {
        let settings = ConnectionSection::default();
        let (a, b) = duplex(1024);
        let client = RSocket::new(a, Role::Client, Arc::new(DefaultHandler), &settings);
        drop(b);
        client.closed().await;
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn frames_for_unknown_streams_are_ignored() {
        let settings = ConnectionSection::default();
        let (a, b) = duplex(64 * 1024);
        let server = RSocket::new(a, Role::Server, Arc::new(DemoResponder::default()), &settings);
        let (_, write_half) = tokio::io::split(b);
        let mut raw = FrameWriter::new(write_half);
        raw.send_frame(&Frame::request_n(99, 3)).await.unwrap();
        raw.send_frame(&Frame::cancel(99)).await.unwrap();
        raw.send_frame(&Frame::payload(99, Some(&Payload::from("x")), false))
            .await
            .unwrap();
        tokio::task::yield_now().await;
        assert!(!server.is_closed());
        assert_eq!(server.active_streams(), 0);
    }
}
