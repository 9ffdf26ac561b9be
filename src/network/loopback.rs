//! Loopback harness: two endpoints joined over a local TCP socket.
//!
//! [`Pipe`] binds a listener on an ephemeral port of `127.0.0.1`,
//! connects to it and wraps both sockets in an [`RSocket`]: the
//! accepted one as the server, the connecting one as the client.
//! Setup is complete before the caller gets the pipe back, so a test
//! can drive the client exactly as a production caller would.
//!
//! [`Pipe::finish`] closes the client, the server and the listener.
//! [`Pipe::run`] and [`run`] scope a pipe around an async body and
//! finish it on every exit path, including an `Err` from the body and
//! a panic.

use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

use crate::config::ConnectionSection;
use crate::engine::RSocket;
use crate::error::Result;
use crate::handler::{DefaultHandler, RequestHandler};
use crate::protocol::stream_id::Role;

/// A connected server/client pair.
pub struct Pipe {
    pub server: RSocket,
    pub client: RSocket,
    listener: Option<TcpListener>,
    addr: SocketAddr,
}

impl Pipe {
    /// Server answering with `handler`; the client refuses requests
    /// made by the server.
    pub async fn start(handler: Arc<dyn RequestHandler>) -> Result<Self> {
        Self::start_with(handler, Arc::new(DefaultHandler), &ConnectionSection::default()).await
    }

    pub async fn start_with(
        server_handler: Arc<dyn RequestHandler>,
        client_handler: Arc<dyn RequestHandler>,
        settings: &ConnectionSection,
    ) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        // A failure here drops the listener and whichever socket did
        // get through.
        let ((accepted, peer), connected) =
            tokio::try_join!(listener.accept(), TcpStream::connect(addr))?;
        debug!(%addr, %peer, "loopback connected");

        let server = RSocket::new(accepted, Role::Server, server_handler, settings);
        let client = RSocket::new(connected, Role::Client, client_handler, settings);
        Ok(Pipe {
            server,
            client,
            listener: Some(listener),
            addr,
        })
    }

    /// Address the listener was bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Close both endpoints and the listener.  Safe to call twice.
    pub async fn finish(&mut self) {
        self.client.close().await;
        self.server.close().await;
        if self.listener.take().is_some() {
            debug!(addr = %self.addr, "loopback listener released");
        }
    }

    /// Run `body` against this pipe and finish it afterwards, whatever
    /// the outcome.  A panic in `body` is resumed once the pipe is
    /// closed.
    pub async fn run<F, Fut, T>(mut self, body: F) -> Result<T>
    where
        F: FnOnce(RSocket, RSocket) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let outcome = AssertUnwindSafe(body(self.server.clone(), self.client.clone()))
            .catch_unwind()
            .await;
        self.finish().await;
        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Run `body` against a fresh pipe; see [`Pipe::run`].
pub async fn run<F, Fut, T>(handler: Arc<dyn RequestHandler>, body: F) -> Result<T>
where
    F: FnOnce(RSocket, RSocket) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    Pipe::start(handler).await?.run(body).await
}
