//! Shared handle to a connection's writer and stream table.

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::RSocketError;
use crate::protocol::frame::Frame;
use crate::protocol::stream_table::StreamTable;
use crate::reactive::latch::CompletionLatch;

/// What a stream leg needs to talk to its connection: a queue into
/// the writer task and the registry it must release itself from.
#[derive(Clone)]
pub(crate) struct Link {
    outbound: mpsc::UnboundedSender<Frame>,
    pub streams: StreamTable,
}

impl Link {
    pub fn new(outbound: mpsc::UnboundedSender<Frame>) -> Self {
        Self {
            outbound,
            streams: StreamTable::new(),
        }
    }

    /// Queue a frame for the writer task.  Frames queued after the
    /// connection has gone away are dropped.
    pub fn send(&self, frame: Frame) {
        trace!(kind = %frame.kind, stream_id = frame.stream_id, "queue frame");
        if self.outbound.send(frame).is_err() {
            debug!("connection closed; frame dropped");
        }
    }
}

/// Close `streams` and terminate everything still registered: local
/// subscribers see `ConnectionClosed`, local publishers are cancelled.
/// Returns `true` for the call that actually closed the connection.
pub(crate) fn shutdown(streams: &StreamTable, closed: &CompletionLatch) -> bool {
    let first = closed.set();
    for (stream_id, entry) in streams.close() {
        debug!(stream_id, "terminating stream on connection close");
        if let Some(inbound) = entry.inbound {
            inbound.fail(RSocketError::ConnectionClosed);
        }
        if let Some(outbound) = entry.outbound {
            outbound.cancel();
        }
    }
    first
}
