//! Registry of the active streams on one connection.
//!
//! Each stream id maps to at most two legs: the inbound leg that
//! feeds remote items to a local subscriber, and the outbound leg
//! that drains a local publisher to the peer.  A request‑stream uses
//! one of them, a channel uses both.  The entry disappears once every
//! leg it holds has been released, so the two directions of a
//! channel terminate independently.
//!
//! The table never calls into a leg while holding its lock; callers
//! take an `Arc` out and invoke it afterwards.  Subscriber callbacks
//! are free to cancel (and therefore release) their own stream.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::engine::{InboundLeg, OutboundLeg};
use crate::error::{Result, RSocketError};

/// Legs registered under a single stream id.
#[derive(Default)]
pub(crate) struct StreamEntry {
    pub inbound: Option<Arc<InboundLeg>>,
    pub outbound: Option<Arc<OutboundLeg>>,
}

impl StreamEntry {
    fn is_empty(&self) -> bool {
        self.inbound.is_none() && self.outbound.is_none()
    }
}

#[derive(Default)]
struct TableState {
    streams: HashMap<u32, StreamEntry>,
    closed: bool,
}

/// Concurrency safe stream registry.  Cloning shares the table.
#[derive(Clone, Default)]
pub(crate) struct StreamTable {
    state: Arc<Mutex<TableState>>,
}

impl StreamTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the legs of a new stream.  Fails once the table has
    /// been closed, or if `stream_id` is still open; the caller must
    /// then terminate the legs itself.
    pub fn insert(&self, stream_id: u32, entry: StreamEntry) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(RSocketError::ConnectionClosed);
        }
        match state.streams.entry(stream_id) {
            Entry::Occupied(_) => Err(RSocketError::Rejected(format!(
                "stream {} is already open",
                stream_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(())
            }
        }
    }

    pub fn contains(&self, stream_id: u32) -> bool {
        self.lock().streams.contains_key(&stream_id)
    }

    pub fn inbound(&self, stream_id: u32) -> Option<Arc<InboundLeg>> {
        self.lock()
            .streams
            .get(&stream_id)
            .and_then(|entry| entry.inbound.clone())
    }

    pub fn outbound(&self, stream_id: u32) -> Option<Arc<OutboundLeg>> {
        self.lock()
            .streams
            .get(&stream_id)
            .and_then(|entry| entry.outbound.clone())
    }

    pub fn release_inbound(&self, stream_id: u32) {
        self.release(stream_id, |entry| entry.inbound = None);
    }

    pub fn release_outbound(&self, stream_id: u32) {
        self.release(stream_id, |entry| entry.outbound = None);
    }

    fn release(&self, stream_id: u32, clear: impl FnOnce(&mut StreamEntry)) {
        let mut state = self.lock();
        if let Some(entry) = state.streams.get_mut(&stream_id) {
            clear(entry);
            if entry.is_empty() {
                state.streams.remove(&stream_id);
            }
        }
    }

    /// Close the table and hand back every remaining entry so the
    /// caller can terminate them.  Later inserts are refused.
    pub fn close(&self) -> Vec<(u32, StreamEntry)> {
        let mut state = self.lock();
        state.closed = true;
        state.streams.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().streams.len()
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
