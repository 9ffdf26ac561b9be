//! Stream id allocation.
//!
//! Every interaction on a connection is identified by a stream id
//! that must be unique within that connection.  Both peers may
//! start interactions, so the id space is split by role: the client
//! uses odd ids and the server even ids.  Id `0` is reserved for
//! connection level frames and never handed out.

use std::sync::atomic::{AtomicU32, Ordering};

/// Which end of the connection an endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Monotonic stream id counter for one endpoint.  Thread safe.
#[derive(Debug)]
pub struct StreamIdAllocator {
    next: AtomicU32,
}

impl StreamIdAllocator {
    /// Client ids start at 1, server ids at 2.
    pub fn new(role: Role) -> Self {
        let first = match role {
            Role::Client => 1,
            Role::Server => 2,
        };
        Self {
            next: AtomicU32::new(first),
        }
    }

    /// Reserve the next id.  Ids step by two so the two peers never
    /// collide.  Wraps within the 31‑bit id space, skipping zero.
    pub fn next(&self) -> u32 {
        loop {
            let id = self.next.fetch_add(2, Ordering::SeqCst) & 0x7fff_ffff;
            if id != 0 {
                return id;
            }
        }
    }

    /// Reserve the next id for which `in_use` is false.  After a wrap
    /// this steps over ids whose streams are still open.
    pub fn next_unused(&self, in_use: impl Fn(u32) -> bool) -> u32 {
        loop {
            let id = self.next();
            if !in_use(id) {
                return id;
            }
        }
    }
}
