//! Protocol primitives.
//!
//! The protocol layer defines how interactions are framed, how
//! stream ids are allocated and how the streams of one connection are
//! tracked.  It does no I/O; see [`network`](crate::network) for that.

pub mod frame;
pub mod stream_id;
pub(crate) mod stream_table;

pub use frame::{Frame, FrameKind};
pub use stream_id::{Role, StreamIdAllocator};
