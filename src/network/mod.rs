//! Networking layers.
//!
//! [`transport`] moves frames across a byte stream; [`loopback`]
//! joins two endpoints over a local socket for integration testing.

pub mod loopback;
pub mod transport;

pub use loopback::Pipe;
pub use transport::{FrameReader, FrameWriter};
