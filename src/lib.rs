//! Top‑level crate for the RSocket interaction engine.
//!
//! The engine drives request‑response, fire‑and‑forget,
//! request‑stream and request‑channel interactions over any async
//! byte stream, with reactive‑streams backpressure in every
//! direction: nothing is sent to a subscriber that it has not asked
//! for.
//!
//! If you are new to the codebase start with [`reactive`], which
//! holds the publisher / subscriber / subscription contracts and the
//! demand pump, then read [`engine`] to see how those contracts are
//! carried across a connection.  [`interaction`] shows the whole
//! thing from a caller's point of view and
//! [`network::loopback`] wires two endpoints together for tests.

pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod interaction;
pub mod network;
pub mod payload;
pub mod protocol;
pub mod reactive;
pub mod subscribers;

pub use config::Config;
pub use engine::RSocket;
pub use error::{Result, RSocketError};
pub use handler::{DefaultHandler, DemoResponder, RequestHandler};
pub use payload::Payload;
pub use protocol::stream_id::Role;
pub use reactive::{
    CompletionLatch, Publisher, StreamFromGenerator, Subscribable, Subscriber, Subscription,
};
