//! Reactive‑streams primitives.
//!
//! The engine speaks the classic publisher / subscriber /
//! subscription protocol with explicit credit.  This module holds the
//! protocol‑independent pieces: the contracts themselves, the credit
//! counter, the completion latch and the demand pump that turns a
//! lazy item source into a well behaved publisher.

pub mod generator;
pub mod latch;
pub mod publisher;
pub mod subscriber;
pub mod subscription;

pub use generator::{Pulled, StreamFromGenerator};
pub use latch::CompletionLatch;
pub use publisher::{Publisher, Subscribable, MAX_REQUEST_N};
pub use subscriber::{SafeSubscriber, Subscriber, SubscriberState};
pub use subscription::{Credit, DemandSignal, Subscription};
