//! Interaction orchestrators.
//!
//! Each function drives one interaction shape to its end and hands
//! the caller a plain result: the subscriber plumbing, the demand
//! policy and the completion latches stay in here.
//!
//! A channel is finished only when both directions are: the inbound
//! latch is set by the [`ChannelSubscriber`], the outbound latch by
//! the local publisher's demand pump.  The two are awaited together,
//! so a slow direction never holds up the observation of the other.

use tracing::{debug, info};

use crate::engine::RSocket;
use crate::error::{Result, RSocketError};
use crate::payload::Payload;
use crate::reactive::generator::StreamFromGenerator;
use crate::reactive::latch::CompletionLatch;
use crate::subscribers::{ChannelSubscriber, StreamSubscriber};

pub async fn request_response(rsocket: &RSocket, payload: Payload) -> Result<Payload> {
    rsocket.request_response(payload).await
}

/// Open a request‑stream with `initial_n` credit, re‑granting
/// `replenish_n` after every `replenish_n` items, and collect the
/// items until the stream ends.  A stream that fails raises its error.
pub async fn request_stream(
    rsocket: &RSocket,
    payload: Payload,
    initial_n: u64,
    replenish_n: u64,
) -> Result<Vec<Payload>> {
    if initial_n == 0 {
        return Err(RSocketError::InvalidRequestN("initial demand of 0".into()));
    }
    let latch = CompletionLatch::new();
    let subscriber = StreamSubscriber::new(latch.clone(), replenish_n);
    let recorder = subscriber.recorder();
    rsocket
        .request_stream(payload)
        .initial_request_n(initial_n)
        .subscribe(subscriber);

    latch.wait().await;
    if let Some(err) = recorder.take_error() {
        return Err(err);
    }
    let items = recorder.payloads();
    info!(count = items.len(), "stream finished");
    Ok(items)
}

/// Open a request‑channel that sends `outbound` and receives the
/// peer's items with `initial_n` credit.  Returns once both
/// directions have terminated, with the items received.  Inbound
/// errors end the inbound direction but are not raised.
pub async fn request_channel(
    rsocket: &RSocket,
    payload: Payload,
    outbound: StreamFromGenerator,
    initial_n: u64,
) -> Result<Vec<Payload>> {
    if initial_n == 0 {
        return Err(RSocketError::InvalidRequestN("initial demand of 0".into()));
    }
    let inbound_done = CompletionLatch::new();
    let outbound_done = CompletionLatch::new();
    let subscriber = ChannelSubscriber::new(inbound_done.clone());
    let recorder = subscriber.recorder();
    rsocket
        .request_channel(payload, Box::new(outbound.with_latch(outbound_done.clone())))
        .initial_request_n(initial_n)
        .subscribe(subscriber);

    CompletionLatch::wait_all(&[&inbound_done, &outbound_done]).await;
    debug!("both channel directions finished");
    Ok(recorder.payloads())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::handler::{DefaultHandler, DemoResponder};
    use crate::network::loopback;

    fn texts(items: &[Payload]) -> Vec<String> {
        items.iter().map(Payload::data_utf8).collect()
    }

    #[tokio::test]
    async fn stream_collects_every_item() {
        let items = loopback::run(Arc::new(DemoResponder::new(5, 3)), |_server, client| async move {
            request_stream(&client, Payload::from("go"), 2, 2).await
        })
        .await
        .unwrap();
        assert_eq!(
            texts(&items),
            (0..5).map(|i| format!("Item on stream: {}", i)).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn rejected_stream_raises() {
        let outcome = loopback::run(Arc::new(DefaultHandler), |_server, client| async move {
            request_stream(&client, Payload::from("go"), 2, 2).await
        })
        .await;
        assert!(matches!(outcome, Err(RSocketError::Remote(_))));
    }

    #[tokio::test]
    async fn zero_initial_demand_is_refused() {
        let outcome = loopback::run(Arc::new(DemoResponder::default()), |_server, client| async move {
            request_stream(&client, Payload::from("go"), 0, 2).await
        })
        .await;
        assert!(matches!(outcome, Err(RSocketError::InvalidRequestN(_))));
    }

    #[tokio::test]
    async fn rejected_channel_still_finishes() {
        let outcome = loopback::run(Arc::new(DefaultHandler), |_server, client| async move {
            let outbound = StreamFromGenerator::from_payloads(vec![Payload::from("Item 0")]);
            request_channel(&client, Payload::from("open"), outbound, 5).await
        })
        .await
        .unwrap();
        assert!(outcome.is_empty());
    }
}
