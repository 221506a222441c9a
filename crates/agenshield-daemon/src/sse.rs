//! SSE broadcaster.
//!
//! One `tokio::sync::broadcast` channel fans events out to every
//! subscriber. Buffers are bounded: a subscriber that stops reading falls
//! behind, the channel drops its oldest events, and the stream surfaces a
//! `dropped` notice rather than blocking the publisher. Heartbeats go out
//! every 15 seconds.

use agenshield_core::protocol::ShieldEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::Stream;
use futures_util::StreamExt;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

/// Per-subscriber buffer size; overflow drops the oldest events.
const SUBSCRIBER_BUFFER: usize = 256;

/// Heartbeat interval for idle streams.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct Broadcaster {
    sender: broadcast::Sender<ShieldEvent>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(SUBSCRIBER_BUFFER);
        Self { sender }
    }

    /// Publish to all current subscribers. Lagging subscribers lose oldest
    /// events first; with no subscribers the event is simply dropped.
    pub fn publish(&self, event: ShieldEvent) {
        let receivers = self.sender.receiver_count();
        if let Err(e) = self.sender.send(event) {
            tracing::trace!(error = %e, "no SSE subscribers");
        } else {
            tracing::trace!(receivers, "event broadcast");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Raw broadcast receiver (non-SSE consumers and tests).
    pub fn subscribe_raw(&self) -> broadcast::Receiver<ShieldEvent> {
        self.sender.subscribe()
    }

    /// An SSE response streaming all future events to one subscriber.
    pub fn sse_stream(&self) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
        let rx = self.sender.subscribe();
        let stream = BroadcastStream::new(rx).map(|item| {
            let event = match item {
                Ok(event) => Event::default()
                    .event(event.event_type.clone())
                    .data(serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string())),
                Err(BroadcastStreamRecvError::Lagged(missed)) => Event::default()
                    .event("dropped")
                    .data(format!("{{\"missed\":{}}}", missed)),
            };
            Ok(event)
        });
        Sse::new(stream).keep_alive(
            KeepAlive::new()
                .interval(HEARTBEAT_INTERVAL)
                .text("heartbeat"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let b = Broadcaster::new();
        let mut rx = b.sender.subscribe();
        b.publish(ShieldEvent::new("skills:installed", json!({"slug": "weather"})));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, "skills:installed");
    }

    #[tokio::test]
    async fn each_subscriber_gets_every_event() {
        let b = Broadcaster::new();
        let mut rx1 = b.sender.subscribe();
        let mut rx2 = b.sender.subscribe();
        b.publish(ShieldEvent::new("config:updated", json!({})));
        assert_eq!(rx1.recv().await.unwrap().event_type, "config:updated");
        assert_eq!(rx2.recv().await.unwrap().event_type, "config:updated");
    }

    #[tokio::test]
    async fn overflow_drops_oldest() {
        let b = Broadcaster::new();
        let mut rx = b.sender.subscribe();
        for i in 0..(SUBSCRIBER_BUFFER + 10) {
            b.publish(ShieldEvent::new("tick", json!({ "i": i })));
        }
        // The receiver lagged; the first recv reports the loss.
        let err = rx.recv().await.unwrap_err();
        assert!(matches!(err, broadcast::error::RecvError::Lagged(_)));
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let b = Broadcaster::new();
        b.publish(ShieldEvent::new("noop", json!({})));
        assert_eq!(b.subscriber_count(), 0);
    }
}
