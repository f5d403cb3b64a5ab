//! Lifecycle notifications emitted alongside the file stream.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::bundler::BundleHandle;

/// A side-channel notification from one invocation.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A config module was loaded; carries its exported object.
    Config(Map<String, Value>),
    /// The build phase finished. The handle can generate additional output
    /// independently of the configured targets.
    Bundle(Arc<dyn BundleHandle>),
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Config(_) => "config",
            StreamEvent::Bundle(_) => "bundle",
        }
    }
}

/// Sending half of the event channel.
///
/// Sending never fails: once the receiver is gone, events are dropped.
#[derive(Debug, Clone, Default)]
pub struct EventSender {
    tx: Option<mpsc::UnboundedSender<StreamEvent>>,
}

impl EventSender {
    /// Create a connected sender/receiver pair.
    pub fn channel() -> (EventSender, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            EventSender { tx: Some(tx) },
            EventReceiver {
                inner: UnboundedReceiverStream::new(rx),
            },
        )
    }

    /// A sender that discards everything.
    pub fn discard() -> EventSender {
        EventSender { tx: None }
    }

    pub fn emit(&self, event: StreamEvent) {
        tracing::trace!(event = event.name(), "emitting stream event");
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// Receiving half of the event channel; ends when the invocation finishes.
#[derive(Debug)]
pub struct EventReceiver {
    inner: UnboundedReceiverStream<StreamEvent>,
}

impl Stream for EventReceiver {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn events_arrive_in_order_and_channel_closes() {
        let (tx, rx) = EventSender::channel();
        tx.emit(StreamEvent::Config(Map::new()));
        tx.emit(StreamEvent::Config(Map::new()));
        drop(tx);

        let names: Vec<_> = rx.map(|e| e.name()).collect().await;
        assert_eq!(names, vec!["config", "config"]);
    }

    #[test]
    fn discard_sender_accepts_events() {
        EventSender::discard().emit(StreamEvent::Config(Map::new()));
    }

    #[test]
    fn sending_after_receiver_dropped_is_silent() {
        let (tx, rx) = EventSender::channel();
        drop(rx);
        tx.emit(StreamEvent::Config(Map::new()));
    }
}
