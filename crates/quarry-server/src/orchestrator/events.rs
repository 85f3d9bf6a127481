// crates/quarry-server/src/orchestrator/events.rs
// Ordered event delivery with disconnect detection

use crate::error::{QuarryError, Result};
use quarry_types::StreamEvent;
use tokio::sync::mpsc;
use tracing::trace;

/// Sending half of a run's event stream.
///
/// Checks for a closed consumer before every send, so a run stops at the
/// next event after a disconnect. Nothing can be emitted after `StreamEnd`.
pub struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
    ended: bool,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self { tx, ended: false }
    }

    pub async fn emit(&mut self, event: StreamEvent) -> Result<()> {
        if self.ended {
            return Err(QuarryError::StreamClosed);
        }
        if self.tx.is_closed() {
            return Err(QuarryError::Cancelled);
        }

        let terminal = event.is_terminal();
        trace!(kind = event.kind(), "Emitting event");
        self.tx.send(event).await.map_err(|_| QuarryError::Cancelled)?;
        if terminal {
            self.ended = true;
        }
        Ok(())
    }

    pub fn has_ended(&self) -> bool {
        self.ended
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_nothing_after_stream_end() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut sink = EventSink::new(tx);
        sink.emit(StreamEvent::TextDelta { text: "a".into() }).await.unwrap();
        sink.emit(StreamEvent::StreamEnd { session_id: "s".into() }).await.unwrap();
        assert!(sink.has_ended());

        let err = sink.emit(StreamEvent::TextDelta { text: "b".into() }).await.unwrap_err();
        assert!(matches!(err, QuarryError::StreamClosed));

        drop(sink);
        let mut kinds = vec![];
        while let Some(ev) = rx.recv().await {
            kinds.push(ev.kind());
        }
        assert_eq!(kinds, vec!["text-chunk", "stream-end"]);
    }

    #[tokio::test]
    async fn test_closed_consumer_is_cancelled() {
        let (tx, rx) = mpsc::channel(8);
        let mut sink = EventSink::new(tx);
        drop(rx);
        assert!(sink.is_closed());
        let err = sink.emit(StreamEvent::TextDelta { text: "a".into() }).await.unwrap_err();
        assert!(matches!(err, QuarryError::Cancelled));
        assert!(!sink.has_ended());
    }
}
