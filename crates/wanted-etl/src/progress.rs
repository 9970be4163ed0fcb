//! Progress events and broadcast channel for fetch telemetry.
//!
//! The fetcher emits `FetchEvent`s through a `tokio::sync::broadcast`
//! channel. Subscribers (the CLI progress bar, tests) listen independently;
//! when nobody listens the events are dropped.

use serde::{Deserialize, Serialize};

/// A progress event emitted while draining the paginated source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchEvent {
    /// The run this event belongs to.
    pub run_id: String,
    /// Monotonically increasing sequence number.
    pub seq: u64,
    pub event: FetchEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FetchEventKind {
    /// An outer attempt started, resuming at `next_page`.
    AttemptStarted { attempt: u32, next_page: u32 },
    SessionOpened { session: u32 },
    PageFetched {
        page: u32,
        items: usize,
        session: u32,
    },
    PageFailed {
        page: u32,
        attempt: u32,
        message: String,
    },
    /// The per-session page budget was spent; `from` was closed and `to`
    /// opened.
    SessionRotated { from: u32, to: u32 },
    FetchFinished {
        pages: usize,
        complete: bool,
        attempts: u32,
    },
}

pub type ProgressSender = tokio::sync::broadcast::Sender<FetchEvent>;

pub type ProgressReceiver = tokio::sync::broadcast::Receiver<FetchEvent>;

/// Create a progress channel. 256 events cover a typical run; slow
/// receivers see `Lagged` rather than blocking the fetcher.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Emit an event, ignoring the error raised when no receiver exists.
pub fn emit(tx: &Option<ProgressSender>, run_id: &str, seq: &mut u64, event: FetchEventKind) {
    if let Some(ref sender) = tx {
        *seq += 1;
        let _ = sender.send(FetchEvent {
            run_id: run_id.to_string(),
            seq: *seq,
            event,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = FetchEvent {
            run_id: "run-1".to_string(),
            seq: 3,
            event: FetchEventKind::PageFetched {
                page: 2,
                items: 20,
                session: 1,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"PageFetched\""));

        let parsed: FetchEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.seq, 3);
        assert_eq!(parsed.event, event.event);
    }

    #[test]
    fn test_emit_without_receivers() {
        let (tx, rx) = channel();
        drop(rx);
        let mut seq = 0;
        emit(
            &Some(tx),
            "run",
            &mut seq,
            FetchEventKind::SessionOpened { session: 1 },
        );
        assert_eq!(seq, 1);
    }

    #[test]
    fn test_emit_none_sender() {
        let mut seq = 0;
        emit(
            &None,
            "run",
            &mut seq,
            FetchEventKind::SessionOpened { session: 1 },
        );
        assert_eq!(seq, 0);
    }

    #[test]
    fn test_emit_delivers_in_order() {
        let (tx, mut rx) = channel();
        let tx = Some(tx);
        let mut seq = 0;
        emit(&tx, "r", &mut seq, FetchEventKind::SessionOpened { session: 1 });
        emit(&tx, "r", &mut seq, FetchEventKind::SessionRotated { from: 1, to: 2 });
        assert_eq!(rx.try_recv().unwrap().seq, 1);
        assert_eq!(
            rx.try_recv().unwrap().event,
            FetchEventKind::SessionRotated { from: 1, to: 2 }
        );
    }
}
