// Copyright 2026 Sitecrawl Contributors
// SPDX-License-Identifier: Apache-2.0

//! Progress event types and broadcast channel for real-time crawl telemetry.
//!
//! Crawl workers emit `ProgressEvent`s while they run, which flow through a
//! `tokio::sync::broadcast` channel to all subscribers (CLI progress bar,
//! logs). When no subscriber exists, events are silently dropped.

use serde::{Deserialize, Serialize};

/// A progress event emitted by one crawl worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// The worker this event belongs to.
    pub worker: usize,
    /// Monotonically increasing sequence number (per worker).
    pub seq: u64,
    /// The kind of progress event.
    pub event: ProgressEventKind,
}

/// The specific kind of progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEventKind {
    /// A work item was picked up.
    ItemStarted { index: usize, target: String },
    /// The anti-bot layer interrupted a navigation.
    Interrupted {
        url: String,
        interruption: Interruption,
    },
    /// The browser engine was torn down and launched again.
    ContextRebuilt { url: String, rebuilds: u32 },
    /// A company name was resolved to page URLs.
    TargetResolved { index: usize, links: usize },
    /// A work item finished, with or without a record.
    ItemFinished {
        index: usize,
        succeeded: bool,
        elapsed_ms: u64,
    },
    /// A non-fatal warning occurred.
    Warning { message: String },
}

/// Which anti-bot interruption was seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interruption {
    Challenge,
    Blocked,
    Unrecognized,
}

impl std::fmt::Display for Interruption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Challenge => write!(f, "challenge"),
            Self::Blocked => write!(f, "blocked"),
            Self::Unrecognized => write!(f, "unrecognized"),
        }
    }
}

/// Sender handle for emitting progress events.
pub type ProgressSender = tokio::sync::broadcast::Sender<ProgressEvent>;

/// Receiver handle for consuming progress events.
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ProgressEvent>;

/// Create a new progress broadcast channel with a bounded buffer.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Per-worker emitter that stamps worker id and sequence numbers.
#[derive(Clone, Default)]
pub struct ProgressEmitter {
    tx: Option<ProgressSender>,
    worker: usize,
    seq: u64,
}

impl ProgressEmitter {
    pub fn new(tx: Option<ProgressSender>, worker: usize) -> Self {
        Self { tx, worker, seq: 0 }
    }

    /// Emit an event, ignoring send errors (no receivers listening).
    pub fn emit(&mut self, event: ProgressEventKind) {
        if let Some(ref sender) = self.tx {
            self.seq += 1;
            let _ = sender.send(ProgressEvent {
                worker: self.worker,
                seq: self.seq,
                event,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_event_serialization() {
        let event = ProgressEvent {
            worker: 2,
            seq: 1,
            event: ProgressEventKind::Interrupted {
                url: "https://acme.example/company".to_string(),
                interruption: Interruption::Blocked,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("Interrupted"));
        assert!(json.contains("Blocked"));

        let parsed: ProgressEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.worker, 2);
        assert_eq!(parsed.seq, 1);
    }

    #[tokio::test]
    async fn test_emitter_sequences_per_worker() {
        let (tx, mut rx) = channel();
        let mut emitter = ProgressEmitter::new(Some(tx), 3);
        emitter.emit(ProgressEventKind::Warning { message: "a".into() });
        emitter.emit(ProgressEventKind::Warning { message: "b".into() });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!((first.worker, first.seq), (3, 1));
        assert_eq!((second.worker, second.seq), (3, 2));
    }

    #[test]
    fn test_emit_without_receivers_or_sender() {
        let (tx, rx) = channel();
        drop(rx);
        ProgressEmitter::new(Some(tx), 0).emit(ProgressEventKind::Warning {
            message: "nobody listening".to_string(),
        });
        ProgressEmitter::default().emit(ProgressEventKind::Warning {
            message: "no channel".to_string(),
        });
    }

    #[test]
    fn test_interruption_display() {
        assert_eq!(Interruption::Challenge.to_string(), "challenge");
        assert_eq!(Interruption::Blocked.to_string(), "blocked");
    }
}
