//! Notification channel for recognition updates
//!
//! Partial results, final results and engine error codes are pushed to any
//! number of passive listeners, independently of whether the request that
//! opened the session is still pending.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Events published to listeners
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Notification {
    /// Partial or final transcript candidates
    #[serde(rename = "onResult")]
    OnResult {
        matches: Vec<String>,
        #[serde(rename = "final")]
        is_final: bool,
    },

    /// Error code reported by the recognition engine
    #[serde(rename = "onError")]
    OnError { error: i32 },
}

impl Notification {
    /// Event name as seen by listeners
    pub fn name(&self) -> &'static str {
        match self {
            Notification::OnResult { .. } => "onResult",
            Notification::OnError { .. } => "onError",
        }
    }
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notification::OnResult { matches, is_final } => {
                write!(f, "ON_RESULT ({} matches, final={})", matches.len(), is_final)
            }
            Notification::OnError { error } => write!(f, "ON_ERROR ({})", error),
        }
    }
}

/// Fire-and-forget publisher over a broadcast channel.
///
/// Publishing never waits: with no listeners the event is dropped, and a
/// listener that falls behind loses the oldest events instead.
#[derive(Debug, Clone)]
pub struct NotificationChannel {
    tx: broadcast::Sender<Notification>,
}

impl NotificationChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Register a new listener
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn publish(&self, notification: Notification) {
        debug!(
            event = notification.name(),
            listeners = self.tx.receiver_count(),
            "publishing notification"
        );
        let _ = self.tx.send(notification);
    }
}
