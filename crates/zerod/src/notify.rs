//! Notifications raised by the monitor loop and the application.
//!
//! Notifications are fanned out over a `tokio::sync::broadcast` channel.
//! Publishing never blocks and never fails: with no subscribers the
//! notification is simply dropped.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::trace;
use zero_core::{StationConfig, ZeroEventKind};

/// Channel capacity; slow subscribers observe `Lagged`.
const NOTIFY_BUFFER: usize = 256;

/// What happened.
#[derive(Debug, Clone, PartialEq)]
pub enum ZeroNotification {
    /// The coordinator connection is up and the registry is in sync.
    ZeroStart,

    /// The coordinator connection was lost or closed.
    ZeroEnd,

    /// The coordinator asked live processes to report in.
    Heartbeat,

    /// A process-global event was received.
    SystemEvent { kind: ZeroEventKind },

    /// A station's stored state changed.
    StationStateChanged { config: Box<StationConfig> },

    /// A station-scoped event was handled.
    StationEvent {
        kind: ZeroEventKind,
        station: String,
        content: Option<String>,
        /// Station config after the handler ran; the removed value on uninstall
        config: Option<Box<StationConfig>>,
    },
}

/// A notification with the time it was raised.
#[derive(Debug, Clone)]
pub struct Notification {
    pub raised_at: DateTime<Utc>,
    pub payload: ZeroNotification,
}

/// Cheap-to-clone sender side of the notification channel.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(NOTIFY_BUFFER);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn publish(&self, payload: ZeroNotification) {
        trace!(?payload, "Notification");
        let _ = self.sender.send(Notification {
            raised_at: Utc::now(),
            payload,
        });
    }

    pub fn station_state_changed(&self, config: &StationConfig) {
        self.publish(ZeroNotification::StationStateChanged {
            config: Box::new(config.clone()),
        });
    }

    pub fn station_event(
        &self,
        kind: ZeroEventKind,
        station: &str,
        content: Option<String>,
        config: Option<&StationConfig>,
    ) {
        self.publish(ZeroNotification::StationEvent {
            kind,
            station: station.to_string(),
            content,
            config: config.map(|c| Box::new(c.clone())),
        });
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
