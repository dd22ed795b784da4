//! Monitor loop: the long-running subscription to coordinator events.
//!
//! One task runs [`MonitorLoop::run`] for the life of a service process. Each
//! iteration opens a session against the monitor endpoint and polls it with
//! a bounded wait, decoding and dispatching events strictly in order.
//!
//! A session ends when the connection fails, closes, or stays silent for
//! longer than the silence limit. The loop then marks the coordinator link
//! `Failed`, waits a fixed delay and opens a new session. It retries forever
//! until cancelled.
//!
//! # Panic-Free Guarantees
//!
//! Undecodable events are logged and skipped. A stream the codec cannot
//! frame, and any transport failure, end the session and are retried.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zero_protocol::decode_event;

use crate::app::Application;
use crate::transport::{EventSource, MonitorConnector, TransportError};

mod dispatch;

pub use dispatch::dispatch;

/// Bounded wait for one poll.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Silence after which a session is considered dead.
pub const SILENCE_TIMEOUT: Duration = Duration::from_secs(60);

/// Delay before reopening a dead session.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Timing knobs for the monitor loop.
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub poll_timeout: Duration,
    pub silence_timeout: Duration,
    pub retry_delay: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            poll_timeout: POLL_TIMEOUT,
            silence_timeout: SILENCE_TIMEOUT,
            retry_delay: RETRY_DELAY,
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Cancelled,
    Silent,
    Closed,
    /// The stream delivered bytes that do not frame as a message.
    Corrupt,
    Failed,
}

pub struct MonitorLoop {
    app: Arc<Application>,
    connector: Arc<dyn MonitorConnector>,
    options: MonitorOptions,
    cancel: CancellationToken,
    ready: Arc<Semaphore>,
}

impl MonitorLoop {
    pub fn new(
        app: Arc<Application>,
        connector: Arc<dyn MonitorConnector>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            app,
            connector,
            options: MonitorOptions::default(),
            cancel,
            ready: Arc::new(Semaphore::new(0)),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: MonitorOptions) -> Self {
        self.options = options;
        self
    }

    /// Readiness signal: one permit is released when polling starts and one
    /// more when the loop exits.
    pub fn ready(&self) -> Arc<Semaphore> {
        Arc::clone(&self.ready)
    }

    /// Runs until the cancellation token fires.
    pub async fn run(self) {
        let address = self.app.config().monitor_address.clone();
        let identity = self.app.config().identity.clone();
        info!(%address, "Monitor loop started");
        self.ready.add_permits(1);

        while !self.cancel.is_cancelled() {
            let end = match self.connector.connect(&address, &identity).await {
                Ok(source) => self.session(source).await,
                Err(e) => {
                    warn!(%address, error = %e, "Monitor connect failed");
                    SessionEnd::Failed
                }
            };

            if end == SessionEnd::Cancelled || self.cancel.is_cancelled() {
                break;
            }

            warn!(reason = ?end, "Monitor session ended, coordinator marked failed");
            self.app.connection_lost();

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(self.options.retry_delay) => {}
            }
        }

        self.ready.add_permits(1);
        info!("Monitor loop stopped");
    }

    async fn session(&self, mut source: Box<dyn EventSource>) -> SessionEnd {
        let mut silent_since: Option<Instant> = None;

        loop {
            let polled = tokio::select! {
                _ = self.cancel.cancelled() => return SessionEnd::Cancelled,
                polled = timeout(self.options.poll_timeout, source.next_message()) => polled,
            };

            match polled {
                Err(_) => {
                    let since = *silent_since.get_or_insert_with(Instant::now);
                    if since.elapsed() > self.options.silence_timeout {
                        return SessionEnd::Silent;
                    }
                }
                Ok(Ok(Some(message))) => {
                    silent_since = None;
                    match decode_event(&message) {
                        Ok(event) => dispatch(&self.app, event).await,
                        Err(e) => debug!(error = %e, "Skipped undecodable monitor message"),
                    }
                }
                Ok(Ok(None)) => return SessionEnd::Closed,
                // Framing is lost once the codec rejects the stream
                Ok(Err(TransportError::Protocol(e))) if e.is_malformed() => {
                    warn!(error = %e, "Monitor stream corrupt");
                    return SessionEnd::Corrupt;
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Monitor receive failed");
                    return SessionEnd::Failed;
                }
            }
        }
    }
}
