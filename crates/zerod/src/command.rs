//! Command client for the coordinator's management endpoint.
//!
//! Each call opens its own [`RequestSocket`], sends one request, waits for
//! one reply and drops the socket on every exit path. Failures never escape
//! as errors: they are folded into the returned [`ZeroResult`].

use std::time::Duration;

use bytes::Bytes;
use tokio::time::timeout;
use tracing::{debug, warn};
use zero_core::{CommandFault, OperatorState, ZeroResult};
use zero_protocol::command::frame_text;
use zero_protocol::{byte_request, general_request, ByteCommand, Multipart, ProtocolError};

use crate::config::ZeroAppConfig;
use crate::transport::{RequestSocket, TransportError};

/// Default bound on the wait for a reply.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Issues management commands.
#[derive(Debug, Clone)]
pub struct CommandClient {
    manage_address: Option<String>,
    service_key: Bytes,
    identity: Bytes,
    reply_timeout: Duration,
}

impl CommandClient {
    pub fn new(manage_address: Option<String>, service_key: impl Into<Bytes>) -> Self {
        Self {
            manage_address,
            service_key: service_key.into(),
            identity: Bytes::from_static(b"Dispatcher"),
            reply_timeout: REPLY_TIMEOUT,
        }
    }

    pub fn from_config(config: &ZeroAppConfig) -> Self {
        Self::new(
            Some(config.manage_address.clone()),
            config.service_key.clone().into_bytes(),
        )
        .with_identity(format!("{}-Dispatcher", config.real_name).into_bytes())
    }

    #[must_use]
    pub fn with_identity(mut self, identity: impl Into<Bytes>) -> Self {
        self.identity = identity.into();
        self
    }

    #[must_use]
    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    pub fn manage_address(&self) -> Option<&str> {
        self.manage_address.as_deref()
    }

    /// Calls a command by name; `args[0]` is the command.
    pub async fn call_command<S: AsRef<str>>(&self, args: &[S]) -> ZeroResult {
        if args.is_empty() {
            return ZeroResult::failure(OperatorState::ArgumentInvalid, "command name is required");
        }
        match general_request(args) {
            Ok(message) => self.exchange(message).await,
            Err(e) => ZeroResult::failure(OperatorState::ArgumentInvalid, e.to_string()),
        }
    }

    /// Sends a byte command and reports whether the exchange completed.
    pub async fn byte_command<S: AsRef<str>>(&self, command: ByteCommand, args: &[S]) -> bool {
        match byte_request(command, args) {
            Ok(message) => self.exchange(message).await.interactive_success,
            Err(e) => {
                warn!(%command, error = %e, "Byte command rejected");
                false
            }
        }
    }

    async fn exchange(&self, message: Multipart) -> ZeroResult {
        let Some(address) = self.manage_address.as_deref() else {
            return ZeroResult::failure(
                OperatorState::NetError,
                "management address is not configured",
            );
        };

        let mut socket =
            match RequestSocket::connect(address, self.service_key.clone(), &self.identity).await {
                Ok(socket) => socket,
                Err(e) => {
                    debug!(%address, error = %e, "Command connect failed");
                    return ZeroResult::failure(OperatorState::NetError, e.to_string())
                        .with_transport_error(e.raw_os_error());
                }
            };

        if let Err(e) = socket.send(message).await {
            warn!(%address, error = %e, "Command send failed");
            return ZeroResult::from_fault(OperatorState::LocalRecvError, fault_of(&e))
                .with_transport_error(e.raw_os_error());
        }

        let reply = match timeout(self.reply_timeout, socket.receive()).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!(%address, error = %e, "Command reply failed");
                return ZeroResult::from_fault(OperatorState::LocalException, fault_of(&e))
                    .with_transport_error(e.raw_os_error());
            }
            Err(_) => {
                warn!(%address, "Command reply timed out");
                return ZeroResult::from_fault(
                    OperatorState::TimeOut,
                    CommandFault::Timeout {
                        secs: self.reply_timeout.as_secs(),
                    },
                );
            }
        };

        let Some(first) = reply.first() else {
            return ZeroResult::failure(OperatorState::LocalRecvError, "empty reply");
        };
        match frame_text(first) {
            Ok(text) => ZeroResult::ok(text),
            Err(e) => ZeroResult::from_fault(
                OperatorState::LocalException,
                CommandFault::Protocol(e.to_string()),
            ),
        }
    }
}

fn fault_of(err: &TransportError) -> CommandFault {
    match err {
        TransportError::Closed => CommandFault::Closed,
        TransportError::Protocol(ProtocolError::Io(e)) => CommandFault::Io(e.to_string()),
        TransportError::Protocol(e) => CommandFault::Protocol(e.to_string()),
        other => CommandFault::Io(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_address_is_net_error() {
        let client = CommandClient::new(None, Bytes::from_static(b"key"));
        let result = client.call_command(&["ping"]).await;

        assert_eq!(result.state, OperatorState::NetError);
        assert!(!result.interactive_success);
        assert!(result.error_message().is_some());
    }

    #[tokio::test]
    async fn test_empty_args_rejected() {
        let client = CommandClient::new(Some("127.0.0.1:1".to_string()), Bytes::new());
        let result = client.call_command::<&str>(&[]).await;
        assert_eq!(result.state, OperatorState::ArgumentInvalid);
    }

    #[tokio::test]
    async fn test_too_many_args_rejected() {
        let client = CommandClient::new(Some("127.0.0.1:1".to_string()), Bytes::new());
        let args = vec!["x"; 300];
        let result = client.call_command(&args).await;
        assert_eq!(result.state, OperatorState::ArgumentInvalid);
    }
}
