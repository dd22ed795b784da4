//! Outcome of one command-protocol exchange.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// State code reported by a command exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorState {
    #[default]
    None,
    Ok,
    ArgumentInvalid,
    /// No address, or the connection could not be created.
    NetError,
    /// The request could not be handed to the transport.
    LocalRecvError,
    /// The exchange failed after the request was sent.
    LocalException,
    TimeOut,
}

impl OperatorState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Ok => "ok",
            Self::ArgumentInvalid => "argument_invalid",
            Self::NetError => "net_error",
            Self::LocalRecvError => "local_recv_error",
            Self::LocalException => "local_exception",
            Self::TimeOut => "time_out",
        }
    }
}

impl fmt::Display for OperatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A fault captured at the command boundary instead of being propagated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandFault {
    #[error("i/o failure: {0}")]
    Io(String),

    #[error("malformed frame: {0}")]
    Protocol(String),

    #[error("no reply within {secs}s")]
    Timeout { secs: u64 },

    #[error("connection closed before a reply arrived")]
    Closed,
}

/// Result of a single command exchange.
///
/// Produced fresh per call and never shared.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ZeroResult {
    /// True when the request was sent and a reply was received.
    pub interactive_success: bool,

    pub state: OperatorState,

    error_message: Option<String>,

    /// Fault captured during send/receive.
    pub fault: Option<CommandFault>,

    /// Raw OS error code from the transport.
    pub transport_error: Option<i32>,

    /// Reply text.
    pub result: Option<String>,
}

impl ZeroResult {
    /// A successful exchange carrying the reply text.
    pub fn ok(reply: impl Into<String>) -> Self {
        Self {
            interactive_success: true,
            state: OperatorState::Ok,
            result: Some(reply.into()),
            ..Default::default()
        }
    }

    /// A failure before anything reached the network.
    pub fn failure(state: OperatorState, message: impl Into<String>) -> Self {
        Self {
            interactive_success: false,
            state,
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    /// A failure caused by a captured fault.
    pub fn from_fault(state: OperatorState, fault: CommandFault) -> Self {
        Self {
            interactive_success: false,
            state,
            error_message: Some(fault.to_string()),
            fault: Some(fault),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_transport_error(mut self, code: Option<i32>) -> Self {
        self.transport_error = code;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.interactive_success && self.state == OperatorState::Ok
    }

    pub fn reply(&self) -> Option<&str> {
        self.result.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_result() {
        let result = ZeroResult::ok("pong");
        assert!(result.is_ok());
        assert_eq!(result.reply(), Some("pong"));
        assert!(result.fault.is_none());
    }

    #[test]
    fn test_fault_result_keeps_message() {
        let result = ZeroResult::from_fault(
            OperatorState::LocalException,
            CommandFault::Io("broken pipe".to_string()),
        );
        assert!(!result.interactive_success);
        assert_eq!(result.error_message(), Some("i/o failure: broken pipe"));
        assert!(matches!(result.fault, Some(CommandFault::Io(_))));
    }

    #[test]
    fn test_failure_with_transport_code() {
        let result = ZeroResult::failure(OperatorState::LocalRecvError, "send failed")
            .with_transport_error(Some(32));
        assert_eq!(result.state, OperatorState::LocalRecvError);
        assert_eq!(result.transport_error, Some(32));
        assert!(!result.is_ok());
    }
}
