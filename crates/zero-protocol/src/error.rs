//! Errors raised while building or parsing frames.

use thiserror::Error;

/// Errors that can occur while encoding or decoding multi-part messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Too many data frames: {count} (max {max})")]
    TooManyFrames { count: usize, max: usize },

    #[error("Message has no frames")]
    EmptyMessage,

    #[error("Description frame is missing or truncated")]
    MissingDescription,

    #[error("Description announces {announced} frames but message carries {actual}")]
    FrameCountMismatch { announced: usize, actual: usize },

    #[error("Unknown frame type 0x{0:02x}")]
    UnknownFrameType(u8),

    #[error("Unknown event byte 0x{0:02x}")]
    UnknownEvent(u8),

    #[error("Unknown command byte 0x{0:02x}")]
    UnknownCommand(u8),

    #[error("Frame is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns true if the error was caused by the content of one message
    /// rather than by the underlying stream.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_versus_stream_errors() {
        assert!(ProtocolError::MessageTooLarge { size: 10, max: 5 }.is_malformed());
        assert!(ProtocolError::UnknownEvent(0x7f).is_malformed());

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(!ProtocolError::from(io).is_malformed());
    }
}
