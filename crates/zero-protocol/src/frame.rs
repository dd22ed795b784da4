//! Frame-type tags and command bytes shared by both message layouts.
//!
//! Every multi-part message starts (or, for events, continues after the
//! title) with a *description frame*:
//!
//! ```text
//! [frame count][command or event byte][frame type]*N[marker...][ExtendEnd]
//! ```
//!
//! The frame-type bytes tell the receiver what each following data frame
//! carries.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::ProtocolError;

/// Tag describing the content of one data frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Terminates a description with no extension.
    End = 0,
    /// Command name (first argument of a by-name call).
    Command = b'$',
    /// Plain argument.
    Argument = b'%',
    /// Service key appended by the request socket.
    ServiceKey = b'*',
    /// Station name in an event message.
    Station = b'S',
    /// Text or JSON payload in an event message.
    Content = b'T',
    /// Terminates an extended description.
    ExtendEnd = 0xFF,
}

impl FrameType {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::End),
            b'$' => Some(Self::Command),
            b'%' => Some(Self::Argument),
            b'*' => Some(Self::ServiceKey),
            b'S' => Some(Self::Station),
            b'T' => Some(Self::Content),
            0xFF => Some(Self::ExtendEnd),
            _ => None,
        }
    }

    /// Returns true for the two description terminators.
    pub fn is_terminator(self) -> bool {
        matches!(self, Self::End | Self::ExtendEnd)
    }
}

/// Command byte carried in the second position of a request description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ByteCommand {
    /// Call-by-name: the command is the first argument frame.
    General = 0x01,
    Ping = 0x02,
    HeartJoin = 0x03,
    HeartReady = 0x04,
    HeartPitpat = 0x05,
    HeartLeft = 0x06,
}

impl ByteCommand {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::General),
            0x02 => Some(Self::Ping),
            0x03 => Some(Self::HeartJoin),
            0x04 => Some(Self::HeartReady),
            0x05 => Some(Self::HeartPitpat),
            0x06 => Some(Self::HeartLeft),
            _ => None,
        }
    }
}

impl fmt::Display for ByteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::General => "general",
            Self::Ping => "ping",
            Self::HeartJoin => "heart_join",
            Self::HeartReady => "heart_ready",
            Self::HeartPitpat => "heart_pitpat",
            Self::HeartLeft => "heart_left",
        };
        f.write_str(name)
    }
}

/// Largest number of data frames one description can announce.
///
/// The count byte also covers the trailing marker frame, so 254 data frames
/// is the ceiling.
pub const MAX_DATA_FRAMES: usize = 254;

/// A parsed or to-be-encoded description frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Description {
    /// Command byte (requests) or event byte (events).
    pub head: u8,
    /// One tag per following data frame, markers included.
    pub frame_types: Vec<FrameType>,
}

impl Description {
    pub fn new(head: u8, frame_types: Vec<FrameType>) -> Result<Self, ProtocolError> {
        if frame_types.len() > MAX_DATA_FRAMES + 1 {
            return Err(ProtocolError::TooManyFrames {
                count: frame_types.len(),
                max: MAX_DATA_FRAMES + 1,
            });
        }
        Ok(Self { head, frame_types })
    }

    /// Number of frames announced by the count byte.
    pub fn frame_count(&self) -> usize {
        self.frame_types.len()
    }

    /// Encodes as `[count][head][types...][ExtendEnd]`.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.frame_types.len() + 3);
        // Bounded by `new`
        buf.put_u8(self.frame_types.len() as u8);
        buf.put_u8(self.head);
        for frame_type in &self.frame_types {
            buf.put_u8(frame_type.as_byte());
        }
        buf.put_u8(FrameType::ExtendEnd.as_byte());
        buf.freeze()
    }

    /// Parses a description frame.
    ///
    /// The count byte must agree with the number of tags before the
    /// terminator.
    pub fn parse(frame: &[u8]) -> Result<Self, ProtocolError> {
        let (&count, rest) = frame.split_first().ok_or(ProtocolError::MissingDescription)?;
        let (&head, tags) = rest.split_first().ok_or(ProtocolError::MissingDescription)?;

        let mut frame_types = Vec::with_capacity(count as usize);
        let mut terminated = false;
        for &byte in tags {
            let frame_type =
                FrameType::from_byte(byte).ok_or(ProtocolError::UnknownFrameType(byte))?;
            if frame_type.is_terminator() {
                terminated = true;
                break;
            }
            frame_types.push(frame_type);
        }

        if !terminated {
            return Err(ProtocolError::MissingDescription);
        }
        if frame_types.len() != count as usize {
            return Err(ProtocolError::FrameCountMismatch {
                announced: count as usize,
                actual: frame_types.len(),
            });
        }
        Ok(Self { head, frame_types })
    }
}
