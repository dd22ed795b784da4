//! zero protocol - Binary frame layouts for mesh communication
//!
//! This crate provides the multi-part framing used on the coordinator's two
//! endpoints: command requests to the management address and lifecycle
//! events from the monitor address.

pub mod codec;
pub mod command;
pub mod error;
pub mod event;
pub mod frame;

pub use codec::{Multipart, MultipartCodec, DEFAULT_MAX_MESSAGE_SIZE};
pub use command::{byte_request, general_request, CommandRequest};
pub use error::ProtocolError;
pub use event::{decode_event, encode_event};
pub use frame::{ByteCommand, Description, FrameType, MAX_DATA_FRAMES};
