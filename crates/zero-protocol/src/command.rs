//! Request layout for the coordinator's management endpoint.
//!
//! A request is a description frame followed by one data frame per argument.
//! The request socket appends the service-key frame itself, so the
//! description already announces it:
//!
//! ```text
//! [count][command][Command|Argument ...][ServiceKey][ExtendEnd]  arg0  arg1 ...  <key>
//! ```

use bytes::Bytes;

use crate::codec::Multipart;
use crate::frame::{ByteCommand, Description, FrameType, MAX_DATA_FRAMES};
use crate::ProtocolError;

/// Builds the description for a call-by-name request.
///
/// The first argument is the command name and is tagged `Command`; the rest
/// are tagged `Argument`.
pub fn general_description(arg_count: usize) -> Result<Description, ProtocolError> {
    check_arg_count(arg_count)?;
    let mut frame_types = Vec::with_capacity(arg_count + 1);
    for index in 0..arg_count {
        frame_types.push(if index == 0 {
            FrameType::Command
        } else {
            FrameType::Argument
        });
    }
    frame_types.push(FrameType::ServiceKey);
    Description::new(ByteCommand::General.as_byte(), frame_types)
}

/// Builds the description for a byte command; every argument is tagged
/// `Argument`.
pub fn byte_description(
    command: ByteCommand,
    arg_count: usize,
) -> Result<Description, ProtocolError> {
    check_arg_count(arg_count)?;
    let mut frame_types = vec![FrameType::Argument; arg_count];
    frame_types.push(FrameType::ServiceKey);
    Description::new(command.as_byte(), frame_types)
}

/// Builds a call-by-name request without the trailing service key.
pub fn general_request<S: AsRef<str>>(args: &[S]) -> Result<Multipart, ProtocolError> {
    let description = general_description(args.len())?;
    Ok(with_args(description, args))
}

/// Builds a byte-command request without the trailing service key.
pub fn byte_request<S: AsRef<str>>(
    command: ByteCommand,
    args: &[S],
) -> Result<Multipart, ProtocolError> {
    let description = byte_description(command, args.len())?;
    Ok(with_args(description, args))
}

fn with_args<S: AsRef<str>>(description: Description, args: &[S]) -> Multipart {
    let mut message = Vec::with_capacity(args.len() + 2);
    message.push(description.encode());
    message.extend(
        args.iter()
            .map(|arg| Bytes::copy_from_slice(arg.as_ref().as_bytes())),
    );
    message
}

fn check_arg_count(arg_count: usize) -> Result<(), ProtocolError> {
    if arg_count > MAX_DATA_FRAMES {
        return Err(ProtocolError::TooManyFrames {
            count: arg_count,
            max: MAX_DATA_FRAMES,
        });
    }
    Ok(())
}

/// A request as seen by the receiving side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub command: ByteCommand,
    /// Command name for `General` requests.
    pub name: Option<String>,
    pub args: Vec<String>,
    pub service_key: Option<Bytes>,
}

impl CommandRequest {
    /// Parses a complete request (service key included).
    pub fn parse(message: &Multipart) -> Result<Self, ProtocolError> {
        let (head, data) = message.split_first().ok_or(ProtocolError::EmptyMessage)?;
        let description = Description::parse(head)?;
        let command = ByteCommand::from_byte(description.head)
            .ok_or(ProtocolError::UnknownCommand(description.head))?;

        if description.frame_count() != data.len() {
            return Err(ProtocolError::FrameCountMismatch {
                announced: description.frame_count(),
                actual: data.len(),
            });
        }

        let mut request = Self {
            command,
            name: None,
            args: Vec::new(),
            service_key: None,
        };
        for (frame_type, frame) in description.frame_types.iter().zip(data) {
            match frame_type {
                FrameType::Command => request.name = Some(frame_text(frame)?),
                FrameType::Argument => request.args.push(frame_text(frame)?),
                FrameType::ServiceKey => request.service_key = Some(frame.clone()),
                other => return Err(ProtocolError::UnknownFrameType(other.as_byte())),
            }
        }
        Ok(request)
    }
}

/// Decodes a frame as UTF-8 text.
pub fn frame_text(frame: &Bytes) -> Result<String, ProtocolError> {
    Ok(String::from_utf8(frame.to_vec())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_general_description_tags() {
        let description = general_description(3).unwrap();
        assert_eq!(
            &description.encode()[..],
            &[4, 0x01, b'$', b'%', b'%', b'*', 0xFF]
        );
    }

    #[test]
    fn test_byte_description_tags_every_argument() {
        let description = byte_description(ByteCommand::Ping, 2).unwrap();
        assert_eq!(&description.encode()[..], &[3, 0x02, b'%', b'%', b'*', 0xFF]);

        let empty = byte_description(ByteCommand::Ping, 0).unwrap();
        assert_eq!(&empty.encode()[..], &[1, 0x02, b'*', 0xFF]);
    }

    #[test]
    fn test_frame_limit() {
        assert!(general_description(MAX_DATA_FRAMES).is_ok());
        assert!(matches!(
            general_description(MAX_DATA_FRAMES + 1),
            Err(ProtocolError::TooManyFrames { count: 255, .. })
        ));
    }

    #[test]
    fn test_request_parses_back() {
        let mut message = general_request(&["host", "*"]).unwrap();
        assert_eq!(message.len(), 3);
        message.push(Bytes::from_static(b"key12345"));

        let request = CommandRequest::parse(&message).unwrap();
        assert_eq!(request.command, ByteCommand::General);
        assert_eq!(request.name.as_deref(), Some("host"));
        assert_eq!(request.args, vec!["*".to_string()]);
        assert_eq!(request.service_key.as_deref(), Some(&b"key12345"[..]));
    }

    #[test]
    fn test_request_without_key_is_rejected() {
        let message = byte_request(ByteCommand::HeartJoin, &["api"]).unwrap();
        assert!(matches!(
            CommandRequest::parse(&message),
            Err(ProtocolError::FrameCountMismatch { announced: 2, actual: 1 })
        ));
    }
}
