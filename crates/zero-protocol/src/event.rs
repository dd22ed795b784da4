//! Event layout for the coordinator's monitor endpoint.
//!
//! ```text
//! [title][count][event byte][Station|Content ...][ExtendEnd]  data ...
//! ```
//!
//! The title is the kind's name and only serves as a topic; the event byte in
//! the description is authoritative.

use bytes::Bytes;
use zero_core::{ZeroEvent, ZeroEventKind};

use crate::codec::Multipart;
use crate::command::frame_text;
use crate::frame::{Description, FrameType};
use crate::ProtocolError;

/// Encodes an event as a multi-part message.
pub fn encode_event(event: &ZeroEvent) -> Result<Multipart, ProtocolError> {
    let mut frame_types = Vec::with_capacity(2);
    let mut data = Vec::with_capacity(2);

    if let Some(station) = event.station_name() {
        frame_types.push(FrameType::Station);
        data.push(Bytes::copy_from_slice(station.as_bytes()));
    }
    if let Some(content) = event.content() {
        frame_types.push(FrameType::Content);
        data.push(Bytes::copy_from_slice(content.as_bytes()));
    }

    let description = Description::new(event.kind.as_byte(), frame_types)?;

    let mut message = Vec::with_capacity(data.len() + 2);
    message.push(Bytes::from_static(event.kind.name().as_bytes()));
    message.push(description.encode());
    message.extend(data);
    Ok(message)
}

/// Decodes a multi-part message into an event.
///
/// Frames tagged with anything other than `Station` or `Content` are
/// skipped.
pub fn decode_event(message: &Multipart) -> Result<ZeroEvent, ProtocolError> {
    let mut frames = message.iter();
    let _title = frames.next().ok_or(ProtocolError::EmptyMessage)?;
    let head = frames.next().ok_or(ProtocolError::MissingDescription)?;

    let description = Description::parse(head)?;
    let kind = ZeroEventKind::from_byte(description.head)
        .ok_or(ProtocolError::UnknownEvent(description.head))?;

    let data: Vec<&Bytes> = frames.collect();
    if data.len() < description.frame_count() {
        return Err(ProtocolError::FrameCountMismatch {
            announced: description.frame_count(),
            actual: data.len(),
        });
    }

    let mut event = ZeroEvent::new(kind);
    for (frame_type, frame) in description.frame_types.iter().zip(data) {
        match frame_type {
            FrameType::Station => event.station = Some(frame_text(frame)?),
            FrameType::Content => event.content = Some(frame_text(frame)?),
            _ => {}
        }
    }
    Ok(event)
}
