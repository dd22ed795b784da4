//! Monitor event kinds published by the coordinator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of events published on the coordinator's monitor endpoint.
///
/// The set is closed. Each kind carries a fixed wire byte: system events use
/// `0x01..=0x04`, station events `0x10..=0x1A`, client events `0x20..=0x21`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZeroEventKind {
    CenterSystemStart,
    CenterSystemClosing,
    CenterSystemStop,
    CenterWorkerSoundOff,
    CenterStationState,
    CenterStationInstall,
    CenterStationUpdate,
    CenterStationJoin,
    CenterStationPause,
    CenterStationResume,
    CenterStationClosing,
    CenterStationLeft,
    CenterStationStop,
    CenterStationRemove,
    CenterStationDocument,
    CenterClientJoin,
    CenterClientLeft,
}

/// Visibility tier of an event kind.
///
/// Global events are always processed; station events are dropped unless the
/// process is in run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTier {
    Global,
    Station,
}

impl ZeroEventKind {
    /// Every kind, in wire-byte order.
    pub const ALL: [ZeroEventKind; 17] = [
        Self::CenterSystemStart,
        Self::CenterSystemClosing,
        Self::CenterSystemStop,
        Self::CenterWorkerSoundOff,
        Self::CenterStationState,
        Self::CenterStationInstall,
        Self::CenterStationUpdate,
        Self::CenterStationJoin,
        Self::CenterStationPause,
        Self::CenterStationResume,
        Self::CenterStationClosing,
        Self::CenterStationLeft,
        Self::CenterStationStop,
        Self::CenterStationRemove,
        Self::CenterStationDocument,
        Self::CenterClientJoin,
        Self::CenterClientLeft,
    ];

    pub fn as_byte(&self) -> u8 {
        match self {
            Self::CenterSystemStart => 0x01,
            Self::CenterSystemClosing => 0x02,
            Self::CenterSystemStop => 0x03,
            Self::CenterWorkerSoundOff => 0x04,
            Self::CenterStationState => 0x10,
            Self::CenterStationInstall => 0x11,
            Self::CenterStationUpdate => 0x12,
            Self::CenterStationJoin => 0x13,
            Self::CenterStationPause => 0x14,
            Self::CenterStationResume => 0x15,
            Self::CenterStationClosing => 0x16,
            Self::CenterStationLeft => 0x17,
            Self::CenterStationStop => 0x18,
            Self::CenterStationRemove => 0x19,
            Self::CenterStationDocument => 0x1A,
            Self::CenterClientJoin => 0x20,
            Self::CenterClientLeft => 0x21,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.as_byte() == byte)
    }

    pub fn tier(&self) -> EventTier {
        match self {
            Self::CenterSystemStart
            | Self::CenterSystemClosing
            | Self::CenterSystemStop
            | Self::CenterWorkerSoundOff => EventTier::Global,
            _ => EventTier::Station,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CenterSystemStart => "CenterSystemStart",
            Self::CenterSystemClosing => "CenterSystemClosing",
            Self::CenterSystemStop => "CenterSystemStop",
            Self::CenterWorkerSoundOff => "CenterWorkerSoundOff",
            Self::CenterStationState => "CenterStationState",
            Self::CenterStationInstall => "CenterStationInstall",
            Self::CenterStationUpdate => "CenterStationUpdate",
            Self::CenterStationJoin => "CenterStationJoin",
            Self::CenterStationPause => "CenterStationPause",
            Self::CenterStationResume => "CenterStationResume",
            Self::CenterStationClosing => "CenterStationClosing",
            Self::CenterStationLeft => "CenterStationLeft",
            Self::CenterStationStop => "CenterStationStop",
            Self::CenterStationRemove => "CenterStationRemove",
            Self::CenterStationDocument => "CenterStationDocument",
            Self::CenterClientJoin => "CenterClientJoin",
            Self::CenterClientLeft => "CenterClientLeft",
        }
    }
}

impl fmt::Display for ZeroEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded unit from the monitor stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZeroEvent {
    pub kind: ZeroEventKind,

    /// Target station; `None` for process-global events.
    pub station: Option<String>,

    /// JSON document or plain text, depending on the kind.
    pub content: Option<String>,
}

impl ZeroEvent {
    pub fn new(kind: ZeroEventKind) -> Self {
        Self {
            kind,
            station: None,
            content: None,
        }
    }

    /// Creates a station-scoped event.
    pub fn station(kind: ZeroEventKind, station: impl Into<String>) -> Self {
        Self {
            kind,
            station: Some(station.into()),
            content: None,
        }
    }

    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn station_name(&self) -> Option<&str> {
        self.station.as_deref()
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }
}
