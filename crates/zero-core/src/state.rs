//! Lifecycle states for stations, the coordinator and the local process.
//!
//! Two independent state machines live here:
//!
//! - [`StationState`] is attached to every station config and is also used
//!   for the coordinator status (which additionally takes `Failed`).
//! - [`AppState`] is the process-wide lifecycle driven by monitor events.
//!
//! Both are stored in an [`AtomicState`] when shared across tasks so the
//! dispatch path never takes a lock to read or transition them.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::DomainError;

// ============================================================================
// Byte-backed states
// ============================================================================

/// A small state enum that can be stored in a single byte.
pub trait ByteState: Copy + Eq {
    /// Value reported when a stored byte does not map to any variant.
    const FALLBACK: Self;

    fn to_byte(self) -> u8;

    fn from_byte(byte: u8) -> Option<Self>;
}

/// Lock-free cell holding a [`ByteState`].
///
/// Transitions that must not double-fire under concurrent delivery go through
/// [`AtomicState::compare_exchange`].
pub struct AtomicState<S> {
    value: AtomicU8,
    _marker: PhantomData<fn() -> S>,
}

impl<S: ByteState> AtomicState<S> {
    pub fn new(initial: S) -> Self {
        Self {
            value: AtomicU8::new(initial.to_byte()),
            _marker: PhantomData,
        }
    }

    pub fn load(&self) -> S {
        S::from_byte(self.value.load(Ordering::Acquire)).unwrap_or(S::FALLBACK)
    }

    pub fn store(&self, state: S) {
        self.value.store(state.to_byte(), Ordering::Release);
    }

    /// Stores `new` only if the current value is exactly `current`.
    ///
    /// Returns the previous value on success and the observed value on failure,
    /// mirroring [`AtomicU8::compare_exchange`].
    pub fn compare_exchange(&self, current: S, new: S) -> Result<S, S> {
        self.value
            .compare_exchange(
                current.to_byte(),
                new.to_byte(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|b| S::from_byte(b).unwrap_or(S::FALLBACK))
            .map_err(|b| S::from_byte(b).unwrap_or(S::FALLBACK))
    }

    /// Stores `new` and returns the previous value.
    pub fn swap(&self, new: S) -> S {
        S::from_byte(self.value.swap(new.to_byte(), Ordering::AcqRel)).unwrap_or(S::FALLBACK)
    }
}

impl<S: ByteState + fmt::Debug> fmt::Debug for AtomicState<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicState").field(&self.load()).finish()
    }
}

impl<S: ByteState + Default> Default for AtomicState<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

// ============================================================================
// Station State
// ============================================================================

/// Lifecycle state of a station (and of the coordinator itself).
///
/// Variants are ordered so that the shutdown chain
/// `Closing < Closed < Stop < Remove < Destroy` can be enforced with `max`.
/// `Failed` is only ever set on the coordinator status.
///
/// Serialized as its integer value, matching the `station_state` field the
/// coordinator publishes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "i64")]
pub enum StationState {
    /// Installed but not yet joined.
    #[default]
    None = 0,
    Run = 1,
    Pause = 2,
    /// Coordinator connection lost; never set on a station entry.
    Failed = 3,
    Closing = 4,
    Closed = 5,
    Stop = 6,
    Remove = 7,
    Destroy = 8,
}

impl StationState {
    /// Moves forward to `floor` unless already at or past it.
    ///
    /// Used by the closing/left/stop handlers so a station never regresses
    /// once it has started shutting down.
    #[must_use]
    pub fn advance_to(self, floor: Self) -> Self {
        self.max(floor)
    }

    /// Returns true if the station is accepting work.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Run)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Run => "run",
            Self::Pause => "pause",
            Self::Failed => "failed",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Stop => "stop",
            Self::Remove => "remove",
            Self::Destroy => "destroy",
        }
    }
}

impl ByteState for StationState {
    const FALLBACK: Self = Self::None;

    fn to_byte(self) -> u8 {
        self as u8
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::None),
            1 => Some(Self::Run),
            2 => Some(Self::Pause),
            3 => Some(Self::Failed),
            4 => Some(Self::Closing),
            5 => Some(Self::Closed),
            6 => Some(Self::Stop),
            7 => Some(Self::Remove),
            8 => Some(Self::Destroy),
            _ => None,
        }
    }
}

impl TryFrom<i64> for StationState {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .and_then(Self::from_byte)
            .ok_or_else(|| DomainError::InvalidFieldValue {
                field: "station_state".to_string(),
                value: value.to_string(),
                expected: "0..=8".to_string(),
            })
    }
}

impl From<StationState> for i64 {
    fn from(state: StationState) -> Self {
        i64::from(state.to_byte())
    }
}

impl fmt::Display for StationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Process-wide lifecycle state.
///
/// Only two transitions are guarded by compare-and-exchange:
/// `Failed -> Initialized` on coordinator start and `Run -> Closing` on
/// coordinator closing. Closing ends in `Failed`, not in a distinct stopped
/// state, so the next coordinator start rejoins uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    Failed,
    #[default]
    Initialized,
    Run,
    Closing,
}

impl AppState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Failed => "failed",
            Self::Initialized => "initialized",
            Self::Run => "run",
            Self::Closing => "closing",
        }
    }
}

impl ByteState for AppState {
    const FALLBACK: Self = Self::Failed;

    fn to_byte(self) -> u8 {
        match self {
            Self::Failed => 0,
            Self::Initialized => 1,
            Self::Run => 2,
            Self::Closing => 3,
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Failed),
            1 => Some(Self::Initialized),
            2 => Some(Self::Run),
            3 => Some(Self::Closing),
            _ => None,
        }
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_chain_is_monotonic() {
        assert_eq!(StationState::Run.advance_to(StationState::Closing), StationState::Closing);
        assert_eq!(StationState::Stop.advance_to(StationState::Closing), StationState::Stop);
        assert_eq!(StationState::Closed.advance_to(StationState::Closed), StationState::Closed);
        assert!(StationState::Closing < StationState::Closed);
        assert!(StationState::Closed < StationState::Stop);
    }

    #[test]
    fn test_station_state_serializes_as_integer() {
        let json = serde_json::to_string(&StationState::Pause).unwrap();
        assert_eq!(json, "2");

        let parsed: StationState = serde_json::from_str("5").unwrap();
        assert_eq!(parsed, StationState::Closed);

        assert!(serde_json::from_str::<StationState>("42").is_err());
    }

    #[test]
    fn test_atomic_compare_exchange() {
        let cell = AtomicState::new(AppState::Failed);

        assert_eq!(
            cell.compare_exchange(AppState::Failed, AppState::Initialized),
            Ok(AppState::Failed)
        );
        assert_eq!(cell.load(), AppState::Initialized);

        // Second attempt observes the new value and fails
        assert_eq!(
            cell.compare_exchange(AppState::Failed, AppState::Initialized),
            Err(AppState::Initialized)
        );
    }

    #[test]
    fn test_atomic_swap_returns_previous() {
        let cell = AtomicState::new(StationState::Run);
        assert_eq!(cell.swap(StationState::Failed), StationState::Run);
        assert_eq!(cell.load(), StationState::Failed);
    }

    #[test]
    fn test_byte_roundtrip_covers_all_variants() {
        for byte in 0..=8u8 {
            let state = StationState::from_byte(byte).unwrap();
            assert_eq!(state.to_byte(), byte);
        }
        assert_eq!(StationState::from_byte(9), None);
        assert_eq!(AppState::from_byte(4), None);
    }
}
