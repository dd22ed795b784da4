//! Zero Core - Shared types for the zero mesh coordination core
//!
//! This crate provides the domain types shared between the frame
//! codecs (zero-protocol) and the daemon library (zerod).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod event;
pub mod result;
pub mod state;
pub mod station;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use event::{EventTier, ZeroEvent, ZeroEventKind};
pub use result::{CommandFault, OperatorState, ZeroResult};
pub use state::{AppState, AtomicState, ByteState, StationState};
pub use station::{StationConfig, StationDocument};
