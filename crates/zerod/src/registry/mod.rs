//! Station registry.
//!
//! The registry is the process-local copy of the coordinator's canonical
//! station table. It is fed by monitor events and by the rejoin action, and
//! read by anything that needs a station's configuration.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │  Monitor Loop   │────▶│ StationRegistry  │◀────│   Application   │
//! └─────────────────┘     └──────────────────┘     └─────────────────┘
//!         │                        │                        │
//!         │  upsert / set_state /  │   RwLock<HashMap>      │  get / rejoin
//!         │  remove / documents    │   (clones out)         │  (replace_all)
//! ```
//!
//! # Panic-Free Guarantees
//!
//! A poisoned lock is recovered with `PoisonError::into_inner`; every
//! validation failure is returned as a `RegistryError`.

mod errors;
mod store;

pub use errors::RegistryError;
pub use store::StationRegistry;
