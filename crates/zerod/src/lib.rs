//! zero daemon - Station registry, monitor loop and command client
//!
//! This crate provides the coordination core of a zero mesh process:
//! - `registry` - Local copy of the coordinator's station table
//! - `monitor` - Long-running subscription to coordinator lifecycle events
//! - `command` - Request/reply client for the management endpoint
//! - `config` - Layered process configuration
//! - `app` - Process-wide state tying the pieces together
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        zerod process                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌─────────────────┐  events   ┌──────────────────────────┐  │
//! │  │   MonitorLoop   │──────────▶│       Application        │  │
//! │  │ (monitor addr)  │           │ center status / app state│  │
//! │  └─────────────────┘           └─────┬──────────────┬─────┘  │
//! │                                      │              │        │
//! │                          upsert/get  │              │ rejoin │
//! │                                      ▼              ▼        │
//! │                        ┌─────────────────┐ ┌──────────────┐  │
//! │                        │ StationRegistry │ │ SystemManager│  │
//! │                        │ (RwLock<Map>)   │ │ CommandClient│  │
//! │                        └─────────────────┘ └──────────────┘  │
//! │                                                              │
//! │           Notifier (broadcast) ──▶ embedding code            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! Production code in this crate never calls `.unwrap()`, `.expect()` or
//! `panic!()`. Transport and decode failures are logged and retried or
//! folded into result values.

pub mod app;
pub mod command;
pub mod config;
pub mod manager;
pub mod monitor;
pub mod notify;
pub mod registry;
pub mod transport;

pub use app::Application;
pub use command::CommandClient;
pub use config::{ConfigError, WorkMode, ZeroAppConfig};
pub use manager::{CenterManager, ManagerError, SystemManager};
pub use monitor::{MonitorLoop, MonitorOptions};
pub use notify::{Notification, Notifier, ZeroNotification};
pub use registry::{RegistryError, StationRegistry};
pub use transport::{EventSource, MonitorConnector, TcpConnector, TransportError};
