//! Process-wide application state.
//!
//! [`Application`] ties together the resolved configuration, the station
//! registry, the two lifecycle cells (coordinator status and process state)
//! and the notification channel. It is shared as `Arc<Application>` between
//! the monitor loop and whatever embeds the daemon.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zero_core::{AppState, AtomicState, StationConfig, StationState};

use crate::config::{WorkMode, ZeroAppConfig};
use crate::manager::CenterManager;
use crate::monitor::MonitorLoop;
use crate::notify::{Notifier, ZeroNotification};
use crate::registry::StationRegistry;
use crate::transport::MonitorConnector;

pub struct Application {
    config: Arc<ZeroAppConfig>,
    registry: Arc<StationRegistry>,
    manager: Arc<dyn CenterManager>,
    notifier: Notifier,

    /// Last known coordinator status; `Failed` while the link is down.
    center_status: AtomicState<StationState>,

    app_state: AtomicState<AppState>,
}

impl Application {
    pub fn new(
        config: ZeroAppConfig,
        registry: Arc<StationRegistry>,
        manager: Arc<dyn CenterManager>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            manager,
            notifier: Notifier::new(),
            center_status: AtomicState::new(StationState::None),
            app_state: AtomicState::new(AppState::Initialized),
        }
    }

    pub fn config(&self) -> &ZeroAppConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<StationRegistry> {
        &self.registry
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn center_status(&self) -> StationState {
        self.center_status.load()
    }

    pub fn app_state(&self) -> AppState {
        self.app_state.load()
    }

    pub(crate) fn center_status_cell(&self) -> &AtomicState<StationState> {
        &self.center_status
    }

    pub(crate) fn app_state_cell(&self) -> &AtomicState<AppState> {
        &self.app_state
    }

    /// True while the process is in run.
    pub fn in_run(&self) -> bool {
        self.app_state() == AppState::Run
    }

    /// True when the process can take work: in run with a running
    /// coordinator.
    pub fn can_do(&self) -> bool {
        self.in_run() && self.center_status() == StationState::Run
    }

    /// Re-synchronises with the coordinator.
    ///
    /// Pulls every station config, replaces the registry contents, then moves
    /// both lifecycle cells to run and raises `ZeroStart`. Any failure leaves
    /// both cells `Failed`. Returns true on success.
    pub async fn rejoin(&self) -> bool {
        debug!("Rejoining coordinator");
        let loaded = self.manager.load_all_configs().await;

        let applied = match loaded {
            Ok(json) => self
                .registry
                .replace_all(&json)
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match applied {
            Ok(count) => {
                self.center_status.store(StationState::Run);
                self.app_state.store(AppState::Run);
                info!(stations = count, "Joined coordinator");
                self.notifier.publish(ZeroNotification::ZeroStart);
                true
            }
            Err(reason) => {
                self.center_status.store(StationState::Failed);
                self.app_state.store(AppState::Failed);
                warn!(%reason, "Failed to join coordinator");
                false
            }
        }
    }

    /// Marks the coordinator link as lost.
    pub fn connection_lost(&self) {
        self.center_status.store(StationState::Failed);
        self.notifier.publish(ZeroNotification::ZeroEnd);
        self.app_state.store(AppState::Failed);
    }

    /// Looks a station up locally, falling back to the coordinator.
    ///
    /// A config fetched from the coordinator is stored in the registry.
    pub async fn get_config(&self, name: &str) -> Option<StationConfig> {
        if let Some(config) = self.registry.get(name) {
            return Some(config);
        }

        let json = match self.manager.load_config(name).await {
            Ok(json) => json,
            Err(e) => {
                debug!(station = %name, error = %e, "Station config not available");
                return None;
            }
        };
        match self.registry.upsert_from_document(name, &json) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(station = %name, error = %e, "Coordinator returned an unusable config");
                None
            }
        }
    }

    /// Joins the coordinator and, in service mode, starts the monitor loop.
    ///
    /// Returns once the loop has begun polling. In task mode no loop is
    /// started and `None` is returned.
    pub async fn start(
        self: &Arc<Self>,
        connector: Arc<dyn MonitorConnector>,
        cancel: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        self.rejoin().await;

        if self.config.work_mode == WorkMode::Task {
            info!("Task mode, monitor loop not started");
            return None;
        }

        let monitor = MonitorLoop::new(Arc::clone(self), connector, cancel);
        let ready = monitor.ready();
        let handle = tokio::spawn(monitor.run());
        if let Ok(permit) = ready.acquire().await {
            permit.forget();
        }
        Some(handle)
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("app_name", &self.config.app_name)
            .field("center_status", &self.center_status())
            .field("app_state", &self.app_state())
            .field("stations", &self.registry.len())
            .finish()
    }
}
