//! Layered process configuration.
//!
//! Settings are read from a TOML file (`$ZERO_CONFIG`, or
//! `<root>/config/zero.toml`) with this shape:
//!
//! ```toml
//! [zero.global]            # shared defaults
//! zero_address = "10.0.0.5"
//! zero_manage_port = 8000
//!
//! [zero.station]           # default application section
//! station_name = "OrderApi"
//!
//! [zero.OrderApi]          # per-application section, wins over [zero.station]
//! station_isolate = true
//!
//! [zero.API]               # shared rate-limit sections used by api_option()
//! max_wait = 4096
//! ```
//!
//! Out-of-range values are clamped or replaced at load time so the rest of the
//! process never sees an invalid setting.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Environment variable overriding the configuration file path.
pub const CONFIG_ENV: &str = "ZERO_CONFIG";

/// Fallback management port.
pub const DEFAULT_MANAGE_PORT: u16 = 8000;

/// Fallback monitor port.
pub const DEFAULT_MONITOR_PORT: u16 = 8001;

/// Lowest accepted max-wait value.
pub const MIN_MAX_WAIT: u32 = 0xFF;

/// Highest accepted max-wait value.
pub const MAX_MAX_WAIT: u32 = 0xFFFFF;

/// Highest accepted CPU multiple.
pub const MAX_TASK_CPU_MULTIPLE: f64 = 128.0;

const DEFAULT_ADDRESS: &str = "127.0.0.1";
const GLOBAL_SECTION: &str = "global";
const STATION_SECTION: &str = "station";
const API_SECTION: &str = "API";
const CLIENT_SECTION: &str = "Client";

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("no configuration section found (looked for zero.{app} and zero.station)")]
    MissingSection { app: String },
}

// ============================================================================
// Option types
// ============================================================================

/// How a station throttles concurrent work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeedLimitModel {
    /// One worker, no queue.
    Single,
    /// CPU count x `task_cpu_multiple` workers.
    #[default]
    ThreadCount,
    /// One dispatcher with at most `max_wait` outstanding tasks.
    WaitCount,
}

impl SpeedLimitModel {
    /// Parses a loosely typed value. Unknown values fall back to
    /// `ThreadCount`.
    fn from_toml(value: Option<&toml::Value>) -> Self {
        match value {
            Some(toml::Value::Integer(0)) => Self::Single,
            Some(toml::Value::Integer(1)) => Self::ThreadCount,
            Some(toml::Value::Integer(2)) => Self::WaitCount,
            Some(toml::Value::String(s)) => match s.to_ascii_lowercase().replace('_', "").as_str() {
                "single" => Self::Single,
                "waitcount" => Self::WaitCount,
                _ => Self::ThreadCount,
            },
            _ => Self::ThreadCount,
        }
    }
}

/// Whether the process runs the monitor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkMode {
    /// Long-running service: monitor loop active.
    #[default]
    Service,
    /// One-shot task: no monitor loop.
    Task,
}

/// Rate-limiting policy for one station.
#[derive(Debug, Clone, PartialEq)]
pub struct StationOption {
    pub speed_limit_model: SpeedLimitModel,
    pub max_wait: u32,
    pub task_cpu_multiple: f64,
}

impl StationOption {
    fn from_section(section: &RawSection) -> Self {
        let max_wait = section
            .max_wait
            .unwrap_or(0)
            .clamp(i64::from(MIN_MAX_WAIT), i64::from(MAX_MAX_WAIT));

        let multiple = section.task_cpu_multiple.unwrap_or(0.0);
        let task_cpu_multiple = if multiple.is_nan() || multiple <= 0.0 {
            1.0
        } else {
            multiple.min(MAX_TASK_CPU_MULTIPLE)
        };

        Self {
            speed_limit_model: SpeedLimitModel::from_toml(section.speed_limit_model.as_ref()),
            // Clamped into u32 range above
            max_wait: max_wait as u32,
            task_cpu_multiple,
        }
    }

    /// Worker count implied by this option on a machine with `cpus` CPUs.
    pub fn max_threads_for(&self, cpus: usize) -> usize {
        match self.speed_limit_model {
            SpeedLimitModel::ThreadCount => {
                let max = (cpus as f64 * self.task_cpu_multiple) as usize;
                max.max(1)
            }
            SpeedLimitModel::Single | SpeedLimitModel::WaitCount => 1,
        }
    }

    /// Worker count for this machine.
    pub fn max_threads(&self) -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.max_threads_for(cpus)
    }
}

impl Default for StationOption {
    fn default() -> Self {
        Self::from_section(&RawSection::default())
    }
}

// ============================================================================
// Raw file layout
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct RawFile {
    #[serde(default)]
    zero: BTreeMap<String, RawSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawSection {
    station_isolate: Option<bool>,
    service_name: Option<String>,
    service_key: Option<String>,
    station_name: Option<String>,
    short_name: Option<String>,
    zero_address: Option<String>,
    zero_manage_port: Option<i64>,
    zero_monitor_port: Option<i64>,
    data_folder: Option<PathBuf>,
    log_folder: Option<PathBuf>,
    config_folder: Option<PathBuf>,
    work_mode: Option<String>,
    speed_limit_model: Option<toml::Value>,
    max_wait: Option<i64>,
    task_cpu_multiple: Option<f64>,
}

// ============================================================================
// Resolved configuration
// ============================================================================

/// Process-wide configuration, built once at start-up.
#[derive(Debug, Clone)]
pub struct ZeroAppConfig {
    pub app_name: String,
    pub root_path: PathBuf,

    pub service_name: String,
    pub service_key: String,
    pub station_name: String,
    pub short_name: String,

    /// Unique per-process name, used as the socket identity.
    pub real_name: String,
    pub identity: Vec<u8>,

    pub zero_address: String,
    pub manage_port: u16,
    pub monitor_port: u16,
    pub manage_address: String,
    pub monitor_address: String,

    pub data_folder: PathBuf,
    pub log_folder: PathBuf,
    pub config_folder: PathBuf,

    pub station_isolate: bool,
    pub work_mode: WorkMode,
    pub option: StationOption,

    sections: BTreeMap<String, RawSection>,
}

impl ZeroAppConfig {
    /// Default configuration file location under `root`.
    pub fn default_path(root: &Path) -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| root.join("config").join("zero.toml"))
    }

    /// Loads the configuration from the default location.
    pub fn load(root: &Path, app_name: Option<&str>) -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path(root), root, app_name)
    }

    /// Loads the configuration from an explicit file.
    pub fn load_from(path: &Path, root: &Path, app_name: Option<&str>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: RawFile = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), sections = file.zero.len(), "Loaded configuration file");
        Self::resolve(file.zero, root, app_name)
    }

    /// Builds the configuration from TOML text.
    pub fn from_toml_str(raw: &str, root: &Path, app_name: Option<&str>) -> Result<Self, ConfigError> {
        let file: RawFile = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        Self::resolve(file.zero, root, app_name)
    }

    fn resolve(
        sections: BTreeMap<String, RawSection>,
        root: &Path,
        app_name: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let requested = app_name.map(str::trim).filter(|n| !n.is_empty());

        let app = requested
            .and_then(|name| find_section(&sections, name))
            .or_else(|| find_section(&sections, STATION_SECTION))
            .cloned()
            .ok_or_else(|| ConfigError::MissingSection {
                app: requested.unwrap_or(STATION_SECTION).to_string(),
            })?;
        let global = find_section(&sections, GLOBAL_SECTION)
            .cloned()
            .unwrap_or_default();

        let station_name = non_blank(app.station_name.as_deref()).unwrap_or_default();
        let app_name = requested
            .map(str::to_string)
            .unwrap_or_else(|| station_name.clone());

        // Global values with their own fallbacks
        let global_service_name = non_blank(global.service_name.as_deref())
            .or_else(sysinfo::System::host_name)
            .unwrap_or_else(|| "localhost".to_string());
        let global_service_key =
            non_blank(global.service_key.as_deref()).unwrap_or_else(|| random_token(8));
        let global_address = non_blank(global.zero_address.as_deref())
            .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
        let global_manage_port = valid_port(global.zero_manage_port).unwrap_or(DEFAULT_MANAGE_PORT);
        let global_monitor_port =
            valid_port(global.zero_monitor_port).unwrap_or(DEFAULT_MONITOR_PORT);
        let global_data = global.data_folder.clone().unwrap_or_else(|| root.join("datas"));
        let global_log = global.log_folder.clone().unwrap_or_else(|| root.join("logs"));
        let global_config = global
            .config_folder
            .clone()
            .unwrap_or_else(|| root.join("config"));

        let station_isolate =
            global.station_isolate.unwrap_or(false) || app.station_isolate.unwrap_or(false);

        let (service_name, service_key, zero_address, manage_port, monitor_port) =
            if station_isolate {
                (
                    non_blank(app.service_name.as_deref()).unwrap_or(global_service_name),
                    non_blank(app.service_key.as_deref()).unwrap_or(global_service_key),
                    non_blank(app.zero_address.as_deref()).unwrap_or(global_address),
                    valid_port(app.zero_manage_port).unwrap_or(global_manage_port),
                    valid_port(app.zero_monitor_port).unwrap_or(global_monitor_port),
                )
            } else {
                (
                    global_service_name,
                    global_service_key,
                    global_address,
                    global_manage_port,
                    global_monitor_port,
                )
            };

        let (data_folder, log_folder, config_folder) = if station_isolate {
            (
                app.data_folder.clone().unwrap_or(global_data),
                app.log_folder.clone().unwrap_or(global_log),
                app.config_folder.clone().unwrap_or(global_config),
            )
        } else {
            (global_data, global_log, global_config)
        };

        let short_name =
            non_blank(app.short_name.as_deref()).unwrap_or_else(|| station_name.clone());
        let real_name = format!("{service_name}-{station_name}-{}", random_token(8));

        let work_mode = match app.work_mode.as_deref().map(str::trim) {
            Some(mode) if mode.eq_ignore_ascii_case("task") => WorkMode::Task,
            _ => WorkMode::Service,
        };

        let config = Self {
            identity: real_name.as_bytes().to_vec(),
            real_name,
            manage_address: format!("{zero_address}:{manage_port}"),
            monitor_address: format!("{zero_address}:{monitor_port}"),
            app_name,
            root_path: root.to_path_buf(),
            service_name,
            service_key,
            station_name,
            short_name,
            zero_address,
            manage_port,
            monitor_port,
            data_folder,
            log_folder,
            config_folder,
            station_isolate,
            work_mode,
            option: StationOption::from_section(&app),
            sections,
        };

        info!(
            app = %config.app_name,
            manage = %config.manage_address,
            monitor = %config.monitor_address,
            model = ?config.option.speed_limit_model,
            max_threads = config.max_threads(),
            max_wait = config.option.max_wait,
            "Configuration resolved"
        );
        Ok(config)
    }

    /// Rate-limiting policy for an API station.
    ///
    /// With station isolation the station's own section is used, otherwise
    /// the shared `API` section; the application's option is the fallback.
    pub fn api_option(&self, station: &str) -> StationOption {
        self.station_option(if self.station_isolate { station } else { API_SECTION })
    }

    /// Rate-limiting policy for a client station.
    pub fn client_option(&self, station: &str) -> StationOption {
        self.station_option(if self.station_isolate {
            station
        } else {
            CLIENT_SECTION
        })
    }

    fn station_option(&self, section: &str) -> StationOption {
        find_section(&self.sections, section)
            .map(StationOption::from_section)
            .unwrap_or_else(|| self.option.clone())
    }

    /// Worker count for the application's own option.
    pub fn max_threads(&self) -> usize {
        self.option.max_threads()
    }
}

fn find_section<'a>(
    sections: &'a BTreeMap<String, RawSection>,
    name: &str,
) -> Option<&'a RawSection> {
    sections
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, section)| section)
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Accepts ports in `1025..=64999`.
fn valid_port(port: Option<i64>) -> Option<u16> {
    port.filter(|p| (1025..65000).contains(p))
        .and_then(|p| u16::try_from(p).ok())
}

fn random_token(len: usize) -> String {
    let mut token = Uuid::new_v4().simple().to_string();
    token.truncate(len);
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(raw: &str, app: Option<&str>) -> ZeroAppConfig {
        ZeroAppConfig::from_toml_str(raw, Path::new("/srv/zero"), app).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = resolve("[zero.station]\nstation_name = \"OrderApi\"\n", None);

        assert_eq!(config.app_name, "OrderApi");
        assert_eq!(config.short_name, "OrderApi");
        assert_eq!(config.manage_address, "127.0.0.1:8000");
        assert_eq!(config.monitor_address, "127.0.0.1:8001");
        assert_eq!(config.service_key.len(), 8);
        assert_eq!(config.data_folder, Path::new("/srv/zero/datas"));
        assert_eq!(config.log_folder, Path::new("/srv/zero/logs"));
        assert_eq!(config.work_mode, WorkMode::Service);
        assert!(config.real_name.contains("-OrderApi-"));
        assert_eq!(config.identity, config.real_name.as_bytes());
    }

    #[test]
    fn test_invalid_ports_fall_back() {
        let config = resolve(
            r#"
            [zero.global]
            zero_manage_port = 80
            zero_monitor_port = 65000

            [zero.station]
            station_name = "a"
            "#,
            None,
        );
        assert_eq!(config.manage_port, DEFAULT_MANAGE_PORT);
        assert_eq!(config.monitor_port, DEFAULT_MONITOR_PORT);

        let config = resolve(
            "[zero.global]\nzero_manage_port = 1025\nzero_monitor_port = 64999\n[zero.station]\n",
            None,
        );
        assert_eq!(config.manage_port, 1025);
        assert_eq!(config.monitor_port, 64999);
    }

    #[test]
    fn test_option_clamping() {
        let config = resolve(
            r#"
            [zero.station]
            station_name = "a"
            speed_limit_model = "bogus"
            max_wait = 3
            task_cpu_multiple = -2.0
            "#,
            None,
        );
        assert_eq!(config.option.speed_limit_model, SpeedLimitModel::ThreadCount);
        assert_eq!(config.option.max_wait, MIN_MAX_WAIT);
        assert_eq!(config.option.task_cpu_multiple, 1.0);

        let config = resolve(
            "[zero.station]\nspeed_limit_model = 2\nmax_wait = 99999999\ntask_cpu_multiple = 500.0\n",
            None,
        );
        assert_eq!(config.option.speed_limit_model, SpeedLimitModel::WaitCount);
        assert_eq!(config.option.max_wait, MAX_MAX_WAIT);
        assert_eq!(config.option.task_cpu_multiple, MAX_TASK_CPU_MULTIPLE);
    }

    #[test]
    fn test_isolation_selects_app_values() {
        let raw = r#"
            [zero.global]
            zero_address = "10.0.0.1"
            service_key = "globalky"

            [zero.station]
            station_name = "fallback"

            [zero.Billing]
            station_name = "Billing"
            station_isolate = true
            zero_address = "10.0.0.9"
            zero_manage_port = 9100
        "#;

        let isolated = resolve(raw, Some("Billing"));
        assert!(isolated.station_isolate);
        assert_eq!(isolated.manage_address, "10.0.0.9:9100");
        assert_eq!(isolated.monitor_address, "10.0.0.9:8001");
        assert_eq!(isolated.service_key, "globalky");

        // Unknown app falls back to [zero.station] and shared values
        let shared = resolve(raw, Some("Other"));
        assert!(!shared.station_isolate);
        assert_eq!(shared.station_name, "fallback");
        assert_eq!(shared.app_name, "Other");
        assert_eq!(shared.manage_address, "10.0.0.1:8000");
    }

    #[test]
    fn test_missing_section() {
        let err = ZeroAppConfig::from_toml_str("[zero.global]\n", Path::new("/"), None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection { .. }));
    }

    #[test]
    fn test_api_and_client_options() {
        let raw = r#"
            [zero.station]
            max_wait = 512

            [zero.API]
            max_wait = 1024
            speed_limit_model = "single"
        "#;
        let config = resolve(raw, None);

        let api = config.api_option("anything");
        assert_eq!(api.max_wait, 1024);
        assert_eq!(api.speed_limit_model, SpeedLimitModel::Single);

        // No [zero.Client] section: falls back to the app option
        assert_eq!(config.client_option("anything").max_wait, 512);
    }

    #[test]
    fn test_max_threads() {
        let option = StationOption {
            speed_limit_model: SpeedLimitModel::ThreadCount,
            max_wait: MIN_MAX_WAIT,
            task_cpu_multiple: 0.5,
        };
        assert_eq!(option.max_threads_for(8), 4);
        assert_eq!(option.max_threads_for(1), 1);

        let single = StationOption {
            speed_limit_model: SpeedLimitModel::Single,
            ..option
        };
        assert_eq!(single.max_threads_for(64), 1);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zero.toml");
        fs::write(&path, "[zero.station]\nstation_name = \"FromFile\"\nwork_mode = \"task\"\n")
            .unwrap();

        let config = ZeroAppConfig::load_from(&path, dir.path(), None).unwrap();
        assert_eq!(config.station_name, "FromFile");
        assert_eq!(config.work_mode, WorkMode::Task);

        let missing = ZeroAppConfig::load_from(&dir.path().join("nope.toml"), dir.path(), None);
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
