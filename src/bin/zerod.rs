//! zero daemon - Station registry and coordinator monitor
//!
//! This binary joins the zero coordinator, keeps a local copy of the station
//! table and follows coordinator lifecycle events until stopped.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! zerod start
//!
//! # Start the daemon (background/daemonized)
//! zerod start -d
//!
//! # Use a specific app section and root directory
//! zerod start --app billing --root /srv/zero
//!
//! # Stop the daemon
//! zerod stop
//!
//! # Check daemon status
//! zerod status
//!
//! # Enable debug logging
//! RUST_LOG=zerod=debug zerod start
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use zerod::{Application, CommandClient, StationRegistry, SystemManager, TcpConnector, ZeroAppConfig};

/// zero daemon - station coordination for the zero mesh
#[derive(Parser, Debug)]
#[command(name = "zerod", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// App section to read from the configuration
        #[arg(long)]
        app: Option<String>,

        /// Root directory (defaults to the current directory)
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("zero")
}

fn pid_file_path() -> PathBuf {
    state_dir().join("zerod.pid")
}

fn log_file_path() -> PathBuf {
    state_dir().join("zerod.log")
}

fn read_pid() -> Option<u32> {
    let mut file = File::open(pid_file_path()).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

/// Running daemon PID; a stale PID file is removed.
fn is_daemon_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        remove_pid_file();
    }
    None
}

fn stop_daemon(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let result = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        app: None,
        root: None,
    });

    match command {
        Command::Start { daemon, app, root } => {
            if let Some(pid) = is_daemon_running() {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'zerod stop' to stop it first.");
                process::exit(1);
            }

            let root = match root {
                Some(root) => root,
                None => std::env::current_dir().context("Failed to resolve root directory")?,
            };
            // Resolve before forking so config errors reach the terminal
            let config = ZeroAppConfig::load(&root, app.as_deref())
                .with_context(|| format!("Failed to load configuration under {}", root.display()))?;

            if daemon {
                daemonize()?;
            }

            write_pid()?;
            let result = run_daemon(config);
            remove_pid_file();
            result
        }
        Command::Stop => {
            if let Some(pid) = is_daemon_running() {
                println!("Stopping daemon (PID {pid})...");
                stop_daemon(pid)?;

                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Daemon stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Daemon did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Daemon is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = is_daemon_running() {
                println!("Daemon is running (PID {pid})");
                println!("Log: {}", log_file_path().display());
                Ok(())
            } else {
                println!("Daemon is not running.");
                process::exit(1);
            }
        }
    }
}

fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

#[tokio::main]
async fn run_daemon(config: ZeroAppConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("zerod=info".parse()?)
                .add_directive("zero_core=info".parse()?)
                .add_directive("zero_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        app = %config.app_name,
        identity = %config.real_name,
        "zero daemon starting"
    );

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let manager = SystemManager::new(CommandClient::from_config(&config));
    let app = Arc::new(Application::new(
        config,
        Arc::new(StationRegistry::new()),
        Arc::new(manager),
    ));

    match app.start(Arc::new(TcpConnector::new()), cancel_token.clone()).await {
        Some(monitor) => {
            info!(
                monitor = %app.config().monitor_address,
                stations = app.registry().len(),
                "Monitor loop running"
            );
            if let Err(e) = monitor.await {
                error!(error = %e, "Monitor task failed");
                bail!("monitor task failed: {e}");
            }
        }
        None => {
            info!(state = %app.app_state(), "Task mode, waiting for shutdown");
            cancel_token.cancelled().await;
        }
    }

    info!("zero daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
