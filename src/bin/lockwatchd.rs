//! lockwatch daemon - smart lock unlock alerts with remote locking
//!
//! Polls every configured SESAME lock, posts a Discord alert when a lock
//! becomes unlocked, and locks everything still unlocked when someone
//! presses the alert's "Lock all" button.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! lockwatchd start
//!
//! # Start the daemon (background/daemonized)
//! lockwatchd start -d
//!
//! # Start with an explicit config file
//! lockwatchd start --config /etc/lockwatch/config.toml
//!
//! # Stop the daemon
//! lockwatchd stop
//!
//! # Check daemon status
//! lockwatchd status
//!
//! # Enable debug logging
//! RUST_LOG=lockwatchd=debug lockwatchd start
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown; running lock batches finish first
//!
//! A rejected Discord bot token shuts the daemon down the same way and
//! exits with a non-zero status.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lockwatch_core::{Device, DeviceApi, Notifier};
use lockwatch_discord::{DiscordConfig, DiscordNotifier};
use lockwatch_sesame::{SesameClient, SesameConfig};
use lockwatchd::actuation::ActuationCoordinator;
use lockwatchd::config::Config;
use lockwatchd::dispatch::ActionDispatcher;
use lockwatchd::monitor::{spawn_monitor_task, Monitor, MonitorSettings};
use lockwatchd::tracker::spawn_tracker;

/// lockwatch daemon - SESAME lock monitor with Discord alerts
#[derive(Parser, Debug)]
#[command(name = "lockwatchd", version, about)]
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

        /// Config file (defaults to the user config dir)
        #[arg(short, long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("lockwatch")
}

fn pid_file_path() -> PathBuf {
    state_dir().join("lockwatchd.pid")
}

fn log_file_path() -> PathBuf {
    state_dir().join("lockwatchd.log")
}

fn read_pid() -> Option<u32> {
    let path = pid_file_path();
    let mut file = File::open(&path).ok()?;
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
        config: None,
    });

    match command {
        Command::Start { daemon, config } => {
            if let Some(pid) = is_daemon_running() {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'lockwatchd stop' to stop it first.");
                process::exit(1);
            }

            // Resolve before daemonizing changes the working directory.
            let config_path = match config {
                Some(path) => Some(
                    path.canonicalize()
                        .with_context(|| format!("Config file not found: {}", path.display()))?,
                ),
                None => None,
            };

            if daemon {
                daemonize()?;
            }

            write_pid()?;

            let result = run_daemon(config_path.as_deref());

            remove_pid_file();

            result
        }
        Command::Stop => {
            if let Some(pid) = is_daemon_running() {
                println!("Stopping daemon (PID {pid})...");
                stop_daemon(pid)?;

                // Lock batches drain before exit, so allow longer than a poll.
                for _ in 0..150 {
                    if !is_process_running(pid) {
                        println!("Daemon stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Daemon did not stop within 15 seconds.");
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

    let daemonize = Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr);

    daemonize.start().context("Failed to daemonize")?;

    Ok(())
}

#[tokio::main]
async fn run_daemon(config_path: Option<&Path>) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("lockwatchd=info".parse()?)
                .add_directive("lockwatch_sesame=info".parse()?)
                .add_directive("lockwatch_discord=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "lockwatch daemon starting"
    );

    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e).context("Failed to load configuration");
        }
    };

    let devices: Arc<[Device]> = config.devices.clone().into();

    let mut sesame = SesameConfig::new(config.api_key.clone());
    if let Some(base_url) = &config.api_base_url {
        sesame.base_url = base_url.clone();
    }
    sesame.request_timeout = config.request_timeout;
    let api: Arc<dyn DeviceApi> =
        Arc::new(SesameClient::new(sesame).context("Failed to build SESAME client")?);

    let discord = DiscordNotifier::new(DiscordConfig::new(
        config.bot_token.clone(),
        config.channel_id,
    ))
    .context("Failed to build Discord client")?;
    if let Err(e) = discord.verify_channel().await {
        warn!(error = %e, channel_id = config.channel_id, "Alert channel check failed");
    }

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let tracker = spawn_tracker();
    info!("State tracker started");

    let (actions, gateway_handle) = discord.gateway().spawn(cancel_token.clone());
    info!("Discord Gateway listener started");

    let notifier: Arc<dyn Notifier> = Arc::new(discord);

    let monitor = Monitor::new(
        Arc::clone(&devices),
        Arc::clone(&api),
        Arc::clone(&notifier),
        tracker.clone(),
        MonitorSettings {
            interval: config.poll_interval,
            request_timeout: config.request_timeout,
            mention: config.mention.clone(),
        },
    );
    let monitor_handle = spawn_monitor_task(monitor, cancel_token.clone());

    let coordinator = ActuationCoordinator::new(devices, api, tracker, config.request_timeout);
    let dispatcher = ActionDispatcher::new(coordinator, notifier);
    let dispatcher_handle = tokio::spawn(dispatcher.run(actions, cancel_token.clone()));

    // The listener only stops on shutdown or a rejected bot token.
    let gateway_result = match gateway_handle.await {
        Ok(result) => result.context("Discord Gateway stopped"),
        Err(e) => Err(e).context("Gateway task failed"),
    };
    if let Err(e) = &gateway_result {
        error!(error = %format!("{e:#}"), "Shutting down: no longer receiving button clicks");
    }

    cancel_token.cancel();
    if let Err(e) = dispatcher_handle.await {
        error!(error = %e, "Action dispatcher failed");
    }
    if let Err(e) = monitor_handle.await {
        error!(error = %e, "Monitor task failed");
    }

    info!("lockwatch daemon stopped");
    gateway_result
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
