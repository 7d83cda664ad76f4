//! Mountify: map SFTP servers to Windows drive letters.
//!
//! Thin binary entry point. All logic lives in the `mountify-core` crate;
//! this file only parses arguments, calls the command surface and prints
//! events and results as JSON lines on stdout. Logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::Receiver;
use serde_json::{json, Value};

use mountify_core::registry::{JsonFileRegistry, ServerRegistry};
use mountify_core::{CommandResult, CoreEvent, DependencyPhase, Mountify, ServerProfile};

#[derive(Parser)]
#[command(name = "Mountify")]
#[command(author, version, about = "Map SFTP servers to Windows drive letters")]
#[command(propagate_version = true)]
struct Cli {
    /// Registry file (defaults to the per-user config directory)
    #[arg(long, env = "MOUNTIFY_REGISTRY", global = true)]
    registry: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured servers
    Servers,

    /// Add a server, or replace one when --id names an existing profile
    Add(AddArgs),

    /// Remove a server, unmounting it first if needed
    Remove { id: String },

    /// Map a server's drive letter
    Mount { id: String },

    /// Remove a server's mapping
    Unmount { id: String },

    /// List free drive letters
    Drives {
        /// Letter to keep in the list even when it is in use
        #[arg(long)]
        current: Option<char>,
    },

    /// Manage WinFsp and SSHFS-Win
    Deps {
        #[command(subcommand)]
        action: DepsAction,
    },

    /// Check that a server's SSH port is reachable
    Test { id: String },

    /// Show settings, updating any that are given
    Settings(SettingsArgs),

    /// Install missing dependencies, then mount auto-mount servers
    Startup,
}

#[derive(Subcommand)]
enum DepsAction {
    /// Report which dependencies are installed
    Check,
    /// Download and install whatever is missing
    Install,
    /// Uninstall one dependency (WinFsp or SSHFS-Win)
    Uninstall { name: String },
}

#[derive(clap::Args)]
struct AddArgs {
    /// Existing profile id to replace
    #[arg(long)]
    id: Option<String>,
    #[arg(long)]
    name: String,
    #[arg(long)]
    host: String,
    #[arg(long, default_value_t = 22)]
    port: u16,
    #[arg(long)]
    user: String,
    /// SFTP password (prefer the MOUNTIFY_PASSWORD env var)
    #[arg(long, env = "MOUNTIFY_PASSWORD", hide_env_values = true, default_value = "")]
    password: String,
    #[arg(long, default_value = "S")]
    drive: String,
    #[arg(long, default_value = "/")]
    remote_path: String,
    #[arg(long, default_value = "")]
    label: String,
    /// Mount this server on startup
    #[arg(long)]
    auto_mount: bool,
}

#[derive(clap::Args)]
struct SettingsArgs {
    #[arg(long)]
    notifications: Option<bool>,
    #[arg(long)]
    start_with_windows: Option<bool>,
    #[arg(long)]
    start_minimized: Option<bool>,
    #[arg(long)]
    minimize_to_tray: Option<bool>,
    /// Connection test timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
    #[arg(long)]
    default_port: Option<u16>,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Mountify starting");

    let registry = match &cli.registry {
        Some(path) => JsonFileRegistry::new(path),
        None => JsonFileRegistry::open_default().context("cannot locate registry file")?,
    };
    tracing::debug!("Using registry {}", registry.path().display());
    let registry: Arc<dyn ServerRegistry> = Arc::new(registry);

    let (app, rx) = Mountify::new(Arc::clone(&registry));
    let result = run(&app, &registry, cli.command, &rx)?;

    print_events(&rx);
    println!("{}", json!({ "result": result }));
    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run(
    app: &Mountify,
    registry: &Arc<dyn ServerRegistry>,
    command: Commands,
    rx: &Receiver<CoreEvent>,
) -> Result<CommandResult> {
    match command {
        Commands::Servers => {
            let servers = app.get_servers()?;
            let list: Vec<Value> = servers.iter().map(profile_json).collect();
            println!("{}", json!({ "servers": list }));
            Ok(CommandResult::ok())
        }
        Commands::Add(args) => {
            let mut profile = ServerProfile::new(&args.name, &args.host, &args.user);
            profile.id = args.id.unwrap_or_default();
            profile.port = args.port;
            profile.password = args.password;
            profile.drive_letter = args.drive;
            profile.remote_path = args.remote_path;
            profile.drive_label = args.label;
            profile.auto_mount = args.auto_mount;
            let saved = app.save_server(profile)?;
            println!("{}", json!({ "saved": profile_json(&saved) }));
            Ok(CommandResult::ok())
        }
        Commands::Remove { id } => {
            if registry.server(&id)?.is_none() {
                return Ok(CommandResult::failed("Server not found"));
            }
            Ok(app.delete_server(&id).into())
        }
        Commands::Mount { id } => Ok(match app.mount(&id) {
            Ok(handle) => {
                join(handle)?;
                outcome(rx, |e| match e {
                    CoreEvent::MountResult { success, error, .. } => {
                        Some((*success, error.clone()))
                    }
                    _ => None,
                })
            }
            Err(e) => CommandResult::failed(e),
        }),
        Commands::Unmount { id } => Ok(match app.unmount(&id) {
            Ok(handle) => {
                join(handle)?;
                outcome(rx, |e| match e {
                    CoreEvent::UnmountResult { success, error, .. } => {
                        Some((*success, error.clone()))
                    }
                    _ => None,
                })
            }
            Err(e) => CommandResult::failed(e),
        }),
        Commands::Drives { current } => {
            println!(
                "{}",
                json!({ "drives": app.available_drives_for(current) })
            );
            Ok(CommandResult::ok())
        }
        Commands::Deps { action } => match action {
            DepsAction::Check => {
                println!("{}", serde_json::to_string(&app.check_dependencies())?);
                Ok(CommandResult::ok())
            }
            DepsAction::Install => {
                join(app.install_dependencies())?;
                Ok(install_outcome(rx))
            }
            DepsAction::Uninstall { name } => Ok(app.uninstall_dependency(&name)),
        },
        Commands::Test { id } => match registry.server(&id)? {
            Some(profile) => Ok(app.test_connection(&profile)),
            None => Ok(CommandResult::failed("Server not found")),
        },
        Commands::Settings(args) => {
            let mut settings = app.get_settings()?;
            let before = settings.clone();
            if let Some(v) = args.notifications {
                settings.show_notifications = v;
            }
            if let Some(v) = args.start_with_windows {
                settings.start_with_windows = v;
            }
            if let Some(v) = args.start_minimized {
                settings.start_minimized = v;
            }
            if let Some(v) = args.minimize_to_tray {
                settings.minimize_to_tray = v;
            }
            if let Some(v) = args.timeout_ms {
                settings.connection_timeout_ms = v;
            }
            if let Some(v) = args.default_port {
                settings.default_port = v;
            }
            if settings != before {
                app.save_settings(&settings)?;
            }
            println!("{}", json!({ "settings": settings }));
            Ok(CommandResult::ok())
        }
        Commands::Startup => {
            app.startup().join();
            Ok(CommandResult::ok())
        }
    }
}

fn join(handle: std::thread::JoinHandle<()>) -> Result<()> {
    if handle.join().is_err() {
        bail!("worker thread panicked");
    }
    Ok(())
}

/// Turn the first matching result event into a `CommandResult`, printing
/// every event consumed along the way.
fn outcome<F>(rx: &Receiver<CoreEvent>, pick: F) -> CommandResult
where
    F: Fn(&CoreEvent) -> Option<(bool, Option<String>)>,
{
    let mut result = CommandResult::failed("operation ended without a result");
    for event in rx.try_iter() {
        if let Some((success, error)) = pick(&event) {
            result = CommandResult { success, error };
        }
        println!("{}", event_json(&event));
    }
    result
}

fn install_outcome(rx: &Receiver<CoreEvent>) -> CommandResult {
    outcome(rx, |e| match e {
        CoreEvent::DependencyStatus { status, message } => match status {
            DependencyPhase::Complete => Some((true, None)),
            DependencyPhase::Error => Some((false, Some(message.clone()))),
            _ => None,
        },
        _ => None,
    })
}

fn print_events(rx: &Receiver<CoreEvent>) {
    for event in rx.try_iter() {
        println!("{}", event_json(&event));
    }
}

fn event_json(event: &CoreEvent) -> Value {
    let payload = match event {
        CoreEvent::MountResult {
            server_id,
            success,
            error,
        }
        | CoreEvent::UnmountResult {
            server_id,
            success,
            error,
        } => json!({ "serverId": server_id, "success": success, "error": error }),
        CoreEvent::ServersUpdated(servers) => {
            Value::Array(servers.iter().map(profile_json).collect())
        }
        CoreEvent::DependencyStatus { status, message } => {
            json!({ "status": status.as_str(), "message": message })
        }
        CoreEvent::Notification { title, body } => json!({ "title": title, "body": body }),
        CoreEvent::TrayRefresh => Value::Null,
    };
    json!({ "event": event.name(), "payload": payload })
}

/// Profile as JSON with the password masked.
fn profile_json(profile: &ServerProfile) -> Value {
    let mut value = serde_json::to_value(profile).unwrap_or(Value::Null);
    if let Some(pw) = value.get_mut("password") {
        if pw.as_str().is_some_and(|s| !s.is_empty()) {
            *pw = Value::from("***");
        }
    }
    value
}
