//! Ports trigger dispatcher
//!
//! Usage:
//!   ports-trigger [--config <path>] <trigger> [args...]
//!
//! The binary can also be symlinked under a trigger name, in which case the
//! executable name selects the trigger:
//!   ports-get <app> [stdout|json]
//!   ports-set-detected <app> <port-map>...
//!   post-certs-update <app>

use anyhow::{bail, Context, Result};
use spawngate_ports::config::Settings;
use spawngate_ports::db::Database;
use spawngate_ports::error::CleanupOutcome;
use spawngate_ports::lifecycle::MigrationReport;
use spawngate_ports::ports::Ports;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Used when neither --config nor PORTS_CONFIG is given
const DEFAULT_CONFIG_PATH: &str = "/etc/spawngate/ports.toml";

const TRIGGER_NAMES: &[&str] = &[
    "install",
    "ports-clear",
    "ports-configure",
    "ports-get",
    "ports-get-available",
    "ports-get-property",
    "ports-set-detected",
    "post-app-clone-setup",
    "post-app-rename-setup",
    "post-certs-remove",
    "post-certs-update",
    "post-delete",
];

#[derive(Debug, PartialEq)]
enum Trigger {
    Install,
    PortsClear { app: String },
    PortsConfigure { app: String },
    PortsGet { app: String, format: String },
    PortsGetAvailable,
    PortsGetProperty { app: String, key: String },
    PortsSetDetected { app: String, port_map: String },
    PostAppCloneSetup { old_app: String, new_app: String },
    PostAppRenameSetup { old_app: String, new_app: String },
    PostCertsRemove { app: String },
    PostCertsUpdate { app: String },
    PostDelete { app: String },
}

#[derive(Debug, PartialEq)]
struct Invocation {
    config_path: Option<PathBuf>,
    trigger: Trigger,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let invocation = parse_invocation(&args)?;

    let settings = match invocation
        .config_path
        .clone()
        .or_else(|| env::var_os("PORTS_CONFIG").map(PathBuf::from))
    {
        Some(path) => Settings::load(&path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => Settings::load_or_default(DEFAULT_CONFIG_PATH)?,
    };

    init_logging(&settings);

    let db = Database::open(&settings.store.path)?;
    let ports = Ports::from_database(&db).with_settings(settings.ports.clone());

    dispatch(&ports, invocation.trigger)
}

fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.filter));

    // stdout carries trigger output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn dispatch(ports: &Ports<'_>, trigger: Trigger) -> Result<()> {
    match trigger {
        Trigger::Install => {
            let report = ports.install()?;
            info!(
                migrated = report.migrated.len(),
                skipped = report.skipped.len(),
                failed = report.failures.len(),
                "Ports install finished"
            );
            check_install(&report)?;
        }
        Trigger::PortsClear { app } => ports.ports_clear(&app)?,
        Trigger::PortsConfigure { app } => ports.ports_configure(&app)?,
        Trigger::PortsGet { app, format } => print_output(&ports.ports_get(&app, &format)?),
        Trigger::PortsGetAvailable => {
            if let Some(port) = ports.ports_get_available() {
                println!("{}", port);
            }
        }
        Trigger::PortsGetProperty { app, key } => {
            println!("{}", ports.ports_get_property(&app, &key)?)
        }
        Trigger::PortsSetDetected { app, port_map } => {
            ports.ports_set_detected(&app, &port_map)?
        }
        Trigger::PostAppCloneSetup { old_app, new_app } => {
            ports.post_app_clone_setup(&old_app, &new_app)?
        }
        Trigger::PostAppRenameSetup { old_app, new_app } => {
            ports.post_app_rename_setup(&old_app, &new_app)?
        }
        Trigger::PostCertsRemove { app } => ports.post_certs_remove(&app)?,
        Trigger::PostCertsUpdate { app } => ports.post_certs_update(&app)?,
        Trigger::PostDelete { app } => {
            if let CleanupOutcome::Warning(err) = ports.post_delete(&app) {
                warn!(app = %app, "Continuing app deletion");
                eprintln!("Warning: {}", err);
            }
        }
    }

    Ok(())
}

/// Per-app failures are already logged; the error names the apps on one line
fn check_install(report: &MigrationReport) -> Result<()> {
    if report.is_success() {
        return Ok(());
    }

    let apps: Vec<&str> = report.failures.iter().map(|(app, _)| app.as_str()).collect();
    bail!(
        "Unable to install the ports plugin: {} app(s) failed to migrate: {}",
        apps.len(),
        apps.join(", ")
    )
}

fn print_output(output: &str) {
    if !output.is_empty() {
        println!("{}", output);
    }
}

/// Work out the trigger from the executable name or the first argument
fn parse_invocation(args: &[String]) -> Result<Invocation> {
    let mut config_path = None;
    let mut rest = Vec::new();

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let path = iter.next().context("--config requires a path")?;
            config_path = Some(PathBuf::from(path));
        } else if let Some(path) = arg.strip_prefix("--config=") {
            config_path = Some(PathBuf::from(path));
        } else {
            rest.push(arg.clone());
        }
    }

    let invoked_as = args
        .first()
        .and_then(|arg0| Path::new(arg0).file_name())
        .and_then(|name| name.to_str())
        .unwrap_or_default();

    let trigger = if TRIGGER_NAMES.contains(&invoked_as) {
        parse_trigger(invoked_as, &rest)?
    } else {
        match rest.split_first() {
            Some((name, trigger_args)) => parse_trigger(name, trigger_args)?,
            None => bail!("Please specify a trigger ({})", TRIGGER_NAMES.join(", ")),
        }
    };

    Ok(Invocation {
        config_path,
        trigger,
    })
}

fn parse_trigger(name: &str, args: &[String]) -> Result<Trigger> {
    let trigger = match name {
        "install" => Trigger::Install,
        "ports-clear" => Trigger::PortsClear {
            app: required(args, 0, "app")?,
        },
        "ports-configure" => Trigger::PortsConfigure {
            app: required(args, 0, "app")?,
        },
        "ports-get" => Trigger::PortsGet {
            app: required(args, 0, "app")?,
            format: args.get(1).cloned().unwrap_or_default(),
        },
        "ports-get-available" => Trigger::PortsGetAvailable,
        "ports-get-property" => Trigger::PortsGetProperty {
            app: required(args, 0, "app")?,
            key: required(args, 1, "property key")?,
        },
        "ports-set-detected" => Trigger::PortsSetDetected {
            app: required(args, 0, "app")?,
            port_map: args.get(1..).unwrap_or_default().join(" "),
        },
        "post-app-clone-setup" => Trigger::PostAppCloneSetup {
            old_app: required(args, 0, "old app")?,
            new_app: required(args, 1, "new app")?,
        },
        "post-app-rename-setup" => Trigger::PostAppRenameSetup {
            old_app: required(args, 0, "old app")?,
            new_app: required(args, 1, "new app")?,
        },
        "post-certs-remove" => Trigger::PostCertsRemove {
            app: required(args, 0, "app")?,
        },
        "post-certs-update" => Trigger::PostCertsUpdate {
            app: required(args, 0, "app")?,
        },
        "post-delete" => Trigger::PostDelete {
            app: required(args, 0, "app")?,
        },
        other => bail!("Invalid plugin trigger call: {}", other),
    };

    Ok(trigger)
}

fn required(args: &[String], index: usize, what: &str) -> Result<String> {
    match args.get(index) {
        Some(value) if !value.is_empty() => Ok(value.clone()),
        _ => bail!("Please specify the {}", what),
    }
}
