//! # Multi-DM Server Binary
//!
//! Opens every configured deformable mirror, allocates the shared-memory
//! channels and runs a line-oriented operator shell on stdin.
//!
//! # Usage
//!
//! ```bash
//! # Simulated mirrors, default settings
//! mdm_server --simulate
//!
//! # Hardware, custom config, per-device send timing logs
//! mdm_server --config /etc/mdm/mdm.toml --timelog
//!
//! # Verbose JSON logs
//! mdm_server -s -v --json
//! ```

use clap::Parser;
use mdm_common::config::{LogLevel, ServerConfig, load_server_config};
use mdm_common::consts::DEFAULT_CONFIG_PATH;
use mdm_server::command::{Command, help_text};
use mdm_server::drivers::simulation::DRIVER_NAME as SIMULATION_DRIVER;
use mdm_server::{DmServer, DriverRegistry, Outcome, ServerOptions};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const PROMPT: &str = "MultiDM > ";

/// Asgard multi-DM server - combines shared-memory channels and drives the mirrors
#[derive(Parser, Debug)]
#[command(name = "mdm_server")]
#[command(version)]
#[command(about = "Multi deformable mirror control server")]
#[command(long_about = None)]
struct Args {
    /// Path to the server configuration file (mdm.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use the simulation driver instead of the configured one
    #[arg(short = 's', long)]
    simulate: bool,

    /// Log the UNIX timestamp of every hardware send
    #[arg(short, long)]
    timelog: bool,

    /// Directory of the shared-memory segments
    #[arg(long, value_name = "DIR")]
    shm_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("DM server failed: {}", e);
        eprintln!("DM server failed: {e}");
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    setup_tracing(&args, config.shared.log_level);
    apply_overrides(&mut config, &args);
    config.validate()?;

    info!("Multi-DM server v{} starting...", env!("CARGO_PKG_VERSION"));
    if config.server.driver == SIMULATION_DRIVER {
        info!("Simulated DM scenario: no hardware is driven");
    }

    let registry = DriverRegistry::with_builtin()?;
    debug!("DM drivers available: {}", registry.names().join(", "));
    let devices = DmServer::open_devices(&config, &registry)?;
    let mut server = DmServer::new(ServerOptions::from_config(&config), devices)?;
    server.set_channel_count(config.server.channels)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        flag.store(true, Ordering::SeqCst);
    })?;

    run_shell(&mut server, &shutdown);

    server.shutdown()?;
    info!("Multi-DM server shutdown complete");
    Ok(())
}

/// Explicit `--config` must load; the default path is optional.
fn load_config(path: Option<&Path>) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(load_server_config(path)?),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Ok(load_server_config(Path::new(DEFAULT_CONFIG_PATH))?)
        }
        None => Ok(ServerConfig::default()),
    }
}

fn apply_overrides(config: &mut ServerConfig, args: &Args) {
    if args.simulate {
        info!("Simulation mode enabled");
        config.server.driver = SIMULATION_DRIVER.to_string();
    }
    if args.timelog {
        config.timing_log.enabled = true;
    }
    if let Some(dir) = &args.shm_dir {
        config.server.shm_dir = dir.clone();
    }
}

/// Read commands until `quit` succeeds, stdin closes or a signal arrives.
fn run_shell(server: &mut DmServer, shutdown: &AtomicBool) {
    let (tx, rx) = mpsc::channel::<String>();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    println!("DM CONTROL INTERACTIVE SHELL");
    println!("{}", help_text());
    prompt();

    while !shutdown.load(Ordering::SeqCst) {
        let line = match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                info!("Operator input closed");
                break;
            }
        };

        if line.trim().is_empty() {
            prompt();
            continue;
        }

        match Command::parse(&line) {
            Ok(command) => match server.execute(command) {
                Ok(Outcome::Done(message)) => println!("{message}"),
                Ok(Outcome::Quit) => {
                    println!("DM shell closed");
                    return;
                }
                Err(e) => {
                    warn!("Command '{}' failed: {}", command, e);
                    println!("ERROR: {e}");
                }
            },
            Err(e) => {
                println!("ERROR: {e}");
                println!("{}", help_text());
            }
        }
        prompt();
    }
}

fn prompt() {
    print!("{PROMPT}");
    let _ = std::io::stdout().flush();
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, log_level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str()));
    let filter = if args.verbose {
        filter.add_directive(Level::DEBUG.into())
    } else {
        filter
    };

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
