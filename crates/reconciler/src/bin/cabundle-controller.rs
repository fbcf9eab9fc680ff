//! Standalone trust bundle controller.
//!
//! Runs the controller against a process-local store until interrupted.
//! Useful to check a configuration and a system bundle file before
//! deployment; the merged bundle is logged on every write.

use cabundle_core::{logging, EngineConfig};
use cabundle_reconciler::{Controller, InMemoryStore};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

struct Args {
    config: Option<PathBuf>,
    json: bool,
}

fn print_usage() {
    println!("Usage: cabundle-controller [--config <path>] [--json]");
    println!();
    println!("Options:");
    println!("  --config, -c <path>   TOML engine configuration (defaults apply when omitted)");
    println!("  --json                Emit JSON formatted logs");
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        config: None,
        json: false,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = iter.next().ok_or("Missing value for --config")?;
                args.config = Some(PathBuf::from(path));
            }
            "--json" => args.json = true,
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            other => return Err(format!("Unknown argument: {other}")),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {e}");
            println!();
            print_usage();
            process::exit(1);
        }
    };

    if args.json {
        logging::init_json();
    } else {
        logging::init();
    }

    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    info!(
        system_bundle = %config.system_bundle_path.display(),
        output = %config.output_key(),
        "configuration loaded"
    );

    let controller = Controller::new(Arc::new(config), Arc::new(InMemoryStore::new()));
    let handle = controller.handle();
    let (stop, shutdown) = watch::channel(false);
    let task = tokio::spawn(controller.run(shutdown));

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    let _ = stop.send(true);
    task.await?;

    let status = handle.status();
    info!(
        cycles = status.cycles,
        failures = status.failures,
        last_error = ?status.last_error,
        "controller exited"
    );
    Ok(())
}
