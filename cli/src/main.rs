//! Simparam CLI: load run parameters and print the merged result.
//!
//! # Usage
//!
//! ```text
//! simparam -i athinput.json
//! simparam -r run.00010.json -i athinput.json -t 0.35
//! simparam -r run.00010.json -o merged.json --quiet
//! ```

use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use simparam_core::Startup;


#[derive(Parser, Debug)]
#[command(name = "simparam")]
#[command(about = "Load simulation parameters from input and restart files")]
struct Args {
    /// Input parameter file (JSON, or YAML by extension)
    #[arg(short = 'i', long)]
    input: Option<PathBuf>,

    /// Restart parameter file from a previous run
    #[arg(short = 'r', long)]
    restart: Option<PathBuf>,

    /// Current simulation time; output schedules are advanced past it
    #[arg(short = 't', long)]
    time: Option<f64>,

    /// Also write the merged parameters to this file
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Do not print the merged parameters
    #[arg(short = 'q', long)]
    quiet: bool,
}


fn main() {
    init_logging();
    let args = Args::parse();

    let startup = Startup {
        restart: args.restart,
        input: args.input,
        time: args.time,
    };

    let store = match startup.run() {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "startup failed");
            eprintln!("simparam: {}", e);
            process::exit(1);
        }
    };
    info!(blocks = store.len(), "parameters ready");

    if let Some(path) = &args.output {
        if let Err(e) = store.save(path) {
            error!(path = %path.display(), error = %e, "save failed");
            eprintln!("simparam: {}", e);
            process::exit(1);
        }
        info!(path = %path.display(), "saved parameters");
    }

    if !args.quiet {
        println!("{}", store.dump());
    }
}


/// Log to stderr so stdout carries only the parameter dump. `RUST_LOG`
/// overrides the default filter.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,simparam_core=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
