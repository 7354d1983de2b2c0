use std::path::PathBuf;
use clap::Parser;
use log::{error, info};
use desk_panel::{init_logging, run, RunOptions};
use desk_panel::error::{AppRunError, ConfigError};

#[derive(Parser, Debug)]
#[command(author, version)]
#[command(about = "Control panel for a bluetooth desk device: power, heater, mood light, climate readings and alerts.", long_about = None)]
struct Args {
    /// Read and write the config at this path instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use an in-memory device instead of the bluetooth adapter. Implies --simulate-telemetry.
    #[arg(long)]
    demo: bool,

    /// Generate temperature and humidity readings while connected
    #[arg(long)]
    simulate_telemetry: bool,

    /// Log debug messages
    #[arg(long, short)]
    verbose: bool,
}

fn main() -> Result<(), AppRunError> {
    let args = Args::parse();

    init_logging(if args.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info });
    info!(concat!("Desk Panel ", env!("CARGO_PKG_VERSION")));

    let options = RunOptions {
        config_path: args.config,
        demo: args.demo,
        simulate_telemetry: args.simulate_telemetry,
    };

    match run(options) {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            eprintln!("This application has already been started");
            Ok(())
        },
        Err(err) => {
            error!("Unexpected error: {}", err);
            Err(err)
        }
        Ok(_) => Ok(())
    }
}
