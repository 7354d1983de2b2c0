use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use log::{error, info};
use tokio_util::sync::CancellationToken;

use crate::config::io::ConfigIO;
use crate::console::application::run_console;
use crate::desk::coordinator::desk_coordinator;
use crate::device::btle::BtleTransport;
use crate::device::mock::MockTransport;
use crate::device::service::connectivity_service;
use crate::device::transport::Transport;
use crate::error::AppRunError;
use crate::sim::telemetry_sim::{SampleSource, SyntheticSource};

pub mod config;
pub mod console;
pub mod desk;
pub mod device;
pub mod error;
pub mod sim;

pub fn init_logging(level: log::LevelFilter) {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        dispatch = dispatch.chain(
            fern::log_file(log_file).expect("Failed to open LOG_FILE")
        );
    }

    dispatch.apply().expect("Failed to initialize logger");
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    // default location when None
    pub config_path: Option<PathBuf>,
    // in-memory device instead of the bluetooth adapter
    pub demo: bool,
    pub simulate_telemetry: bool,
}

async fn run_panel(config_io: ConfigIO, options: RunOptions) -> Result<(), AppRunError> {
    let mut config = config_io.load_or_init().await?;
    if options.demo || options.simulate_telemetry {
        config.telemetry.simulate = true;
    }

    // cancelled upon exit
    let app_cancel = CancellationToken::new();

    let transport: Arc<dyn Transport> = if options.demo {
        info!("Demo mode, using an in-memory device");
        let (transport, _controller) = MockTransport::new();
        Arc::new(transport)
    } else {
        Arc::new(BtleTransport::new(config.device.clone()))
    };

    let source: Option<Box<dyn SampleSource>> = if config.telemetry.simulate {
        Some(Box::new(SyntheticSource::new()))
    } else {
        None
    };

    let (connectivity, connectivity_handle) = connectivity_service(
        transport, &config.device, app_cancel.clone(),
    );
    let (coordinator, coordinator_handle) = desk_coordinator(
        connectivity, &config, source, app_cancel.clone(),
    );

    run_console(coordinator.clone(), app_cancel.clone()).await;

    coordinator.disconnect().await;
    app_cancel.cancel();

    if let Err(err) = coordinator_handle.await {
        error!("Device coordinator task failed: {:?}", err);
    }
    if let Err(err) = connectivity_handle.await {
        error!("Connectivity task failed: {:?}", err);
    }
    Ok(())
}

pub fn run(options: RunOptions) -> Result<(), AppRunError> {
    let mut config_io = ConfigIO::new_sync(options.config_path.as_deref())?;
    let mut config_locker = config_io.locker()?;
    // held until exit, a second instance fails with CanNotLock
    let _config_lock_guard = config_locker.lock()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run_panel(config_io, options))
}
