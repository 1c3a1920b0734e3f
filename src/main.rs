//! HW Overlay - CPU/GPU temperature overlay
//!
//! Startup order:
//! - Instance lock + launch of the bundled hardware monitor (fatal on failure)
//! - System tray thread
//! - Overlay window and poll loop on the main thread
//!
//! Cleanup (monitor termination, lock removal) runs once on every exit path.

#![windows_subsystem = "windows"]

use anyhow::{anyhow, Context, Result};
use hw_overlay::config::{self, resolve_resource};
use hw_overlay::error::SupervisorError;
use hw_overlay::logging;
use hw_overlay::overlay::{self, OverlayFlags};
use hw_overlay::poller::SensorPoller;
use hw_overlay::supervisor::{DirectLauncher, ElevatedLauncher, ProcessLauncher, Supervisor};
use hw_overlay::tray;
use std::sync::Arc;

fn main() -> Result<()> {
    let loaded = config::load_config();
    logging::init(&loaded.config.log_file);

    tracing::info!("HW Overlay starting...");
    loaded.log();
    let app_config = loaded.config;
    tracing::info!(
        "Endpoint {}, CPU sensor {}, GPU sensor {}",
        app_config.endpoint_url,
        app_config.cpu_sensor_id,
        app_config.gpu_sensor_id
    );

    // Seed an editable config on first run
    if !config::config_exists() {
        if let Err(e) = config::save_config(&app_config) {
            tracing::warn!("Could not write default config: {}", e);
        }
    }

    let launcher: Box<dyn ProcessLauncher> = if app_config.elevate_monitor {
        Box::new(ElevatedLauncher)
    } else {
        Box::new(DirectLauncher)
    };

    let supervisor = match Supervisor::start(&app_config, launcher.as_ref()) {
        Ok(supervisor) => Arc::new(supervisor),
        Err(e) => {
            if let SupervisorError::AlreadyRunning { .. } = e {
                println!("Another instance of HW Overlay is already running.");
                tracing::info!("{}", e);
            } else {
                tracing::error!("Startup failed: {}", e);
            }
            std::process::exit(e.exit_code());
        }
    };

    let poller = SensorPoller::from_config(&app_config).context("Failed to create HTTP client")?;

    // Create system tray
    let (event_tx, event_rx) = crossbeam::channel::unbounded();
    let tray = match tray::spawn_tray(resolve_resource(&app_config.icon_file), true, event_tx) {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::error!("Failed to start system tray: {:#}", e);
            None
        }
    };

    let flags = OverlayFlags {
        config: app_config,
        poller,
        tray_events: event_rx,
        tray_commands: tray.as_ref().map(|t| t.commands()),
        supervisor: Arc::clone(&supervisor),
    };

    let result = overlay::run(flags);

    // No-op if the overlay already cleaned up on its way out
    supervisor.shutdown();
    if let Some(tray) = tray {
        tray.shutdown();
    }

    tracing::info!("HW Overlay exited");
    result.map_err(|e| anyhow!("Overlay window failed: {}", e))
}
