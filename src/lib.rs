//! HW Overlay Library
//!
//! Always-on-top CPU/GPU temperature overlay fed by a local hardware
//! monitoring service, with a tray icon to show/hide/exit.
//!
//! Architecture:
//! - Supervisor owns the instance lock and the bundled monitor process
//! - Overlay (iced, GUI thread) polls the monitor's JSON endpoint
//! - Tray runs on its own thread and talks to the overlay over channels

pub mod config;
pub mod error;
pub mod logging;
pub mod overlay;
pub mod poller;
pub mod sensor;
pub mod signals;
pub mod supervisor;
pub mod tray;
