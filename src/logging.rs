//! Log output setup.
//!
//! The overlay runs without a console on Windows, so everything goes to a log
//! file next to the lock file. Lines carry a timestamp and level tag.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;

#[cfg(debug_assertions)]
const MAX_LEVEL: Level = Level::DEBUG;
#[cfg(not(debug_assertions))]
const MAX_LEVEL: Level = Level::INFO;

/// Install the global subscriber, appending to `log_file`.
///
/// Falls back to stderr when the file cannot be opened. Calling this twice is
/// harmless; the second install attempt is ignored.
pub fn init(log_file: &Path) {
    let file = OpenOptions::new().create(true).append(true).open(log_file);

    match file {
        Ok(file) => {
            let _ = tracing_subscriber::fmt()
                .with_max_level(MAX_LEVEL)
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        Err(e) => {
            let _ = tracing_subscriber::fmt()
                .with_max_level(MAX_LEVEL)
                .with_writer(std::io::stderr)
                .try_init();
            tracing::warn!("Cannot open log file {}: {}, logging to stderr", log_file.display(), e);
        }
    }
}
