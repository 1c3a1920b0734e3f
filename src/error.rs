/// Error types for the library seams.
///
/// Orchestration code (`main`, tray setup) works with `anyhow::Result`; the
/// modules below report failures through these enums so callers can tell a
/// transient poll failure apart from a fatal startup problem.
use std::path::PathBuf;
use thiserror::Error;

/// A single poll of the monitoring endpoint failed. Always recoverable.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed sensor payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Startup and lifecycle failures of the process supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("another instance is already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("monitor executable not found at {}", .0.display())]
    MonitorMissing(PathBuf),

    #[error("failed to launch monitor: {0}")]
    LaunchFailed(String),

    #[error("lock file error: {0}")]
    Lock(#[from] std::io::Error),
}

impl SupervisorError {
    /// Exit status for `main`. A second instance is not a failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            SupervisorError::AlreadyRunning { .. } => 0,
            _ => 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(SupervisorError::AlreadyRunning { pid: 42 }.exit_code(), 0);
        assert_eq!(
            SupervisorError::MonitorMissing(PathBuf::from("x.exe")).exit_code(),
            1
        );
        assert_eq!(SupervisorError::LaunchFailed("denied".into()).exit_code(), 1);
    }

    #[test]
    fn test_messages() {
        let err = SupervisorError::AlreadyRunning { pid: 1234 };
        assert_eq!(
            err.to_string(),
            "another instance is already running (pid 1234)"
        );
        let err = ConfigError::Invalid("cpu and gpu ids must differ".into());
        assert_eq!(err.to_string(), "invalid config: cpu and gpu ids must differ");
    }
}
