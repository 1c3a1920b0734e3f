/// Configuration module for the hardware overlay.
///
/// This module provides functionality for managing application configuration,
/// including:
/// - The monitoring endpoint and the sensor ids to display
/// - Poll interval and request timeout
/// - The bundled monitor executable and how to launch it
/// - Overlay window geometry and look
/// - Determining the appropriate data directory for the application
///
/// Sensor ids depend on the monitoring tool's version and hardware, so they
/// live here instead of in code. The configuration is read from
/// `hw_overlay.json` in the working directory, or from `config.json` in the
/// platform-specific application data directory (%APPDATA%/HwOverlay/ on
/// Windows).
///
/// # Example
///
/// ```rust,no_run
/// use hw_overlay::config::{load_config, save_config};
///
/// // Load existing config or get defaults
/// let mut config = load_config().config;
///
/// // Point the overlay at different sensors
/// config.cpu_sensor_id = 12;
/// config.gpu_sensor_id = 48;
///
/// // Save changes
/// save_config(&config).expect("Failed to save config");
/// ```
use crate::error::ConfigError;
use crate::sensor::TargetIdSet;
use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the working directory before the data directory.
pub const LOCAL_CONFIG_FILE: &str = "hw_overlay.json";

/// Screen corner the overlay is pinned to.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    TopLeft,
    #[default]
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Application configuration
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// JSON endpoint served by the monitoring tool
    pub endpoint_url: String,
    /// Sensor id of the CPU temperature reading
    pub cpu_sensor_id: i64,
    /// Sensor id of the GPU temperature reading
    pub gpu_sensor_id: i64,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,

    /// Monitor executable, relative to the install directory unless absolute
    pub monitor_executable: PathBuf,
    pub monitor_working_dir: PathBuf,
    /// Launch the monitor with elevated privileges (it needs them for sensors)
    pub elevate_monitor: bool,
    /// How long the monitor gets to exit before it is force-killed
    pub monitor_shutdown_grace_ms: u64,

    pub lock_file: PathBuf,
    pub log_file: PathBuf,
    pub icon_file: PathBuf,
    pub font_file: PathBuf,

    /// Panel opacity, 0 exclusive to 1 inclusive
    pub opacity: f32,
    pub window_width: f32,
    pub window_height: f32,
    pub corner: Corner,
    pub font_size: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            endpoint_url: "http://localhost:8085/data.json".to_string(),
            cpu_sensor_id: 19,
            gpu_sensor_id: 61,
            poll_interval_ms: 2500,
            request_timeout_ms: 5000,
            monitor_executable: PathBuf::from("OpenHardwareMonitor/OpenHardwareMonitor.exe"),
            monitor_working_dir: PathBuf::from("OpenHardwareMonitor"),
            elevate_monitor: true,
            monitor_shutdown_grace_ms: 5000,
            lock_file: PathBuf::from("hw_overlay.lock"),
            log_file: PathBuf::from("hw_overlay.log"),
            icon_file: PathBuf::from("icon.ico"),
            font_file: PathBuf::from("Outfit-Bold.ttf"),
            opacity: 0.5,
            window_width: 180.0,
            window_height: 60.0,
            corner: Corner::TopRight,
            font_size: 14.0,
        }
    }
}

impl AppConfig {
    pub fn target_ids(&self) -> TargetIdSet {
        TargetIdSet::new(self.cpu_sensor_id, self.gpu_sensor_id)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.monitor_shutdown_grace_ms)
    }

    /// Reject settings the overlay cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cpu_sensor_id == self.gpu_sensor_id {
            return Err(ConfigError::Invalid(
                "cpu_sensor_id and gpu_sensor_id must differ".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("request_timeout_ms must be positive".to_string()));
        }
        if !(self.opacity > 0.0 && self.opacity <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "opacity must be in (0, 1], got {}",
                self.opacity
            )));
        }
        Ok(())
    }
}

/// Get the application's data directory
/// Returns %APPDATA%/HwOverlay/ on Windows
/// Creates directory if it doesn't exist
pub fn get_data_directory() -> Result<PathBuf> {
    let project_dirs = ProjectDirs::from("", "", "HwOverlay")
        .ok_or_else(|| anyhow!("Failed to determine user data directory"))?;

    let data_dir = project_dirs.data_dir();

    fs::create_dir_all(data_dir)
        .map_err(|e| anyhow!("Failed to create data directory: {}", e))?;

    Ok(data_dir.to_path_buf())
}

/// Read and validate a config file
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

/// Outcome of a config lookup, kept until logging is up
#[derive(Debug, Default)]
pub struct LoadedConfig {
    pub config: AppConfig,
    /// File the config came from, `None` for defaults
    pub source: Option<PathBuf>,
    /// Files that existed but could not be used
    pub rejected: Vec<(PathBuf, ConfigError)>,
}

impl LoadedConfig {
    /// Report where the config came from and which files were skipped
    pub fn log(&self) {
        for (path, e) in &self.rejected {
            tracing::warn!("Ignoring {}: {}", path.display(), e);
        }
        match self.source {
            Some(ref path) => tracing::info!("Loaded config from {}", path.display()),
            None => tracing::info!("Using default config"),
        }
    }
}

/// Load application configuration
/// Returns default config if no file exists or on error
pub fn load_config() -> LoadedConfig {
    let mut candidates = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
    if let Ok(data_dir) = get_data_directory() {
        candidates.push(data_dir.join("config.json"));
    }
    load_first_config(&candidates)
}

/// Use the first candidate that exists and parses
pub fn load_first_config(candidates: &[PathBuf]) -> LoadedConfig {
    let mut loaded = LoadedConfig::default();

    for path in candidates.iter().filter(|p| p.exists()) {
        match load_config_from(path) {
            Ok(config) => {
                loaded.config = config;
                loaded.source = Some(path.clone());
                return loaded;
            }
            Err(e) => loaded.rejected.push((path.clone(), e)),
        }
    }

    loaded
}

/// Whether any config file exists yet
pub fn config_exists() -> bool {
    if Path::new(LOCAL_CONFIG_FILE).exists() {
        return true;
    }
    get_data_directory()
        .map(|dir| dir.join("config.json").exists())
        .unwrap_or(false)
}

/// Save application configuration to config.json
pub fn save_config(config: &AppConfig) -> Result<()> {
    let data_dir = get_data_directory()?;
    let config_path = data_dir.join("config.json");

    // Serialize to pretty-printed JSON
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

    fs::write(&config_path, json)
        .map_err(|e| anyhow!("Failed to write config.json: {}", e))?;

    Ok(())
}

/// Resolve a bundled resource path
/// Looks next to the running executable first, then in the working directory.
/// Absolute paths are returned unchanged.
pub fn resolve_resource(relative: &Path) -> PathBuf {
    if relative.is_absolute() {
        return relative.to_path_buf();
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
    {
        let candidate = exe_dir.join(relative);
        if candidate.exists() {
            return candidate;
        }
    }

    let current_dir = std::env::current_dir().unwrap_or_default();
    current_dir.join(relative)
}
