/// Process lifecycle: single-instance lock and the bundled hardware monitor.
///
/// At startup the supervisor claims the lock file, launches the monitoring
/// tool (elevated, it needs driver access for sensors) and remembers its PID.
/// `shutdown` stops the monitor and removes the lock. It runs once no matter
/// how many exit paths call it.
use crate::config::{resolve_resource, AppConfig};
use crate::error::SupervisorError;
use parking_lot::Mutex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessStatus, Signal, System};

/// Poll step while waiting for the monitor to exit
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Whether `pid` refers to a running (non-zombie) process
pub fn is_process_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    if !system.refresh_process(pid) {
        return false;
    }
    system
        .process(pid)
        .map(|p| p.status() != ProcessStatus::Zombie)
        .unwrap_or(false)
}

/// PID-file marker preventing a second overlay instance.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    released: bool,
}

impl InstanceLock {
    /// Claim the lock, replacing it if the recorded process is gone.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, SupervisorError> {
        let path = path.into();

        match read_pid(&path) {
            Some(pid) if is_process_alive(pid) => {
                return Err(SupervisorError::AlreadyRunning { pid });
            }
            Some(pid) => {
                tracing::info!("Replacing stale lock file (pid {} is gone)", pid);
            }
            None if path.exists() => {
                tracing::warn!("Replacing unreadable lock file {}", path.display());
            }
            None => {}
        }

        fs::write(&path, std::process::id().to_string())?;
        tracing::debug!("Lock file written: {}", path.display());

        Ok(Self {
            path,
            released: false,
        })
    }

    /// Remove the lock file. Failures are logged, never fatal.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        match fs::remove_file(&self.path) {
            Ok(()) => tracing::info!("Removed lock file."),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove lock file: {}", e),
        }
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        self.release();
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Starts the external monitoring executable.
pub trait ProcessLauncher {
    /// Launch `executable` in `working_dir`, returning its PID.
    fn launch(&self, executable: &Path, working_dir: &Path) -> Result<u32, SupervisorError>;
}

/// Plain spawn with the current privileges.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectLauncher;

impl ProcessLauncher for DirectLauncher {
    fn launch(&self, executable: &Path, working_dir: &Path) -> Result<u32, SupervisorError> {
        let child = Command::new(executable)
            .current_dir(working_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SupervisorError::LaunchFailed(e.to_string()))?;
        Ok(child.id())
    }
}

/// Spawn through the platform's privilege elevation prompt.
#[derive(Debug, Default, Clone, Copy)]
pub struct ElevatedLauncher;

#[cfg(windows)]
impl ProcessLauncher for ElevatedLauncher {
    fn launch(&self, executable: &Path, working_dir: &Path) -> Result<u32, SupervisorError> {
        use windows::core::{w, HSTRING, PCWSTR};
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Threading::GetProcessId;
        use windows::Win32::UI::Shell::{
            ShellExecuteExW, SEE_MASK_NOCLOSEPROCESS, SHELLEXECUTEINFOW,
        };
        use windows::Win32::UI::WindowsAndMessaging::SW_SHOW;

        let file = HSTRING::from(executable.as_os_str());
        let directory = HSTRING::from(working_dir.as_os_str());

        let mut info = SHELLEXECUTEINFOW {
            cbSize: std::mem::size_of::<SHELLEXECUTEINFOW>() as u32,
            fMask: SEE_MASK_NOCLOSEPROCESS,
            lpVerb: w!("runas"),
            lpFile: PCWSTR(file.as_ptr()),
            lpDirectory: PCWSTR(directory.as_ptr()),
            nShow: SW_SHOW.0 as i32,
            ..Default::default()
        };

        unsafe {
            ShellExecuteExW(&mut info)
                .map_err(|e| SupervisorError::LaunchFailed(e.to_string()))?;

            let pid = GetProcessId(info.hProcess);
            let _ = CloseHandle(info.hProcess);

            if pid == 0 {
                return Err(SupervisorError::LaunchFailed(
                    "elevated process handle has no PID".to_string(),
                ));
            }
            Ok(pid)
        }
    }
}

#[cfg(not(windows))]
impl ProcessLauncher for ElevatedLauncher {
    fn launch(&self, executable: &Path, working_dir: &Path) -> Result<u32, SupervisorError> {
        let child = Command::new("pkexec")
            .arg(executable)
            .current_dir(working_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SupervisorError::LaunchFailed(format!("pkexec: {}", e)))?;
        Ok(child.id())
    }
}

/// How a termination request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// Exited within the grace period
    Terminated,
    /// Force-killed after the grace period
    Killed,
    NotFound,
    Failed,
}

/// Ask `pid` to exit, force-killing it once `grace` has passed.
pub fn terminate_process(pid: u32, grace: Duration) -> TerminateOutcome {
    let sys_pid = Pid::from_u32(pid);
    let mut system = System::new();

    if !system.refresh_process(sys_pid) {
        tracing::warn!("No process found with PID {}", pid);
        return TerminateOutcome::NotFound;
    }
    let Some(process) = system.process(sys_pid) else {
        tracing::warn!("No process found with PID {}", pid);
        return TerminateOutcome::NotFound;
    };

    // SIGTERM where the platform has it, a hard stop elsewhere
    let requested = process
        .kill_with(Signal::Term)
        .unwrap_or_else(|| process.kill());
    if !requested {
        tracing::error!("Error terminating process {}", pid);
        return TerminateOutcome::Failed;
    }

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if !is_process_alive(pid) {
            tracing::info!("Terminated process with PID {}", pid);
            return TerminateOutcome::Terminated;
        }
        std::thread::sleep(EXIT_POLL_INTERVAL);
    }

    if !is_process_alive(pid) {
        tracing::info!("Terminated process with PID {}", pid);
        return TerminateOutcome::Terminated;
    }

    system.refresh_process(sys_pid);
    match system.process(sys_pid) {
        Some(process) if process.kill() => {
            tracing::info!("Killed process with PID {} after timeout", pid);
            TerminateOutcome::Killed
        }
        _ => {
            tracing::error!("Error terminating process {}: kill failed", pid);
            TerminateOutcome::Failed
        }
    }
}

/// Owns the instance lock and the monitor process for the app's lifetime.
pub struct Supervisor {
    lock: Mutex<Option<InstanceLock>>,
    monitor_pid: Mutex<Option<u32>>,
    grace: Duration,
    shut_down: AtomicBool,
}

impl Supervisor {
    /// Claim the instance lock and launch the monitor.
    pub fn start(config: &AppConfig, launcher: &dyn ProcessLauncher) -> Result<Self, SupervisorError> {
        let lock = InstanceLock::acquire(&config.lock_file)?;

        let executable = resolve_resource(&config.monitor_executable);
        if !executable.exists() {
            tracing::error!("Monitor executable not found at {}", executable.display());
            return Err(SupervisorError::MonitorMissing(executable));
        }
        let working_dir = resolve_resource(&config.monitor_working_dir);

        // The lock is dropped (and removed) if the launch fails
        let pid = launcher.launch(&executable, &working_dir).map_err(|e| {
            tracing::error!("Failed to launch {}: {}", executable.display(), e);
            e
        })?;
        tracing::info!("Launched {} with PID {}", executable.display(), pid);

        Ok(Self {
            lock: Mutex::new(Some(lock)),
            monitor_pid: Mutex::new(Some(pid)),
            grace: config.shutdown_grace(),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn monitor_pid(&self) -> Option<u32> {
        *self.monitor_pid.lock()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Stop the monitor and remove the lock file.
    /// Returns false if cleanup already ran.
    pub fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return false;
        }

        tracing::info!("Cleaning up: terminating monitor");
        if let Some(pid) = self.monitor_pid.lock().take() {
            terminate_process(pid, self.grace);
        }
        if let Some(mut lock) = self.lock.lock().take() {
            lock.release();
        }
        true
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A PID above any kernel's pid_max
    const DEAD_PID: u32 = 999_999_999;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("hw_overlay_supervisor_{}_{}", std::process::id(), name));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    struct FakeLauncher {
        result: Result<u32, String>,
    }

    impl ProcessLauncher for FakeLauncher {
        fn launch(&self, _executable: &Path, _working_dir: &Path) -> Result<u32, SupervisorError> {
            self.result.clone().map_err(SupervisorError::LaunchFailed)
        }
    }

    fn test_config(dir: &Path) -> AppConfig {
        let executable = dir.join("monitor.exe");
        fs::write(&executable, b"").unwrap();
        AppConfig {
            monitor_executable: executable,
            monitor_working_dir: dir.to_path_buf(),
            lock_file: dir.join("hw_overlay.lock"),
            monitor_shutdown_grace_ms: 200,
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_lock_writes_own_pid_and_releases() {
        let dir = scratch_dir("lock");
        let path = dir.join("app.lock");

        let mut lock = InstanceLock::acquire(&path).unwrap();
        assert_eq!(read_pid(&path), Some(std::process::id()));

        lock.release();
        assert!(!path.exists());
    }

    #[test]
    fn test_live_lock_refuses_second_instance() {
        let dir = scratch_dir("live");
        let path = dir.join("app.lock");

        let _held = InstanceLock::acquire(&path).unwrap();
        match InstanceLock::acquire(&path) {
            Err(SupervisorError::AlreadyRunning { pid }) => assert_eq!(pid, std::process::id()),
            other => panic!("expected AlreadyRunning, got {:?}", other),
        }
        assert!(path.exists());
    }

    #[test]
    fn test_stale_and_garbage_locks_are_replaced() {
        let dir = scratch_dir("stale");
        let path = dir.join("app.lock");

        fs::write(&path, DEAD_PID.to_string()).unwrap();
        let lock = InstanceLock::acquire(&path).unwrap();
        assert_eq!(read_pid(&path), Some(std::process::id()));
        drop(lock);
        assert!(!path.exists());

        fs::write(&path, "not a pid").unwrap();
        let _lock = InstanceLock::acquire(&path).unwrap();
        assert_eq!(read_pid(&path), Some(std::process::id()));
    }

    #[test]
    fn test_liveness() {
        assert!(is_process_alive(std::process::id()));
        assert!(!is_process_alive(DEAD_PID));
    }

    #[test]
    fn test_terminate_missing_process() {
        assert_eq!(
            terminate_process(DEAD_PID, Duration::from_millis(100)),
            TerminateOutcome::NotFound
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_running_process() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let outcome = terminate_process(child.id(), Duration::from_secs(3));
        assert_eq!(outcome, TerminateOutcome::Terminated);
        let _ = child.wait();
    }

    #[test]
    fn test_supervisor_start_and_single_shutdown() {
        let dir = scratch_dir("start");
        let config = test_config(&dir);
        let launcher = FakeLauncher { result: Ok(DEAD_PID) };

        let supervisor = Supervisor::start(&config, &launcher).unwrap();
        assert_eq!(supervisor.monitor_pid(), Some(DEAD_PID));
        assert!(config.lock_file.exists());

        assert!(supervisor.shutdown());
        assert!(!supervisor.shutdown(), "cleanup must run once");
        assert!(supervisor.is_shut_down());
        assert_eq!(supervisor.monitor_pid(), None);
        assert!(!config.lock_file.exists());
    }

    #[test]
    fn test_supervisor_refuses_second_instance() {
        let dir = scratch_dir("second");
        let config = test_config(&dir);
        let launcher = FakeLauncher { result: Ok(DEAD_PID) };

        let _first = Supervisor::start(&config, &launcher).unwrap();
        let second = Supervisor::start(&config, &launcher);
        assert!(matches!(second, Err(SupervisorError::AlreadyRunning { .. })));
    }

    #[test]
    fn test_missing_executable_is_fatal_and_releases_lock() {
        let dir = scratch_dir("missing");
        let config = AppConfig {
            monitor_executable: dir.join("nope.exe"),
            ..test_config(&dir)
        };
        let launcher = FakeLauncher { result: Ok(DEAD_PID) };

        let result = Supervisor::start(&config, &launcher);
        assert!(matches!(result, Err(SupervisorError::MonitorMissing(_))));
        assert!(!config.lock_file.exists());
    }

    #[test]
    fn test_launch_failure_releases_lock() {
        let dir = scratch_dir("launch");
        let config = test_config(&dir);
        let launcher = FakeLauncher {
            result: Err("elevation denied".to_string()),
        };

        let result = Supervisor::start(&config, &launcher);
        assert!(matches!(result, Err(SupervisorError::LaunchFailed(_))));
        assert!(!config.lock_file.exists());
    }

    #[test]
    fn test_direct_launcher_reports_spawn_failure() {
        let dir = scratch_dir("direct");
        let result = DirectLauncher.launch(&dir.join("no_such_monitor"), &dir);
        assert!(matches!(result, Err(SupervisorError::LaunchFailed(_))));
    }
}
