/// System tray icon for the overlay
///
/// The tray lives on its own thread because its platform loop blocks. It never
/// touches the overlay directly: menu clicks become `TrayEvent`s sent to the GUI
/// thread, and the GUI answers with `TrayCommand`s (visibility echo, shutdown)
/// so the toggle label stays in sync.
use anyhow::{anyhow, Context, Result};
use crossbeam::channel::{unbounded, Receiver, Sender, TryRecvError};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Duration;
use tray_icon::menu::{Menu, MenuEvent, MenuId, MenuItem, PredefinedMenuItem};
use tray_icon::{Icon, TrayIcon, TrayIconBuilder};

const TOOLTIP: &str = "HW Monitor Overlay";
const TOGGLE_ID: &str = "toggle-overlay";
const EXIT_ID: &str = "exit";

/// Side length the icon file is scaled to
const ICON_SIZE: u32 = 32;
/// Side length of the blank fallback icon
const FALLBACK_ICON_SIZE: u32 = 64;

/// Tray -> GUI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayEvent {
    /// User clicked Show/Hide
    ToggleOverlay,
    /// User clicked Exit
    Exit,
}

/// GUI -> Tray
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayCommand {
    /// Overlay visibility changed, refresh the toggle label
    VisibilityChanged(bool),
    /// Remove the icon and end the tray thread
    Shutdown,
}

/// Toggle item text for the current overlay state
pub fn toggle_label(visible: bool) -> &'static str {
    if visible {
        "Hide"
    } else {
        "Show"
    }
}

/// Map a menu click to the event the GUI should handle
pub fn classify_menu_event(id: &MenuId) -> Option<TrayEvent> {
    match id.0.as_str() {
        TOGGLE_ID => Some(TrayEvent::ToggleOverlay),
        EXIT_ID => Some(TrayEvent::Exit),
        _ => None,
    }
}

/// Decode the icon file into RGBA, or a blank white square if that fails
pub fn icon_rgba(path: &Path) -> (Vec<u8>, u32, u32) {
    match decode_icon(path) {
        Ok(icon) => icon,
        Err(e) => {
            tracing::debug!("Using blank tray icon: {}", e);
            let rgba = vec![0xFF; (FALLBACK_ICON_SIZE * FALLBACK_ICON_SIZE * 4) as usize];
            (rgba, FALLBACK_ICON_SIZE, FALLBACK_ICON_SIZE)
        }
    }
}

fn decode_icon(path: &Path) -> Result<(Vec<u8>, u32, u32)> {
    let icon_data = std::fs::read(path)
        .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;

    let img = image::load_from_memory(&icon_data)
        .map_err(|e| anyhow!("Failed to decode icon: {}", e))?;

    let img = img.resize_exact(ICON_SIZE, ICON_SIZE, image::imageops::FilterType::Lanczos3);
    Ok((img.to_rgba8().into_raw(), ICON_SIZE, ICON_SIZE))
}

/// Menu owned by the tray thread
struct TrayMenu {
    menu: Menu,
    toggle_item: MenuItem,
}

impl TrayMenu {
    fn new(visible: bool) -> Result<Self> {
        let menu = Menu::new();
        let toggle_item = MenuItem::with_id(TOGGLE_ID, toggle_label(visible), true, None);
        let separator = PredefinedMenuItem::separator();
        let exit_item = MenuItem::with_id(EXIT_ID, "Exit", true, None);

        menu.append(&toggle_item)
            .map_err(|e| anyhow!("Failed to add toggle item: {}", e))?;
        menu.append(&separator)
            .map_err(|e| anyhow!("Failed to add separator: {}", e))?;
        menu.append(&exit_item)
            .map_err(|e| anyhow!("Failed to add exit item: {}", e))?;

        Ok(Self { menu, toggle_item })
    }

    fn set_visible(&self, visible: bool) {
        self.toggle_item.set_text(toggle_label(visible));
    }
}

/// Handle held by `main` to stop the tray thread
pub struct TrayHandle {
    commands: Sender<TrayCommand>,
    thread: Option<JoinHandle<()>>,
}

impl TrayHandle {
    /// Sender for the GUI side
    pub fn commands(&self) -> Sender<TrayCommand> {
        self.commands.clone()
    }

    /// Remove the icon and wait for the thread to finish
    pub fn shutdown(mut self) {
        let _ = self.commands.send(TrayCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("Tray thread panicked");
            }
        }
    }
}

/// Start the tray thread
pub fn spawn_tray(icon_path: PathBuf, visible: bool, events: Sender<TrayEvent>) -> Result<TrayHandle> {
    let (commands_tx, commands_rx) = unbounded();

    let thread = std::thread::Builder::new()
        .name("tray".to_string())
        .spawn(move || {
            if let Err(e) = run_tray(&icon_path, visible, events, commands_rx) {
                tracing::error!("System tray unavailable: {:#}", e);
            }
        })
        .context("Failed to spawn tray thread")?;

    Ok(TrayHandle {
        commands: commands_tx,
        thread: Some(thread),
    })
}

fn run_tray(
    icon_path: &Path,
    visible: bool,
    events: Sender<TrayEvent>,
    commands: Receiver<TrayCommand>,
) -> Result<()> {
    tracing::info!("Creating tray icon");
    init_platform()?;

    let (rgba, width, height) = icon_rgba(icon_path);
    let icon = Icon::from_rgba(rgba, width, height)
        .map_err(|e| anyhow!("Failed to create icon from image: {:?}", e))?;

    let tray_menu = TrayMenu::new(visible)?;
    let _tray_icon: TrayIcon = TrayIconBuilder::new()
        .with_tooltip(TOOLTIP)
        .with_icon(icon)
        .with_menu(Box::new(tray_menu.menu.clone()))
        .build()
        .map_err(|e| anyhow!("Failed to create tray icon: {}", e))?;

    tracing::info!("Tray icon created successfully with context menu");

    let menu_events = MenuEvent::receiver();
    loop {
        pump_platform_messages();

        while let Ok(event) = menu_events.try_recv() {
            let Some(tray_event) = classify_menu_event(&event.id) else {
                continue;
            };
            tracing::info!("Tray menu: {:?}", tray_event);
            if events.send(tray_event).is_err() {
                tracing::info!("Overlay gone, stopping tray");
                return Ok(());
            }
        }

        loop {
            match commands.try_recv() {
                Ok(TrayCommand::VisibilityChanged(visible)) => tray_menu.set_visible(visible),
                Ok(TrayCommand::Shutdown) | Err(TryRecvError::Disconnected) => {
                    tracing::info!("Stopping tray icon");
                    return Ok(());
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        // Small sleep to avoid busy-waiting
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Pump Windows messages (required for tray icon events)
#[cfg(windows)]
fn pump_platform_messages() {
    use windows::Win32::UI::WindowsAndMessaging::{
        DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE,
    };

    unsafe {
        let mut msg = MSG::default();
        while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}

/// Run pending GTK events (menus, clicks) without blocking
#[cfg(target_os = "linux")]
fn pump_platform_messages() {
    while gtk::events_pending() {
        gtk::main_iteration_do(false);
    }
}

#[cfg(not(any(windows, target_os = "linux")))]
fn pump_platform_messages() {}

/// GTK must be initialised on the thread that owns the tray
#[cfg(target_os = "linux")]
fn init_platform() -> Result<()> {
    gtk::init().map_err(|e| anyhow!("GTK unavailable: {}", e))
}

#[cfg(not(target_os = "linux"))]
fn init_platform() -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_label() {
        assert_eq!(toggle_label(true), "Hide");
        assert_eq!(toggle_label(false), "Show");
    }

    #[test]
    fn test_classify_menu_event() {
        assert_eq!(
            classify_menu_event(&MenuId::new(TOGGLE_ID)),
            Some(TrayEvent::ToggleOverlay)
        );
        assert_eq!(classify_menu_event(&MenuId::new(EXIT_ID)), Some(TrayEvent::Exit));
        assert_eq!(classify_menu_event(&MenuId::new("something-else")), None);
    }

    #[test]
    fn test_missing_icon_falls_back_to_blank() {
        let (rgba, width, height) = icon_rgba(Path::new("no/such/icon.ico"));
        assert_eq!((width, height), (64, 64));
        assert_eq!(rgba.len(), 64 * 64 * 4);
        assert!(rgba.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_icon_is_scaled() {
        let dir = std::env::temp_dir().join(format!("hw_overlay_tray_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("icon.png");
        image::RgbaImage::from_pixel(8, 8, image::Rgba([255, 0, 0, 255]))
            .save(&path)
            .unwrap();

        let (rgba, width, height) = icon_rgba(&path);
        assert_eq!((width, height), (ICON_SIZE, ICON_SIZE));
        assert_eq!(rgba.len(), (ICON_SIZE * ICON_SIZE * 4) as usize);
        // Scaling a flat colour keeps it (give or take filter rounding)
        assert!(rgba[0] >= 250 && rgba[1] <= 5 && rgba[2] <= 5);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_tray_without_display_stops_cleanly() {
        use crossbeam::channel::RecvTimeoutError;

        std::env::remove_var("DISPLAY");
        std::env::remove_var("WAYLAND_DISPLAY");

        let (events_tx, events_rx) = unbounded();
        let handle = spawn_tray(PathBuf::from("no/such/icon.ico"), true, events_tx).unwrap();

        // The thread gives up on its own and drops its event sender
        assert_eq!(
            events_rx.recv_timeout(Duration::from_secs(10)),
            Err(RecvTimeoutError::Disconnected)
        );
        handle.shutdown();
    }
}
