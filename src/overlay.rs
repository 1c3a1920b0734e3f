/// Overlay window
///
/// A small borderless, always-on-top iced window with two labels (CPU, GPU)
/// pinned to a screen corner. The poll cycle runs on iced's executor:
/// poll -> display -> sleep(interval) -> poll. Tray clicks and termination
/// signals come in through subscriptions.
use crate::config::{resolve_resource, AppConfig, Corner};
use crate::poller::{PollSchedule, Readings, SensorPoller};
use crate::signals;
use crate::supervisor::Supervisor;
use crate::tray::{TrayCommand, TrayEvent};
use crossbeam::channel::{Receiver, Sender, TryRecvError};
use iced::font::{Family, Weight};
use iced::widget::{container, row, text};
use iced::window::{self, Level, Mode, Position};
use iced::{
    application, executor, theme, Alignment, Application, Background, Color, Command,
    Element, Font, Length, Point, Settings, Size, Subscription, Theme,
};
use std::sync::Arc;
use std::time::Duration;

/// Distance from the screen edges
const MARGIN: f32 = 10.0;
/// How often the tray channel is checked
const TRAY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Bold face registered from the bundled font file
const OUTFIT_BOLD: Font = Font {
    family: Family::Name("Outfit"),
    weight: Weight::Bold,
    ..Font::DEFAULT
};

/// What the overlay shows and whether it is shown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayState {
    visible: bool,
    cpu_text: String,
    gpu_text: String,
}

impl Default for OverlayState {
    fn default() -> Self {
        let pending = Readings::pending();
        Self {
            visible: true,
            cpu_text: pending.cpu,
            gpu_text: pending.gpu,
        }
    }
}

impl OverlayState {
    pub fn set_cpu_text(&mut self, text: impl Into<String>) {
        self.cpu_text = text.into();
    }

    pub fn set_gpu_text(&mut self, text: impl Into<String>) {
        self.gpu_text = text.into();
    }

    pub fn apply(&mut self, readings: Readings) {
        self.set_cpu_text(readings.cpu);
        self.set_gpu_text(readings.gpu);
    }

    /// Returns true if the state changed
    pub fn hide(&mut self) -> bool {
        std::mem::replace(&mut self.visible, false)
    }

    /// Returns true if the state changed
    pub fn show(&mut self) -> bool {
        !std::mem::replace(&mut self.visible, true)
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn cpu_text(&self) -> &str {
        &self.cpu_text
    }

    pub fn gpu_text(&self) -> &str {
        &self.gpu_text
    }
}

/// Everything the overlay needs from `main`
pub struct OverlayFlags {
    pub config: AppConfig,
    pub poller: SensorPoller,
    pub tray_events: Receiver<TrayEvent>,
    pub tray_commands: Option<Sender<TrayCommand>>,
    pub supervisor: Arc<Supervisor>,
}

#[derive(Debug, Clone)]
pub enum Message {
    /// Interval elapsed, start the next request
    PollDue,
    /// Request finished (successfully or not)
    Polled(Readings),
    Tray(TrayEvent),
    /// Window manager close button / Alt-F4
    CloseRequested,
    TerminationSignal(&'static str),
}

pub struct HwOverlay {
    state: OverlayState,
    schedule: PollSchedule,
    poller: SensorPoller,
    opacity: f32,
    font_size: f32,
    tray_events: Receiver<TrayEvent>,
    tray_commands: Option<Sender<TrayCommand>>,
    supervisor: Arc<Supervisor>,
}

impl HwOverlay {
    fn from_flags(flags: OverlayFlags) -> Self {
        HwOverlay {
            state: OverlayState::default(),
            schedule: PollSchedule::new(flags.config.poll_interval()),
            poller: flags.poller,
            opacity: flags.config.opacity,
            font_size: flags.config.font_size,
            tray_events: flags.tray_events,
            tray_commands: flags.tray_commands,
            supervisor: flags.supervisor,
        }
    }

    fn start_poll(&mut self) -> Command<Message> {
        if !self.schedule.begin() {
            return Command::none();
        }
        let poller = self.poller.clone();
        Command::perform(async move { poller.poll().await }, Message::Polled)
    }

    fn finish_poll(&mut self, readings: Readings) -> Command<Message> {
        self.state.apply(readings);
        let delay = self.schedule.complete();
        Command::perform(async move { tokio::time::sleep(delay).await }, |_| Message::PollDue)
    }

    fn notify_tray(&self) {
        if let Some(ref commands) = self.tray_commands {
            let _ = commands.send(TrayCommand::VisibilityChanged(self.state.is_visible()));
        }
    }

    fn hide(&mut self) -> Command<Message> {
        if !self.state.hide() {
            return Command::none();
        }
        tracing::info!("Overlay hidden");
        self.notify_tray();
        window::change_mode(window::Id::MAIN, Mode::Hidden)
    }

    fn show(&mut self) -> Command<Message> {
        if !self.state.show() {
            return Command::none();
        }
        tracing::info!("Overlay shown");
        self.notify_tray();
        Command::batch([
            window::change_mode(window::Id::MAIN, Mode::Windowed),
            window::change_level(window::Id::MAIN, Level::AlwaysOnTop),
        ])
    }

    fn exit(&mut self) -> Command<Message> {
        self.supervisor.shutdown();
        if let Some(ref commands) = self.tray_commands {
            let _ = commands.send(TrayCommand::Shutdown);
        }
        window::close(window::Id::MAIN)
    }
}

impl Application for HwOverlay {
    type Executor = executor::Default;
    type Message = Message;
    type Theme = Theme;
    type Flags = OverlayFlags;

    fn new(flags: OverlayFlags) -> (Self, Command<Message>) {
        let mut app = HwOverlay::from_flags(flags);
        tracing::info!("Polling {}", app.poller.url());

        let command = app.start_poll();
        (app, command)
    }

    fn title(&self) -> String {
        String::from("HW Monitor Overlay")
    }

    fn update(&mut self, message: Message) -> Command<Message> {
        match message {
            Message::PollDue => self.start_poll(),
            Message::Polled(readings) => self.finish_poll(readings),
            Message::Tray(TrayEvent::ToggleOverlay) => {
                if self.state.is_visible() {
                    self.hide()
                } else {
                    self.show()
                }
            }
            Message::Tray(TrayEvent::Exit) => {
                tracing::info!("Exiting application via system tray.");
                self.exit()
            }
            Message::CloseRequested => self.hide(),
            Message::TerminationSignal(name) => {
                tracing::info!("Received signal {}, exiting application.", name);
                self.exit()
            }
        }
    }

    fn view(&self) -> Element<'_, Message> {
        let text_color = Color::from_rgba(1.0, 1.0, 1.0, self.opacity);

        let labels = row![
            text(self.state.cpu_text()).size(self.font_size).style(text_color),
            text(self.state.gpu_text()).size(self.font_size).style(text_color),
        ]
        .spacing(10)
        .align_items(Alignment::Center);

        container(labels)
            .padding(5)
            .width(Length::Fill)
            .height(Length::Fill)
            .center_x()
            .center_y()
            .style(theme::Container::Custom(Box::new(Panel {
                opacity: self.opacity,
            })))
            .into()
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }

    fn style(&self) -> theme::Application {
        theme::Application::Custom(Box::new(ClearBackground))
    }

    fn subscription(&self) -> Subscription<Message> {
        struct TrayListener;
        struct SignalListener;

        let tray_sub = iced::subscription::unfold(
            std::any::TypeId::of::<TrayListener>(),
            self.tray_events.clone(),
            |events: Receiver<TrayEvent>| async move {
                loop {
                    match events.try_recv() {
                        Ok(event) => return (Message::Tray(event), events),
                        Err(TryRecvError::Empty) => tokio::time::sleep(TRAY_POLL_INTERVAL).await,
                        // Tray thread is gone; nothing more will arrive
                        Err(TryRecvError::Disconnected) => std::future::pending::<()>().await,
                    }
                }
            },
        );

        let signal_sub = iced::subscription::unfold(
            std::any::TypeId::of::<SignalListener>(),
            (),
            |_| async move {
                let name = signals::wait_for_termination().await;
                (Message::TerminationSignal(name), ())
            },
        );

        let close_sub = iced::event::listen_with(|event, _status| match event {
            iced::Event::Window(_, window::Event::CloseRequested) => Some(Message::CloseRequested),
            _ => None,
        });

        Subscription::batch([tray_sub, signal_sub, close_sub])
    }
}

/// Translucent black panel behind the labels
struct Panel {
    opacity: f32,
}

impl container::StyleSheet for Panel {
    type Style = Theme;

    fn appearance(&self, _style: &Self::Style) -> container::Appearance {
        container::Appearance {
            text_color: Some(Color::WHITE),
            background: Some(Background::Color(Color::from_rgba(0.0, 0.0, 0.0, self.opacity))),
            ..Default::default()
        }
    }
}

/// Lets the transparent window surface show through outside the panel
struct ClearBackground;

impl application::StyleSheet for ClearBackground {
    type Style = Theme;

    fn appearance(&self, _style: &Self::Style) -> application::Appearance {
        application::Appearance {
            background_color: Color::TRANSPARENT,
            text_color: Color::WHITE,
        }
    }
}

/// Top-left point of a `window` sized overlay on a `monitor` sized screen
pub fn corner_position(corner: Corner, window: Size, monitor: Size) -> Point {
    let right = monitor.width - window.width - MARGIN;
    let bottom = monitor.height - window.height - MARGIN;
    match corner {
        Corner::TopLeft => Point::new(MARGIN, MARGIN),
        Corner::TopRight => Point::new(right, MARGIN),
        Corner::BottomLeft => Point::new(MARGIN, bottom),
        Corner::BottomRight => Point::new(right, bottom),
    }
}

fn window_position(corner: Corner) -> Position {
    let place: fn(Size, Size) -> Point = match corner {
        Corner::TopLeft => |w, m| corner_position(Corner::TopLeft, w, m),
        Corner::TopRight => |w, m| corner_position(Corner::TopRight, w, m),
        Corner::BottomLeft => |w, m| corner_position(Corner::BottomLeft, w, m),
        Corner::BottomRight => |w, m| corner_position(Corner::BottomRight, w, m),
    };
    Position::SpecificWith(place)
}

/// Run the overlay until it is closed via the tray or a signal
pub fn run(flags: OverlayFlags) -> iced::Result {
    let config = &flags.config;

    let window_settings = window::Settings {
        size: Size::new(config.window_width, config.window_height),
        position: window_position(config.corner),
        visible: true,
        resizable: false,
        decorations: false,
        transparent: true,
        level: Level::AlwaysOnTop,
        exit_on_close_request: false,
        ..Default::default()
    };

    let font_path = resolve_resource(&config.font_file);
    let font_bytes = match std::fs::read(&font_path) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::warn!("Font {} unavailable ({}), using default", font_path.display(), e);
            None
        }
    };

    let mut settings = Settings::with_flags(flags);
    settings.window = window_settings;
    match font_bytes {
        Some(bytes) => {
            settings.fonts.push(bytes.into());
            settings.default_font = OUTFIT_BOLD;
        }
        None => {
            settings.default_font = Font {
                weight: Weight::Bold,
                ..Font::DEFAULT
            };
        }
    }

    HwOverlay::run(settings)
}
