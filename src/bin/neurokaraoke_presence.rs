//! Neuro Karaoke now-playing bridge - system tray application
//!
//! Spawned by the host window that renders the web player. The host streams
//! page snapshots and transport commands on stdin; events, UI actions and
//! window commands go back on stdout.
//!
//! Architecture:
//! - Main thread: winit event loop for the tray icon and menu
//! - Stdin thread: reads host messages and feeds the watcher
//! - Watcher thread: timers and detection passes

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use neurokaraoke_presence::config::Config;
use neurokaraoke_presence::events::JsonLinesSink;
use neurokaraoke_presence::host::{self, HostWriter};
use neurokaraoke_presence::media_session::MediaSessionBridge;
use neurokaraoke_presence::presence::DiscordSession;
use neurokaraoke_presence::tray::{TrayEvent, TrayManager};
use neurokaraoke_presence::{EventSink, PlayerEvent, Reconciler, Watcher, WatcherHandle};
use std::io::{self, Stdout};
use std::sync::{Arc, Mutex};
use std::thread;
use tray_icon::menu::MenuEvent;
use tray_icon::TrayIconEvent;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy};
use winit::window::WindowId;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Events delivered to the main thread
#[derive(Debug, Clone)]
enum UserEvent {
    Tray(TrayEvent),
    /// New song text for the tooltip
    NowPlaying(String),
    /// Host closed stdin or asked us to stop
    HostClosed,
}

/// Forwards song changes to the tray tooltip
struct TraySink {
    proxy: EventLoopProxy<UserEvent>,
}

impl EventSink for TraySink {
    fn emit(&mut self, event: &PlayerEvent) {
        if let PlayerEvent::UpdateSong(song) = event {
            let _ = self.proxy.send_event(UserEvent::NowPlaying(song.display()));
        }
    }
}

struct App {
    tray: TrayManager,
    host: HostWriter<Stdout>,
    watcher: Arc<WatcherHandle>,
}

impl App {
    fn quit(&self, event_loop: &ActiveEventLoop) {
        info!("Shutting down...");
        self.watcher.shutdown();
        event_loop.exit();
    }
}

impl ApplicationHandler<UserEvent> for App {
    fn resumed(&mut self, _event_loop: &ActiveEventLoop) {
        // No windows of our own
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, _event: WindowEvent) {}

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: UserEvent) {
        match event {
            UserEvent::Tray(tray_event) => {
                if let Err(e) = self.host.window(tray_event.window_command()) {
                    warn!("Failed to send window command: {e:#}");
                }
                if tray_event == TrayEvent::Exit {
                    self.quit(event_loop);
                }
            }
            UserEvent::NowPlaying(song) => self.tray.update_tooltip(Some(&song)),
            UserEvent::HostClosed => self.quit(event_loop),
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    if std::env::args().skip(1).any(|a| a == "--version" || a == "-V") {
        println!("neurokaraoke-presence {VERSION}");
        return;
    }

    if let Err(e) = run() {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    info!("Neuro Karaoke presence v{VERSION} starting...");

    let config = Config::load().unwrap_or_else(|e| {
        warn!("{e:#}; using defaults");
        Config::default()
    });

    let event_loop = EventLoop::<UserEvent>::with_user_event()
        .build()
        .map_err(|e| anyhow!("Failed to create event loop: {e}"))?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let menu_proxy = event_loop.create_proxy();
    MenuEvent::set_event_handler(Some(move |event: MenuEvent| {
        if let Some(tray_event) = TrayEvent::from_menu_id(event.id.0.as_str()) {
            let _ = menu_proxy.send_event(UserEvent::Tray(tray_event));
        }
    }));
    let icon_proxy = event_loop.create_proxy();
    TrayIconEvent::set_event_handler(Some(move |event: TrayIconEvent| {
        if let Some(tray_event) = TrayEvent::from_icon_event(&event) {
            let _ = icon_proxy.send_event(UserEvent::Tray(tray_event));
        }
    }));

    let tray = TrayManager::new(include_bytes!("../../assets/tray_icon.png"))?;
    info!("System tray initialized");

    let host = HostWriter::new(Arc::new(Mutex::new(io::stdout())));

    let mut reconciler = Reconciler::new(config.diagnostic_interval());
    reconciler.add_sink(JsonLinesSink::new(host.writer()));
    reconciler.add_sink(TraySink {
        proxy: event_loop.create_proxy(),
    });
    match &config.discord_app_id {
        Some(app_id) => {
            let mut bridge = MediaSessionBridge::new(DiscordSession::new(app_id.as_str())?);
            bridge.register_actions();
            reconciler.add_sink(bridge);
            info!("Discord presence enabled");
        }
        None => info!("No discord_app_id configured, Discord presence disabled"),
    }

    let watcher = Arc::new(Watcher::new(&config, reconciler, host.clone()).spawn()?);

    let stdin_watcher = Arc::clone(&watcher);
    let closed_proxy = event_loop.create_proxy();
    thread::Builder::new()
        .name("host-reader".into())
        .spawn(move || {
            let stdin = io::stdin();
            if let Err(e) = host::read_messages(stdin.lock(), |m| host::dispatch(m, &stdin_watcher)) {
                warn!("{e:#}");
                stdin_watcher.shutdown();
            }
            let _ = closed_proxy.send_event(UserEvent::HostClosed);
        })
        .context("Failed to spawn host reader thread")?;

    let mut app = App { tray, host, watcher };
    info!("Running event loop...");
    event_loop
        .run_app(&mut app)
        .map_err(|e| anyhow!("Event loop failed: {e}"))
}
