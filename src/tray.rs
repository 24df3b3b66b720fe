//! System tray icon and menu
//!
//! The tray only decides *what* the user asked for; showing or hiding the
//! window is the host's job and happens through
//! [`WindowCommand`](crate::host::WindowCommand)s.

use anyhow::{Context, Result};
use log::debug;
use tray_icon::{
    menu::{Menu, MenuItem},
    Icon, MouseButton, MouseButtonState, TrayIcon, TrayIconBuilder, TrayIconEvent,
};

use crate::host::WindowCommand;
use crate::util::truncate;

const MENU_ID_OPEN: &str = "open";
const MENU_ID_EXIT: &str = "exit";

/// Menu entries in display order: (id, label)
const MENU_ITEMS: &[(&str, &str)] = &[(MENU_ID_OPEN, "Open"), (MENU_ID_EXIT, "Exit")];

pub const TOOLTIP: &str = "Neuro Karaoke";

/// macOS menu bar icons are 16pt template images
#[cfg(target_os = "macos")]
const MACOS_ICON_SIZE: u32 = 16;

/// Tooltips get cut off by some platforms well before this
const MAX_TOOLTIP_CHARS: usize = 120;

/// What the user asked for through the tray
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayEvent {
    /// "Open" menu item or double click
    Show,
    /// Single left click on the icon
    Toggle,
    /// "Exit" menu item
    Exit,
}

impl TrayEvent {
    pub fn from_menu_id(id: &str) -> Option<Self> {
        match id {
            MENU_ID_OPEN => Some(Self::Show),
            MENU_ID_EXIT => Some(Self::Exit),
            _ => None,
        }
    }

    pub fn from_icon_event(event: &TrayIconEvent) -> Option<Self> {
        match event {
            TrayIconEvent::Click {
                button: MouseButton::Left,
                button_state: MouseButtonState::Up,
                ..
            } => Some(Self::Toggle),
            TrayIconEvent::DoubleClick {
                button: MouseButton::Left,
                ..
            } => Some(Self::Show),
            _ => None,
        }
    }

    /// Window command the host should carry out
    pub fn window_command(self) -> WindowCommand {
        match self {
            Self::Show => WindowCommand::Show,
            Self::Toggle => WindowCommand::Toggle,
            Self::Exit => WindowCommand::Quit,
        }
    }
}

/// Tooltip for the current song
pub fn tooltip_for(song: Option<&str>) -> String {
    match song {
        Some(song) if !song.is_empty() => truncate(&format!("{TOOLTIP}\n{song}"), MAX_TOOLTIP_CHARS),
        _ => TOOLTIP.to_string(),
    }
}

/// Owns the tray icon; must live on the main thread.
pub struct TrayManager {
    tray_icon: TrayIcon,
}

impl TrayManager {
    /// Build the icon and menu. Menu and icon events are delivered through
    /// the global `tray_icon` handlers; map them with [`TrayEvent`].
    pub fn new(icon_png: &[u8]) -> Result<Self> {
        let icon = load_icon(icon_png)?;

        let menu = Menu::new();
        for (id, label) in MENU_ITEMS {
            menu.append(&MenuItem::with_id(*id, *label, true, None))?;
        }

        let builder = TrayIconBuilder::new()
            .with_icon(icon)
            .with_menu(Box::new(menu))
            .with_tooltip(TOOLTIP);
        #[cfg(target_os = "macos")]
        let builder = builder.with_icon_as_template(true);

        let tray_icon = builder.build().context("Failed to create tray icon")?;
        Ok(Self { tray_icon })
    }

    pub fn update_tooltip(&self, song: Option<&str>) {
        if let Err(e) = self.tray_icon.set_tooltip(Some(tooltip_for(song))) {
            debug!("Failed to update tray tooltip: {e}");
        }
    }
}

fn load_icon(png: &[u8]) -> Result<Icon> {
    let image = image::load_from_memory(png)
        .context("Failed to load tray icon image")?
        .into_rgba8();

    #[cfg(target_os = "macos")]
    let image = image::imageops::resize(
        &image,
        MACOS_ICON_SIZE,
        MACOS_ICON_SIZE,
        image::imageops::FilterType::Lanczos3,
    );

    let (width, height) = image.dimensions();
    Icon::from_rgba(image.into_raw(), width, height).context("Failed to create icon from RGBA data")
}
