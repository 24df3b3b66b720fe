//! OS now-playing integration
//!
//! [`MediaSessionBridge`] mirrors published events into a [`MediaSession`]
//! (the platform's now-playing surface) and [`resolve_transport`] turns the
//! transport commands that surface sends back into actions on the page.
//!
//! Failures on the OS side are logged and swallowed: an unsupported action or
//! position API must never stop the rest from working.

use anyhow::Result;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::events::{EventSink, PlayerEvent};
use crate::extract::icon::{classify_icon, IconShape};
use crate::extract::{MOBILE_SURFACE, PLAYER_SURFACE};
use crate::page::{attr, Page};

/// Sizes advertised for the artwork
pub const ARTWORK_SIZES: [&str; 3] = ["96x96", "256x256", "512x512"];

/// Transport commands the OS can send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportAction {
    Play,
    Pause,
    PreviousTrack,
    NextTrack,
    SeekBackward,
    SeekForward,
}

impl TransportAction {
    pub const ALL: [TransportAction; 6] = [
        Self::Play,
        Self::Pause,
        Self::PreviousTrack,
        Self::NextTrack,
        Self::SeekBackward,
        Self::SeekForward,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::PreviousTrack => "previoustrack",
            Self::NextTrack => "nexttrack",
            Self::SeekBackward => "seekbackward",
            Self::SeekForward => "seekforward",
        }
    }
}

/// One artwork variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artwork {
    pub src: String,
    pub sizes: String,
}

/// Now-playing metadata as handed to the OS
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MediaMetadata {
    pub title: String,
    pub artist: String,
    pub artwork: Vec<Artwork>,
}

/// Position report; `position` never exceeds `duration`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionState {
    pub duration: f64,
    pub position: f64,
    pub playback_rate: f64,
}

/// The platform's now-playing service
pub trait MediaSession {
    /// Ask the platform to deliver `action` to us.
    fn set_action_handler(&mut self, action: TransportAction) -> Result<()>;

    fn set_metadata(&mut self, metadata: &MediaMetadata) -> Result<()>;

    fn set_playback_state(&mut self, playing: bool) -> Result<()>;

    fn set_position_state(&mut self, state: &PositionState) -> Result<()>;
}

/// Mirrors reconciled state into a [`MediaSession`]
pub struct MediaSessionBridge<S: MediaSession> {
    session: S,
    title: Option<String>,
    artist: String,
    artwork: Option<String>,
    last_metadata: Option<(String, String, Option<String>)>,
    duration: Option<u64>,
    elapsed: Option<u64>,
}

impl<S: MediaSession> MediaSessionBridge<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            title: None,
            artist: String::new(),
            artwork: None,
            last_metadata: None,
            duration: None,
            elapsed: None,
        }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Register every transport action; returns how many were accepted.
    pub fn register_actions(&mut self) -> usize {
        let mut registered = 0;
        for action in TransportAction::ALL {
            match self.session.set_action_handler(action) {
                Ok(()) => registered += 1,
                Err(e) => warn!("Media session action '{}' not supported: {e:#}", action.name()),
            }
        }
        info!("Registered {registered}/{} media session actions", TransportAction::ALL.len());
        registered
    }

    /// Push metadata if title, artist or artwork changed since the last push.
    pub fn update_metadata(&mut self) {
        let Some(title) = self.title.clone() else {
            return;
        };
        let key = (title.clone(), self.artist.clone(), self.artwork.clone());
        if self.last_metadata.as_ref() == Some(&key) {
            return;
        }

        let metadata = MediaMetadata {
            title,
            artist: self.artist.clone(),
            artwork: self
                .artwork
                .iter()
                .flat_map(|src| {
                    ARTWORK_SIZES.iter().map(move |sizes| Artwork {
                        src: src.clone(),
                        sizes: (*sizes).to_string(),
                    })
                })
                .collect(),
        };
        match self.session.set_metadata(&metadata) {
            Ok(()) => self.last_metadata = Some(key),
            Err(e) => warn!("Failed to update media metadata: {e:#}"),
        }
    }

    pub fn update_playback_state(&mut self, playing: bool) {
        if let Err(e) = self.session.set_playback_state(playing) {
            warn!("Failed to update media playback state: {e:#}");
        }
    }

    /// Report position, clamped to the duration. Skipped until a positive
    /// duration is known.
    pub fn update_position_state(&mut self) {
        let Some(duration) = self.duration.filter(|d| *d > 0) else {
            return;
        };
        let position = self.elapsed.unwrap_or(0).min(duration);
        let state = PositionState {
            duration: duration as f64,
            position: position as f64,
            playback_rate: 1.0,
        };
        if let Err(e) = self.session.set_position_state(&state) {
            debug!("Position state not supported: {e:#}");
        }
    }
}

impl<S: MediaSession> EventSink for MediaSessionBridge<S> {
    fn emit(&mut self, event: &PlayerEvent) {
        match event {
            PlayerEvent::UpdateSong(song) => {
                self.title = Some(song.title.clone());
                self.artist = song.artist.clone();
                // The new song's artwork follows in its own event.
                self.artwork = None;
                self.duration = None;
                self.elapsed = None;
                self.update_metadata();
            }
            PlayerEvent::AlbumArt(url) => {
                self.artwork = Some(url.clone());
                self.update_metadata();
            }
            PlayerEvent::PlaybackState(playing) => self.update_playback_state(*playing),
            PlayerEvent::SongDuration(duration) => {
                self.duration = Some(*duration);
                self.update_position_state();
            }
            PlayerEvent::SongElapsed(elapsed) => {
                self.elapsed = Some(*elapsed);
                self.update_position_state();
            }
            PlayerEvent::PlaylistId(_) | PlayerEvent::SongUrl(_) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Transport → page
// ---------------------------------------------------------------------------

/// Something the host should do to the page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum UiAction {
    /// `document.querySelectorAll(selector)[index].click()`
    Click { selector: String, index: usize },
    MediaPlay,
    MediaPause,
    /// Set `currentTime` to `position` seconds
    MediaSeek { position: f64 },
}

/// Performs [`UiAction`]s on the page
pub trait PlayerControls {
    fn perform(&mut self, action: &UiAction) -> Result<()>;
}

/// The kind of player control a button represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlKind {
    PlayPause,
    Previous,
    Next,
}

const CONTROL_BUTTONS: &str = "button, [role=\"button\"]";

/// Decide how to carry out `action` on `page`.
///
/// Play/pause clicks the player's play control, or drives the media element
/// when no control is found. Previous/next can only click. Seeking moves the
/// media element by `seek_offset` seconds, clamped to the song.
pub fn resolve_transport(action: TransportAction, page: &Page, seek_offset: f64) -> Option<UiAction> {
    match action {
        TransportAction::Play | TransportAction::Pause => find_control(page, ControlKind::PlayPause)
            .or_else(|| {
                page.media().map(|_| {
                    if action == TransportAction::Play {
                        UiAction::MediaPlay
                    } else {
                        UiAction::MediaPause
                    }
                })
            }),
        TransportAction::PreviousTrack => find_control(page, ControlKind::Previous),
        TransportAction::NextTrack => find_control(page, ControlKind::Next),
        TransportAction::SeekBackward => seek(page, -seek_offset),
        TransportAction::SeekForward => seek(page, seek_offset),
    }
}

fn seek(page: &Page, delta: f64) -> Option<UiAction> {
    let media = page.media()?;
    let current = media.known_position()?;
    let mut position = (current + delta).max(0.0);
    if let Some(duration) = media.known_duration() {
        position = position.min(duration);
    }
    Some(UiAction::MediaSeek { position })
}

/// Find a control of `kind` in the player and address it by selector and
/// index so the host can click it.
fn find_control(page: &Page, kind: ControlKind) -> Option<UiAction> {
    [PLAYER_SURFACE, MOBILE_SURFACE].into_iter().find_map(|surface| {
        let selector = scoped_selector(surface, CONTROL_BUTTONS);
        page.select(&selector)
            .into_iter()
            .position(|button| control_kind(button) == Some(kind))
            .map(|index| UiAction::Click { selector, index })
    })
}

/// Prefix every selector of `inner` with every selector of `scope`.
fn scoped_selector(scope: &str, inner: &str) -> String {
    scope
        .split(',')
        .flat_map(|outer| inner.split(',').map(move |inner| format!("{} {}", outer.trim(), inner.trim())))
        .collect::<Vec<_>>()
        .join(", ")
}

fn control_kind(button: scraper::ElementRef<'_>) -> Option<ControlKind> {
    let label = attr(button, "aria-label")
        .or_else(|| attr(button, "title"))
        .unwrap_or_default()
        .to_lowercase();
    if label.contains("prev") || label.contains("rewind") {
        return Some(ControlKind::Previous);
    }
    if label.contains("next") || label.contains("skip") {
        return Some(ControlKind::Next);
    }
    if label.contains("play") || label.contains("pause") {
        return Some(ControlKind::PlayPause);
    }
    classify_icon(button).map(|shape| match shape {
        IconShape::Bars | IconShape::Triangle => ControlKind::PlayPause,
    })
}
