//! Neuro Karaoke now-playing bridge
//!
//! Infers what the Neuro Karaoke web player is doing (song, artist, artwork,
//! play/pause, duration, position, playlist) by watching the page it renders,
//! and republishes only genuine changes to the host process and to an OS-level
//! now-playing surface.
//!
//! # Data flow
//!
//! ```text
//! page snapshots ──► watcher (debounce / fallback timers)
//!                        │
//!                        ▼
//!                   reconciler ──► extractors (title, playback, timing, metadata)
//!                        │
//!                        ▼ PlayerEvent (changes only)
//!              ┌─────────┴──────────┐
//!         host (stdout)      MediaSessionBridge ──► MediaSession (Discord)
//! ```
//!
//! Transport commands travel the other way: host → watcher → resolver →
//! [`media_session::UiAction`] → host.

use serde::{Deserialize, Serialize};

pub mod config;
pub mod events;
pub mod extract;
pub mod host;
pub mod media_session;
pub mod page;
pub mod presence;
pub mod reconcile;
pub mod time_text;
pub mod tray;
pub mod util;
pub mod watcher;

pub use events::{EventSink, PlayerEvent};
pub use reconcile::Reconciler;
pub use watcher::{Watcher, WatcherHandle};

/// Current song as shown by the player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongInfo {
    /// Song title (never empty)
    pub title: String,

    /// Artist, empty when the page doesn't show one
    pub artist: String,
}

impl SongInfo {
    /// Build a song from raw text; `None` when the title is blank.
    pub fn new(title: String, artist: String) -> Option<Self> {
        let title = title.trim();
        if title.is_empty() {
            return None;
        }
        Some(Self {
            title: title.to_string(),
            artist: artist.trim().to_string(),
        })
    }

    /// "Title - Artist", or just the title
    pub fn display(&self) -> String {
        if self.artist.is_empty() {
            self.title.clone()
        } else {
            format!("{} - {}", self.title, self.artist)
        }
    }
}

/// Play/pause state. `Unknown` is never published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Unknown,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn from_playing(playing: bool) -> Self {
        if playing {
            Self::Playing
        } else {
            Self::Paused
        }
    }

    pub fn is_playing(self) -> bool {
        self == Self::Playing
    }
}

/// How the progress control's time label counts.
///
/// Learned once per song; reset when the song changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressMode {
    #[default]
    Unset,
    /// Label counts up from zero
    Elapsed,
    /// Label counts down to zero
    Remaining,
}

/// Last published value of every fact
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionSnapshot {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub playlist_id: Option<String>,
    pub song_url: Option<String>,
    pub image_url: Option<String>,
    pub playback_state: PlaybackState,
    pub duration: Option<u64>,
    pub elapsed: Option<u64>,
    pub progress_value: Option<u64>,
    pub progress_mode: ProgressMode,
}

impl DetectionSnapshot {
    /// Drop timing data that belonged to the previous song.
    pub fn clear_timing(&mut self) {
        self.duration = None;
        self.elapsed = None;
        self.progress_value = None;
        self.progress_mode = ProgressMode::Unset;
    }

    /// Current song, if one has been published
    pub fn song(&self) -> Option<SongInfo> {
        Some(SongInfo {
            title: self.title.clone()?,
            artist: self.artist.clone().unwrap_or_default(),
        })
    }
}
