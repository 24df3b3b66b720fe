//! Outbound change events

use anyhow::{Context, Result};
use log::warn;
use serde::Serialize;
use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::SongInfo;

/// A change on one of the host channels.
///
/// Serializes as `{"channel": "<name>", "payload": <value>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "channel", content = "payload", rename_all = "kebab-case")]
pub enum PlayerEvent {
    UpdateSong(SongInfo),
    PlaybackState(bool),
    SongDuration(u64),
    SongElapsed(u64),
    AlbumArt(String),
    PlaylistId(String),
    SongUrl(String),
}

impl PlayerEvent {
    /// Channel name on the wire
    pub fn channel(&self) -> &'static str {
        match self {
            Self::UpdateSong(_) => "update-song",
            Self::PlaybackState(_) => "playback-state",
            Self::SongDuration(_) => "song-duration",
            Self::SongElapsed(_) => "song-elapsed",
            Self::AlbumArt(_) => "album-art",
            Self::PlaylistId(_) => "playlist-id",
            Self::SongUrl(_) => "song-url",
        }
    }
}

/// Receiver of published events
pub trait EventSink {
    fn emit(&mut self, event: &PlayerEvent);
}

/// Writes each event as one line of JSON
pub struct JsonLinesSink<W: Write> {
    writer: Arc<Mutex<W>>,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: Arc<Mutex<W>>) -> Self {
        Self { writer }
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn emit(&mut self, event: &PlayerEvent) {
        if let Err(e) = write_json_line(&self.writer, event) {
            warn!("Failed to forward {} event: {e:#}", event.channel());
        }
    }
}

/// Serialize `value` and write it as a single line, flushing immediately.
pub fn write_json_line<W: Write, T: Serialize>(writer: &Mutex<W>, value: &T) -> Result<()> {
    let line = serde_json::to_string(value).context("Failed to serialize message")?;
    let mut writer = writer
        .lock()
        .map_err(|_| anyhow::anyhow!("Output writer lock poisoned"))?;
    writeln!(writer, "{line}").context("Failed to write message")?;
    writer.flush().context("Failed to flush output")
}

/// Collects events in memory; handy for tests and the debug binary.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<PlayerEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything received so far
    pub fn events(&self) -> Vec<PlayerEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for EventLog {
    fn emit(&mut self, event: &PlayerEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
