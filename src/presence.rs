//! Discord Rich Presence as a now-playing surface
//!
//! Discord shows one "Listening to" activity at a time and cannot send
//! transport commands back, so every update rebuilds the whole activity and
//! action registration is refused.

use anyhow::{anyhow, bail, Context, Result};
use discord_rich_presence::{activity, DiscordIpc, DiscordIpcClient};
use log::{debug, info, warn};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::media_session::{MediaMetadata, MediaSession, PositionState, TransportAction};
use crate::util::truncate;

/// Minimum gap between connection attempts while Discord is unavailable
const RECONNECT_INTERVAL: Duration = Duration::from_secs(20);

/// Worker wake-up interval when there is nothing to deliver
const IDLE_WAIT: Duration = Duration::from_secs(3600);

/// Discord rejects longer activity strings
const MAX_FIELD_CHARS: usize = 128;

const FALLBACK_IMAGE: &str = "neurokaraoke";

/// What the activity should show, independent of the IPC connection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceState {
    pub metadata: Option<MediaMetadata>,
    pub playing: bool,
    pub position: Option<PositionState>,
}

impl PresenceState {
    /// Song title, or `None` when there is nothing to show
    pub fn details(&self) -> Option<String> {
        let metadata = self.metadata.as_ref()?;
        Some(truncate(&metadata.title, MAX_FIELD_CHARS))
    }

    pub fn state_text(&self) -> String {
        match self.metadata.as_ref().map(|m| m.artist.as_str()) {
            Some(artist) if !artist.is_empty() => truncate(&format!("by {artist}"), MAX_FIELD_CHARS),
            _ => "Neuro Karaoke".to_string(),
        }
    }

    /// Largest artwork variant, if any
    pub fn image(&self) -> Option<&str> {
        self.metadata
            .as_ref()?
            .artwork
            .last()
            .map(|a| a.src.as_str())
    }

    /// Start and end as unix seconds, derived from the last position report
    pub fn timestamps(&self, now_unix: i64) -> Option<(i64, i64)> {
        let position = self.position?;
        #[allow(clippy::cast_possible_truncation)]
        let start = now_unix - position.position.round() as i64;
        #[allow(clippy::cast_possible_truncation)]
        let end = start + position.duration.round() as i64;
        Some((start, end))
    }
}

enum DiscordCommand {
    Update(PresenceState),
    Shutdown,
}

/// [`MediaSession`] backed by the local Discord client.
///
/// IPC runs on a worker thread; the session methods only record the new
/// state and hand it over, so they never block the caller.
pub struct DiscordSession {
    state: PresenceState,
    tx: Sender<DiscordCommand>,
    worker: Option<JoinHandle<()>>,
}

impl DiscordSession {
    pub fn new(app_id: impl Into<String>) -> Result<Self> {
        let app_id = app_id.into();
        let (tx, rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("discord-ipc".into())
            .spawn(move || run_worker(&app_id, &rx))
            .context("Failed to spawn Discord worker thread")?;
        Ok(Self {
            state: PresenceState::default(),
            tx,
            worker: Some(worker),
        })
    }

    pub fn state(&self) -> &PresenceState {
        &self.state
    }

    fn push(&self) -> Result<()> {
        self.tx
            .send(DiscordCommand::Update(self.state.clone()))
            .map_err(|_| anyhow!("Discord worker has stopped"))
    }

    /// Clear the activity, close the connection and stop the worker.
    pub fn close(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.tx.send(DiscordCommand::Shutdown);
        if worker.join().is_err() {
            warn!("Discord worker panicked");
        }
    }
}

impl MediaSession for DiscordSession {
    fn set_action_handler(&mut self, action: TransportAction) -> Result<()> {
        bail!("Discord cannot deliver '{}'", action.name())
    }

    fn set_metadata(&mut self, metadata: &MediaMetadata) -> Result<()> {
        self.state.metadata = Some(metadata.clone());
        self.state.position = None;
        self.push()
    }

    fn set_playback_state(&mut self, playing: bool) -> Result<()> {
        if self.state.playing == playing {
            return Ok(());
        }
        self.state.playing = playing;
        self.push()
    }

    fn set_position_state(&mut self, state: &PositionState) -> Result<()> {
        // Drift below a couple of seconds doesn't change what Discord shows.
        let unchanged = self.state.position.is_some_and(|old| {
            old.duration == state.duration && (old.position - state.position).abs() < 2.0
        });
        self.state.position = Some(*state);
        if unchanged {
            return Ok(());
        }
        self.push()
    }
}

impl Drop for DiscordSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Owns the IPC client. Keeps the latest state until it has been delivered;
/// while Discord is unreachable, reconnects at most every
/// [`RECONNECT_INTERVAL`].
fn run_worker(app_id: &str, rx: &Receiver<DiscordCommand>) {
    let mut client: Option<DiscordIpcClient> = None;
    let mut pending: Option<PresenceState> = None;
    let mut last_attempt: Option<Instant> = None;

    loop {
        let wait = match (&pending, &client) {
            (Some(_), None) => last_attempt.map_or(Duration::ZERO, |at| {
                RECONNECT_INTERVAL.saturating_sub(at.elapsed())
            }),
            _ => IDLE_WAIT,
        };
        match rx.recv_timeout(wait) {
            Ok(DiscordCommand::Update(state)) => pending = Some(state),
            Ok(DiscordCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        // Only the newest state matters.
        while let Ok(command) = rx.try_recv() {
            match command {
                DiscordCommand::Update(state) => pending = Some(state),
                DiscordCommand::Shutdown => {
                    close_client(client.take());
                    return;
                }
            }
        }

        let Some(state) = pending.take() else {
            continue;
        };
        if client.is_none() && last_attempt.map_or(true, |at| at.elapsed() >= RECONNECT_INTERVAL) {
            last_attempt = Some(Instant::now());
            client = connect(app_id);
        }
        let Some(ipc) = client.as_mut() else {
            pending = Some(state);
            continue;
        };
        if let Err(e) = set_presence(ipc, &state) {
            warn!("Discord update error: {e}");
            // Connection is probably gone; reconnect unless we just did.
            client = None;
            pending = Some(state);
        }
    }
    close_client(client.take());
}

fn connect(app_id: &str) -> Option<DiscordIpcClient> {
    let mut client = DiscordIpcClient::new(app_id);
    match client.connect() {
        Ok(()) => {
            info!("Connected to Discord");
            Some(client)
        }
        Err(e) => {
            debug!("Discord not available ({e}), retrying in {}s", RECONNECT_INTERVAL.as_secs());
            None
        }
    }
}

fn set_presence(client: &mut DiscordIpcClient, state: &PresenceState) -> Result<()> {
    let result = match state.details() {
        Some(details) if state.playing => {
            let state_text = state.state_text();
            let image = state.image().unwrap_or(FALLBACK_IMAGE);
            let mut payload = activity::Activity::new()
                .activity_type(activity::ActivityType::Listening)
                .details(&details)
                .state(&state_text)
                .assets(activity::Assets::new().large_image(image).large_text(&details));
            if let Some((start, end)) = state.timestamps(unix_now()) {
                payload = payload.timestamps(activity::Timestamps::new().start(start).end(end));
            }
            client.set_activity(payload)
        }
        _ => client.clear_activity(),
    };
    result.map_err(|e| anyhow!("{e}"))
}

fn close_client(client: Option<DiscordIpcClient>) {
    if let Some(mut client) = client {
        let _ = client.clear_activity();
        let _ = client.close();
        info!("Disconnected from Discord");
    }
}

#[allow(clippy::cast_possible_wrap)]
fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
