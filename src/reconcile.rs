//! Change reconciliation
//!
//! Runs every extractor over a page, compares each result with the last
//! published value and emits events for real changes only. A new title
//! invalidates all timing state of the previous song before anything else is
//! read in the same pass.

use log::{debug, info};
use std::time::Duration;

use crate::events::{EventSink, PlayerEvent};
use crate::extract::metadata::song_url;
use crate::extract::{MetadataExtractor, PlaybackExtractor, TimingExtractor, TitleExtractor};
use crate::page::Page;
use crate::{DetectionSnapshot, PlaybackState};

/// Media position (seconds) under which playback counts as having started
/// over
const RESTART_POSITION_SECS: f64 = 3.0;

/// Previously published elapsed time (seconds) a restart must drop from
const RESTART_MIN_ELAPSED_SECS: u64 = 10;

/// Owns the extractors and the published snapshot
pub struct Reconciler {
    title: TitleExtractor,
    playback: PlaybackExtractor,
    timing: TimingExtractor,
    metadata: MetadataExtractor,
    snapshot: DetectionSnapshot,
    sinks: Vec<Box<dyn EventSink + Send>>,
}

impl Reconciler {
    pub fn new(diagnostic_interval: Duration) -> Self {
        Self {
            title: TitleExtractor::new(),
            playback: PlaybackExtractor::new(),
            timing: TimingExtractor::new(diagnostic_interval),
            metadata: MetadataExtractor::new(),
            snapshot: DetectionSnapshot::default(),
            sinks: Vec::new(),
        }
    }

    /// Add a receiver for published events.
    pub fn add_sink(&mut self, sink: impl EventSink + Send + 'static) {
        self.sinks.push(Box::new(sink));
    }

    pub fn snapshot(&self) -> &DetectionSnapshot {
        &self.snapshot
    }

    /// Run every extractor once.
    pub fn full_pass(&mut self, page: &Page) {
        if self.track_restarted(page) {
            // Same title again (repeat, or the next track shares the name).
            self.title.reset();
        }
        self.detect_song(page);
        self.detect_playback(page);
        self.detect_duration(page);
        self.detect_elapsed(page);
        self.detect_metadata(page);
    }

    /// Only look for a new song. Cheap enough to run on every mutation.
    pub fn title_pass(&mut self, page: &Page) {
        self.detect_song(page);
    }

    /// A new track started without the title changing: the song page
    /// address changed, or the media element jumped back to the start.
    fn track_restarted(&self, page: &Page) -> bool {
        if let (Some(last), Some(current)) = (&self.snapshot.song_url, song_url(page)) {
            if *last != current {
                debug!("Song page changed: {last} -> {current}");
                return true;
            }
        }
        let position = page.media().and_then(|m| m.known_position());
        match (position, self.snapshot.elapsed) {
            (Some(position), Some(elapsed)) => {
                position < RESTART_POSITION_SECS && elapsed >= RESTART_MIN_ELAPSED_SECS
            }
            _ => false,
        }
    }

    /// Returns `true` when a new song was published. Repeats are filtered by
    /// the title extractor.
    fn detect_song(&mut self, page: &Page) -> bool {
        let Some(song) = self.title.detect(page) else {
            return false;
        };

        info!("Now playing: {}", song.display());
        self.snapshot.title = Some(song.title.clone());
        self.snapshot.artist = Some(song.artist.clone());
        self.snapshot.clear_timing();
        self.timing.reset();
        // Artwork belongs to the song; republish it even if the URL repeats.
        self.snapshot.image_url = None;
        self.metadata.reset_artwork();
        self.publish(PlayerEvent::UpdateSong(song));

        // A new song's state is normally on screen already; don't wait for the
        // next cycle to report it.
        self.detect_playback(page);
        self.detect_duration(page);
        true
    }

    fn detect_playback(&mut self, page: &Page) {
        let Some(playing) = self.playback.detect(page) else {
            return;
        };
        let state = PlaybackState::from_playing(playing);
        if self.snapshot.playback_state == state {
            return;
        }
        self.snapshot.playback_state = state;
        self.publish(PlayerEvent::PlaybackState(playing));
    }

    fn detect_duration(&mut self, page: &Page) {
        let Some(duration) = self.timing.detect_duration(page) else {
            return;
        };
        if self.snapshot.duration == Some(duration) {
            return;
        }
        self.snapshot.duration = Some(duration);
        self.publish(PlayerEvent::SongDuration(duration));
    }

    fn detect_elapsed(&mut self, page: &Page) {
        let elapsed = self.timing.detect_elapsed(page);
        self.snapshot.progress_value = self.timing.last_progress();
        self.snapshot.progress_mode = self.timing.mode();

        let Some(elapsed) = elapsed else {
            return;
        };
        if self.snapshot.elapsed == Some(elapsed) {
            return;
        }
        self.snapshot.elapsed = Some(elapsed);
        self.publish(PlayerEvent::SongElapsed(elapsed));
    }

    fn detect_metadata(&mut self, page: &Page) {
        if let Some(id) = self.metadata.detect_playlist_id(page) {
            if self.snapshot.playlist_id.as_deref() != Some(id.as_str()) {
                self.snapshot.playlist_id = Some(id.clone());
                self.publish(PlayerEvent::PlaylistId(id));
            }
        }
        if let Some(url) = self.metadata.detect_artwork(page) {
            if self.snapshot.image_url.as_deref() != Some(url.as_str()) {
                self.snapshot.image_url = Some(url.clone());
                self.publish(PlayerEvent::AlbumArt(url));
            }
        }
        if let Some(url) = self.metadata.detect_song_url(page) {
            if self.snapshot.song_url.as_deref() != Some(url.as_str()) {
                self.snapshot.song_url = Some(url.clone());
                self.publish(PlayerEvent::SongUrl(url));
            }
        }
    }

    fn publish(&mut self, event: PlayerEvent) {
        debug!("Publishing {event:?}");
        for sink in &mut self.sinks {
            sink.emit(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventLog;
    use crate::page::{MediaElement, PageSnapshot};
    use crate::{ProgressMode, SongInfo};

    const BASE: &str = "https://neurokaraoke.com/";

    fn reconciler() -> (Reconciler, EventLog) {
        let log = EventLog::new();
        let mut reconciler = Reconciler::new(Duration::from_secs(30));
        reconciler.add_sink(log.clone());
        (reconciler, log)
    }

    fn player(title: &str, progress: &str, duration: &str, playing: bool) -> Page {
        let label = if playing { "Pause" } else { "Play" };
        Page::from_html(
            BASE,
            &format!(
                r#"<div class="player-bar">
                     <img src="/covers/{title}.jpg">
                     <span class="song-title">{title}</span><span class="song-artist">Neuro-sama</span>
                     <button aria-label="{label}"></button>
                     <div class="progress-container"><span>{progress}</span><span class="duration">{duration}</span></div>
                   </div>"#
            ),
        )
    }

    fn song(title: &str) -> PlayerEvent {
        PlayerEvent::UpdateSong(SongInfo {
            title: title.into(),
            artist: "Neuro-sama".into(),
        })
    }

    #[test]
    fn test_first_pass_publishes_everything() {
        let (mut reconciler, log) = reconciler();
        reconciler.full_pass(&player("Life", "0:10", "3:00", true));
        assert_eq!(
            log.events(),
            vec![
                song("Life"),
                PlayerEvent::PlaybackState(true),
                PlayerEvent::SongDuration(180),
                PlayerEvent::SongElapsed(10),
                PlayerEvent::AlbumArt("https://neurokaraoke.com/covers/Life.jpg".into()),
            ]
        );
        assert_eq!(reconciler.snapshot().title.as_deref(), Some("Life"));
    }

    #[test]
    fn test_no_duplicates_across_passes() {
        let (mut reconciler, log) = reconciler();
        let page = player("Life", "0:10", "3:00", true);
        for _ in 0..5 {
            reconciler.full_pass(&page);
        }
        assert_eq!(log.len(), 5);
    }

    #[test]
    fn test_only_changed_fields_published() {
        let (mut reconciler, log) = reconciler();
        reconciler.full_pass(&player("Life", "0:10", "3:00", true));
        let before = log.len();
        reconciler.full_pass(&player("Life", "0:11", "3:00", true));
        assert_eq!(log.events()[before..], [PlayerEvent::SongElapsed(11)]);
        reconciler.full_pass(&player("Life", "0:11", "3:00", false));
        assert_eq!(log.events().last(), Some(&PlayerEvent::PlaybackState(false)));
    }

    #[test]
    fn test_new_song_resets_timing_before_elapsed() {
        let (mut reconciler, log) = reconciler();
        reconciler.full_pass(&player("Life", "-1:00", "3:00", true));
        assert_eq!(reconciler.snapshot().progress_mode, ProgressMode::Remaining);

        let before = log.len();
        // Same duration as the previous song: still republished for the new one.
        reconciler.full_pass(&player("Stronger", "0:02", "3:00", true));
        let events = log.events()[before..].to_vec();
        assert_eq!(events[0], song("Stronger"));
        assert_eq!(events[1], PlayerEvent::SongDuration(180));
        assert_eq!(events[2], PlayerEvent::SongElapsed(2));
        // Remaining mode from the old song must not leak into the new one.
        assert_eq!(reconciler.snapshot().progress_mode, ProgressMode::Unset);
    }

    #[test]
    fn test_artwork_republished_for_next_song() {
        let (mut reconciler, log) = reconciler();
        let cover = |title: &str| {
            Page::from_html(
                BASE,
                &format!(
                    r#"<div class="player-bar"><img src="/covers/album.jpg">
                         <span class="song-title">{title}</span></div>"#
                ),
            )
        };
        reconciler.full_pass(&cover("Life"));
        let before = log.len();
        // Same album cover, different song.
        reconciler.full_pass(&cover("Stronger"));
        assert_eq!(
            log.events()[before..],
            [
                PlayerEvent::UpdateSong(SongInfo {
                    title: "Stronger".into(),
                    artist: String::new(),
                }),
                PlayerEvent::AlbumArt("https://neurokaraoke.com/covers/album.jpg".into()),
            ]
        );
    }

    #[test]
    fn test_title_pass_rereads_playback_and_duration() {
        let (mut reconciler, log) = reconciler();
        reconciler.title_pass(&player("Life", "0:10", "3:00", true));
        assert_eq!(
            log.events(),
            vec![song("Life"), PlayerEvent::PlaybackState(true), PlayerEvent::SongDuration(180)]
        );
        assert_eq!(reconciler.snapshot().elapsed, None);
    }

    #[test]
    fn test_title_pass_ignores_same_song() {
        let (mut reconciler, log) = reconciler();
        let page = player("Life", "0:10", "3:00", true);
        reconciler.full_pass(&page);
        let before = log.len();
        reconciler.title_pass(&page);
        assert_eq!(log.len(), before);
    }

    #[test]
    fn test_media_element_drives_timing() {
        let (mut reconciler, log) = reconciler();
        let page = Page::parse(&PageSnapshot {
            url: "https://neurokaraoke.com/song/life".into(),
            title: Some("Life - Neuro Karaoke".into()),
            html: "<html><body></body></html>".into(),
            media: Some(MediaElement {
                paused: false,
                duration: Some(215.0),
                current_time: Some(3.2),
            }),
        });
        reconciler.full_pass(&page);
        assert_eq!(
            log.events(),
            vec![
                PlayerEvent::UpdateSong(SongInfo { title: "Life".into(), artist: String::new() }),
                PlayerEvent::PlaybackState(true),
                PlayerEvent::SongDuration(215),
                PlayerEvent::SongElapsed(3),
                PlayerEvent::SongUrl("https://neurokaraoke.com/song/life".into()),
            ]
        );
    }

    fn media_page(url: &str, position: f64) -> Page {
        Page::parse(&PageSnapshot {
            url: url.into(),
            title: Some("Life - Neuro Karaoke".into()),
            html: "<html><body></body></html>".into(),
            media: Some(MediaElement {
                paused: false,
                duration: Some(215.0),
                current_time: Some(position),
            }),
        })
    }

    fn life() -> PlayerEvent {
        PlayerEvent::UpdateSong(SongInfo { title: "Life".into(), artist: String::new() })
    }

    #[test]
    fn test_same_title_republished_when_playback_starts_over() {
        let (mut reconciler, log) = reconciler();
        reconciler.full_pass(&media_page(BASE, 120.0));
        let before = log.len();

        reconciler.full_pass(&media_page(BASE, 1.0));
        assert_eq!(
            log.events()[before..],
            [life(), PlayerEvent::SongDuration(215), PlayerEvent::SongElapsed(1)]
        );

        // Still the start of the same play, not another restart.
        let before = log.len();
        reconciler.full_pass(&media_page(BASE, 2.0));
        assert_eq!(log.events()[before..], [PlayerEvent::SongElapsed(2)]);
    }

    #[test]
    fn test_seeking_back_is_not_a_restart() {
        let (mut reconciler, log) = reconciler();
        reconciler.full_pass(&media_page(BASE, 120.0));
        let before = log.len();
        reconciler.full_pass(&media_page(BASE, 60.0));
        assert_eq!(log.events()[before..], [PlayerEvent::SongElapsed(60)]);
    }

    #[test]
    fn test_same_title_republished_on_new_song_page() {
        let (mut reconciler, log) = reconciler();
        reconciler.full_pass(&media_page("https://neurokaraoke.com/song/a", 50.0));
        let before = log.len();

        reconciler.full_pass(&media_page("https://neurokaraoke.com/song/b", 50.0));
        let events = log.events()[before..].to_vec();
        assert_eq!(events[0], life());
        assert_eq!(
            events.last(),
            Some(&PlayerEvent::SongUrl("https://neurokaraoke.com/song/b".into()))
        );
    }

    #[test]
    fn test_artwork_resolved_against_page_address() {
        let (mut reconciler, log) = reconciler();
        reconciler.full_pass(&Page::from_html(
            "https://neurokaraoke.com/playlist/42",
            r#"<div class="player-bar"><img src="../covers/a.jpg"></div>"#,
        ));
        assert_eq!(
            log.events(),
            vec![
                PlayerEvent::PlaylistId("42".into()),
                PlayerEvent::AlbumArt("https://neurokaraoke.com/covers/a.jpg".into()),
            ]
        );
    }

    #[test]
    fn test_empty_page_publishes_nothing() {
        let (mut reconciler, log) = reconciler();
        reconciler.full_pass(&Page::from_html(BASE, "<p>Loading…</p>"));
        assert!(log.is_empty());
        assert_eq!(reconciler.snapshot().playback_state, PlaybackState::Unknown);
    }
}
