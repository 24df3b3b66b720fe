//! Song title/artist detection

use log::debug;
use regex::Regex;
use std::sync::LazyLock;

use super::{first_match, Strategy, MOBILE_SURFACE, PLAYER_SURFACE};
use crate::page::{first_within, text_of, Page};
use crate::SongInfo;

const TITLE_NODES: &str =
    ".song-title, .track-title, [class*=\"song-name\"], [class*=\"track-name\"], [class*=\"title\"]";
const ARTIST_NODES: &str = ".song-artist, .track-artist, [class*=\"artist\"]";

/// "<song> - Neuro Karaoke"
static BRANDED_TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(.+)\s+[-\u{2013}\u{2014}|]\s+Neuro[\s-]?Karaoke\s*$").unwrap());

/// "<song> - <anything> Karaoke"
static LOOSE_TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(.+)\s+[-\u{2013}\u{2014}]\s+.*Karaoke\s*$").unwrap());

/// Page titles that name a section of the site rather than a song.
const NAVIGATION_TITLES: &[&str] = &[
    "home", "playlists", "playlist", "search", "library", "settings", "login", "explore", "songs",
];

const STRATEGIES: &[Strategy<SongInfo>] = &[from_player_surface, from_mobile_surface, from_document_title];

/// Detects the current song and suppresses repeats
#[derive(Debug, Default)]
pub struct TitleExtractor {
    last_title: Option<String>,
}

impl TitleExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the current song if its title differs from the last one
    /// reported.
    pub fn detect(&mut self, page: &Page) -> Option<SongInfo> {
        let song = first_match(page, STRATEGIES)?;
        if self.last_title.as_deref() == Some(song.title.as_str()) {
            return None;
        }
        debug!("Title changed: {:?} -> {:?}", self.last_title, song.title);
        self.last_title = Some(song.title.clone());
        Some(song)
    }

    /// Forget the last title so the next detection reports it again.
    pub fn reset(&mut self) {
        self.last_title = None;
    }

    pub fn last_title(&self) -> Option<&str> {
        self.last_title.as_deref()
    }
}

fn from_player_surface(page: &Page) -> Option<SongInfo> {
    from_surface(page, PLAYER_SURFACE)
}

fn from_mobile_surface(page: &Page) -> Option<SongInfo> {
    from_surface(page, MOBILE_SURFACE)
}

fn from_surface(page: &Page, surface: &str) -> Option<SongInfo> {
    page.select(surface).into_iter().find_map(|root| {
        let title = first_within(root, TITLE_NODES).map(text_of)?;
        let artist = first_within(root, ARTIST_NODES)
            .map(text_of)
            .filter(|artist| *artist != title)
            .unwrap_or_default();
        SongInfo::new(title, artist)
    })
}

fn from_document_title(page: &Page) -> Option<SongInfo> {
    let title = page.title();
    let captured = BRANDED_TITLE_RE
        .captures(title)
        .or_else(|| LOOSE_TITLE_RE.captures(title))?
        .get(1)?
        .as_str()
        .trim();

    if NAVIGATION_TITLES.contains(&captured.to_lowercase().as_str()) {
        return None;
    }

    match captured.split_once(" - ") {
        Some((song, artist)) => SongInfo::new(song.trim().to_string(), artist.trim().to_string()),
        None => SongInfo::new(captured.to_string(), String::new()),
    }
}
