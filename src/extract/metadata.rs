//! Playlist id, artwork and song URL detection
//!
//! These facts don't depend on title or timing state and may change on passes
//! where the song itself didn't (e.g. navigating to another playlist).

use regex::Regex;
use std::sync::LazyLock;

use super::{first_match, Strategy, PLAYER_SURFACE};
use crate::page::{attr, select_within, Page};

/// `/playlist/<id>` or `/playlists/<id>` in a path or href
static PLAYLIST_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/playlists?/([A-Za-z0-9_-]+)").unwrap());

/// `playlistId: "..."`, `"playlist_id":"..."`, `playlistId = '...'` in script text
static PLAYLIST_SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)["']?playlist_?id["']?\s*[:=]\s*["']?([A-Za-z0-9_-]+)"#).unwrap()
});

/// Single-song view, e.g. `/song/<id>` or `/songs/<id>`
static SONG_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/songs?/[A-Za-z0-9_-]+/?$").unwrap());

const PLAYLIST_ANCHORS: &str = "a[href*=\"/playlist/\"], a[href*=\"/playlists/\"]";
const PLAYLIST_ATTRIBUTES: &[&str] = &["data-playlist-id", "data-playlistid", "aria-playlist-id"];
const INLINE_SCRIPTS: &str = "script:not([src])";
const LAZY_SRC_ATTRIBUTES: &[&str] = &["data-src", "data-lazy-src", "data-original"];

const PLAYLIST_STRATEGIES: &[Strategy<String>] = &[
    playlist_from_url,
    playlist_from_anchor,
    playlist_from_attribute,
    playlist_from_script,
];

/// Tracks playlist id, artwork and song URL, reporting each only on change
#[derive(Debug, Default)]
pub struct MetadataExtractor {
    last_playlist_id: Option<String>,
    last_artwork: Option<String>,
    last_song_url: Option<String>,
}

impl MetadataExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detect_playlist_id(&mut self, page: &Page) -> Option<String> {
        let id = first_match(page, PLAYLIST_STRATEGIES)?;
        changed(&mut self.last_playlist_id, id)
    }

    pub fn detect_artwork(&mut self, page: &Page) -> Option<String> {
        let src = artwork_src(page)?;
        changed(&mut self.last_artwork, page.resolve(&src)?)
    }

    /// Report the artwork again on the next detection, even if unchanged.
    pub fn reset_artwork(&mut self) {
        self.last_artwork = None;
    }

    pub fn detect_song_url(&mut self, page: &Page) -> Option<String> {
        changed(&mut self.last_song_url, song_url(page)?)
    }
}

/// Page address, when it is a single-song view
pub fn song_url(page: &Page) -> Option<String> {
    SONG_PATH_RE
        .is_match(page.path())
        .then(|| page.url().to_string())
}

fn changed(last: &mut Option<String>, value: String) -> Option<String> {
    if last.as_deref() == Some(value.as_str()) {
        return None;
    }
    *last = Some(value.clone());
    Some(value)
}

fn playlist_from_url(page: &Page) -> Option<String> {
    capture(&PLAYLIST_PATH_RE, page.path())
}

fn playlist_from_anchor(page: &Page) -> Option<String> {
    page.select(PLAYLIST_ANCHORS)
        .into_iter()
        .find_map(|a| capture(&PLAYLIST_PATH_RE, attr(a, "href")?))
}

fn playlist_from_attribute(page: &Page) -> Option<String> {
    PLAYLIST_ATTRIBUTES.iter().find_map(|name| {
        page.first(&format!("[{name}]"))
            .and_then(|el| attr(el, name))
            .map(str::to_string)
    })
}

fn playlist_from_script(page: &Page) -> Option<String> {
    page.select(INLINE_SCRIPTS)
        .into_iter()
        .find_map(|script| capture(&PLAYLIST_SCRIPT_RE, &script.text().collect::<String>()))
}

fn capture(re: &Regex, haystack: &str) -> Option<String> {
    re.captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// `src` of the first image in the player, falling back to lazy-load
/// attributes when `src` is missing or a `data:` placeholder.
fn artwork_src(page: &Page) -> Option<String> {
    page.select(PLAYER_SURFACE).into_iter().find_map(|surface| {
        select_within(surface, "img").into_iter().find_map(|img| {
            attr(img, "src")
                .filter(|src| !src.starts_with("data:"))
                .or_else(|| LAZY_SRC_ATTRIBUTES.iter().find_map(|name| attr(img, name)))
                .map(str::to_string)
        })
    })
}
