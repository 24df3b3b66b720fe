//! Heuristic extractors
//!
//! Each extractor recovers one kind of fact from the page through an ordered
//! chain of strategies (plain functions of `&Page`), first hit wins, and keeps
//! the last value it reported so it can stay quiet when nothing changed.
//!
//! All knowledge of the player's markup (selectors, attribute names, title
//! formats) lives in this module tree. When the site changes its markup, only
//! these files should need to change.

pub mod icon;
pub mod metadata;
pub mod playback;
pub mod timing;
pub mod title;

pub use metadata::MetadataExtractor;
pub use playback::PlaybackExtractor;
pub use timing::TimingExtractor;
pub use title::TitleExtractor;

use scraper::ElementRef;

use crate::page::Page;

/// Desktop player bar
pub(crate) const PLAYER_SURFACE: &str =
    ".player-bar, .music-player, #player, [class*=\"player-container\"]";

/// Compact player shown on narrow layouts
pub(crate) const MOBILE_SURFACE: &str =
    ".mobile-player, .mini-player, [class*=\"mobile-player\"]";

/// A strategy: one way of reading a value off the page
pub(crate) type Strategy<T> = fn(&Page) -> Option<T>;

/// Run `strategies` in order and return the first value found.
pub(crate) fn first_match<T>(page: &Page, strategies: &[Strategy<T>]) -> Option<T> {
    strategies.iter().find_map(|strategy| strategy(page))
}

/// Player surfaces present on the page, desktop first.
pub(crate) fn player_surfaces(page: &Page) -> Vec<ElementRef<'_>> {
    let mut surfaces = page.select(PLAYER_SURFACE);
    surfaces.extend(page.select(MOBILE_SURFACE));
    surfaces
}
