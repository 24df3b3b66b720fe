//! Play/pause detection
//!
//! Signals in order of trust:
//! 1. the media element's `paused` flag
//! 2. the shape of the play/pause icon in the player's buttons
//! 3. the accessibility label of the play/pause control

use log::debug;

use super::icon::{classify_icon, IconShape};
use super::{first_match, player_surfaces, Strategy};
use crate::page::{attr, select_within, Page};

const BUTTONS: &str = "button, [role=\"button\"]";
const LABELLED_CONTROLS: &str = "button[aria-label], [role=\"button\"][aria-label], button[title]";

const STRATEGIES: &[Strategy<bool>] = &[from_media_element, from_icon_shape, from_accessibility_label];

/// Reports `true` (playing) / `false` (paused) transitions
#[derive(Debug, Default)]
pub struct PlaybackExtractor {
    last: Option<bool>,
}

impl PlaybackExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the playback state if it differs from the last one reported.
    pub fn detect(&mut self, page: &Page) -> Option<bool> {
        let playing = first_match(page, STRATEGIES)?;
        if self.last == Some(playing) {
            return None;
        }
        debug!("Playback state: {:?} -> {}", self.last, playing);
        self.last = Some(playing);
        Some(playing)
    }
}

fn from_media_element(page: &Page) -> Option<bool> {
    page.media().map(|media| !media.paused)
}

fn from_icon_shape(page: &Page) -> Option<bool> {
    player_surfaces(page).into_iter().find_map(|surface| {
        select_within(surface, BUTTONS).into_iter().find_map(|button| {
            classify_icon(button).map(|shape| shape == IconShape::Bars)
        })
    })
}

fn from_accessibility_label(page: &Page) -> Option<bool> {
    player_surfaces(page).into_iter().find_map(|surface| {
        select_within(surface, LABELLED_CONTROLS)
            .into_iter()
            .find_map(|control| {
                let label = attr(control, "aria-label")
                    .or_else(|| attr(control, "title"))?
                    .to_lowercase();
                label_state(&label)
            })
    })
}

/// `Some(true)` for a "pause" control, `Some(false)` for a "play" control.
fn label_state(label: &str) -> Option<bool> {
    let pause = label.contains("pause");
    let play = label.contains("play");
    if !pause && !play {
        return None;
    }
    Some(pause && !play)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::MediaElement;

    const BASE: &str = "https://neurokaraoke.com/";
    const PAUSE_ICON: &str = "M6 19h4V5H6v14zm8-14v14h4V5h-4z";
    const PLAY_ICON: &str = "M8 5v14l11-7z";

    fn bar(inner: &str) -> String {
        format!(r#"<div class="player-bar">{inner}</div>"#)
    }

    #[test]
    fn test_media_element_is_authoritative() {
        // Icon says playing, media says paused: media wins.
        let html = bar(&format!(r#"<button><svg><path d="{PAUSE_ICON}"/></svg></button>"#));
        let page = Page::from_html(BASE, &html).with_media(MediaElement {
            paused: true,
            ..Default::default()
        });
        assert_eq!(PlaybackExtractor::new().detect(&page), Some(false));
    }

    #[test]
    fn test_pause_icon_means_playing() {
        let html = bar(&format!(
            r#"<button class="prev"><svg><path d="M6 6h2v12H6zm3.5 6 8.5 6V6z"/></svg></button>
               <button><svg viewBox="0 0 24 24"><path d="{PAUSE_ICON}"/></svg></button>"#
        ));
        let page = Page::from_html(BASE, &html);
        assert_eq!(PlaybackExtractor::new().detect(&page), Some(true));
    }

    #[test]
    fn test_pause_icon_drawn_with_rects_means_playing() {
        let html = bar(
            r#"<button><svg viewBox="0 0 24 24">
                 <rect x="6" y="4" width="4" height="16"/><rect x="14" y="4" width="4" height="16"/>
               </svg></button>"#,
        );
        let page = Page::from_html(BASE, &html);
        assert_eq!(PlaybackExtractor::new().detect(&page), Some(true));
    }

    #[test]
    fn test_play_icon_means_paused() {
        let html = bar(&format!(r#"<button><svg><path d="{PLAY_ICON}"/></svg></button>"#));
        let page = Page::from_html(BASE, &html);
        assert_eq!(PlaybackExtractor::new().detect(&page), Some(false));
    }

    #[test]
    fn test_label_fallback() {
        let page = Page::from_html(BASE, &bar(r#"<button aria-label="Pause">||</button>"#));
        assert_eq!(PlaybackExtractor::new().detect(&page), Some(true));

        let page = Page::from_html(BASE, &bar(r#"<button aria-label="Play song">&gt;</button>"#));
        assert_eq!(PlaybackExtractor::new().detect(&page), Some(false));
    }

    #[test]
    fn test_label_state_rules() {
        assert_eq!(label_state("pause"), Some(true));
        assert_eq!(label_state("play"), Some(false));
        assert_eq!(label_state("play/pause"), Some(false));
        assert_eq!(label_state("next track"), None);
    }

    #[test]
    fn test_no_signal_reports_nothing() {
        let page = Page::from_html(BASE, &bar(r#"<button aria-label="Next">»</button>"#));
        assert_eq!(PlaybackExtractor::new().detect(&page), None);
    }

    #[test]
    fn test_only_transitions_reported() {
        let playing = Page::from_html(BASE, &bar(r#"<button aria-label="Pause"></button>"#));
        let paused = Page::from_html(BASE, &bar(r#"<button aria-label="Play"></button>"#));
        let mut extractor = PlaybackExtractor::new();
        assert_eq!(extractor.detect(&playing), Some(true));
        assert_eq!(extractor.detect(&playing), None);
        assert_eq!(extractor.detect(&paused), Some(false));
        assert_eq!(extractor.detect(&paused), None);
    }
}
