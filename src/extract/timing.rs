//! Duration and elapsed-position detection
//!
//! With a media element present both values are read straight from it. Without
//! one, the position is recovered from the player's progress control, either
//! from a slider's value/max pair or from the time labels around it. Players
//! disagree on whether the first label counts up (elapsed) or down
//! (remaining), so the convention is learned per song from how successive
//! readings move, or from an explicit minus sign, and then kept until the
//! song changes.

use log::debug;
use scraper::ElementRef;
use std::time::{Duration, Instant};

use super::{player_surfaces, Strategy};
use crate::page::{attr, first_within, matches, select_within, text_of, Page};
use crate::time_text::{parse_time_tokens, TimeValue};
use crate::util::truncate;
use crate::ProgressMode;

/// Text durations shorter than this are most likely the elapsed label.
pub const MIN_TEXT_DURATION_SECS: u64 = 30;

/// Default rate limit for the "no progress source" diagnostic
pub const DEFAULT_DIAGNOSTIC_INTERVAL: Duration = Duration::from_secs(30);

const DURATION_NODES: &str = ".duration, .total-time, .time-total, [class*=\"duration\"]";
const PROGRESS_CONTAINERS: &str =
    ".progress-container, .progress-bar, .seek-bar, [class*=\"progress\"], [class*=\"seek\"], [class*=\"slider\"]";
const SLIDERS: &str = "input[type=\"range\"], [role=\"slider\"]";

const DURATION_STRATEGIES: &[Strategy<u64>] = &[duration_from_media, duration_from_text];

/// A slider reading: current value against its maximum
#[derive(Debug, Clone, Copy, PartialEq)]
struct SliderReading {
    value: f64,
    max: f64,
}

/// Detects song duration and elapsed position
#[derive(Debug)]
pub struct TimingExtractor {
    duration: Option<u64>,
    elapsed: Option<u64>,
    last_progress: Option<u64>,
    mode: ProgressMode,
    diagnostic_interval: Duration,
    last_diagnostic: Option<Instant>,
}

impl Default for TimingExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_DIAGNOSTIC_INTERVAL)
    }
}

impl TimingExtractor {
    pub fn new(diagnostic_interval: Duration) -> Self {
        Self {
            duration: None,
            elapsed: None,
            last_progress: None,
            mode: ProgressMode::Unset,
            diagnostic_interval,
            last_diagnostic: None,
        }
    }

    /// Forget everything learned about the current song.
    pub fn reset(&mut self) {
        self.duration = None;
        self.elapsed = None;
        self.last_progress = None;
        self.mode = ProgressMode::Unset;
    }

    pub fn duration(&self) -> Option<u64> {
        self.duration
    }

    pub fn mode(&self) -> ProgressMode {
        self.mode
    }

    pub fn last_progress(&self) -> Option<u64> {
        self.last_progress
    }

    /// Return the song duration in seconds if it changed.
    pub fn detect_duration(&mut self, page: &Page) -> Option<u64> {
        let duration = DURATION_STRATEGIES.iter().find_map(|strategy| strategy(page))?;
        if self.duration == Some(duration) {
            return None;
        }
        debug!("Duration: {:?} -> {duration}s", self.duration);
        self.duration = Some(duration);
        Some(duration)
    }

    /// Return the elapsed position in seconds if it changed.
    pub fn detect_elapsed(&mut self, page: &Page) -> Option<u64> {
        let elapsed = match page.media().and_then(|m| m.known_position()) {
            Some(position) => Some(position.floor() as u64),
            None => self.elapsed_from_progress(page),
        };

        let Some(elapsed) = elapsed else {
            self.report_missing_progress(page, Instant::now());
            return None;
        };
        if self.elapsed == Some(elapsed) {
            return None;
        }
        self.elapsed = Some(elapsed);
        Some(elapsed)
    }

    fn elapsed_from_progress(&mut self, page: &Page) -> Option<u64> {
        progress_containers(page).into_iter().find_map(|container| {
            if let Some(elapsed) = slider_reading(container).and_then(|r| self.elapsed_from_slider(r)) {
                return Some(elapsed);
            }
            self.elapsed_from_text(&text_of(container))
        })
    }

    /// Map a slider's value onto seconds of the known duration.
    fn elapsed_from_slider(&self, reading: SliderReading) -> Option<u64> {
        let SliderReading { value, max } = reading;
        if !value.is_finite() || !max.is_finite() || max <= 0.0 || value < 0.0 {
            return None;
        }
        let duration = self.duration.map(|d| d as f64);

        let seconds = if max <= 1.0 {
            value * duration?
        } else if max <= 100.0 && Some(max) != duration {
            value / 100.0 * duration?
        } else if let Some(duration) = duration.filter(|d| *d != max) {
            value / max * duration
        } else {
            value
        };
        Some(seconds.round() as u64)
    }

    /// Work out elapsed seconds from the time labels of a progress control.
    fn elapsed_from_text(&mut self, text: &str) -> Option<u64> {
        let tokens = parse_time_tokens(text);
        if tokens.len() < 2 {
            return None;
        }

        let duration_candidate = tokens.iter().map(|t| t.seconds).max()?;
        let progress = progress_token(&tokens);

        if self.mode == ProgressMode::Unset {
            if progress.negative {
                self.mode = ProgressMode::Remaining;
                debug!("Progress mode: remaining (signed label)");
            } else if let Some(previous) = self.last_progress.filter(|p| *p != progress.seconds) {
                self.mode = if progress.seconds > previous {
                    ProgressMode::Elapsed
                } else {
                    ProgressMode::Remaining
                };
                debug!("Progress mode: {:?} ({previous}s -> {}s)", self.mode, progress.seconds);
            }
        }
        self.last_progress = Some(progress.seconds);

        let duration = self.duration.unwrap_or(duration_candidate);
        Some(match self.mode {
            ProgressMode::Remaining => duration.saturating_sub(progress.seconds),
            ProgressMode::Elapsed | ProgressMode::Unset => progress.seconds,
        })
    }

    /// Log what the page looks like when no progress source could be read,
    /// at most once per diagnostic interval.
    fn report_missing_progress(&mut self, page: &Page, now: Instant) {
        if !self.diagnostic_due(now) {
            return;
        }
        let containers = progress_containers(page);
        let excerpt = containers
            .first()
            .map(|c| truncate(&c.html(), 200))
            .unwrap_or_else(|| "(none)".to_string());
        debug!(
            "No elapsed source: media={} containers={} duration={:?} mode={:?} first_container={}",
            page.media().is_some(),
            containers.len(),
            self.duration,
            self.mode,
            excerpt
        );
    }

    fn diagnostic_due(&mut self, now: Instant) -> bool {
        match self.last_diagnostic {
            Some(last) if now.duration_since(last) < self.diagnostic_interval => false,
            _ => {
                self.last_diagnostic = Some(now);
                true
            }
        }
    }
}

/// Pick the progress reading out of two or more time labels.
fn progress_token(tokens: &[TimeValue]) -> TimeValue {
    let first = tokens[0];
    if tokens[1].seconds >= first.seconds {
        first
    } else {
        tokens
            .iter()
            .copied()
            .min_by_key(|t| t.seconds)
            .unwrap_or(first)
    }
}

fn duration_from_media(page: &Page) -> Option<u64> {
    page.media()?.known_duration().map(|d| d.round() as u64)
}

fn duration_from_text(page: &Page) -> Option<u64> {
    player_surfaces(page).into_iter().find_map(|surface| {
        let node = first_within(surface, DURATION_NODES)?;
        let seconds = parse_time_tokens(&text_of(node)).iter().map(|t| t.seconds).max()?;
        if seconds < MIN_TEXT_DURATION_SECS {
            debug!("Ignoring implausible text duration {seconds}s");
            return None;
        }
        Some(seconds)
    })
}

fn progress_containers(page: &Page) -> Vec<ElementRef<'_>> {
    player_surfaces(page)
        .into_iter()
        .flat_map(|surface| select_within(surface, PROGRESS_CONTAINERS))
        .collect()
}

/// Value/max of a slider that is the container itself or inside it.
fn slider_reading(container: ElementRef<'_>) -> Option<SliderReading> {
    let slider = if matches(container, SLIDERS) {
        container
    } else {
        first_within(container, SLIDERS)?
    };
    let number = |names: &[&str]| -> Option<f64> {
        names
            .iter()
            .find_map(|name| attr(slider, name))
            .and_then(|v| v.parse::<f64>().ok())
    };
    Some(SliderReading {
        value: number(&["aria-valuenow", "value"])?,
        max: number(&["aria-valuemax", "max"])?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::MediaElement;

    const BASE: &str = "https://neurokaraoke.com/";

    fn progress_page(inner: &str) -> Page {
        Page::from_html(
            BASE,
            &format!(r#"<div class="player-bar"><div class="progress-container">{inner}</div></div>"#),
        )
    }

    fn slider_page(value: &str, max: &str) -> Page {
        progress_page(&format!(r#"<input type="range" value="{value}" max="{max}">"#))
    }

    fn with_duration(seconds: u64) -> TimingExtractor {
        let mut extractor = TimingExtractor::default();
        extractor.duration = Some(seconds);
        extractor
    }

    // -- duration --

    #[test]
    fn test_duration_prefers_media() {
        let page = Page::from_html(BASE, r#"<div class="player-bar"><span class="duration">4:00</span></div>"#)
            .with_media(MediaElement {
                paused: false,
                duration: Some(201.4),
                current_time: None,
            });
        assert_eq!(TimingExtractor::default().detect_duration(&page), Some(201));
    }

    #[test]
    fn test_duration_from_text() {
        let page = Page::from_html(BASE, r#"<div class="player-bar"><span class="duration">3:25</span></div>"#);
        let mut extractor = TimingExtractor::default();
        assert_eq!(extractor.detect_duration(&page), Some(205));
        assert_eq!(extractor.detect_duration(&page), None);
    }

    #[test]
    fn test_short_text_duration_rejected() {
        let page = Page::from_html(BASE, r#"<div class="player-bar"><span class="duration">0:12</span></div>"#);
        assert_eq!(TimingExtractor::default().detect_duration(&page), None);
    }

    #[test]
    fn test_duration_reported_again_after_reset() {
        let page = Page::from_html(BASE, r#"<div class="player-bar"><span class="duration">3:25</span></div>"#);
        let mut extractor = TimingExtractor::default();
        assert_eq!(extractor.detect_duration(&page), Some(205));
        extractor.reset();
        assert_eq!(extractor.detect_duration(&page), Some(205));
    }

    // -- sliders --

    #[test]
    fn test_slider_percentage() {
        let mut extractor = with_duration(200);
        assert_eq!(extractor.detect_elapsed(&slider_page("50", "100")), Some(100));
    }

    #[test]
    fn test_slider_fraction() {
        let mut extractor = with_duration(200);
        assert_eq!(extractor.detect_elapsed(&slider_page("0.25", "1")), Some(50));
    }

    #[test]
    fn test_slider_proportional_rescale() {
        let mut extractor = with_duration(200);
        assert_eq!(extractor.detect_elapsed(&slider_page("500", "1000")), Some(100));
    }

    #[test]
    fn test_slider_raw_seconds_when_max_matches_duration() {
        let mut extractor = with_duration(240);
        assert_eq!(extractor.detect_elapsed(&slider_page("37", "240")), Some(37));
    }

    #[test]
    fn test_slider_tie_max_100_equals_duration() {
        // max == 100 == duration: neither the percentage nor the rescale branch
        // applies, the raw value is taken as seconds.
        let mut extractor = with_duration(100);
        assert_eq!(extractor.detect_elapsed(&slider_page("42", "100")), Some(42));
    }

    #[test]
    fn test_slider_aria_attributes() {
        let mut extractor = with_duration(300);
        let page = progress_page(r#"<div role="slider" aria-valuenow="25" aria-valuemax="100"></div>"#);
        assert_eq!(extractor.detect_elapsed(&page), Some(75));
    }

    #[test]
    fn test_slider_fraction_without_duration_falls_back_to_text() {
        let mut extractor = TimingExtractor::default();
        let page = progress_page(r#"<span>1:10</span><input type="range" value="0.3" max="1"><span>4:00</span>"#);
        assert_eq!(extractor.detect_elapsed(&page), Some(70));
    }

    // -- text labels --

    #[test]
    fn test_elapsed_first_layout() {
        let mut extractor = TimingExtractor::default();
        assert_eq!(extractor.detect_elapsed(&progress_page("<span>1:00</span><span>3:00</span>")), Some(60));
        assert_eq!(extractor.mode(), ProgressMode::Unset);
    }

    #[test]
    fn test_mode_learned_from_increasing_trend_and_sticky() {
        let mut extractor = with_duration(300);
        assert_eq!(extractor.detect_elapsed(&progress_page("1:00 / 5:00")), Some(60));
        assert_eq!(extractor.mode(), ProgressMode::Unset);
        assert_eq!(extractor.detect_elapsed(&progress_page("3:00 / 5:00")), Some(180));
        assert_eq!(extractor.mode(), ProgressMode::Elapsed);
        // A momentary decrease (e.g. a seek) does not flip the mode.
        assert_eq!(extractor.detect_elapsed(&progress_page("2:30 / 5:00")), Some(150));
        assert_eq!(extractor.mode(), ProgressMode::Elapsed);
    }

    #[test]
    fn test_mode_learned_from_decreasing_trend() {
        let mut extractor = with_duration(300);
        extractor.detect_elapsed(&progress_page("2:00 / 5:00"));
        assert_eq!(extractor.detect_elapsed(&progress_page("1:50 / 5:00")), Some(190));
        assert_eq!(extractor.mode(), ProgressMode::Remaining);
    }

    #[test]
    fn test_signed_label_sets_remaining_immediately() {
        let mut extractor = with_duration(300);
        assert_eq!(extractor.detect_elapsed(&progress_page("-2:30 5:00")), Some(150));
        assert_eq!(extractor.mode(), ProgressMode::Remaining);
    }

    #[test]
    fn test_signed_label_uses_text_duration_without_known_duration() {
        let mut extractor = TimingExtractor::default();
        assert_eq!(extractor.detect_elapsed(&progress_page("-1:00 4:00")), Some(180));
    }

    #[test]
    fn test_descending_pair_takes_smallest() {
        let mut extractor = TimingExtractor::default();
        assert_eq!(extractor.detect_elapsed(&progress_page("4:00 | -0:45")), Some(195));
        assert_eq!(extractor.mode(), ProgressMode::Remaining);
    }

    #[test]
    fn test_remaining_never_negative() {
        let mut extractor = with_duration(60);
        assert_eq!(extractor.detect_elapsed(&progress_page("-2:00 5:00")), Some(0));
    }

    #[test]
    fn test_unchanged_elapsed_still_updates_last_progress() {
        let mut extractor = with_duration(300);
        assert_eq!(extractor.detect_elapsed(&progress_page("1:00 / 5:00")), Some(60));
        assert_eq!(extractor.detect_elapsed(&progress_page("1:00 / 5:00")), None);
        assert_eq!(extractor.last_progress(), Some(60));
    }

    #[test]
    fn test_single_label_is_not_enough() {
        let mut extractor = TimingExtractor::default();
        assert_eq!(extractor.detect_elapsed(&progress_page("1:00")), None);
    }

    #[test]
    fn test_reset_clears_mode() {
        let mut extractor = with_duration(300);
        extractor.detect_elapsed(&progress_page("-2:30 5:00"));
        extractor.reset();
        assert_eq!(extractor.mode(), ProgressMode::Unset);
        assert_eq!(extractor.duration(), None);
        assert_eq!(extractor.last_progress(), None);
        assert_eq!(extractor.detect_elapsed(&progress_page("0:05 3:00")), Some(5));
    }

    // -- media element --

    #[test]
    fn test_media_position_wins() {
        let page = progress_page("1:00 / 5:00").with_media(MediaElement {
            paused: false,
            duration: Some(300.0),
            current_time: Some(12.9),
        });
        assert_eq!(TimingExtractor::default().detect_elapsed(&page), Some(12));
    }

    // -- diagnostics --

    #[test]
    fn test_diagnostic_rate_limited() {
        let mut extractor = TimingExtractor::new(Duration::from_secs(10));
        let start = Instant::now();
        assert!(extractor.diagnostic_due(start));
        assert!(!extractor.diagnostic_due(start + Duration::from_secs(3)));
        assert!(extractor.diagnostic_due(start + Duration::from_secs(11)));
    }

    #[test]
    fn test_missing_progress_is_not_an_event() {
        let page = Page::from_html(BASE, "<div class=\"player-bar\"></div>");
        let mut extractor = TimingExtractor::default();
        assert_eq!(extractor.detect_elapsed(&page), None);
        assert_eq!(extractor.detect_elapsed(&page), None);
    }
}
