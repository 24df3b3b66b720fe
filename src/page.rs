//! Document-tree view used by the extractors
//!
//! The host serializes the player page on every mutation and hands it over as
//! a [`PageSnapshot`]. The watcher parses the latest snapshot into a [`Page`]
//! at the start of every detection pass, so extractors always query a fresh
//! tree and never hold on to nodes between passes.
//!
//! Properties of the `<audio>`/`<video>` element that only exist at runtime
//! (paused flag, duration, position) are not part of the markup; the host
//! reports them alongside the HTML as [`MediaElement`].

use log::debug;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::util::collapse_whitespace;

/// Live state of the page's media element, as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MediaElement {
    /// `HTMLMediaElement.paused`
    pub paused: bool,

    /// `HTMLMediaElement.duration` (absent while NaN/unknown)
    #[serde(default)]
    pub duration: Option<f64>,

    /// `HTMLMediaElement.currentTime`
    #[serde(default)]
    pub current_time: Option<f64>,
}

impl MediaElement {
    /// Duration if it is a usable (positive, finite) number of seconds.
    pub fn known_duration(&self) -> Option<f64> {
        self.duration.filter(|d| d.is_finite() && *d > 0.0)
    }

    /// Current position if it is a usable (non-negative, finite) number.
    pub fn known_position(&self) -> Option<f64> {
        self.current_time.filter(|t| t.is_finite() && *t >= 0.0)
    }
}

/// Serialized page as delivered by the host on each mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PageSnapshot {
    /// `location.href`
    pub url: String,

    /// `document.title`
    #[serde(default)]
    pub title: Option<String>,

    /// `document.documentElement.outerHTML`
    pub html: String,

    /// Media element state, when the page has one
    #[serde(default)]
    pub media: Option<MediaElement>,
}

/// Parsed, read-only view of the page for one detection pass
pub struct Page {
    url: String,
    base: Option<Url>,
    title: String,
    html: Html,
    media: Option<MediaElement>,
}

impl Page {
    /// Parse a snapshot into a queryable page.
    pub fn parse(snapshot: &PageSnapshot) -> Self {
        let html = Html::parse_document(&snapshot.html);
        let title = match &snapshot.title {
            Some(title) => collapse_whitespace(title),
            None => document_title(&html),
        };
        Self {
            url: snapshot.url.clone(),
            base: Url::parse(&snapshot.url).ok(),
            title,
            html,
            media: snapshot.media,
        }
    }

    /// Parse raw HTML without host-provided title or media state.
    pub fn from_html(url: &str, html: &str) -> Self {
        Self::parse(&PageSnapshot {
            url: url.to_string(),
            title: None,
            html: html.to_string(),
            media: None,
        })
    }

    /// Attach media element state.
    pub fn with_media(mut self, media: MediaElement) -> Self {
        self.media = Some(media);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Path of the page address; empty when the address doesn't parse.
    pub fn path(&self) -> &str {
        self.base.as_ref().map_or("", Url::path)
    }

    /// Resolve an attribute value such as `src` or `href` against the page
    /// address.
    pub fn resolve(&self, reference: &str) -> Option<String> {
        let base = self.base.as_ref()?;
        match base.join(reference) {
            Ok(url) => Some(url.into()),
            Err(e) => {
                debug!("Can't resolve {reference:?} against {base}: {e}");
                None
            }
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn media(&self) -> Option<&MediaElement> {
        self.media.as_ref()
    }

    /// All elements matching `selectors`, in document order.
    ///
    /// An unparsable selector matches nothing.
    pub fn select(&self, selectors: &str) -> Vec<ElementRef<'_>> {
        match parse_selector(selectors) {
            Some(selector) => self.html.select(&selector).collect(),
            None => Vec::new(),
        }
    }

    /// First element matching `selectors`.
    pub fn first(&self, selectors: &str) -> Option<ElementRef<'_>> {
        let selector = parse_selector(selectors)?;
        self.html.select(&selector).next()
    }
}

fn parse_selector(selectors: &str) -> Option<Selector> {
    match Selector::parse(selectors) {
        Ok(selector) => Some(selector),
        Err(e) => {
            debug!("Ignoring invalid selector {selectors:?}: {e:?}");
            None
        }
    }
}

fn document_title(html: &Html) -> String {
    parse_selector("title")
        .and_then(|selector| html.select(&selector).next().map(text_of))
        .unwrap_or_default()
}

/// Descendants of `root` matching `selectors`.
pub fn select_within<'a>(root: ElementRef<'a>, selectors: &str) -> Vec<ElementRef<'a>> {
    match parse_selector(selectors) {
        Some(selector) => root.select(&selector).collect(),
        None => Vec::new(),
    }
}

/// First descendant of `root` matching `selectors`.
pub fn first_within<'a>(root: ElementRef<'a>, selectors: &str) -> Option<ElementRef<'a>> {
    let selector = parse_selector(selectors)?;
    root.select(&selector).next()
}

/// Whether `element` itself matches `selectors`.
pub fn matches(element: ElementRef<'_>, selectors: &str) -> bool {
    parse_selector(selectors).is_some_and(|selector| selector.matches(&element))
}

/// Text of an element with whitespace collapsed. Separate text nodes are
/// joined with a space so adjacent labels ("1:00", "3:00") stay apart.
pub fn text_of(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// Attribute value, trimmed, or `None` when absent or blank.
pub fn attr<'a>(element: ElementRef<'a>, name: &str) -> Option<&'a str> {
    element
        .value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
