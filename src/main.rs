//! Neuro Karaoke detection debugger
//!
//! Runs detection over a saved page and prints what would be published.
//!
//! ```text
//! neurokaraoke-debug <page.html | snapshot.json> [url]
//! ```
//!
//! A `.json` file is read as a host page message body (`url`, `title`,
//! `html`, `media`); anything else is treated as raw HTML.

use anyhow::{bail, Context, Result};
use neurokaraoke_presence::events::EventLog;
use neurokaraoke_presence::page::{Page, PageSnapshot};
use neurokaraoke_presence::Reconciler;
use std::path::Path;
use std::time::Duration;

const DEFAULT_URL: &str = "https://www.neurokaraoke.com/";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
        .format_timestamp(None)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(path) = args.first() else {
        bail!("usage: neurokaraoke-debug <page.html | snapshot.json> [url]");
    };
    let snapshot = load_snapshot(Path::new(path), args.get(1).map(String::as_str))?;

    println!("Neuro Karaoke detection debugger");
    println!("================================\n");
    println!("URL:   {}", snapshot.url);
    match &snapshot.media {
        Some(media) => println!("Media: {media:?}"),
        None => println!("Media: (none)"),
    }

    let log = EventLog::new();
    let mut reconciler = Reconciler::new(Duration::ZERO);
    reconciler.add_sink(log.clone());

    let page = Page::parse(&snapshot);
    println!("Title: {}\n", page.title());
    reconciler.full_pass(&page);
    // The second pass shows what the sticky progress mode settles on.
    reconciler.full_pass(&page);

    println!("Events:");
    if log.is_empty() {
        println!("   (none)");
    }
    for event in log.events() {
        println!("   {}", serde_json::to_string(&event)?);
    }

    println!("\nSnapshot:");
    println!("{}", serde_json::to_string_pretty(reconciler.snapshot())?);
    Ok(())
}

fn load_snapshot(path: &Path, url: Option<&str>) -> Result<PageSnapshot> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {path:?}"))?;

    let mut snapshot = if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&text).with_context(|| format!("Invalid page snapshot in {path:?}"))?
    } else {
        PageSnapshot {
            url: DEFAULT_URL.to_string(),
            // Page falls back to <title>
            title: None,
            html: text,
            media: None,
        }
    };
    if let Some(url) = url {
        snapshot.url = url.to_string();
    }
    Ok(snapshot)
}
