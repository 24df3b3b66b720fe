//! Line-delimited JSON channel to the embedding host
//!
//! The host (the window that renders the web player) writes one message per
//! line on our stdin and reads events, UI actions and window commands from
//! our stdout. Logging goes to stderr, never stdout.

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};

use crate::events::write_json_line;
use crate::media_session::{PlayerControls, TransportAction, UiAction};
use crate::page::PageSnapshot;
use crate::watcher::WatcherHandle;

/// Inbound message
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HostMessage {
    /// The page mutated; carries the fresh tree
    Page(PageSnapshot),
    /// The OS sent a transport command to the host
    Command { action: TransportAction },
    Shutdown,
}

/// What the host should do with its window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowCommand {
    Show,
    Toggle,
    Quit,
}

/// Outbound message other than a [`PlayerEvent`](crate::PlayerEvent)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HostOutput {
    UiAction(UiAction),
    Window { command: WindowCommand },
}

/// Shared writer to the host
pub struct HostWriter<W: Write> {
    writer: Arc<Mutex<W>>,
}

impl<W: Write> Clone for HostWriter<W> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
        }
    }
}

impl<W: Write> HostWriter<W> {
    pub fn new(writer: Arc<Mutex<W>>) -> Self {
        Self { writer }
    }

    pub fn writer(&self) -> Arc<Mutex<W>> {
        Arc::clone(&self.writer)
    }

    pub fn send(&self, output: &HostOutput) -> Result<()> {
        write_json_line(&self.writer, output)
    }

    pub fn window(&self, command: WindowCommand) -> Result<()> {
        self.send(&HostOutput::Window { command })
    }
}

/// Page controls that ask the host to act on the page
impl<W: Write> PlayerControls for HostWriter<W> {
    fn perform(&mut self, action: &UiAction) -> Result<()> {
        self.send(&HostOutput::UiAction(action.clone()))
            .context("Failed to send UI action to host")
    }
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<HostMessage>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .context("Malformed host message")
}

/// Read messages until EOF or until `handler` returns `false`.
///
/// Malformed lines are logged and skipped. EOF is reported to `handler` as
/// [`HostMessage::Shutdown`].
pub fn read_messages<R: BufRead>(reader: R, mut handler: impl FnMut(HostMessage) -> bool) -> Result<()> {
    for line in reader.lines() {
        let line = line.context("Failed to read from host")?;
        match parse_line(&line) {
            Ok(Some(message)) => {
                if !handler(message) {
                    return Ok(());
                }
            }
            Ok(None) => {}
            Err(e) => warn!("{e:#}: {}", crate::util::truncate(&line, 120)),
        }
    }
    debug!("Host closed input");
    handler(HostMessage::Shutdown);
    Ok(())
}

/// Forward a message to the watcher. Returns `false` once the host asked to
/// stop; the watcher is already torn down by then.
pub fn dispatch(message: HostMessage, watcher: &WatcherHandle) -> bool {
    match message {
        HostMessage::Page(snapshot) => watcher.notify_mutation(snapshot),
        HostMessage::Command { action } => watcher.transport(action),
        HostMessage::Shutdown => {
            watcher.shutdown();
            return false;
        }
    }
    true
}
