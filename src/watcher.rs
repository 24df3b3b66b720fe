//! Detection loop
//!
//! One thread consumes a queue fed by the host (mutation notifications with a
//! fresh page snapshot, transport commands, shutdown). Timers are deadlines
//! tracked by [`Scheduler`] and waited on with `recv_timeout`, so every
//! detection pass runs on that one thread and at most one is in flight.
//!
//! Lifecycle: the watcher stays idle for a settle delay after startup, then
//! observes. While observing, a mutation schedules a debounced full pass
//! (unless one is already pending) and a fallback timer forces a full pass at
//! a fixed interval. Every mutation also gets a cheap title-only pass.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::media_session::{resolve_transport, PlayerControls, TransportAction};
use crate::page::{Page, PageSnapshot};
use crate::reconcile::Reconciler;

/// Messages accepted by the watcher thread
#[derive(Debug)]
pub enum WatchEvent {
    /// The page changed; carries the new tree
    Mutation(PageSnapshot),
    /// The OS asked for a transport action
    Transport(TransportAction),
    Shutdown,
}

/// Why a full pass is due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassTrigger {
    /// Settle delay elapsed; first look at the page
    Settled,
    Debounce,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Observing,
}

/// Timer bookkeeping for the detection loop
#[derive(Debug)]
pub struct Scheduler {
    state: LoopState,
    settle_at: Instant,
    debounce: Duration,
    fallback_interval: Duration,
    pending_debounce: Option<Instant>,
    next_fallback: Option<Instant>,
}

impl Scheduler {
    pub fn new(start: Instant, settle_delay: Duration, debounce: Duration, fallback_interval: Duration) -> Self {
        Self {
            state: LoopState::Idle,
            settle_at: start + settle_delay,
            debounce,
            fallback_interval,
            pending_debounce: None,
            next_fallback: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_observing(&self) -> bool {
        self.state == LoopState::Observing
    }

    /// Note a mutation. Returns `true` if it scheduled a debounced pass.
    ///
    /// Ignored while idle, and while a debounced pass is already pending.
    pub fn on_mutation(&mut self, now: Instant) -> bool {
        if !self.is_observing() || self.pending_debounce.is_some() {
            return false;
        }
        self.pending_debounce = Some(now + self.debounce);
        true
    }

    /// Earliest moment something is due.
    pub fn next_deadline(&self) -> Instant {
        match self.state {
            LoopState::Idle => self.settle_at,
            LoopState::Observing => [self.pending_debounce, self.next_fallback]
                .into_iter()
                .flatten()
                .min()
                .unwrap_or(self.settle_at),
        }
    }

    /// Fire whatever is due at `now`. Several due timers collapse into one
    /// pass.
    pub fn poll(&mut self, now: Instant) -> Option<PassTrigger> {
        if self.state == LoopState::Idle {
            if now < self.settle_at {
                return None;
            }
            self.state = LoopState::Observing;
            self.next_fallback = Some(now + self.fallback_interval);
            return Some(PassTrigger::Settled);
        }

        let debounce_due = self.pending_debounce.is_some_and(|at| now >= at);
        let fallback_due = self.next_fallback.is_some_and(|at| now >= at);
        if fallback_due {
            self.next_fallback = Some(now + self.fallback_interval);
        }
        if debounce_due {
            self.pending_debounce = None;
            return Some(PassTrigger::Debounce);
        }
        fallback_due.then_some(PassTrigger::Fallback)
    }
}

/// The detection loop and everything it owns
pub struct Watcher {
    reconciler: Reconciler,
    controls: Box<dyn PlayerControls + Send>,
    scheduler: Scheduler,
    latest: Option<PageSnapshot>,
    seek_offset: f64,
}

impl Watcher {
    pub fn new(config: &Config, reconciler: Reconciler, controls: impl PlayerControls + Send + 'static) -> Self {
        Self {
            reconciler,
            controls: Box::new(controls),
            scheduler: Scheduler::new(
                Instant::now(),
                config.settle_delay(),
                config.debounce(),
                config.fallback_interval(),
            ),
            latest: None,
            seek_offset: config.seek_offset_secs,
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Handle one queued message. Returns `false` on shutdown.
    pub fn handle(&mut self, event: WatchEvent, now: Instant) -> bool {
        match event {
            WatchEvent::Mutation(snapshot) => {
                if self.scheduler.is_observing() {
                    self.reconciler.title_pass(&Page::parse(&snapshot));
                }
                self.latest = Some(snapshot);
                self.scheduler.on_mutation(now);
            }
            WatchEvent::Transport(action) => self.transport(action),
            WatchEvent::Shutdown => return false,
        }
        true
    }

    /// Run the pass that is due at `now`, if any.
    pub fn tick(&mut self, now: Instant) {
        let Some(trigger) = self.scheduler.poll(now) else {
            return;
        };
        if trigger == PassTrigger::Settled {
            info!("Page settled, observing");
        }
        match &self.latest {
            Some(snapshot) => {
                debug!("Full detection pass ({trigger:?})");
                self.reconciler.full_pass(&Page::parse(snapshot));
            }
            None => debug!("No page yet, skipping {trigger:?} pass"),
        }
    }

    fn transport(&mut self, action: TransportAction) {
        let Some(snapshot) = &self.latest else {
            warn!("Transport '{}' before any page was seen", action.name());
            return;
        };
        let page = Page::parse(snapshot);
        match resolve_transport(action, &page, self.seek_offset) {
            Some(ui_action) => {
                debug!("Transport '{}' -> {ui_action:?}", action.name());
                if let Err(e) = self.controls.perform(&ui_action) {
                    warn!("Failed to perform '{}': {e:#}", action.name());
                }
            }
            None => warn!("No control found for transport '{}'", action.name()),
        }
    }

    /// Consume `rx` until shutdown or until every sender is gone.
    pub fn run(mut self, rx: Receiver<WatchEvent>) {
        loop {
            let timeout = self
                .scheduler
                .next_deadline()
                .saturating_duration_since(Instant::now());
            match rx.recv_timeout(timeout) {
                Ok(event) => {
                    if !self.handle(event, Instant::now()) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.tick(Instant::now());
        }
        info!("Watcher stopped");
    }

    /// Start the loop on its own thread.
    pub fn spawn(self) -> Result<WatcherHandle> {
        let (tx, rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("page-watcher".into())
            .spawn(move || self.run(rx))
            .context("Failed to spawn watcher thread")?;
        Ok(WatcherHandle {
            tx,
            thread: Mutex::new(Some(thread)),
        })
    }
}

/// Sending side of a running watcher; shareable between threads
pub struct WatcherHandle {
    tx: Sender<WatchEvent>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl WatcherHandle {
    /// Deliver a mutation notification. A no-op after shutdown.
    pub fn notify_mutation(&self, snapshot: PageSnapshot) {
        let _ = self.tx.send(WatchEvent::Mutation(snapshot));
    }

    /// Deliver a transport command. A no-op after shutdown.
    pub fn transport(&self, action: TransportAction) {
        let _ = self.tx.send(WatchEvent::Transport(action));
    }

    /// Stop the loop and wait for it. Safe to call more than once; when it
    /// returns, no further events will be published.
    pub fn shutdown(&self) {
        let Some(thread) = self.thread.lock().ok().and_then(|mut t| t.take()) else {
            return;
        };
        let _ = self.tx.send(WatchEvent::Shutdown);
        if thread.join().is_err() {
            warn!("Watcher thread panicked");
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
