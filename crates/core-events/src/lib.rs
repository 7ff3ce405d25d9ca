//! Core event types and channel helpers for the expander runtime.
//!
//! The detector itself is synchronous; this crate only describes what a host
//! feeds it (keydowns, focus changes, ticks) and the async plumbing the replay
//! binary uses to produce those events.

mod key;

pub use key::{Key, KeyPress, ModMask, NamedKey};

use std::sync::atomic::AtomicU64;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;

// -------------------------------------------------------------------------------------------------
// Channel Policy
// -------------------------------------------------------------------------------------------------
// Bounded mpsc channel sized by `EVENT_CHANNEL_CAP`. Producers await capacity rather than dropping
// keystrokes: a lost keydown desynchronizes the detection buffer from the field contents.
// -------------------------------------------------------------------------------------------------
pub const EVENT_CHANNEL_CAP: usize = 1024;

// -------------------------------------------------------------------------------------------------
// Telemetry
// -------------------------------------------------------------------------------------------------
pub static CHANNEL_SEND_FAILURES: AtomicU64 = AtomicU64::new(0);
pub static KEYDOWN_TOTAL: AtomicU64 = AtomicU64::new(0); // keydown events emitted by sources
pub static TICK_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Top-level event enum consumed by the central event loop.
#[derive(Debug, Clone)]
pub enum Event {
    Input(InputEvent),
    /// Periodic monotonic tick used to fire deferred commits and blur debounce
    /// without busy polling.
    Tick,
    Shutdown,
}

/// Host input surfaced to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    KeyDown(KeyPress),
    /// Focus moved to the element with the given DOM id.
    FocusGained(String),
    /// The focused element lost focus (window blur, click elsewhere, overlay focus).
    FocusLost,
}

// -------------------------------------------------------------------------------------------------
// Async Event Sources
// -------------------------------------------------------------------------------------------------
// Each source owns one background task pushing `Event`s into the shared channel and terminates
// when the channel closes. Backpressure comes from the bounded channel.

/// Trait implemented by any async event producer.
pub trait AsyncEventSource: Send + 'static {
    /// Human-readable stable identifier (used for logging / diagnostics).
    fn name(&self) -> &'static str;
    /// Consume self and spawn the background task. Implementors stop when
    /// `tx.send(..).await` returns Err (channel closed) or on their own stop condition.
    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()>;
}

/// Registry of event sources, spawned together at startup.
pub struct EventSourceRegistry {
    sources: Vec<Box<dyn AsyncEventSource>>,
}

impl Default for EventSourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    pub fn register<S: AsyncEventSource>(&mut self, src: S) {
        self.sources.push(Box::new(src));
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Spawn all registered sources, returning their JoinHandles. Each source receives its own
    /// `Sender` clone; during shutdown the caller drops its final clone before awaiting the
    /// handles so sources observe the closed channel and exit.
    pub fn spawn_all(&mut self, tx: &Sender<Event>) -> Vec<JoinHandle<()>> {
        // Drain so a second call cannot spawn duplicates.
        let mut out = Vec::with_capacity(self.sources.len());
        for src in self.sources.drain(..) {
            let name = src.name();
            tracing::info!(target: "runtime.events", source = name, "spawning event source");
            out.push(src.spawn(tx.clone()));
        }
        out
    }
}

/// Built-in monotonic tick source. Emits `Event::Tick` every configured interval.
pub struct TickEventSource {
    interval: std::time::Duration,
}

impl TickEventSource {
    pub fn new(interval: std::time::Duration) -> Self {
        Self { interval }
    }
}

impl AsyncEventSource for TickEventSource {
    fn name(&self) -> &'static str {
        "tick"
    }
    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
        let dur = self.interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(dur);
            loop {
                interval.tick().await;
                if tx.send(Event::Tick).await.is_err() {
                    break;
                }
                TICK_TOTAL.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
        })
    }
}
