//! Drives a [`Session`] over an in-memory fixture, either on a virtual clock or
//! through the tokio event loop.

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use core_config::Config;
use core_dom::html::inner_html;
use core_dom::{Document, NodeId, char_len, resolve_surface};
use core_events::{
    AsyncEventSource, CHANNEL_SEND_FAILURES, EVENT_CHANNEL_CAP, Event, EventSourceRegistry,
    InputEvent, KEYDOWN_TOTAL, TickEventSource,
};
use core_model::Macro;
use core_session::{Session, press};
use tokio::sync::mpsc::{self, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::script::Step;

/// Tick period for the real-time loop; bounds how late a deferred commit fires.
pub const TICK_INTERVAL: Duration = Duration::from_millis(10);

pub struct Replay {
    session: Session,
    doc: Document,
    now: Instant,
    commits: usize,
}

impl Replay {
    /// Parse `fixture`, focus `focus` (or the first editable element) with
    /// the caret at its end, and start a session.
    pub fn new(
        config: Config,
        macros: Vec<Macro>,
        fixture: &str,
        focus: Option<&str>,
        hostname: Option<&str>,
    ) -> Result<Self> {
        let mut doc = Document::from_html(fixture).context("parsing fixture html")?;
        if let Some(host) = hostname {
            doc.set_hostname(host);
        }
        let target = match focus {
            Some(id) => doc
                .element_by_id(id)
                .with_context(|| format!("fixture has no element with id {id:?}"))?,
            None => first_editable(&doc).context("fixture has no editable element")?,
        };
        let Some(surface) = resolve_surface(&doc, target) else {
            bail!("focus target is not editable");
        };
        doc.focus(target);
        let len = char_len(&surface.text(&doc));
        surface.set_caret(&mut doc, len);

        let mut session = Session::new(config, macros);
        session.initialize();
        session.handle_focus(&doc);
        info!(target: "runtime.replay", macros = session.macros().len(), rich = surface.is_rich(), "replay_ready");
        Ok(Self {
            session,
            doc,
            now: Instant::now(),
            commits: 0,
        })
    }

    pub fn handle_input(&mut self, input: &InputEvent, now: Instant) {
        self.now = now;
        match input {
            InputEvent::KeyDown(key) => {
                let outcome = press(&mut self.session, &mut self.doc, key, now);
                if outcome.committed.is_some() {
                    self.commits += 1;
                }
                trace!(target: "runtime.replay", key = %key, prevented = outcome.prevent_default, "key_replayed");
            }
            InputEvent::FocusGained(id) => match self.doc.element_by_id(id) {
                Some(el) => {
                    self.doc.focus(el);
                    // A rich host entered from elsewhere has no caret yet.
                    if let Some(surface) = resolve_surface(&self.doc, el)
                        && surface.caret(&self.doc).is_none()
                    {
                        let len = char_len(&surface.text(&self.doc));
                        surface.set_caret(&mut self.doc, len);
                    }
                    self.session.handle_focus(&self.doc);
                }
                None => warn!(target: "runtime.replay", id = id.as_str(), "focus_target_missing"),
            },
            InputEvent::FocusLost => {
                self.session.handle_blur(now);
                self.doc.blur();
            }
        }
    }

    pub fn tick(&mut self, now: Instant) {
        self.now = now;
        if self.session.poll_timers(&mut self.doc, now).is_some() {
            self.commits += 1;
        }
    }

    /// Run `steps` on a virtual clock: `wait` jumps straight to each timer
    /// deadline that falls inside it.
    pub fn run_simulated(&mut self, steps: &[Step]) {
        for step in steps {
            match step {
                Step::Wait(d) => self.advance(*d),
                other => {
                    for input in other.inputs() {
                        self.handle_input(&input, self.now);
                    }
                }
            }
        }
        info!(target: "runtime.replay", steps = steps.len(), commits = self.commits, "simulated_replay_done");
    }

    fn advance(&mut self, d: Duration) {
        let target = self.now + d;
        while let Some(deadline) = self.session.next_deadline().filter(|t| *t <= target) {
            self.tick(deadline);
            if self.session.next_deadline() == Some(deadline) {
                break;
            }
        }
        self.now = target;
    }

    /// Replay `steps` in real time through the event channel.
    pub async fn run_realtime(&mut self, steps: Vec<Step>) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<Event>(EVENT_CHANNEL_CAP);
        let mut registry = EventSourceRegistry::new();
        registry.register(ScriptEventSource::new(steps));
        registry.register(TickEventSource::new(TICK_INTERVAL));
        let handles = registry.spawn_all(&tx);
        drop(tx);

        while let Some(event) = rx.recv().await {
            let now = Instant::now();
            match event {
                Event::Input(input) => self.handle_input(&input, now),
                Event::Tick => self.tick(now),
                Event::Shutdown => {
                    debug!(target: "runtime.shutdown", "script_finished");
                    break;
                }
            }
        }
        rx.close();

        for handle in handles {
            match tokio::time::timeout(Duration::from_millis(200), handle).await {
                Ok(Ok(())) => trace!(target: "runtime.shutdown", "event_source_task_stopped"),
                Ok(Err(err)) => error!(target: "runtime.shutdown", ?err, "event_source_task_error"),
                Err(_) => warn!(target: "runtime.shutdown", "event_source_task_timeout"),
            }
        }
        info!(target: "runtime.replay", commits = self.commits, "realtime_replay_done");
        Ok(())
    }

    /// Serialized fixture; fields show their current value.
    pub fn html(&self) -> String {
        inner_html(&self.doc, self.doc.root())
    }

    pub fn commits(&self) -> usize {
        self.commits
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

fn first_editable(doc: &Document) -> Option<NodeId> {
    doc.descendants(doc.root())
        .into_iter()
        .find(|&n| doc.is_element(n) && resolve_surface(doc, n).is_some_and(|s| s.element() == n))
}

/// Emits a script's inputs, sleeping through its waits, then `Event::Shutdown`.
pub struct ScriptEventSource {
    steps: Vec<Step>,
}

impl ScriptEventSource {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }
}

impl AsyncEventSource for ScriptEventSource {
    fn name(&self) -> &'static str {
        "script"
    }

    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
        tokio::spawn(async move {
            for step in self.steps {
                if let Step::Wait(d) = step {
                    tokio::time::sleep(d).await;
                    continue;
                }
                for input in step.inputs() {
                    let is_key = matches!(input, InputEvent::KeyDown(_));
                    if tx.send(Event::Input(input)).await.is_err() {
                        CHANNEL_SEND_FAILURES.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                    if is_key {
                        KEYDOWN_TOTAL.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            let _ = tx.send(Event::Shutdown).await;
        })
    }
}
