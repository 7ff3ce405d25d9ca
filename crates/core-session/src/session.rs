//! Detection orchestrator.
//!
//! A [`Session`] owns everything that lives across keystrokes: the macro
//! snapshot and its trie, the detection state, the deferred commit, the blur
//! debounce deadline and the field undo ledger. Hosts feed it keydowns, focus
//! changes and clock ticks; it mutates the document synchronously and reports
//! whether the keystroke's default action must be suppressed.

use std::fmt;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use core_config::Config;
use core_detect::{
    CommandTrie, CommitDecision, CommitMode, CommitScheduler, DetectionState, KeyClass, classify,
    decide, exact_match, is_commit_key, navigation, update_state_on_key,
};
use core_dom::{Caret, Document, NodeId, Surface, char_len, resolve_surface};
use core_events::{KeyPress, NamedKey};
use core_model::{Macro, MacroId, MacroSet};
use core_replace::{
    Content, FieldExpansion, MarkerMeta, TextRange, UndoLedger, replace, replace_marked,
};
use tracing::{debug, info, trace, warn};

use crate::observer::{DetectionContext, DetectionObserver};
use crate::system;

/// Characters scanned backward when rebuilding a buffer on Backspace.
pub const RECONSTRUCT_WINDOW: usize = 128;

/// Selection captured when a deferred commit is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub element: NodeId,
    pub caret: Caret,
}

/// What the host must do with the keystroke it just reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyOutcome {
    /// Suppress the key's default action.
    pub prevent_default: bool,
    pub committed: Option<MacroId>,
}

impl KeyOutcome {
    fn pass() -> Self {
        Self::default()
    }

    fn prevent() -> Self {
        Self {
            prevent_default: true,
            committed: None,
        }
    }

    fn committed(id: MacroId) -> Self {
        Self {
            prevent_default: true,
            committed: Some(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancelReason {
    NoSurface,
    ElementChanged,
    Selection,
    Navigation,
    Escape,
    Key,
    FocusMoved,
    BlurTimeout,
    Stale,
    Failed,
    ConfigChanged,
    Destroyed,
}

impl CancelReason {
    fn as_str(self) -> &'static str {
        match self {
            CancelReason::NoSurface => "no_surface",
            CancelReason::ElementChanged => "element_changed",
            CancelReason::Selection => "selection",
            CancelReason::Navigation => "navigation",
            CancelReason::Escape => "escape",
            CancelReason::Key => "key",
            CancelReason::FocusMoved => "focus_moved",
            CancelReason::BlurTimeout => "blur_timeout",
            CancelReason::Stale => "stale_commit",
            CancelReason::Failed => "commit_failed",
            CancelReason::ConfigChanged => "config_changed",
            CancelReason::Destroyed => "destroyed",
        }
    }
}

/// A buffer as it may appear in logs: sensitive triggers show only a length.
struct LoggedBuffer<'a> {
    buffer: &'a str,
    redact: bool,
}

impl fmt::Display for LoggedBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.redact {
            write!(f, "<redacted {} chars>", char_len(self.buffer))
        } else {
            f.write_str(self.buffer)
        }
    }
}

pub struct Session {
    config: Config,
    mode: CommitMode,
    macros: MacroSet,
    trie: CommandTrie,
    state: DetectionState,
    scheduler: CommitScheduler<Snapshot>,
    blur_deadline: Option<Instant>,
    ledger: UndoLedger,
    last_element: Option<NodeId>,
    observers: Vec<Box<dyn DetectionObserver>>,
    initialized: bool,
    origin: Instant,
    origin_wall_ms: u64,
}

impl Session {
    /// Build an uninitialized session; call [`Session::initialize`] before
    /// feeding it events.
    pub fn new(config: Config, user_macros: Vec<Macro>) -> Self {
        let macros = MacroSet::new(user_macros, config.primary_prefix());
        let trie = CommandTrie::build(&macros);
        let origin_wall_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            mode: CommitMode::from_commit_keys(config.use_commit_keys),
            scheduler: CommitScheduler::new(config.commit_delay),
            config,
            macros,
            trie,
            state: DetectionState::inactive(),
            blur_deadline: None,
            ledger: UndoLedger::new(),
            last_element: None,
            observers: Vec::new(),
            initialized: false,
            origin: Instant::now(),
            origin_wall_ms,
        }
    }

    pub fn initialize(&mut self) {
        self.initialized = true;
        info!(
            target: "session.lifecycle",
            macros = self.macros.len(),
            prefixes = self.config.prefixes.len(),
            manual_commit = self.config.use_commit_keys,
            "initialized"
        );
    }

    /// Drop timers, state and undo history. Events are ignored until the
    /// session is initialized again.
    pub fn destroy(&mut self) {
        self.cancel_session(CancelReason::Destroyed);
        self.ledger.clear();
        self.last_element = None;
        self.initialized = false;
        info!(target: "session.lifecycle", "destroyed");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn add_observer(&mut self, observer: Box<dyn DetectionObserver>) {
        self.observers.push(observer);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &DetectionState {
        &self.state
    }

    pub fn macros(&self) -> &MacroSet {
        &self.macros
    }

    pub fn ledger(&self) -> &UndoLedger {
        &self.ledger
    }

    pub fn has_pending_commit(&self) -> bool {
        self.scheduler.pending().is_some()
    }

    /// Earliest instant at which [`Session::poll_timers`] has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.scheduler.deadline(), self.blur_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Swap in a new macro list. System macros are prepended again.
    pub fn set_macros(&mut self, user_macros: Vec<Macro>) {
        self.macros = MacroSet::new(user_macros, self.config.primary_prefix());
        self.trie = CommandTrie::build(&self.macros);
        info!(
            target: "session.lifecycle",
            macros = self.macros.len(),
            trie_nodes = self.trie.node_count(),
            "macros_updated"
        );
    }

    pub fn set_config(&mut self, config: Config) {
        if config == self.config {
            return;
        }
        self.cancel_session(CancelReason::ConfigChanged);
        let prefix_changed = config.primary_prefix() != self.config.primary_prefix();
        self.mode = CommitMode::from_commit_keys(config.use_commit_keys);
        self.scheduler.set_delay(config.commit_delay);
        self.config = config;
        if prefix_changed {
            let user = self.macros.user_macros().to_vec();
            self.set_macros(user);
        }
        info!(target: "session.lifecycle", manual_commit = self.config.use_commit_keys, "config_updated");
    }

    /// Process one keydown. Must run before the key's default action.
    pub fn handle_keydown(&mut self, doc: &mut Document, key: &KeyPress, now: Instant) -> KeyOutcome {
        if !self.initialized {
            return KeyOutcome::pass();
        }
        if self.config.is_site_disabled(doc.hostname()) {
            trace!(target: "session.keys", host = doc.hostname(), "site_disabled");
            return KeyOutcome::pass();
        }
        let surface = doc.active_element().and_then(|t| resolve_surface(doc, t));
        let Some(surface) = surface else {
            self.cancel_session(CancelReason::NoSurface);
            return KeyOutcome::pass();
        };
        let element = surface.element();
        if self.last_element != Some(element) {
            self.cancel_session(CancelReason::ElementChanged);
            self.last_element = Some(element);
        }
        let Some(caret) = surface.caret(doc) else {
            self.cancel_session(CancelReason::NoSurface);
            return KeyOutcome::pass();
        };
        if !caret.is_collapsed() {
            self.cancel_session(CancelReason::Selection);
            return KeyOutcome::pass();
        }
        trace!(target: "session.keys", key = %key, active = self.state.active, "keydown");

        if self.state.active {
            let ctx = self.context(element, caret.end);
            if let Some(nav) = navigation(key) {
                if self.observers.iter().any(|o| o.on_navigation_requested(nav, &ctx)) {
                    trace!(target: "session.keys", ?nav, "navigation_claimed");
                    return KeyOutcome::prevent();
                }
                self.cancel_session(CancelReason::Navigation);
                return KeyOutcome::pass();
            }
            if key.key.is_named(NamedKey::Tab) {
                debug!(target: "session.keys", "show_all_requested");
                for o in &self.observers {
                    o.on_show_all_requested(&ctx);
                }
                return KeyOutcome::prevent();
            }
            if key.key.is_named(NamedKey::Escape) {
                self.cancel_session(CancelReason::Escape);
                for o in &self.observers {
                    o.on_cancel_requested();
                }
                return KeyOutcome::pass();
            }
            if self.mode == CommitMode::Manual && is_commit_key(key) {
                if self.observers.iter().any(|o| o.on_commit_requested(&ctx)) {
                    trace!(target: "session.keys", "commit_claimed");
                    return KeyOutcome::prevent();
                }
                if let Some(m) = exact_match(&self.state.buffer, &self.trie).cloned() {
                    let range = TextRange::ending_at(caret.end, self.state.char_len());
                    return self.commit(doc, &surface, range, m, now);
                }
            }
        }

        match classify(key) {
            KeyClass::Backspace => {
                self.on_backspace(doc, &surface, caret, key, now);
                KeyOutcome::pass()
            }
            KeyClass::Printable(_) => self.on_printable(doc, &surface, caret, key, now),
            KeyClass::Modifier => KeyOutcome::pass(),
            KeyClass::Cancelling | KeyClass::Other => {
                self.cancel_session(CancelReason::Key);
                KeyOutcome::pass()
            }
        }
    }

    fn on_printable(
        &mut self,
        doc: &mut Document,
        surface: &Surface,
        caret: Caret,
        key: &KeyPress,
        now: Instant,
    ) -> KeyOutcome {
        let next = update_state_on_key(&self.state, key, &self.trie, &self.config.prefixes);
        self.transition(next, surface.element(), caret.end + 1);
        match decide(&self.state, &self.trie, self.mode) {
            CommitDecision::Immediate => {
                let Some(m) = exact_match(&self.state.buffer, &self.trie).cloned() else {
                    return KeyOutcome::pass();
                };
                // The keystroke's own character has not reached the text yet.
                let typed = self.state.char_len().saturating_sub(1);
                self.commit(doc, surface, TextRange::ending_at(caret.end, typed), m, now)
            }
            CommitDecision::Defer => {
                self.arm_deferred(surface.element(), caret.end + 1, now);
                KeyOutcome::pass()
            }
            CommitDecision::Wait => KeyOutcome::pass(),
        }
    }

    /// Schedule a commit of the current buffer, expecting the caret at `caret`
    /// once the keystroke's default action has run.
    fn arm_deferred(&mut self, element: NodeId, caret: usize, now: Instant) {
        let snapshot = Snapshot {
            element,
            caret: Caret::collapsed(caret),
        };
        let id = self.scheduler.arm(now, self.state.buffer.clone(), snapshot);
        debug!(
            target: "session.commit",
            id,
            buffer = %self.logged(&self.state.buffer),
            "commit_deferred"
        );
    }

    fn on_backspace(
        &mut self,
        doc: &Document,
        surface: &Surface,
        caret: Caret,
        key: &KeyPress,
        now: Instant,
    ) {
        let base = if !self.state.active && self.state.buffer.is_empty() {
            match self.reconstruct(doc, surface) {
                Some(buffer) => {
                    debug!(target: "session.keys", buffer = %self.logged(&buffer), "buffer_reconstructed");
                    DetectionState::resumed(buffer)
                }
                None => return,
            }
        } else {
            self.state.clone()
        };
        let next = update_state_on_key(&base, key, &self.trie, &self.config.prefixes);
        let at = caret.end.saturating_sub(1);
        self.transition(next, surface.element(), at);
        // Deleting onto a command never commits on the spot, only after the delay.
        if decide(&self.state, &self.trie, self.mode) != CommitDecision::Wait {
            self.arm_deferred(surface.element(), at, now);
        }
    }

    /// Trailing non-whitespace run before the caret, from the last point
    /// where a configured prefix begins.
    fn reconstruct(&self, doc: &Document, surface: &Surface) -> Option<String> {
        let before = surface.text_before_caret(doc, RECONSTRUCT_WINDOW)?;
        let run_start = before
            .char_indices()
            .rev()
            .take_while(|(_, c)| !c.is_whitespace())
            .last()
            .map(|(i, _)| i)?;
        let run = &before[run_start..];
        run.char_indices()
            .rev()
            .map(|(i, _)| &run[i..])
            .find(|tail| self.config.prefixes.iter().any(|p| tail.starts_with(p.as_str())))
            .map(str::to_string)
    }

    /// Install `next` and tell observers what changed.
    fn transition(&mut self, next: DetectionState, element: NodeId, caret: usize) {
        let prev = std::mem::replace(&mut self.state, next);
        if prev.buffer == self.state.buffer {
            return;
        }
        // Any buffer change pauses a pending ambiguous commit.
        self.scheduler.cancel();
        match (prev.active, self.state.active) {
            (false, true) => {
                debug!(target: "session.keys", buffer = %self.logged(&self.state.buffer), "detection_started");
                let ctx = self.context(element, caret);
                for o in &self.observers {
                    o.on_detection_started(&ctx);
                }
            }
            (true, true) => {
                trace!(target: "session.keys", buffer = %self.logged(&self.state.buffer), "detection_updated");
                let ctx = self.context(element, caret);
                for o in &self.observers {
                    o.on_detection_updated(&ctx);
                }
            }
            (true, false) => {
                debug!(target: "session.keys", reason = "no_match", "detection_cancelled");
                for o in &self.observers {
                    o.on_detection_cancelled();
                }
            }
            (false, false) => {}
        }
    }

    fn cancel_session(&mut self, reason: CancelReason) {
        let had_timer = self.scheduler.cancel();
        self.blur_deadline = None;
        if self.state.active {
            debug!(
                target: "session.keys",
                reason = reason.as_str(),
                buffer = %self.logged(&self.state.buffer),
                "detection_cancelled"
            );
            self.state = DetectionState::inactive();
            for o in &self.observers {
                o.on_detection_cancelled();
            }
        } else if had_timer {
            trace!(target: "session.keys", reason = reason.as_str(), "timer_cleared");
        }
    }

    fn commit(
        &mut self,
        doc: &mut Document,
        surface: &Surface,
        range: TextRange,
        m: Macro,
        now: Instant,
    ) -> KeyOutcome {
        let stamp = self.ledger.stamp(self.wall_ms(now));
        let content = if m.is_system() {
            Content::empty()
        } else {
            Content::for_macro(&m)
        };
        let marker = (surface.is_rich() && self.config.undo_markers && !m.is_system())
            .then(|| MarkerMeta::new(m.id.clone(), m.command.clone(), stamp, content.is_html()));
        let result = match &marker {
            Some(meta) => replace_marked(doc, surface, range, &content, meta),
            None => replace(doc, surface, range, &content),
        };
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(target: "session.commit", macro_id = %m.id, error = %e, "commit_abandoned");
                self.cancel_session(CancelReason::Failed);
                return KeyOutcome::pass();
            }
        };

        if let Surface::Field { element, kind } = *surface
            && !m.is_system()
        {
            self.ledger.record(FieldExpansion {
                element,
                start: range.start,
                inserted: content.field_text(kind),
                original_command: m.command.clone(),
                macro_id: m.id.clone(),
                stamp,
            });
        }
        if let Some(action) = m.system {
            system::run(action, doc, surface, &mut self.ledger);
        }

        info!(
            target: "session.commit",
            macro_id = %m.id,
            command = %LoggedBuffer { buffer: &m.command, redact: m.is_sensitive },
            strategy = outcome.strategy.as_str(),
            inserted = outcome.inserted_len,
            "macro_committed"
        );
        self.scheduler.cancel();
        self.blur_deadline = None;
        self.state = DetectionState::inactive();
        let ctx = DetectionContext {
            buffer: m.command.clone(),
            element: surface.element(),
            caret: outcome.caret,
        };
        for o in &self.observers {
            o.on_macro_committed(&m.id, &ctx);
        }
        KeyOutcome::committed(m.id)
    }

    /// Commit a macro picked by an observer (e.g. a suggestion list) in place
    /// of the current buffer.
    pub fn commit_macro(&mut self, doc: &mut Document, id: &MacroId, now: Instant) -> bool {
        if !self.initialized || !self.state.active {
            return false;
        }
        let Some(m) = self.macros.by_id(id).cloned() else {
            debug!(target: "session.commit", macro_id = %id, "unknown_macro");
            return false;
        };
        let surface = doc.active_element().and_then(|t| resolve_surface(doc, t));
        let Some((surface, caret)) = surface.and_then(|s| s.caret(doc).map(|c| (s, c))) else {
            self.cancel_session(CancelReason::NoSurface);
            return false;
        };
        if !caret.is_collapsed() || self.last_element != Some(surface.element()) {
            self.cancel_session(CancelReason::Selection);
            return false;
        }
        let range = TextRange::ending_at(caret.end, self.state.char_len());
        self.commit(doc, &surface, range, m, now).committed.is_some()
    }

    /// Focus left the current element. The session survives if focus comes
    /// back before the debounce elapses.
    pub fn handle_blur(&mut self, now: Instant) {
        if !self.initialized {
            return;
        }
        if self.state.active || self.has_pending_commit() {
            self.blur_deadline = Some(now + self.config.blur_debounce);
            trace!(target: "session.focus", "blur_debounce_armed");
        }
    }

    /// Focus moved to whatever `doc` reports as active.
    pub fn handle_focus(&mut self, doc: &Document) {
        if !self.initialized {
            return;
        }
        let element = doc
            .active_element()
            .and_then(|t| resolve_surface(doc, t))
            .map(|s| s.element());
        let blur_pending = self.blur_deadline.take().is_some();
        if element.is_some() && element == self.last_element {
            if blur_pending {
                trace!(target: "session.focus", "focus_returned");
            }
            return;
        }
        self.cancel_session(CancelReason::FocusMoved);
        self.last_element = element;
    }

    /// Fire whatever timers are due at `now`. Returns the macro committed by
    /// a deferred commit, if any.
    pub fn poll_timers(&mut self, doc: &mut Document, now: Instant) -> Option<MacroId> {
        if !self.initialized {
            return None;
        }
        if self.blur_deadline.is_some_and(|d| now >= d) {
            debug!(target: "session.focus", "blur_debounce_elapsed");
            self.cancel_session(CancelReason::BlurTimeout);
        }
        let task = self.scheduler.poll(now)?;
        let observed = self.observe(doc, task.snapshot().element);
        if let Err(reason) = task.revalidate(&self.state, &self.trie, observed.as_ref()) {
            debug!(target: "session.commit", id = task.id(), %reason, "deferred_commit_stale");
            self.cancel_session(CancelReason::Stale);
            return None;
        }
        let surface = resolve_surface(doc, task.snapshot().element)?;
        let m = exact_match(task.buffer(), &self.trie).cloned()?;
        let range = TextRange::ending_at(task.snapshot().caret.end, char_len(task.buffer()));
        debug!(target: "session.commit", id = task.id(), "deferred_commit_fired");
        self.commit(doc, &surface, range, m, now).committed
    }

    /// Current selection of `element`, if it is still the focused surface.
    fn observe(&self, doc: &Document, element: NodeId) -> Option<Snapshot> {
        let surface = resolve_surface(doc, doc.active_element()?)?;
        if surface.element() != element {
            return None;
        }
        let caret = surface.caret(doc)?;
        Some(Snapshot { element, caret })
    }

    fn context(&self, element: NodeId, caret: usize) -> DetectionContext {
        DetectionContext {
            buffer: self.state.buffer.clone(),
            element,
            caret,
        }
    }

    fn logged<'a>(&self, buffer: &'a str) -> LoggedBuffer<'a> {
        let redact = self
            .macros
            .iter()
            .any(|m| m.is_sensitive && m.command.starts_with(buffer));
        LoggedBuffer { buffer, redact }
    }

    fn wall_ms(&self, now: Instant) -> u64 {
        self.origin_wall_ms + now.saturating_duration_since(self.origin).as_millis() as u64
    }
}
