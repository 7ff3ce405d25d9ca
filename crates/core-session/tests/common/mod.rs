#![allow(dead_code)] // Shared across integration tests; each binary uses a subset of helpers.

use core_config::{Config, ConfigFile};
use core_dom::html::inner_html;
use core_dom::{Document, NodeId, Surface, resolve_surface};
use core_events::KeyPress;
use core_model::{Macro, MacroId};
use core_session::{DetectionContext, DetectionObserver, KeyOutcome, Session, press};
use core_detect::Navigation;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// `/sig`, `/brb` and the longer `/signature`.
pub fn scenario_macros() -> Vec<Macro> {
    vec![
        Macro::plain("sig", "/sig", "My Signature"),
        Macro::plain("brb", "/brb", "Be right back"),
        Macro::plain("signature", "/signature", "My Full Signature"),
    ]
}

pub fn slash_config() -> Config {
    Config::with_prefixes(["/"])
}

pub fn manual_config() -> Config {
    let mut file = ConfigFile::default();
    file.detection.prefixes = vec!["/".into()];
    file.detection.use_commit_keys = true;
    Config::from_file(&file)
}

pub struct Harness {
    pub session: Session,
    pub doc: Document,
    pub target: NodeId,
    pub base: Instant,
    pub now: Instant,
}

impl Harness {
    /// Document built from `html` with element `id` focused.
    pub fn new(html: &str, id: &str, config: Config, macros: Vec<Macro>) -> Self {
        let mut doc = Document::from_html(html).unwrap();
        let target = doc.element_by_id(id).unwrap();
        doc.focus(target);
        let mut session = Session::new(config, macros);
        session.initialize();
        session.handle_focus(&doc);
        let base = Instant::now();
        let mut h = Self {
            session,
            doc,
            target,
            base,
            now: base,
        };
        h.caret_to_end();
        h
    }

    /// Single-line input holding `value`, focused, caret at the end.
    pub fn field(value: &str, config: Config, macros: Vec<Macro>) -> Self {
        Self::new(&format!(r#"<input id="f" value="{value}">"#), "f", config, macros)
    }

    pub fn textarea(value: &str, config: Config, macros: Vec<Macro>) -> Self {
        Self::new(&format!(r#"<textarea id="f">{value}</textarea>"#), "f", config, macros)
    }

    /// Editing host with `inner` markup, focused, caret at the end.
    pub fn rich(inner: &str, config: Config, macros: Vec<Macro>) -> Self {
        Self::new(
            &format!(r#"<div id="r" contenteditable="true">{inner}</div>"#),
            "r",
            config,
            macros,
        )
    }

    pub fn surface(&self) -> Surface {
        resolve_surface(&self.doc, self.target).unwrap()
    }

    pub fn caret_to_end(&mut self) {
        let s = self.surface();
        let len = s.text(&self.doc).chars().count();
        s.set_caret(&mut self.doc, len);
    }

    pub fn type_text(&mut self, text: &str) -> Vec<KeyOutcome> {
        text.chars()
            .map(|c| press(&mut self.session, &mut self.doc, &KeyPress::char(c), self.now))
            .collect()
    }

    /// Press a key in replay notation (`"Backspace"`, `"Space"`, `"Ctrl+z"`).
    pub fn key(&mut self, spec: &str) -> KeyOutcome {
        press(&mut self.session, &mut self.doc, &KeyPress::parse(spec), self.now)
    }

    /// Move the clock forward and fire due timers.
    pub fn advance(&mut self, ms: u64) -> Option<MacroId> {
        self.now += Duration::from_millis(ms);
        self.session.poll_timers(&mut self.doc, self.now)
    }

    pub fn text(&self) -> String {
        self.surface().text(&self.doc)
    }

    pub fn caret(&self) -> usize {
        self.surface().caret(&self.doc).map(|c| c.end).unwrap()
    }

    pub fn html(&self) -> String {
        inner_html(&self.doc, self.target)
    }

    pub fn active(&self) -> bool {
        self.session.state().active
    }

    pub fn buffer(&self) -> String {
        self.session.state().buffer.clone()
    }

    pub fn observe(&mut self, recorder: &Recorder) {
        self.session.add_observer(Box::new(recorder.clone()));
    }
}

/// Observer that records notifications as short strings.
#[derive(Clone, Default)]
pub struct Recorder {
    log: Arc<Mutex<Vec<String>>>,
    pub claim_navigation: bool,
    pub claim_commit: bool,
}

impl Recorder {
    pub fn claiming(navigation: bool, commit: bool) -> Self {
        Self {
            log: Arc::default(),
            claim_navigation: navigation,
            claim_commit: commit,
        }
    }

    pub fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
    }

    fn push(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

impl DetectionObserver for Recorder {
    fn on_detection_started(&self, ctx: &DetectionContext) {
        self.push(format!("started {}", ctx.buffer));
    }
    fn on_detection_updated(&self, ctx: &DetectionContext) {
        self.push(format!("updated {}", ctx.buffer));
    }
    fn on_detection_cancelled(&self) {
        self.push("cancelled".into());
    }
    fn on_cancel_requested(&self) {
        self.push("cancel_requested".into());
    }
    fn on_navigation_requested(&self, nav: Navigation, _ctx: &DetectionContext) -> bool {
        self.push(format!("navigation {nav:?}"));
        self.claim_navigation
    }
    fn on_commit_requested(&self, ctx: &DetectionContext) -> bool {
        self.push(format!("commit_requested {}", ctx.buffer));
        self.claim_commit
    }
    fn on_macro_committed(&self, id: &MacroId, _ctx: &DetectionContext) {
        self.push(format!("committed {id}"));
    }
    fn on_show_all_requested(&self, ctx: &DetectionContext) {
        self.push(format!("show_all {}", ctx.buffer));
    }
}
