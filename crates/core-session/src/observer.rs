//! Notifications for a suggestion overlay or any other session listener.

use core_detect::Navigation;
use core_dom::NodeId;
use core_model::MacroId;

/// Where a detection currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionContext {
    pub buffer: String,
    /// Field element or rich editing host.
    pub element: NodeId,
    /// Absolute caret offset at the time of the notification.
    pub caret: usize,
}

/// Session listener. Every method has a no-op default.
///
/// `on_navigation_requested` and `on_commit_requested` may claim the
/// keystroke by returning `true`; the session then leaves the key to the
/// observer instead of applying its own handling.
pub trait DetectionObserver: Send + Sync {
    fn on_detection_started(&self, _ctx: &DetectionContext) {}
    fn on_detection_updated(&self, _ctx: &DetectionContext) {}
    fn on_detection_cancelled(&self) {}
    /// Escape while a detection is running.
    fn on_cancel_requested(&self) {}
    fn on_navigation_requested(&self, _nav: Navigation, _ctx: &DetectionContext) -> bool {
        false
    }
    /// Commit key in manual mode, asked before the session commits itself.
    fn on_commit_requested(&self, _ctx: &DetectionContext) -> bool {
        false
    }
    fn on_macro_committed(&self, _id: &MacroId, _ctx: &DetectionContext) {}
    /// Tab while a detection is running.
    fn on_show_all_requested(&self, _ctx: &DetectionContext) {}
}
