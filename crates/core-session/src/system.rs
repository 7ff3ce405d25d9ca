//! Side effects of the built-in system macros.

use core_dom::{Document, Surface};
use core_model::SystemAction;
use core_replace::{UndoLedger, remove_all_markers, undo_most_recent};
use tracing::debug;

/// Run `action` against the surface it was typed into. The trigger text has
/// already been removed. Returns whether anything changed.
pub(crate) fn run(
    action: SystemAction,
    doc: &mut Document,
    surface: &Surface,
    ledger: &mut UndoLedger,
) -> bool {
    let changed = match (action, *surface) {
        (SystemAction::UndoLastExpansion, Surface::Rich { root }) => undo_most_recent(doc, root),
        (SystemAction::UndoLastExpansion, Surface::Field { element, .. }) => {
            ledger.undo_most_recent(doc, element)
        }
        (SystemAction::SettleExpansions, Surface::Rich { root }) => {
            ledger.clear();
            remove_all_markers(doc, root) > 0
        }
        (SystemAction::SettleExpansions, Surface::Field { element, .. }) => {
            ledger.forget(element) > 0
        }
    };
    debug!(target: "session.system", action = action.name(), changed, "system_macro_ran");
    changed
}
