//! Text replacement for editable surfaces.
//!
//! [`replace`] swaps an absolute character range for macro content on either
//! kind of surface. [`markers`] wraps rich expansions so they can be undone
//! or settled later.

pub mod engine;
pub mod markers;

pub use engine::{Content, ReplaceError, ReplaceOutcome, Strategy, TextRange, replace, replace_marked};
pub use markers::{
    FieldExpansion, LEDGER_CAPACITY, MarkerMeta, UndoLedger, find_markers, is_marker,
    remove_all_markers, undo_most_recent, undo_specific, wrap_with_marker,
};
