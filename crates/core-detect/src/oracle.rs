//! Exact-match oracle.

use core_model::Macro;

use crate::lookup::CommandLookup;
use crate::state::DetectionState;

/// What the current buffer means for the macro list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Nothing starts with the buffer.
    None,
    /// Some longer command starts with the buffer; no exact match yet.
    Partial,
    /// Exact match and nothing longer.
    Exact,
    /// Exact match that is also a strict prefix of a longer command.
    Ambiguous,
}

pub fn is_exact<L: CommandLookup + ?Sized>(state: &DetectionState, macros: &L) -> bool {
    !state.buffer.is_empty() && macros.exact(&state.buffer).is_some()
}

pub fn exact_match<'a, L: CommandLookup + ?Sized>(buffer: &str, macros: &'a L) -> Option<&'a Macro> {
    if buffer.is_empty() {
        return None;
    }
    macros.exact(buffer)
}

pub fn has_longer_prefix_match<L: CommandLookup + ?Sized>(buffer: &str, macros: &L) -> bool {
    macros.has_longer(buffer)
}

pub fn is_command_prefix<L: CommandLookup + ?Sized>(buffer: &str, macros: &L) -> bool {
    macros.is_command_prefix(buffer)
}

pub fn assess<L: CommandLookup + ?Sized>(buffer: &str, macros: &L) -> MatchKind {
    if buffer.is_empty() {
        return MatchKind::None;
    }
    match (macros.exact(buffer).is_some(), macros.has_longer(buffer)) {
        (true, false) => MatchKind::Exact,
        (true, true) => MatchKind::Ambiguous,
        (false, true) => MatchKind::Partial,
        (false, false) => MatchKind::None,
    }
}
