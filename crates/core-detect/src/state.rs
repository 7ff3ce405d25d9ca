//! Detection state machine.

use core_events::KeyPress;
use tracing::trace;

use crate::classify::{KeyClass, classify};
use crate::lookup::CommandLookup;

/// Per-session trigger tracking. `buffer` is empty iff `active` is false.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionState {
    pub active: bool,
    pub buffer: String,
}

impl DetectionState {
    pub fn inactive() -> Self {
        Self::default()
    }

    /// Active session resumed from an existing buffer. An empty buffer yields
    /// the inactive state.
    pub fn resumed(buffer: impl Into<String>) -> Self {
        let buffer = buffer.into();
        Self {
            active: !buffer.is_empty(),
            buffer,
        }
    }

    /// Buffer is a configured prefix, or a leading part of one, and nothing more.
    pub fn is_prefix_only(&self, prefixes: &[String]) -> bool {
        self.active && leads_a_prefix(&self.buffer, prefixes)
    }

    pub fn char_len(&self) -> usize {
        self.buffer.chars().count()
    }
}

fn leads_a_prefix(buffer: &str, prefixes: &[String]) -> bool {
    !buffer.is_empty() && prefixes.iter().any(|p| p.starts_with(buffer))
}

fn keeps_session<L: CommandLookup + ?Sized>(buffer: &str, macros: &L, prefixes: &[String]) -> bool {
    leads_a_prefix(buffer, prefixes) || macros.is_command_prefix(buffer)
}

/// Pure transition for one keydown.
///
/// A printable character on an empty buffer activates only when it is a
/// configured prefix or the first character of one; later characters keep the
/// session while the buffer still leads a prefix or some command. Backspace
/// drops one character and re-checks the same rule. Every other key ends the
/// session.
pub fn update_state_on_key<L: CommandLookup + ?Sized>(
    state: &DetectionState,
    key: &KeyPress,
    macros: &L,
    prefixes: &[String],
) -> DetectionState {
    let next = match classify(key) {
        KeyClass::Backspace => {
            let mut buffer = state.buffer.clone();
            if buffer.pop().is_none() || buffer.is_empty() {
                DetectionState::inactive()
            } else if keeps_session(&buffer, macros, prefixes) {
                DetectionState::resumed(buffer)
            } else {
                DetectionState::inactive()
            }
        }
        KeyClass::Printable(c) => {
            if state.buffer.is_empty() {
                let mut buffer = String::new();
                buffer.push(c);
                if leads_a_prefix(&buffer, prefixes) {
                    DetectionState::resumed(buffer)
                } else {
                    DetectionState::inactive()
                }
            } else {
                let mut buffer = state.buffer.clone();
                buffer.push(c);
                if keeps_session(&buffer, macros, prefixes) {
                    DetectionState::resumed(buffer)
                } else {
                    DetectionState::inactive()
                }
            }
        }
        KeyClass::Cancelling | KeyClass::Modifier | KeyClass::Other => DetectionState::inactive(),
    };
    trace!(
        target: "detect.state",
        key = %key,
        was_active = state.active,
        active = next.active,
        buffer_len = next.buffer.len(),
        "transition"
    );
    next
}
