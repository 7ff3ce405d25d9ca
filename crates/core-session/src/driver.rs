//! Keystroke driver: the session sees each key first, then the host applies
//! the key's default action unless the session suppressed it.

use std::time::Instant;

use core_dom::editing::{delete_backward, insert_text};
use core_dom::{Document, DomResult, FieldKind, Surface, char_len, resolve_surface};
use core_events::{Key, KeyPress, ModMask, NamedKey};
use tracing::warn;

use crate::session::{KeyOutcome, Session};

/// Report `key` to the session, then perform its default action if allowed.
pub fn press(session: &mut Session, doc: &mut Document, key: &KeyPress, now: Instant) -> KeyOutcome {
    let outcome = session.handle_keydown(doc, key, now);
    if !outcome.prevent_default
        && let Err(e) = apply_default(doc, key)
    {
        warn!(target: "session.driver", key = %key, error = %e, "default_action_failed");
    }
    outcome
}

/// Press one key per character of `text`.
pub fn type_text(session: &mut Session, doc: &mut Document, text: &str, now: Instant) -> Vec<KeyOutcome> {
    text.chars()
        .map(|c| press(session, doc, &KeyPress::char(c), now))
        .collect()
}

/// What the host does with an unsuppressed keystroke on the focused surface.
pub fn apply_default(doc: &mut Document, key: &KeyPress) -> DomResult<bool> {
    let Some(surface) = doc.active_element().and_then(|t| resolve_surface(doc, t)) else {
        return Ok(false);
    };
    if key.mods.intersects(ModMask::CHORD) {
        return Ok(false);
    }
    match &key.key {
        Key::Char(c) => {
            let mut buf = [0u8; 4];
            insert_text(doc, &surface, c.encode_utf8(&mut buf))
        }
        Key::Named(NamedKey::Backspace) => delete_backward(doc, &surface),
        Key::Named(NamedKey::Enter) => match surface {
            Surface::Field {
                kind: FieldKind::SingleLine,
                ..
            } => Ok(false),
            _ => insert_text(doc, &surface, "\n"),
        },
        Key::Named(NamedKey::ArrowLeft) => Ok(move_caret(doc, &surface, |at, _| at.saturating_sub(1))),
        Key::Named(NamedKey::ArrowRight) => Ok(move_caret(doc, &surface, |at, len| (at + 1).min(len))),
        Key::Named(NamedKey::Home) => Ok(move_caret(doc, &surface, |_, _| 0)),
        Key::Named(NamedKey::End) => Ok(move_caret(doc, &surface, |_, len| len)),
        _ => Ok(false),
    }
}

fn move_caret(doc: &mut Document, surface: &Surface, to: impl Fn(usize, usize) -> usize) -> bool {
    let Some(caret) = surface.caret(doc) else {
        return false;
    };
    let len = char_len(&surface.text(doc));
    surface.set_caret(doc, to(caret.end, len));
    true
}
