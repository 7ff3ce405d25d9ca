//! Key classification.

use core_events::{Key, KeyPress, ModMask, NamedKey};

/// How the detector treats a keydown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    /// Contributes exactly one character to the buffer.
    Printable(char),
    Backspace,
    /// Unconditionally cancels an active session.
    Cancelling,
    /// Bare modifier press (Shift while typing a capital, etc.). Never cancels.
    Modifier,
    /// Anything else: named keys, chords, unknown identifiers.
    Other,
}

/// Keys offered to a suggestion overlay before they cancel the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Navigation {
    Up,
    Down,
    Left,
    Right,
    PageUp,
    PageDown,
    Home,
    End,
}

/// True iff no Ctrl/Alt/Meta modifier is held and the key identifier is a single character.
pub fn is_printable_key(key: &KeyPress) -> bool {
    matches!(key.key, Key::Char(_)) && !key.mods.intersects(ModMask::CHORD)
}

/// Arrow keys, Home/End, PageUp/PageDown, Escape, Delete.
pub fn is_cancelling_key(key: &KeyPress) -> bool {
    matches!(
        key.key,
        Key::Named(
            NamedKey::ArrowUp
                | NamedKey::ArrowDown
                | NamedKey::ArrowLeft
                | NamedKey::ArrowRight
                | NamedKey::Home
                | NamedKey::End
                | NamedKey::PageUp
                | NamedKey::PageDown
                | NamedKey::Escape
                | NamedKey::Delete
        )
    )
}

/// Space or Enter without chord modifiers (manual commit mode).
pub fn is_commit_key(key: &KeyPress) -> bool {
    if key.mods.intersects(ModMask::CHORD) {
        return false;
    }
    matches!(key.key, Key::Char(' ') | Key::Named(NamedKey::Enter))
}

pub fn navigation(key: &KeyPress) -> Option<Navigation> {
    let Key::Named(named) = key.key else {
        return None;
    };
    let nav = match named {
        NamedKey::ArrowUp => Navigation::Up,
        NamedKey::ArrowDown => Navigation::Down,
        NamedKey::ArrowLeft => Navigation::Left,
        NamedKey::ArrowRight => Navigation::Right,
        NamedKey::PageUp => Navigation::PageUp,
        NamedKey::PageDown => Navigation::PageDown,
        NamedKey::Home => Navigation::Home,
        NamedKey::End => Navigation::End,
        _ => return None,
    };
    Some(nav)
}

pub fn classify(key: &KeyPress) -> KeyClass {
    match &key.key {
        Key::Char(c) if is_printable_key(key) => KeyClass::Printable(*c),
        Key::Named(NamedKey::Backspace) if !key.mods.intersects(ModMask::CHORD) => {
            KeyClass::Backspace
        }
        Key::Named(
            NamedKey::Shift | NamedKey::Control | NamedKey::Alt | NamedKey::Meta | NamedKey::CapsLock,
        ) => KeyClass::Modifier,
        _ if is_cancelling_key(key) => KeyClass::Cancelling,
        _ => KeyClass::Other,
    }
}
