//! Keyboard model shared by the detector and the hosts that feed it.
//!
//! Identifiers follow the DOM `KeyboardEvent.key` vocabulary: printable keys
//! are their single character (`"a"`, `" "`, `"/"`), everything else is a
//! named key (`"ArrowLeft"`, `"Backspace"`, `"Escape"`). Modifier state is a
//! separate bit set so chords such as `Ctrl+a` keep their base identity.

use std::fmt;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ModMask: u8 {
        const CTRL  = 0b0000_0001;
        const ALT   = 0b0000_0010;
        const SHIFT = 0b0000_0100;
        const META  = 0b0000_1000;
    }
}

impl ModMask {
    /// Modifiers that turn a character key into a command chord.
    pub const CHORD: ModMask = ModMask::CTRL.union(ModMask::ALT).union(ModMask::META);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Enter,
    Escape,
    Backspace,
    Tab,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    Shift,
    Control,
    Alt,
    Meta,
    CapsLock,
    F(u8),
}

impl NamedKey {
    pub fn identifier(&self) -> String {
        let s = match self {
            NamedKey::Enter => "Enter",
            NamedKey::Escape => "Escape",
            NamedKey::Backspace => "Backspace",
            NamedKey::Tab => "Tab",
            NamedKey::ArrowUp => "ArrowUp",
            NamedKey::ArrowDown => "ArrowDown",
            NamedKey::ArrowLeft => "ArrowLeft",
            NamedKey::ArrowRight => "ArrowRight",
            NamedKey::Home => "Home",
            NamedKey::End => "End",
            NamedKey::PageUp => "PageUp",
            NamedKey::PageDown => "PageDown",
            NamedKey::Insert => "Insert",
            NamedKey::Delete => "Delete",
            NamedKey::Shift => "Shift",
            NamedKey::Control => "Control",
            NamedKey::Alt => "Alt",
            NamedKey::Meta => "Meta",
            NamedKey::CapsLock => "CapsLock",
            NamedKey::F(n) => return format!("F{n}"),
        };
        s.to_string()
    }

    fn from_identifier(id: &str) -> Option<Self> {
        let named = match id {
            "Enter" => NamedKey::Enter,
            "Escape" | "Esc" => NamedKey::Escape,
            "Backspace" => NamedKey::Backspace,
            "Tab" => NamedKey::Tab,
            "ArrowUp" | "Up" => NamedKey::ArrowUp,
            "ArrowDown" | "Down" => NamedKey::ArrowDown,
            "ArrowLeft" | "Left" => NamedKey::ArrowLeft,
            "ArrowRight" | "Right" => NamedKey::ArrowRight,
            "Home" => NamedKey::Home,
            "End" => NamedKey::End,
            "PageUp" => NamedKey::PageUp,
            "PageDown" => NamedKey::PageDown,
            "Insert" => NamedKey::Insert,
            "Delete" | "Del" => NamedKey::Delete,
            "Shift" => NamedKey::Shift,
            "Control" => NamedKey::Control,
            "Alt" => NamedKey::Alt,
            "Meta" => NamedKey::Meta,
            "CapsLock" => NamedKey::CapsLock,
            other => {
                let digits = other.strip_prefix('F')?;
                let n: u8 = digits.parse().ok()?;
                if n == 0 {
                    return None;
                }
                NamedKey::F(n)
            }
        };
        Some(named)
    }
}

/// Logical key identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Named(NamedKey),
    /// Multi-character identifier we do not model (`"MediaPlayPause"`, `"Unidentified"`).
    Unknown(String),
}

impl Key {
    /// Parse a DOM `KeyboardEvent.key` identifier.
    pub fn from_identifier(id: &str) -> Key {
        let mut chars = id.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Key::Char(c);
        }
        if id == "Space" || id == "Spacebar" {
            return Key::Char(' ');
        }
        match NamedKey::from_identifier(id) {
            Some(named) => Key::Named(named),
            None => Key::Unknown(id.to_string()),
        }
    }

    /// The identifier as the DOM would report it.
    pub fn identifier(&self) -> String {
        match self {
            Key::Char(c) => c.to_string(),
            Key::Named(named) => named.identifier(),
            Key::Unknown(s) => s.clone(),
        }
    }

    pub fn is_named(&self, named: NamedKey) -> bool {
        matches!(self, Key::Named(n) if *n == named)
    }
}

/// A single keydown as delivered to the detector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPress {
    pub key: Key,
    pub mods: ModMask,
}

impl KeyPress {
    pub fn new(key: Key, mods: ModMask) -> Self {
        Self { key, mods }
    }

    pub fn char(c: char) -> Self {
        Self::new(Key::Char(c), ModMask::empty())
    }

    pub fn named(named: NamedKey) -> Self {
        Self::new(Key::Named(named), ModMask::empty())
    }

    /// Parse chord notation used by replay scripts: `"a"`, `"Backspace"`,
    /// `"Ctrl+z"`, `"Shift+ArrowLeft"`. A lone `"+"` is the plus key.
    pub fn parse(spec: &str) -> Self {
        if spec.len() > 1
            && let Some((mods_part, key_part)) = spec.rsplit_once('+')
            && !key_part.is_empty()
        {
            let mut mods = ModMask::empty();
            let mut recognized = true;
            for m in mods_part.split('+') {
                match m.to_ascii_lowercase().as_str() {
                    "ctrl" | "control" => mods |= ModMask::CTRL,
                    "alt" | "option" => mods |= ModMask::ALT,
                    "shift" => mods |= ModMask::SHIFT,
                    "meta" | "cmd" | "super" => mods |= ModMask::META,
                    _ => recognized = false,
                }
            }
            if recognized {
                return Self::new(Key::from_identifier(key_part), mods);
            }
        }
        Self::new(Key::from_identifier(spec), ModMask::empty())
    }
}

impl fmt::Display for KeyPress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, label) in [
            (ModMask::CTRL, "Ctrl+"),
            (ModMask::ALT, "Alt+"),
            (ModMask::SHIFT, "Shift+"),
            (ModMask::META, "Meta+"),
        ] {
            if self.mods.contains(flag) {
                f.write_str(label)?;
            }
        }
        f.write_str(&self.key.identifier())
    }
}
