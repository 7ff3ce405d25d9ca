//! Built-in commands that run an action instead of inserting text.

use crate::{ContentType, Macro, MacroId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemAction {
    /// Reverse the most recent expansion in the focused field.
    UndoLastExpansion,
    /// Strip undo markers, keeping the expanded content.
    SettleExpansions,
}

struct SystemEntry {
    action: SystemAction,
    id: &'static str,
    name: &'static str,
    description: &'static str,
}

const SYSTEM_TABLE: [SystemEntry; 2] = [
    SystemEntry {
        action: SystemAction::UndoLastExpansion,
        id: "system:undo-last-expansion",
        name: "undo",
        description: "Undo the last expansion",
    },
    SystemEntry {
        action: SystemAction::SettleExpansions,
        id: "system:settle-expansions",
        name: "settle",
        description: "Keep expansions and forget their undo history",
    },
];

impl SystemAction {
    pub fn all() -> impl Iterator<Item = SystemAction> {
        SYSTEM_TABLE.iter().map(|e| e.action)
    }

    fn entry(&self) -> &'static SystemEntry {
        // Every variant has exactly one row.
        match self {
            SystemAction::UndoLastExpansion => &SYSTEM_TABLE[0],
            SystemAction::SettleExpansions => &SYSTEM_TABLE[1],
        }
    }

    pub fn id(&self) -> MacroId {
        MacroId::new(self.entry().id)
    }

    pub fn name(&self) -> &'static str {
        self.entry().name
    }

    /// Trigger spelled with the given prefix, e.g. `/undo`.
    pub fn command(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.entry().name)
    }
}

/// Materialize the system macros for a prefix. The `text` field holds the
/// human description shown by suggestion overlays; it is never inserted.
pub fn system_macros(prefix: &str) -> Vec<Macro> {
    SYSTEM_TABLE
        .iter()
        .map(|e| Macro {
            id: MacroId::new(e.id),
            command: e.action.command(prefix),
            text: e.description.to_string(),
            html: None,
            content_type: ContentType::Text,
            is_sensitive: false,
            system: Some(e.action),
        })
        .collect()
}
