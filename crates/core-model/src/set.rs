use ahash::AHashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::system::system_macros;
use crate::{Macro, MacroId};

/// Immutable macro snapshot: system macros first, then user macros.
///
/// Cloning shares the underlying storage. Updates build a new set and swap it
/// in, so a reader holding an older clone keeps a consistent view.
#[derive(Debug, Clone)]
pub struct MacroSet {
    macros: Arc<[Macro]>,
    by_command: Arc<AHashMap<String, usize>>,
    by_id: Arc<AHashMap<MacroId, usize>>,
    system_count: usize,
}

impl Default for MacroSet {
    fn default() -> Self {
        Self::new(Vec::new(), "/")
    }
}

impl MacroSet {
    /// Build a snapshot. System macros are spelled with `primary_prefix`.
    ///
    /// Conflicts resolve to the earliest entry: system commands shadow user
    /// macros with the same trigger, and among user macros the first
    /// occurrence of a command or id wins. Empty commands are skipped.
    pub fn new(user: Vec<Macro>, primary_prefix: &str) -> Self {
        let system = system_macros(primary_prefix);
        let system_count = system.len();
        let mut macros = Vec::with_capacity(system_count + user.len());
        let mut by_command = AHashMap::with_capacity(system_count + user.len());
        let mut by_id = AHashMap::with_capacity(system_count + user.len());

        for m in system.into_iter().chain(user) {
            if m.command.is_empty() {
                debug!(target: "model.macros", id = %m.id, "empty_command_skipped");
                continue;
            }
            if by_command.contains_key(&m.command) {
                warn!(target: "model.macros", id = %m.id, "duplicate_command_skipped");
                continue;
            }
            if by_id.contains_key(&m.id) {
                warn!(target: "model.macros", id = %m.id, "duplicate_id_skipped");
                continue;
            }
            let idx = macros.len();
            by_command.insert(m.command.clone(), idx);
            by_id.insert(m.id.clone(), idx);
            macros.push(m);
        }

        Self {
            macros: macros.into(),
            by_command: Arc::new(by_command),
            by_id: Arc::new(by_id),
            system_count,
        }
    }

    pub fn as_slice(&self) -> &[Macro] {
        &self.macros
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Macro> {
        self.macros.iter()
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// User macros only (system entries stripped), in snapshot order.
    pub fn user_macros(&self) -> &[Macro] {
        &self.macros[self.system_count.min(self.macros.len())..]
    }

    pub fn get(&self, idx: usize) -> Option<&Macro> {
        self.macros.get(idx)
    }

    pub fn by_command(&self, command: &str) -> Option<&Macro> {
        self.by_command.get(command).map(|&i| &self.macros[i])
    }

    pub fn by_id(&self, id: &MacroId) -> Option<&Macro> {
        self.by_id.get(id).map(|&i| &self.macros[i])
    }

    /// Whether both handles point at the same snapshot.
    pub fn ptr_eq(&self, other: &MacroSet) -> bool {
        Arc::ptr_eq(&self.macros, &other.macros)
    }
}

impl<'a> IntoIterator for &'a MacroSet {
    type Item = &'a Macro;
    type IntoIter = std::slice::Iter<'a, Macro>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SystemAction;
    use pretty_assertions::assert_eq;

    fn sample() -> Vec<Macro> {
        vec![
            Macro::plain("1", "/sig", "My Signature"),
            Macro::plain("2", "/brb", "Be right back"),
            Macro::plain("3", "/signature", "My Full Signature"),
        ]
    }

    #[test]
    fn system_macros_are_prepended() {
        let set = MacroSet::new(sample(), "/");
        assert_eq!(set.len(), 5);
        assert_eq!(set.as_slice()[0].system, Some(SystemAction::UndoLastExpansion));
        assert_eq!(set.as_slice()[1].system, Some(SystemAction::SettleExpansions));
        assert_eq!(set.user_macros().len(), 3);
        assert_eq!(set.user_macros()[0].command, "/sig");
    }

    #[test]
    fn lookups_by_command_and_id() {
        let set = MacroSet::new(sample(), "/");
        assert_eq!(set.by_command("/brb").map(|m| m.text.as_str()), Some("Be right back"));
        assert!(set.by_command("/br").is_none());
        assert_eq!(
            set.by_id(&MacroId::new("3")).map(|m| m.command.as_str()),
            Some("/signature")
        );
        assert!(set.by_command("/undo").is_some_and(Macro::is_system));
    }

    #[test]
    fn system_command_shadows_user_macro() {
        let mut user = sample();
        user.push(Macro::plain("4", "/undo", "user undo"));
        let set = MacroSet::new(user, "/");
        let undo = set.by_command("/undo").unwrap();
        assert!(undo.is_system());
        assert_eq!(set.user_macros().len(), 3);
    }

    #[test]
    fn duplicates_and_empty_commands_are_skipped() {
        let user = vec![
            Macro::plain("1", "/a", "first"),
            Macro::plain("2", "/a", "second"),
            Macro::plain("1", "/b", "dup id"),
            Macro::plain("5", "", "empty"),
        ];
        let set = MacroSet::new(user, ";");
        let commands: Vec<&str> = set.user_macros().iter().map(|m| m.command.as_str()).collect();
        assert_eq!(commands, vec!["/a"]);
        assert_eq!(set.by_command("/a").unwrap().text, "first");
        assert_eq!(set.by_command(";undo").map(|m| m.is_system()), Some(true));
    }

    #[test]
    fn clones_share_storage() {
        let set = MacroSet::new(sample(), "/");
        let clone = set.clone();
        assert!(set.ptr_eq(&clone));
        let rebuilt = MacroSet::new(sample(), "/");
        assert!(!set.ptr_eq(&rebuilt));
    }
}
