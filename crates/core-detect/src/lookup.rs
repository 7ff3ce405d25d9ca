//! Command lookup: the three questions the detector asks about a buffer.
//!
//! A linear implementation over a macro slice is the reference; [`CommandTrie`]
//! answers the same questions with one walk per query.

use core_model::{Macro, MacroSet};
use smallvec::SmallVec;
use tracing::trace;

pub trait CommandLookup {
    /// Macro whose command equals `buffer` exactly.
    fn exact(&self, buffer: &str) -> Option<&Macro>;
    /// Some command starts with `buffer` (equality included).
    fn is_command_prefix(&self, buffer: &str) -> bool;
    /// Some command starts with `buffer` and is strictly longer.
    fn has_longer(&self, buffer: &str) -> bool;
}

impl CommandLookup for [Macro] {
    fn exact(&self, buffer: &str) -> Option<&Macro> {
        self.iter().find(|m| m.command == buffer)
    }

    fn is_command_prefix(&self, buffer: &str) -> bool {
        self.iter().any(|m| m.command.starts_with(buffer))
    }

    fn has_longer(&self, buffer: &str) -> bool {
        self.iter()
            .any(|m| m.command.len() > buffer.len() && m.command.starts_with(buffer))
    }
}

impl CommandLookup for MacroSet {
    fn exact(&self, buffer: &str) -> Option<&Macro> {
        self.by_command(buffer)
    }

    fn is_command_prefix(&self, buffer: &str) -> bool {
        self.as_slice().is_command_prefix(buffer)
    }

    fn has_longer(&self, buffer: &str) -> bool {
        self.as_slice().has_longer(buffer)
    }
}

// -------------------------------------------------------------------------------------------------
// Trie Representation
// -------------------------------------------------------------------------------------------------
#[derive(Debug, Clone)]
struct Edge {
    ch: char,
    next: usize,
}

#[derive(Debug, Clone)]
struct Node {
    terminal: Option<usize>, // index into the snapshot
    edges: SmallVec<[Edge; 4]>,
}

impl Node {
    fn new() -> Self {
        Self {
            terminal: None,
            edges: SmallVec::new(),
        }
    }
}

/// Character trie over the commands of one [`MacroSet`] snapshot.
///
/// Every edge leads to at least one terminal, so a node with outgoing edges
/// proves a strictly longer command exists.
#[derive(Debug, Clone)]
pub struct CommandTrie {
    nodes: Vec<Node>,
    set: MacroSet,
}

impl CommandTrie {
    pub fn build(set: &MacroSet) -> Self {
        let mut trie = CommandTrie {
            nodes: vec![Node::new()],
            set: set.clone(),
        };
        for (idx, m) in set.iter().enumerate() {
            if m.command.is_empty() {
                continue;
            }
            let mut cur = 0usize;
            for ch in m.command.chars() {
                let next = if let Some(e) = trie.nodes[cur].edges.iter().find(|e| e.ch == ch) {
                    e.next
                } else {
                    let new_idx = trie.nodes.len();
                    trie.nodes.push(Node::new());
                    trie.nodes[cur].edges.push(Edge { ch, next: new_idx });
                    new_idx
                };
                cur = next;
            }
            if trie.nodes[cur].terminal.is_some() {
                // First entry wins, matching MacroSet::by_command.
                trace!(target: "detect.state", macro_index = idx, node = cur, "terminal_kept");
                continue;
            }
            trie.nodes[cur].terminal = Some(idx);
        }
        trie
    }

    /// The snapshot this trie indexes.
    pub fn macros(&self) -> &MacroSet {
        &self.set
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn walk(&self, buffer: &str) -> Option<&Node> {
        let mut node = &self.nodes[0];
        for ch in buffer.chars() {
            let edge = node.edges.iter().find(|e| e.ch == ch)?;
            node = &self.nodes[edge.next];
        }
        Some(node)
    }
}

impl CommandLookup for CommandTrie {
    fn exact(&self, buffer: &str) -> Option<&Macro> {
        self.walk(buffer)?.terminal.and_then(|i| self.set.get(i))
    }

    fn is_command_prefix(&self, buffer: &str) -> bool {
        match self.walk(buffer) {
            Some(node) => node.terminal.is_some() || !node.edges.is_empty(),
            None => false,
        }
    }

    fn has_longer(&self, buffer: &str) -> bool {
        self.walk(buffer).is_some_and(|node| !node.edges.is_empty())
    }
}
