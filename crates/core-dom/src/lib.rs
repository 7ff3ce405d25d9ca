//! In-memory document model for editable surfaces.
//!
//! An arena of element and text nodes with parent links, value-backed form
//! fields, a document selection made of (node, offset) points, focus, and a log
//! of dispatched input events. All text offsets are counted in Unicode scalar
//! values.

pub mod document;
pub mod editing;
pub mod html;
pub mod offsets;
pub mod range;
pub mod surface;

pub use document::{Document, DomEvent, ElementData, FieldState, InputKind, NodeId, NodeKind};
pub use offsets::{Affinity, OffsetMap, TextSpan};
pub use range::{Point, Range};
pub use surface::{Caret, FieldKind, Surface, resolve_surface};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomError {
    #[error("node {0:?} does not exist")]
    UnknownNode(NodeId),
    #[error("node {0:?} is not a text node")]
    NotText(NodeId),
    #[error("node {0:?} cannot have children")]
    NotContainer(NodeId),
    #[error("offset {offset} out of bounds for node {node:?}")]
    OffsetOutOfBounds { node: NodeId, offset: usize },
    #[error("inserting {child:?} under {parent:?} would create a cycle")]
    Cycle { parent: NodeId, child: NodeId },
    #[error("html parse error: {0}")]
    Html(String),
}

pub type DomResult<T> = Result<T, DomError>;

/// Number of Unicode scalar values in `s`.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte index of the `idx`-th character, clamped to the end of the string.
pub fn byte_at(s: &str, idx: usize) -> usize {
    s.char_indices().nth(idx).map(|(b, _)| b).unwrap_or(s.len())
}

/// Character-indexed slice `[start, end)`, clamped.
pub fn char_slice(s: &str, start: usize, end: usize) -> &str {
    let b0 = byte_at(s, start);
    let b1 = byte_at(s, end.max(start));
    &s[b0..b1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_helpers_count_scalars() {
        let s = "héllo→x";
        assert_eq!(char_len(s), 7);
        assert_eq!(byte_at(s, 2), 3);
        assert_eq!(byte_at(s, 99), s.len());
        assert_eq!(char_slice(s, 1, 3), "él");
        assert_eq!(char_slice(s, 5, 7), "→x");
        assert_eq!(char_slice(s, 4, 2), "");
    }
}
