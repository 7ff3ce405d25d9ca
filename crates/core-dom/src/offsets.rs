//! Absolute character offsets over the text of an editable root.
//!
//! Contract:
//! - Offsets count characters of every text node under the root, in document
//!   order. Markup contributes nothing.
//! - `locate` maps an offset to a text point. At a boundary between two text
//!   nodes the affinity picks the end of the earlier node (`Backward`) or the
//!   start of the later one (`Forward`). Empty text nodes are never chosen
//!   when a non-empty one exists.
//! - `offset_of` maps text points and container points back. It is the
//!   inverse of `locate` for every offset in `0..=total_len`.

use crate::document::{Document, NodeId};
use crate::range::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSpan {
    pub node: NodeId,
    pub start: usize,
    pub len: usize,
}

impl TextSpan {
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

#[derive(Debug, Clone)]
pub struct OffsetMap {
    root: NodeId,
    spans: Vec<TextSpan>,
    total: usize,
}

impl OffsetMap {
    pub fn build(doc: &Document, root: NodeId) -> Self {
        let mut spans = Vec::new();
        let mut total = 0usize;
        for node in doc.text_nodes(root) {
            let len = doc.text_len(node);
            spans.push(TextSpan {
                node,
                start: total,
                len,
            });
            total += len;
        }
        Self { root, spans, total }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn total_len(&self) -> usize {
        self.total
    }

    pub fn spans(&self) -> &[TextSpan] {
        &self.spans
    }

    pub fn span_of(&self, node: NodeId) -> Option<&TextSpan> {
        self.spans.iter().find(|s| s.node == node)
    }

    /// Text point for an absolute offset, or `None` when the offset is past
    /// the end or the root holds no text nodes.
    pub fn locate(&self, abs: usize, affinity: Affinity) -> Option<Point> {
        if abs > self.total {
            return None;
        }
        let non_empty = || self.spans.iter().filter(|s| s.len > 0);
        let hit = match affinity {
            Affinity::Forward => non_empty()
                .find(|s| abs >= s.start && abs < s.end())
                .or_else(|| non_empty().rfind(|s| abs == s.end())),
            Affinity::Backward => non_empty()
                .find(|s| abs > s.start && abs <= s.end())
                .or_else(|| non_empty().find(|s| abs == s.start)),
        };
        match hit {
            Some(s) => Some(Point::new(s.node, abs - s.start)),
            // Only empty text nodes: offset 0 is their start.
            None if abs == 0 => self.spans.first().map(|s| Point::new(s.node, 0)),
            None => None,
        }
    }

    /// Absolute offset of a boundary point under the root.
    pub fn offset_of(&self, doc: &Document, point: Point) -> Option<usize> {
        if !doc.contains(self.root, point.node) {
            return None;
        }
        if doc.is_text(point.node) {
            let span = self.span_of(point.node)?;
            return Some(span.start + point.offset.min(span.len));
        }
        let children = doc.children(point.node);
        match children.get(point.offset) {
            Some(&child) => self.start_of(doc, child),
            None => {
                let start = self.start_of(doc, point.node)?;
                Some(start + self.len_of(doc, point.node))
            }
        }
    }

    /// Offset at which a node's text begins.
    pub fn start_of(&self, doc: &Document, node: NodeId) -> Option<usize> {
        if node == self.root {
            return Some(0);
        }
        if !doc.contains(self.root, node) {
            return None;
        }
        if let Some(span) = self.span_of(node) {
            return Some(span.start);
        }
        // First text node at or after `node` in document order.
        let order = doc.descendants(self.root);
        let pos = order.iter().position(|&n| n == node)?;
        let next_text = order[pos..].iter().find_map(|&n| self.span_of(n));
        Some(next_text.map(|s| s.start).unwrap_or(self.total))
    }

    /// Characters of text under `node`.
    pub fn len_of(&self, doc: &Document, node: NodeId) -> usize {
        self.spans
            .iter()
            .filter(|s| doc.contains(node, s.node))
            .map(|s| s.len)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fixture() -> (Document, NodeId) {
        let doc = Document::from_html("<div>ab<b>cd<i>e</i></b>fg</div>").unwrap();
        let root = doc.children(doc.root())[0];
        (doc, root)
    }

    #[test]
    fn spans_follow_document_order() {
        let (doc, root) = fixture();
        let map = OffsetMap::build(&doc, root);
        let starts: Vec<(usize, usize)> = map.spans().iter().map(|s| (s.start, s.len)).collect();
        assert_eq!(starts, vec![(0, 2), (2, 2), (4, 1), (5, 2)]);
        assert_eq!(map.total_len(), 7);
    }

    #[test]
    fn locate_respects_affinity_at_boundaries() {
        let (doc, root) = fixture();
        let map = OffsetMap::build(&doc, root);
        let ab = map.spans()[0].node;
        let cd = map.spans()[1].node;
        let fg = map.spans()[3].node;
        assert_eq!(map.locate(2, Affinity::Backward), Some(Point::new(ab, 2)));
        assert_eq!(map.locate(2, Affinity::Forward), Some(Point::new(cd, 0)));
        assert_eq!(map.locate(0, Affinity::Backward), Some(Point::new(ab, 0)));
        assert_eq!(map.locate(7, Affinity::Forward), Some(Point::new(fg, 2)));
        assert_eq!(map.locate(3, Affinity::Forward), Some(Point::new(cd, 1)));
        assert_eq!(map.locate(8, Affinity::Forward), None);
    }

    #[test]
    fn container_points_map_to_offsets() {
        let (doc, root) = fixture();
        let map = OffsetMap::build(&doc, root);
        let b = doc.children(root)[1];
        assert_eq!(map.offset_of(&doc, Point::new(root, 0)), Some(0));
        assert_eq!(map.offset_of(&doc, Point::new(root, 1)), Some(2));
        assert_eq!(map.offset_of(&doc, Point::new(root, 2)), Some(5));
        assert_eq!(map.offset_of(&doc, Point::new(root, 3)), Some(7));
        assert_eq!(map.offset_of(&doc, Point::new(b, 1)), Some(4));
        assert_eq!(map.offset_of(&doc, Point::new(b, 2)), Some(5));
    }

    #[test]
    fn locate_then_offset_of_is_identity() {
        let (doc, root) = fixture();
        let map = OffsetMap::build(&doc, root);
        for abs in 0..=map.total_len() {
            for aff in [Affinity::Forward, Affinity::Backward] {
                let p = map.locate(abs, aff).unwrap();
                assert_eq!(map.offset_of(&doc, p), Some(abs), "abs={abs} {aff:?}");
            }
        }
    }

    #[test]
    fn empty_text_nodes_are_skipped() {
        let mut doc = Document::from_html("<div>ab</div>").unwrap();
        let root = doc.children(doc.root())[0];
        let empty = doc.create_text("");
        doc.append_child(root, empty).unwrap();
        let tail = doc.create_text("cd");
        doc.append_child(root, tail).unwrap();
        let map = OffsetMap::build(&doc, root);
        assert_eq!(map.locate(2, Affinity::Forward), Some(Point::new(tail, 0)));
        assert_ne!(map.locate(2, Affinity::Backward).map(|p| p.node), Some(empty));
    }

    #[test]
    fn root_without_text() {
        let doc = Document::from_html("<div><br></div>").unwrap();
        let root = doc.children(doc.root())[0];
        let map = OffsetMap::build(&doc, root);
        assert_eq!(map.total_len(), 0);
        assert_eq!(map.locate(0, Affinity::Forward), None);
        assert_eq!(map.offset_of(&doc, Point::new(root, 1)), Some(0));
    }

    #[test]
    fn outside_points_are_rejected() {
        let doc = Document::from_html("<div>ab</div><p>x</p>").unwrap();
        let root = doc.children(doc.root())[0];
        let p = doc.children(doc.root())[1];
        let map = OffsetMap::build(&doc, root);
        assert_eq!(map.offset_of(&doc, Point::new(p, 0)), None);
    }
}
