//! Boundary points, ranges, and the two range mutations replacement needs.

use tracing::trace;

use crate::document::{Document, NodeId};
use crate::{DomError, DomResult, byte_at, char_len};

/// A boundary point. For text nodes `offset` counts characters; for
/// containers it is a child index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub node: NodeId,
    pub offset: usize,
}

impl Point {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    pub start: Point,
    pub end: Point,
}

impl Range {
    pub fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    pub fn collapsed(point: Point) -> Self {
        Self {
            start: point,
            end: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

impl Document {
    fn check_point(&self, p: Point) -> DomResult<()> {
        if self.kind(p.node).is_none() {
            return Err(DomError::UnknownNode(p.node));
        }
        if p.offset > self.node_length(p.node) {
            return Err(DomError::OffsetOutOfBounds {
                node: p.node,
                offset: p.offset,
            });
        }
        Ok(())
    }

    /// Delete everything between two text points, leaving partially selected
    /// elements in place. Returns the collapsed point where content was removed.
    pub fn delete_text_range(&mut self, start: Point, end: Point) -> DomResult<Point> {
        self.check_point(start)?;
        self.check_point(end)?;
        if !self.is_text(start.node) {
            return Err(DomError::NotText(start.node));
        }
        if !self.is_text(end.node) {
            return Err(DomError::NotText(end.node));
        }

        if start.node == end.node {
            let text = self.text(start.node).unwrap_or_default();
            let (lo, hi) = (start.offset.min(end.offset), start.offset.max(end.offset));
            let mut out = String::with_capacity(text.len());
            out.push_str(&text[..byte_at(text, lo)]);
            out.push_str(&text[byte_at(text, hi)..]);
            self.set_text(start.node, out)?;
            trace!(target: "dom.edit", node = start.node.index(), removed = hi - lo, "delete_within_text");
            return Ok(Point::new(start.node, lo));
        }

        // Nodes fully inside the range lie strictly between the two text nodes
        // in document order and are not ancestors of the end node.
        let mut scope = start.node;
        while !self.contains(scope, end.node) {
            scope = self.parent(scope).ok_or(DomError::UnknownNode(scope))?;
        }
        let order = self.descendants(scope);
        let s_idx = order.iter().position(|&n| n == start.node);
        let e_idx = order.iter().position(|&n| n == end.node);
        let (Some(s_idx), Some(e_idx)) = (s_idx, e_idx) else {
            return Err(DomError::UnknownNode(end.node));
        };
        if s_idx > e_idx {
            return self.delete_text_range(end, start);
        }
        let mut doomed: Vec<NodeId> = Vec::new();
        for &n in &order[s_idx + 1..e_idx] {
            if self.contains(n, end.node) {
                continue;
            }
            if doomed.iter().any(|&d| self.contains(d, n)) {
                continue;
            }
            doomed.push(n);
        }
        for &n in &doomed {
            self.detach(n);
        }

        let head = self.text(start.node).unwrap_or_default();
        let head = head[..byte_at(head, start.offset)].to_string();
        self.set_text(start.node, head)?;
        let tail = self.text(end.node).unwrap_or_default();
        let tail = tail[byte_at(tail, end.offset)..].to_string();
        self.set_text(end.node, tail)?;
        trace!(
            target: "dom.edit",
            start = start.node.index(),
            end = end.node.index(),
            removed_nodes = doomed.len(),
            "delete_across_nodes"
        );
        Ok(start)
    }

    /// Insert `nodes` at a boundary point. A text point inside a text node
    /// splits it. Returns the point right after the last inserted node.
    pub fn insert_nodes_at(&mut self, at: Point, nodes: &[NodeId]) -> DomResult<Point> {
        self.check_point(at)?;
        let (parent, mut index) = if self.is_text(at.node) {
            let parent = self.parent(at.node).ok_or(DomError::UnknownNode(at.node))?;
            let idx = self.index_in_parent(at.node).unwrap_or(0);
            let len = self.text_len(at.node);
            if at.offset == 0 {
                (parent, idx)
            } else if at.offset >= len {
                (parent, idx + 1)
            } else {
                self.split_text(at.node, at.offset)?;
                (parent, idx + 1)
            }
        } else {
            (at.node, at.offset)
        };
        for &n in nodes {
            self.insert_at(parent, index, n)?;
            index = self
                .index_in_parent(n)
                .map(|i| i + 1)
                .unwrap_or(index + 1);
        }
        Ok(Point::new(parent, index))
    }

    /// Insert plain text at a text point without creating new nodes.
    pub fn insert_text_at(&mut self, at: Point, text: &str) -> DomResult<Point> {
        self.check_point(at)?;
        let current = self.text(at.node).ok_or(DomError::NotText(at.node))?;
        let b = byte_at(current, at.offset);
        let mut out = String::with_capacity(current.len() + text.len());
        out.push_str(&current[..b]);
        out.push_str(text);
        out.push_str(&current[b..]);
        self.set_text(at.node, out)?;
        Ok(Point::new(at.node, at.offset + char_len(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn doc(html: &str) -> (Document, NodeId) {
        let doc = Document::from_html(html).unwrap();
        let first = doc.children(doc.root())[0];
        (doc, first)
    }

    #[test]
    fn delete_inside_one_text_node() {
        let (mut d, p) = doc("<p>hello world</p>");
        let t = d.children(p)[0];
        let at = d.delete_text_range(Point::new(t, 5), Point::new(t, 11)).unwrap();
        assert_eq!(d.text(t), Some("hello"));
        assert_eq!(at, Point::new(t, 5));
    }

    #[test]
    fn delete_across_nested_markup() {
        let (mut d, p) = doc("<p>ab<b>cd</b><i>ef</i>gh</p>");
        let a = d.children(p)[0];
        let g = d.children(p)[3];
        d.delete_text_range(Point::new(a, 1), Point::new(g, 1)).unwrap();
        assert_eq!(d.text_content(p), "ah");
        assert_eq!(crate::html::inner_html(&d, p), "ah");
    }

    #[test]
    fn delete_keeps_partially_selected_ancestors() {
        let (mut d, p) = doc("<p>ab<b>cd</b></p>");
        let a = d.children(p)[0];
        let b = d.children(p)[1];
        let cd = d.children(b)[0];
        d.delete_text_range(Point::new(a, 1), Point::new(cd, 1)).unwrap();
        assert_eq!(crate::html::inner_html(&d, p), "a<b>d</b>");
    }

    #[test]
    fn insert_splits_text_node() {
        let (mut d, p) = doc("<p>abcd</p>");
        let t = d.children(p)[0];
        let x = d.create_element("em");
        let after = d.insert_nodes_at(Point::new(t, 2), &[x]).unwrap();
        assert_eq!(crate::html::inner_html(&d, p), "ab<em></em>cd");
        assert_eq!(after, Point::new(p, 2));
    }

    #[test]
    fn insert_at_text_edges_does_not_split() {
        let (mut d, p) = doc("<p>abcd</p>");
        let t = d.children(p)[0];
        let x = d.create_text("X");
        d.insert_nodes_at(Point::new(t, 0), &[x]).unwrap();
        let y = d.create_text("Y");
        d.insert_nodes_at(Point::new(t, 4), &[y]).unwrap();
        assert_eq!(d.children(p), &[x, t, y]);
    }

    #[test]
    fn insert_text_counts_characters() {
        let (mut d, p) = doc("<p>né</p>");
        let t = d.children(p)[0];
        let after = d.insert_text_at(Point::new(t, 1), "aï").unwrap();
        assert_eq!(d.text(t), Some("naïé"));
        assert_eq!(after, Point::new(t, 3));
    }

    #[test]
    fn out_of_bounds_points_error() {
        let (mut d, p) = doc("<p>ab</p>");
        let t = d.children(p)[0];
        assert_eq!(
            d.delete_text_range(Point::new(t, 0), Point::new(t, 5)),
            Err(DomError::OffsetOutOfBounds { node: t, offset: 5 })
        );
    }
}
