//! Editable surface resolution.
//!
//! A focus target is either a value-backed field, a node inside a rich
//! editing host, or not editable at all. The result is computed once per
//! keystroke and pattern-matched downstream.

use tracing::trace;

use crate::document::{Document, NodeId};
use crate::offsets::{Affinity, OffsetMap};
use crate::range::Point;
use crate::{char_len, char_slice};

/// Input types that behave like a plain text line.
const TEXT_INPUT_TYPES: &[&str] = &["text", "search", "email", "url", "tel"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    SingleLine,
    MultiLine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Field { element: NodeId, kind: FieldKind },
    Rich { root: NodeId },
}

/// Selection bounds as absolute character offsets within a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Caret {
    pub start: usize,
    pub end: usize,
}

impl Caret {
    pub fn collapsed(at: usize) -> Self {
        Self { start: at, end: at }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

fn field_kind(doc: &Document, id: NodeId) -> Option<FieldKind> {
    let el = doc.element(id)?;
    el.field.as_ref()?;
    if el.has_attr("disabled") || el.has_attr("readonly") {
        return None;
    }
    match el.tag.as_str() {
        "textarea" => Some(FieldKind::MultiLine),
        "input" => {
            let ty = el.attr("type").unwrap_or("").trim().to_ascii_lowercase();
            if ty.is_empty() || TEXT_INPUT_TYPES.contains(&ty.as_str()) {
                Some(FieldKind::SingleLine)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Nearest editing host at or above `id`. An explicit `contenteditable="false"`
/// on the way up ends the search.
fn editing_host(doc: &Document, id: NodeId) -> Option<NodeId> {
    let mut cur = Some(id);
    while let Some(n) = cur {
        if let Some(value) = doc.attr(n, "contenteditable") {
            match value.trim().to_ascii_lowercase().as_str() {
                "" | "true" | "plaintext-only" => return Some(n),
                "false" => return None,
                _ => {}
            }
        }
        cur = doc.parent(n);
    }
    None
}

/// Classify a focus target. Detached targets are never editable.
pub fn resolve_surface(doc: &Document, target: NodeId) -> Option<Surface> {
    if !doc.is_connected(target) {
        return None;
    }
    if let Some(el) = doc.element(target)
        && el.is_field_tag()
    {
        let kind = field_kind(doc, target);
        trace!(target: "dom.edit", node = target.index(), editable = kind.is_some(), "field_target");
        return kind.map(|kind| Surface::Field {
            element: target,
            kind,
        });
    }
    editing_host(doc, target).map(|root| Surface::Rich { root })
}

impl Surface {
    /// Element that receives input events.
    pub fn element(&self) -> NodeId {
        match *self {
            Surface::Field { element, .. } => element,
            Surface::Rich { root } => root,
        }
    }

    pub fn is_rich(&self) -> bool {
        matches!(self, Surface::Rich { .. })
    }

    pub fn is_connected(&self, doc: &Document) -> bool {
        doc.is_connected(self.element())
    }

    /// Full text of the surface.
    pub fn text(&self, doc: &Document) -> String {
        match *self {
            Surface::Field { element, .. } => doc
                .field(element)
                .map(|f| f.value.clone())
                .unwrap_or_default(),
            Surface::Rich { root } => doc.text_content(root),
        }
    }

    /// Current selection in absolute offsets. Rich surfaces need the document
    /// selection to lie inside the root.
    pub fn caret(&self, doc: &Document) -> Option<Caret> {
        match *self {
            Surface::Field { element, .. } => {
                let f = doc.field(element)?;
                Some(Caret {
                    start: f.selection_start,
                    end: f.selection_end,
                })
            }
            Surface::Rich { root } => {
                let range = doc.selection()?;
                let map = OffsetMap::build(doc, root);
                let a = map.offset_of(doc, range.start)?;
                let b = map.offset_of(doc, range.end)?;
                Some(Caret {
                    start: a.min(b),
                    end: a.max(b),
                })
            }
        }
    }

    /// Move the caret to an absolute offset, clamped to the text length.
    pub fn set_caret(&self, doc: &mut Document, at: usize) {
        match *self {
            Surface::Field { element, .. } => {
                if let Some(f) = doc.field_mut(element) {
                    f.set_caret(at);
                }
            }
            Surface::Rich { root } => {
                let map = OffsetMap::build(doc, root);
                let at = at.min(map.total_len());
                let point = map
                    .locate(at, Affinity::Backward)
                    .unwrap_or_else(|| Point::new(root, doc.children(root).len()));
                doc.collapse(point);
            }
        }
    }

    /// Up to `max_chars` characters immediately before a collapsed caret.
    pub fn text_before_caret(&self, doc: &Document, max_chars: usize) -> Option<String> {
        let caret = self.caret(doc)?;
        if !caret.is_collapsed() {
            return None;
        }
        let text = self.text(doc);
        let end = caret.end.min(char_len(&text));
        let start = end.saturating_sub(max_chars);
        Some(char_slice(&text, start, end).to_string())
    }
}
