//! Default editing actions: what the host does with a keystroke nobody
//! prevented, plus the native `insertText` primitive.

use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

use crate::document::{Document, InputKind};
use crate::offsets::{Affinity, OffsetMap};
use crate::range::Point;
use crate::surface::Surface;
use crate::{DomResult, byte_at, char_len};

fn last_grapheme_chars(text: &str) -> usize {
    text.graphemes(true).next_back().map(char_len).unwrap_or(0)
}

/// Replace the selection in a field with `text`.
fn field_insert(doc: &mut Document, surface: &Surface, text: &str) -> bool {
    let element = surface.element();
    let Some(f) = doc.field_mut(element) else {
        return false;
    };
    let (a, b) = (f.selection_start, f.selection_end);
    let (ba, bb) = (byte_at(&f.value, a), byte_at(&f.value, b));
    f.value.replace_range(ba..bb, text);
    f.set_caret(a + char_len(text));
    true
}

/// Insert text at the rich selection, deleting a non-collapsed selection first.
///
/// A caret sitting between two elements extends the preceding text sibling,
/// then the following one, and otherwise gets a fresh text node, so content
/// typed next to an element never lands inside it.
fn rich_insert(doc: &mut Document, root: crate::NodeId, text: &str) -> DomResult<bool> {
    let Some(range) = doc.selection() else {
        return Ok(false);
    };
    if !doc.contains(root, range.start.node) || !doc.contains(root, range.end.node) {
        return Ok(false);
    }
    if !range.is_collapsed() {
        let map = OffsetMap::build(doc, root);
        let (Some(a), Some(b)) = (map.offset_of(doc, range.start), map.offset_of(doc, range.end))
        else {
            return Ok(false);
        };
        let (a, b) = (a.min(b), a.max(b));
        if let (Some(s), Some(e)) = (map.locate(a, Affinity::Forward), map.locate(b, Affinity::Backward)) {
            let at = doc.delete_text_range(s, e)?;
            doc.collapse(at);
        }
    }
    let Some(at) = doc.selection().map(|r| r.start) else {
        return Ok(false);
    };
    let after = if doc.is_text(at.node) {
        doc.insert_text_at(at, text)?
    } else {
        let kids = doc.children(at.node);
        let before = at.offset.checked_sub(1).and_then(|i| kids.get(i)).copied();
        let next = kids.get(at.offset).copied();
        match (before, next) {
            (Some(prev), _) if doc.is_text(prev) => {
                let end = doc.text_len(prev);
                doc.insert_text_at(Point::new(prev, end), text)?
            }
            (_, Some(next)) if doc.is_text(next) => doc.insert_text_at(Point::new(next, 0), text)?,
            _ => {
                let node = doc.create_text(text);
                doc.insert_nodes_at(at, &[node])?;
                Point::new(node, char_len(text))
            }
        }
    };
    doc.collapse(after);
    Ok(true)
}

/// Browser default for a printable keystroke.
pub fn insert_text(doc: &mut Document, surface: &Surface, text: &str) -> DomResult<bool> {
    let done = match *surface {
        Surface::Field { .. } => field_insert(doc, surface, text),
        Surface::Rich { root } => rich_insert(doc, root, text)?,
    };
    if done {
        doc.dispatch_input(surface.element(), InputKind::InsertText);
    }
    Ok(done)
}

/// Native `insertText` command. Same effect as typing the text.
pub fn exec_insert_text(doc: &mut Document, surface: &Surface, text: &str) -> DomResult<bool> {
    debug!(target: "dom.edit", chars = char_len(text), "exec_insert_text");
    insert_text(doc, surface, text)
}

/// Browser default for Backspace: delete the selection, or the grapheme
/// cluster before a collapsed caret.
pub fn delete_backward(doc: &mut Document, surface: &Surface) -> DomResult<bool> {
    let done = match *surface {
        Surface::Field { element, .. } => {
            let Some(f) = doc.field_mut(element) else {
                return Ok(false);
            };
            let (mut a, b) = (f.selection_start, f.selection_end);
            if a == b {
                let before = &f.value[..byte_at(&f.value, b)];
                a = b - last_grapheme_chars(before).min(b);
            }
            if a == b {
                false
            } else {
                let (ba, bb) = (byte_at(&f.value, a), byte_at(&f.value, b));
                f.value.replace_range(ba..bb, "");
                f.set_caret(a);
                true
            }
        }
        Surface::Rich { root } => {
            let Some(caret) = surface.caret(doc) else {
                return Ok(false);
            };
            let map = OffsetMap::build(doc, root);
            let (a, b) = if caret.is_collapsed() {
                let Some(p) = map.locate(caret.end, Affinity::Backward) else {
                    return Ok(false);
                };
                let text = doc.text(p.node).unwrap_or_default();
                let head = &text[..byte_at(text, p.offset)];
                (caret.end - last_grapheme_chars(head).min(caret.end), caret.end)
            } else {
                (caret.start, caret.end)
            };
            if a == b {
                false
            } else {
                match (map.locate(a, Affinity::Forward), map.locate(b, Affinity::Backward)) {
                    (Some(s), Some(e)) => {
                        let at = doc.delete_text_range(s, e)?;
                        doc.collapse(at);
                        true
                    }
                    _ => false,
                }
            }
        }
    };
    if done {
        doc.dispatch_input(surface.element(), InputKind::DeleteContentBackward);
    }
    Ok(done)
}
