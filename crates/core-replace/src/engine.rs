//! Replacement engine: rewrite the trigger span of a surface with macro content.
//!
//! Fields are spliced as flat strings. Rich trees try, in order, the
//! single-text-node fast path, node-aware replacement through the offset map,
//! and finally the native `insertText` primitive at the live selection.

use core_dom::editing::exec_insert_text;
use core_dom::html::{collapse_newlines, html_to_text, parse_fragment_lossy};
use core_dom::{
    Affinity, Document, DomError, FieldKind, InputKind, NodeId, OffsetMap, Point, Range, Surface,
    byte_at, char_len,
};
use core_model::{ContentType, Macro};
use thiserror::Error;
use tracing::{debug, warn};

use crate::markers::{IS_HTML_ATTR, MarkerMeta, build_marker, is_marker};

/// Tags treated as inline formatting wrappers.
const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "cite", "code", "del", "em", "font", "i", "ins", "kbd", "mark", "q", "s",
    "small", "span", "strong", "sub", "sup", "u",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Html(String),
}

impl Content {
    /// Nothing to insert: the trigger is only deleted.
    pub fn empty() -> Self {
        Content::Text(String::new())
    }

    pub fn for_macro(m: &Macro) -> Self {
        match (m.effective_content_type(), m.html_content()) {
            (ContentType::Html, Some(html)) => Content::Html(html.to_string()),
            _ => Content::Text(m.text.clone()),
        }
    }

    pub fn is_html(&self) -> bool {
        matches!(self, Content::Html(_))
    }

    /// Plain-text rendition; HTML is stripped to its inner text.
    pub fn plain_text(&self) -> String {
        match self {
            Content::Text(t) => t.clone(),
            Content::Html(h) => html_to_text(h),
        }
    }

    /// Text a value-backed field receives. Single-line fields cannot hold
    /// line breaks, so runs of them become one space.
    pub fn field_text(&self, kind: FieldKind) -> String {
        let text = self.plain_text();
        match kind {
            FieldKind::SingleLine => collapse_newlines(&text),
            FieldKind::MultiLine => text,
        }
    }
}

/// Absolute character span `[start, end)` within a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// The `len` characters ending at `caret`.
    pub fn ending_at(caret: usize, len: usize) -> Self {
        Self {
            start: caret.saturating_sub(len),
            end: caret,
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    FieldSplice,
    SingleText,
    NodeAware,
    NativeFallback,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::FieldSplice => "field_splice",
            Strategy::SingleText => "single_text",
            Strategy::NodeAware => "node_aware",
            Strategy::NativeFallback => "native_fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub strategy: Strategy,
    /// Absolute caret offset after the edit.
    pub caret: usize,
    /// Characters of visible text inserted.
    pub inserted_len: usize,
    pub marker: Option<NodeId>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplaceError {
    #[error("target element is no longer attached")]
    Detached,
    #[error("no selection to fall back on")]
    NoSelection,
    #[error("range {start}..{end} is invalid for text of length {len}")]
    InvalidRange { start: usize, end: usize, len: usize },
}

enum Payload {
    Text(String),
    Nodes(Vec<NodeId>),
}

/// Replace `range` with `content`.
pub fn replace(
    doc: &mut Document,
    surface: &Surface,
    range: TextRange,
    content: &Content,
) -> Result<ReplaceOutcome, ReplaceError> {
    replace_inner(doc, surface, range, content, None)
}

/// Replace `range` with `content` wrapped in an undo marker. Fields cannot
/// carry markers and are spliced as by [`replace`].
pub fn replace_marked(
    doc: &mut Document,
    surface: &Surface,
    range: TextRange,
    content: &Content,
    meta: &MarkerMeta,
) -> Result<ReplaceOutcome, ReplaceError> {
    replace_inner(doc, surface, range, content, Some(meta))
}

fn replace_inner(
    doc: &mut Document,
    surface: &Surface,
    range: TextRange,
    content: &Content,
    meta: Option<&MarkerMeta>,
) -> Result<ReplaceOutcome, ReplaceError> {
    if !surface.is_connected(doc) {
        warn!(target: "replace.engine", "target_detached");
        return Err(ReplaceError::Detached);
    }
    if range.start > range.end {
        return Err(ReplaceError::InvalidRange {
            start: range.start,
            end: range.end,
            len: char_len(&surface.text(doc)),
        });
    }
    let outcome = match *surface {
        Surface::Field { element, kind } => field_splice(doc, element, kind, range, content)?,
        Surface::Rich { root } => rich_replace(doc, root, range, content, meta)?,
    };
    debug!(
        target: "replace.engine",
        strategy = outcome.strategy.as_str(),
        removed = range.len(),
        inserted = outcome.inserted_len,
        marked = outcome.marker.is_some(),
        "replaced"
    );
    Ok(outcome)
}

fn field_splice(
    doc: &mut Document,
    element: NodeId,
    kind: FieldKind,
    range: TextRange,
    content: &Content,
) -> Result<ReplaceOutcome, ReplaceError> {
    let text = content.field_text(kind);
    let field = doc.field_mut(element).ok_or(ReplaceError::Detached)?;
    let len = field.len();
    if range.end > len {
        return Err(ReplaceError::InvalidRange {
            start: range.start,
            end: range.end,
            len,
        });
    }
    let (b0, b1) = (byte_at(&field.value, range.start), byte_at(&field.value, range.end));
    field.value.replace_range(b0..b1, &text);
    let inserted_len = char_len(&text);
    let caret = range.start + inserted_len;
    field.set_caret(caret);
    doc.dispatch_input(element, InputKind::InsertReplacementText);
    Ok(ReplaceOutcome {
        strategy: Strategy::FieldSplice,
        caret,
        inserted_len,
        marker: None,
    })
}

fn content_nodes(doc: &mut Document, content: &Content) -> Vec<NodeId> {
    match content {
        Content::Text(t) if t.is_empty() => Vec::new(),
        Content::Text(t) => vec![doc.create_text(t.as_str())],
        Content::Html(h) => parse_fragment_lossy(doc, h),
    }
}

fn rich_replace(
    doc: &mut Document,
    root: NodeId,
    range: TextRange,
    content: &Content,
    meta: Option<&MarkerMeta>,
) -> Result<ReplaceOutcome, ReplaceError> {
    let (payload, marker, inserted_len) = match (meta, content) {
        (Some(meta), _) => {
            let nodes = content_nodes(doc, content);
            let marker = build_marker(doc, meta, nodes);
            let len = char_len(&doc.text_content(marker));
            (Payload::Nodes(vec![marker]), Some(marker), len)
        }
        (None, Content::Text(t)) => (Payload::Text(t.clone()), None, char_len(t)),
        (None, Content::Html(_)) => {
            let nodes = content_nodes(doc, content);
            let len = nodes.iter().map(|&n| char_len(&doc.text_content(n))).sum();
            (Payload::Nodes(nodes), None, len)
        }
    };

    let kids = doc.children(root);
    let attempt = if kids.len() == 1 && doc.is_text(kids[0]) {
        let only = kids[0];
        single_text(doc, only, range, &payload).map(|p| (Strategy::SingleText, p))
    } else {
        node_aware(doc, root, range, &payload).map(|p| (Strategy::NodeAware, p))
    };

    match attempt {
        Ok((strategy, after)) => {
            doc.collapse(after);
            doc.dispatch_input(root, InputKind::InsertReplacementText);
            Ok(ReplaceOutcome {
                strategy,
                caret: range.start + inserted_len,
                inserted_len,
                marker,
            })
        }
        Err(e) => {
            debug!(target: "replace.engine", error = %e, "structural_replace_failed");
            native_fallback(doc, root, range, content)
        }
    }
}

fn single_text(
    doc: &mut Document,
    node: NodeId,
    range: TextRange,
    payload: &Payload,
) -> Result<Point, DomError> {
    let len = doc.text_len(node);
    if range.end > len {
        return Err(DomError::OffsetOutOfBounds {
            node,
            offset: range.end,
        });
    }
    match payload {
        Payload::Text(t) => {
            let at = doc.delete_text_range(Point::new(node, range.start), Point::new(node, range.end))?;
            doc.insert_text_at(at, t)
        }
        Payload::Nodes(nodes) => {
            let at = doc.delete_text_range(Point::new(node, range.start), Point::new(node, range.end))?;
            insert_nodes_dropping_empty(doc, at, nodes)
        }
    }
}

/// Insert at a text point; an emptied text node is replaced rather than kept.
fn insert_nodes_dropping_empty(
    doc: &mut Document,
    at: Point,
    nodes: &[NodeId],
) -> Result<Point, DomError> {
    if nodes.is_empty() {
        return Ok(at);
    }
    if doc.is_text(at.node) && doc.text_len(at.node) == 0 {
        let parent = doc.parent(at.node).ok_or(DomError::UnknownNode(at.node))?;
        let idx = doc.index_in_parent(at.node).unwrap_or(0);
        doc.detach(at.node);
        return doc.insert_nodes_at(Point::new(parent, idx), nodes);
    }
    doc.insert_nodes_at(at, nodes)
}

fn is_inline_wrapper(doc: &Document, id: NodeId) -> bool {
    doc.tag(id).is_some_and(|t| INLINE_TAGS.contains(&t)) && !is_marker(doc, id)
}

/// Highest inline wrapper above `node` whose whole text lies inside `range`.
fn consumed_wrapper(
    doc: &Document,
    map: &OffsetMap,
    root: NodeId,
    node: NodeId,
    range: TextRange,
) -> Option<NodeId> {
    let mut best = None;
    let mut cur = doc.parent(node);
    while let Some(n) = cur {
        if n == root || !is_inline_wrapper(doc, n) {
            break;
        }
        let Some(start) = map.start_of(doc, n) else { break };
        let len = map.len_of(doc, n);
        if len == 0 || start < range.start || start + len > range.end {
            break;
        }
        best = Some(n);
        cur = doc.parent(n);
    }
    best
}

fn node_aware(
    doc: &mut Document,
    root: NodeId,
    range: TextRange,
    payload: &Payload,
) -> Result<Point, DomError> {
    let map = OffsetMap::build(doc, root);
    let out_of_bounds = || DomError::OffsetOutOfBounds {
        node: root,
        offset: range.end,
    };
    if range.end > map.total_len() {
        return Err(out_of_bounds());
    }
    let start_affinity = if range.is_empty() {
        Affinity::Backward
    } else {
        Affinity::Forward
    };
    let s = map.locate(range.start, start_affinity).ok_or_else(out_of_bounds)?;
    let e = map.locate(range.end, Affinity::Backward).ok_or_else(out_of_bounds)?;

    // Plain text never leaves an emptied formatting wrapper behind, marked
    // or not.
    let plain = match payload {
        Payload::Text(_) => true,
        Payload::Nodes(nodes) => match nodes.as_slice() {
            [only] => is_marker(doc, *only) && doc.attr(*only, IS_HTML_ATTR) == Some("false"),
            _ => false,
        },
    };
    let (w_start, w_end) = if plain && !range.is_empty() {
        (
            consumed_wrapper(doc, &map, root, s.node, range),
            consumed_wrapper(doc, &map, root, e.node, range),
        )
    } else {
        (None, None)
    };
    // A wrapper holding both ends is the only one that matters.
    let (w_start, w_end) = match (w_start, w_end) {
        (Some(a), Some(b)) if doc.contains(a, b) => (Some(a), Some(a)),
        (Some(a), Some(b)) if doc.contains(b, a) => (Some(b), Some(b)),
        (None, Some(b)) if doc.contains(b, s.node) => (Some(b), Some(b)),
        (Some(a), None) if doc.contains(a, e.node) => (Some(a), Some(a)),
        other => other,
    };
    let anchor = match w_start {
        Some(w) => {
            let parent = doc.parent(w).ok_or(DomError::UnknownNode(w))?;
            Some(Point::new(parent, doc.index_in_parent(w).unwrap_or(0)))
        }
        None => None,
    };

    let at = doc.delete_text_range(s, e)?;
    if e.node != s.node && doc.text_len(e.node) == 0 {
        doc.detach(e.node);
    }
    if let Some(w) = w_end
        && w_end != w_start
    {
        doc.detach(w);
    }
    if let Some(w) = w_start {
        doc.detach(w);
    }

    match (payload, anchor) {
        (Payload::Text(t), Some(anchor)) => {
            if t.is_empty() {
                return Ok(anchor);
            }
            let node = doc.create_text(t.as_str());
            doc.insert_nodes_at(anchor, &[node])?;
            Ok(Point::new(node, char_len(t)))
        }
        (Payload::Text(t), None) => doc.insert_text_at(at, t),
        (Payload::Nodes(nodes), Some(anchor)) => doc.insert_nodes_at(anchor, nodes),
        (Payload::Nodes(nodes), None) => insert_nodes_dropping_empty(doc, at, nodes),
    }
}

/// Last resort: shrink the live selection backward by the trigger length and
/// insert plain text through the native primitive.
fn native_fallback(
    doc: &mut Document,
    root: NodeId,
    range: TextRange,
    content: &Content,
) -> Result<ReplaceOutcome, ReplaceError> {
    let surface = Surface::Rich { root };
    let Some(caret) = surface.caret(doc) else {
        warn!(target: "replace.engine", "fallback_without_selection");
        return Err(ReplaceError::NoSelection);
    };
    let span = TextRange::ending_at(caret.end, range.len());
    let map = OffsetMap::build(doc, root);
    if !span.is_empty() {
        let (Some(s), Some(e)) = (
            map.locate(span.start, Affinity::Forward),
            map.locate(span.end, Affinity::Backward),
        ) else {
            warn!(target: "replace.engine", "fallback_selection_unmappable");
            return Err(ReplaceError::NoSelection);
        };
        doc.set_selection(Range::new(s, e));
    }
    let text = content.plain_text();
    match exec_insert_text(doc, &surface, &text) {
        Ok(true) => {
            let inserted_len = char_len(&text);
            Ok(ReplaceOutcome {
                strategy: Strategy::NativeFallback,
                caret: span.start + inserted_len,
                inserted_len,
                marker: None,
            })
        }
        Ok(false) | Err(_) => {
            warn!(target: "replace.engine", "fallback_insert_failed");
            Err(ReplaceError::NoSelection)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_dom::html::inner_html;
    use core_dom::resolve_surface;
    use core_model::MacroId;
    use pretty_assertions::assert_eq;

    fn rich(html: &str) -> (Document, Surface) {
        let doc = Document::from_html(html).unwrap();
        let root = doc.element_by_id("r").unwrap();
        (doc, Surface::Rich { root })
    }

    fn field(html: &str) -> (Document, Surface) {
        let doc = Document::from_html(html).unwrap();
        let f = doc.element_by_id("f").unwrap();
        let s = resolve_surface(&doc, f).unwrap();
        (doc, s)
    }

    #[test]
    fn field_splice_moves_caret() {
        let (mut doc, s) = field(r#"<input id="f" value="I will /brb">"#);
        let out = replace(&mut doc, &s, TextRange::new(7, 11), &Content::Text("Be right back".into()))
            .unwrap();
        assert_eq!(s.text(&doc), "I will Be right back");
        assert_eq!(out.strategy, Strategy::FieldSplice);
        assert_eq!(out.caret, 20);
        assert_eq!(s.caret(&doc).map(|c| c.end), Some(20));
        assert_eq!(doc.events().len(), 1);
    }

    #[test]
    fn html_into_single_line_field_is_flattened() {
        let (mut doc, s) = field(r#"<input id="f" value="/addr">"#);
        let html = Content::Html("<p>1 Main St</p><p>Springfield</p>".into());
        replace(&mut doc, &s, TextRange::new(0, 5), &html).unwrap();
        assert_eq!(s.text(&doc), "1 Main St Springfield");
    }

    #[test]
    fn html_into_textarea_keeps_newlines() {
        let (mut doc, s) = field(r#"<textarea id="f">/addr</textarea>"#);
        let html = Content::Html("Line 1<br>Line 2".into());
        replace(&mut doc, &s, TextRange::new(0, 5), &html).unwrap();
        assert_eq!(s.text(&doc), "Line 1\nLine 2");
    }

    #[test]
    fn field_range_past_end_is_invalid() {
        let (mut doc, s) = field(r#"<input id="f" value="ab">"#);
        let err = replace(&mut doc, &s, TextRange::new(1, 5), &Content::empty()).unwrap_err();
        assert_eq!(err, ReplaceError::InvalidRange { start: 1, end: 5, len: 2 });
        assert_eq!(s.text(&doc), "ab");
    }

    #[test]
    fn single_text_node_fast_path_plain() {
        let (mut doc, s) = rich(r#"<div id="r" contenteditable="true">My /sig</div>"#);
        let out = replace(&mut doc, &s, TextRange::new(3, 7), &Content::Text("My Signature".into()))
            .unwrap();
        assert_eq!(out.strategy, Strategy::SingleText);
        assert_eq!(inner_html(&doc, s.element()), "My My Signature");
        assert_eq!(s.caret(&doc).map(|c| c.end), Some(15));
    }

    #[test]
    fn single_text_node_fast_path_html_keeps_siblings() {
        let (mut doc, s) = rich(r#"<div id="r" contenteditable="true">a /sig b</div>"#);
        let html = Content::Html("<strong>John Doe</strong>".into());
        let out = replace(&mut doc, &s, TextRange::new(2, 6), &html).unwrap();
        assert_eq!(out.strategy, Strategy::SingleText);
        assert_eq!(out.inserted_len, 8);
        assert_eq!(inner_html(&doc, s.element()), "a <strong>John Doe</strong> b");
        assert_eq!(s.caret(&doc).map(|c| c.end), Some(10));
    }

    #[test]
    fn html_replacing_whole_text_omits_empty_pieces() {
        let (mut doc, s) = rich(r#"<div id="r" contenteditable="true">/sig</div>"#);
        replace(&mut doc, &s, TextRange::new(0, 4), &Content::Html("<em>x</em>".into())).unwrap();
        assert_eq!(inner_html(&doc, s.element()), "<em>x</em>");
        assert_eq!(doc.children(s.element()).len(), 1);
    }

    #[test]
    fn node_aware_same_node_split() {
        let (mut doc, s) = rich(r#"<div id="r" contenteditable="true"><p>Hi /sig now</p><p>x</p></div>"#);
        let out = replace(&mut doc, &s, TextRange::new(3, 7), &Content::Text("Sig".into())).unwrap();
        assert_eq!(out.strategy, Strategy::NodeAware);
        assert_eq!(inner_html(&doc, s.element()), "<p>Hi Sig now</p><p>x</p>");
        assert_eq!(s.caret(&doc).map(|c| c.end), Some(6));
    }

    #[test]
    fn node_aware_multi_node_span() {
        let (mut doc, s) = rich(r#"<div id="r" contenteditable="true">Hi /s<i>ig</i> ok</div>"#);
        replace(&mut doc, &s, TextRange::new(3, 7), &Content::Html("<b>Sig</b>".into())).unwrap();
        assert_eq!(inner_html(&doc, s.element()), "Hi <b>Sig</b><i></i> ok");
    }

    #[test]
    fn plain_text_consumes_emptied_inline_wrapper() {
        let (mut doc, s) = rich(r#"<div id="r" contenteditable="true"><p>Hi <b>/sig</b></p></div>"#);
        replace(&mut doc, &s, TextRange::new(3, 7), &Content::Text("My Signature".into())).unwrap();
        assert_eq!(inner_html(&doc, s.element()), "<p>Hi My Signature</p>");
        assert_eq!(s.caret(&doc).map(|c| c.end), Some(15));
    }

    #[test]
    fn marked_plain_text_consumes_emptied_inline_wrapper() {
        let (mut doc, s) = rich(r#"<div id="r" contenteditable="true"><p>Hi <b>/sig</b></p></div>"#);
        let meta = MarkerMeta::new(MacroId::new("sig"), "/sig", 1, false);
        let out = replace_marked(&mut doc, &s, TextRange::new(3, 7), &Content::Text("My Signature".into()), &meta)
            .unwrap();
        let marker = out.marker.unwrap();
        let p = doc.children(s.element())[0];
        assert_eq!(doc.parent(marker), Some(p));
        assert!(!inner_html(&doc, s.element()).contains("<b>"));
        assert_eq!(doc.text_content(s.element()), "Hi My Signature");
        assert_eq!(s.caret(&doc).map(|c| c.end), Some(15));

        let html_meta = MarkerMeta::new(MacroId::new("card"), "/card", 2, true);
        let (mut doc, s) = rich(r#"<div id="r" contenteditable="true"><p>Hi <b>/card</b></p></div>"#);
        replace_marked(&mut doc, &s, TextRange::new(3, 8), &Content::Html("<i>C</i>".into()), &html_meta)
            .unwrap();
        assert!(inner_html(&doc, s.element()).starts_with("<p>Hi <b><span"));
    }

    #[test]
    fn html_never_consumes_wrappers() {
        let (mut doc, s) = rich(r#"<div id="r" contenteditable="true"><p>Hi <b>/sig</b></p></div>"#);
        replace(&mut doc, &s, TextRange::new(3, 7), &Content::Html("<i>S</i>".into())).unwrap();
        assert_eq!(inner_html(&doc, s.element()), "<p>Hi <b><i>S</i></b></p>");
    }

    #[test]
    fn partial_wrapper_is_kept() {
        let (mut doc, s) = rich(r#"<div id="r" contenteditable="true"><p>Hi <b>x/sig</b></p></div>"#);
        replace(&mut doc, &s, TextRange::new(4, 8), &Content::Text("S".into())).unwrap();
        assert_eq!(inner_html(&doc, s.element()), "<p>Hi <b>xS</b></p>");
    }

    #[test]
    fn system_deletion_removes_trigger_only() {
        let (mut doc, s) = rich(r#"<div id="r" contenteditable="true"><p>Hi /undo</p></div>"#);
        let out = replace(&mut doc, &s, TextRange::new(3, 8), &Content::empty()).unwrap();
        assert_eq!(out.inserted_len, 0);
        assert_eq!(doc.text_content(s.element()), "Hi ");
    }

    #[test]
    fn stale_range_falls_back_to_live_selection() {
        let (mut doc, s) = rich(r#"<div id="r" contenteditable="true"><p>Hi /sig</p></div>"#);
        s.set_caret(&mut doc, 7);
        let out = replace(&mut doc, &s, TextRange::new(30, 34), &Content::Html("<b>Sig</b>".into()))
            .unwrap();
        assert_eq!(out.strategy, Strategy::NativeFallback);
        assert_eq!(doc.text_content(s.element()), "Hi Sig");
    }

    #[test]
    fn fallback_without_selection_abandons() {
        let (mut doc, s) = rich(r#"<div id="r" contenteditable="true"><p>Hi /sig</p></div>"#);
        let err = replace(&mut doc, &s, TextRange::new(30, 34), &Content::empty()).unwrap_err();
        assert_eq!(err, ReplaceError::NoSelection);
        assert_eq!(doc.text_content(s.element()), "Hi /sig");
    }

    #[test]
    fn detached_target_is_rejected() {
        let (mut doc, s) = rich(r#"<div id="r" contenteditable="true">x</div>"#);
        doc.detach(s.element());
        assert_eq!(
            replace(&mut doc, &s, TextRange::new(0, 1), &Content::empty()),
            Err(ReplaceError::Detached)
        );
    }

    #[test]
    fn content_for_macro_prefers_nonempty_html() {
        let rich = Macro::rich("1", "/r", "<b>R</b>", "R");
        assert_eq!(Content::for_macro(&rich), Content::Html("<b>R</b>".into()));
        let plain = Macro::plain("2", "/p", "P");
        assert_eq!(Content::for_macro(&plain), Content::Text("P".into()));
    }
}
