//! Undo markers.
//!
//! Rich expansions are wrapped in an invisible `<span>` carrying the trigger
//! it replaced, so the most recent expansion can be reverted and all of them
//! stripped once the user settles the text. Value-backed fields have no
//! markup, so their expansions are tracked in an [`UndoLedger`] instead.

use std::collections::VecDeque;

use core_dom::{
    Affinity, Document, DomResult, InputKind, NodeId, OffsetMap, Point, Surface, byte_at, char_len,
};
use core_model::MacroId;
use tracing::{debug, warn};

use crate::engine::{Content, TextRange, replace_marked};

pub const MARKER_ATTR: &str = "data-expander-marker";
pub const MACRO_ID_ATTR: &str = "data-macro-id";
pub const ORIGINAL_COMMAND_ATTR: &str = "data-original-command";
pub const INSERTED_AT_ATTR: &str = "data-inserted-at";
pub const IS_HTML_ATTR: &str = "data-is-html";
/// Visible text of the expansion as inserted.
pub const EXPANSION_TEXT_ATTR: &str = "data-expansion-text";
const MARKER_STYLE: &str = "display: contents";

/// Field expansions remembered for undo.
pub const LEDGER_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerMeta {
    pub macro_id: MacroId,
    pub original_command: String,
    /// Milliseconds; strictly increasing per session.
    pub inserted_at: u64,
    pub is_html: bool,
}

impl MarkerMeta {
    pub fn new(
        macro_id: MacroId,
        original_command: impl Into<String>,
        inserted_at: u64,
        is_html: bool,
    ) -> Self {
        Self {
            macro_id,
            original_command: original_command.into(),
            inserted_at,
            is_html,
        }
    }

    fn read(doc: &Document, id: NodeId) -> Option<Self> {
        let el = doc.element(id)?;
        el.attr(MARKER_ATTR)?;
        Some(Self {
            macro_id: MacroId::new(el.attr(MACRO_ID_ATTR).unwrap_or_default()),
            original_command: el.attr(ORIGINAL_COMMAND_ATTR)?.to_string(),
            inserted_at: el
                .attr(INSERTED_AT_ATTR)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            is_html: el.attr(IS_HTML_ATTR) == Some("true"),
        })
    }
}

/// Detached marker element carrying `meta` and wrapping `content`.
pub(crate) fn build_marker(doc: &mut Document, meta: &MarkerMeta, content: Vec<NodeId>) -> NodeId {
    let span = doc.create_element("span");
    for n in content {
        // Fresh detached nodes under a fresh element: cannot fail.
        let _ = doc.append_child(span, n);
    }
    let text = doc.text_content(span);
    if let Some(el) = doc.element_mut(span) {
        el.set_attr(MARKER_ATTR, "");
        el.set_attr(MACRO_ID_ATTR, meta.macro_id.as_str());
        el.set_attr(ORIGINAL_COMMAND_ATTR, meta.original_command.as_str());
        el.set_attr(INSERTED_AT_ATTR, meta.inserted_at.to_string());
        el.set_attr(IS_HTML_ATTR, if meta.is_html { "true" } else { "false" });
        el.set_attr(EXPANSION_TEXT_ATTR, text);
        el.set_attr("style", MARKER_STYLE);
    }
    span
}

pub fn is_marker(doc: &Document, id: NodeId) -> bool {
    doc.tag(id) == Some("span") && doc.attr(id, MARKER_ATTR).is_some()
}

/// Replace `range` with `content` inside a fresh marker. Returns the marker,
/// or `None` when the surface cannot hold one or the replacement failed.
pub fn wrap_with_marker(
    doc: &mut Document,
    surface: &Surface,
    range: TextRange,
    content: &Content,
    meta: &MarkerMeta,
) -> Option<NodeId> {
    if !surface.is_rich() {
        return None;
    }
    match replace_marked(doc, surface, range, content, meta) {
        Ok(outcome) => outcome.marker,
        Err(e) => {
            warn!(target: "replace.markers", error = %e, "wrap_failed");
            None
        }
    }
}

/// Markers under `root`, in document order.
pub fn find_markers(doc: &Document, root: NodeId) -> Vec<(NodeId, MarkerMeta)> {
    doc.descendants(root)
        .into_iter()
        .filter(|&n| is_marker(doc, n))
        .filter_map(|n| MarkerMeta::read(doc, n).map(|m| (n, m)))
        .collect()
}

/// Revert the newest expansion under `root`. Ties on the timestamp go to the
/// marker later in document order.
pub fn undo_most_recent(doc: &mut Document, root: NodeId) -> bool {
    let newest = find_markers(doc, root)
        .into_iter()
        .enumerate()
        .max_by_key(|(pos, (_, meta))| (meta.inserted_at, *pos))
        .map(|(_, m)| m);
    match newest {
        Some((marker, meta)) => restore(doc, root, marker, &meta),
        None => {
            debug!(target: "replace.markers", "nothing_to_undo");
            false
        }
    }
}

/// Revert the newest expansion of one macro.
pub fn undo_specific(doc: &mut Document, root: NodeId, macro_id: &MacroId) -> bool {
    let newest = find_markers(doc, root)
        .into_iter()
        .enumerate()
        .filter(|(_, (_, meta))| &meta.macro_id == macro_id)
        .max_by_key(|(pos, (_, meta))| (meta.inserted_at, *pos))
        .map(|(_, m)| m);
    match newest {
        Some((marker, meta)) => restore(doc, root, marker, &meta),
        None => false,
    }
}

/// Unwrap every marker, keeping its content. Returns how many were removed.
pub fn remove_all_markers(doc: &mut Document, root: NodeId) -> usize {
    let markers = find_markers(doc, root);
    let mut removed = 0;
    // Innermost first, so nested markers unwrap cleanly.
    for (marker, _) in markers.into_iter().rev() {
        match doc.unwrap_element(marker) {
            Ok(()) => removed += 1,
            Err(e) => warn!(target: "replace.markers", error = %e, "unwrap_failed"),
        }
    }
    if removed > 0 {
        debug!(target: "replace.markers", removed, "markers_settled");
    }
    removed
}

/// Put the original command back in place of the expansion and drop the
/// marker. Text the user typed inside the marker around the expansion stays.
fn restore(doc: &mut Document, root: NodeId, marker: NodeId, meta: &MarkerMeta) -> bool {
    let command = doc.create_text(meta.original_command.as_str());
    let placed = match doc.attr(marker, EXPANSION_TEXT_ATTR).map(str::to_string) {
        Some(expansion) if expansion != doc.text_content(marker) => {
            replace_expansion_text(doc, marker, &expansion, command)
        }
        _ => replace_whole_marker(doc, marker, command),
    };
    match placed {
        Ok(true) => {}
        Ok(false) => {
            warn!(target: "replace.markers", macro_id = %meta.macro_id, "marker_edited");
            return false;
        }
        Err(e) => {
            warn!(target: "replace.markers", error = %e, "restore_failed");
            return false;
        }
    }
    let (node, lead) = match doc.merge_adjacent_text(command) {
        Ok(merged) => merged,
        Err(_) => (command, 0),
    };
    doc.collapse(Point::new(node, lead + char_len(&meta.original_command)));
    doc.dispatch_input(root, InputKind::HistoryUndo);
    debug!(
        target: "replace.markers",
        macro_id = %meta.macro_id,
        inserted_at = meta.inserted_at,
        "expansion_undone"
    );
    true
}

fn replace_whole_marker(doc: &mut Document, marker: NodeId, command: NodeId) -> DomResult<bool> {
    let Some(parent) = doc.parent(marker) else {
        return Ok(false);
    };
    doc.insert_before(parent, command, Some(marker))?;
    doc.detach(marker);
    Ok(true)
}

/// The marker holds more than the expansion: remove only the expansion's
/// text, put `command` where it was and unwrap the marker. `Ok(false)` when
/// the expansion text itself was edited.
fn replace_expansion_text(
    doc: &mut Document,
    marker: NodeId,
    expansion: &str,
    command: NodeId,
) -> DomResult<bool> {
    let current = doc.text_content(marker);
    let Some(byte) = current.find(expansion) else {
        return Ok(false);
    };
    let start = char_len(&current[..byte]);
    let end = start + char_len(expansion);
    let total = char_len(&current);

    let map = OffsetMap::build(doc, marker);
    let (Some(s), Some(e)) = (map.locate(start, Affinity::Forward), map.locate(end, Affinity::Backward))
    else {
        return Ok(false);
    };
    let at = doc.delete_text_range(s, e)?;
    let at = if start == 0 {
        Point::new(marker, 0)
    } else if end == total {
        Point::new(marker, doc.children(marker).len())
    } else {
        at
    };
    doc.insert_nodes_at(at, &[command])?;
    prune_empty(doc, marker, command);
    doc.unwrap_element(marker)?;
    Ok(true)
}

/// Drop text nodes and elements under `root` left without any text.
fn prune_empty(doc: &mut Document, root: NodeId, keep: NodeId) {
    for n in doc.descendants(root).into_iter().rev() {
        if n != keep && doc.text_content(n).is_empty() {
            doc.detach(n);
        }
    }
}

/// A field expansion that can still be reverted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldExpansion {
    pub element: NodeId,
    /// Character offset where the inserted text begins.
    pub start: usize,
    pub inserted: String,
    pub original_command: String,
    pub macro_id: MacroId,
    pub stamp: u64,
}

/// Bounded history of field expansions, newest last.
#[derive(Debug, Default)]
pub struct UndoLedger {
    records: VecDeque<FieldExpansion>,
    last_stamp: u64,
}

impl UndoLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next strictly increasing timestamp at or after `wall_ms`.
    pub fn stamp(&mut self, wall_ms: u64) -> u64 {
        let next = wall_ms.max(self.last_stamp.saturating_add(1));
        self.last_stamp = next;
        next
    }

    pub fn record(&mut self, expansion: FieldExpansion) {
        self.records.push_back(expansion);
        while self.records.len() > LEDGER_CAPACITY {
            self.records.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &FieldExpansion> {
        self.records.iter()
    }

    /// Revert the newest expansion recorded for `element`. Fails, and drops
    /// the record, when the field no longer holds the inserted text where it
    /// was put.
    pub fn undo_most_recent(&mut self, doc: &mut Document, element: NodeId) -> bool {
        let Some(pos) = self.records.iter().rposition(|r| r.element == element) else {
            return false;
        };
        let Some(rec) = self.records.remove(pos) else {
            return false;
        };
        let Some(field) = doc.field_mut(element) else {
            return false;
        };
        let end = rec.start + char_len(&rec.inserted);
        if end > field.len() {
            warn!(target: "replace.markers", "field_undo_stale");
            return false;
        }
        let (b0, b1) = (byte_at(&field.value, rec.start), byte_at(&field.value, end));
        if field.value[b0..b1] != rec.inserted {
            warn!(target: "replace.markers", "field_undo_stale");
            return false;
        }
        field.value.replace_range(b0..b1, &rec.original_command);
        field.set_caret(rec.start + char_len(&rec.original_command));
        doc.dispatch_input(element, InputKind::HistoryUndo);
        debug!(target: "replace.markers", macro_id = %rec.macro_id, "field_expansion_undone");
        true
    }

    /// Drop every record for `element`.
    pub fn forget(&mut self, element: NodeId) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.element != element);
        before - self.records.len()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_dom::html::inner_html;
    use pretty_assertions::assert_eq;

    fn host(html: &str) -> (Document, NodeId) {
        let doc = Document::from_html(html).unwrap();
        let root = doc.element_by_id("r").unwrap();
        (doc, root)
    }

    fn meta(id: &str, command: &str, at: u64, is_html: bool) -> MarkerMeta {
        MarkerMeta::new(MacroId::new(id), command, at, is_html)
    }

    #[test]
    fn html_expansion_round_trips_through_undo() {
        let (mut doc, root) = host(r#"<div id="r" contenteditable="true">Hi /sig</div>"#);
        let s = Surface::Rich { root };
        let html = Content::Html("<strong>John Doe</strong>".into());
        let marker = wrap_with_marker(&mut doc, &s, TextRange::new(3, 7), &html, &meta("1", "/sig", 10, true))
            .unwrap();
        assert_eq!(doc.text_content(root), "Hi John Doe");
        assert_eq!(doc.attr(marker, ORIGINAL_COMMAND_ATTR), Some("/sig"));
        assert_eq!(doc.attr(marker, IS_HTML_ATTR), Some("true"));
        assert_eq!(doc.attr(marker, "style"), Some("display: contents"));
        assert!(inner_html(&doc, marker).contains("<strong>John Doe</strong>"));

        assert!(undo_most_recent(&mut doc, root));
        assert_eq!(inner_html(&doc, root), "Hi /sig");
        assert_eq!(doc.children(root).len(), 1);
        assert_eq!(s.caret(&doc).map(|c| c.end), Some(7));
        assert_eq!(doc.events().last().map(|e| e.kind), Some(InputKind::HistoryUndo));
        assert!(!undo_most_recent(&mut doc, root));
    }

    #[test]
    fn text_typed_inside_marker_edges_survives_undo() {
        let (mut doc, root) = host(r#"<div id="r" contenteditable="true">Hi /brb</div>"#);
        let s = Surface::Rich { root };
        let marker = wrap_with_marker(&mut doc, &s, TextRange::new(3, 7), &Content::Text("Be right back".into()), &meta("brb", "/brb", 1, false))
            .unwrap();
        assert_eq!(doc.attr(marker, EXPANSION_TEXT_ATTR), Some("Be right back"));
        let inner = doc.children(marker)[0];
        doc.insert_text_at(Point::new(inner, 13), " ok").unwrap();
        doc.insert_text_at(Point::new(inner, 0), ">").unwrap();
        assert_eq!(doc.text_content(root), "Hi >Be right back ok");

        assert!(undo_most_recent(&mut doc, root));
        assert_eq!(inner_html(&doc, root), "Hi >/brb ok");
        assert!(find_markers(&doc, root).is_empty());
        assert_eq!(s.caret(&doc).map(|c| c.end), Some(8));
    }

    #[test]
    fn text_typed_after_html_expansion_survives_undo() {
        let (mut doc, root) = host(r#"<div id="r" contenteditable="true">Hi /sig</div>"#);
        let s = Surface::Rich { root };
        let html = Content::Html("<strong>John Doe</strong>".into());
        let marker = wrap_with_marker(&mut doc, &s, TextRange::new(3, 7), &html, &meta("sig", "/sig", 1, true))
            .unwrap();
        let strong = doc.children(marker)[0];
        let inner = doc.children(strong)[0];
        doc.insert_text_at(Point::new(inner, 8), "!").unwrap();

        assert!(undo_most_recent(&mut doc, root));
        assert_eq!(inner_html(&doc, root), "Hi /sig<strong>!</strong>");
    }

    #[test]
    fn edited_expansion_is_left_alone() {
        let (mut doc, root) = host(r#"<div id="r" contenteditable="true">Hi /brb</div>"#);
        let s = Surface::Rich { root };
        let marker = wrap_with_marker(&mut doc, &s, TextRange::new(3, 7), &Content::Text("Be right back".into()), &meta("brb", "/brb", 1, false))
            .unwrap();
        let inner = doc.children(marker)[0];
        doc.insert_text_at(Point::new(inner, 2), "e").unwrap();

        assert!(!undo_most_recent(&mut doc, root));
        assert_eq!(doc.text_content(root), "Hi Bee right back");
        assert_eq!(find_markers(&doc, root).len(), 1);
    }

    #[test]
    fn fields_never_get_markers() {
        let mut doc = Document::from_html(r#"<input id="f" value="/x">"#).unwrap();
        let f = doc.element_by_id("f").unwrap();
        let s = core_dom::resolve_surface(&doc, f).unwrap();
        let out = wrap_with_marker(&mut doc, &s, TextRange::new(0, 2), &Content::Text("X".into()), &meta("1", "/x", 1, false));
        assert_eq!(out, None);
        assert_eq!(s.text(&doc), "/x");
    }

    #[test]
    fn newest_marker_is_undone_first() {
        let (mut doc, root) = host(r#"<div id="r" contenteditable="true">/a /b</div>"#);
        let s = Surface::Rich { root };
        wrap_with_marker(&mut doc, &s, TextRange::new(0, 2), &Content::Text("A".into()), &meta("a", "/a", 5, false))
            .unwrap();
        // "A /b": the second trigger now sits at 2..4.
        wrap_with_marker(&mut doc, &s, TextRange::new(2, 4), &Content::Text("B".into()), &meta("b", "/b", 6, false))
            .unwrap();
        assert_eq!(doc.text_content(root), "A B");
        assert_eq!(find_markers(&doc, root).len(), 2);
        assert!(undo_most_recent(&mut doc, root));
        assert_eq!(doc.text_content(root), "A /b");
        assert!(undo_most_recent(&mut doc, root));
        assert_eq!(doc.text_content(root), "/a /b");
    }

    #[test]
    fn equal_stamps_prefer_later_marker() {
        let (mut doc, root) = host(
            r#"<div id="r" contenteditable="true"><span data-expander-marker="true" data-original-command="/a" data-inserted-at="1">A</span><span data-expander-marker="true" data-original-command="/b" data-inserted-at="1">B</span></div>"#,
        );
        assert!(undo_most_recent(&mut doc, root));
        assert_eq!(doc.text_content(root), "A/b");
    }

    #[test]
    fn undo_specific_targets_one_macro() {
        let (mut doc, root) = host(
            r#"<div id="r" contenteditable="true"><span data-expander-marker="true" data-macro-id="m1" data-original-command="/a" data-inserted-at="1">A</span> <span data-expander-marker="true" data-macro-id="m2" data-original-command="/b" data-inserted-at="2">B</span></div>"#,
        );
        assert!(undo_specific(&mut doc, root, &MacroId::new("m1")));
        assert_eq!(doc.text_content(root), "/a B");
        assert!(!undo_specific(&mut doc, root, &MacroId::new("m1")));
    }

    #[test]
    fn settling_is_idempotent() {
        let (mut doc, root) = host(
            r#"<div id="r" contenteditable="true">x <span data-expander-marker="true" data-original-command="/s" data-inserted-at="3"><b>S</b></span> y</div>"#,
        );
        assert_eq!(remove_all_markers(&mut doc, root), 1);
        assert_eq!(inner_html(&doc, root), "x <b>S</b> y");
        assert_eq!(remove_all_markers(&mut doc, root), 0);
        assert_eq!(inner_html(&doc, root), "x <b>S</b> y");
        assert!(!undo_most_recent(&mut doc, root));
    }

    #[test]
    fn ledger_stamps_strictly_increase() {
        let mut ledger = UndoLedger::new();
        assert_eq!(ledger.stamp(100), 100);
        assert_eq!(ledger.stamp(100), 101);
        assert_eq!(ledger.stamp(50), 102);
        assert_eq!(ledger.stamp(500), 500);
    }

    fn expansion(element: NodeId, start: usize, inserted: &str, command: &str) -> FieldExpansion {
        FieldExpansion {
            element,
            start,
            inserted: inserted.into(),
            original_command: command.into(),
            macro_id: MacroId::new("m"),
            stamp: 0,
        }
    }

    #[test]
    fn ledger_reverts_field_expansion() {
        let mut doc = Document::from_html(r#"<input id="f" value="I will Be right back">"#).unwrap();
        let f = doc.element_by_id("f").unwrap();
        let mut ledger = UndoLedger::new();
        ledger.record(expansion(f, 7, "Be right back", "/brb"));
        assert!(ledger.undo_most_recent(&mut doc, f));
        assert_eq!(doc.field(f).unwrap().value, "I will /brb");
        assert_eq!(doc.field(f).unwrap().selection_end, 11);
        assert!(ledger.is_empty());
    }

    #[test]
    fn ledger_refuses_edited_text() {
        let mut doc = Document::from_html(r#"<input id="f" value="I will Be right back">"#).unwrap();
        let f = doc.element_by_id("f").unwrap();
        let mut ledger = UndoLedger::new();
        ledger.record(expansion(f, 7, "Be right back", "/brb"));
        doc.field_mut(f).unwrap().value = "I will be right back".into();
        assert!(!ledger.undo_most_recent(&mut doc, f));
        assert_eq!(doc.field(f).unwrap().value, "I will be right back");
        assert!(ledger.is_empty());
    }

    #[test]
    fn ledger_is_bounded() {
        let doc = Document::from_html(r#"<input id="f">"#).unwrap();
        let f = doc.element_by_id("f").unwrap();
        let mut ledger = UndoLedger::new();
        for i in 0..LEDGER_CAPACITY + 5 {
            ledger.record(expansion(f, i, "x", "/x"));
        }
        assert_eq!(ledger.len(), LEDGER_CAPACITY);
        assert_eq!(ledger.records().next().map(|r| r.start), Some(5));
        assert_eq!(ledger.forget(f), LEDGER_CAPACITY);
    }
}
