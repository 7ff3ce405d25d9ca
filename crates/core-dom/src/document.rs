//! Node arena, tree mutation, focus, selection and event log.

use smallvec::SmallVec;
use tracing::trace;

use crate::range::{Point, Range};
use crate::{DomError, DomResult, char_len};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Value-backed form control state. Selection bounds are character offsets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldState {
    pub value: String,
    pub selection_start: usize,
    pub selection_end: usize,
}

impl FieldState {
    /// Field holding `value` with the caret at its end.
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let end = char_len(&value);
        Self {
            value,
            selection_start: end,
            selection_end: end,
        }
    }

    pub fn len(&self) -> usize {
        char_len(&self.value)
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn is_collapsed(&self) -> bool {
        self.selection_start == self.selection_end
    }

    pub fn set_caret(&mut self, pos: usize) {
        let pos = pos.min(self.len());
        self.selection_start = pos;
        self.selection_end = pos;
    }

    pub fn set_selection(&mut self, start: usize, end: usize) {
        let len = self.len();
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        self.selection_start = start.min(len);
        self.selection_end = end.min(len);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    /// Lower-case tag name.
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    /// Present for `input` and `textarea`.
    pub field: Option<FieldState>,
}

impl ElementData {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
            field: None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some((_, v)) => *v = value,
            None => self.attrs.push((name.to_ascii_lowercase(), value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let idx = self.attrs.iter().position(|(k, _)| k.eq_ignore_ascii_case(name))?;
        Some(self.attrs.remove(idx).1)
    }

    pub fn is_field_tag(&self) -> bool {
        matches!(self.tag.as_str(), "input" | "textarea")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Fragment,
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: SmallVec<[NodeId; 4]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    InsertText,
    DeleteContentBackward,
    InsertReplacementText,
    HistoryUndo,
}

/// An `input` notification dispatched on an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomEvent {
    pub target: NodeId,
    pub kind: InputKind,
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    selection: Option<Range>,
    active: Option<NodeId>,
    events: Vec<DomEvent>,
    hostname: String,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: SmallVec::new(),
            }],
            root: NodeId(0),
            selection: None,
            active: None,
            events: Vec::new(),
            hostname: String::new(),
        }
    }

    /// Parse `html` and attach it under the document root.
    pub fn from_html(html: &str) -> DomResult<Self> {
        let mut doc = Self::new();
        let nodes = crate::html::parse_fragment(&mut doc, html)?;
        let root = doc.root;
        for n in nodes {
            doc.append_child(root, n)?;
        }
        Ok(doc)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn set_hostname(&mut self, host: impl Into<String>) {
        self.hostname = host.into();
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node(&self, id: NodeId) -> DomResult<&Node> {
        self.nodes.get(id.0).ok_or(DomError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> DomResult<&mut Node> {
        self.nodes.get_mut(id.0).ok_or(DomError::UnknownNode(id))
    }

    // ---------------------------------------------------------------------------------------------
    // Node accessors
    // ---------------------------------------------------------------------------------------------

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id.0).map(|n| &n.kind)
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.kind(id), Some(NodeKind::Text(_)))
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.kind(id), Some(NodeKind::Element(_)))
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match self.kind(id)? {
            NodeKind::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.nodes.get_mut(id.0)?.kind {
            NodeKind::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.tag.as_str())
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attr(name)
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) -> DomResult<()> {
        let el = self.element_mut(id).ok_or(DomError::NotContainer(id))?;
        el.set_attr(name, value);
        Ok(())
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.kind(id)? {
            NodeKind::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn set_text(&mut self, id: NodeId, value: impl Into<String>) -> DomResult<()> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Text(s) => {
                *s = value.into();
                Ok(())
            }
            _ => Err(DomError::NotText(id)),
        }
    }

    pub fn text_len(&self, id: NodeId) -> usize {
        self.text(id).map(char_len).unwrap_or(0)
    }

    pub fn field(&self, id: NodeId) -> Option<&FieldState> {
        self.element(id)?.field.as_ref()
    }

    pub fn field_mut(&mut self, id: NodeId) -> Option<&mut FieldState> {
        self.element_mut(id)?.field.as_mut()
    }

    /// Length of a node for boundary points: characters for text, children otherwise.
    pub fn node_length(&self, id: NodeId) -> usize {
        match self.kind(id) {
            Some(NodeKind::Text(s)) => char_len(s),
            Some(_) => self.children(id).len(),
            None => 0,
        }
    }

    // ---------------------------------------------------------------------------------------------
    // Tree navigation
    // ---------------------------------------------------------------------------------------------

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id.0).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let idx = self.index_in_parent(id)?;
        let parent = self.parent(id)?;
        idx.checked_sub(1).map(|i| self.children(parent)[i])
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let idx = self.index_in_parent(id)?;
        let parent = self.parent(id)?;
        self.children(parent).get(idx + 1).copied()
    }

    /// Inclusive ancestry test.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            cur = self.parent(n);
        }
        false
    }

    pub fn is_connected(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len() && self.contains(self.root, id)
    }

    /// Descendants of `id` in document order, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).iter().rev().copied());
        }
        out
    }

    /// Text nodes under `id` (inclusive) in document order.
    pub fn text_nodes(&self, id: NodeId) -> Vec<NodeId> {
        if self.is_text(id) {
            return vec![id];
        }
        self.descendants(id)
            .into_iter()
            .filter(|&n| self.is_text(n))
            .collect()
    }

    pub fn text_content(&self, id: NodeId) -> String {
        self.text_nodes(id)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }

    pub fn element_by_id(&self, dom_id: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|&n| self.attr(n, "id") == Some(dom_id))
    }

    // ---------------------------------------------------------------------------------------------
    // Construction & mutation
    // ---------------------------------------------------------------------------------------------

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: SmallVec::new(),
        });
        id
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeKind::Element(ElementData::new(tag)))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Text(text.into()))
    }

    pub fn create_fragment(&mut self) -> NodeId {
        self.push(NodeKind::Fragment)
    }

    /// Give `input`/`textarea` elements under `id` (inclusive) their field state.
    /// A textarea's initial value is its text content, which is then dropped.
    pub fn init_fields(&mut self, id: NodeId) {
        let mut targets = vec![id];
        targets.extend(self.descendants(id));
        for n in targets {
            let Some(el) = self.element(n) else { continue };
            if el.field.is_some() || !el.is_field_tag() {
                continue;
            }
            let value = match el.tag.as_str() {
                "textarea" => self.text_content(n),
                _ => el.attr("value").unwrap_or_default().to_string(),
            };
            if el.tag == "textarea" {
                for c in self.children(n).to_vec() {
                    self.detach(c);
                }
            }
            if let Some(el) = self.element_mut(n) {
                el.field = Some(FieldState::new(value));
            }
        }
    }

    fn check_container(&self, parent: NodeId, child: NodeId) -> DomResult<()> {
        match self.node(parent)?.kind {
            NodeKind::Text(_) => return Err(DomError::NotContainer(parent)),
            NodeKind::Element(ref e) if e.field.is_some() => {
                return Err(DomError::NotContainer(parent));
            }
            _ => {}
        }
        self.node(child)?;
        if self.contains(child, parent) {
            return Err(DomError::Cycle { parent, child });
        }
        Ok(())
    }

    /// Insert `child` at `index` among `parent`'s children, detaching it from
    /// its current position first. Fragments are unpacked.
    pub fn insert_at(&mut self, parent: NodeId, index: usize, child: NodeId) -> DomResult<()> {
        self.check_container(parent, child)?;
        if matches!(self.node(child)?.kind, NodeKind::Fragment) {
            let kids = self.children(child).to_vec();
            let mut at = index;
            for k in kids {
                self.insert_at(parent, at, k)?;
                at += 1;
            }
            return Ok(());
        }
        let mut index = index;
        if self.parent(child) == Some(parent)
            && let Some(old) = self.index_in_parent(child)
            && old < index
        {
            index -= 1;
        }
        self.detach(child);
        let len = self.children(parent).len();
        let node = self.node_mut(parent)?;
        node.children.insert(index.min(len), child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<()> {
        let len = self.children(parent).len();
        self.insert_at(parent, len, child)
    }

    /// Insert `child` before `reference`, or append when `reference` is `None`.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> DomResult<()> {
        let index = match reference {
            Some(r) if self.parent(r) == Some(parent) => self.index_in_parent(r).unwrap_or(0),
            Some(r) => return Err(DomError::UnknownNode(r)),
            None => self.children(parent).len(),
        };
        self.insert_at(parent, index, child)
    }

    pub fn insert_after(&mut self, reference: NodeId, child: NodeId) -> DomResult<()> {
        let parent = self.parent(reference).ok_or(DomError::UnknownNode(reference))?;
        let idx = self.index_in_parent(reference).unwrap_or(0);
        self.insert_at(parent, idx + 1, child)
    }

    /// Remove `id` from its parent. The node stays in the arena, detached.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else { return };
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.retain(|c| *c != id);
        }
        if let Some(n) = self.nodes.get_mut(id.0) {
            n.parent = None;
        }
        if self.active.is_some_and(|a| self.contains(id, a)) {
            trace!(target: "dom.edit", node = id.0, "active_element_detached");
        }
    }

    /// Replace an element with its children, in place.
    pub fn unwrap_element(&mut self, id: NodeId) -> DomResult<()> {
        let parent = self.parent(id).ok_or(DomError::UnknownNode(id))?;
        let idx = self.index_in_parent(id).unwrap_or(0);
        let kids = self.children(id).to_vec();
        for (i, k) in kids.into_iter().enumerate() {
            self.insert_at(parent, idx + i, k)?;
        }
        self.detach(id);
        Ok(())
    }

    /// Split a text node at a character offset. The original keeps the head;
    /// the returned node holds the tail and is inserted right after it.
    pub fn split_text(&mut self, id: NodeId, offset: usize) -> DomResult<NodeId> {
        let text = self.text(id).ok_or(DomError::NotText(id))?.to_string();
        let len = char_len(&text);
        if offset > len {
            return Err(DomError::OffsetOutOfBounds { node: id, offset });
        }
        let at = crate::byte_at(&text, offset);
        let (head, tail) = text.split_at(at);
        let tail = self.create_text(tail);
        self.set_text(id, head)?;
        if self.parent(id).is_some() {
            self.insert_after(id, tail)?;
        }
        Ok(tail)
    }

    /// Merge adjacent text siblings around `id` into `id`. Returns the merged
    /// node and the character offset at which `id`'s own text now starts.
    pub fn merge_adjacent_text(&mut self, id: NodeId) -> DomResult<(NodeId, usize)> {
        let mut text = self.text(id).ok_or(DomError::NotText(id))?.to_string();
        let mut lead = 0usize;
        while let Some(prev) = self.previous_sibling(id) {
            let Some(p) = self.text(prev) else { break };
            lead += char_len(p);
            text.insert_str(0, p);
            self.detach(prev);
        }
        while let Some(next) = self.next_sibling(id) {
            let Some(n) = self.text(next) else { break };
            text.push_str(n);
            self.detach(next);
        }
        self.set_text(id, text)?;
        Ok((id, lead))
    }

    // ---------------------------------------------------------------------------------------------
    // Focus & selection
    // ---------------------------------------------------------------------------------------------

    pub fn focus(&mut self, id: NodeId) {
        self.active = Some(id);
        trace!(target: "dom.edit", node = id.0, "focus");
    }

    pub fn blur(&mut self) {
        self.active = None;
    }

    /// Focused element, if it is still attached.
    pub fn active_element(&self) -> Option<NodeId> {
        self.active.filter(|&a| self.is_connected(a))
    }

    pub fn selection(&self) -> Option<Range> {
        self.selection
    }

    pub fn set_selection(&mut self, range: Range) {
        self.selection = Some(range);
    }

    pub fn collapse(&mut self, point: Point) {
        self.selection = Some(Range::collapsed(point));
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    // ---------------------------------------------------------------------------------------------
    // Events
    // ---------------------------------------------------------------------------------------------

    pub fn dispatch_input(&mut self, target: NodeId, kind: InputKind) {
        trace!(target: "dom.edit", node = target.0, kind = ?kind, "input_dispatched");
        self.events.push(DomEvent { target, kind });
    }

    pub fn events(&self) -> &[DomEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<DomEvent> {
        std::mem::take(&mut self.events)
    }
}
