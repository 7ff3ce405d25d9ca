//! HTML fragment parsing, serialization, and plain-text conversion.
//!
//! Parsing goes through `quick-xml` in a lenient configuration (end names not
//! checked, void elements closed implicitly). Input that still fails to parse
//! is handled by a regex tag stripper so callers always get text back.

use std::borrow::Cow;
use std::sync::OnceLock;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use tracing::{debug, warn};

use crate::document::{Document, NodeId, NodeKind};
use crate::{DomError, DomResult};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "figcaption", "figure",
    "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p",
    "pre", "section", "table", "tr", "ul",
];

pub fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

pub fn is_block(tag: &str) -> bool {
    BLOCK_ELEMENTS.contains(&tag)
}

fn resolve_entity(name: &str) -> Option<&'static str> {
    let s = match name {
        "nbsp" => "\u{a0}",
        "copy" => "\u{a9}",
        "reg" => "\u{ae}",
        "trade" => "\u{2122}",
        "hellip" => "\u{2026}",
        "mdash" => "\u{2014}",
        "ndash" => "\u{2013}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "euro" => "\u{20ac}",
        _ => return None,
    };
    Some(s)
}

fn tag_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase()
}

fn open_element(doc: &mut Document, e: &BytesStart<'_>) -> NodeId {
    let id = doc.create_element(&tag_name(e));
    for attr in e.html_attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
        let value = match attr.unescape_value_with(resolve_entity) {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        if let Some(el) = doc.element_mut(id) {
            el.set_attr(&key, value);
        }
    }
    id
}

/// Parse an HTML fragment into detached top-level nodes owned by `doc`.
pub fn parse_fragment(doc: &mut Document, html: &str) -> DomResult<Vec<NodeId>> {
    let holder = doc.create_fragment();
    let mut reader = Reader::from_str(html);
    reader.trim_text(false);
    reader.check_end_names(false);

    let mut stack: Vec<NodeId> = vec![holder];
    loop {
        let parent = stack.last().copied().unwrap_or(holder);
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let id = open_element(doc, &e);
                doc.append_child(parent, id)?;
                if !is_void(&tag_name(&e)) {
                    stack.push(id);
                }
            }
            Ok(Event::Empty(e)) => {
                let id = open_element(doc, &e);
                doc.append_child(parent, id)?;
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                // Close the nearest open element with this name; stray end tags are ignored.
                if let Some(pos) = stack
                    .iter()
                    .rposition(|&n| n != holder && doc.tag(n) == Some(name.as_str()))
                {
                    stack.truncate(pos);
                }
            }
            Ok(Event::Text(t)) => {
                let text: Cow<'_, str> = match t.unescape_with(resolve_entity) {
                    Ok(s) => s,
                    Err(_) => Cow::Owned(String::from_utf8_lossy(&t).into_owned()),
                };
                if !text.is_empty() {
                    let id = doc.create_text(text.into_owned());
                    doc.append_child(parent, id)?;
                }
            }
            Ok(Event::CData(c)) => {
                let id = doc.create_text(String::from_utf8_lossy(&c).into_owned());
                doc.append_child(parent, id)?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(DomError::Html(e.to_string())),
        }
    }

    let nodes = doc.children(holder).to_vec();
    for &n in &nodes {
        doc.init_fields(n);
    }
    for &n in &nodes {
        doc.detach(n);
    }
    debug!(target: "dom.edit", top_level = nodes.len(), "fragment_parsed");
    Ok(nodes)
}

/// Like [`parse_fragment`], but input that fails to parse becomes a single
/// text node holding its stripped text.
pub fn parse_fragment_lossy(doc: &mut Document, html: &str) -> Vec<NodeId> {
    match parse_fragment(doc, html) {
        Ok(nodes) => nodes,
        Err(e) => {
            warn!(target: "dom.edit", error = %e, "fragment_parse_failed_fallback_to_text");
            let text = strip_tags(html);
            if text.is_empty() {
                Vec::new()
            } else {
                vec![doc.create_text(text)]
            }
        }
    }
}

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn tag_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&RE, r"<[^>]*>")
}

fn break_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&RE, r"(?i)<br\s*/?>|</(p|div|li|h[1-6]|tr|blockquote|pre)\s*>")
}

fn newline_run_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&RE, r"[\r\n]+")
}

/// Regex tag removal for markup `quick-xml` rejects.
fn strip_tags(html: &str) -> String {
    let with_breaks = match break_regex() {
        Some(re) => re.replace_all(html, "\n"),
        None => Cow::Borrowed(html),
    };
    let bare = match tag_regex() {
        Some(re) => re.replace_all(&with_breaks, ""),
        None => Cow::Borrowed(with_breaks.as_ref()),
    };
    bare.replace("&nbsp;", "\u{a0}")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .trim_end_matches('\n')
        .to_string()
}

/// Plain text of an HTML fragment: inner text kept, `<br>` and block
/// boundaries become newlines.
pub fn html_to_text(html: &str) -> String {
    let mut scratch = Document::new();
    let nodes = match parse_fragment(&mut scratch, html) {
        Ok(nodes) => nodes,
        Err(_) => return strip_tags(html),
    };
    let mut out = String::new();
    let mut pending_break = false;
    for n in nodes {
        collect_text(&scratch, n, &mut out, &mut pending_break);
    }
    out
}

fn collect_text(doc: &Document, id: NodeId, out: &mut String, pending_break: &mut bool) {
    match doc.kind(id) {
        Some(NodeKind::Text(s)) => {
            if s.is_empty() {
                return;
            }
            if *pending_break && !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            *pending_break = false;
            out.push_str(s);
        }
        Some(NodeKind::Element(el)) => {
            if el.tag == "br" {
                out.push('\n');
                *pending_break = false;
                return;
            }
            let block = is_block(&el.tag);
            if block {
                *pending_break = true;
            }
            for &c in doc.children(id) {
                collect_text(doc, c, out, pending_break);
            }
            if block {
                *pending_break = true;
            }
        }
        Some(NodeKind::Document | NodeKind::Fragment) => {
            for &c in doc.children(id) {
                collect_text(doc, c, out, pending_break);
            }
        }
        None => {}
    }
}

/// Replace every run of line breaks with a single space.
pub fn collapse_newlines(text: &str) -> String {
    match newline_run_regex() {
        Some(re) => re.replace_all(text, " ").into_owned(),
        None => text.replace(['\r', '\n'], " "),
    }
}

fn escape_text(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn write_node(doc: &Document, id: NodeId, out: &mut String) {
    match doc.kind(id) {
        Some(NodeKind::Text(s)) => escape_text(s, out),
        Some(NodeKind::Element(el)) => {
            out.push('<');
            out.push_str(&el.tag);
            let live_value = match (&el.field, el.tag.as_str()) {
                (Some(f), "input") => Some(f.value.as_str()),
                _ => None,
            };
            for (k, v) in &el.attrs {
                if live_value.is_some() && k == "value" {
                    continue;
                }
                out.push(' ');
                out.push_str(k);
                out.push_str("=\"");
                escape_attr(v, out);
                out.push('"');
            }
            if let Some(v) = live_value {
                out.push_str(" value=\"");
                escape_attr(v, out);
                out.push('"');
            }
            out.push('>');
            if is_void(&el.tag) {
                return;
            }
            match (&el.field, el.tag.as_str()) {
                (Some(f), "textarea") => escape_text(&f.value, out),
                _ => {
                    for &c in doc.children(id) {
                        write_node(doc, c, out);
                    }
                }
            }
            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
        }
        Some(NodeKind::Document | NodeKind::Fragment) => {
            for &c in doc.children(id) {
                write_node(doc, c, out);
            }
        }
        None => {}
    }
}

/// Serialized markup of `id` itself. Fields show their current value.
pub fn outer_html(doc: &Document, id: NodeId) -> String {
    let mut out = String::new();
    write_node(doc, id, &mut out);
    out
}

/// Serialized markup of `id`'s children.
pub fn inner_html(doc: &Document, id: NodeId) -> String {
    let mut out = String::new();
    for &c in doc.children(id) {
        write_node(doc, c, &mut out);
    }
    out
}

impl Document {
    /// Serialized markup of the whole document.
    pub fn to_html(&self) -> String {
        inner_html(self, self.root())
    }
}
