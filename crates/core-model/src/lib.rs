//! Macro data model.
//!
//! A [`Macro`] is an expansion rule authored elsewhere (editor UI, sync layer)
//! and handed to the detector as an immutable snapshot. [`MacroSet`] is that
//! snapshot: system macros first, then user macros, plus lookup indexes. It is
//! cheap to clone and is replaced wholesale on every update, never mutated.

mod set;
pub mod system;

pub use set::MacroSet;
pub use system::SystemAction;

use serde::Deserialize;
use std::fmt;
use std::io::Read;

/// Opaque, stable identifier of a macro.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct MacroId(pub String);

impl MacroId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MacroId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Text,
    Html,
}

/// A stored expansion rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Macro {
    pub id: MacroId,
    /// Trigger string, e.g. `/sig`. Case-sensitive.
    pub command: String,
    /// Plain-text expansion; the fallback for surfaces that cannot render HTML.
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub content_type: ContentType,
    /// Informational only; used to redact buffers from logs.
    #[serde(default)]
    pub is_sensitive: bool,
    /// Set for built-in commands; never read from user data.
    #[serde(skip)]
    pub system: Option<SystemAction>,
}

impl Macro {
    pub fn plain(id: impl Into<String>, command: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: MacroId::new(id),
            command: command.into(),
            text: text.into(),
            html: None,
            content_type: ContentType::Text,
            is_sensitive: false,
            system: None,
        }
    }

    /// HTML macro; `text` is the plain fallback.
    pub fn rich(
        id: impl Into<String>,
        command: impl Into<String>,
        html: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            html: Some(html.into()),
            content_type: ContentType::Html,
            ..Self::plain(id, command, text)
        }
    }

    pub fn sensitive(mut self) -> Self {
        self.is_sensitive = true;
        self
    }

    /// Content type after reconciling the declared type with the payload:
    /// a non-empty `html` always wins, an HTML macro without `html` is text.
    pub fn effective_content_type(&self) -> ContentType {
        match self.html.as_deref() {
            Some(h) if !h.is_empty() => ContentType::Html,
            _ => ContentType::Text,
        }
    }

    pub fn html_content(&self) -> Option<&str> {
        match self.effective_content_type() {
            ContentType::Html => self.html.as_deref(),
            ContentType::Text => None,
        }
    }

    pub fn is_system(&self) -> bool {
        self.system.is_some()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MacroParseError {
    #[error("macro file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to read macro source: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse a JSON array of macros (the shape the sync layer exports).
pub fn parse_macros_json(input: &str) -> Result<Vec<Macro>, MacroParseError> {
    let macros: Vec<Macro> = serde_json::from_str(input)?;
    Ok(macros)
}

pub fn read_macros_json<R: Read>(mut reader: R) -> Result<Vec<Macro>, MacroParseError> {
    let mut s = String::new();
    reader.read_to_string(&mut s)?;
    parse_macros_json(&s)
}
