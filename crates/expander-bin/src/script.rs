//! Replay script format.
//!
//! One directive per line; blank lines and `#` comments are skipped.
//!
//! ```text
//! focus msg
//! type Hello /si
//! key Backspace
//! type g
//! wait 2000
//! blur
//! ```

use std::time::Duration;

use anyhow::{Context, Result, bail};
use core_events::{InputEvent, KeyPress};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// One keydown per character.
    Type(String),
    Key(KeyPress),
    Wait(Duration),
    Blur,
    Focus(String),
}

impl Step {
    /// Host events this step produces. `Wait` produces none.
    pub fn inputs(&self) -> Vec<InputEvent> {
        match self {
            Step::Type(text) => text
                .chars()
                .map(|c| InputEvent::KeyDown(KeyPress::char(c)))
                .collect(),
            Step::Key(key) => vec![InputEvent::KeyDown(key.clone())],
            Step::Wait(_) => Vec::new(),
            Step::Blur => vec![InputEvent::FocusLost],
            Step::Focus(id) => vec![InputEvent::FocusGained(id.clone())],
        }
    }
}

pub fn parse_script(src: &str) -> Result<Vec<Step>> {
    let mut steps = Vec::new();
    for (idx, raw) in src.lines().enumerate() {
        let line = raw.trim_start();
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let step = parse_line(line).with_context(|| format!("script line {}", idx + 1))?;
        steps.push(step);
    }
    Ok(steps)
}

fn parse_line(line: &str) -> Result<Step> {
    let (directive, rest) = line.split_once(' ').unwrap_or((line, ""));
    match directive {
        // Text is taken verbatim so trailing spaces survive.
        "type" => Ok(Step::Type(rest.to_string())),
        "key" => {
            let spec = rest.trim();
            if spec.is_empty() {
                bail!("key needs an identifier");
            }
            Ok(Step::Key(KeyPress::parse(spec)))
        }
        "wait" => {
            let ms: u64 = rest
                .trim()
                .parse()
                .with_context(|| format!("invalid wait duration {:?}", rest.trim()))?;
            Ok(Step::Wait(Duration::from_millis(ms)))
        }
        "blur" => Ok(Step::Blur),
        "focus" => {
            let id = rest.trim();
            if id.is_empty() {
                bail!("focus needs an element id");
            }
            Ok(Step::Focus(id.to_string()))
        }
        other => bail!("unknown directive {other:?}"),
    }
}
