//! Configuration loading and parsing.
//!
//! Parses `expander.toml` (or an override path provided by the binary):
//!
//! ```toml
//! [detection]
//! prefixes = ["/", ";"]
//! use_commit_keys = false
//! commit_delay_ms = 1850
//! blur_debounce_ms = 150
//!
//! [sites]
//! disabled = ["mail.example.com"]
//!
//! [undo]
//! markers = true
//! ```
//!
//! Every field is optional. Unknown fields are ignored so older binaries keep
//! reading newer files. A missing or unparsable file yields defaults; the raw
//! parsed values are validated into [`Config`] once, so the detector never sees
//! an empty prefix list.

use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::{info, warn};

pub const DEFAULT_PREFIXES: [&str; 2] = ["/", ";"];
pub const DEFAULT_COMMIT_DELAY_MS: u64 = 1850;
pub const DEFAULT_BLUR_DEBOUNCE_MS: u64 = 150;
pub const CONFIG_FILE_NAME: &str = "expander.toml";

#[derive(Debug, Deserialize, Clone)]
pub struct DetectionConfig {
    #[serde(default = "DetectionConfig::default_prefixes")]
    pub prefixes: Vec<String>,
    #[serde(default)]
    pub use_commit_keys: bool,
    #[serde(default = "DetectionConfig::default_commit_delay_ms")]
    pub commit_delay_ms: u64,
    #[serde(default = "DetectionConfig::default_blur_debounce_ms")]
    pub blur_debounce_ms: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            prefixes: Self::default_prefixes(),
            use_commit_keys: false,
            commit_delay_ms: Self::default_commit_delay_ms(),
            blur_debounce_ms: Self::default_blur_debounce_ms(),
        }
    }
}

impl DetectionConfig {
    fn default_prefixes() -> Vec<String> {
        DEFAULT_PREFIXES.iter().map(|p| p.to_string()).collect()
    }
    const fn default_commit_delay_ms() -> u64 {
        DEFAULT_COMMIT_DELAY_MS
    }
    const fn default_blur_debounce_ms() -> u64 {
        DEFAULT_BLUR_DEBOUNCE_MS
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct SitesConfig {
    #[serde(default)]
    pub disabled: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UndoConfig {
    #[serde(default = "UndoConfig::default_markers")]
    pub markers: bool,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            markers: Self::default_markers(),
        }
    }
}

impl UndoConfig {
    const fn default_markers() -> bool {
        true
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub sites: SitesConfig,
    #[serde(default)]
    pub undo: UndoConfig,
}

/// Validated, read-only settings consumed by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Non-empty list of trigger prefixes, in configured order.
    pub prefixes: Vec<String>,
    /// Manual commit mode (Space / Enter) instead of automatic expansion.
    pub use_commit_keys: bool,
    /// Normalized hostnames (lowercase, no leading `www.`).
    pub disabled_sites: Vec<String>,
    pub commit_delay: Duration,
    pub blur_debounce: Duration,
    /// Wrap rich expansions in undo markers.
    pub undo_markers: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_file(&ConfigFile::default())
    }
}

impl Config {
    /// Validate parsed file contents.
    pub fn from_file(file: &ConfigFile) -> Self {
        let mut prefixes: Vec<String> = Vec::with_capacity(file.detection.prefixes.len());
        for p in &file.detection.prefixes {
            if p.is_empty() {
                warn!(target: "config", "empty_prefix_dropped");
                continue;
            }
            if !prefixes.contains(p) {
                prefixes.push(p.clone());
            }
        }
        if prefixes.is_empty() {
            warn!(target: "config", "prefix_list_empty_using_defaults");
            prefixes = DetectionConfig::default_prefixes();
        }
        let disabled_sites = file
            .sites
            .disabled
            .iter()
            .map(|s| normalize_host(s))
            .filter(|s| !s.is_empty())
            .collect();
        Self {
            prefixes,
            use_commit_keys: file.detection.use_commit_keys,
            disabled_sites,
            commit_delay: Duration::from_millis(file.detection.commit_delay_ms),
            blur_debounce: Duration::from_millis(file.detection.blur_debounce_ms),
            undo_markers: file.undo.markers,
        }
    }

    /// Convenience constructor used by hosts that configure programmatically.
    pub fn with_prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut file = ConfigFile::default();
        file.detection.prefixes = prefixes.into_iter().map(Into::into).collect();
        Self::from_file(&file)
    }

    /// First configured prefix; system commands are spelled with it.
    pub fn primary_prefix(&self) -> &str {
        self.prefixes
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_PREFIXES[0])
    }

    /// Whether the detector must stay detached on `hostname`.
    pub fn is_site_disabled(&self, hostname: &str) -> bool {
        let host = normalize_host(hostname);
        !host.is_empty() && self.disabled_sites.iter().any(|d| *d == host)
    }
}

fn normalize_host(raw: &str) -> String {
    let lower = raw.trim().to_ascii_lowercase();
    match lower.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => lower,
    }
}

/// Best-effort config path following platform conventions (XDG / AppData Roaming).
pub fn discover() -> PathBuf {
    // Prefer a local working directory file before the platform config dir.
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("expander").join(CONFIG_FILE_NAME);
    }
    PathBuf::from(CONFIG_FILE_NAME)
}

/// Raw file contents alongside the validated settings.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub raw: Option<String>,
    pub file: ConfigFile,
    pub config: Config,
}

pub fn load_from(path: Option<PathBuf>) -> Result<LoadedConfig> {
    let path = path.unwrap_or_else(discover);
    let Ok(content) = fs::read_to_string(&path) else {
        info!(target: "config", path = %path.display(), "config_file_absent_using_defaults");
        return Ok(LoadedConfig::default());
    };
    match toml::from_str::<ConfigFile>(&content) {
        Ok(file) => {
            let config = Config::from_file(&file);
            info!(
                target: "config",
                path = %path.display(),
                prefixes = config.prefixes.len(),
                manual_commit = config.use_commit_keys,
                disabled_sites = config.disabled_sites.len(),
                "config_loaded"
            );
            Ok(LoadedConfig {
                raw: Some(content),
                file,
                config,
            })
        }
        Err(e) => {
            // Parse errors fall back to defaults rather than refusing to start.
            warn!(target: "config", path = %path.display(), error = %e, "config_parse_failed_using_defaults");
            Ok(LoadedConfig::default())
        }
    }
}
