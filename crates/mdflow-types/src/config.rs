//! Configuration types for mdflow.
//!
//! `MdflowConfig` represents the top-level `mdflow.toml` read once at startup
//! by the host. Every field has a sensible default, so an empty file (or no
//! file at all) yields a working configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::document::SectionKind;

/// Top-level configuration record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MdflowConfig {
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub parser: ParseOptions,
    #[serde(default)]
    pub converter: ConversionOptions,
}

// ---------------------------------------------------------------------------
// Watch
// ---------------------------------------------------------------------------

/// Settings for the live-reload file watcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Directory containing workflow documents.
    #[serde(default = "default_watch_directory")]
    pub directory: PathBuf,
    /// Recurse into subdirectories.
    #[serde(default = "default_true")]
    pub recursive: bool,
    /// Coalescing window for bursts of filesystem events.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// When false the host loads documents once and never watches.
    #[serde(default = "default_true")]
    pub auto_reload: bool,
    /// File extensions (without dot) treated as workflow documents.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            directory: default_watch_directory(),
            recursive: true,
            debounce_ms: default_debounce_ms(),
            auto_reload: true,
            extensions: default_extensions(),
        }
    }
}

fn default_watch_directory() -> PathBuf {
    PathBuf::from("workflows")
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_extensions() -> Vec<String> {
    vec!["md".to_string(), "markdown".to_string()]
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parser options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseOptions {
    /// Turn malformed items, failed coercions, and missing structure into errors.
    #[serde(default)]
    pub strict: bool,
    /// Maximum source size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Maximum list nesting depth.
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,
    /// Wall-clock budget for one parse.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Recognise `{{name}}` placeholders.
    #[serde(default = "default_true")]
    pub placeholders: bool,
    /// Check that linked `.md` documents exist relative to the source path.
    #[serde(default)]
    pub validate_links: bool,
}

impl ParseOptions {
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            strict: false,
            max_file_size: default_max_file_size(),
            max_nesting_depth: default_max_nesting_depth(),
            timeout_ms: default_timeout_ms(),
            placeholders: true,
            validate_links: false,
        }
    }
}

fn default_max_file_size() -> u64 {
    1_048_576
}

fn default_max_nesting_depth() -> usize {
    8
}

fn default_timeout_ms() -> u64 {
    5_000
}

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Converter options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionOptions {
    /// Generate identifiers from step titles when `Id:` is absent.
    #[serde(default = "default_true")]
    pub auto_generate_ids: bool,
    /// Prefix prepended to generated identifiers.
    #[serde(default)]
    pub id_prefix: String,
    /// Rewrite `{{name}}` to the executor binding syntax. When false,
    /// placeholders are left verbatim and recorded as deferred bindings.
    #[serde(default = "default_true")]
    pub substitute_placeholders: bool,
    /// Wall-clock budget for one conversion.
    #[serde(default = "default_timeout_ms")]
    pub time_budget_ms: u64,
    /// Section kinds that must be present for the document to convert.
    #[serde(default = "default_required_sections")]
    pub required_sections: Vec<SectionKind>,
}

impl ConversionOptions {
    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            auto_generate_ids: true,
            id_prefix: String::new(),
            substitute_placeholders: true,
            time_budget_ms: default_timeout_ms(),
            required_sections: default_required_sections(),
        }
    }
}

fn default_required_sections() -> Vec<SectionKind> {
    vec![SectionKind::Steps]
}
