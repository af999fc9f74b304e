//! The validated configuration model (§6): what a `ProgramConfig` looks
//! like once the INI text has been parsed and every key routed to the
//! stage it configures. Nothing here talks to the filesystem or the `ini`
//! crate directly — see [`crate::parse`].

use tagmodel::{MergePolicy, UnknownTagPolicy};

/// `[options] log-level` (§6). `Fatal` maps onto `tracing::Level::ERROR`
/// at the CLI boundary — `tracing` has no level below error, and nothing
/// in this rewrite needs one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.to_ascii_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            "fatal" => LogLevel::Fatal,
            _ => return None,
        })
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

/// `[options]` (§6).
#[derive(Debug, Clone)]
pub struct Options {
    pub stop_on_source_ending: bool,
    pub log_level: LogLevel,
}

impl Default for Options {
    fn default() -> Self {
        Self { stop_on_source_ending: false, log_level: LogLevel::default() }
    }
}

/// Ordered `key = value` pairs routed to one stage's `config()` calls
/// (§4.1), plus the plugin name selected for that stage, if any. Order is
/// preserved because a real plugin's `config` may be order-sensitive (and
/// because replaying the exact INI order makes config errors easy to
/// trace back to a line).
#[derive(Debug, Clone, Default)]
pub struct StageConfig {
    pub plugin: Option<String>,
    pub settings: Vec<(String, String)>,
}

impl StageConfig {
    pub fn plugin_or(&self, default: &'static str) -> &str {
        self.plugin.as_deref().unwrap_or(default)
    }
}

/// `[source.<id>]` (§6).
#[derive(Debug, Clone, Default)]
pub struct SourceConfig {
    pub id: String,
    pub input: StageConfig,
    pub demuxer: StageConfig,
    pub decoder: StageConfig,
    pub filter: StageConfig,
}

/// `[destination.<id>]` `tagmap` key (§6): either a named `[tagmap.<id>]`
/// table or an explicit opt-out.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TagMapSelector {
    #[default]
    Disabled,
    Named(String),
}

/// `[destination.<id>]` `images` key (§6): a superset of
/// `pipeline_core::ImageMode` with an extra `Remove` the muxer-facing enum
/// already carries — kept separate so this crate doesn't depend on
/// `pipeline-core` just to parse one string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageModeConfig {
    Keep,
    Inband,
    OutOfBand,
    Remove,
}

impl ImageModeConfig {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "keep" => ImageModeConfig::Keep,
            "inband" => ImageModeConfig::Inband,
            "out-of-band" => ImageModeConfig::OutOfBand,
            "remove" => ImageModeConfig::Remove,
            _ => return None,
        })
    }
}

/// `[destination.<id>]` (§6).
#[derive(Debug, Clone)]
pub struct DestinationConfig {
    pub id: String,
    pub source: String,
    pub tagmap: TagMapSelector,
    pub images: ImageModeConfig,
    pub unknown_tags: UnknownTagPolicy,
    pub duplicate_tags: MergePolicy,
    pub filter: StageConfig,
    pub encoder: StageConfig,
    pub muxer: StageConfig,
    pub output: StageConfig,
}

/// One `<source-key> = <4-char-id3-name> [priority=<u8>]` rule inside a
/// `[tagmap.<id>]` section (§6).
#[derive(Debug, Clone)]
pub struct TagMapRuleConfig {
    pub source_key: String,
    pub dest_id: String,
    pub priority: u8,
}

/// `[tagmap.<id>]` (§6).
#[derive(Debug, Clone, Default)]
pub struct TagMapConfig {
    pub id: String,
    pub rules: Vec<TagMapRuleConfig>,
}

/// The fully parsed and validated program configuration (§6): one
/// `[options]`, N `[source.*]`, M `[destination.*]`, K `[tagmap.*]`.
#[derive(Debug, Clone, Default)]
pub struct ProgramConfig {
    pub options: Options,
    pub sources: Vec<SourceConfig>,
    pub destinations: Vec<DestinationConfig>,
    pub tagmaps: Vec<TagMapConfig>,
}

impl ProgramConfig {
    pub fn tagmap(&self, id: &str) -> Option<&TagMapConfig> {
        self.tagmaps.iter().find(|t| t.id == id)
    }

    pub fn source(&self, id: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.id == id)
    }
}
