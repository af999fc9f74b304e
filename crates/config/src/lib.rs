//! # `ProgramConfig`: the INI configuration model (§6)
//!
//! `spec.md` §1 places the INI *parser* itself out of scope as an external
//! collaborator; `SPEC_FULL.md` §2 brings the surrounding config *model*,
//! validation, and per-stage key routing back into scope as ambient
//! engineering. This crate owns that boundary: [`parse::parse_file`] reads
//! an INI file with the `ini` crate and turns it into a validated
//! [`model::ProgramConfig`] that `icecast-hls-cli`'s wiring module turns
//! into live `stages::Source`/`stages::Destination` chains.
//!
//! ## License
//!
//! MIT License
//!
//! ## Authors
//!
//! - hua0512
//!

pub mod error;
pub mod model;
pub mod parse;

pub use error::{ConfigError, ConfigResult};
pub use model::{
    DestinationConfig, ImageModeConfig, LogLevel, Options, ProgramConfig, SourceConfig, StageConfig, TagMapConfig,
    TagMapRuleConfig, TagMapSelector,
};
pub use parse::{parse_file, parse_str};
