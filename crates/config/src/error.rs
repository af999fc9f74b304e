//! Config-time error taxonomy (§7 `ConfigError`): everything that can go
//! wrong before the pipeline starts, surfaced with enough context (section
//! + key) to point the user at the offending INI line.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load {path}: {source}")]
    Ini { path: String, #[source] source: ini::Error },

    #[error("[{section}] {key} = {value:?} is not a valid value")]
    InvalidValue { section: String, key: String, value: String },

    #[error("[{section}] bare key {key:?} given before any stage selector")]
    NoActiveStage { section: String, key: String },

    #[error("[{section}] missing required key {key:?}")]
    MissingKey { section: String, key: String },

    #[error("[destination.{destination}] source {source:?} is not defined by any [source.{source}] section")]
    UnknownSource { destination: String, source: String },

    #[error("[destination.{destination}] tagmap {tagmap:?} is not defined by any [tagmap.{tagmap}] section")]
    UnknownTagMap { destination: String, tagmap: String },

    #[error("duplicate section [{0}]")]
    DuplicateSection(String),
}

pub type ConfigResult<T = ()> = Result<T, ConfigError>;
