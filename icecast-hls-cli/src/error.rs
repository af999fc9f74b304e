//! Top-level error type (`SPEC_FULL.md` §2 ambient stack): composes every
//! library crate's own `thiserror` error at the CLI boundary, the one
//! place in the workspace allowed to flatten them into a single type for
//! `main`'s exit-code handling.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IcecastHlsError {
    #[error(transparent)]
    Config(#[from] icecast_hls_config::ConfigError),

    #[error("{section} {id}: unknown {kind} plugin {name:?}")]
    UnknownPlugin { section: &'static str, id: String, kind: &'static str, name: String },

    #[error("{section} {id}: {source}")]
    Stage { section: &'static str, id: String, #[source] source: pipeline_core::StageError },

    #[error("no sources configured")]
    NoSources,
}
