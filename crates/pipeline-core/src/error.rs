//! Error taxonomy shared by every stage (§7).
//!
//! `TransientIoError` deliberately has no variant here: an input driver that
//! times out returns `Ok(0)` (treated as EOF by its caller), it never
//! constructs a [`StageError`]. Everything else that can go wrong inside a
//! stage's lifecycle call maps onto one of these kinds.

use std::fmt;

/// One of the seven error kinds named in §7. Each [`StageError`] carries
/// exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown config key/value; fatal before the pipeline starts.
    Config,
    /// Allocation failure; fatal, aborts the current stage.
    ResourceExhaustion,
    /// Malformed container, unsupported codec, unknown sample layout.
    Format,
    /// Icecast handshake rejected, HTTP non-2xx.
    Protocol,
    /// Opening an output twice, submitting after flush, and similar.
    Lifecycle,
    /// Peer-requested abort via the rendezvous `status` word.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Config => "config",
            ErrorKind::ResourceExhaustion => "resource-exhaustion",
            ErrorKind::Format => "format",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Lifecycle => "lifecycle",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// An error surfaced by a stage's lifecycle call (`config`/`open`/
/// `submit_*`/`flush`/`reset`/`close`). Carries the kind (§7), the stage
/// name that raised it, and a human-readable message; no error is silently
/// swallowed (§7 propagation policy).
#[derive(Debug, thiserror::Error)]
#[error("{stage} ({kind}): {message}")]
pub struct StageError {
    pub kind: ErrorKind,
    pub stage: &'static str,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StageError {
    pub fn new(kind: ErrorKind, stage: &'static str, message: impl Into<String>) -> Self {
        Self { kind, stage, message: message.into(), source: None }
    }

    pub fn with_source(
        kind: ErrorKind,
        stage: &'static str,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self { kind, stage, message: message.into(), source: Some(Box::new(source)) }
    }

    pub fn config(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, stage, message)
    }

    pub fn format(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Format, stage, message)
    }

    pub fn lifecycle(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Lifecycle, stage, message)
    }

    pub fn protocol(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, stage, message)
    }

    pub fn cancelled(stage: &'static str) -> Self {
        Self::new(ErrorKind::Cancelled, stage, "cancelled")
    }

    pub fn is_fatal_for_source(&self) -> bool {
        !matches!(self.kind, ErrorKind::Cancelled)
    }
}

pub type StageResult<T = ()> = Result<T, StageError>;
