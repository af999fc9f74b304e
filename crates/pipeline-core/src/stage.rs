//! The stage capability set (§4.1): every pipeline stage — input, demuxer,
//! decoder, filter, encoder, muxer, output — exposes `create`/`close`,
//! `config`, `open`, one or more `submit_*`, `flush`, `reset`.
//!
//! ## Re-architecture of the push contract (§9)
//!
//! §9 flags the C source's "upstream holds a `void*` receiver + function
//! pointers" pattern and suggests composing typed receiver handles at
//! chain-assembly time. Because each chain in this design has a fixed,
//! known shape (a `Source` is always `Demuxer -> Decoder -> Filter`; a
//! `Destination` is always `Filter -> Encoder -> Muxer -> Output`), the
//! receiver-callback indirection buys nothing a return value doesn't: a
//! stage's `submit_*` drains zero or more outputs as an owned `Vec`, and
//! the chain owner (`Source`/`Destination`, in the `stages` crate) is the
//! one driving the next stage with them. Reopen propagation (§4.1 "when
//! the emitted descriptor changes, flush;reset;open the downstream") is
//! then just the chain owner comparing the returned descriptor against the
//! one it last saw and issuing the three calls itself — exactly the
//! sequence the spec describes, minus the `void*`/vtable machinery. See
//! DESIGN.md for the fuller rationale.

use frame::{Frame, Packet, Segment};

use crate::error::StageResult;

/// Per-instance lifecycle shared by every stage kind. `create`/`close` are
/// the handle acquire/release pair (§5 resource discipline): `close` is
/// guaranteed on every exit path, including an error inside `open`.
pub trait Lifecycle {
    /// Per-instance setup; called once before any other method.
    fn create(&mut self) -> StageResult {
        Ok(())
    }

    /// Release whatever `create`/`open` acquired. Guaranteed to run on every
    /// exit path.
    fn close(&mut self) -> StageResult {
        Ok(())
    }
}

/// String-to-string configuration (§4.1): unknown keys are an
/// [`ErrorKind::Config`](crate::error::ErrorKind::Config) error, never a
/// silent ignore.
pub trait Configurable {
    fn config(&mut self, key: &str, value: &str) -> StageResult;
}

/// Re-arm for another `open()` after a format change. State after `reset`
/// is equivalent to state just after `create` (§4.1).
pub trait Resettable {
    fn reset(&mut self) -> StageResult;
}

/// Decoder's output: zero or more stamped frames, draining the codec's
/// internal buffering (§4.4 "drain all ready output frames").
pub type Frames = Vec<Frame>;
/// Encoder's/passthrough-encoder's output.
pub type Packets = Vec<Packet>;
/// Muxer's output: usually one `Media` segment, occasionally also an
/// `Init` segment ahead of the first one (§4.7).
pub type Segments = Vec<Segment>;

/// Downstream capability flags a muxer reports back to the encoder (§4.6):
/// whether the container wants codec-private data pushed once up front
/// (`global_headers = true`) versus inline per-packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownstreamCaps {
    pub global_headers: bool,
}

/// How a muxer handles an APIC-equivalent tag (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageMode {
    /// Pass the tag through unchanged.
    Keep,
    /// Embed the image bytes in-container.
    Inband,
    /// Hand the image to the output's picture side-channel and rewrite the
    /// tag as a URL reference (§4.8 item 6).
    #[default]
    OutOfBand,
    Remove,
}
