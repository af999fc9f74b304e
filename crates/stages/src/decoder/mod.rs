//! Decoders (§4.4): wrap codec implementations, turning a stream of
//! [`Packet`]s back into uncompressed [`Frame`]s. `auto` picks a
//! codec-specific decoder by `PacketSource::codec`, falling back to the
//! `passthrough` decoder for anything it doesn't recognise; `pcm` is the
//! one real, fully-working reference codec this rewrite ships (§11 of
//! `SPEC_FULL.md` — codec bindings to external media libraries are out of
//! scope, only the trait boundary they'd implement is defined here).

pub mod auto;
pub mod passthrough;
pub mod pcm;

pub use auto::AutoDecoder;
pub use passthrough::PassthroughDecoder;
pub use pcm::PcmDecoder;

use frame::{FrameSource, Packet, PacketSource};
use pipeline_core::{Frames, StageResult};

/// Contract every decoder implements (§4.4). `submit_packet` stamps each
/// drained frame with an incrementing pts (in samples) before returning it,
/// per the spec's "drain all ready output frames" wording; concrete
/// decoders below do the stamping themselves since the pts counter is
/// decoder-local state.
pub trait Decoder: Send {
    fn name(&self) -> &'static str;

    fn config(&mut self, key: &str, value: &str) -> StageResult;

    /// Prepare an output frame sized for this decoder's native sample
    /// format and return the descriptor the chain owner hands downstream.
    fn open(&mut self, upstream: &PacketSource) -> StageResult<FrameSource>;

    fn submit_packet(&mut self, packet: &Packet) -> StageResult<Frames>;

    /// Drain whatever the codec is still buffering internally.
    fn flush(&mut self) -> StageResult<Frames>;

    /// Re-arm for another `open()`; local pts resets to 0 (§4.1).
    fn reset(&mut self) -> StageResult;

    fn close(&mut self) -> StageResult {
        Ok(())
    }
}

/// A black-box codec decoder implementation (§11 `SPEC_FULL.md`): the seam
/// a real FLAC/AAC/Opus binding would implement. [`PcmDecoder`] is the one
/// concrete implementation shipped here; [`PassthroughDecoder`] is a
/// degenerate non-implementation (it never actually decodes).
pub trait DecoderImpl: Send {
    /// Native sample format this implementation emits.
    fn sample_format(&self) -> samplefmt::SampleFormat;
    /// Decode one packet's worth of compressed bytes into raw interleaved
    /// sample bytes. Returns `None` if the packet didn't yield a complete
    /// frame yet (not needed by `pcm`, present for a real codec's internal
    /// buffering).
    fn decode(&mut self, packet: &Packet) -> StageResult<Option<Vec<u8>>>;
}
