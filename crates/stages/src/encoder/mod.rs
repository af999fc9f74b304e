//! Encoders (§4.6): compress [`Frame`]s into [`Packet`]s. `pcm` is the one
//! real codec this rewrite ships end-to-end (§11 `SPEC_FULL.md`);
//! `passthrough` forwards an already-compressed `Frame::Binary` payload
//! unchanged. A real FLAC/AAC/Opus encoder binding is a third, not-written
//! implementation of the same [`Encoder`] trait.

pub mod passthrough;
pub mod pcm;

pub use passthrough::PassthroughEncoder;
pub use pcm::PcmEncoder;

use frame::{Frame, FrameSource, PacketSource};
use pipeline_core::{DownstreamCaps, Packets, StageResult};
use samplefmt::SampleFormat;

/// Contract every encoder implements (§4.6).
pub trait Encoder: Send {
    fn name(&self) -> &'static str;

    fn config(&mut self, key: &str, value: &str) -> StageResult;

    /// Sample formats this codec can natively encode, in the codec's own
    /// preference order (used as the fallback ranking by
    /// [`choose_format`]).
    fn supported_formats(&self) -> &'static [SampleFormat];

    /// Wire up against the upstream descriptor and the muxer's reported
    /// capabilities (e.g. `GLOBAL_HEADERS`); returns the descriptor this
    /// encoder emits, codec-private data included when the codec has any.
    fn open(&mut self, upstream: &FrameSource, downstream_caps: DownstreamCaps) -> StageResult<PacketSource>;

    fn submit_frame(&mut self, frame: Frame) -> StageResult<Packets>;

    /// Drain to EOS: a tail-only call that emits the last, possibly short,
    /// frame (§4.6).
    fn flush(&mut self) -> StageResult<Packets>;

    fn reset(&mut self) -> StageResult;

    fn close(&mut self) -> StageResult {
        Ok(())
    }
}

/// A black-box codec encoder implementation (§11 `SPEC_FULL.md`).
pub trait EncoderImpl: Send {
    fn open(&mut self, config: &[(String, String)], downstream_caps: DownstreamCaps) -> StageResult<PacketSource>;
    fn encode(&mut self, frame: &Frame) -> StageResult<Packets>;
    fn flush(&mut self) -> StageResult<Packets>;
}

fn base_kind(f: SampleFormat) -> Option<u8> {
    use SampleFormat::*;
    match f {
        U8 | U8Planar => Some(0),
        S16 | S16Planar => Some(1),
        S32 | S32Planar => Some(2),
        S64 | S64Planar => Some(3),
        F32 | F32Planar => Some(4),
        F64 | F64Planar => Some(5),
        Unknown | Binary => None,
    }
}

/// Pick a compatible output sample format from a codec's supported list
/// (§4.6): exact match first, then a planar/interleaved sibling of the
/// same element type, then the highest-precision format in the list.
pub fn choose_format(supported: &[SampleFormat], incoming: SampleFormat) -> SampleFormat {
    if supported.contains(&incoming) {
        return incoming;
    }
    if let Some(sibling) = supported
        .iter()
        .copied()
        .find(|f| f.is_planar() != incoming.is_planar() && base_kind(*f) == base_kind(incoming))
    {
        return sibling;
    }
    supported.iter().copied().max_by_key(|f| f.size()).unwrap_or(incoming)
}

#[cfg(test)]
mod tests {
    use super::*;
    use SampleFormat::*;

    #[test]
    fn exact_match_preferred() {
        let supported = [S16, F32];
        assert_eq!(choose_format(&supported, F32), F32);
    }

    #[test]
    fn planar_sibling_preferred_over_fallback() {
        let supported = [S16Planar, F64];
        assert_eq!(choose_format(&supported, S16), S16Planar);
    }

    #[test]
    fn falls_back_to_highest_precision() {
        let supported = [S16, S32];
        assert_eq!(choose_format(&supported, F32), S32);
    }
}
