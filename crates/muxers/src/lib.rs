//! # Muxers: Packet stream -> container Segment stream
//!
//! Four container muxers (§1, §4.7): fragmented MP4 (`fmp4`), raw ADTS
//! (`adts`), "packed audio" (headerless concatenation, e.g. MP3/AC3) and
//! Ogg (`ogg`), all behind the [`Muxer`] trait.
//!
//! ## License
//!
//! MIT License
//!
//! ## Authors
//!
//! - hua0512
//!

pub mod adts;
pub mod box_writer;
pub mod fmp4;
pub mod ogg;
pub mod packed;

use frame::{Packet, PacketSource, Segment, SegmentInfo, SegmentSource};
use pipeline_core::{DownstreamCaps, ImageMode, Segments, StageResult};
use tagmodel::TagList;

/// Converts a stream of [`Packet`]s into a stream of container [`Segment`]s
/// (§4.7). `submit_packet`/`flush` return zero or more segments, per the
/// return-value re-architecture of the push contract (see
/// `pipeline_core::stage` module docs).
pub trait Muxer: Send {
    fn name(&self) -> &'static str;

    fn config(&mut self, key: &str, value: &str) -> StageResult;

    /// Capabilities this muxer reports upstream to the encoder (§4.6).
    fn downstream_caps(&self) -> DownstreamCaps;

    /// How an out-of-band picture tag is handled (§4.7 `image_mode`).
    fn image_mode(&self) -> ImageMode;

    /// Negotiated segment length/packet count the upstream chain sizes
    /// itself against (§4.7 `get_segment_info`).
    fn segment_info(&self, time_base: u32, frame_len: u32) -> SegmentInfo;

    /// Wire up against the encoder's descriptor; returns this muxer's own
    /// emitted descriptor (container codec id, same channel/rate) plus any
    /// INIT segment produced at open time (e.g. fMP4's `moov`).
    fn open(&mut self, upstream: &PacketSource) -> StageResult<(SegmentSource, Segments)>;

    fn submit_packet(&mut self, packet: &Packet) -> StageResult<Segments>;

    fn submit_tags(&mut self, tags: &TagList) -> StageResult<Segments>;

    /// Drain to EOS; MUST NOT flush the downstream output (§4.1).
    fn flush(&mut self) -> StageResult<Segments>;

    fn reset(&mut self) -> StageResult;

    fn close(&mut self) -> StageResult {
        Ok(())
    }
}
