//! # Frame, Packet and the stage-to-stage descriptors
//!
//! `Frame` is the uncompressed unit that flows source-side (decoder -> filter
//! -> rendezvous -> filter -> encoder); `Packet` is the compressed unit that
//! flows on both sides of a codec boundary (demuxer -> decoder, encoder ->
//! muxer). `Descriptor` is the immutable "here's what I emit" record a stage
//! publishes once at `open()`, and is the only thing downstream consults to
//! configure itself — never a cast or an inspect of internal stage state.
//!
//! ## License
//!
//! MIT License
//!
//! ## Authors
//!
//! - hua0512
//!

use bytes::Bytes;
use samplefmt::SampleFormat;

/// A compressed audio unit produced by a demuxer or an encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub bytes: Bytes,
    /// Duration in samples.
    pub duration: u64,
    /// Presentation timestamp, in samples at `sample_rate`.
    pub pts: i64,
    pub sample_rate: u32,
    /// Keyframe-equivalent: independently decodable.
    pub sync_flag: bool,
}

impl Packet {
    pub fn new(bytes: Bytes, duration: u64, pts: i64, sample_rate: u32, sync_flag: bool) -> Self {
        Self { bytes, duration, pts, sample_rate, sync_flag }
    }
}

/// Per-channel sample storage, matching the format's interleaved/planar/binary
/// split (§3 Frame invariants).
#[derive(Debug, Clone, PartialEq)]
pub enum FrameStorage {
    /// One buffer, `duration * channels * sample_size` bytes.
    Interleaved(Vec<u8>),
    /// `channels` buffers, each `duration * sample_size` bytes.
    Planar(Vec<Vec<u8>>),
    /// No sample storage; the compressed payload lives in `Frame::packet`.
    Binary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Interleaved buffer length didn't match `duration * channels * sample_size`.
    BadInterleavedLength { expected: usize, actual: usize },
    /// Planar buffer count didn't match `channels`, or a buffer's length didn't
    /// match `duration * sample_size`.
    BadPlanarLayout,
    /// `SampleFormat::Binary` was paired with non-empty storage, or a non-binary
    /// format was paired with `FrameStorage::Binary`.
    StorageFormatMismatch,
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::BadInterleavedLength { expected, actual } => {
                write!(f, "interleaved buffer length {actual} does not match expected {expected}")
            }
            FrameError::BadPlanarLayout => write!(f, "planar channel buffers do not match channels/duration"),
            FrameError::StorageFormatMismatch => write!(f, "sample format and storage kind disagree"),
        }
    }
}

impl std::error::Error for FrameError {}

/// An uncompressed audio buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub format: SampleFormat,
    pub channels: u32,
    /// Duration in samples (per channel).
    pub duration: u64,
    pub sample_rate: u32,
    /// Presentation timestamp, in samples at `sample_rate`.
    pub pts: i64,
    storage: FrameStorage,
    /// Only populated on the passthrough path, where `format == Binary`.
    packet: Option<Packet>,
}

impl Frame {
    /// Build an interleaved frame, validating the buffer length against
    /// `duration * channels * format.size()` (§8 P1).
    pub fn new_interleaved(
        format: SampleFormat,
        channels: u32,
        duration: u64,
        sample_rate: u32,
        pts: i64,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        if format == SampleFormat::Binary || format == SampleFormat::Unknown {
            return Err(FrameError::StorageFormatMismatch);
        }
        let expected = duration as usize * channels as usize * format.size();
        if data.len() != expected {
            return Err(FrameError::BadInterleavedLength { expected, actual: data.len() });
        }
        Ok(Self {
            format,
            channels,
            duration,
            sample_rate,
            pts,
            storage: FrameStorage::Interleaved(data),
            packet: None,
        })
    }

    /// Build a planar frame, validating that there are exactly `channels`
    /// buffers each sized `duration * format.size()` (§8 P1).
    pub fn new_planar(
        format: SampleFormat,
        channels: u32,
        duration: u64,
        sample_rate: u32,
        pts: i64,
        data: Vec<Vec<u8>>,
    ) -> Result<Self, FrameError> {
        if format == SampleFormat::Binary || format == SampleFormat::Unknown {
            return Err(FrameError::StorageFormatMismatch);
        }
        let expected_len = duration as usize * format.size();
        if data.len() != channels as usize || data.iter().any(|c| c.len() != expected_len) {
            return Err(FrameError::BadPlanarLayout);
        }
        Ok(Self {
            format,
            channels,
            duration,
            sample_rate,
            pts,
            storage: FrameStorage::Planar(data),
            packet: None,
        })
    }

    /// Build a passthrough frame wrapping a compressed packet; storage is
    /// empty and `format` is fixed to `Binary`.
    pub fn new_binary(channels: u32, sample_rate: u32, pts: i64, packet: Packet) -> Self {
        Self {
            format: SampleFormat::Binary,
            channels,
            duration: packet.duration,
            sample_rate,
            pts,
            storage: FrameStorage::Binary,
            packet: Some(packet),
        }
    }

    pub fn storage(&self) -> &FrameStorage {
        &self.storage
    }

    pub fn is_binary(&self) -> bool {
        matches!(self.storage, FrameStorage::Binary)
    }

    /// The wrapped passthrough packet, if any.
    pub fn packet(&self) -> Option<&Packet> {
        self.packet.as_ref()
    }

    /// The single interleaved buffer, if this frame is interleaved.
    pub fn interleaved(&self) -> Option<&[u8]> {
        match &self.storage {
            FrameStorage::Interleaved(b) => Some(b),
            _ => None,
        }
    }

    /// One channel's buffer, if this frame is planar.
    pub fn channel(&self, index: usize) -> Option<&[u8]> {
        match &self.storage {
            FrameStorage::Planar(c) => c.get(index).map(Vec::as_slice),
            _ => None,
        }
    }

    /// Total buffered sample bytes across all channels (§8 P1): for
    /// interleaved, `sampleSize*channels*duration`; for planar, the same sum
    /// spread across `channels` buffers; `0` for binary.
    pub fn buffered_bytes(&self) -> usize {
        match &self.storage {
            FrameStorage::Interleaved(b) => b.len(),
            FrameStorage::Planar(c) => c.iter().map(Vec::len).sum(),
            FrameStorage::Binary => 0,
        }
    }
}

/// Immutable "what I emit" record published by a stage at `open()` time. The
/// same shape serves packet-emitting, frame-emitting and segment-emitting
/// stages (`codec`, `channel_layout`, `sample_rate`, `frame_len`, `profile`,
/// codec-private-data, `padding`, `roll_distance`); downstream only ever
/// reads this, never a concrete stage type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    pub codec: String,
    /// Bit-mask channel layout (one bit set per channel position).
    pub channel_layout: u64,
    pub sample_rate: u32,
    pub frame_len: u32,
    /// Stored as `profile+1` so `0` reads as "unset" (§9 open question);
    /// use [`StreamDescriptor::profile`]/[`StreamDescriptor::set_profile`]
    /// rather than touching this directly.
    profile_plus_one: i32,
    pub codec_private_data: Bytes,
    pub padding: u32,
    /// Negative = pre-roll samples required before this stream decodes
    /// correctly.
    pub roll_distance: i32,
}

impl StreamDescriptor {
    pub fn new(codec: impl Into<String>, channel_layout: u64, sample_rate: u32, frame_len: u32) -> Self {
        Self {
            codec: codec.into(),
            channel_layout,
            sample_rate,
            frame_len,
            profile_plus_one: 0,
            codec_private_data: Bytes::new(),
            padding: 0,
            roll_distance: 0,
        }
    }

    pub fn channels(&self) -> u32 {
        self.channel_layout.count_ones()
    }

    /// `None` means unset, matching the original's "0 means unset" convention.
    pub fn profile(&self) -> Option<i32> {
        if self.profile_plus_one == 0 {
            None
        } else {
            Some(self.profile_plus_one - 1)
        }
    }

    pub fn set_profile(&mut self, profile: Option<i32>) {
        self.profile_plus_one = profile.map_or(0, |p| p + 1);
    }

    pub fn with_profile(mut self, profile: Option<i32>) -> Self {
        self.set_profile(profile);
        self
    }

    pub fn with_codec_private_data(mut self, data: Bytes) -> Self {
        self.codec_private_data = data;
        self
    }

    pub fn with_padding(mut self, padding: u32) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_roll_distance(mut self, roll_distance: i32) -> Self {
        self.roll_distance = roll_distance;
        self
    }

    /// Whether this descriptor would invalidate a downstream opened against
    /// `self` (§4.1): channel-layout or sample-rate changed. Sample-format
    /// changes alone never trigger this — the caller checks those separately,
    /// since `StreamDescriptor` doesn't carry a sample format.
    pub fn requires_downstream_reopen(&self, new: &StreamDescriptor) -> bool {
        self.channel_layout != new.channel_layout || self.sample_rate != new.sample_rate
    }
}

/// Descriptor published by a packet-emitting stage (demuxer, passthrough
/// encoder).
pub type PacketSource = StreamDescriptor;
/// Descriptor published by a frame-emitting stage (decoder, filter).
pub type FrameSource = StreamDescriptor;
/// Descriptor published by a segment-emitting stage (muxer).
pub type SegmentSource = StreamDescriptor;

/// Negotiated segment sizing a muxer reports back to the encoder via
/// `get_segment_info(time_base, frame_len)` (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentInfo {
    pub segment_duration_ms: u64,
    pub packets_per_segment: u32,
}

/// Whether a [`Segment`] is the one-time container initialization chunk or
/// an ordinary media chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Init,
    Media,
}

/// A container-format media chunk produced by a muxer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub bytes: Bytes,
    /// MIME type of `bytes`, used for `write`'s `Content-Type` and for the
    /// HLS engine's picture-extension derivation when this carries an
    /// out-of-band image instead of audio.
    pub mime: String,
    /// Duration in samples; `0` for INIT segments.
    pub duration: u64,
}

impl Segment {
    pub fn init(bytes: Bytes, mime: impl Into<String>) -> Self {
        Self { kind: SegmentKind::Init, bytes, mime: mime.into(), duration: 0 }
    }

    pub fn media(bytes: Bytes, mime: impl Into<String>, duration: u64) -> Self {
        Self { kind: SegmentKind::Media, bytes, mime: mime.into(), duration }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaved_buffer_size_invariant() {
        // P1: sampleSize(F)*C*N bytes for an interleaved buffer.
        let frame =
            Frame::new_interleaved(SampleFormat::S16, 2, 10, 48000, 0, vec![0u8; 2 * 2 * 10]).unwrap();
        assert_eq!(frame.buffered_bytes(), SampleFormat::S16.size() * 2 * 10);
    }

    #[test]
    fn planar_buffer_size_invariant() {
        // P1: sampleSize(F)*N bytes per planar channel.
        let data = vec![vec![0u8; 4 * 10]; 2];
        let frame = Frame::new_planar(SampleFormat::S32Planar, 2, 10, 48000, 0, data).unwrap();
        assert_eq!(frame.channel(0).unwrap().len(), SampleFormat::S32Planar.size() * 10);
        assert_eq!(frame.buffered_bytes(), SampleFormat::S32Planar.size() * 2 * 10);
    }

    #[test]
    fn interleaved_length_mismatch_rejected() {
        let err = Frame::new_interleaved(SampleFormat::S16, 2, 10, 48000, 0, vec![0u8; 5]).unwrap_err();
        assert!(matches!(err, FrameError::BadInterleavedLength { .. }));
    }

    #[test]
    fn planar_channel_count_mismatch_rejected() {
        let data = vec![vec![0u8; 4]; 1];
        let err = Frame::new_planar(SampleFormat::S32Planar, 2, 1, 48000, 0, data).unwrap_err();
        assert_eq!(err, FrameError::BadPlanarLayout);
    }

    #[test]
    fn binary_frame_has_no_storage() {
        let packet = Packet::new(Bytes::from_static(b"abc"), 1024, 0, 44100, true);
        let frame = Frame::new_binary(2, 44100, 0, packet);
        assert!(frame.is_binary());
        assert_eq!(frame.buffered_bytes(), 0);
        assert!(frame.packet().is_some());
    }

    #[test]
    fn profile_unset_roundtrip() {
        let d = StreamDescriptor::new("aac", 0b11, 44100, 1024);
        assert_eq!(d.profile(), None);
        let d = d.with_profile(Some(1));
        assert_eq!(d.profile(), Some(1));
        assert_eq!(d.channels(), 2);
    }

    #[test]
    fn reopen_triggers_on_rate_or_layout_change_only() {
        let a = StreamDescriptor::new("pcm", 0b11, 44100, 1024);
        let same_rate_layout = StreamDescriptor::new("pcm", 0b11, 44100, 1024);
        assert!(!a.requires_downstream_reopen(&same_rate_layout));
        let new_rate = StreamDescriptor::new("pcm", 0b11, 48000, 1024);
        assert!(a.requires_downstream_reopen(&new_rate));
        let new_layout = StreamDescriptor::new("pcm", 0b111, 44100, 1024);
        assert!(a.requires_downstream_reopen(&new_layout));
    }
}
