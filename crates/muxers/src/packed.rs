//! Packed-audio muxer: headerless concatenation of packet bytes (e.g.
//! MP3/AC3, which carry their own per-frame sync headers already), no
//! container framing added or INIT segment emitted (§1, §4.7).

use frame::{Packet, PacketSource, Segment, SegmentInfo, SegmentSource};
use pipeline_core::{DownstreamCaps, ImageMode, Segments, StageError, StageResult};
use tagmodel::TagList;

use crate::Muxer;

pub const MEDIA_MIMETYPE: &str = "audio/mpeg";

pub struct PackedMuxer {
    codec: String,
    sample_rate: u32,
    mime: String,
    image_mode: ImageMode,
    opened: bool,
}

impl Default for PackedMuxer {
    fn default() -> Self {
        Self {
            codec: String::new(),
            sample_rate: 0,
            mime: MEDIA_MIMETYPE.to_string(),
            image_mode: ImageMode::OutOfBand,
            opened: false,
        }
    }
}

impl PackedMuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mimetype falls through to whatever the codec implies; §9's open
    /// question notes this is also how the icecast output picks its
    /// `Content-Type` unless overridden.
    fn mime_for_codec(codec: &str) -> &'static str {
        match codec {
            "mp3" => "audio/mpeg",
            "ac3" | "eac3" => "audio/ac3",
            _ => MEDIA_MIMETYPE,
        }
    }
}

impl Muxer for PackedMuxer {
    fn name(&self) -> &'static str {
        "packed"
    }

    fn config(&mut self, key: &str, value: &str) -> StageResult {
        match key {
            "image-mode" => {
                self.image_mode = match value {
                    "keep" => ImageMode::Keep,
                    "inband" => ImageMode::Inband,
                    "out-of-band" => ImageMode::OutOfBand,
                    "remove" => ImageMode::Remove,
                    other => return Err(StageError::config("packed", format!("unknown image-mode {other}"))),
                };
                Ok(())
            }
            other => Err(StageError::config("packed", format!("unknown key {other}"))),
        }
    }

    fn downstream_caps(&self) -> DownstreamCaps {
        DownstreamCaps { global_headers: false }
    }

    fn image_mode(&self) -> ImageMode {
        self.image_mode
    }

    fn segment_info(&self, time_base: u32, frame_len: u32) -> SegmentInfo {
        let frame_len = frame_len.max(1);
        SegmentInfo {
            segment_duration_ms: (frame_len as u64 * 1000) / time_base.max(1) as u64,
            packets_per_segment: 1,
        }
    }

    fn open(&mut self, upstream: &PacketSource) -> StageResult<(SegmentSource, Segments)> {
        self.codec = upstream.codec.clone();
        self.sample_rate = upstream.sample_rate;
        self.mime = Self::mime_for_codec(&self.codec).to_string();
        self.opened = true;
        let descriptor = SegmentSource::new(&self.codec, upstream.channel_layout, self.sample_rate, upstream.frame_len);
        Ok((descriptor, Vec::new()))
    }

    fn submit_packet(&mut self, packet: &Packet) -> StageResult<Segments> {
        if !self.opened {
            return Err(StageError::lifecycle("packed", "submit_packet before open"));
        }
        Ok(vec![Segment::media(packet.bytes.clone(), self.mime.clone(), packet.duration)])
    }

    fn submit_tags(&mut self, _tags: &TagList) -> StageResult<Segments> {
        Ok(Vec::new())
    }

    fn flush(&mut self) -> StageResult<Segments> {
        Ok(Vec::new())
    }

    fn reset(&mut self) -> StageResult {
        self.opened = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn packet_bytes_pass_through_unchanged() {
        let mut m = PackedMuxer::new();
        let src = PacketSource::new("mp3", 0b11, 44100, 1152);
        m.open(&src).unwrap();
        let packet = Packet::new(Bytes::from_static(b"mp3-frame-bytes"), 1152, 0, 44100, true);
        let segs = m.submit_packet(&packet).unwrap();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].bytes, packet.bytes);
        assert_eq!(segs[0].mime, "audio/mpeg");
    }

    #[test]
    fn mime_falls_through_per_codec() {
        let mut m = PackedMuxer::new();
        let src = PacketSource::new("ac3", 0b11, 48000, 1536);
        m.open(&src).unwrap();
        assert_eq!(m.mime, "audio/ac3");
    }

    #[test]
    fn open_emits_no_init_segment() {
        let mut m = PackedMuxer::new();
        let src = PacketSource::new("mp3", 0b11, 44100, 1152);
        let (_d, segs) = m.open(&src).unwrap();
        assert!(segs.is_empty());
    }
}
