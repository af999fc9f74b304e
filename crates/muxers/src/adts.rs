//! ADTS muxer: wraps each packet in a 7-byte ADTS header (no CRC), a
//! headers-per-frame container with no separate INIT segment (§1, §4.7).

use bytes::{BufMut, Bytes, BytesMut};
use frame::{Packet, PacketSource, Segment, SegmentInfo, SegmentSource};
use pipeline_core::{DownstreamCaps, ImageMode, Segments, StageError, StageResult};
use tagmodel::TagList;

use crate::Muxer;

pub const MEDIA_MIMETYPE: &str = "audio/aac";

const ADTS_HEADER_LEN: usize = 7;

/// MPEG-4 sampling-frequency-index table (`samplefreq_index` in the ADTS
/// header). `None` for rates the table doesn't cover.
fn sampling_frequency_index(rate: u32) -> Option<u8> {
    const TABLE: [u32; 13] =
        [96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350];
    TABLE.iter().position(|&r| r == rate).map(|i| i as u8)
}

pub struct AdtsMuxer {
    sample_rate: u32,
    freq_index: u8,
    channels: u32,
    profile: u8,
    image_mode: ImageMode,
    opened: bool,
}

impl Default for AdtsMuxer {
    fn default() -> Self {
        Self {
            sample_rate: 0,
            freq_index: 4, // 44100, overwritten at open
            channels: 0,
            profile: 1, // AAC-LC (object type 2) minus 1
            image_mode: ImageMode::OutOfBand,
            opened: false,
        }
    }
}

impl AdtsMuxer {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_header(&self, out: &mut BytesMut, frame_len: usize) {
        let aac_frame_length = (ADTS_HEADER_LEN + frame_len) as u32;
        out.put_u8(0xFF);
        out.put_u8(0xF1); // MPEG-4, layer 00, protection_absent=1
        let byte3 = (self.profile & 0x3) << 6 | (self.freq_index & 0xF) << 2 | ((self.channels as u8 >> 2) & 0x1);
        out.put_u8(byte3);
        let byte4 = ((self.channels as u8 & 0x3) << 6) | ((aac_frame_length >> 11) & 0x3) as u8;
        out.put_u8(byte4);
        out.put_u8(((aac_frame_length >> 3) & 0xFF) as u8);
        let byte6 = (((aac_frame_length & 0x7) as u8) << 5) | 0x1F; // buffer_fullness high bits = 1
        out.put_u8(byte6);
        out.put_u8(0xFC); // buffer_fullness low bits + number_of_raw_data_blocks=0
    }
}

impl Muxer for AdtsMuxer {
    fn name(&self) -> &'static str {
        "adts"
    }

    fn config(&mut self, key: &str, value: &str) -> StageResult {
        match key {
            "image-mode" => {
                self.image_mode = match value {
                    "keep" => ImageMode::Keep,
                    "inband" => ImageMode::Inband,
                    "out-of-band" => ImageMode::OutOfBand,
                    "remove" => ImageMode::Remove,
                    other => return Err(StageError::config("adts", format!("unknown image-mode {other}"))),
                };
                Ok(())
            }
            other => Err(StageError::config("adts", format!("unknown key {other}"))),
        }
    }

    fn downstream_caps(&self) -> DownstreamCaps {
        // Every ADTS frame repeats its own header; no separate global
        // headers needed up front.
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
        let Some(freq_index) = sampling_frequency_index(upstream.sample_rate) else {
            return Err(StageError::format(
                "adts",
                format!("sample rate {} has no ADTS sampling-frequency-index", upstream.sample_rate),
            ));
        };
        self.sample_rate = upstream.sample_rate;
        self.freq_index = freq_index;
        self.channels = upstream.channels();
        self.profile = upstream.profile().unwrap_or(1) as u8;
        self.opened = true;
        let descriptor = SegmentSource::new("aac", upstream.channel_layout, self.sample_rate, upstream.frame_len);
        Ok((descriptor, Vec::new()))
    }

    fn submit_packet(&mut self, packet: &Packet) -> StageResult<Segments> {
        if !self.opened {
            return Err(StageError::lifecycle("adts", "submit_packet before open"));
        }
        let mut out = BytesMut::with_capacity(ADTS_HEADER_LEN + packet.bytes.len());
        self.write_header(&mut out, packet.bytes.len());
        out.extend_from_slice(&packet.bytes);
        Ok(vec![Segment::media(Bytes::from(out), MEDIA_MIMETYPE, packet.duration)])
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

    #[test]
    fn open_rejects_unsupported_sample_rate() {
        let mut m = AdtsMuxer::new();
        let src = PacketSource::new("aac", 0b11, 44099, 1024);
        assert!(m.open(&src).is_err());
    }

    #[test]
    fn open_emits_no_init_segment() {
        let mut m = AdtsMuxer::new();
        let src = PacketSource::new("aac", 0b11, 44100, 1024);
        let (_descriptor, segs) = m.open(&src).unwrap();
        assert!(segs.is_empty());
    }

    #[test]
    fn frame_is_header_plus_payload() {
        let mut m = AdtsMuxer::new();
        let src = PacketSource::new("aac", 0b11, 48000, 1024);
        m.open(&src).unwrap();
        let packet = Packet::new(Bytes::from_static(b"raw-aac-bytes"), 1024, 0, 48000, true);
        let segs = m.submit_packet(&packet).unwrap();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].bytes.len(), ADTS_HEADER_LEN + packet.bytes.len());
        assert_eq!(segs[0].bytes[0], 0xFF);
        assert_eq!(segs[0].bytes[1] & 0xF0, 0xF0);
        assert!(segs[0].bytes.ends_with(b"raw-aac-bytes"));
    }

    #[test]
    fn sampling_frequency_table_matches_known_rates() {
        assert_eq!(sampling_frequency_index(96000), Some(0));
        assert_eq!(sampling_frequency_index(44100), Some(4));
        assert_eq!(sampling_frequency_index(7350), Some(12));
        assert_eq!(sampling_frequency_index(12345), None);
    }
}
