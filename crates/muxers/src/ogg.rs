//! Ogg muxer: one packet per page (§1, §4.7). Page framing, lacing and the
//! non-reflected Ogg CRC-32 are implemented from the public Ogg bitstream
//! spec (RFC 3533); no third-party Ogg crate is pulled in since writing one
//! page per packet needs none of a general-purpose muxing library's
//! packet-spanning logic.

use bytes::{BufMut, Bytes, BytesMut};
use frame::{Packet, PacketSource, Segment, SegmentInfo, SegmentSource};
use pipeline_core::{DownstreamCaps, ImageMode, Segments, StageError, StageResult};
use tagmodel::TagList;

use crate::Muxer;

pub const MEDIA_MIMETYPE: &str = "audio/ogg";

const HEADER_TYPE_CONTINUED: u8 = 0x01;
const HEADER_TYPE_BOS: u8 = 0x02;
const HEADER_TYPE_EOS: u8 = 0x04;

fn crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut r = (i as u32) << 24;
        let mut j = 0;
        while j < 8 {
            r = if r & 0x8000_0000 != 0 { (r << 1) ^ 0x04c1_1db7 } else { r << 1 };
            j += 1;
        }
        table[i] = r;
        i += 1;
    }
    table
}

/// Ogg's CRC-32 variant: non-reflected, initial value 0, no final XOR
/// (distinct from the reflected CRC-32 used by zip/png).
fn ogg_crc32(data: &[u8]) -> u32 {
    let table = crc_table();
    let mut crc: u32 = 0;
    for &b in data {
        crc = (crc << 8) ^ table[(((crc >> 24) as u8) ^ b) as usize];
    }
    crc
}

/// Lacing values (§ RFC 3533 6.): a run of 255s followed by the remainder,
/// with a trailing 0 only when the payload length is itself a multiple of
/// 255 greater than zero so the reader knows the packet actually ended
/// there.
fn segment_table(len: usize) -> Vec<u8> {
    if len == 0 {
        return vec![0];
    }
    let mut table = vec![255u8; len / 255];
    let rem = (len % 255) as u8;
    table.push(rem);
    table
}

fn build_page(serial: u32, sequence: u32, granule: i64, header_type: u8, payload: &[u8]) -> Bytes {
    let segments = segment_table(payload.len());
    let mut out = BytesMut::with_capacity(27 + segments.len() + payload.len());
    out.extend_from_slice(b"OggS");
    out.put_u8(0); // version
    out.put_u8(header_type);
    out.put_i64_le(granule);
    out.put_u32_le(serial);
    out.put_u32_le(sequence);
    let crc_pos = out.len();
    out.put_u32_le(0); // checksum placeholder
    out.put_u8(segments.len() as u8);
    out.extend_from_slice(&segments);
    out.extend_from_slice(payload);

    let crc = ogg_crc32(&out);
    out[crc_pos..crc_pos + 4].copy_from_slice(&crc.to_le_bytes());
    out.freeze()
}

pub struct OggMuxer {
    serial: u32,
    sequence: u32,
    sample_rate: u32,
    image_mode: ImageMode,
    opened: bool,
}

impl Default for OggMuxer {
    fn default() -> Self {
        Self { serial: 1, sequence: 0, sample_rate: 0, image_mode: ImageMode::OutOfBand, opened: false }
    }
}

impl OggMuxer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Muxer for OggMuxer {
    fn name(&self) -> &'static str {
        "ogg"
    }

    fn config(&mut self, key: &str, value: &str) -> StageResult {
        match key {
            "serial" => {
                self.serial = value
                    .parse()
                    .map_err(|_| StageError::config("ogg", format!("invalid serial {value}")))?;
                Ok(())
            }
            "image-mode" => {
                self.image_mode = match value {
                    "keep" => ImageMode::Keep,
                    "inband" => ImageMode::Inband,
                    "out-of-band" => ImageMode::OutOfBand,
                    "remove" => ImageMode::Remove,
                    other => return Err(StageError::config("ogg", format!("unknown image-mode {other}"))),
                };
                Ok(())
            }
            other => Err(StageError::config("ogg", format!("unknown key {other}"))),
        }
    }

    fn downstream_caps(&self) -> DownstreamCaps {
        // Codec-private data (e.g. Vorbis/Opus identification+comment
        // packets) is carried as the first pages, not a separate INIT
        // segment container section.
        DownstreamCaps { global_headers: true }
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
        self.sample_rate = upstream.sample_rate;
        self.sequence = 0;
        self.opened = true;

        let mut segments = Vec::new();
        if !upstream.codec_private_data.is_empty() {
            let page = build_page(self.serial, self.sequence, 0, HEADER_TYPE_BOS, &upstream.codec_private_data);
            self.sequence += 1;
            segments.push(Segment::init(page, MEDIA_MIMETYPE));
        }
        let descriptor = SegmentSource::new(&upstream.codec, upstream.channel_layout, self.sample_rate, upstream.frame_len);
        Ok((descriptor, segments))
    }

    fn submit_packet(&mut self, packet: &Packet) -> StageResult<Segments> {
        if !self.opened {
            return Err(StageError::lifecycle("ogg", "submit_packet before open"));
        }
        let header_type = if self.sequence == 0 { HEADER_TYPE_BOS } else { 0 };
        let page = build_page(self.serial, self.sequence, packet.pts + packet.duration as i64, header_type, &packet.bytes);
        self.sequence += 1;
        Ok(vec![Segment::media(page, MEDIA_MIMETYPE, packet.duration)])
    }

    fn submit_tags(&mut self, _tags: &TagList) -> StageResult<Segments> {
        Ok(Vec::new())
    }

    fn flush(&mut self) -> StageResult<Segments> {
        Ok(Vec::new())
    }

    fn reset(&mut self) -> StageResult {
        self.opened = false;
        self.sequence = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes as B;

    #[test]
    fn page_starts_with_oggs_magic() {
        let mut m = OggMuxer::new();
        let src = PacketSource::new("vorbis", 0b11, 44100, 1024);
        m.open(&src).unwrap();
        let packet = Packet::new(B::from_static(b"vorbis-packet"), 1024, 0, 44100, true);
        let segs = m.submit_packet(&packet).unwrap();
        assert!(segs[0].bytes.starts_with(b"OggS"));
    }

    #[test]
    fn sequence_increments_per_page() {
        let mut m = OggMuxer::new();
        let src = PacketSource::new("vorbis", 0b11, 44100, 1024);
        m.open(&src).unwrap();
        let packet = Packet::new(B::from_static(b"a"), 1024, 0, 44100, true);
        m.submit_packet(&packet).unwrap();
        m.submit_packet(&packet).unwrap();
        assert_eq!(m.sequence, 2);
    }

    #[test]
    fn codec_private_data_becomes_init_page() {
        let mut m = OggMuxer::new();
        let src = PacketSource::new("vorbis", 0b11, 44100, 1024)
            .with_codec_private_data(bytes::Bytes::from_static(b"vorbis-header"));
        let (_d, segs) = m.open(&src).unwrap();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].kind, frame::SegmentKind::Init);
        assert!(segs[0].bytes.windows(13).any(|w| w == b"vorbis-header"));
    }

    #[test]
    fn segment_table_handles_exact_multiple_of_255() {
        assert_eq!(segment_table(0), vec![0]);
        assert_eq!(segment_table(10), vec![10]);
        assert_eq!(segment_table(255), vec![255, 0]);
        assert_eq!(segment_table(256), vec![255, 1]);
    }

    #[test]
    fn crc_is_deterministic_and_order_sensitive() {
        let a = ogg_crc32(b"hello world");
        let b = ogg_crc32(b"hello world");
        let c = ogg_crc32(b"world hello");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
