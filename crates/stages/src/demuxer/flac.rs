//! Native FLAC demuxer (§4.3): parses the `STREAMINFO` and
//! `VORBIS_COMMENT` metadata blocks, then frame-sync-scans the audio data.
//! Decoding FLAC frames is out of scope (codec bindings are a black box,
//! §1) — packets carry the still-compressed frame bytes with
//! `codec="flac"` for a passthrough decoder to wrap.

use bitstream::BitReader;
use bytes::Bytes;
use frame::{PacketSource, Packet};
use pipeline_core::{Packets, StageError, StageResult};
use tagmodel::{Tag, TagList};

use super::{Demuxer, ReadBuf, RunStatus};
use crate::input::Input;

const BLOCK_STREAMINFO: u8 = 0;
const BLOCK_VORBIS_COMMENT: u8 = 4;

#[derive(Default, Clone, Copy)]
struct StreamInfo {
    min_block_size: u16,
    max_block_size: u16,
    sample_rate: u32,
    channels: u32,
}

pub struct FlacDemuxer {
    info: StreamInfo,
    pts: i64,
    pending_tags: TagList,
    buf: ReadBuf,
    carry: Vec<u8>,
    done: bool,
}

impl Default for FlacDemuxer {
    fn default() -> Self {
        Self {
            info: StreamInfo::default(),
            pts: 0,
            pending_tags: TagList::new(),
            buf: ReadBuf::new(),
            carry: Vec::new(),
            done: false,
        }
    }
}

impl FlacDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_streaminfo(bytes: &[u8]) -> StageResult<StreamInfo> {
        if bytes.len() < 18 {
            return Err(StageError::format("demuxer.flac", "STREAMINFO block too short"));
        }
        let min_block_size = u16::from_be_bytes([bytes[0], bytes[1]]);
        let max_block_size = u16::from_be_bytes([bytes[2], bytes[3]]);
        let mut r = BitReader::new(&bytes[10..18]);
        let sample_rate = r.read(20) as u32;
        let channels = r.read(3) as u32 + 1;
        let _bits_per_sample = r.read(5) as u32 + 1;
        Ok(StreamInfo { min_block_size, max_block_size, sample_rate, channels })
    }

    fn parse_vorbis_comment(bytes: &[u8], tags: &mut TagList) {
        let mut pos = 0usize;
        let read_u32le = |b: &[u8], at: usize| -> Option<u32> {
            b.get(at..at + 4).map(|s| u32::from_le_bytes([s[0], s[1], s[2], s[3]]))
        };
        let Some(vendor_len) = read_u32le(bytes, pos) else { return };
        pos += 4 + vendor_len as usize;
        let Some(count) = read_u32le(bytes, pos) else { return };
        pos += 4;
        for _ in 0..count {
            let Some(len) = read_u32le(bytes, pos) else { break };
            pos += 4;
            let Some(entry) = bytes.get(pos..pos + len as usize) else { break };
            pos += len as usize;
            let text = String::from_utf8_lossy(entry);
            if let Some((key, value)) = text.split_once('=') {
                tags.push(Tag::new(key.to_ascii_lowercase(), value.as_bytes().to_vec(), 0));
            }
        }
    }

    /// Position of the next FLAC frame sync code (`0xFF` followed by a
    /// byte whose top six bits are `111110`) at or after `from`.
    fn find_sync(data: &[u8], from: usize) -> Option<usize> {
        let mut i = from;
        while i + 1 < data.len() {
            match memchr::memchr(0xFF, &data[i..data.len() - 1]) {
                Some(rel) => {
                    let pos = i + rel;
                    if data[pos + 1] & 0xFC == 0xF8 {
                        return Some(pos);
                    }
                    i = pos + 1;
                }
                None => return None,
            }
        }
        None
    }
}

impl Demuxer for FlacDemuxer {
    fn name(&self) -> &'static str {
        "flac"
    }

    fn config(&mut self, key: &str, _value: &str) -> StageResult {
        Err(StageError::config("demuxer.flac", format!("unknown key {key}")))
    }

    fn open(&mut self, input: &mut dyn Input) -> StageResult<PacketSource> {
        self.buf.ensure(input, 4)?;
        if self.buf.available().starts_with(b"fLaC") {
            self.buf.consume(4);
        }

        loop {
            self.buf.ensure(input, 4)?;
            let header = self.buf.available();
            if header.len() < 4 {
                return Err(StageError::format("demuxer.flac", "truncated metadata block header"));
            }
            let last = header[0] & 0x80 != 0;
            let block_type = header[0] & 0x7F;
            let len = u32::from_be_bytes([0, header[1], header[2], header[3]]) as usize;
            self.buf.consume(4);
            self.buf.ensure(input, len)?;
            let body = self.buf.available()[..len.min(self.buf.available().len())].to_vec();
            self.buf.consume(len);

            match block_type {
                BLOCK_STREAMINFO => self.info = Self::parse_streaminfo(&body)?,
                BLOCK_VORBIS_COMMENT => Self::parse_vorbis_comment(&body, &mut self.pending_tags),
                _ => {}
            }
            if last {
                break;
            }
        }

        self.pts = 0;
        let frame_len = if self.info.min_block_size == self.info.max_block_size {
            self.info.max_block_size as u32
        } else {
            self.info.max_block_size as u32
        };
        let channel_layout = if self.info.channels == 0 { 0b11 } else { (1u64 << self.info.channels) - 1 };
        Ok(PacketSource::new("flac", channel_layout, self.info.sample_rate, frame_len))
    }

    fn run(&mut self, input: &mut dyn Input) -> StageResult<(RunStatus, Packets)> {
        if self.done {
            return Ok((RunStatus::EndOfStream, Vec::new()));
        }
        // Pull the whole remaining stream into `carry` progressively; frame
        // boundaries aren't self-delimiting so we need two-sync lookahead.
        self.buf.ensure(input, 8192)?;
        self.carry.extend_from_slice(self.buf.available());
        self.buf.consume(self.buf.available().len());

        let Some(start) = Self::find_sync(&self.carry, 0) else {
            if self.buf.is_eof() {
                self.done = true;
                return Ok((RunStatus::EndOfStream, Vec::new()));
            }
            return Ok((RunStatus::Progress, Vec::new()));
        };

        match Self::find_sync(&self.carry, start + 2) {
            Some(end) => {
                let frame_bytes = self.carry[start..end].to_vec();
                self.carry.drain(..end);
                let duration = self.info.max_block_size as u64;
                let packet = Packet::new(Bytes::from(frame_bytes), duration, self.pts, self.info.sample_rate, true);
                self.pts += duration as i64;
                Ok((RunStatus::Progress, vec![packet]))
            }
            None if self.buf.is_eof() => {
                let frame_bytes = self.carry[start..].to_vec();
                self.carry.clear();
                self.done = true;
                if frame_bytes.is_empty() {
                    return Ok((RunStatus::EndOfStream, Vec::new()));
                }
                let duration = self.info.max_block_size as u64;
                let packet = Packet::new(Bytes::from(frame_bytes), duration, self.pts, self.info.sample_rate, true);
                Ok((RunStatus::EndOfStream, vec![packet]))
            }
            None => Ok((RunStatus::Progress, Vec::new())),
        }
    }

    fn take_tags(&mut self) -> TagList {
        std::mem::take(&mut self.pending_tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ChunkInput {
        data: Vec<u8>,
        pos: usize,
    }

    impl Input for ChunkInput {
        fn name(&self) -> &'static str {
            "chunk"
        }
        fn config(&mut self, _: &str, _: &str) -> StageResult {
            Ok(())
        }
        fn open(&mut self) -> StageResult {
            Ok(())
        }
        fn read(&mut self, dest: &mut [u8]) -> StageResult<usize> {
            let n = (self.data.len() - self.pos).min(dest.len());
            dest[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
        fn take_tags(&mut self) -> TagList {
            TagList::new()
        }
    }

    fn streaminfo_bytes(sample_rate: u32, channels: u32, block_size: u16) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&block_size.to_be_bytes());
        body.extend_from_slice(&block_size.to_be_bytes());
        body.extend_from_slice(&[0, 0, 0]); // min_frame_size
        body.extend_from_slice(&[0, 0, 0]); // max_frame_size
        let packed: u64 = ((sample_rate as u64) << 44) | (((channels - 1) as u64) << 41) | (15u64 << 36);
        body.extend_from_slice(&packed.to_be_bytes()[..8]);
        body.extend_from_slice(&[0u8; 16]); // md5
        body
    }

    fn build_stream(sample_rate: u32, channels: u32, block_size: u16, frames: &[&[u8]]) -> Vec<u8> {
        let mut out = b"fLaC".to_vec();
        let info = streaminfo_bytes(sample_rate, channels, block_size);
        out.push(0x80); // last=1, type=STREAMINFO
        out.extend_from_slice(&(info.len() as u32).to_be_bytes()[1..]);
        out.extend_from_slice(&info);
        for frame in frames {
            out.extend_from_slice(frame);
        }
        out
    }

    #[test]
    fn open_parses_streaminfo_fields() {
        let stream = build_stream(44100, 2, 4096, &[]);
        let mut input = ChunkInput { data: stream, pos: 0 };
        let mut demux = FlacDemuxer::new();
        let descriptor = demux.open(&mut input).unwrap();
        assert_eq!(descriptor.codec, "flac");
        assert_eq!(descriptor.sample_rate, 44100);
        assert_eq!(descriptor.channels(), 2);
    }

    #[test]
    fn run_splits_frames_on_sync_boundaries() {
        let frame_a: &[u8] = &[0xFF, 0xF8, 1, 2, 3];
        let frame_b: &[u8] = &[0xFF, 0xF9, 4, 5, 6, 7];
        let stream = build_stream(48000, 1, 1024, &[frame_a, frame_b]);
        let mut input = ChunkInput { data: stream, pos: 0 };
        let mut demux = FlacDemuxer::new();
        demux.open(&mut input).unwrap();

        let (status_a, packets_a) = demux.run(&mut input).unwrap();
        assert_eq!(status_a, RunStatus::Progress);
        assert_eq!(&packets_a[0].bytes[..], frame_a);

        let (status_b, packets_b) = demux.run(&mut input).unwrap();
        assert_eq!(status_b, RunStatus::EndOfStream);
        assert_eq!(&packets_b[0].bytes[..], frame_b);
    }

    #[test]
    fn vorbis_comment_block_becomes_tags() {
        let mut out = b"fLaC".to_vec();
        let info = streaminfo_bytes(44100, 2, 4096);
        out.push(0x00); // not last, STREAMINFO
        out.extend_from_slice(&(info.len() as u32).to_be_bytes()[1..]);
        out.extend_from_slice(&info);

        let mut comment_block = Vec::new();
        let vendor = b"test";
        comment_block.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        comment_block.extend_from_slice(vendor);
        comment_block.extend_from_slice(&1u32.to_le_bytes());
        let field = b"TITLE=Hello";
        comment_block.extend_from_slice(&(field.len() as u32).to_le_bytes());
        comment_block.extend_from_slice(field);

        out.push(0x80 | BLOCK_VORBIS_COMMENT);
        out.extend_from_slice(&(comment_block.len() as u32).to_be_bytes()[1..]);
        out.extend_from_slice(&comment_block);

        let mut input = ChunkInput { data: out, pos: 0 };
        let mut demux = FlacDemuxer::new();
        demux.open(&mut input).unwrap();
        let tags = demux.take_tags();
        assert_eq!(tags.len(), 1);
    }
}
