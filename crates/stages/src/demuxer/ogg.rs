//! Ogg page demuxer (§4.3): reassembles lacing-spanned packets from Ogg
//! pages (RFC 3533) and detects the carried codec from the first packet's
//! magic. Decoding Vorbis/Opus/FLAC-in-Ogg payloads is out of scope (§1);
//! packets carry the compressed payload for a passthrough decoder.

use bytes::Bytes;
use frame::{PacketSource, Packet};
use pipeline_core::{Packets, StageError, StageResult};
use tagmodel::{Tag, TagList};

use super::{Demuxer, ReadBuf, RunStatus};
use crate::input::Input;

const HEADER_TYPE_BOS: u8 = 0x02;

fn sniff_codec(first_packet: &[u8]) -> &'static str {
    if first_packet.len() >= 8 && &first_packet[1..7] == b"vorbis" {
        "vorbis"
    } else if first_packet.starts_with(b"OpusHead") {
        "opus"
    } else if first_packet.len() >= 5 && &first_packet[1..5] == b"FLAC" {
        "flac"
    } else {
        "unknown"
    }
}

fn parse_vorbis_comment_packet(packet: &[u8], tags: &mut TagList) {
    // Comment header packets start with a 1-byte type + 6-byte "vorbis"
    // (or are the second Opus packet, "OpusTags" + 8 bytes), both followed
    // by the same vendor+comment-list layout.
    let body = if packet.starts_with(b"OpusTags") {
        &packet[8..]
    } else if packet.len() > 7 && packet[0] == 3 && &packet[1..7] == b"vorbis" {
        &packet[7..]
    } else {
        return;
    };
    let read_u32le = |b: &[u8], at: usize| -> Option<u32> {
        b.get(at..at + 4).map(|s| u32::from_le_bytes([s[0], s[1], s[2], s[3]]))
    };
    let mut pos = 0usize;
    let Some(vendor_len) = read_u32le(body, pos) else { return };
    pos += 4 + vendor_len as usize;
    let Some(count) = read_u32le(body, pos) else { return };
    pos += 4;
    for _ in 0..count {
        let Some(len) = read_u32le(body, pos) else { break };
        pos += 4;
        let Some(entry) = body.get(pos..pos + len as usize) else { break };
        pos += len as usize;
        let text = String::from_utf8_lossy(entry);
        if let Some((key, value)) = text.split_once('=') {
            tags.push(Tag::new(key.to_ascii_lowercase(), value.as_bytes().to_vec(), 0));
        }
    }
}

struct ParsedPage {
    granule: i64,
    header_type: u8,
    segments: Vec<u8>,
    payload: Bytes,
}

fn parse_page(buf: &mut ReadBuf, input: &mut dyn Input) -> StageResult<Option<ParsedPage>> {
    if !buf.ensure(input, 27)? {
        return Ok(None);
    }
    if &buf.available()[..4] != b"OggS" {
        return Err(StageError::format("demuxer.ogg", "missing OggS magic"));
    }
    let header_type = buf.available()[5];
    let granule = i64::from_le_bytes(buf.available()[6..14].try_into().unwrap());
    let segment_count = buf.available()[26] as usize;
    buf.consume(27);

    if !buf.ensure(input, segment_count)? {
        return Err(StageError::format("demuxer.ogg", "truncated segment table"));
    }
    let segments = buf.available()[..segment_count].to_vec();
    buf.consume(segment_count);

    let payload_len: usize = segments.iter().map(|&s| s as usize).sum();
    if !buf.ensure(input, payload_len)? {
        return Err(StageError::format("demuxer.ogg", "truncated page payload"));
    }
    let payload = Bytes::copy_from_slice(&buf.available()[..payload_len]);
    buf.consume(payload_len);

    Ok(Some(ParsedPage { granule, header_type, segments, payload }))
}

pub struct OggDemuxer {
    codec: String,
    sample_rate: u32,
    channel_layout: u64,
    buf: ReadBuf,
    pending_tags: TagList,
    packet_index: u32,
    last_granule: i64,
    done: bool,
}

impl Default for OggDemuxer {
    fn default() -> Self {
        Self {
            codec: "unknown".to_string(),
            sample_rate: 44100,
            channel_layout: 0b11,
            buf: ReadBuf::new(),
            pending_tags: TagList::new(),
            packet_index: 0,
            last_granule: 0,
            done: false,
        }
    }
}

impl OggDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    fn packets_from_page(page: &ParsedPage) -> Vec<Bytes> {
        let mut packets = Vec::new();
        let mut start = 0usize;
        let mut run_len = 0usize;
        for &seg in &page.segments {
            run_len += seg as usize;
            if seg < 255 {
                packets.push(page.payload.slice(start..start + run_len));
                start += run_len;
                run_len = 0;
            }
        }
        packets
    }
}

impl Demuxer for OggDemuxer {
    fn name(&self) -> &'static str {
        "ogg"
    }

    fn config(&mut self, key: &str, value: &str) -> StageResult {
        match key {
            "channels" => {
                let channels: u32 = value
                    .parse()
                    .map_err(|_| StageError::config("demuxer.ogg", format!("invalid channels {value}")))?;
                self.channel_layout = (1u64 << channels) - 1;
                Ok(())
            }
            other => Err(StageError::config("demuxer.ogg", format!("unknown key {other}"))),
        }
    }

    fn open(&mut self, input: &mut dyn Input) -> StageResult<PacketSource> {
        let Some(page) = parse_page(&mut self.buf, input)? else {
            return Err(StageError::format("demuxer.ogg", "empty stream"));
        };
        if page.header_type & HEADER_TYPE_BOS == 0 {
            return Err(StageError::format("demuxer.ogg", "first page is not a beginning-of-stream page"));
        }
        let packets = Self::packets_from_page(&page);
        if let Some(first) = packets.first() {
            self.codec = sniff_codec(first).to_string();
        }
        if page.payload.len() >= 28 && self.codec == "vorbis" {
            self.sample_rate = u32::from_le_bytes(page.payload[12..16].try_into().unwrap());
            let channels = page.payload[11] as u32;
            self.channel_layout = if channels == 0 { 0b11 } else { (1u64 << channels) - 1 };
        } else if self.codec == "opus" && page.payload.len() >= 12 {
            self.channel_layout = {
                let channels = page.payload[9] as u32;
                if channels == 0 { 0b11 } else { (1u64 << channels) - 1 }
            };
            self.sample_rate = u32::from_le_bytes(page.payload[12..16].try_into().unwrap_or([0x80, 0xBB, 0, 0]));
        }
        self.packet_index = 0;
        Ok(PacketSource::new(self.codec.clone(), self.channel_layout, self.sample_rate, 0))
    }

    fn run(&mut self, input: &mut dyn Input) -> StageResult<(RunStatus, Packets)> {
        if self.done {
            return Ok((RunStatus::EndOfStream, Vec::new()));
        }
        let Some(page) = parse_page(&mut self.buf, input)? else {
            self.done = true;
            return Ok((RunStatus::EndOfStream, Vec::new()));
        };
        let is_eos = page.header_type & 0x04 != 0;
        let packets = Self::packets_from_page(&page);
        let mut out = Vec::with_capacity(packets.len());
        // The granule position only bounds the page's last completed
        // packet (RFC 3533 4.); credit the whole page's sample span to
        // that packet rather than guessing a per-packet split.
        let page_duration = (page.granule - self.last_granule).max(0) as u64;
        self.last_granule = page.granule;
        let last_index = packets.len().saturating_sub(1);
        for (i, payload) in packets.iter().enumerate() {
            if self.packet_index == 1 {
                parse_vorbis_comment_packet(payload, &mut self.pending_tags);
            }
            let duration = if i == last_index { page_duration } else { 0 };
            let packet = Packet::new(payload.clone(), duration, page.granule, self.sample_rate, self.packet_index == 0);
            out.push(packet);
            self.packet_index += 1;
        }
        if is_eos {
            self.done = true;
            return Ok((RunStatus::EndOfStream, out));
        }
        Ok((RunStatus::Progress, out))
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

    fn ogg_crc32(data: &[u8]) -> u32 {
        let table = crc_table();
        let mut crc: u32 = 0;
        for &b in data {
            crc = (crc << 8) ^ table[(((crc >> 24) as u8) ^ b) as usize];
        }
        crc
    }

    fn build_page(header_type: u8, granule: i64, payload: &[u8]) -> Vec<u8> {
        let mut segments = vec![255u8; payload.len() / 255];
        segments.push((payload.len() % 255) as u8);
        let mut out = Vec::new();
        out.extend_from_slice(b"OggS");
        out.push(0);
        out.push(header_type);
        out.extend_from_slice(&granule.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        let crc_pos = out.len();
        out.extend_from_slice(&0u32.to_le_bytes());
        out.push(segments.len() as u8);
        out.extend_from_slice(&segments);
        out.extend_from_slice(payload);
        let crc = ogg_crc32(&out);
        out[crc_pos..crc_pos + 4].copy_from_slice(&crc.to_le_bytes());
        out
    }

    fn vorbis_ident_packet(sample_rate: u32, channels: u8) -> Vec<u8> {
        let mut p = vec![1u8];
        p.extend_from_slice(b"vorbis");
        p.extend_from_slice(&0u32.to_le_bytes()); // version
        p.push(channels);
        p.extend_from_slice(&sample_rate.to_le_bytes());
        p.extend_from_slice(&[0u8; 12]); // bitrate max/nominal/min
        p.push(0); // blocksizes
        p.push(1); // framing
        p
    }

    #[test]
    fn open_detects_vorbis_from_identification_packet() {
        let ident = vorbis_ident_packet(44100, 2);
        let page = build_page(0x02, 0, &ident);
        let mut input = ChunkInput { data: page, pos: 0 };
        let mut demux = OggDemuxer::new();
        let descriptor = demux.open(&mut input).unwrap();
        assert_eq!(descriptor.codec, "vorbis");
        assert_eq!(descriptor.sample_rate, 44100);
        assert_eq!(descriptor.channels(), 2);
    }

    #[test]
    fn eos_flag_terminates_run() {
        let ident = vorbis_ident_packet(44100, 2);
        let mut stream = build_page(0x02, 0, &ident);
        stream.extend(build_page(0x04, 1024, b"final-packet"));
        let mut input = ChunkInput { data: stream, pos: 0 };
        let mut demux = OggDemuxer::new();
        demux.open(&mut input).unwrap();
        let (status, packets) = demux.run(&mut input).unwrap();
        assert_eq!(status, RunStatus::EndOfStream);
        assert_eq!(&packets[0].bytes[..], b"final-packet");
    }
}
