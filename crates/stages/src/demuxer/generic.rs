//! Generic raw/PCM demuxer (§4.3 fallback container-parser): no framing at
//! all, just fixed-size chunks of a configured sample layout driving the
//! `pcm` codec end-to-end.

use bytes::Bytes;
use frame::{PacketSource, Packet};
use pipeline_core::{Packets, StageError, StageResult};
use samplefmt::SampleFormat;
use tagmodel::TagList;

use super::{Demuxer, ReadBuf, RunStatus};
use crate::input::Input;

pub struct GenericDemuxer {
    sample_rate: u32,
    channels: u32,
    format: SampleFormat,
    packet_samples: u32,
    pts: i64,
    buf: ReadBuf,
}

impl Default for GenericDemuxer {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            format: SampleFormat::S16,
            packet_samples: 1024,
            pts: 0,
            buf: ReadBuf::new(),
        }
    }
}

impl GenericDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    fn bytes_per_packet(&self) -> usize {
        self.packet_samples as usize * self.channels as usize * self.format.size()
    }
}

impl Demuxer for GenericDemuxer {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn config(&mut self, key: &str, value: &str) -> StageResult {
        match key {
            "sample-rate" => {
                self.sample_rate = value
                    .parse()
                    .map_err(|_| StageError::config("demuxer.generic", format!("invalid sample-rate {value}")))?;
                Ok(())
            }
            "channels" => {
                self.channels = value
                    .parse()
                    .map_err(|_| StageError::config("demuxer.generic", format!("invalid channels {value}")))?;
                Ok(())
            }
            "format" => {
                self.format = SampleFormat::from_name(value)
                    .ok_or_else(|| StageError::config("demuxer.generic", format!("unknown format {value}")))?;
                Ok(())
            }
            "packet-samples" => {
                self.packet_samples = value
                    .parse()
                    .map_err(|_| StageError::config("demuxer.generic", format!("invalid packet-samples {value}")))?;
                Ok(())
            }
            other => Err(StageError::config("demuxer.generic", format!("unknown key {other}"))),
        }
    }

    fn open(&mut self, input: &mut dyn Input) -> StageResult<PacketSource> {
        self.pts = 0;
        // Prime the buffer now so bytes an `auto` sniff already peeked off
        // `input` (and is relaying through a prefix wrapper) aren't lost
        // once `run` starts pulling from the real input handle.
        self.buf.ensure(input, 1)?;
        Ok(PacketSource::new("pcm", (1u64 << self.channels) - 1, self.sample_rate, self.packet_samples))
    }

    fn run(&mut self, input: &mut dyn Input) -> StageResult<(RunStatus, Packets)> {
        let want = self.bytes_per_packet();
        if want == 0 {
            return Err(StageError::config("demuxer.generic", "packet byte size is zero"));
        }
        let have_full = self.buf.ensure(input, want)?;
        if !have_full {
            if self.buf.available().is_empty() {
                return Ok((RunStatus::EndOfStream, Vec::new()));
            }
            // Final short chunk: emit what's left, then end of stream.
            let tail = self.buf.available().to_vec();
            let samples = tail.len() as u64 / (self.channels as u64 * self.format.size() as u64).max(1);
            self.buf.consume(tail.len());
            let packet = Packet::new(Bytes::from(tail), samples, self.pts, self.sample_rate, true);
            self.pts += samples as i64;
            return Ok((RunStatus::EndOfStream, vec![packet]));
        }
        let chunk = self.buf.available()[..want].to_vec();
        self.buf.consume(want);
        let packet = Packet::new(Bytes::from(chunk), self.packet_samples as u64, self.pts, self.sample_rate, true);
        self.pts += self.packet_samples as i64;
        Ok((RunStatus::Progress, vec![packet]))
    }

    fn take_tags(&mut self) -> TagList {
        TagList::new()
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

    #[test]
    fn emits_fixed_size_packets_until_short_tail() {
        let mut demux = GenericDemuxer::new();
        demux.config("sample-rate", "8000").unwrap();
        demux.config("channels", "1").unwrap();
        demux.config("format", "s16").unwrap();
        demux.config("packet-samples", "4").unwrap();
        // bytes per packet = 4 * 1 * 2 = 8. Two full packets + a 3-byte tail.
        let mut input = ChunkInput { data: vec![0u8; 19], pos: 0 };
        demux.open(&mut input).unwrap();

        let (status, packets) = demux.run(&mut input).unwrap();
        assert_eq!(status, RunStatus::Progress);
        assert_eq!(packets[0].duration, 4);

        let (status, packets) = demux.run(&mut input).unwrap();
        assert_eq!(status, RunStatus::Progress);
        assert_eq!(packets[0].pts, 4);

        let (status, packets) = demux.run(&mut input).unwrap();
        assert_eq!(status, RunStatus::EndOfStream);
        assert_eq!(packets[0].bytes.len(), 3);
    }

    #[test]
    fn open_reports_pcm_codec() {
        let mut demux = GenericDemuxer::new();
        let mut input = ChunkInput { data: vec![], pos: 0 };
        let descriptor = demux.open(&mut input).unwrap();
        assert_eq!(descriptor.codec, "pcm");
    }
}
