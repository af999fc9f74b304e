//! Raw linear-PCM encoder (§11 `SPEC_FULL.md`): "compression" is
//! converting each incoming frame to the negotiated output sample format
//! and repacking into fixed-`frame_len` packets — the codec's own
//! internal buffering (§4.6 "append into an internal frame buffer, drain
//! encoder by the codec's frame_len").

use frame::{Frame, FrameSource, Packet, PacketSource};
use pipeline_core::{DownstreamCaps, Packets, StageError, StageResult};
use samplefmt::SampleFormat;

use super::{Encoder, choose_format};

const SUPPORTED: &[SampleFormat] =
    &[SampleFormat::S16, SampleFormat::S32, SampleFormat::F32, SampleFormat::F64, SampleFormat::U8];

pub struct PcmEncoder {
    frame_len: u32,
    channels: u32,
    sample_rate: u32,
    format: Option<SampleFormat>,
    buf: Vec<u8>,
    pts: i64,
}

impl Default for PcmEncoder {
    fn default() -> Self {
        Self { frame_len: 1024, channels: 0, sample_rate: 0, format: None, buf: Vec::new(), pts: 0 }
    }
}

impl PcmEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn bytes_per_packet(&self, format: SampleFormat) -> usize {
        self.frame_len as usize * self.channels as usize * format.size()
    }

    fn drain_full_packets(&mut self) -> StageResult<Packets> {
        let Some(format) = self.format else { return Ok(Vec::new()) };
        let want = self.bytes_per_packet(format);
        if want == 0 {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        while self.buf.len() >= want {
            let chunk: Vec<u8> = self.buf.drain(..want).collect();
            out.push(Packet::new(bytes::Bytes::from(chunk), self.frame_len as u64, self.pts, self.sample_rate, true));
            self.pts += self.frame_len as i64;
        }
        Ok(out)
    }
}

impl Encoder for PcmEncoder {
    fn name(&self) -> &'static str {
        "pcm"
    }

    fn config(&mut self, key: &str, value: &str) -> StageResult {
        match key {
            "frame-length" => {
                self.frame_len = value
                    .parse()
                    .map_err(|_| StageError::config("encoder.pcm", format!("invalid frame-length {value}")))?;
                Ok(())
            }
            "format" => {
                self.format = Some(
                    SampleFormat::from_name(value)
                        .ok_or_else(|| StageError::config("encoder.pcm", format!("unknown format {value}")))?,
                );
                Ok(())
            }
            other => Err(StageError::config("encoder.pcm", format!("unknown key {other}"))),
        }
    }

    fn supported_formats(&self) -> &'static [SampleFormat] {
        SUPPORTED
    }

    fn open(&mut self, upstream: &FrameSource, _downstream_caps: DownstreamCaps) -> StageResult<PacketSource> {
        self.channels = upstream.channels().max(1);
        self.sample_rate = upstream.sample_rate;
        self.buf.clear();
        self.pts = 0;
        Ok(PacketSource::new("pcm", upstream.channel_layout, upstream.sample_rate, self.frame_len))
    }

    fn submit_frame(&mut self, frame: Frame) -> StageResult<Packets> {
        if frame.is_binary() {
            return Err(StageError::format("encoder.pcm", "pcm encoder cannot encode a passthrough frame"));
        }
        let target = *self.format.get_or_insert_with(|| choose_format(SUPPORTED, frame.format));

        if frame.format == target {
            match frame.storage() {
                frame::FrameStorage::Interleaved(data) => self.buf.extend_from_slice(data),
                frame::FrameStorage::Planar(_) => {
                    return Err(StageError::format("encoder.pcm", "planar frames not supported by this encoder"));
                }
                frame::FrameStorage::Binary => unreachable!("checked above"),
            }
        } else {
            let Some(data) = frame.interleaved() else {
                return Err(StageError::format("encoder.pcm", "planar frames not supported by this encoder"));
            };
            let mut converted = vec![0u8; frame.duration as usize * self.channels as usize * target.size()];
            for c in 0..self.channels as usize {
                samplefmt::convert(
                    &mut converted,
                    data,
                    frame.format,
                    target,
                    frame.duration as usize,
                    self.channels as usize,
                    c,
                    self.channels as usize,
                    c,
                )
                .map_err(|_| StageError::format("encoder.pcm", "unsupported conversion"))?;
            }
            self.buf.extend_from_slice(&converted);
        }

        self.drain_full_packets()
    }

    fn flush(&mut self) -> StageResult<Packets> {
        let Some(format) = self.format else { return Ok(Vec::new()) };
        if self.buf.is_empty() {
            return Ok(Vec::new());
        }
        let sample_bytes = self.channels as usize * format.size();
        let tail_samples = self.buf.len() / sample_bytes.max(1);
        let tail: Vec<u8> = self.buf.drain(..).collect();
        let packet = Packet::new(bytes::Bytes::from(tail), tail_samples as u64, self.pts, self.sample_rate, true);
        self.pts += tail_samples as i64;
        Ok(vec![packet])
    }

    fn reset(&mut self) -> StageResult {
        self.buf.clear();
        self.format = None;
        self.pts = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_fixed_size_packets_and_tail_on_flush() {
        let mut enc = PcmEncoder::new();
        enc.config("frame-length", "4").unwrap();
        let upstream = FrameSource::new("pcm", 0b1, 48000, 0);
        enc.open(&upstream, DownstreamCaps::default()).unwrap();

        let frame = Frame::new_interleaved(SampleFormat::S16, 1, 6, 48000, 0, vec![0u8; 12]).unwrap();
        let packets = enc.submit_frame(frame).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].duration, 4);

        let flushed = enc.flush().unwrap();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].duration, 2);
    }

    #[test]
    fn converts_to_configured_format() {
        let mut enc = PcmEncoder::new();
        enc.config("format", "f32").unwrap();
        enc.config("frame-length", "1").unwrap();
        let upstream = FrameSource::new("pcm", 0b1, 48000, 0);
        enc.open(&upstream, DownstreamCaps::default()).unwrap();
        let frame = Frame::new_interleaved(SampleFormat::S16, 1, 1, 48000, 0, vec![0xff, 0x7f]).unwrap();
        let packets = enc.submit_frame(frame).unwrap();
        assert_eq!(packets[0].bytes.len(), 4); // f32 sample
    }
}
