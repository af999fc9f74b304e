//! Raw linear-PCM decoder (§11 `SPEC_FULL.md`): the packet bytes a `pcm`
//! demuxer/encoder produce already *are* raw interleaved samples in the
//! configured format, so "decoding" is just wrapping them into a [`Frame`]
//! unchanged. This is the one codec this rewrite ships a complete,
//! non-black-box implementation of, exercised end-to-end by the S1/S2
//! scenario tests.

use frame::{Frame, FrameSource, Packet, PacketSource};
use pipeline_core::{Frames, StageError, StageResult};
use samplefmt::SampleFormat;

use super::Decoder;

pub struct PcmDecoder {
    format: SampleFormat,
    channels: u32,
    sample_rate: u32,
    pts: i64,
}

impl Default for PcmDecoder {
    fn default() -> Self {
        Self { format: SampleFormat::S16, channels: 2, sample_rate: 44100, pts: 0 }
    }
}

impl PcmDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for PcmDecoder {
    fn name(&self) -> &'static str {
        "pcm"
    }

    fn config(&mut self, key: &str, value: &str) -> StageResult {
        match key {
            "format" => {
                self.format = SampleFormat::from_name(value)
                    .ok_or_else(|| StageError::config("decoder.pcm", format!("unknown format {value}")))?;
                Ok(())
            }
            other => Err(StageError::config("decoder.pcm", format!("unknown key {other}"))),
        }
    }

    fn open(&mut self, upstream: &PacketSource) -> StageResult<FrameSource> {
        self.channels = upstream.channels().max(1);
        self.sample_rate = upstream.sample_rate;
        self.pts = 0;
        Ok(FrameSource::new("pcm", upstream.channel_layout, upstream.sample_rate, upstream.frame_len))
    }

    fn submit_packet(&mut self, packet: &Packet) -> StageResult<Frames> {
        let frame = Frame::new_interleaved(
            self.format,
            self.channels,
            packet.duration,
            self.sample_rate,
            self.pts,
            packet.bytes.to_vec(),
        )
        .map_err(|e| StageError::format("decoder.pcm", e.to_string()))?;
        self.pts += packet.duration as i64;
        Ok(vec![frame])
    }

    fn flush(&mut self) -> StageResult<Frames> {
        Ok(Vec::new())
    }

    fn reset(&mut self) -> StageResult {
        self.pts = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn wraps_packet_bytes_unchanged_and_stamps_pts() {
        let mut dec = PcmDecoder::new();
        dec.config("format", "s16").unwrap();
        let src = PacketSource::new("pcm", 0b11, 48000, 4);
        dec.open(&src).unwrap();

        let packet = Packet::new(Bytes::from_static(&[0u8; 16]), 4, 0, 48000, true);
        let frames = dec.submit_packet(&packet).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].pts, 0);
        assert_eq!(frames[0].duration, 4);

        let frames = dec.submit_packet(&packet).unwrap();
        assert_eq!(frames[0].pts, 4);
    }

    #[test]
    fn reset_rewinds_pts() {
        let mut dec = PcmDecoder::new();
        let src = PacketSource::new("pcm", 0b11, 48000, 4);
        dec.open(&src).unwrap();
        let packet = Packet::new(Bytes::from_static(&[0u8; 16]), 4, 0, 48000, true);
        dec.submit_packet(&packet).unwrap();
        dec.reset().unwrap();
        let frames = dec.submit_packet(&packet).unwrap();
        assert_eq!(frames[0].pts, 0);
    }
}
