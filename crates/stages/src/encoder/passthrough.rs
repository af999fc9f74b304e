//! Passthrough encoder (§4.6): requires `Frame::Binary` input and forwards
//! the wrapped [`Packet`] unchanged, the mirror image of
//! [`super::super::decoder::PassthroughDecoder`].

use frame::{Frame, FrameSource, PacketSource};
use pipeline_core::{DownstreamCaps, Packets, StageError, StageResult};
use samplefmt::SampleFormat;

use super::Encoder;

const SUPPORTED: &[SampleFormat] = &[SampleFormat::Binary];

#[derive(Default)]
pub struct PassthroughEncoder {
    channel_layout: u64,
    sample_rate: u32,
}

impl PassthroughEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Encoder for PassthroughEncoder {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn config(&mut self, key: &str, _value: &str) -> StageResult {
        Err(StageError::config("encoder.passthrough", format!("unknown key {key}")))
    }

    fn supported_formats(&self) -> &'static [SampleFormat] {
        SUPPORTED
    }

    fn open(&mut self, upstream: &FrameSource, _downstream_caps: DownstreamCaps) -> StageResult<PacketSource> {
        self.channel_layout = upstream.channel_layout;
        self.sample_rate = upstream.sample_rate;
        Ok(upstream.clone())
    }

    fn submit_frame(&mut self, frame: Frame) -> StageResult<Packets> {
        let packet = frame
            .packet()
            .cloned()
            .ok_or_else(|| StageError::format("encoder.passthrough", "input frame is not Binary"))?;
        Ok(vec![packet])
    }

    fn flush(&mut self) -> StageResult<Packets> {
        Ok(Vec::new())
    }

    fn reset(&mut self) -> StageResult {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame::Packet;

    #[test]
    fn forwards_wrapped_packet_unchanged() {
        let mut enc = PassthroughEncoder::new();
        enc.open(&FrameSource::new("flac", 0b11, 48000, 4096), DownstreamCaps::default()).unwrap();
        let packet = Packet::new(bytes::Bytes::from_static(b"data"), 4096, 0, 48000, true);
        let frame = Frame::new_binary(2, 48000, 0, packet.clone());
        let out = enc.submit_frame(frame).unwrap();
        assert_eq!(out, vec![packet]);
    }

    #[test]
    fn rejects_non_binary_frame() {
        let mut enc = PassthroughEncoder::new();
        enc.open(&FrameSource::new("flac", 0b1, 48000, 4096), DownstreamCaps::default()).unwrap();
        let frame = Frame::new_interleaved(SampleFormat::S16, 1, 1, 48000, 0, vec![0, 0]).unwrap();
        assert!(enc.submit_frame(frame).is_err());
    }
}
