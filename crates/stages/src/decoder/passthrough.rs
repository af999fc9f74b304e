//! Passthrough decoder (§4.4): does not decode. Wraps the compressed
//! packet inside a [`Frame`] with `format = Binary` so a downstream encoder
//! that itself supports passthrough can re-emit the packet unchanged.

use frame::{Frame, FrameSource, Packet, PacketSource};
use pipeline_core::{Frames, StageResult};

use super::Decoder;

#[derive(Default)]
pub struct PassthroughDecoder {
    channels: u32,
    sample_rate: u32,
}

impl PassthroughDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for PassthroughDecoder {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn config(&mut self, key: &str, _value: &str) -> StageResult {
        Err(pipeline_core::StageError::config("decoder.passthrough", format!("unknown key {key}")))
    }

    fn open(&mut self, upstream: &PacketSource) -> StageResult<FrameSource> {
        self.channels = upstream.channels().max(1);
        self.sample_rate = upstream.sample_rate;
        Ok(upstream.clone())
    }

    fn submit_packet(&mut self, packet: &Packet) -> StageResult<Frames> {
        Ok(vec![Frame::new_binary(self.channels, self.sample_rate, packet.pts, packet.clone())])
    }

    fn flush(&mut self) -> StageResult<Frames> {
        Ok(Vec::new())
    }

    fn reset(&mut self) -> StageResult {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn wraps_packet_as_binary_frame() {
        let mut dec = PassthroughDecoder::new();
        let src = PacketSource::new("flac", 0b11, 48000, 4096);
        dec.open(&src).unwrap();
        let packet = Packet::new(Bytes::from_static(b"compressed"), 4096, 0, 48000, true);
        let frames = dec.submit_packet(&packet).unwrap();
        assert!(frames[0].is_binary());
        assert_eq!(frames[0].packet().unwrap().bytes, packet.bytes);
    }
}
