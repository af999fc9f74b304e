//! Default decoder chooser (§4.4): picks a codec-specific decoder by
//! `PacketSource::codec`, falling back to [`PassthroughDecoder`] for
//! anything it doesn't recognise (a real build would register FLAC/AAC/
//! Opus decoders here; this rewrite only ships `pcm`).

use frame::{FrameSource, Packet, PacketSource};
use pipeline_core::{Frames, StageError, StageResult};

use super::{Decoder, PassthroughDecoder, PcmDecoder};

pub struct AutoDecoder {
    chosen: Option<Box<dyn Decoder>>,
}

impl Default for AutoDecoder {
    fn default() -> Self {
        Self { chosen: None }
    }
}

impl AutoDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for AutoDecoder {
    fn name(&self) -> &'static str {
        "auto"
    }

    fn config(&mut self, key: &str, value: &str) -> StageResult {
        if let Some(dec) = self.chosen.as_mut() {
            return dec.config(key, value);
        }
        Err(StageError::config("decoder.auto", format!("no decoder chosen yet, key {key}")))
    }

    fn open(&mut self, upstream: &PacketSource) -> StageResult<FrameSource> {
        let mut dec: Box<dyn Decoder> = match upstream.codec.as_str() {
            "pcm" => Box::new(PcmDecoder::new()),
            _ => Box::new(PassthroughDecoder::new()),
        };
        let descriptor = dec.open(upstream)?;
        self.chosen = Some(dec);
        Ok(descriptor)
    }

    fn submit_packet(&mut self, packet: &Packet) -> StageResult<Frames> {
        let dec = self.chosen.as_mut().ok_or_else(|| StageError::lifecycle("decoder.auto", "submit before open"))?;
        dec.submit_packet(packet)
    }

    fn flush(&mut self) -> StageResult<Frames> {
        match self.chosen.as_mut() {
            Some(dec) => dec.flush(),
            None => Ok(Vec::new()),
        }
    }

    fn reset(&mut self) -> StageResult {
        match self.chosen.as_mut() {
            Some(dec) => dec.reset(),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> StageResult {
        if let Some(dec) = self.chosen.as_mut() {
            dec.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn picks_pcm_for_pcm_codec() {
        let mut dec = AutoDecoder::new();
        let src = PacketSource::new("pcm", 0b11, 48000, 4);
        dec.open(&src).unwrap();
        let packet = Packet::new(Bytes::from_static(&[0u8; 16]), 4, 0, 48000, true);
        let frames = dec.submit_packet(&packet).unwrap();
        assert!(!frames[0].is_binary());
    }

    #[test]
    fn falls_back_to_passthrough_for_unknown_codec() {
        let mut dec = AutoDecoder::new();
        let src = PacketSource::new("flac", 0b11, 48000, 4096);
        dec.open(&src).unwrap();
        let packet = Packet::new(Bytes::from_static(b"abc"), 4096, 0, 48000, true);
        let frames = dec.submit_packet(&packet).unwrap();
        assert!(frames[0].is_binary());
    }
}
