//! Identity filter (§4.11 `Source` default): forwards every frame
//! unchanged. Still participates honestly in the descriptor contract so a
//! chain owner sitting downstream of it sees real reopen decisions driven
//! by the decoder, not masked by this stage.

use frame::{Frame, FrameSource};
use pipeline_core::{Frames, StageResult};

use super::Filter;

#[derive(Default)]
pub struct PassthroughFilter {
    descriptor: Option<FrameSource>,
}

impl PassthroughFilter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Filter for PassthroughFilter {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn config(&mut self, key: &str, _value: &str) -> StageResult {
        Err(pipeline_core::StageError::config("filter.passthrough", format!("unknown key {key}")))
    }

    fn open(&mut self, upstream: &FrameSource) -> StageResult<FrameSource> {
        self.descriptor = Some(upstream.clone());
        Ok(upstream.clone())
    }

    fn submit_frame(&mut self, frame: Frame) -> StageResult<Frames> {
        Ok(vec![frame])
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
    use samplefmt::SampleFormat;

    #[test]
    fn forwards_frame_unchanged() {
        let mut f = PassthroughFilter::new();
        f.open(&FrameSource::new("pcm", 0b1, 48000, 4)).unwrap();
        let frame = Frame::new_interleaved(SampleFormat::S16, 1, 4, 48000, 0, vec![0u8; 8]).unwrap();
        let out = f.submit_frame(frame.clone()).unwrap();
        assert_eq!(out, vec![frame]);
    }
}
