//! The `stdout` [`Output`] driver (§4.8 "stdout output"): no playlist, no
//! segmentation bookkeeping — every segment's bytes are written straight
//! to the process's standard output, in arrival order.

use std::io::{self, Write};

use frame::{Segment, SegmentSource};
use pipeline_core::{ErrorKind, StageError, StageResult};
use tagmodel::TagList;
use timeutil::IchTime;

use crate::{Output, PictureRef};

const STAGE: &str = "stdout";

#[derive(Default)]
pub struct StdoutOutput {
    opened: bool,
}

impl StdoutOutput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Output for StdoutOutput {
    fn name(&self) -> &'static str {
        STAGE
    }

    fn config(&mut self, key: &str, _value: &str) -> StageResult {
        Err(StageError::config(STAGE, format!("unknown key {key}")))
    }

    fn set_clock(&mut self, _now: IchTime) {}

    fn open(&mut self, _muxer_name: &str, _upstream: &SegmentSource) -> StageResult {
        self.opened = true;
        Ok(())
    }

    fn submit_segment(&mut self, segment: &Segment) -> StageResult {
        if !self.opened {
            return Err(StageError::lifecycle(STAGE, "used before open()"));
        }
        io::stdout()
            .write_all(&segment.bytes)
            .map_err(|e| StageError::with_source(ErrorKind::Format, STAGE, "stdout write failed", e))
    }

    fn submit_tags(&mut self, _tags: &TagList) -> StageResult {
        Ok(())
    }

    fn submit_picture(&mut self, _mime: &str, _bytes: &[u8]) -> StageResult<Option<PictureRef>> {
        Ok(None)
    }

    fn flush(&mut self) -> StageResult {
        io::stdout().flush().map_err(|e| StageError::with_source(ErrorKind::Format, STAGE, "stdout flush failed", e))
    }

    fn reset(&mut self) -> StageResult {
        self.opened = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn rejects_segment_before_open() {
        let mut out = StdoutOutput::new();
        let seg = Segment::media(Bytes::from_static(b"abc"), "audio/mpeg", 1024);
        assert!(out.submit_segment(&seg).is_err());
    }

    #[test]
    fn accepts_segment_after_open() {
        let mut out = StdoutOutput::new();
        let src = SegmentSource::new("mp3", 0b11, 44100, 1152);
        out.open("packed", &src).unwrap();
        let seg = Segment::media(Bytes::from_static(b"abc"), "audio/mpeg", 1152);
        out.submit_segment(&seg).unwrap();
    }
}
