//! Sample-format conversion filter (§4.5 flavor 2, the in-scope slice of
//! the "full" filter-graph flavor): remembers a configured destination
//! sample format and converts every incoming frame to it via
//! `samplefmt::convert`, handling interleaved<->planar transposition.
//! Actual resampling/channel-remixing DSP is treated the same way codec
//! bindings are (§1 Out of scope) — this filter only ever changes
//! `channels`/`sample_rate` by forwarding whatever the upstream descriptor
//! says, never by itself, so it never triggers a spurious downstream
//! reopen on its own (§4.5 "MUST only issue a downstream re-open when the
//! emitted channel-layout or sample_rate changes").

use frame::{Frame, FrameSource, FrameStorage};
use pipeline_core::{Frames, StageError, StageResult};
use samplefmt::SampleFormat;

use super::Filter;

pub struct ConvertFilter {
    target: Option<SampleFormat>,
    channels: u32,
    sample_rate: u32,
}

impl Default for ConvertFilter {
    fn default() -> Self {
        Self { target: None, channels: 0, sample_rate: 0 }
    }
}

impl ConvertFilter {
    pub fn new() -> Self {
        Self::default()
    }

    fn convert_frame(&self, frame: &Frame, target: SampleFormat) -> StageResult<Frame> {
        let channels = frame.channels as usize;
        let duration = frame.duration;
        let (src_channels_stride, is_planar_src) = match frame.storage() {
            FrameStorage::Interleaved(_) => (channels, false),
            FrameStorage::Planar(_) => (1, true),
            FrameStorage::Binary => {
                return Err(StageError::format("filter.convert", "cannot convert a passthrough frame"));
            }
        };

        if target.is_planar() {
            let mut planes = vec![vec![0u8; duration as usize * target.size()]; channels];
            for c in 0..channels {
                let src_buf = match frame.storage() {
                    FrameStorage::Interleaved(b) => b.as_slice(),
                    FrameStorage::Planar(chs) => &chs[c],
                    FrameStorage::Binary => unreachable!(),
                };
                let src_channel = if is_planar_src { 0 } else { c };
                samplefmt::convert(
                    &mut planes[c],
                    src_buf,
                    frame.format,
                    target,
                    duration as usize,
                    src_channels_stride,
                    src_channel,
                    1,
                    0,
                )
                .map_err(|_| StageError::format("filter.convert", "unsupported conversion"))?;
            }
            Frame::new_planar(target, frame.channels, duration, frame.sample_rate, frame.pts, planes)
                .map_err(|e| StageError::format("filter.convert", e.to_string()))
        } else {
            let mut dest = vec![0u8; duration as usize * channels * target.size()];
            for c in 0..channels {
                let src_buf = match frame.storage() {
                    FrameStorage::Interleaved(b) => b.as_slice(),
                    FrameStorage::Planar(chs) => &chs[c],
                    FrameStorage::Binary => unreachable!(),
                };
                let src_channel = if is_planar_src { 0 } else { c };
                samplefmt::convert(
                    &mut dest,
                    src_buf,
                    frame.format,
                    target,
                    duration as usize,
                    src_channels_stride,
                    src_channel,
                    channels,
                    c,
                )
                .map_err(|_| StageError::format("filter.convert", "unsupported conversion"))?;
            }
            Frame::new_interleaved(target, frame.channels, duration, frame.sample_rate, frame.pts, dest)
                .map_err(|e| StageError::format("filter.convert", e.to_string()))
        }
    }
}

impl Filter for ConvertFilter {
    fn name(&self) -> &'static str {
        "convert"
    }

    fn config(&mut self, key: &str, value: &str) -> StageResult {
        match key {
            "format" => {
                self.target = Some(
                    SampleFormat::from_name(value)
                        .ok_or_else(|| StageError::config("filter.convert", format!("unknown format {value}")))?,
                );
                Ok(())
            }
            other => Err(StageError::config("filter.convert", format!("unknown key {other}"))),
        }
    }

    fn open(&mut self, upstream: &FrameSource) -> StageResult<FrameSource> {
        self.channels = upstream.channels().max(1);
        self.sample_rate = upstream.sample_rate;
        Ok(upstream.clone())
    }

    fn submit_frame(&mut self, frame: Frame) -> StageResult<Frames> {
        match self.target {
            Some(target) if !frame.is_binary() && frame.format != target => {
                Ok(vec![self.convert_frame(&frame, target)?])
            }
            _ => Ok(vec![frame]),
        }
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

    #[test]
    fn converts_interleaved_s16_to_f32() {
        let mut f = ConvertFilter::new();
        f.config("format", "f32").unwrap();
        f.open(&FrameSource::new("pcm", 0b11, 48000, 0)).unwrap();
        let frame = Frame::new_interleaved(SampleFormat::S16, 2, 1, 48000, 0, vec![0xff, 0x7f, 0, 0x80]).unwrap();
        let out = f.submit_frame(frame).unwrap();
        assert_eq!(out[0].format, SampleFormat::F32);
        assert_eq!(out[0].duration, 1);
    }

    #[test]
    fn passes_through_when_already_target_format() {
        let mut f = ConvertFilter::new();
        f.config("format", "s16").unwrap();
        f.open(&FrameSource::new("pcm", 0b1, 48000, 0)).unwrap();
        let frame = Frame::new_interleaved(SampleFormat::S16, 1, 1, 48000, 0, vec![0, 0]).unwrap();
        let out = f.submit_frame(frame.clone()).unwrap();
        assert_eq!(out, vec![frame]);
    }

    #[test]
    fn interleaved_to_planar_transposition() {
        let mut f = ConvertFilter::new();
        f.config("format", "s16p").unwrap();
        f.open(&FrameSource::new("pcm", 0b11, 48000, 0)).unwrap();
        let frame = Frame::new_interleaved(SampleFormat::S16, 2, 2, 48000, 0, vec![1, 0, 2, 0, 3, 0, 4, 0]).unwrap();
        let out = f.submit_frame(frame).unwrap();
        assert!(out[0].channel(0).is_some());
        assert_eq!(out[0].channel(0).unwrap(), &[1, 0, 3, 0]);
        assert_eq!(out[0].channel(1).unwrap(), &[2, 0, 4, 0]);
    }
}
