//! Buffer-only filter (§4.5 flavor 1): accumulates incoming frames until a
//! configured frame length is reached, then emits fixed-size frames. This
//! is the `Destination`-side default (§4.12) since most encoders need a
//! steady frame size regardless of what the decoder/rendezvous handed
//! them in.

use frame::{Frame, FrameSource};
use pipeline_core::{Frames, StageError, StageResult};
use samplefmt::SampleFormat;

use super::Filter;

enum Accum {
    Interleaved(Vec<u8>),
    Planar(Vec<Vec<u8>>),
}

pub struct BufferFilter {
    frame_len: u64,
    channels: u32,
    sample_rate: u32,
    format: Option<SampleFormat>,
    accum: Option<Accum>,
    pts: i64,
}

impl Default for BufferFilter {
    fn default() -> Self {
        Self { frame_len: 1024, channels: 0, sample_rate: 0, format: None, accum: None, pts: 0 }
    }
}

impl BufferFilter {
    pub fn new() -> Self {
        Self::default()
    }

    fn buffered_samples(&self) -> u64 {
        let Some(format) = self.format else { return 0 };
        let size = format.size().max(1);
        match &self.accum {
            Some(Accum::Interleaved(b)) => b.len() as u64 / (size as u64 * self.channels.max(1) as u64),
            Some(Accum::Planar(chs)) => chs.first().map(|c| c.len() as u64 / size as u64).unwrap_or(0),
            None => 0,
        }
    }

    fn drain_frame(&mut self, samples: u64) -> StageResult<Frame> {
        let format = self.format.ok_or_else(|| StageError::lifecycle("filter.buffer", "drain before any frame seen"))?;
        let size = format.size().max(1);
        let frame = match self.accum.as_mut() {
            Some(Accum::Interleaved(buf)) => {
                let take = samples as usize * size * self.channels as usize;
                let chunk: Vec<u8> = buf.drain(..take).collect();
                Frame::new_interleaved(format, self.channels, samples, self.sample_rate, self.pts, chunk)
            }
            Some(Accum::Planar(chs)) => {
                let take = samples as usize * size;
                let data: Vec<Vec<u8>> = chs.iter_mut().map(|c| c.drain(..take).collect()).collect();
                Frame::new_planar(format, self.channels, samples, self.sample_rate, self.pts, data)
            }
            None => return Err(StageError::lifecycle("filter.buffer", "drain before any frame seen")),
        }
        .map_err(|e| StageError::format("filter.buffer", e.to_string()))?;
        self.pts += samples as i64;
        Ok(frame)
    }
}

impl Filter for BufferFilter {
    fn name(&self) -> &'static str {
        "buffer"
    }

    fn config(&mut self, key: &str, value: &str) -> StageResult {
        match key {
            "frame-length" => {
                self.frame_len = value
                    .parse()
                    .map_err(|_| StageError::config("filter.buffer", format!("invalid frame-length {value}")))?;
                Ok(())
            }
            other => Err(StageError::config("filter.buffer", format!("unknown key {other}"))),
        }
    }

    fn open(&mut self, upstream: &FrameSource) -> StageResult<FrameSource> {
        self.channels = upstream.channels().max(1);
        self.sample_rate = upstream.sample_rate;
        self.format = None;
        self.accum = None;
        self.pts = 0;
        Ok(FrameSource::new(&upstream.codec, upstream.channel_layout, upstream.sample_rate, self.frame_len as u32))
    }

    fn submit_frame(&mut self, frame: Frame) -> StageResult<Frames> {
        if frame.is_binary() {
            return Err(StageError::format("filter.buffer", "buffer filter cannot accumulate passthrough frames"));
        }
        match frame.storage() {
            frame::FrameStorage::Interleaved(data) => {
                self.format.get_or_insert(frame.format);
                match self.accum.get_or_insert_with(|| Accum::Interleaved(Vec::new())) {
                    Accum::Interleaved(buf) => buf.extend_from_slice(data),
                    Accum::Planar(_) => return Err(StageError::format("filter.buffer", "interleaved/planar mismatch")),
                }
            }
            frame::FrameStorage::Planar(chs) => {
                self.format.get_or_insert(frame.format);
                let accum = self.accum.get_or_insert_with(|| Accum::Planar(vec![Vec::new(); chs.len()]));
                match accum {
                    Accum::Planar(buf) => {
                        for (dst, src) in buf.iter_mut().zip(chs.iter()) {
                            dst.extend_from_slice(src);
                        }
                    }
                    Accum::Interleaved(_) => return Err(StageError::format("filter.buffer", "interleaved/planar mismatch")),
                }
            }
            frame::FrameStorage::Binary => unreachable!("checked above"),
        }

        let mut out = Vec::new();
        while self.buffered_samples() >= self.frame_len {
            out.push(self.drain_frame(self.frame_len)?);
        }
        Ok(out)
    }

    fn flush(&mut self) -> StageResult<Frames> {
        let remaining = self.buffered_samples();
        if remaining == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![self.drain_frame(remaining)?])
    }

    fn reset(&mut self) -> StageResult {
        self.accum = None;
        self.format = None;
        self.pts = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_into_fixed_size_frames() {
        let mut f = BufferFilter::new();
        f.config("frame-length", "4").unwrap();
        f.open(&FrameSource::new("pcm", 0b1, 48000, 0)).unwrap();

        let small = Frame::new_interleaved(SampleFormat::S16, 1, 2, 48000, 0, vec![0u8; 4]).unwrap();
        let out = f.submit_frame(small.clone()).unwrap();
        assert!(out.is_empty()); // 2 samples buffered, need 4

        let out = f.submit_frame(small).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].duration, 4);
        assert_eq!(out[0].pts, 0);
    }

    #[test]
    fn flush_emits_short_tail() {
        let mut f = BufferFilter::new();
        f.config("frame-length", "10").unwrap();
        f.open(&FrameSource::new("pcm", 0b1, 48000, 0)).unwrap();
        let frame = Frame::new_interleaved(SampleFormat::S16, 1, 3, 48000, 0, vec![0u8; 6]).unwrap();
        f.submit_frame(frame).unwrap();
        let out = f.flush().unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].duration, 3);
    }

    #[test]
    fn binary_frame_rejected() {
        use frame::Packet;
        let mut f = BufferFilter::new();
        f.open(&FrameSource::new("flac", 0b1, 48000, 0)).unwrap();
        let packet = Packet::new(bytes::Bytes::from_static(b"x"), 1, 0, 48000, true);
        let frame = Frame::new_binary(1, 48000, 0, packet);
        assert!(f.submit_frame(frame).is_err());
    }
}
