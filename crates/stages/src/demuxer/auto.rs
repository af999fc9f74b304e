//! Auto-sniffing demuxer chooser (§4.3): buffers the first four bytes,
//! matches known container magic, and delegates every further call to the
//! concrete demuxer it picked.

use frame::PacketSource;
use pipeline_core::{Packets, StageError, StageResult};
use tagmodel::TagList;

use super::{Demuxer, FlacDemuxer, GenericDemuxer, OggDemuxer, ReadBuf, RunStatus};
use crate::input::Input;

pub struct AutoDemuxer {
    chosen: Option<Box<dyn Demuxer>>,
    sniff: ReadBuf,
}

impl Default for AutoDemuxer {
    fn default() -> Self {
        Self { chosen: None, sniff: ReadBuf::new() }
    }
}

impl AutoDemuxer {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Sniffed-byte-aware `Input` wrapper: lets the chosen demuxer re-read
/// whatever bytes `AutoDemuxer` already pulled for the magic check before
/// falling through to the real input.
struct PrefixedInput<'a> {
    prefix: &'a [u8],
    prefix_pos: usize,
    inner: &'a mut dyn Input,
}

impl Input for PrefixedInput<'_> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }
    fn config(&mut self, key: &str, value: &str) -> StageResult {
        self.inner.config(key, value)
    }
    fn open(&mut self) -> StageResult {
        self.inner.open()
    }
    fn read(&mut self, dest: &mut [u8]) -> StageResult<usize> {
        if self.prefix_pos < self.prefix.len() {
            let n = (self.prefix.len() - self.prefix_pos).min(dest.len());
            dest[..n].copy_from_slice(&self.prefix[self.prefix_pos..self.prefix_pos + n]);
            self.prefix_pos += n;
            return Ok(n);
        }
        self.inner.read(dest)
    }
    fn take_tags(&mut self) -> TagList {
        self.inner.take_tags()
    }
}

impl Demuxer for AutoDemuxer {
    fn name(&self) -> &'static str {
        "auto"
    }

    fn config(&mut self, key: &str, value: &str) -> StageResult {
        if let Some(demux) = self.chosen.as_mut() {
            return demux.config(key, value);
        }
        Err(StageError::config("demuxer.auto", format!("no demuxer chosen yet, key {key}")))
    }

    fn open(&mut self, input: &mut dyn Input) -> StageResult<PacketSource> {
        self.sniff.ensure(input, 4)?;
        let magic = self.sniff.available().to_vec();

        let mut demux: Box<dyn Demuxer> = if magic.starts_with(b"OggS") {
            Box::new(OggDemuxer::new())
        } else if magic.starts_with(b"fLaC") {
            Box::new(FlacDemuxer::new())
        } else {
            Box::new(GenericDemuxer::new())
        };

        let mut prefixed = PrefixedInput { prefix: &magic, prefix_pos: 0, inner: input };
        let descriptor = demux.open(&mut prefixed)?;
        self.chosen = Some(demux);
        Ok(descriptor)
    }

    fn run(&mut self, input: &mut dyn Input) -> StageResult<(RunStatus, Packets)> {
        let demux = self.chosen.as_mut().ok_or_else(|| StageError::lifecycle("demuxer.auto", "run before open"))?;
        demux.run(input)
    }

    fn take_tags(&mut self) -> TagList {
        self.chosen.as_mut().map(Demuxer::take_tags).unwrap_or_default()
    }

    fn close(&mut self) -> StageResult {
        if let Some(demux) = self.chosen.as_mut() {
            demux.close()?;
        }
        Ok(())
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
    fn sniffs_generic_for_unknown_magic_and_preserves_bytes() {
        let mut input = ChunkInput { data: vec![1, 2, 3, 4, 5, 6, 7, 8], pos: 0 };
        let mut demux = AutoDemuxer::new();
        assert!(demux.config("sample-rate", "8000").is_err()); // not chosen yet
        let descriptor = demux.open(&mut input).unwrap();
        assert_eq!(descriptor.codec, "pcm");
        // with default packet-samples=1024 and s16/2ch, the 8-byte generic
        // test stream is shorter than one packet so this should EOF cleanly
        // once the chosen demuxer pulls from the wrapped input.
        let (status, packets) = demux.run(&mut input).unwrap();
        assert_eq!(status, RunStatus::EndOfStream);
        assert_eq!(packets[0].bytes.len(), 8);
    }

    #[test]
    fn sniffs_flac_magic() {
        let mut stream = b"fLaC".to_vec();
        let mut info = vec![0u8; 34];
        info[..2].copy_from_slice(&4096u16.to_be_bytes());
        info[2..4].copy_from_slice(&4096u16.to_be_bytes());
        stream.push(0x80);
        stream.extend_from_slice(&(info.len() as u32).to_be_bytes()[1..]);
        stream.extend_from_slice(&info);
        let mut input = ChunkInput { data: stream, pos: 0 };
        let mut demux = AutoDemuxer::new();
        let descriptor = demux.open(&mut input).unwrap();
        assert_eq!(descriptor.codec, "flac");
    }
}
