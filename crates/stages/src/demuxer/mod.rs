//! Demuxers (§4.3): identify the container framing and turn raw input
//! bytes into a stream of [`Packet`]s plus a [`PacketSource`] descriptor.
//! `auto` sniffs the first four bytes to pick a concrete demuxer; `ogg`
//! and `flac` peel container framing off without decoding the payload
//! codec (decoding itself is out of scope — see the `pcm`/`passthrough`
//! decoders); `generic` treats the stream as raw PCM chunks.

pub mod auto;
pub mod flac;
pub mod generic;
pub mod ogg;

pub use auto::AutoDemuxer;
pub use flac::FlacDemuxer;
pub use generic::GenericDemuxer;
pub use ogg::OggDemuxer;

use pipeline_core::{Packets, StageResult};
use tagmodel::TagList;

use crate::input::Input;
use frame::PacketSource;

/// What a demuxer's `run` call accomplished, mirroring the 0/1/2 return
/// convention in §4.11 without overloading an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Produced zero or more packets; caller should call `run` again.
    Progress,
    /// Clean end of stream.
    EndOfStream,
    /// The container signalled a stream change (e.g. a new Ogg logical
    /// stream). The caller flushes/resets the decoder and calls `run`
    /// again, per §4.11.
    EndOfSegment,
}

/// Contract every demuxer implements (§4.3). `open` may itself read bytes
/// from `input` (to sniff magic, parse headers) before returning the
/// descriptor it will emit.
pub trait Demuxer: Send {
    fn name(&self) -> &'static str;

    fn config(&mut self, key: &str, value: &str) -> StageResult;

    fn open(&mut self, input: &mut dyn Input) -> StageResult<PacketSource>;

    /// Pull more container framing from `input`, draining zero or more
    /// ready packets.
    fn run(&mut self, input: &mut dyn Input) -> StageResult<(RunStatus, Packets)>;

    /// Drain any tags discovered since the last call (e.g. Vorbis
    /// comments, out-of-band metadata blocks).
    fn take_tags(&mut self) -> TagList {
        TagList::new()
    }

    fn close(&mut self) -> StageResult {
        Ok(())
    }
}

/// Growable front-of-stream buffer shared by every demuxer: pulls bytes
/// off `Input` in driver-sized chunks and lets the container parser ask
/// for "at least N bytes buffered" without caring about the driver's
/// actual read granularity.
pub(crate) struct ReadBuf {
    buf: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl ReadBuf {
    pub(crate) fn new() -> Self {
        Self { buf: Vec::new(), pos: 0, eof: false }
    }

    /// Ensure at least `want` unconsumed bytes are buffered, pulling more
    /// from `input` as needed. Returns `false` if `input` hit EOF before
    /// `want` bytes became available (the caller then sees whatever is
    /// left via [`ReadBuf::available`]).
    pub(crate) fn ensure(&mut self, input: &mut dyn Input, want: usize) -> StageResult<bool> {
        const CHUNK: usize = 4096;
        if self.pos > 0 && self.pos == self.buf.len() {
            self.buf.clear();
            self.pos = 0;
        }
        while self.buf.len() - self.pos < want && !self.eof {
            let start = self.buf.len();
            self.buf.resize(start + CHUNK, 0);
            let n = input.read(&mut self.buf[start..])?;
            self.buf.truncate(start + n);
            if n == 0 {
                self.eof = true;
            }
        }
        Ok(self.buf.len() - self.pos >= want)
    }

    pub(crate) fn available(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    pub(crate) fn consume(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.buf.len());
    }

    pub(crate) fn is_eof(&self) -> bool {
        self.eof && self.pos >= self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_core::StageError;

    struct FixedInput {
        chunks: Vec<Vec<u8>>,
    }

    impl Input for FixedInput {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn config(&mut self, _key: &str, _value: &str) -> StageResult {
            Ok(())
        }
        fn open(&mut self) -> StageResult {
            Ok(())
        }
        fn read(&mut self, dest: &mut [u8]) -> StageResult<usize> {
            if self.chunks.is_empty() {
                return Ok(0);
            }
            let chunk = self.chunks.remove(0);
            let n = chunk.len().min(dest.len());
            dest[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                // put the remainder back for the next read
                self.chunks.insert(0, chunk[n..].to_vec());
            }
            Ok(n)
        }
        fn take_tags(&mut self) -> TagList {
            TagList::new()
        }
    }

    fn err_input() -> impl Input {
        struct Bad;
        impl Input for Bad {
            fn name(&self) -> &'static str {
                "bad"
            }
            fn config(&mut self, _: &str, _: &str) -> StageResult {
                Ok(())
            }
            fn open(&mut self) -> StageResult {
                Ok(())
            }
            fn read(&mut self, _dest: &mut [u8]) -> StageResult<usize> {
                Err(StageError::format("input.bad", "boom"))
            }
            fn take_tags(&mut self) -> TagList {
                TagList::new()
            }
        }
        Bad
    }

    #[test]
    fn ensure_pulls_across_multiple_reads() {
        let mut input = FixedInput { chunks: vec![vec![1, 2], vec![3, 4, 5]] };
        let mut buf = ReadBuf::new();
        assert!(buf.ensure(&mut input, 5).unwrap());
        assert_eq!(buf.available(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn ensure_reports_short_read_at_eof() {
        let mut input = FixedInput { chunks: vec![vec![1, 2]] };
        let mut buf = ReadBuf::new();
        assert!(!buf.ensure(&mut input, 5).unwrap());
        assert_eq!(buf.available(), &[1, 2]);
        assert!(buf.is_eof());
    }

    #[test]
    fn consume_advances_and_compacts() {
        let mut input = FixedInput { chunks: vec![vec![1, 2, 3, 4]] };
        let mut buf = ReadBuf::new();
        buf.ensure(&mut input, 4).unwrap();
        buf.consume(2);
        assert_eq!(buf.available(), &[3, 4]);
    }

    #[test]
    fn propagates_read_errors() {
        let mut input = err_input();
        let mut buf = ReadBuf::new();
        assert!(buf.ensure(&mut input, 1).is_err());
    }
}
