//! Filters (§4.5): pure sample-rate/channel-count/sample-format
//! transformers sitting both inside a `Source` (decoder -> filter) and at
//! the head of every `Destination` (rendezvous -> filter -> encoder). Two
//! flavors ship here: [`BufferFilter`] (buffer-only: accumulates until a
//! configured frame length, emits fixed-size frames — the spec's "at-least
//! a buffering implementation") and [`ConvertFilter`] (the "full" flavor's
//! in-scope slice: sample-format conversion via `samplefmt::convert`,
//! remembering the destination format across a reopen; actual resampling/
//! remixing DSP is an external collaborator, same footing as codec
//! bindings — §1 Out of scope). [`PassthroughFilter`] is the identity
//! filter used as the `Source`-side default (§4.11).

pub mod buffer;
pub mod convert;
pub mod passthrough;

pub use buffer::BufferFilter;
pub use convert::ConvertFilter;
pub use passthrough::PassthroughFilter;

use frame::{Frame, FrameSource};
use pipeline_core::{Frames, StageResult};

/// Contract every filter implements (§4.5). A filter MUST only report a
/// descriptor requiring downstream reopen when channel-layout or
/// sample_rate changes (`StreamDescriptor::requires_downstream_reopen`),
/// never on a sample-format-only change — the chain owner is the one
/// comparing descriptors and deciding whether to reopen, so `open` here
/// just needs to return an honest descriptor.
pub trait Filter: Send {
    fn name(&self) -> &'static str;

    fn config(&mut self, key: &str, value: &str) -> StageResult;

    fn open(&mut self, upstream: &FrameSource) -> StageResult<FrameSource>;

    fn submit_frame(&mut self, frame: Frame) -> StageResult<Frames>;

    /// Emit pending internal state; MUST NOT flush the downstream (§4.1).
    fn flush(&mut self) -> StageResult<Frames>;

    fn reset(&mut self) -> StageResult;

    fn close(&mut self) -> StageResult {
        Ok(())
    }
}
