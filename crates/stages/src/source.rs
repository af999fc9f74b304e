//! The `Source` chain owner (§4.11): `Input -> Demuxer -> Decoder -> Filter`,
//! driven on its own OS thread (owned and spawned by
//! [`crate::sourcelist::SourceList`]), fanning its output out to every
//! attached destination's [`rendezvous::Producer`].
//!
//! A mid-stream format change is detected here, not by re-invoking
//! `demuxer.open()`/`decoder.open()`: each decoded [`Frame`] carries its own
//! `sample_rate`/`channels`, and `step()` compares those against the last
//! descriptor it published. Only a change `StreamDescriptor::
//! requires_downstream_reopen` calls for (channel layout or sample rate,
//! never sample format alone) triggers the `Flush`/`Reset`/`Open` cascade to
//! every destination (§4.1, §4.11 "format changes").
//!
//! `RunStatus::EndOfSegment` is handled per the container-boundary case
//! (§4.11): only the decoder is flushed and reset, the demuxer and input
//! stay open and the read loop continues. `RunStatus::EndOfStream` ends the
//! loop; the caller (`SourceList`) is responsible for the final
//! `Event::Eof` broadcast once every source has finished.

use std::sync::Arc;

use frame::{Frame, FrameSource, StreamDescriptor};
use pipeline_core::{Counters, StageResult};
use rendezvous::{Event, Producer};
use tagmodel::TagList;
use tracing::debug;

use crate::decoder::Decoder;
use crate::demuxer::{Demuxer, RunStatus};
use crate::filter::Filter;
use crate::input::Input;

/// `Input -> Demuxer -> Decoder -> Filter`, one instance per `[source.*]`
/// section (§4.11).
pub struct Source {
    id: String,
    input: Box<dyn Input>,
    demuxer: Box<dyn Demuxer>,
    decoder: Box<dyn Decoder>,
    filter: Box<dyn Filter>,
    producers: Vec<Producer>,
    published: Option<StreamDescriptor>,
    next_pts: i64,
    counters: Arc<Counters>,
}

/// Why the source's read loop stopped (§4.11).
pub enum SourceExit {
    /// The input ran out cleanly (`RunStatus::EndOfStream`).
    EndOfStream,
    /// Every attached destination reported a non-zero, non-quit status;
    /// the source has nothing left to fan out to.
    NoDestinationsLeft,
    /// A destination (or this source's own stages) asked for cancellation.
    Cancelled,
}

impl Source {
    pub fn new(
        id: impl Into<String>,
        input: Box<dyn Input>,
        demuxer: Box<dyn Demuxer>,
        decoder: Box<dyn Decoder>,
        filter: Box<dyn Filter>,
        producers: Vec<Producer>,
    ) -> Self {
        Self {
            id: id.into(),
            input,
            demuxer,
            decoder,
            filter,
            producers,
            published: None,
            next_pts: 0,
            counters: Counters::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Shared handle to this source's activity counters (§6 `SIGUSR1`);
    /// callers clone it before the source moves onto its own thread.
    pub fn counters(&self) -> Arc<Counters> {
        self.counters.clone()
    }

    /// Attach additional destination producers discovered after
    /// construction (e.g. by the CLI's config-driven wiring, which builds
    /// every destination's rendezvous pair before it knows which source(s)
    /// reference it). Must be called before [`Source::open`].
    pub fn attach_producers(&mut self, producers: Vec<Producer>) {
        self.producers.extend(producers);
    }

    /// Open the whole chain and publish the first `Event::Open` to every
    /// destination (§4.11 step 1).
    pub fn open(&mut self) -> StageResult<()> {
        self.input.open()?;
        let packet_source = self.demuxer.open(self.input.as_mut())?;
        let frame_source = self.decoder.open(&packet_source)?;
        let published = self.filter.open(&frame_source)?;
        self.publish(&published);
        self.published = Some(published);
        Ok(())
    }

    /// Run until end of stream, cancellation, or every destination is gone.
    /// Drives `demuxer.run()` in a loop; this is the method `SourceList`
    /// calls on the source's dedicated thread.
    ///
    /// On a clean [`RunStatus::EndOfStream`], broadcasts the final
    /// `Event::Eof` to every attached destination before returning (§4.11,
    /// §5 "no FRAME after EOF"). On a fatal error, broadcasts an emergency
    /// `Event::Quit` to this source's own destinations before propagating
    /// the error upward (§7 "Cancelled ... propagates QUIT to all
    /// siblings"); escalating that quit to *other* sources' destinations
    /// per `stop-on-source-ending` is the wiring layer's job, since only it
    /// holds handles that outlive this source's thread.
    pub fn run(&mut self) -> StageResult<SourceExit> {
        match self.run_inner() {
            Ok(exit) => Ok(exit),
            Err(e) => {
                for producer in &self.producers {
                    producer.quit();
                }
                Err(e)
            }
        }
    }

    fn run_inner(&mut self) -> StageResult<SourceExit> {
        loop {
            if self.all_destinations_done() {
                return Ok(SourceExit::NoDestinationsLeft);
            }
            let (status, packets) = self.demuxer.run(self.input.as_mut())?;
            self.counters.bump_read();
            for packet in &packets {
                self.counters.bump_demux();
                let frames = self.decoder.submit_packet(packet)?;
                self.dispatch_frames(frames)?;
            }
            self.dispatch_tags()?;

            match status {
                RunStatus::Progress => {}
                RunStatus::EndOfSegment => {
                    let drained = self.decoder.flush()?;
                    self.dispatch_frames(drained)?;
                    self.broadcast(Event::Flush);
                    self.decoder.reset()?;
                    self.broadcast(Event::Reset);
                }
                RunStatus::EndOfStream => {
                    let drained = self.decoder.flush()?;
                    self.dispatch_frames(drained)?;
                    let drained = self.filter.flush()?;
                    self.dispatch_filtered(drained);
                    self.broadcast(Event::Flush);
                    self.broadcast(Event::Eof);
                    return Ok(SourceExit::EndOfStream);
                }
            }

            if self.all_statuses_cancelled() {
                return Ok(SourceExit::Cancelled);
            }
        }
    }

    fn publish(&self, descriptor: &FrameSource) {
        self.broadcast(Event::Open(descriptor.clone()));
    }

    fn broadcast(&self, event: Event) {
        for producer in &self.producers {
            producer.send(event.clone());
        }
    }

    fn all_destinations_done(&self) -> bool {
        !self.producers.is_empty() && self.all_statuses_cancelled()
    }

    fn all_statuses_cancelled(&self) -> bool {
        self.producers.iter().all(|p| p.status() != 0)
    }

    fn dispatch_tags(&mut self) -> StageResult<()> {
        let mut tags = self.input.take_tags();
        for tag in self.demuxer.take_tags().iter() {
            tags.push(tag.clone());
        }
        if !tags.is_empty() {
            self.broadcast(Event::Tags(tags));
        }
        Ok(())
    }

    fn dispatch_frames(&mut self, frames: Vec<Frame>) -> StageResult<()> {
        for frame in frames {
            self.counters.bump_decode();
            self.maybe_reopen(&frame)?;
            let mut frame = frame;
            frame.pts = self.next_pts;
            self.next_pts += frame.duration as i64;
            let filtered = self.filter.submit_frame(frame)?;
            self.dispatch_filtered(filtered);
        }
        Ok(())
    }

    fn dispatch_filtered(&mut self, frames: Vec<Frame>) {
        for frame in frames {
            self.counters.bump_filter();
            self.broadcast(Event::Frame(frame));
        }
    }

    /// Detect a live format change from the decoded frame's own fields and,
    /// if one calls for a downstream reopen, flush/reset/reopen the filter
    /// and cascade `Flush`/`Reset`/`Open` to every destination.
    fn maybe_reopen(&mut self, frame: &Frame) -> StageResult<()> {
        let Some(current) = &self.published else { return Ok(()) };
        let channel_layout = (1u64 << frame.channels) - 1;
        if current.sample_rate == frame.sample_rate && current.channel_layout == channel_layout {
            return Ok(());
        }
        let candidate = StreamDescriptor::new(
            current.codec.clone(),
            channel_layout,
            frame.sample_rate,
            current.frame_len,
        );
        if !current.requires_downstream_reopen(&candidate) {
            return Ok(());
        }
        debug!(source = %self.id, old_rate = current.sample_rate, new_rate = candidate.sample_rate, "format change detected, reopening");

        let drained = self.filter.flush()?;
        self.dispatch_filtered(drained);
        self.broadcast(Event::Flush);

        self.filter.reset()?;
        self.broadcast(Event::Reset);

        let published = self.filter.open(&candidate)?;
        self.next_pts = 0;
        self.publish(&published);
        self.published = Some(published);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::PassthroughDecoder;
    use crate::demuxer::GenericDemuxer;
    use crate::filter::PassthroughFilter;
    use crate::input::FileInput;

    fn new_source(producers: Vec<Producer>) -> Source {
        Source::new(
            "src0",
            Box::new(FileInput::new()),
            Box::new(GenericDemuxer::new()),
            Box::new(PassthroughDecoder::new()),
            Box::new(PassthroughFilter::new()),
            producers,
        )
    }

    #[test]
    fn all_destinations_done_is_false_before_any_attach() {
        let source = new_source(vec![]);
        assert!(!source.all_destinations_done());
    }

    #[test]
    fn all_destinations_done_once_every_producer_is_cancelled() {
        let (producer, consumer) = rendezvous::pair();
        producer.mark_cancelled(1);
        drop(consumer);
        let source = new_source(vec![producer]);
        assert!(source.all_destinations_done());
    }
}
