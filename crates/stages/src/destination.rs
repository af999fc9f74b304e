//! The `Destination` chain owner (§4.12): `Filter -> Encoder -> Muxer ->
//! Output`, driven as a [`rendezvous::EventHandler`] on its own OS thread
//! (owned and spawned by [`crate::destinationlist::DestinationList`]).
//!
//! `on_open` runs the full open cascade (every mid-stream `Event::Open` a
//! `Source` sends already represents a reopen-worthy format change, per
//! `StreamDescriptor::requires_downstream_reopen` — see [`crate::source`]),
//! `on_reset` re-arms all four stages, and `on_flush` drains only the
//! filter (§4.1 "flush MUST NOT flush the downstream") forwarding its
//! output through the still-open encoder/muxer/output.

use std::sync::Arc;

use frame::{Frame, FrameSource, Packet, Segment};
use muxers::Muxer;
use outputs::{Output, PictureRef};
use pipeline_core::{Counters, ErrorKind, ImageMode, StageError, StageResult};
use rendezvous::{EventHandler, STATUS_QUIT};
use tagmodel::{MergePolicy, TagList, TagMapEntry, UnknownTagPolicy, decode_picture_tag, encode_picture_tag};
use timeutil::IchTime;
use tracing::{error, warn};

use crate::encoder::Encoder;
use crate::filter::Filter;

/// Per-destination tag handling (§6 `[destination.<id>]` `tagmap`/
/// `unknown-tags`/`duplicate-tags` keys): which `[tagmap.<id>]` table (if
/// any) rewrites source tag keys into this destination's container
/// vocabulary before they reach the muxer/output.
#[derive(Default)]
pub struct TagPolicy {
    /// `None` means `tagmap=disable` (§6): tags pass straight through,
    /// unmapped, to the muxer/output.
    pub tagmap: Option<TagMapEntry>,
    pub merge: MergePolicy,
    pub unknown: UnknownTagPolicy,
}

/// `Filter -> Encoder -> Muxer -> Output`, one instance per `[destination.*]`
/// section (§4.12).
pub struct Destination {
    id: String,
    filter: Box<dyn Filter>,
    encoder: Box<dyn Encoder>,
    muxer: Box<dyn Muxer>,
    output: Box<dyn Output>,
    tag_policy: TagPolicy,
    opened: bool,
    counters: Arc<Counters>,
}

impl Destination {
    pub fn new(
        id: impl Into<String>,
        filter: Box<dyn Filter>,
        encoder: Box<dyn Encoder>,
        muxer: Box<dyn Muxer>,
        mut output: Box<dyn Output>,
        tag_policy: TagPolicy,
        now: IchTime,
    ) -> Self {
        output.set_clock(now);
        Self { id: id.into(), filter, encoder, muxer, output, tag_policy, opened: false, counters: Counters::new() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Shared handle to this destination's activity counters (§6
    /// `SIGUSR1`); callers clone it before the destination moves onto its
    /// own thread.
    pub fn counters(&self) -> Arc<Counters> {
        self.counters.clone()
    }

    fn status_of(&self, result: StageResult) -> i32 {
        match result {
            Ok(()) => 0,
            Err(e) => {
                error!(destination = %self.id, stage = e.stage, kind = %e.kind, error = %e.message, "destination stage failed");
                if matches!(e.kind, ErrorKind::Cancelled) { STATUS_QUIT } else { 1 }
            }
        }
    }

    /// Push frames through encoder -> muxer -> output, in order.
    fn push_frames(&mut self, frames: Vec<Frame>) -> StageResult {
        for frame in frames {
            self.counters.bump_filter();
            let packets = self.encoder.submit_frame(frame)?;
            self.push_packets(packets)?;
        }
        Ok(())
    }

    fn push_packets(&mut self, packets: Vec<Packet>) -> StageResult {
        for packet in &packets {
            self.counters.bump_encode();
            let segments = self.muxer.submit_packet(packet)?;
            self.push_segments(segments)?;
        }
        Ok(())
    }

    fn push_segments(&mut self, segments: Vec<Segment>) -> StageResult {
        for segment in &segments {
            self.counters.bump_mux();
            self.output.submit_segment(segment)?;
            self.counters.bump_output();
        }
        Ok(())
    }

    /// Apply this destination's tagmap (if any), then intercept an
    /// out-of-band picture tag per the muxer's `image_mode()` (§4.7/§4.8
    /// item 6), handing its bytes to `Output::submit_picture` and rewriting
    /// the tag's value to the URL reference that comes back.
    fn route_tags(&mut self, tags: &TagList) -> StageResult<TagList> {
        let mapped = match &self.tag_policy.tagmap {
            Some(entry) => entry.map(tags, self.tag_policy.merge, self.tag_policy.unknown),
            None => tags.clone(),
        };

        let mut out = TagList::new();
        for tag in mapped.iter() {
            if !tag.key_eq(tagmodel::PICTURE_TAG_KEY) {
                out.push(tag.clone());
                continue;
            }
            let Some((mime, bytes)) = decode_picture_tag(tag) else {
                warn!(destination = %self.id, "dropping malformed picture tag");
                continue;
            };
            match self.muxer.image_mode() {
                ImageMode::Remove => {}
                ImageMode::Keep | ImageMode::Inband => out.push(tag.clone()),
                ImageMode::OutOfBand => match self.output.submit_picture(mime, bytes)? {
                    Some(PictureRef { mime, filename }) => {
                        out.push(encode_picture_tag(mime, filename.as_bytes(), tag.priority));
                    }
                    None => warn!(destination = %self.id, mime, "output rejected out-of-band picture"),
                },
            }
        }
        Ok(out)
    }
}

impl EventHandler for Destination {
    fn on_open(&mut self, upstream: &FrameSource) -> i32 {
        let result = (|| -> StageResult {
            let filter_out = self.filter.open(upstream)?;
            let packet_source = self.encoder.open(&filter_out, self.muxer.downstream_caps())?;
            let (segment_source, init_segments) = self.muxer.open(&packet_source)?;
            self.output.open(self.muxer.name(), &segment_source)?;
            self.push_segments(init_segments)?;
            self.opened = true;
            Ok(())
        })();
        self.status_of(result)
    }

    fn on_frame(&mut self, frame: Frame) -> i32 {
        if !self.opened {
            return self.status_of(Err(StageError::lifecycle(
                "destination",
                "frame delivered before open()",
            )));
        }
        let result = (|| -> StageResult {
            let frames = self.filter.submit_frame(frame)?;
            self.push_frames(frames)
        })();
        self.status_of(result)
    }

    fn on_tags(&mut self, tags: TagList) -> i32 {
        let result = (|| -> StageResult {
            let routed = self.route_tags(&tags)?;
            let segments = self.muxer.submit_tags(&routed)?;
            self.push_segments(segments)?;
            self.output.submit_tags(&routed)
        })();
        self.status_of(result)
    }

    fn on_flush(&mut self) -> i32 {
        let result = (|| -> StageResult {
            let frames = self.filter.flush()?;
            self.push_frames(frames)
        })();
        self.status_of(result)
    }

    fn on_reset(&mut self) -> i32 {
        let result = (|| -> StageResult {
            self.filter.reset()?;
            self.encoder.reset()?;
            self.muxer.reset()?;
            self.output.reset()?;
            self.opened = false;
            Ok(())
        })();
        self.status_of(result)
    }

    fn on_eof(&mut self) -> i32 {
        let result = (|| -> StageResult {
            let frames = self.filter.flush()?;
            self.push_frames(frames)?;
            let packets = self.encoder.flush()?;
            self.push_packets(packets)?;
            let segments = self.muxer.flush()?;
            self.push_segments(segments)?;
            self.output.flush()?;
            self.filter.close()?;
            self.encoder.close()?;
            self.muxer.close()?;
            self.output.close()
        })();
        self.status_of(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::PassthroughEncoder;
    use crate::filter::PassthroughFilter;
    use muxers::packed::PackedMuxer;
    use outputs::StdoutOutput;

    fn new_destination() -> Destination {
        Destination::new(
            "dest0",
            Box::new(PassthroughFilter::new()),
            Box::new(PassthroughEncoder::new()),
            Box::new(PackedMuxer::new()),
            Box::new(StdoutOutput::new()),
            TagPolicy::default(),
            IchTime::now(),
        )
    }

    fn binary_frame(pts: i64) -> Frame {
        let packet = Packet::new(bytes::Bytes::from_static(b"abcd"), 1152, pts, 44100, true);
        Frame::new_binary(2, 44100, pts, packet)
    }

    #[test]
    fn rejects_frame_before_open() {
        let mut dest = new_destination();
        assert_ne!(dest.on_frame(binary_frame(0)), 0);
    }

    #[test]
    fn open_then_frame_then_eof_succeeds() {
        let mut dest = new_destination();
        let upstream = FrameSource::new("mp3", 0b11, 44100, 1152);
        assert_eq!(dest.on_open(&upstream), 0);
        assert_eq!(dest.on_frame(binary_frame(0)), 0);
        assert_eq!(dest.on_eof(), 0);
    }

    #[test]
    fn out_of_band_picture_is_rewritten_to_a_url_sentinel() {
        let mut dest = new_destination();
        let upstream = FrameSource::new("mp3", 0b11, 44100, 1152);
        assert_eq!(dest.on_open(&upstream), 0);

        let mut tags = TagList::new();
        tags.push(encode_picture_tag("image/png", b"png-bytes", 0));
        assert_eq!(dest.on_tags(tags), 0);
    }

    #[test]
    fn removed_image_mode_drops_the_picture_tag() {
        let mut dest = Destination::new(
            "dest1",
            Box::new(PassthroughFilter::new()),
            Box::new(PassthroughEncoder::new()),
            Box::new({
                let mut m = PackedMuxer::new();
                m.config("image-mode", "remove").unwrap();
                m
            }),
            Box::new(StdoutOutput::new()),
            TagPolicy::default(),
            IchTime::now(),
        );
        let upstream = FrameSource::new("mp3", 0b11, 44100, 1152);
        assert_eq!(dest.on_open(&upstream), 0);
        let mut tags = TagList::new();
        tags.push(encode_picture_tag("image/png", b"png-bytes", 0));
        assert_eq!(dest.on_tags(tags), 0);
    }
}
