//! Fragmented MP4 muxer: one `ftyp+moov` INIT segment, then one
//! `moof+mdat` MEDIA segment per accumulated packet run (§1, §4.7).
//!
//! Box writing is grounded on the teacher's `crates/mp4` box-framing model
//! (`box_writer`); this rewrite only ever writes boxes (the teacher's
//! crate only ever parsed them), since codec-level sample-entry bodies
//! aren't defined by anything in scope here — they're filled from the
//! `PacketSource`'s codec-private-data blob unchanged.

use bytes::{BufMut, Bytes, BytesMut};
use frame::{Packet, PacketSource, Segment, SegmentInfo, SegmentSource};
use pipeline_core::{DownstreamCaps, ImageMode, Segments, StageError, StageResult};
use tagmodel::TagList;

use crate::Muxer;
use crate::box_writer::{finish, write_box, write_full_box};

pub const MEDIA_MIMETYPE: &str = "audio/mp4";

fn codec_fourcc(codec: &str) -> [u8; 4] {
    match codec {
        "aac" => *b"mp4a",
        "flac" => *b"fLaC",
        "opus" => *b"Opus",
        "alac" => *b"alac",
        _ => *b"mp4a",
    }
}

pub struct Fmp4Muxer {
    sample_rate: u32,
    channels: u32,
    codec: String,
    codec_private_data: Bytes,
    sequence_number: u32,
    base_decode_time: u64,
    image_mode: ImageMode,
    opened: bool,
}

impl Default for Fmp4Muxer {
    fn default() -> Self {
        Self {
            sample_rate: 0,
            channels: 0,
            codec: String::new(),
            codec_private_data: Bytes::new(),
            sequence_number: 1,
            base_decode_time: 0,
            image_mode: ImageMode::OutOfBand,
            opened: false,
        }
    }
}

impl Fmp4Muxer {
    pub fn new() -> Self {
        Self::default()
    }

    fn build_ftyp(out: &mut BytesMut) {
        write_box(out, b"ftyp", |out| {
            out.extend_from_slice(b"isom");
            out.put_u32(0);
            out.extend_from_slice(b"isom");
            out.extend_from_slice(b"iso6");
            out.extend_from_slice(b"mp41");
        });
    }

    fn build_moov(&self) -> Bytes {
        let mut out = BytesMut::new();
        write_box(&mut out, b"moov", |out| {
            write_full_box(out, b"mvhd", 0, 0, |out| {
                out.put_u32(0); // creation_time
                out.put_u32(0); // modification_time
                out.put_u32(self.sample_rate); // timescale
                out.put_u32(0); // duration (fragmented, unknown)
                out.put_i32(0x00010000); // rate 1.0
                out.put_i16(0x0100); // volume 1.0
                out.put_u16(0); // reserved
                out.put_u64(0); // reserved[2]
                for v in [0x00010000i32, 0, 0, 0, 0x00010000, 0, 0, 0, 0x40000000] {
                    out.put_i32(v); // unity matrix
                }
                for _ in 0..6 {
                    out.put_u32(0); // pre_defined
                }
                out.put_u32(2); // next_track_id
            });
            write_box(out, b"trak", |out| {
                write_full_box(out, b"tkhd", 0, 0x7, |out| {
                    out.put_u32(0);
                    out.put_u32(0);
                    out.put_u32(1); // track_id
                    out.put_u32(0);
                    out.put_u32(0); // duration
                    out.put_u64(0);
                    out.put_i16(0);
                    out.put_i16(0);
                    out.put_i16(0); // volume
                    out.put_i16(0);
                    for v in [0x00010000i32, 0, 0, 0, 0x00010000, 0, 0, 0, 0x40000000] {
                        out.put_i32(v);
                    }
                    out.put_u32(0); // width
                    out.put_u32(0); // height
                });
                write_box(out, b"mdia", |out| {
                    write_full_box(out, b"mdhd", 0, 0, |out| {
                        out.put_u32(0);
                        out.put_u32(0);
                        out.put_u32(self.sample_rate);
                        out.put_u32(0);
                        out.put_u16(0x55c4); // language "und"
                        out.put_u16(0);
                    });
                    write_full_box(out, b"hdlr", 0, 0, |out| {
                        out.put_u32(0);
                        out.extend_from_slice(b"soun");
                        out.put_u64(0);
                        out.put_u32(0);
                        out.extend_from_slice(b"SoundHandler\0");
                    });
                    write_box(out, b"minf", |out| {
                        write_full_box(out, b"smhd", 0, 0, |out| {
                            out.put_i16(0);
                            out.put_u16(0);
                        });
                        write_box(out, b"dinf", |out| {
                            write_full_box(out, b"dref", 0, 0, |out| {
                                out.put_u32(1);
                                write_full_box(out, b"url ", 0, 1, |_| {});
                            });
                        });
                        write_box(out, b"stbl", |out| {
                            write_full_box(out, b"stsd", 0, 0, |out| {
                                out.put_u32(1);
                                write_box(out, &codec_fourcc(&self.codec), |out| {
                                    out.put_u32(0);
                                    out.put_u16(0);
                                    out.put_u16(1); // data_reference_index
                                    out.put_u64(0);
                                    out.put_u16(self.channels.clamp(1, 8) as u16);
                                    out.put_u16(16); // sample size
                                    out.put_u16(0);
                                    out.put_u16(0);
                                    out.put_u32((self.sample_rate as u32) << 16);
                                    if !self.codec_private_data.is_empty() {
                                        write_box(out, b"esds", |out| {
                                            out.extend_from_slice(&self.codec_private_data);
                                        });
                                    }
                                });
                            });
                            write_full_box(out, b"stts", 0, 0, |out| out.put_u32(0));
                            write_full_box(out, b"stsc", 0, 0, |out| out.put_u32(0));
                            write_full_box(out, b"stsz", 0, 0, |out| {
                                out.put_u32(0);
                                out.put_u32(0);
                            });
                            write_full_box(out, b"stco", 0, 0, |out| out.put_u32(0));
                        });
                    });
                });
            });
            write_box(out, b"mvex", |out| {
                write_full_box(out, b"trex", 0, 0, |out| {
                    out.put_u32(1); // track_id
                    out.put_u32(1); // default_sample_description_index
                    out.put_u32(0); // default_sample_duration
                    out.put_u32(0); // default_sample_size
                    out.put_u32(0); // default_sample_flags
                });
            });
        });
        finish(out)
    }

    fn build_fragment(&mut self, packets: &[Packet]) -> Bytes {
        let sample_count = packets.len() as u32;
        let mut moof = BytesMut::new();
        write_box(&mut moof, b"moof", |out| {
            write_full_box(out, b"mfhd", 0, 0, |out| out.put_u32(self.sequence_number));
            write_box(out, b"traf", |out| {
                write_full_box(out, b"tfhd", 0, 0x020000, |out| out.put_u32(1));
                write_full_box(out, b"tfdt", 1, 0, |out| out.put_u64(self.base_decode_time));
                write_full_box(out, b"trun", 0, 0x701, |out| {
                    out.put_u32(sample_count);
                    out.put_i32(0); // data_offset, backpatched below
                    for p in packets {
                        out.put_u32(p.duration as u32);
                        out.put_u32(p.bytes.len() as u32);
                        out.put_u32(if p.sync_flag { 0x0200_0000 } else { 0x0101_0000 });
                    }
                });
            });
        });
        // Backpatch trun's data_offset: moof length + mdat header (8 bytes).
        let data_offset = (moof.len() + 8) as i32;
        patch_trun_data_offset(&mut moof, data_offset);

        let mut out = moof;
        write_box(&mut out, b"mdat", |out| {
            for p in packets {
                out.extend_from_slice(&p.bytes);
            }
        });
        self.sequence_number += 1;
        self.base_decode_time += packets.iter().map(|p| p.duration).sum::<u64>();
        finish(out)
    }
}

/// `trun`'s `data_offset` is written as a placeholder (0) during
/// `build_fragment` because it depends on `moof`'s own final size; this
/// patches it in afterwards. `trun` is the last box inside `traf`/`moof`
/// so it sits at a fixed 4-byte offset before the end of what's been
/// written so far.
fn patch_trun_data_offset(moof: &mut BytesMut, data_offset: i32) {
    // data_offset sits right after trun's full-box header (4) + sample_count (4),
    // i.e. 8 bytes into trun's body, which is the last box written.
    let trun_marker = b"trun";
    if let Some(pos) = moof.windows(4).rposition(|w| w == trun_marker) {
        let offset_pos = pos + 4 + 4 + 4; // fourcc + version/flags + sample_count
        moof[offset_pos..offset_pos + 4].copy_from_slice(&data_offset.to_be_bytes());
    }
}

impl Muxer for Fmp4Muxer {
    fn name(&self) -> &'static str {
        "fmp4"
    }

    fn config(&mut self, key: &str, value: &str) -> StageResult {
        match key {
            "image-mode" => {
                self.image_mode = match value {
                    "keep" => ImageMode::Keep,
                    "inband" => ImageMode::Inband,
                    "out-of-band" => ImageMode::OutOfBand,
                    "remove" => ImageMode::Remove,
                    other => return Err(StageError::config("fmp4", format!("unknown image-mode {other}"))),
                };
                Ok(())
            }
            other => Err(StageError::config("fmp4", format!("unknown key {other}"))),
        }
    }

    fn downstream_caps(&self) -> DownstreamCaps {
        DownstreamCaps { global_headers: true }
    }

    fn image_mode(&self) -> ImageMode {
        self.image_mode
    }

    fn segment_info(&self, time_base: u32, frame_len: u32) -> SegmentInfo {
        let frame_len = frame_len.max(1);
        SegmentInfo {
            segment_duration_ms: (frame_len as u64 * 1000) / time_base.max(1) as u64,
            packets_per_segment: 1,
        }
    }

    fn open(&mut self, upstream: &PacketSource) -> StageResult<(SegmentSource, Segments)> {
        self.sample_rate = upstream.sample_rate;
        self.channels = upstream.channels();
        self.codec = upstream.codec.clone();
        self.codec_private_data = upstream.codec_private_data.clone();
        self.sequence_number = 1;
        self.base_decode_time = 0;
        self.opened = true;

        let mut out = BytesMut::new();
        Self::build_ftyp(&mut out);
        out.extend_from_slice(&self.build_moov());
        let init_bytes = finish(out);

        let descriptor = SegmentSource::new(&self.codec, upstream.channel_layout, self.sample_rate, upstream.frame_len);
        Ok((descriptor, vec![Segment::init(init_bytes, MEDIA_MIMETYPE)]))
    }

    fn submit_packet(&mut self, packet: &Packet) -> StageResult<Segments> {
        if !self.opened {
            return Err(StageError::lifecycle("fmp4", "submit_packet before open"));
        }
        let bytes = self.build_fragment(std::slice::from_ref(packet));
        Ok(vec![Segment::media(bytes, MEDIA_MIMETYPE, packet.duration)])
    }

    fn submit_tags(&mut self, _tags: &TagList) -> StageResult<Segments> {
        // fMP4 tags (e.g. APIC/user text) are carried out-of-band by the
        // output's HLS engine, not inline in the fragment (§4.7 image_mode).
        Ok(Vec::new())
    }

    fn flush(&mut self) -> StageResult<Segments> {
        Ok(Vec::new())
    }

    fn reset(&mut self) -> StageResult {
        self.opened = false;
        self.sequence_number = 1;
        self.base_decode_time = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes as B;

    #[test]
    fn open_emits_single_init_segment() {
        let mut m = Fmp4Muxer::new();
        let src = PacketSource::new("flac", 0b11, 48000, 4096);
        let (_descriptor, segs) = m.open(&src).unwrap();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].kind, frame::SegmentKind::Init);
        assert!(segs[0].bytes.starts_with(&[0, 0, 0]) || segs[0].bytes.len() > 8);
        assert!(segs[0].bytes.windows(4).any(|w| w == b"ftyp"));
        assert!(segs[0].bytes.windows(4).any(|w| w == b"moov"));
    }

    #[test]
    fn media_fragment_contains_moof_and_mdat() {
        let mut m = Fmp4Muxer::new();
        let src = PacketSource::new("flac", 0b11, 48000, 4096);
        m.open(&src).unwrap();
        let packet = Packet::new(B::from_static(b"hello-frame"), 4096, 0, 48000, true);
        let segs = m.submit_packet(&packet).unwrap();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].kind, frame::SegmentKind::Media);
        assert!(segs[0].bytes.windows(4).any(|w| w == b"moof"));
        assert!(segs[0].bytes.windows(4).any(|w| w == b"mdat"));
        assert!(segs[0].bytes.windows(b"hello-frame".len()).any(|w| w == b"hello-frame"));
    }

    #[test]
    fn sequence_number_and_base_decode_time_advance() {
        let mut m = Fmp4Muxer::new();
        let src = PacketSource::new("flac", 0b11, 48000, 4096);
        m.open(&src).unwrap();
        let packet = Packet::new(B::from_static(b"abc"), 1000, 0, 48000, true);
        m.submit_packet(&packet).unwrap();
        assert_eq!(m.sequence_number, 2);
        assert_eq!(m.base_decode_time, 1000);
    }
}
