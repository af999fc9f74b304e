//! # The HLS segmentation engine
//!
//! Owns the circular playlist, the growing "partial segment" byte buffer,
//! media-sequence/discontinuity-sequence bookkeeping, `#EXT-X-PROGRAM-
//! DATE-TIME` generation and the out-of-band picture side-channel (§4.8).
//! Generic over a [`SegmentWriter`] so the same engine drives a folder,
//! HTTP/S3, or (conceptually) any other `write(name,bytes)`/`delete(name)`
//! sink — concrete drivers live in the `outputs` crate.
//!
//! ## License
//!
//! MIT License
//!
//! ## Authors
//!
//! - hua0512
//!

pub mod picture;
pub mod playlist;

pub use picture::{PICTURE_REDIRECT_MIME, PictureCounter, extension_for_mime, picture_filename};
pub use playlist::{HlsPlaylist, HlsSegmentMeta};

use bytes::{Bytes, BytesMut};
use frame::SegmentSource;
use timeutil::{IchFrac, IchTime};

const EXTM3U_VERSION: u32 = 7;

#[derive(Debug, thiserror::Error)]
pub enum HlsError<E: std::error::Error + Send + Sync + 'static> {
    #[error("hls engine used before open()")]
    NotOpen,
    #[error("writer error: {0}")]
    Writer(#[source] E),
}

/// What a concrete output driver specializes (§4.8): write a named file
/// with a MIME type, or delete one by name. Folder/HTTP/S3/Icecast drivers
/// in the `outputs` crate implement this.
pub trait SegmentWriter {
    type Error: std::error::Error + Send + Sync + 'static;
    fn write(&mut self, filename: &str, bytes: &[u8], mime: &str) -> Result<(), Self::Error>;
    fn delete(&mut self, filename: &str) -> Result<(), Self::Error>;
}

struct PartialSegment {
    bytes: BytesMut,
    samples: u64,
    expired_files: Vec<String>,
    discontinuity: bool,
}

impl PartialSegment {
    fn new() -> Self {
        Self { bytes: BytesMut::new(), samples: 0, expired_files: Vec::new(), discontinuity: false }
    }

    fn take(&mut self) -> (Bytes, u64, Vec<String>, bool) {
        let bytes = std::mem::take(&mut self.bytes).freeze();
        let samples = self.samples;
        let expired = std::mem::take(&mut self.expired_files);
        let disc = std::mem::replace(&mut self.discontinuity, false);
        self.samples = 0;
        (bytes, samples, expired, disc)
    }
}

/// Static configuration captured at [`HlsState::open`].
#[derive(Debug, Clone)]
pub struct HlsOpenConfig {
    pub target_duration_s: u32,
    pub playlist_length_s: u32,
    pub entry_prefix: String,
    pub playlist_filename: String,
    pub media_extension: String,
    pub init_extension: String,
}

impl Default for HlsOpenConfig {
    /// §6 defaults: a 6s target duration, a five-minute (50-segment)
    /// playlist window, no prefix and the conventional `stream.m3u8` name.
    /// `open()` always overwrites the extensions from the muxer's name.
    fn default() -> Self {
        Self {
            target_duration_s: 6,
            playlist_length_s: 300,
            entry_prefix: String::new(),
            playlist_filename: "stream.m3u8".into(),
            media_extension: String::new(),
            init_extension: String::new(),
        }
    }
}

/// The HLS engine (§3 `HlsState`).
pub struct HlsState {
    cfg: HlsOpenConfig,
    time_base: u32,
    target_samples: u64,
    playlist: HlsPlaylist,
    media_sequence: u64,
    discontinuity_sequence: u64,
    counter: u64,
    now: IchTime,
    partial: PartialSegment,
    init_filename: Option<String>,
    header_map_line: Option<String>,
    /// MIME of the bytes currently accumulating in `partial`, set by the
    /// most recent [`HlsState::add_media`] call (§4.8 item 4: each
    /// segment's Content-Type comes from the muxer that produced it, not a
    /// fixed per-output value).
    media_mime: String,
}

impl HlsState {
    /// `segment_source.frame_len` is the encoder's native frame length;
    /// `segment_source.sample_rate` is the muxer's time base (§4.8 item 1).
    pub fn open(segment_source: &SegmentSource, cfg: HlsOpenConfig) -> Self {
        Self::open_at(segment_source, cfg, IchTime::now())
    }

    /// Same as [`HlsState::open`], but with an explicit wall-clock start
    /// instead of sampling real time (§4.12 "set wall-clock on output") —
    /// lets a `Destination` inject one shared clock across every output it
    /// owns, and lets tests be deterministic.
    pub fn open_at(segment_source: &SegmentSource, cfg: HlsOpenConfig, now: IchTime) -> Self {
        let time_base = segment_source.sample_rate.max(1);
        let frame_len = segment_source.frame_len.max(1) as u64;
        let packets_per_segment =
            (cfg.target_duration_s as u64 * time_base as u64).div_ceil(frame_len);
        let target_samples = packets_per_segment * frame_len;

        let extra = 1; // accounts for the active partial segment (§4.8 capacity formula)
        let capacity = (cfg.playlist_length_s as u64 / cfg.target_duration_s.max(1) as u64) as usize + extra;

        Self {
            cfg,
            time_base,
            target_samples,
            playlist: HlsPlaylist::new(capacity),
            media_sequence: 1,
            discontinuity_sequence: 0,
            counter: 1,
            now,
            partial: PartialSegment::new(),
            init_filename: None,
            header_map_line: None,
            media_mime: String::new(),
        }
    }

    /// Mark the segment currently accumulating as starting a discontinuity
    /// (§10.2): call this when an upstream `flush;reset;open` reopen lands
    /// mid-accumulation.
    pub fn mark_discontinuity(&mut self) {
        self.partial.discontinuity = true;
    }

    /// Re-open after a mid-stream format-change reopen (§4.1 `flush;
    /// reset; open`, §10 item 2/3), as opposed to the very first `open()`
    /// of a destination's lifetime. Unlike [`HlsState::open_at`], this
    /// keeps the circular playlist, media-sequence and
    /// discontinuity-sequence bookkeeping intact across the boundary
    /// instead of starting a fresh playlist from media-sequence 1 — a
    /// format change is not a new output session. Any bytes already
    /// accumulated under the old format are flushed first as one last
    /// ordinary segment so the reopen loses no samples (§8 S5 "no samples
    /// lost"), then the *next* segment built under the new format is
    /// marked as a discontinuity.
    pub fn reopen<W: SegmentWriter>(
        &mut self,
        segment_source: &SegmentSource,
        cfg: HlsOpenConfig,
        writer: &mut W,
    ) -> Result<(), HlsError<W::Error>> {
        if self.partial.samples > 0 || !self.partial.bytes.is_empty() {
            self.flush_segment(writer)?;
        }
        self.time_base = segment_source.sample_rate.max(1);
        let frame_len = segment_source.frame_len.max(1) as u64;
        let packets_per_segment = (cfg.target_duration_s as u64 * self.time_base as u64).div_ceil(frame_len);
        self.target_samples = packets_per_segment * frame_len;
        self.cfg = cfg;
        self.mark_discontinuity();
        Ok(())
    }

    /// Write the one-time INIT segment (§4.8 item 4) and record the
    /// `#EXT-X-MAP` line every subsequent playlist render carries.
    pub fn write_init_segment<W: SegmentWriter>(
        &mut self,
        bytes: &[u8],
        mime: &str,
        writer: &mut W,
    ) -> Result<(), HlsError<W::Error>> {
        let filename = format!("init{}", self.cfg.init_extension);
        writer.write(&filename, bytes, mime).map_err(HlsError::Writer)?;
        self.header_map_line =
            Some(format!("#EXT-X-MAP:URI=\"{}{}\"", self.cfg.entry_prefix, filename));
        self.init_filename = Some(filename);
        Ok(())
    }

    /// Accumulate media bytes; flushes a segment once `samples` crosses
    /// `target_samples` (§4.8 item 2/3).
    pub fn add_media<W: SegmentWriter>(
        &mut self,
        bytes: &[u8],
        samples: u64,
        mime: &str,
        writer: &mut W,
    ) -> Result<(), HlsError<W::Error>> {
        mime.clone_into(&mut self.media_mime);
        self.partial.bytes.extend_from_slice(bytes);
        self.partial.samples += samples;
        if self.partial.samples >= self.target_samples {
            self.flush_segment(writer)?;
        }
        Ok(())
    }

    /// Out-of-band picture (§4.8 item 6). Returns `None` for an
    /// unrecognised MIME type (picture is skipped, §6).
    pub fn submit_picture<W: SegmentWriter>(
        &mut self,
        mime: &str,
        bytes: &[u8],
        counter: &PictureCounter,
        writer: &mut W,
    ) -> Result<Option<String>, HlsError<W::Error>> {
        let Some(ext) = extension_for_mime(mime) else {
            return Ok(None);
        };
        let filename = picture_filename(counter.next_id(), ext);
        writer.write(&filename, bytes, mime).map_err(HlsError::Writer)?;
        self.partial.expired_files.push(filename.clone());
        Ok(Some(filename))
    }

    fn flush_segment<W: SegmentWriter>(&mut self, writer: &mut W) -> Result<(), HlsError<W::Error>> {
        if self.playlist.is_full() {
            if let Some(evicted) = self.playlist.pop_front() {
                writer.delete(&evicted.filename).map_err(HlsError::Writer)?;
                for extra in &evicted.expired_files {
                    writer.delete(extra).map_err(HlsError::Writer)?;
                }
                self.media_sequence += 1;
                if evicted.discontinuity {
                    self.discontinuity_sequence += 1;
                }
            }
        }

        let (bytes, samples, expired_files, discontinuity) = self.partial.take();
        let filename = format!("{:08}{}", self.counter, self.cfg.media_extension);
        self.counter += 1;

        let pdt = self.now.to_tm().to_iso8601_millis();
        let extinf = samples as f64 / self.time_base as f64;
        let mut fragment = String::new();
        if discontinuity {
            fragment.push_str("#EXT-X-DISCONTINUITY\n");
        }
        fragment.push_str(&format!(
            "#EXT-X-PROGRAM-DATE-TIME:{pdt}\n#EXTINF:{extinf},\n{}{filename}\n",
            self.cfg.entry_prefix
        ));

        writer.write(&filename, &bytes, &self.media_mime).map_err(HlsError::Writer)?;
        self.now.add_frac(&IchFrac::new(samples as i64, self.time_base as i64));

        self.playlist.push_back(HlsSegmentMeta {
            filename,
            playlist_fragment: fragment,
            expired_files,
            discontinuity,
        });
        Ok(())
    }

    /// End-of-stream (§4.8 item 5): flush whatever partial bytes remain as
    /// a final (possibly short) segment, then append `#EXT-X-ENDLIST`.
    pub fn eos_flush<W: SegmentWriter>(&mut self, writer: &mut W) -> Result<(), HlsError<W::Error>> {
        if self.partial.samples > 0 || !self.partial.bytes.is_empty() {
            self.flush_segment(writer)?;
        }
        Ok(())
    }

    /// Number of `#EXTINF` entries currently in the playlist (§8 P6).
    pub fn segment_count(&self) -> usize {
        self.playlist.len()
    }

    pub fn media_sequence(&self) -> u64 {
        self.media_sequence
    }

    pub fn discontinuity_sequence(&self) -> u64 {
        self.discontinuity_sequence
    }

    /// Render the full playlist text (§6 grammar). Pass `ended = true` on
    /// end-of-stream to append `#EXT-X-ENDLIST`.
    pub fn render_playlist(&self, ended: bool) -> String {
        let mut out = String::new();
        out.push_str("#EXTM3U\n");
        out.push_str(&format!("#EXT-X-TARGETDURATION:{}\n", self.cfg.target_duration_s));
        out.push_str(&format!("#EXT-X-VERSION:{EXTM3U_VERSION}\n"));
        if let Some(map) = &self.header_map_line {
            out.push_str(map);
            out.push('\n');
        }
        out.push_str(&format!("#EXT-X-MEDIA-SEQUENCE:{}\n", self.media_sequence));
        if self.discontinuity_sequence > 0 {
            out.push_str(&format!("#EXT-X-DISCONTINUITY-SEQUENCE:{}\n", self.discontinuity_sequence));
        }
        out.push('\n');
        for meta in self.playlist.iter() {
            out.push_str(&meta.playlist_fragment);
        }
        if ended {
            out.push_str("#EXT-X-ENDLIST\n");
        }
        out
    }

    pub fn write_playlist<W: SegmentWriter>(
        &self,
        ended: bool,
        writer: &mut W,
    ) -> Result<(), HlsError<W::Error>> {
        let text = self.render_playlist(ended);
        writer
            .write(&self.cfg.playlist_filename, text.as_bytes(), "application/vnd.apple.mpegurl")
            .map_err(HlsError::Writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MemoryWriter {
        files: HashMap<String, Vec<u8>>,
        deleted: Vec<String>,
    }

    impl MemoryWriter {
        fn new() -> Self {
            Self { files: HashMap::new(), deleted: Vec::new() }
        }
    }

    impl SegmentWriter for MemoryWriter {
        type Error = std::convert::Infallible;
        fn write(&mut self, filename: &str, bytes: &[u8], _mime: &str) -> Result<(), Self::Error> {
            self.files.insert(filename.to_string(), bytes.to_vec());
            Ok(())
        }
        fn delete(&mut self, filename: &str) -> Result<(), Self::Error> {
            self.files.remove(filename);
            self.deleted.push(filename.to_string());
            Ok(())
        }
    }

    fn open_engine(target_duration_s: u32, playlist_length_s: u32) -> HlsState {
        // frame_len=960 divides 48000 exactly (50 frames/second), so
        // `target_samples` comes out to an exact multiple of one second at
        // any whole-second `target_duration_s` instead of rounding up past
        // it (§4.8 item 1's `div_ceil` only bites when `frame_len` doesn't
        // divide the segment length evenly) — keeps the tests' sample
        // counts lining up with the seconds of audio they claim to model.
        let descriptor = SegmentSource::new("flac", 0b11, 48000, 960);
        let cfg = HlsOpenConfig {
            target_duration_s,
            playlist_length_s,
            entry_prefix: String::new(),
            playlist_filename: "stream.m3u8".into(),
            media_extension: ".m4s".into(),
            init_extension: ".mp4".into(),
        };
        HlsState::open(&descriptor, cfg)
    }

    #[test]
    fn s1_single_one_second_segment() {
        let mut hls = open_engine(1, 5);
        let mut w = MemoryWriter::new();
        hls.write_init_segment(b"moov", "audio/mp4", &mut w).unwrap();
        // 48000 Hz, exactly 1s worth of samples in one shot.
        hls.add_media(b"mdat", 48000, "audio/mp4", &mut w).unwrap();
        hls.write_playlist(false, &mut w).unwrap();

        assert!(w.files.contains_key("init.mp4"));
        assert!(w.files.contains_key("00000001.m4s"));
        assert_eq!(hls.media_sequence(), 1);
        let text = hls.render_playlist(false);
        assert!(text.contains("#EXT-X-MAP:URI=\"init.mp4\""));
        assert!(text.contains("#EXT-X-MEDIA-SEQUENCE:1"));
        assert!(text.contains("#EXTINF:1,"));
    }

    #[test]
    fn s2_tail_partial_flushed_on_eos() {
        let mut hls = open_engine(2, 10);
        let mut w = MemoryWriter::new();
        hls.write_init_segment(b"moov", "audio/mp4", &mut w).unwrap();
        // 5.5s @ 48kHz fed as three 2s-ish chunks then EOF.
        for _ in 0..2 {
            hls.add_media(b"x", 96000, "audio/mp4", &mut w).unwrap();
        }
        hls.add_media(b"x", 72000, "audio/mp4", &mut w).unwrap(); // 1.5s tail
        hls.eos_flush(&mut w).unwrap();
        hls.write_playlist(true, &mut w).unwrap();

        assert_eq!(hls.segment_count(), 3);
        assert_eq!(hls.media_sequence(), 1);
        let text = hls.render_playlist(true);
        assert!(text.ends_with("#EXT-X-ENDLIST\n"));
        assert!(text.contains("00000003.m4s"));
    }

    #[test]
    fn p5_eviction_and_media_sequence_track_capacity() {
        let mut hls = open_engine(1, 3); // capacity 4 (3/1 + 1 extra)
        let mut w = MemoryWriter::new();
        for _ in 0..10 {
            hls.add_media(b"x", 48000, "audio/mp4", &mut w).unwrap();
        }
        // capacity = 4, 10 pushes -> 6 evictions, media_sequence = 1 + 6.
        assert_eq!(hls.media_sequence(), 7);
        assert_eq!(hls.segment_count(), 4);
    }

    #[test]
    fn p6_extinf_count_matches_segment_count() {
        let mut hls = open_engine(1, 5);
        let mut w = MemoryWriter::new();
        for _ in 0..3 {
            hls.add_media(b"x", 48000, "audio/mp4", &mut w).unwrap();
        }
        let text = hls.render_playlist(false);
        assert_eq!(text.matches("#EXTINF").count(), hls.segment_count());
        assert_eq!(text.matches(".m4s").count(), hls.segment_count());
    }

    #[test]
    fn p7_program_date_time_is_monotonic_by_exact_duration() {
        let mut hls = open_engine(1, 5);
        let mut w = MemoryWriter::new();
        let before = hls.now;
        hls.add_media(b"x", 48000, "audio/mp4", &mut w).unwrap();
        let mut expected = before;
        expected.add_frac(&IchFrac::new(48000, 48000));
        assert_eq!(hls.now, expected);
    }

    #[test]
    fn picture_expires_with_its_segment() {
        let mut hls = open_engine(1, 5);
        let mut w = MemoryWriter::new();
        let counter = PictureCounter::new();
        let name = hls.submit_picture("image/png", b"png-bytes", &counter, &mut w).unwrap().unwrap();
        assert_eq!(name, "00000000.png");
        hls.add_media(b"x", 48000, "audio/mp4", &mut w).unwrap(); // flushes segment 1, carrying the picture
        // capacity is 6 (playlist_length_s=5, target_duration_s=1, +1 for
        // the active partial); segment 1 above is push #1, so 6 more pushes
        // (#2..#7) are needed before the 7th push forces an eviction.
        for _ in 0..6 {
            hls.add_media(b"x", 48000, "audio/mp4", &mut w).unwrap();
        }
        assert!(w.deleted.contains(&"00000000.png".to_string()));
    }

    #[test]
    fn discontinuity_marks_next_segment() {
        let mut hls = open_engine(1, 5);
        let mut w = MemoryWriter::new();
        hls.mark_discontinuity();
        hls.add_media(b"x", 48000, "audio/mp4", &mut w).unwrap();
        let text = hls.render_playlist(false);
        assert!(text.contains("#EXT-X-DISCONTINUITY\n"));
    }
}
