//! # Output drivers (§4.8) and the HLS-engine-backed segmented output
//!
//! Every output is driven by a `Destination` through the [`Output`] trait.
//! Most drivers are "segmented": they layer [`hls_engine::HlsState`] over a
//! concrete [`hls_engine::SegmentWriter`] ([`folder::FolderWriter`],
//! [`http::HttpWriter`], [`s3::S3Writer`]) via [`HlsOutput`]. [`icecast`]
//! is not HLS at all — a continuous PUT stream with a metadata side
//! channel — and [`stdout`] is the simplest possible sink, a raw
//! concatenation of segment bytes with no playlist.
//!
//! ## License
//!
//! MIT License
//!
//! ## Authors
//!
//! - hua0512
//!

pub mod folder;
pub mod http;
pub mod icecast;
pub mod s3;
pub mod stdout;

pub use folder::FolderOutput;
pub use http::HttpOutput;
pub use icecast::IcecastOutput;
pub use s3::S3Output;
pub use stdout::StdoutOutput;

use frame::{Segment, SegmentSource};
use hls_engine::{HlsError, HlsOpenConfig, HlsState, PictureCounter, SegmentWriter};
use pipeline_core::{ErrorKind, StageError, StageResult};
use tagmodel::TagList;
use timeutil::IchTime;

/// One counter shared by every `HlsOutput` in the process (§4.8 item 6:
/// "a process-wide unique 8-digit picture-id").
static PICTURE_COUNTER: PictureCounter = PictureCounter::new();

/// What [`Output::submit_picture`] hands back to the caller (a `Muxer`)
/// when it accepts an out-of-band picture (§4.8 item 6): a sentinel mime
/// type plus the filename that now stands in for the inline image bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureRef {
    pub mime: &'static str,
    pub filename: String,
}

/// Contract every output driver implements (§4.8). `open` receives the
/// muxer's plugin name alongside its descriptor because the filename
/// extension a segmented output picks depends on the *container*
/// (`fmp4`/`adts`/`ogg`/`packed`), which isn't itself part of
/// `SegmentSource` (§3 — the descriptor only names the original codec).
pub trait Output: Send {
    fn name(&self) -> &'static str;

    fn config(&mut self, key: &str, value: &str) -> StageResult;

    /// Inject the wall-clock start every owned `HlsState` renders
    /// `#EXT-X-PROGRAM-DATE-TIME` relative to (§4.12 "set wall-clock on
    /// output"). Outputs that don't segment (icecast/stdout) ignore this.
    fn set_clock(&mut self, now: IchTime);

    fn open(&mut self, muxer_name: &str, upstream: &SegmentSource) -> StageResult;

    fn submit_segment(&mut self, segment: &Segment) -> StageResult;

    /// Tag updates mapped to this destination's container taxonomy
    /// (Icecast's `/admin/metadata` template, primarily; segmented
    /// outputs have no equivalent and no-op).
    fn submit_tags(&mut self, tags: &TagList) -> StageResult;

    /// Out-of-band picture side channel (§4.8 item 6); `Ok(None)` for
    /// drivers with no picture concept, or an unrecognised mime.
    fn submit_picture(&mut self, mime: &str, bytes: &[u8]) -> StageResult<Option<PictureRef>>;

    /// EOS: flush pending bytes, append `#EXT-X-ENDLIST` where applicable.
    fn flush(&mut self) -> StageResult;

    fn reset(&mut self) -> StageResult;

    fn close(&mut self) -> StageResult {
        Ok(())
    }
}

/// Filename extensions a segmented output uses, keyed by the *muxer's*
/// plugin name and (for `packed`, which has no fixed container framing of
/// its own) the original codec (§6 "Filenames").
fn extensions_for(muxer_name: &str, codec: &str) -> (&'static str, Option<&'static str>) {
    match muxer_name {
        "fmp4" => (".m4s", Some(".mp4")),
        "adts" => (".aac", None),
        "ogg" => (".ogg", None),
        "packed" => (
            match codec {
                "mp3" => ".mp3",
                "ac3" | "eac3" => ".ac3",
                _ => ".bin",
            },
            None,
        ),
        _ => (".bin", None),
    }
}

/// Per-writer configuration keys a [`HlsOutput`] doesn't itself recognise
/// (root path, base URL, credentials) are routed here instead, so folder,
/// HTTP and S3 drivers honour the same create/`config`*/open lifecycle as
/// every other stage (§4.2) rather than requiring their connection
/// parameters up front at construction time.
pub trait WriterConfig {
    fn configure(&mut self, key: &str, value: &str) -> StageResult;
}

fn map_hls_err<E: std::error::Error + Send + Sync + 'static>(stage: &'static str, err: HlsError<E>) -> StageError {
    match err {
        HlsError::NotOpen => StageError::lifecycle(stage, "hls engine used before open()"),
        HlsError::Writer(e) => StageError::with_source(ErrorKind::Format, stage, "writer failed", e),
    }
}

/// Generic HLS-segmented output over any [`SegmentWriter`] (§4.8): folder,
/// HTTP and S3 drivers are all just this with a different `W`.
pub struct HlsOutput<W: SegmentWriter> {
    stage: &'static str,
    writer: W,
    cfg_template: HlsOpenConfig,
    now: IchTime,
    state: Option<HlsState>,
}

impl<W: SegmentWriter> HlsOutput<W> {
    pub fn new(stage: &'static str, writer: W, cfg_template: HlsOpenConfig) -> Self {
        Self { stage, writer, cfg_template, now: IchTime::now(), state: None }
    }
}

impl<W: SegmentWriter + Default> HlsOutput<W> {
    /// Zero-arg construction for a registry factory (§5); connection
    /// parameters (root path, base URL, credentials) arrive later through
    /// [`Output::config`], routed to `W`'s [`WriterConfig`] impl.
    pub fn create(stage: &'static str) -> Self {
        Self::new(stage, W::default(), HlsOpenConfig::default())
    }
}

impl<W: SegmentWriter<Error = E> + WriterConfig + Send, E: std::error::Error + Send + Sync + 'static> Output
    for HlsOutput<W>
{
    fn name(&self) -> &'static str {
        self.stage
    }

    fn config(&mut self, key: &str, value: &str) -> StageResult {
        match key {
            "target-duration" => {
                self.cfg_template.target_duration_s = value
                    .parse()
                    .map_err(|_| StageError::config(self.stage, format!("invalid target-duration {value}")))?;
                Ok(())
            }
            "playlist-length" => {
                self.cfg_template.playlist_length_s = value
                    .parse()
                    .map_err(|_| StageError::config(self.stage, format!("invalid playlist-length {value}")))?;
                Ok(())
            }
            "entry-prefix" => {
                self.cfg_template.entry_prefix = value.to_string();
                Ok(())
            }
            "playlist-filename" => {
                self.cfg_template.playlist_filename = value.to_string();
                Ok(())
            }
            other => self.writer.configure(other, value),
        }
    }

    fn set_clock(&mut self, now: IchTime) {
        self.now = now;
    }

    fn open(&mut self, muxer_name: &str, upstream: &SegmentSource) -> StageResult {
        let stage = self.stage;
        let (media_ext, init_ext) = extensions_for(muxer_name, &upstream.codec);
        let mut cfg = self.cfg_template.clone();
        cfg.media_extension = media_ext.to_string();
        cfg.init_extension = init_ext.unwrap_or(media_ext).to_string();
        match self.state.take() {
            // A mid-stream reopen (§4.1, §10 item 2/3): keep the same
            // playlist/media-sequence going rather than starting a new one.
            Some(mut state) => {
                state.reopen(upstream, cfg, &mut self.writer).map_err(|e| map_hls_err(stage, e))?;
                self.state = Some(state);
            }
            None => {
                self.state = Some(HlsState::open_at(upstream, cfg, self.now));
            }
        }
        Ok(())
    }

    fn submit_segment(&mut self, segment: &Segment) -> StageResult {
        let stage = self.stage;
        match segment.kind {
            frame::SegmentKind::Init => {
                let writer = &mut self.writer;
                self.state
                    .as_mut()
                    .ok_or_else(|| StageError::lifecycle(stage, "used before open()"))?
                    .write_init_segment(&segment.bytes, &segment.mime, writer)
                    .map_err(|e| map_hls_err(stage, e))
            }
            frame::SegmentKind::Media => {
                let writer = &mut self.writer;
                self.state
                    .as_mut()
                    .ok_or_else(|| StageError::lifecycle(stage, "used before open()"))?
                    .add_media(&segment.bytes, segment.duration, &segment.mime, writer)
                    .map_err(|e| map_hls_err(stage, e))?;
                self.state.as_ref().unwrap().write_playlist(false, &mut self.writer).map_err(|e| map_hls_err(stage, e))
            }
        }
    }

    fn submit_tags(&mut self, _tags: &TagList) -> StageResult {
        Ok(())
    }

    fn submit_picture(&mut self, mime: &str, bytes: &[u8]) -> StageResult<Option<PictureRef>> {
        let stage = self.stage;
        let writer = &mut self.writer;
        let name = self
            .state
            .as_mut()
            .ok_or_else(|| StageError::lifecycle(stage, "used before open()"))?
            .submit_picture(mime, bytes, &PICTURE_COUNTER, writer)
            .map_err(|e| map_hls_err(stage, e))?;
        Ok(name.map(|filename| PictureRef { mime: hls_engine::PICTURE_REDIRECT_MIME, filename }))
    }

    fn flush(&mut self) -> StageResult {
        let stage = self.stage;
        let writer = &mut self.writer;
        self.state
            .as_mut()
            .ok_or_else(|| StageError::lifecycle(stage, "used before open()"))?
            .eos_flush(writer)
            .map_err(|e| map_hls_err(stage, e))?;
        self.state.as_ref().unwrap().write_playlist(true, &mut self.writer).map_err(|e| map_hls_err(stage, e))
    }

    /// A no-op for the HLS state itself: §4.1's "re-arm for another
    /// `open()`" for this stage means "be ready for `open()` to decide
    /// fresh-open vs. reopen", not "discard the playlist" — discarding it
    /// here would both lose whatever partial segment bytes hadn't reached
    /// `target_samples` yet and restart `media_sequence` from 1 on every
    /// format change, which `open`'s reopen branch (§10 item 2/3) is
    /// specifically built to avoid.
    fn reset(&mut self) -> StageResult {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::folder::FolderOutput;

    fn tmp_dir(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("icecast-hls-outputs-reopen-{tag}-{}", std::process::id()))
    }

    /// §4.1/§10 item 2/3, §8 S5: a mid-stream format-change reopen must
    /// not restart the playlist from `media_sequence = 1`, must not lose
    /// whatever partial segment bytes had already accumulated, and must
    /// mark the next segment built under the new format as a
    /// discontinuity.
    #[test]
    fn reopen_preserves_media_sequence_and_flags_discontinuity() {
        let dir = tmp_dir("basic");
        let mut out = FolderOutput::create();
        out.config("root", dir.to_str().unwrap()).unwrap();
        out.config("target-duration", "1").unwrap();
        out.config("playlist-length", "10").unwrap();
        out.set_clock(IchTime::new(0, 0));

        let upstream_a = SegmentSource::new("flac", 0b11, 48000, 4096);
        out.open("fmp4", &upstream_a).unwrap();
        let init = Segment::init(bytes::Bytes::from_static(b"moov"), "audio/mp4");
        out.submit_segment(&init).unwrap();
        // Half a second of old-format audio that never reaches target_samples.
        let partial = Segment::media(bytes::Bytes::from_static(b"half"), "audio/mp4", 24000);
        out.submit_segment(&partial).unwrap();

        // A format change arrives: the source's reopen cascade calls
        // reset() then open() again with a new descriptor.
        out.reset().unwrap();
        let upstream_b = SegmentSource::new("flac", 0b11, 44100, 4096);
        out.open("fmp4", &upstream_b).unwrap();
        let after = Segment::media(bytes::Bytes::from_static(b"new-format"), "audio/mp4", 44100);
        out.submit_segment(&after).unwrap();

        let playlist = std::fs::read_to_string(dir.join("stream.m3u8")).unwrap();
        // Two segments: the flushed old-format partial, then the new one.
        assert_eq!(playlist.matches("#EXTINF").count(), 2);
        // media_sequence must not have reset back to 1 just because a
        // reopen happened.
        assert!(playlist.contains("#EXT-X-MEDIA-SEQUENCE:1"));
        assert!(playlist.contains("#EXT-X-DISCONTINUITY\n"));
        assert!(std::fs::read(dir.join("00000001.m4s")).unwrap() == b"half");
        assert!(std::fs::read(dir.join("00000002.m4s")).unwrap() == b"new-format");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
