//! Out-of-band picture (APIC) side-channel (§4.8 item 6, §10.1).

use std::sync::atomic::{AtomicU32, Ordering};

/// Sentinel MIME type stashed into the caller's output tag to signal "this
/// value is now a filename reference, not inline picture bytes" (§10.1,
/// grounded on `hls.c`'s `hls_submit_picture`). Preserved verbatim rather
/// than "fixed" per the task's grounding rules — it's just an internal
/// marker string, not user-facing text.
pub const PICTURE_REDIRECT_MIME: &str = "->";

/// Process-wide unique 8-digit picture filename counter (§4.8 item 6: "a
/// process-wide unique 8-digit picture-id (atomic counter mod 10^8)").
#[derive(Debug, Default)]
pub struct PictureCounter(AtomicU32);

impl PictureCounter {
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Allocate the next id, wrapping mod 10^8.
    pub fn next_id(&self) -> u32 {
        self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| Some((v + 1) % 100_000_000)).unwrap()
    }
}

/// Map an image MIME type to the file extension the HLS engine writes
/// pictures with. `None` means "unknown MIME, skip the picture" (§6).
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// The filename a picture would be written under, e.g. `"00000000.png"`.
pub fn picture_filename(id: u32, ext: &str) -> String {
    format!("{id:08}.{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_increments_and_wraps() {
        let c = PictureCounter::new();
        assert_eq!(c.next_id(), 0);
        assert_eq!(c.next_id(), 1);
    }

    #[test]
    fn unknown_mime_skips() {
        assert_eq!(extension_for_mime("application/octet-stream"), None);
        assert_eq!(extension_for_mime("image/png"), Some("png"));
    }

    #[test]
    fn filename_is_eight_digit_padded() {
        assert_eq!(picture_filename(7, "png"), "00000007.png");
    }
}
