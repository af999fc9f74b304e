//! Minimal ISOBMFF box writer. Grounded on the teacher's `crates/mp4` box
//! framing model (4-byte big-endian length + 4-byte fourcc), rewritten for
//! writing rather than parsing since this rewrite's fMP4 muxer only ever
//! produces boxes, never inspects third-party ones.

use bytes::{BufMut, Bytes, BytesMut};

/// Write one box: reserves the length prefix, lets `body` fill the
/// payload, then backpatches the total size.
pub fn write_box(out: &mut BytesMut, fourcc: &[u8; 4], body: impl FnOnce(&mut BytesMut)) {
    let size_pos = out.len();
    out.put_u32(0); // placeholder
    out.extend_from_slice(fourcc);
    body(out);
    let total = (out.len() - size_pos) as u32;
    out[size_pos..size_pos + 4].copy_from_slice(&total.to_be_bytes());
}

/// A "full box" (version + 24-bit flags) used by most ISOBMFF leaf boxes.
pub fn write_full_box(
    out: &mut BytesMut,
    fourcc: &[u8; 4],
    version: u8,
    flags: u32,
    body: impl FnOnce(&mut BytesMut),
) {
    write_box(out, fourcc, |out| {
        out.put_u8(version);
        out.put_uint(flags as u64, 3);
        body(out);
    });
}

pub fn finish(out: BytesMut) -> Bytes {
    out.freeze()
}
