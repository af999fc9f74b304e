//! # Small buffer & string helpers
//!
//! The original C implementation leans on a hand-rolled `membuf`/`strbuf`
//! pair for every growable byte buffer in the program (including filenames
//! and playlist text). In Rust, `Vec<u8>`/`String`/`bytes::BytesMut` already
//! give us that for free, so this crate only keeps the handful of helpers
//! that don't have a direct standard-library equivalent: case-insensitive
//! ASCII comparisons on raw bytes (tag keys and HTTP header names), loose
//! boolean parsing for INI-style config values, and the UTF-8 -> UTF-16
//! conversion needed at the Windows filesystem boundary.
//!
//! ## License
//!
//! MIT License
//!
//! ## Authors
//!
//! - hua0512
//!

/// Case-insensitive ASCII equality for raw byte slices (tag keys, header names).
#[inline]
pub fn eq_ignore_ascii_case(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_ignore_ascii_case(y))
}

/// Lowercase a byte slice into a fresh owned buffer (tag keys are normalized
/// to lowercase on insertion, see [`tagmodel`]).
pub fn to_ascii_lowercase(input: &[u8]) -> Vec<u8> {
    input.iter().map(u8::to_ascii_lowercase).collect()
}

/// Parse a config value the way the original `strbuf_truthy` did: a small,
/// case-insensitive set of truthy tokens.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "yes" | "on" | "enable" | "enabled" | "true"
    )
}

/// Mirror of [`is_truthy`] for the explicit falsey set.
pub fn is_falsey(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "no" | "off" | "disable" | "disabled" | "false"
    )
}

/// Convert a UTF-8 string to a NUL-terminated UTF-16 buffer, for use at the
/// Windows filesystem boundary (`CreateFileW` and friends). On every other
/// platform, paths stay UTF-8 and this helper is unused in the hot path but
/// is still exercised by tests to keep the conversion correct.
pub fn to_utf16_nul_terminated(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_eq() {
        assert!(eq_ignore_ascii_case(b"StreamTitle", b"streamtitle"));
        assert!(!eq_ignore_ascii_case(b"StreamTitle", b"streamurl"));
        assert!(!eq_ignore_ascii_case(b"abc", b"ab"));
    }

    #[test]
    fn lowercase_roundtrip() {
        assert_eq!(to_ascii_lowercase(b"Icy-MetaInt"), b"icy-metaint");
    }

    #[test]
    fn truthy_falsey() {
        for v in ["1", "yes", "On", "ENABLE", "true"] {
            assert!(is_truthy(v), "{v} should be truthy");
        }
        for v in ["0", "no", "Off", "DISABLE", "false"] {
            assert!(is_falsey(v), "{v} should be falsey");
        }
        assert!(!is_truthy("maybe"));
        assert!(!is_falsey("maybe"));
    }

    #[test]
    fn utf16_nul_terminated() {
        let buf = to_utf16_nul_terminated("a");
        assert_eq!(buf, vec![0x0061, 0]);
    }
}
