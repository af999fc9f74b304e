//! Input drivers (§4.2): `read(dest, len) -> bytes_read`, `0` meaning
//! EOF-or-timeout. Three drivers: `file`, `stdin` (process-wide singleton)
//! and `network` (HTTP-like source with ICY-metaint parsing).

pub mod file;
pub mod network;
pub mod stdin;

pub use file::FileInput;
pub use network::NetworkInput;
pub use stdin::StdinInput;

use pipeline_core::StageResult;
use tagmodel::TagList;

/// Contract every input driver implements (§4.2). `read` returning `0` is
/// the EOF/timeout convention the demuxer layer treats identically; a
/// driver distinguishes a real error via `Err`.
pub trait Input: Send {
    fn name(&self) -> &'static str;

    fn config(&mut self, key: &str, value: &str) -> StageResult;

    /// Connect/open the underlying resource. Header parsing for network
    /// inputs (and any tags it yields, e.g. `icy-name`) happens here.
    fn open(&mut self) -> StageResult;

    /// Read up to `dest.len()` bytes. `0` means EOF or a timed-out read
    /// (§4.2, §7 `TransientIoError`); never blocks past the configured
    /// read timeout.
    fn read(&mut self, dest: &mut [u8]) -> StageResult<usize>;

    /// Drain any tags discovered since the last call (ICY headers/meta
    /// chunks arrive out-of-band relative to `read`).
    fn take_tags(&mut self) -> TagList;

    fn close(&mut self) -> StageResult {
        Ok(())
    }
}
