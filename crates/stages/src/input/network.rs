//! Network (HTTP-like) input driver with ICY-metaint parsing (§4.2, §6).
//!
//! The state machine is `HEADERS -> BODY(metaint-on) | BODY(metaint-off) ->
//! EOF`. HTTP itself is treated as an out-of-scope transport collaborator
//! (§1) — `reqwest`'s blocking client plays that role, the same way the
//! teacher's stack reaches for `reqwest` wherever it needs an HTTP client.
//! A background thread drains the response into a channel so `read` can
//! honor a read timeout without the blocking-client API exposing one
//! per-call; `recv_timeout` on that channel is the read-timeout budget.

use std::io::Read as _;
use std::sync::mpsc::{Receiver, RecvTimeoutError, channel};
use std::thread::JoinHandle;
use std::time::Duration;

use pipeline_core::{ErrorKind, StageError, StageResult};
use tagmodel::{Tag, TagList};

use super::Input;

const CHUNK_SIZE: usize = 8192;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_READ_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IcyMode {
    Audio,
    MetaLength,
    MetaData,
}

/// Streaming ICY metadata-chunk parser: consumes raw bytes arriving off
/// the wire, emits only audio bytes, and surfaces completed
/// `StreamTitle='...';StreamUrl='...';` chunks to a callback (§4.2, §6).
struct IcyMetaParser {
    metaint: Option<u64>,
    bytes_since_meta: u64,
    mode: IcyMode,
    meta_need: usize,
    meta_buf: Vec<u8>,
}

impl IcyMetaParser {
    fn new(metaint: Option<u64>) -> Self {
        Self { metaint, bytes_since_meta: 0, mode: IcyMode::Audio, meta_need: 0, meta_buf: Vec::new() }
    }

    fn feed(&mut self, input: &[u8], audio: &mut Vec<u8>, mut on_meta: impl FnMut(&str)) {
        let Some(metaint) = self.metaint else {
            audio.extend_from_slice(input);
            return;
        };
        let mut i = 0;
        while i < input.len() {
            match self.mode {
                IcyMode::Audio => {
                    let remaining = (metaint - self.bytes_since_meta) as usize;
                    let take = remaining.min(input.len() - i);
                    audio.extend_from_slice(&input[i..i + take]);
                    i += take;
                    self.bytes_since_meta += take as u64;
                    if self.bytes_since_meta == metaint {
                        self.mode = IcyMode::MetaLength;
                        self.bytes_since_meta = 0;
                    }
                }
                IcyMode::MetaLength => {
                    let len_byte = input[i] as usize;
                    i += 1;
                    self.meta_need = len_byte * 16;
                    self.meta_buf.clear();
                    self.mode = if self.meta_need == 0 { IcyMode::Audio } else { IcyMode::MetaData };
                }
                IcyMode::MetaData => {
                    let take = self.meta_need.min(input.len() - i);
                    self.meta_buf.extend_from_slice(&input[i..i + take]);
                    i += take;
                    self.meta_need -= take;
                    if self.meta_need == 0 {
                        let text = String::from_utf8_lossy(&self.meta_buf).into_owned();
                        on_meta(&text);
                        self.mode = IcyMode::Audio;
                    }
                }
            }
        }
    }
}

/// Whether `bytes[pos..]` looks like the start of another `key=` field
/// (or end of the chunk), used to tell a literal apostrophe inside a
/// title from the closing quote of a `key='value'` pair (§4.2, §9 open
/// question: this tolerant rule can swallow a real `'` in content).
fn looks_like_next_field_or_end(bytes: &[u8], mut pos: usize) -> bool {
    if pos >= bytes.len() {
        return true;
    }
    if bytes[pos] != b';' {
        return false;
    }
    pos += 1;
    let key_start = pos;
    while bytes.get(pos).is_some_and(u8::is_ascii_alphanumeric) {
        pos += 1;
    }
    pos > key_start && bytes.get(pos) == Some(&b'=') && bytes.get(pos + 1) == Some(&b'\'')
}

/// Parse `StreamTitle='...';StreamUrl='...';`-style chunks into
/// `(key, value)` pairs, lowercasing keys to match [`Tag`]'s convention.
fn parse_icy_fields(text: &str) -> Vec<(String, String)> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let Some(eq_rel) = bytes[i..].iter().position(|&b| b == b'=') else { break };
        let eq = i + eq_rel;
        if bytes.get(eq + 1) != Some(&b'\'') {
            i = eq + 1;
            continue;
        }
        let mut key_start = eq;
        while key_start > i && bytes[key_start - 1].is_ascii_alphanumeric() {
            key_start -= 1;
        }
        if key_start == eq {
            i = eq + 1;
            continue;
        }
        let key = text[key_start..eq].to_ascii_lowercase();
        let value_start = eq + 2;
        let mut j = value_start;
        loop {
            match bytes.get(j) {
                None => {
                    i = bytes.len();
                    break;
                }
                Some(b'\'') if looks_like_next_field_or_end(bytes, j + 1) => {
                    out.push((key, text[value_start..j].to_string()));
                    i = if bytes.get(j + 1) == Some(&b';') { j + 2 } else { j + 1 };
                    break;
                }
                _ => j += 1,
            }
        }
    }
    out
}

pub struct NetworkInput {
    url: Option<String>,
    connect_timeout: Duration,
    read_timeout: Duration,
    rx: Option<Receiver<std::io::Result<Vec<u8>>>>,
    join: Option<JoinHandle<()>>,
    icy: IcyMetaParser,
    leftover: Vec<u8>,
    leftover_pos: usize,
    tags: TagList,
}

impl Default for NetworkInput {
    fn default() -> Self {
        Self {
            url: None,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            rx: None,
            join: None,
            icy: IcyMetaParser::new(None),
            leftover: Vec::new(),
            leftover_pos: 0,
            tags: TagList::new(),
        }
    }
}

impl NetworkInput {
    pub fn new() -> Self {
        Self::default()
    }

    fn header_to_tag(&mut self, headers: &reqwest::header::HeaderMap, header_name: &str, tag_key: &str) {
        if let Some(value) = headers.get(header_name).and_then(|v| v.to_str().ok()) {
            self.tags.push(Tag::new(tag_key, value.as_bytes().to_vec(), 0));
        }
    }

    /// Pull the next raw chunk off the background reader, blocking up to
    /// `read_timeout`. `Ok(vec![])` means the stream ended; a timed-out
    /// wait also surfaces as `Ok(vec![])` (§4.2 "a read that does not
    /// complete within the read timeout returns what it has, may be 0").
    fn next_chunk(&mut self) -> StageResult<Vec<u8>> {
        let Some(rx) = self.rx.as_ref() else {
            return Err(StageError::lifecycle("input.network", "read before open"));
        };
        match rx.recv_timeout(self.read_timeout) {
            Ok(Ok(chunk)) => Ok(chunk),
            Ok(Err(e)) => Err(StageError::with_source(ErrorKind::Format, "input.network", "stream read failed", e)),
            Err(RecvTimeoutError::Timeout) => Ok(Vec::new()),
            Err(RecvTimeoutError::Disconnected) => Ok(Vec::new()),
        }
    }
}

impl Input for NetworkInput {
    fn name(&self) -> &'static str {
        "network"
    }

    fn config(&mut self, key: &str, value: &str) -> StageResult {
        match key {
            "url" => {
                self.url = Some(value.to_string());
                Ok(())
            }
            "connect-timeout-ms" => {
                let ms: u64 = value
                    .parse()
                    .map_err(|_| StageError::config("input.network", format!("invalid connect-timeout-ms {value}")))?;
                self.connect_timeout = Duration::from_millis(ms);
                Ok(())
            }
            "read-timeout-ms" => {
                let ms: u64 = value
                    .parse()
                    .map_err(|_| StageError::config("input.network", format!("invalid read-timeout-ms {value}")))?;
                self.read_timeout = Duration::from_millis(ms);
                Ok(())
            }
            other => Err(StageError::config("input.network", format!("unknown key {other}"))),
        }
    }

    fn open(&mut self) -> StageResult {
        let url = self.url.clone().ok_or_else(|| StageError::config("input.network", "missing url"))?;
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(self.connect_timeout)
            .header("Icy-MetaData", "1")
            .build()
            .map_err(|e| StageError::with_source(ErrorKind::Protocol, "input.network", "client build failed", e))?;

        let mut response = client
            .get(&url)
            .send()
            .map_err(|e| StageError::with_source(ErrorKind::Protocol, "input.network", "request failed", e))?;
        if !response.status().is_success() {
            return Err(StageError::protocol("input.network", format!("HTTP status {}", response.status())));
        }

        let headers = response.headers().clone();
        self.header_to_tag(&headers, "icy-name", "icy-name");
        self.header_to_tag(&headers, "icy-genre", "icy-genre");
        self.header_to_tag(&headers, "icy-description", "icy-description");
        self.header_to_tag(&headers, "icy-url", "icy-url");

        let metaint = headers
            .get("icy-metaint")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        self.icy = IcyMetaParser::new(metaint);

        let (tx, rx) = channel();
        self.join = Some(std::thread::spawn(move || {
            let mut buf = vec![0u8; CHUNK_SIZE];
            loop {
                match response.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(Ok(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        }));
        self.rx = Some(rx);
        Ok(())
    }

    fn read(&mut self, dest: &mut [u8]) -> StageResult<usize> {
        let mut audio = Vec::new();
        let mut produced_tags: Vec<(String, String)> = Vec::new();

        if self.leftover_pos < self.leftover.len() {
            let take = (self.leftover.len() - self.leftover_pos).min(dest.len());
            dest[..take].copy_from_slice(&self.leftover[self.leftover_pos..self.leftover_pos + take]);
            self.leftover_pos += take;
            if self.leftover_pos == self.leftover.len() {
                self.leftover.clear();
                self.leftover_pos = 0;
            }
            return Ok(take);
        }

        while audio.len() < dest.len() {
            let chunk = self.next_chunk()?;
            if chunk.is_empty() {
                break;
            }
            self.icy.feed(&chunk, &mut audio, |text| produced_tags.extend(parse_icy_fields(text)));
        }

        for (key, value) in produced_tags {
            self.tags.push(Tag::new(key, value.into_bytes(), 0));
        }

        let take = audio.len().min(dest.len());
        dest[..take].copy_from_slice(&audio[..take]);
        if audio.len() > take {
            self.leftover = audio[take..].to_vec();
            self.leftover_pos = 0;
        }
        Ok(take)
    }

    fn take_tags(&mut self) -> TagList {
        std::mem::take(&mut self.tags)
    }

    fn close(&mut self) -> StageResult {
        self.rx = None;
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icy_parser_passes_through_audio_when_metaint_absent() {
        let mut icy = IcyMetaParser::new(None);
        let mut audio = Vec::new();
        icy.feed(b"just-audio-bytes", &mut audio, |_| panic!("no meta expected"));
        assert_eq!(audio, b"just-audio-bytes");
    }

    #[test]
    fn icy_parser_splits_meta_chunk_out_of_audio_stream() {
        // S3: 16000 bytes audio + 1 length byte (meta=16 bytes: 1*16) + 16000 audio.
        let mut stream = vec![0xABu8; 16000];
        let meta_text = "StreamTitle='A - B';";
        let mut meta_chunk = meta_text.as_bytes().to_vec();
        meta_chunk.resize(meta_text.len().div_ceil(16) * 16, 0);
        let len_byte = (meta_chunk.len() / 16) as u8;
        stream.push(len_byte);
        stream.extend_from_slice(&meta_chunk);
        stream.extend(vec![0xCDu8; 16000]);

        let mut icy = IcyMetaParser::new(Some(16000));
        let mut audio = Vec::new();
        let mut seen = Vec::new();
        icy.feed(&stream, &mut audio, |text| seen.push(text.to_string()));

        assert_eq!(audio.len(), 32000);
        assert!(audio[..16000].iter().all(|&b| b == 0xAB));
        assert!(audio[16000..].iter().all(|&b| b == 0xCD));
        assert_eq!(seen.len(), 1);
        let fields = parse_icy_fields(&seen[0]);
        assert_eq!(fields, vec![("streamtitle".to_string(), "A - B".to_string())]);
    }

    #[test]
    fn icy_parser_works_across_chunk_boundaries() {
        let mut icy = IcyMetaParser::new(Some(10));
        let mut audio = Vec::new();
        let mut seen = Vec::new();
        // feed byte-by-byte to exercise every state transition mid-chunk.
        let mut stream = vec![1u8; 10];
        stream.push(1); // length byte: 1*16 = 16 bytes of meta
        let mut meta = b"StreamTitle='X';".to_vec();
        meta.resize(16, 0);
        stream.extend_from_slice(&meta);
        stream.extend(vec![2u8; 10]);
        for byte in &stream {
            icy.feed(std::slice::from_ref(byte), &mut audio, |text| seen.push(text.to_string()));
        }
        assert_eq!(audio.len(), 20);
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn parse_icy_fields_tolerates_literal_apostrophe() {
        // "It's" contains an apostrophe not followed by ;key=, so it's literal.
        let fields = parse_icy_fields("StreamTitle='It's Showtime';");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].1, "It's Showtime");
    }

    #[test]
    fn parse_icy_fields_handles_both_keys() {
        let fields = parse_icy_fields("StreamTitle='A - B';StreamUrl='http://example.com';");
        assert_eq!(fields[0], ("streamtitle".to_string(), "A - B".to_string()));
        assert_eq!(fields[1], ("streamurl".to_string(), "http://example.com".to_string()));
    }

    #[test]
    fn missing_url_is_config_error() {
        let mut input = NetworkInput::new();
        assert!(input.open().is_err());
    }
}
