//! The `icecast` [`Output`] driver (§4.8 "Icecast", §6 "Icecast client
//! wire"): not HLS at all. `open` performs a `PUT <mount>` handshake with
//! `Expect: 100-continue` over a raw socket (the continuous-body PUT this
//! needs has no clean `reqwest::blocking` equivalent, unlike the one-shot
//! PUT/GET/DELETE the HTTP and S3 drivers issue), then every segment's
//! bytes are written straight to that connection. Tag updates go out as a
//! side-channel `GET /admin/metadata` request instead.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use frame::{Segment, SegmentSource};
use pipeline_core::{ErrorKind, StageError, StageResult};
use tagmodel::TagList;
use timeutil::IchTime;
use url::Url;

use crate::{Output, PictureRef};

const STAGE: &str = "icecast";

/// Static connection + mount parameters (§4.8 "Icecast" config keys).
#[derive(Debug, Clone, Default)]
pub struct IcecastConfig {
    pub host: String,
    pub port: u16,
    pub mount: String,
    pub username: String,
    pub password: String,
    pub public: bool,
    pub name: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub genre: Option<String>,
    pub bitrate: Option<String>,
    pub audio_info: Option<String>,
    /// Template applied to `/admin/metadata` updates; `%t`/`%a`/`%A` expand
    /// to title/artist/album (§4.8 item "icecast on tag update").
    pub metadata_template: String,
}

impl IcecastConfig {
    fn admin_base(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

pub struct IcecastOutput {
    cfg: IcecastConfig,
    mime: String,
    stream: Option<TcpStream>,
    client: reqwest::blocking::Client,
}

impl IcecastOutput {
    pub fn new(cfg: IcecastConfig) -> Self {
        Self { cfg, mime: "application/octet-stream".to_string(), stream: None, client: reqwest::blocking::Client::new() }
    }

    fn auth_header(&self) -> String {
        let raw = format!("{}:{}", self.cfg.username, self.cfg.password);
        format!("Basic {}", BASE64.encode(raw))
    }

    fn handshake(&mut self) -> StageResult {
        let addr = format!("{}:{}", self.cfg.host, self.cfg.port);
        let mut stream = TcpStream::connect(&addr)
            .map_err(|e| StageError::with_source(ErrorKind::Protocol, STAGE, format!("connect to {addr} failed"), e))?;

        let mut request = format!(
            "PUT {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: icecast-hls/1.0\r\nAuthorization: {}\r\nContent-Type: {}\r\n",
            self.cfg.mount,
            self.cfg.host,
            self.auth_header(),
            self.mime
        );
        request.push_str(&format!("ice-public: {}\r\n", if self.cfg.public { 1 } else { 0 }));
        if let Some(v) = &self.cfg.name {
            request.push_str(&format!("ice-name: {v}\r\n"));
        }
        if let Some(v) = &self.cfg.description {
            request.push_str(&format!("ice-description: {v}\r\n"));
        }
        if let Some(v) = &self.cfg.url {
            request.push_str(&format!("ice-url: {v}\r\n"));
        }
        if let Some(v) = &self.cfg.genre {
            request.push_str(&format!("ice-genre: {v}\r\n"));
        }
        if let Some(v) = &self.cfg.bitrate {
            request.push_str(&format!("ice-bitrate: {v}\r\n"));
        }
        if let Some(v) = &self.cfg.audio_info {
            request.push_str(&format!("ice-audio-info: {v}\r\n"));
        }
        request.push_str("Expect: 100-continue\r\n\r\n");

        stream
            .write_all(request.as_bytes())
            .map_err(|e| StageError::with_source(ErrorKind::Protocol, STAGE, "writing handshake failed", e))?;

        let mut reader = BufReader::new(stream.try_clone().map_err(|e| {
            StageError::with_source(ErrorKind::Protocol, STAGE, "cloning handshake socket failed", e)
        })?);
        let mut status_line = String::new();
        reader
            .read_line(&mut status_line)
            .map_err(|e| StageError::with_source(ErrorKind::Protocol, STAGE, "reading handshake status failed", e))?;
        if !status_line.trim_end().ends_with("100") && !status_line.contains(" 100 ") {
            return Err(StageError::protocol(STAGE, format!("handshake rejected: {}", status_line.trim())));
        }

        self.stream = Some(stream);
        Ok(())
    }
}

impl Output for IcecastOutput {
    fn name(&self) -> &'static str {
        STAGE
    }

    fn config(&mut self, key: &str, value: &str) -> StageResult {
        match key {
            "host" => self.cfg.host = value.to_string(),
            "port" => {
                self.cfg.port = value.parse().map_err(|_| StageError::config(STAGE, format!("invalid port {value}")))?
            }
            "mount" => self.cfg.mount = value.to_string(),
            "username" => self.cfg.username = value.to_string(),
            "password" => self.cfg.password = value.to_string(),
            "public" => self.cfg.public = value == "1" || value.eq_ignore_ascii_case("true"),
            "name" => self.cfg.name = Some(value.to_string()),
            "description" => self.cfg.description = Some(value.to_string()),
            "url" => self.cfg.url = Some(value.to_string()),
            "genre" => self.cfg.genre = Some(value.to_string()),
            "bitrate" => self.cfg.bitrate = Some(value.to_string()),
            "audio-info" => self.cfg.audio_info = Some(value.to_string()),
            "metadata-template" => self.cfg.metadata_template = value.to_string(),
            other => return Err(StageError::config(STAGE, format!("unknown key {other}"))),
        }
        Ok(())
    }

    fn set_clock(&mut self, _now: IchTime) {}

    fn open(&mut self, _muxer_name: &str, upstream: &SegmentSource) -> StageResult {
        self.mime = mime_for_codec(&upstream.codec).to_string();
        self.handshake()
    }

    fn submit_segment(&mut self, segment: &Segment) -> StageResult {
        // Icecast has no INIT-segment concept; an fMP4-backed stream's moov
        // box goes out over the wire like any other chunk.
        let stream = self.stream.as_mut().ok_or_else(|| StageError::lifecycle(STAGE, "used before open()"))?;
        stream
            .write_all(&segment.bytes)
            .map_err(|e| StageError::with_source(ErrorKind::Protocol, STAGE, "stream write failed", e))
    }

    fn submit_tags(&mut self, tags: &TagList) -> StageResult {
        if self.cfg.metadata_template.is_empty() {
            return Ok(());
        }
        let title = tags.get(b"title").map(|t| t.value_str().into_owned()).unwrap_or_default();
        let artist = tags.get(b"artist").map(|t| t.value_str().into_owned()).unwrap_or_default();
        let album = tags.get(b"album").map(|t| t.value_str().into_owned()).unwrap_or_default();
        let rendered = self
            .cfg
            .metadata_template
            .replace("%t", &title)
            .replace("%a", &artist)
            .replace("%A", &album);

        let query = format!(
            "mode=updinfo&mount={}&song={}",
            urlencoding::encode(&self.cfg.mount),
            urlencoding::encode(&rendered)
        );
        let url_str = format!("{}/admin/metadata?{query}", self.cfg.admin_base());
        let url = Url::parse(&url_str)
            .map_err(|e| StageError::with_source(ErrorKind::Protocol, STAGE, "building metadata url failed", e))?;

        let resp = self
            .client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .map_err(|e| StageError::with_source(ErrorKind::Protocol, STAGE, "metadata request failed", e))?;
        if !resp.status().is_success() {
            return Err(StageError::protocol(STAGE, format!("metadata update rejected with {}", resp.status())));
        }
        Ok(())
    }

    fn submit_picture(&mut self, _mime: &str, _bytes: &[u8]) -> StageResult<Option<PictureRef>> {
        Ok(None)
    }

    fn flush(&mut self) -> StageResult {
        if let Some(stream) = &mut self.stream {
            stream
                .flush()
                .map_err(|e| StageError::with_source(ErrorKind::Protocol, STAGE, "stream flush failed", e))?;
        }
        Ok(())
    }

    fn reset(&mut self) -> StageResult {
        self.stream = None;
        Ok(())
    }

    fn close(&mut self) -> StageResult {
        self.stream = None;
        Ok(())
    }
}

fn mime_for_codec(codec: &str) -> &'static str {
    match codec {
        "mp3" => "audio/mpeg",
        "aac" => "audio/aac",
        "ac3" | "eac3" => "audio/ac3",
        "opus" | "vorbis" | "flac" => "application/ogg",
        _ => "application/octet-stream",
    }
}
