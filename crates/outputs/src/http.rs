//! Plain HTTP PUT [`SegmentWriter`] and the `http` [`Output`] driver
//! (§4.8 "HTTP output"): every HLS file is `PUT` to `base_url/filename`,
//! deletion is an HTTP `DELETE` of the same URL.

use hls_engine::{HlsOpenConfig, SegmentWriter};
use pipeline_core::{StageError, StageResult};
use url::Url;

use crate::{HlsOutput, WriterConfig};

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("used before a base-url was configured")]
    NotConfigured,
    #[error("invalid url joining {filename} onto base: {source}")]
    BadUrl { filename: String, source: url::ParseError },
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("server rejected {method} with status {status}")]
    Status { method: &'static str, status: reqwest::StatusCode },
}

pub struct HttpWriter {
    base_url: Option<Url>,
    client: reqwest::blocking::Client,
}

impl Default for HttpWriter {
    fn default() -> Self {
        Self { base_url: None, client: reqwest::blocking::Client::new() }
    }
}

impl HttpWriter {
    pub fn new(base_url: Url) -> Self {
        Self { base_url: Some(base_url), client: reqwest::blocking::Client::new() }
    }

    fn url_for(&self, filename: &str) -> Result<Url, HttpError> {
        let base = self.base_url.as_ref().ok_or(HttpError::NotConfigured)?;
        base.join(filename).map_err(|source| HttpError::BadUrl { filename: filename.to_string(), source })
    }
}

impl WriterConfig for HttpWriter {
    fn configure(&mut self, key: &str, value: &str) -> StageResult {
        match key {
            "base-url" => {
                self.base_url =
                    Some(Url::parse(value).map_err(|e| StageError::config("http", format!("invalid base-url: {e}")))?);
                Ok(())
            }
            other => Err(StageError::config("http", format!("unknown key {other}"))),
        }
    }
}

impl SegmentWriter for HttpWriter {
    type Error = HttpError;

    fn write(&mut self, filename: &str, bytes: &[u8], mime: &str) -> Result<(), Self::Error> {
        let url = self.url_for(filename)?;
        let resp = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, mime)
            .body(bytes.to_vec())
            .send()
            .map_err(HttpError::Request)?;
        if !resp.status().is_success() {
            return Err(HttpError::Status { method: "PUT", status: resp.status() });
        }
        Ok(())
    }

    fn delete(&mut self, filename: &str) -> Result<(), Self::Error> {
        let url = self.url_for(filename)?;
        let resp = self.client.delete(url).send().map_err(HttpError::Request)?;
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(HttpError::Status { method: "DELETE", status: resp.status() });
        }
        Ok(())
    }
}

pub type HttpOutput = HlsOutput<HttpWriter>;

impl HttpOutput {
    pub fn at(base_url: Url, cfg: HlsOpenConfig) -> Self {
        HlsOutput::new("http", HttpWriter::new(base_url), cfg)
    }

    /// Zero-arg constructor for the stage registry (§5); `base-url` arrives
    /// later via `config("base-url", ...)`.
    pub fn create() -> Self {
        HlsOutput::create("http")
    }
}
