//! HTTP plumbing shared by the metadata and download phases.
//!
//! [`Transport`] is the seam between the pipeline and the network: the
//! blocking [`HttpClient`] implements it against the real archive, and tests
//! substitute an in-memory server. Each worker owns one client, so the
//! [`Pacer`] inside it enforces request spacing per worker.

use std::io::Read;
use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, HeaderMap, RANGE};
use thiserror::Error;

use crate::opts::{HttpOpts, RetryOpts};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {detail}")]
    Transport {
        url: String,
        detail: String,
        transient: bool,
    },

    #[error("reading body from {url} failed: {detail}")]
    Body { url: String, detail: String },
}

impl FetchError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => matches!(status, 408 | 429 | 500..=599),
            Self::Transport { transient, .. } => *transient,
            Self::Body { .. } => true,
        }
    }

    /// 404 and 410: the resource is not coming back.
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::Status { status: 404 | 410, .. })
    }
}

/// Parsed `Content-Range: bytes start-end/total` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: Option<u64>,
}

impl ContentRange {
    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.trim().strip_prefix("bytes")?.trim_start();
        let (span, total) = rest.split_once('/')?;
        let (start, end) = span.split_once('-')?;
        let total = match total.trim() {
            "*" => None,
            t => Some(t.parse().ok()?),
        };
        Some(Self {
            start: start.trim().parse().ok()?,
            end: end.trim().parse().ok()?,
            total,
        })
    }
}

/// A response whose body has not been read yet.
pub struct HttpResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub content_range: Option<ContentRange>,
    pub body: Box<dyn Read + Send>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpHead {
    pub status: u16,
    pub content_length: Option<u64>,
}

/// The pipeline's view of the network.
///
/// `get` returns every HTTP status as a response; only failures to talk to
/// the server at all are errors. Callers decide what a status means.
pub trait Transport {
    /// GET `url`, asking for bytes from `range_start` onward when given.
    fn get(&mut self, url: &str, range_start: Option<u64>) -> Result<HttpResponse, FetchError>;

    fn head(&mut self, url: &str) -> Result<HttpHead, FetchError>;
}

/// Enforces a minimum spacing between consecutive requests.
#[derive(Debug)]
pub struct Pacer {
    min_interval: Duration,
    last: Option<Instant>,
}

impl Pacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// Block until at least `min_interval` has passed since the previous call.
    pub fn wait(&mut self) {
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                thread::sleep(self.min_interval - elapsed);
            }
        }
        self.last = Some(Instant::now());
    }
}

/// Blocking reqwest session with an identifying user agent and per-session pacing.
pub struct HttpClient {
    client: Client,
    pacer: Pacer,
}

impl HttpClient {
    pub fn new(opts: &HttpOpts, delay: Duration) -> crate::Result<Self> {
        let client = Client::builder()
            .user_agent(opts.user_agent.as_str())
            .connect_timeout(Duration::from_secs(opts.connect_timeout_secs))
            .timeout(Duration::from_secs(opts.request_timeout_secs))
            .build()
            .map_err(|e| crate::Error::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            pacer: Pacer::new(delay),
        })
    }
}

impl Transport for HttpClient {
    fn get(&mut self, url: &str, range_start: Option<u64>) -> Result<HttpResponse, FetchError> {
        self.pacer.wait();
        let mut req = self.client.get(url);
        if let Some(start) = range_start {
            req = req.header(RANGE, format!("bytes={start}-"));
        }
        let resp = req.send().map_err(|e| request_error(url, &e))?;
        let status = resp.status().as_u16();
        let content_length = header_u64(resp.headers());
        let content_range = resp
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(ContentRange::parse);
        Ok(HttpResponse {
            status,
            content_length,
            content_range,
            body: Box::new(resp),
        })
    }

    fn head(&mut self, url: &str) -> Result<HttpHead, FetchError> {
        self.pacer.wait();
        let resp = self
            .client
            .head(url)
            .send()
            .map_err(|e| request_error(url, &e))?;
        Ok(HttpHead {
            status: resp.status().as_u16(),
            content_length: header_u64(resp.headers()),
        })
    }
}

// Read the header directly: for HEAD responses the body-derived length is zero.
fn header_u64(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

fn request_error(url: &str, err: &reqwest::Error) -> FetchError {
    FetchError::Transport {
        url: url.to_string(),
        detail: err.to_string(),
        transient: !err.is_builder(),
    }
}

/// Fetch a page as text, retrying transient failures with backoff.
///
/// Pages that are not valid UTF-8 are decoded as Latin-1, which is what the
/// older archive pages are written in.
pub fn fetch_text<T: Transport + ?Sized>(
    transport: &mut T,
    url: &str,
    retry: &RetryOpts,
) -> Result<String, FetchError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match fetch_text_once(transport, url) {
            Ok(text) => return Ok(text),
            Err(err) if err.is_transient() && attempt < retry.max_attempts => {
                let delay = retry.backoff(attempt);
                tracing::warn!(url, attempt, error = %err, delay_ms = delay.as_millis() as u64, "retrying page fetch");
                thread::sleep(delay);
            }
            Err(err) => return Err(err),
        }
    }
}

fn fetch_text_once<T: Transport + ?Sized>(
    transport: &mut T,
    url: &str,
) -> Result<String, FetchError> {
    let mut resp = transport.get(url, None)?;
    if !(200..300).contains(&resp.status) {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: resp.status,
        });
    }
    let mut bytes = Vec::new();
    resp.body
        .read_to_end(&mut bytes)
        .map_err(|e| FetchError::Body {
            url: url.to_string(),
            detail: e.to_string(),
        })?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => err.into_bytes().iter().map(|&b| char::from(b)).collect(),
    })
}
