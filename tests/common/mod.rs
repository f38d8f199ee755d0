#![allow(dead_code)]

use std::collections::HashMap;
use std::f32::consts::TAU;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};

use hound::{SampleFormat, WavSpec, WavWriter};
use ipacorpus::http::{ContentRange, FetchError, HttpHead, HttpResponse, Transport};
use ipacorpus::opts::{Opts, RetryOpts};
use tempfile::TempDir;

pub const INDEX_URL: &str = "https://archive.test/Language%20Indices/index_available.htm";
pub const LANG_URL: &str = "https://archive.test/Language/ABQ/abq.html";
pub const WORDS_01: &str = "https://archive.test/Language/ABQ/abq_word-list_1992_01.html";
pub const WORDS_02: &str = "https://archive.test/Language/ABQ/abq_word-list_1992_02.html";
pub const AUDIO_01: &str = "https://archive.test/Language/ABQ/abq_word-list_1992_01.wav";
pub const AUDIO_02: &str = "https://archive.test/Language/ABQ/abq_word-list_1992_02.wav";

pub const RATE: u32 = 16_000;

/// An in-memory archive server. Clones share their file table and request log.
#[derive(Clone, Default)]
pub struct FakeArchive {
    files: Arc<HashMap<String, Vec<u8>>>,
    requests: Arc<Mutex<Vec<(String, Option<u64>)>>>,
}

impl FakeArchive {
    pub fn new(files: HashMap<String, Vec<u8>>) -> Self {
        Self {
            files: Arc::new(files),
            requests: Arc::default(),
        }
    }

    /// GET requests seen so far as `(url, range start)`.
    pub fn requests(&self) -> Vec<(String, Option<u64>)> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for FakeArchive {
    fn get(&mut self, url: &str, range_start: Option<u64>) -> Result<HttpResponse, FetchError> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), range_start));

        let Some(bytes) = self.files.get(url) else {
            return Ok(HttpResponse {
                status: 404,
                content_length: Some(0),
                content_range: None,
                body: Box::new(std::io::empty()),
            });
        };
        let total = bytes.len() as u64;
        match range_start {
            Some(start) if start < total => {
                let slice = bytes[start as usize..].to_vec();
                Ok(HttpResponse {
                    status: 206,
                    content_length: Some(slice.len() as u64),
                    content_range: Some(ContentRange {
                        start,
                        end: total - 1,
                        total: Some(total),
                    }),
                    body: Box::new(Cursor::new(slice)),
                })
            }
            Some(_) => Ok(HttpResponse {
                status: 416,
                content_length: Some(0),
                content_range: None,
                body: Box::new(std::io::empty()),
            }),
            None => Ok(HttpResponse {
                status: 200,
                content_length: Some(total),
                content_range: None,
                body: Box::new(Cursor::new(bytes.clone())),
            }),
        }
    }

    fn head(&mut self, url: &str) -> Result<HttpHead, FetchError> {
        Ok(match self.files.get(url) {
            Some(bytes) => HttpHead {
                status: 200,
                content_length: Some(bytes.len() as u64),
            },
            None => HttpHead {
                status: 404,
                content_length: None,
            },
        })
    }
}

fn fixture(name: &str) -> Vec<u8> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read(&path).unwrap_or_else(|e| panic!("fixture {}: {e}", path.display()))
}

/// The Abaza slice of the archive: index, one language page, two word lists
/// (the second one empty) and audio for both recordings.
pub fn abaza_archive() -> FakeArchive {
    let mut files = HashMap::new();
    files.insert(INDEX_URL.to_string(), fixture("index_available.htm"));
    files.insert(LANG_URL.to_string(), fixture("abq.html"));
    files.insert(WORDS_01.to_string(), fixture("abq_word-list_1992_01.html"));
    files.insert(WORDS_02.to_string(), fixture("abq_word-list_1992_02.html"));
    files.insert(AUDIO_01.to_string(), word_list_wav(11));
    files.insert(AUDIO_02.to_string(), word_list_wav(9));
    FakeArchive::new(files)
}

/// `words` 300 ms tones separated by 500 ms of digital silence, as WAV bytes.
pub fn word_list_wav(words: usize) -> Vec<u8> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let ms = |n: usize| n * RATE as usize / 1000;

    let mut out = Cursor::new(Vec::new());
    {
        let mut w = WavWriter::new(&mut out, spec).unwrap();
        let silence = |w: &mut WavWriter<&mut Cursor<Vec<u8>>>, len: usize| {
            for _ in 0..len {
                w.write_sample(0i16).unwrap();
            }
        };
        silence(&mut w, ms(400));
        for word in 0..words {
            let freq = 220.0 + 40.0 * word as f32;
            for i in 0..ms(300) {
                let t = i as f32 / RATE as f32;
                w.write_sample(((TAU * freq * t).sin() * 10_000.0) as i16)
                    .unwrap();
            }
            silence(&mut w, ms(if word + 1 == words { 400 } else { 500 }));
        }
        w.finalize().unwrap();
    }
    out.into_inner()
}

/// Options rooted in a fresh temp dir, pointed at the fake archive, without backoff sleeps.
pub fn test_opts() -> (TempDir, Opts) {
    let dir = TempDir::new().unwrap();
    let mut opts = Opts::default();
    opts.data_root = dir.path().to_path_buf();
    opts.metadata.index_url = INDEX_URL.to_string();
    opts.metadata.delay_secs = 0.0;
    opts.download.delay_secs = 0.0;
    opts.download.retry = RetryOpts {
        max_attempts: 2,
        base_delay_ms: 0,
        max_delay_ms: 0,
    };
    opts.segment.workers = 2;
    (dir, opts)
}
