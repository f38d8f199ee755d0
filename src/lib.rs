//! `ipacorpus` builds a word-level, IPA-labelled speech corpus from the UCLA
//! Phonetics Lab Archive.
//!
//! The pipeline runs as four resumable phases over a shared SQLite store:
//! - metadata: scrape the language index, language pages and word-list tables
//! - download: fetch recording audio with resume and bounded retry
//! - segment: split word-list recordings into per-entry clips by silence
//! - export: write a JSON or JSON Lines manifest, falling back to the full
//!   recording for entries without a clip
//!
//! Each phase can be re-run at any time; all writes are keyed upserts.

// Configuration and shared types.
pub mod error;
pub mod opts;
pub mod output_type;
pub mod records;
pub mod summary;

// Persistence.
pub mod store;

// Archive scraping.
pub mod html;
pub mod http;
pub mod index_parser;
pub mod language_parser;
pub mod metadata;
pub mod wordlist;

// Audio download.
pub mod downloader;
pub mod worker_pool;

// Audio decoding and clip writing.
pub mod audio_pipeline;
pub mod decoder;
pub mod demux;
pub mod wav;

// Silence segmentation.
pub mod backend;
pub mod backends;
pub mod grid;
pub mod segmenter;
pub mod silence;

// Manifest export and its encoders.
pub mod exporter;
pub mod json_array_encoder;
pub mod jsonl_encoder;
pub mod record_encoder;

// Logging configuration.
#[cfg(feature = "logging")]
pub mod logging;

pub use error::{Error, Result};
