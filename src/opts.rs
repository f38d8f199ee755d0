use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::output_type::ManifestFormat;
use crate::records::SegmentMethod;
use crate::{Error, Result};

/// Archive listing page every metadata run starts from.
pub const DEFAULT_INDEX_URL: &str =
    "https://archive.phonetics.ucla.edu/Language%20Indices/index_available.htm";

/// Options for a whole corpus build.
///
/// This is library-level configuration, not CLI flags. The binary loads an
/// optional TOML file into this type and then applies its flag overrides, so
/// tests and other frontends can construct it programmatically.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Opts {
    /// Root for downloaded audio, clips, the store and the manifest.
    pub data_root: PathBuf,

    /// Store location. Defaults to `{data_root}/db/ipacorpus.db`.
    pub db_path: Option<PathBuf>,

    pub http: HttpOpts,
    pub metadata: MetadataOpts,
    pub download: DownloadOpts,
    pub segment: SegmentOpts,
    pub export: ExportOpts,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpOpts {
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataOpts {
    pub index_url: String,

    /// Minimum spacing between page requests.
    pub delay_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownloadOpts {
    /// Minimum spacing between requests of one worker.
    pub delay_secs: f64,
    pub workers: usize,
    pub retry: RetryOpts,

    /// Also fetch sentence, story and other non-word-list recordings.
    pub all_kinds: bool,
}

/// Bounded exponential backoff for transient HTTP failures.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryOpts {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SegmentOpts {
    pub workers: usize,
    pub backend: SegmentMethod,

    /// Silence thresholds in dBFS, tried in order (outer loop of the grid).
    pub thresholds_db: Vec<f64>,

    /// Minimum silence lengths in milliseconds (inner loop of the grid).
    pub min_silence_ms: Vec<u32>,

    /// Accept the first combination whose span count is within this distance of the entry count.
    pub tolerance: u32,

    /// Padding kept on both sides of each clip.
    pub keep_silence_ms: u32,

    /// Resample clips to this rate; `None` keeps the recording's own rate.
    pub clip_sample_rate: Option<u32>,

    /// Re-segment recordings that already have segments.
    pub force: bool,

    pub ffmpeg: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportOpts {
    /// Defaults to `{data_root}/manifest.{json,jsonl}`.
    pub output: Option<PathBuf>,
    pub format: ManifestFormat,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            db_path: None,
            http: HttpOpts::default(),
            metadata: MetadataOpts::default(),
            download: DownloadOpts::default(),
            segment: SegmentOpts::default(),
            export: ExportOpts::default(),
        }
    }
}

impl Default for HttpOpts {
    fn default() -> Self {
        Self {
            user_agent: format!(
                "ipacorpus/{} (academic research)",
                env!("CARGO_PKG_VERSION")
            ),
            connect_timeout_secs: 30,
            request_timeout_secs: 600,
        }
    }
}

impl Default for MetadataOpts {
    fn default() -> Self {
        Self {
            index_url: DEFAULT_INDEX_URL.to_string(),
            delay_secs: 0.5,
        }
    }
}

impl Default for DownloadOpts {
    fn default() -> Self {
        Self {
            delay_secs: 1.0,
            workers: 1,
            retry: RetryOpts::default(),
            all_kinds: false,
        }
    }
}

impl Default for RetryOpts {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl Default for SegmentOpts {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().saturating_sub(1).max(1),
            backend: SegmentMethod::Reference,
            thresholds_db: vec![-45.0, -40.0, -35.0, -30.0],
            min_silence_ms: vec![300, 200, 150],
            tolerance: 2,
            keep_silence_ms: 100,
            clip_sample_rate: None,
            force: false,
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

impl RetryOpts {
    /// Delay before retry number `attempt` (1-based): base, 2×base, 4×base, … capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

impl Opts {
    /// Load options from a TOML file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read config {}: {e}", path.display()))
        })?;
        let opts: Self = toml::from_str(&text)?;
        Ok(opts)
    }

    /// Reject values no phase can run with. Called once before any work starts.
    pub fn validate(&self) -> Result<()> {
        if self.download.workers == 0 || self.segment.workers == 0 {
            return Err(Error::config("worker pool size must be at least 1"));
        }
        for delay in [self.metadata.delay_secs, self.download.delay_secs] {
            if !delay.is_finite() || delay < 0.0 {
                return Err(Error::config(format!("invalid request delay {delay}")));
            }
        }
        if self.download.retry.max_attempts == 0 {
            return Err(Error::config("retry.max_attempts must be at least 1"));
        }
        let seg = &self.segment;
        if seg.thresholds_db.is_empty() || seg.min_silence_ms.is_empty() {
            return Err(Error::config("segmentation grid must not be empty"));
        }
        if seg.thresholds_db.iter().any(|t| !t.is_finite() || *t > 0.0) {
            return Err(Error::config("silence thresholds must be finite dBFS values <= 0"));
        }
        if seg.min_silence_ms.contains(&0) {
            return Err(Error::config("minimum silence must be at least 1 ms"));
        }
        if seg.clip_sample_rate == Some(0) {
            return Err(Error::config("clip sample rate must be positive"));
        }
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.data_root.join("db").join("ipacorpus.db"))
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.data_root.join("audio")
    }

    pub fn segments_dir(&self) -> PathBuf {
        self.data_root.join("segments")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.export.output.clone().unwrap_or_else(|| {
            self.data_root
                .join(format!("manifest.{}", self.export.format.extension()))
        })
    }
}
