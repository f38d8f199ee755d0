//! Typed records for the four pipeline entities and their status columns.
//!
//! Status enums round-trip through SQLite as short lowercase strings; an
//! unknown string in the database is surfaced as a conversion error at the
//! store boundary instead of leaking into the pipeline.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

/// Declares a string-backed enum with `as_str`, `Display`, `FromStr`, serde and SQLite conversions.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $text ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok(Self::$variant), )+
                    other => Err(format!(
                        concat!("unknown ", stringify!($name), " '{}'"),
                        other
                    )),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                let text = String::deserialize(d)?;
                text.parse().map_err(serde::de::Error::custom)
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                text.parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

text_enum! {
    /// What a recording contains, taken from the `_<kind>_` infix of its filename.
    pub enum RecordingKind {
        WordList => "word-list",
        Sentence => "sentence",
        Story => "story",
        Conversation => "conversation",
        Narrative => "narrative",
        Other => "other",
    }
}

text_enum! {
    pub enum DownloadStatus {
        Pending => "pending",
        Complete => "complete",
        /// Transient failures exhausted, or a non-terminal rejection. Retried next run.
        Failed => "failed",
        /// 404/410. Never retried.
        Gone => "gone",
    }
}

text_enum! {
    pub enum WordlistStatus {
        Pending => "pending",
        Parsed => "parsed",
        /// The page was fetched (or there is no page) but nothing parsed.
        NoEntries => "no-entries",
        FetchFailed => "fetch-failed",
    }
}

text_enum! {
    /// Which backend produced a segment.
    pub enum SegmentMethod {
        Reference => "reference",
        Ffmpeg => "ffmpeg",
    }
}

text_enum! {
    /// Which column classifier produced an entry.
    pub enum ColumnLayout {
        Header => "header",
        IpaDensity => "ipa-density",
        NonAscii => "non-ascii",
        Positional => "positional",
        Merged => "merged",
    }
}

text_enum! {
    pub enum AttemptStatus {
        Succeeded => "succeeded",
        Failed => "failed",
    }
}

impl AttemptStatus {
    pub fn is_success(self) -> bool {
        self == Self::Succeeded
    }
}

impl RecordingKind {
    /// Classify a recording from its filename, e.g. `abq_word-list_1992_01.wav`.
    pub fn from_filename(filename: &str) -> Self {
        let lower = filename.to_ascii_lowercase();
        [
            Self::WordList,
            Self::Sentence,
            Self::Story,
            Self::Conversation,
            Self::Narrative,
        ]
        .into_iter()
        .find(|kind| lower.contains(&format!("_{}_", kind.as_str())))
        .unwrap_or(Self::Other)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Language {
    pub code: String,
    pub name: String,
    pub url: String,
}

/// A recording as described on a language page, before it has a store id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordingDescriptor {
    pub filename: String,
    pub audio_url: Option<String>,
    pub wordlist_url: Option<String>,
    pub entry_start: Option<u32>,
    pub entry_end: Option<u32>,
    pub year: Option<u16>,
    pub sequence: Option<u16>,
    pub additional_info: Option<String>,
}

impl RecordingDescriptor {
    pub fn kind(&self) -> RecordingKind {
        RecordingKind::from_filename(&self.filename)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub id: i64,
    pub language_code: String,
    pub filename: String,
    pub kind: RecordingKind,
    pub audio_url: Option<String>,
    pub wordlist_url: Option<String>,
    pub entry_start: Option<u32>,
    pub entry_end: Option<u32>,
    pub year: Option<u16>,
    pub sequence: Option<u16>,
    pub additional_info: Option<String>,
    pub local_path: Option<String>,
    pub download_status: DownloadStatus,
    pub size_bytes: Option<u64>,
    pub download_error: Option<String>,
    pub wordlist_status: WordlistStatus,
}

impl Recording {
    /// Filename without its extension; clip names and manifest ids build on it.
    pub fn stem(&self) -> &str {
        file_stem(&self.filename)
    }
}

/// Language codes are stored upper-case, so `abq` and `ABQ` select the same language.
pub fn language_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// `abq_word-list_1992_01.wav` -> `abq_word-list_1992_01`.
pub fn file_stem(filename: &str) -> &str {
    filename.rsplit_once('.').map_or(filename, |(stem, _)| stem)
}

/// One parsed word-list row with its entry number already settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub entry_number: u32,
    pub position: u32,
    pub ipa: Option<String>,
    pub gloss: Option<String>,
    pub orthography: Option<String>,
    pub sound: Option<String>,
    pub layout: ColumnLayout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: i64,
    pub recording_id: i64,
    pub entry_number: u32,
    pub position: u32,
    pub ipa: Option<String>,
    pub gloss: Option<String>,
    pub orthography: Option<String>,
    pub sound: Option<String>,
    pub layout: ColumnLayout,
}

/// A clip ready to be stored for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSegment {
    pub entry_id: i64,
    pub start_ms: u64,
    pub end_ms: u64,
    pub clip_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub id: i64,
    pub entry_id: i64,
    pub recording_id: i64,
    pub start_ms: u64,
    pub end_ms: u64,
    pub clip_path: String,
    pub method: SegmentMethod,
}

/// The outcome of the latest segmentation of one recording with one method.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationAttempt {
    pub recording_id: i64,
    pub method: SegmentMethod,
    pub status: AttemptStatus,
    pub threshold_db: Option<f64>,
    pub min_silence_ms: Option<u32>,
    pub span_count: Option<u32>,
    pub expected_count: u32,
    pub distance: Option<u32>,
    pub evaluated: Option<u32>,
    pub error: Option<String>,
}
