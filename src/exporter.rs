//! Manifest export.
//!
//! Every entry of a recording with at least one entry becomes exactly one
//! record. Segmented entries point at their clip; the rest are fallback
//! records that point at the full recording and carry its expected entry
//! range. The manifest is written to a temp file and renamed into place.

use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::info;

use crate::downloader::audio_location;
use crate::json_array_encoder::JsonArrayEncoder;
use crate::jsonl_encoder::JsonlEncoder;
use crate::opts::Opts;
use crate::output_type::ManifestFormat;
use crate::record_encoder::RecordEncoder;
use crate::records::{file_stem, language_code};
use crate::store::{ManifestRow, Store};
use crate::{Error, Result};

/// One manifest line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestRecord<'a> {
    /// `{language_code}_{recording stem}_{entry:03}`.
    pub id: String,
    pub language_code: &'a str,
    pub language: &'a str,
    pub recording: &'a str,
    pub entry_number: u32,
    pub ipa: Option<&'a str>,
    pub gloss: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orthography: Option<&'a str>,
    pub audio_path: String,
    pub fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_range: Option<[u32; 2]>,
}

impl<'a> ManifestRecord<'a> {
    pub fn from_row(row: &'a ManifestRow, audio_dir: &Path) -> Self {
        let id = format!(
            "{}_{}_{:03}",
            row.language_code,
            file_stem(&row.filename),
            row.entry_number
        );
        let base = Self {
            id,
            language_code: &row.language_code,
            language: &row.language_name,
            recording: &row.filename,
            entry_number: row.entry_number,
            ipa: row.ipa.as_deref(),
            gloss: row.gloss.as_deref(),
            orthography: row.orthography.as_deref(),
            audio_path: String::new(),
            fallback: false,
            start_ms: None,
            end_ms: None,
            method: None,
            entry_range: None,
        };

        match &row.segment {
            Some(clip) => Self {
                audio_path: clip.clip_path.clone(),
                start_ms: Some(clip.start_ms),
                end_ms: Some(clip.end_ms),
                method: Some(clip.method.as_str()),
                ..base
            },
            None => Self {
                audio_path: row.local_path.clone().unwrap_or_else(|| {
                    audio_location(audio_dir, &row.language_code, &row.filename)
                        .to_string_lossy()
                        .into_owned()
                }),
                fallback: true,
                entry_range: row.range_start.zip(row.range_end).map(|(a, b)| [a, b]),
                ..base
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub path: PathBuf,
    pub records: u64,
    pub segmented: u64,
    pub fallback: u64,
}

/// Encode `rows` in order, returning `(segmented, fallback)` counts.
pub fn write_records(
    rows: &[ManifestRow],
    audio_dir: &Path,
    encoder: &mut dyn RecordEncoder,
) -> Result<(u64, u64)> {
    let (mut segmented, mut fallback) = (0, 0);
    for row in rows {
        let record = ManifestRecord::from_row(row, audio_dir);
        if record.fallback {
            fallback += 1;
        } else {
            segmented += 1;
        }
        encoder.write_record(&record)?;
    }
    encoder.close()?;
    Ok((segmented, fallback))
}

/// Write the manifest for `language` (or everything) to the configured path.
pub fn export_manifest(opts: &Opts, language: Option<&str>) -> Result<ExportReport> {
    let code = language.map(language_code);
    let language = code.as_deref();
    let _span = tracing::info_span!("export", language = language.unwrap_or("all")).entered();

    let rows = Store::open(&opts.db_path())?.manifest_rows(language)?;
    let path = opts.manifest_path();
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    let (segmented, fallback) = {
        let w = BufWriter::new(tmp.as_file_mut());
        let mut encoder: Box<dyn RecordEncoder + '_> = match opts.export.format {
            ManifestFormat::Json => Box::new(JsonArrayEncoder::new(w)),
            ManifestFormat::Jsonl => Box::new(JsonlEncoder::new(w)),
        };
        write_records(&rows, &opts.audio_dir(), encoder.as_mut())?
    };
    tmp.as_file().sync_all()?;
    tmp.persist(&path)
        .map_err(|e| Error::msg(format!("cannot write {}: {}", path.display(), e.error)))?;

    let report = ExportReport {
        path,
        records: segmented + fallback,
        segmented,
        fallback,
    };
    info!(
        path = %report.path.display(),
        records = report.records,
        segmented = report.segmented,
        fallback = report.fallback,
        format = opts.export.format.extension(),
        "manifest written"
    );
    Ok(report)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::records::SegmentMethod;
    use crate::store::ManifestClip;

    /// A segmented record with no optional fields set.
    pub(crate) fn record(entry_number: u32, ipa: &'static str) -> ManifestRecord<'static> {
        ManifestRecord {
            id: format!("abq_abq_word-list_1992_01_{entry_number:03}"),
            language_code: "abq",
            language: "Abkhaz",
            recording: "abq_word-list_1992_01.wav",
            entry_number,
            ipa: Some(ipa),
            gloss: Some("gloss"),
            orthography: None,
            audio_path: format!("clips/{entry_number}.wav"),
            fallback: false,
            start_ms: Some(0),
            end_ms: Some(500),
            method: Some("reference"),
            entry_range: None,
        }
    }

    fn row(entry_number: u32, segment: Option<ManifestClip>) -> ManifestRow {
        ManifestRow {
            language_code: "abq".into(),
            language_name: "Abkhaz".into(),
            recording_id: 1,
            filename: "abq_word-list_1992_01.wav".into(),
            local_path: None,
            range_start: Some(1),
            range_end: Some(40),
            entry_number,
            ipa: Some("ʔa".into()),
            gloss: Some("yes".into()),
            orthography: None,
            segment,
        }
    }

    #[test]
    fn segmented_row_points_at_its_clip() -> anyhow::Result<()> {
        let r = row(
            7,
            Some(ManifestClip {
                clip_path: "data/segments/abq/1/abq_word-list_1992_01_007.wav".into(),
                start_ms: 1_200,
                end_ms: 1_900,
                method: SegmentMethod::Ffmpeg,
            }),
        );
        let rec = ManifestRecord::from_row(&r, Path::new("data/audio"));
        assert_eq!(rec.id, "abq_abq_word-list_1992_01_007");
        assert!(!rec.fallback);
        assert_eq!(rec.method, Some("ffmpeg"));
        assert_eq!(rec.entry_range, None);

        let json = serde_json::to_value(&rec)?;
        assert!(json.get("orthography").is_none());
        assert!(json.get("entry_range").is_none());
        assert_eq!(json["start_ms"], 1_200);
        Ok(())
    }

    #[test]
    fn unsegmented_row_falls_back_to_the_recording() -> anyhow::Result<()> {
        let r = row(8, None);
        let rec = ManifestRecord::from_row(&r, Path::new("data/audio"));
        assert!(rec.fallback);
        assert_eq!(
            PathBuf::from(&rec.audio_path),
            Path::new("data/audio/abq/abq_word-list_1992_01.wav")
        );
        assert_eq!(rec.entry_range, Some([1, 40]));

        let json = serde_json::to_value(&rec)?;
        assert!(json.get("start_ms").is_none());
        assert!(json.get("method").is_none());
        assert_eq!(json["fallback"], true);
        Ok(())
    }

    #[test]
    fn counts_split_by_fallback() -> anyhow::Result<()> {
        let clip = ManifestClip {
            clip_path: "c.wav".into(),
            start_ms: 0,
            end_ms: 10,
            method: SegmentMethod::Reference,
        };
        let rows = vec![row(1, Some(clip.clone())), row(2, None), row(3, Some(clip))];
        let mut out = Vec::new();
        let mut enc = JsonlEncoder::new(&mut out);
        let counts = write_records(&rows, Path::new("a"), &mut enc)?;
        assert_eq!(counts, (2, 1));
        assert_eq!(std::str::from_utf8(&out)?.lines().count(), 3);
        Ok(())
    }
}
