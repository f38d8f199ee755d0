//! Word-level segmentation of downloaded word-list recordings.
//!
//! Each recording is loaded once, searched over the silence grid until the
//! span count is close enough to its entry count, and cut into one clip per
//! span. Spans are assigned to entries by order. Clips are written into a
//! staging directory that replaces `{segments_dir}/{code}/{recording_id}`
//! only once every clip exists. The segment rows and the attempt row are
//! written in one store transaction; if it fails, the previous clips are put
//! back.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::SegmentBackend;
use crate::backends::{FfmpegBackend, ReferenceBackend};
use crate::downloader::audio_path;
use crate::grid::{GridResult, grid, search_grid};
use crate::opts::{Opts, SegmentOpts};
use crate::records::{
    AttemptStatus, DownloadStatus, NewSegment, Recording, RecordingKind, SegmentMethod,
    SegmentationAttempt, language_code,
};
use crate::store::Store;
use crate::summary::{Outcome, RunSummary};
use crate::worker_pool::run_pool;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum SegmentOutcome {
    Segmented {
        clips: u32,
        expected: u32,
        distance: u32,
        /// Grid was exhausted without reaching the tolerance.
        best_effort: bool,
    },
    Failed(String),
}

impl Outcome for SegmentOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Segmented {
                best_effort: false, ..
            } => "segmented",
            Self::Segmented { .. } => "best-effort",
            Self::Failed(_) => "failed",
        }
    }

    fn failure(&self) -> Option<String> {
        match self {
            Self::Failed(reason) => Some(reason.clone()),
            Self::Segmented { .. } => None,
        }
    }
}

/// Directory holding one recording's clips.
pub fn clip_dir(segments_dir: &Path, rec: &Recording) -> PathBuf {
    segments_dir
        .join(&rec.language_code)
        .join(rec.id.to_string())
}

pub fn clip_name(rec: &Recording, entry_number: u32) -> String {
    format!("{}_{entry_number:03}.wav", rec.stem())
}

/// Mismatches above this are worth a warning even after the grid search.
fn warn_distance(expected: u32) -> u32 {
    (expected * 3 / 10).max(3)
}

/// Downloaded word lists with entries that this method has not tried yet.
///
/// A recorded attempt, failed or empty, counts as tried; `force` retries it.
fn wants_segmentation(
    store: &Store,
    rec: &Recording,
    method: SegmentMethod,
    force: bool,
) -> Result<bool> {
    if rec.kind != RecordingKind::WordList || rec.download_status != DownloadStatus::Complete {
        return Ok(false);
    }
    if store.entry_count(rec.id)? == 0 {
        return Ok(false);
    }
    if force {
        return Ok(true);
    }
    Ok(store.segment_count(rec.id)? == 0 && store.attempt(rec.id, method)?.is_none())
}

/// Segment one recording and persist the result, success or failure.
pub fn segment_recording<B: SegmentBackend>(
    backend: &B,
    store: &mut Store,
    rec: &Recording,
    opts: &SegmentOpts,
    audio_dir: &Path,
    segments_dir: &Path,
) -> SegmentOutcome {
    let mut expected = 0;
    match try_segment(backend, store, rec, opts, audio_dir, segments_dir, &mut expected) {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(recording = %rec.filename, error = %err, "segmentation failed");
            let attempt = SegmentationAttempt {
                recording_id: rec.id,
                method: backend.method(),
                status: AttemptStatus::Failed,
                threshold_db: None,
                min_silence_ms: None,
                span_count: None,
                expected_count: expected,
                distance: None,
                evaluated: None,
                error: Some(err.to_string()),
            };
            match store.record_attempt(&attempt) {
                Ok(()) => SegmentOutcome::Failed(err.to_string()),
                Err(store_err) => {
                    SegmentOutcome::Failed(format!("{err}; recording the attempt failed: {store_err}"))
                }
            }
        }
    }
}

fn try_segment<B: SegmentBackend>(
    backend: &B,
    store: &mut Store,
    rec: &Recording,
    opts: &SegmentOpts,
    audio_dir: &Path,
    segments_dir: &Path,
    expected: &mut u32,
) -> Result<SegmentOutcome> {
    let entries = store.entries(rec.id)?;
    *expected = u32::try_from(entries.len()).unwrap_or(u32::MAX);
    if entries.is_empty() {
        return Err(Error::msg("recording has no entries"));
    }

    let path = rec
        .local_path
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| audio_path(audio_dir, rec));
    let audio = backend.load(&path)?;
    let duration_ms = backend.duration_ms(&audio);

    let params = grid(&opts.thresholds_db, &opts.min_silence_ms);
    let GridResult {
        spans,
        params: best,
        distance,
        evaluated,
    } = search_grid(&params, *expected, opts.tolerance, |p| backend.detect(&audio, p))?
        .ok_or_else(|| Error::config("segmentation grid must not be empty"))?;

    debug!(
        recording = %rec.filename,
        spans = spans.len(),
        expected = *expected,
        threshold_db = best.threshold_db,
        min_silence_ms = best.min_silence_ms,
        evaluated,
        "grid search finished"
    );
    if distance > warn_distance(*expected) {
        warn!(
            recording = %rec.filename,
            spans = spans.len(),
            expected = *expected,
            "span count far from entry count; surplus entries fall back to the full recording"
        );
    }

    let final_dir = clip_dir(segments_dir, rec);
    let staging = final_dir.with_extension("partial");
    remove_dir_if_exists(&staging)?;
    fs::create_dir_all(&staging)?;

    let pad = u64::from(opts.keep_silence_ms);
    let mut segments = Vec::with_capacity(spans.len().min(entries.len()));
    for (span, entry) in spans.iter().zip(&entries) {
        let span = span.padded(pad, duration_ms);
        let name = clip_name(rec, entry.entry_number);
        backend.extract(&audio, span, &staging.join(&name))?;
        segments.push(NewSegment {
            entry_id: entry.id,
            start_ms: span.start_ms,
            end_ms: span.end_ms,
            clip_path: final_dir.join(&name).to_string_lossy().into_owned(),
        });
    }

    let attempt = SegmentationAttempt {
        recording_id: rec.id,
        method: backend.method(),
        status: AttemptStatus::Succeeded,
        threshold_db: Some(best.threshold_db),
        min_silence_ms: Some(best.min_silence_ms),
        span_count: Some(u32::try_from(spans.len()).unwrap_or(u32::MAX)),
        expected_count: *expected,
        distance: Some(distance),
        evaluated: Some(evaluated),
        error: None,
    };
    swap_clip_dir(&staging, &final_dir, || store.replace_segments(&attempt, &segments))?;

    Ok(SegmentOutcome::Segmented {
        clips: u32::try_from(segments.len()).unwrap_or(u32::MAX),
        expected: *expected,
        distance,
        best_effort: distance > opts.tolerance,
    })
}

/// Move `staging` to `target`, then run `commit`.
///
/// The previous clip directory is parked next to `target` until `commit`
/// succeeds and is moved back if either step fails, so the clips on disk
/// always match the segment rows in the store.
fn swap_clip_dir(staging: &Path, target: &Path, commit: impl FnOnce() -> Result<()>) -> Result<()> {
    let previous = target.with_extension("previous");
    remove_dir_if_exists(&previous)?;
    let parked = match fs::rename(target, &previous) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => return Err(e.into()),
    };

    let swapped = fs::rename(staging, target)
        .map_err(Error::from)
        .and_then(|()| commit());
    match swapped {
        Ok(()) => {
            remove_dir_if_exists(&previous)?;
            Ok(())
        }
        Err(err) => {
            let restored = remove_dir_if_exists(target).and_then(|()| {
                if parked {
                    fs::rename(&previous, target)
                } else {
                    Ok(())
                }
            });
            if let Err(restore_err) = restored {
                warn!(dir = %target.display(), error = %restore_err, "previous clips not restored");
            }
            if let Err(cleanup_err) = remove_dir_if_exists(staging) {
                debug!(dir = %staging.display(), error = %cleanup_err, "staging clips left behind");
            }
            Err(err)
        }
    }
}

fn remove_dir_if_exists(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Segment every selected recording with `backend` on a worker pool.
pub fn run_segment_with<B: SegmentBackend>(
    opts: &Opts,
    language: Option<&str>,
    backend: &B,
) -> Result<RunSummary> {
    let code = language.map(language_code);
    let language = code.as_deref();
    let run_id = Uuid::new_v4();
    let method: SegmentMethod = backend.method();
    let _span = tracing::info_span!(
        "segment",
        %run_id,
        language = language.unwrap_or("all"),
        method = method.as_str()
    )
    .entered();

    let db_path = opts.db_path();
    let recordings = {
        let store = Store::open(&db_path)?;
        let mut selected = Vec::new();
        for rec in store.recordings(language)? {
            if wants_segmentation(&store, &rec, method, opts.segment.force)? {
                selected.push(rec);
            }
        }
        selected
    };
    info!(
        recordings = recordings.len(),
        workers = opts.segment.workers,
        force = opts.segment.force,
        "starting segmentation"
    );

    let audio_dir = opts.audio_dir();
    let segments_dir = opts.segments_dir();
    let mut summary = RunSummary::new("segment");

    run_pool(
        "segment",
        recordings,
        opts.segment.workers,
        |_| Store::open(&db_path),
        |store, rec| {
            let unit = format!("{}/{}", rec.language_code, rec.filename);
            let outcome =
                segment_recording(backend, store, &rec, &opts.segment, &audio_dir, &segments_dir);
            (unit, outcome)
        },
        |(unit, outcome)| summary.record(unit, &outcome),
    )?;

    summary.log();
    Ok(summary)
}

/// [`run_segment_with`] using the backend named in the options.
pub fn run_segment(opts: &Opts, language: Option<&str>) -> Result<RunSummary> {
    let rate = opts.segment.clip_sample_rate;
    match opts.segment.backend {
        SegmentMethod::Reference => run_segment_with(opts, language, &ReferenceBackend::new(rate)),
        SegmentMethod::Ffmpeg => {
            run_segment_with(opts, language, &FfmpegBackend::new(&opts.segment.ffmpeg, rate))
        }
    }
}
