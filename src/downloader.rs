//! Recording audio downloads.
//!
//! Audio lands at `{audio_dir}/{language_code}/{filename}`. Bytes are written
//! to `{dest}.part` first and only renamed into place once the expected size
//! has arrived, so an interrupted run leaves a partial file the next run can
//! resume with a `Range` request.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use uuid::Uuid;

use crate::Result;
use crate::http::{FetchError, HttpClient, Transport};
use crate::opts::{Opts, RetryOpts};
use crate::records::{DownloadStatus, Recording, RecordingKind, language_code};
use crate::store::{DownloadRecord, Store};
use crate::summary::{Outcome, RunSummary};
use crate::worker_pool::run_pool;

const COPY_BUF_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Already recorded complete with a matching file; no request was made.
    AlreadyComplete { bytes: u64 },
    /// A file found on disk matched the server's size.
    Verified { bytes: u64 },
    Downloaded { bytes: u64, resumed_from: u64 },
    /// 404 or 410. Never retried.
    Gone(String),
    /// Retries exhausted or rejected by the server. Retried on the next run.
    Failed(String),
}

impl DownloadOutcome {
    fn into_record(self, dest: &Path) -> DownloadRecord {
        let local_path = Some(dest.to_string_lossy().into_owned());
        match self {
            Self::AlreadyComplete { bytes }
            | Self::Verified { bytes }
            | Self::Downloaded { bytes, .. } => DownloadRecord {
                status: DownloadStatus::Complete,
                local_path,
                size_bytes: Some(bytes),
                error: None,
            },
            Self::Gone(reason) => DownloadRecord {
                status: DownloadStatus::Gone,
                local_path: None,
                size_bytes: None,
                error: Some(reason),
            },
            Self::Failed(reason) => DownloadRecord {
                status: DownloadStatus::Failed,
                local_path: None,
                size_bytes: None,
                error: Some(reason),
            },
        }
    }
}

impl Outcome for DownloadOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::AlreadyComplete { .. } => "skipped",
            Self::Verified { .. } => "verified",
            Self::Downloaded { resumed_from: 0, .. } => "downloaded",
            Self::Downloaded { .. } => "resumed",
            Self::Gone(_) => "gone",
            Self::Failed(_) => "failed",
        }
    }

    fn failure(&self) -> Option<String> {
        match self {
            Self::Gone(reason) | Self::Failed(reason) => Some(reason.clone()),
            _ => None,
        }
    }
}

/// Deterministic local path for a recording's audio.
pub fn audio_path(audio_dir: &Path, rec: &Recording) -> PathBuf {
    audio_location(audio_dir, &rec.language_code, &rec.filename)
}

pub fn audio_location(audio_dir: &Path, language_code: &str, filename: &str) -> PathBuf {
    audio_dir.join(language_code).join(filename)
}

fn part_path(dest: &Path) -> PathBuf {
    PathBuf::from(format!("{}.part", dest.display()))
}

/// Recordings the download phase should look at.
///
/// `gone` recordings are terminal. Complete ones are still listed so a
/// missing or truncated file gets noticed, but they cost no request when
/// the file is intact.
pub fn wants_download(rec: &Recording, all_kinds: bool) -> bool {
    rec.audio_url.is_some()
        && rec.download_status != DownloadStatus::Gone
        && (all_kinds || rec.kind == RecordingKind::WordList)
}

/// Make sure one recording's audio is on disk.
pub fn download_recording<T: Transport + ?Sized>(
    transport: &mut T,
    rec: &Recording,
    audio_dir: &Path,
    retry: &RetryOpts,
) -> DownloadOutcome {
    let Some(url) = rec.audio_url.as_deref() else {
        return DownloadOutcome::Failed("recording has no audio URL".into());
    };
    let dest = audio_path(audio_dir, rec);
    let part = part_path(&dest);

    let on_disk = fs::metadata(&dest).ok().map(|m| m.len());

    if rec.download_status == DownloadStatus::Complete {
        if let (Some(len), Some(expected)) = (on_disk, rec.size_bytes) {
            if len == expected {
                return DownloadOutcome::AlreadyComplete { bytes: len };
            }
        }
    }

    if let Some(parent) = dest.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            return DownloadOutcome::Failed(format!("create {}: {err}", parent.display()));
        }
    }

    if let Some(len) = on_disk {
        match transport.head(url) {
            Ok(head) if (200..300).contains(&head.status) && head.content_length == Some(len) => {
                tracing::debug!(url, bytes = len, "existing file matches remote size");
                return DownloadOutcome::Verified { bytes: len };
            }
            Ok(head) if matches!(head.status, 404 | 410) => {
                return DownloadOutcome::Gone(format!("HTTP {} for {url}", head.status));
            }
            Ok(_) | Err(_) => {
                // Whatever is there becomes the partial to resume from; the
                // range response decides whether it is kept.
                if let Err(err) = fs::rename(&dest, &part) {
                    return DownloadOutcome::Failed(format!("move {}: {err}", dest.display()));
                }
            }
        }
    }

    let resumed_from = fs::metadata(&part).map(|m| m.len()).unwrap_or(0);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match fetch_to_part(transport, url, &part) {
            Ok(bytes) => {
                if let Err(err) = fs::rename(&part, &dest) {
                    return DownloadOutcome::Failed(format!("move into place: {err}"));
                }
                tracing::debug!(url, bytes, resumed_from, "download complete");
                return DownloadOutcome::Downloaded {
                    bytes,
                    resumed_from,
                };
            }
            Err(err) if err.is_gone() => {
                let _ = fs::remove_file(&part);
                return DownloadOutcome::Gone(err.to_string());
            }
            Err(err) if err.is_transient() && attempt < retry.max_attempts => {
                let delay = retry.backoff(attempt);
                tracing::warn!(url, attempt, error = %err, delay_ms = delay.as_millis() as u64, "retrying download");
                thread::sleep(delay);
            }
            Err(err) => return DownloadOutcome::Failed(err.to_string()),
        }
    }
}

/// One request: append to or restart `part`, returning its final size.
fn fetch_to_part<T: Transport + ?Sized>(
    transport: &mut T,
    url: &str,
    part: &Path,
) -> std::result::Result<u64, FetchError> {
    let have = fs::metadata(part).map(|m| m.len()).unwrap_or(0);
    let resp = transport.get(url, (have > 0).then_some(have))?;

    let body_err = |detail: String| FetchError::Body {
        url: url.to_string(),
        detail,
    };

    let (file, offset, total) = match resp.status {
        206 => {
            let range = resp.content_range;
            if range.map(|r| r.start) != Some(have) {
                let _ = fs::remove_file(part);
                return Err(body_err(format!(
                    "server answered range {range:?} for a request from byte {have}"
                )));
            }
            let total = range
                .and_then(|r| r.total)
                .or(resp.content_length.map(|n| have + n));
            let file = OpenOptions::new().append(true).open(part);
            (file, have, total)
        }
        200 => (File::create(part), 0, resp.content_length),
        416 if have > 0 => {
            tracing::debug!(url, have, "range not satisfiable, restarting");
            fs::remove_file(part).map_err(|e| body_err(format!("discard partial: {e}")))?;
            return fetch_to_part(transport, url, part);
        }
        status => {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }
    };

    let mut file = file.map_err(|e| body_err(format!("open {}: {e}", part.display())))?;
    let mut body = resp.body;
    let mut written = offset;
    let mut buf = vec![0u8; COPY_BUF_LEN];
    let copied = loop {
        let n = match body.read(&mut buf) {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => break Err(body_err(e.to_string())),
        };
        if let Err(e) = file.write_all(&buf[..n]) {
            break Err(body_err(format!("write {}: {e}", part.display())));
        }
        written += n as u64;
    };
    // Keep whatever arrived, even when the body broke off.
    file.sync_all()
        .map_err(|e| body_err(format!("sync {}: {e}", part.display())))?;
    copied?;

    match total {
        Some(total) if written != total => Err(body_err(format!(
            "short body: have {written} of {total} bytes"
        ))),
        _ => Ok(written),
    }
}

/// Download every selected recording on a pool of workers.
///
/// `connect` builds one transport per worker, so each worker keeps its own
/// session and request pacing.
pub fn run_download_with<T, C>(
    opts: &Opts,
    language: Option<&str>,
    connect: C,
) -> Result<RunSummary>
where
    T: Transport,
    C: Fn() -> Result<T> + Sync,
{
    let code = language.map(language_code);
    let language = code.as_deref();
    let run_id = Uuid::new_v4();
    let _span = tracing::info_span!("download", %run_id, language = language.unwrap_or("all"))
        .entered();

    let db_path = opts.db_path();
    let recordings: Vec<Recording> = Store::open(&db_path)?
        .recordings(language)?
        .into_iter()
        .filter(|r| wants_download(r, opts.download.all_kinds))
        .collect();
    tracing::info!(recordings = recordings.len(), workers = opts.download.workers, "starting downloads");

    let audio_dir = opts.audio_dir();
    let retry = &opts.download.retry;
    let mut summary = RunSummary::new("download");

    run_pool(
        "download",
        recordings,
        opts.download.workers,
        |_| Ok((Store::open(&db_path)?, connect()?)),
        |(store, transport), rec| {
            let unit = format!("{}/{}", rec.language_code, rec.filename);
            let outcome = download_recording(transport, &rec, &audio_dir, retry);
            let record = outcome.clone().into_record(&audio_path(&audio_dir, &rec));
            let stored = store.record_download(rec.id, &record);
            (unit, outcome, stored)
        },
        |(unit, outcome, stored)| match stored {
            Ok(()) => summary.record(unit, &outcome),
            Err(err) => summary.fail(unit, err),
        },
    )?;

    summary.log();
    Ok(summary)
}

/// [`run_download_with`] over real HTTP sessions.
pub fn run_download(opts: &Opts, language: Option<&str>) -> Result<RunSummary> {
    let delay = Duration::from_secs_f64(opts.download.delay_secs);
    run_download_with(opts, language, || HttpClient::new(&opts.http, delay))
}
