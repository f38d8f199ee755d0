//! Backend that shells out to an `ffmpeg` executable.
//!
//! Detection runs the `silencedetect` filter once per grid combination and
//! reads its log from stderr; clips are cut with `-ss`/`-to` into 16-bit
//! mono PCM. Nothing is decoded in-process, so this backend handles any
//! container ffmpeg does.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::trace;

use crate::backend::SegmentBackend;
use crate::grid::GridParams;
use crate::records::SegmentMethod;
use crate::silence::Span;
use crate::{Error, Result};

const TOOL: &str = "ffmpeg";

pub struct FfmpegBackend {
    program: PathBuf,
    clip_sample_rate: Option<u32>,
}

pub struct FfmpegAudio {
    path: PathBuf,
    duration_ms: u64,
}

impl FfmpegBackend {
    pub fn new(program: impl Into<PathBuf>, clip_sample_rate: Option<u32>) -> Self {
        Self {
            program: program.into(),
            clip_sample_rate,
        }
    }

    fn run(&self, args: &[&OsStr]) -> Result<Output> {
        trace!(program = %self.program.display(), ?args, "running ffmpeg");
        Command::new(&self.program)
            .args(["-hide_banner", "-nostdin"])
            .args(args)
            .output()
            .map_err(|e| tool_error(format!("cannot run {}: {e}", self.program.display())))
    }

    fn run_checked(&self, args: &[&OsStr]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(tool_error(format!(
                "{}: {}",
                output.status,
                last_line(&output.stderr)
            )));
        }
        Ok(output)
    }
}

impl SegmentBackend for FfmpegBackend {
    type Audio = FfmpegAudio;

    fn method(&self) -> SegmentMethod {
        SegmentMethod::Ffmpeg
    }

    fn load(&self, path: &Path) -> Result<FfmpegAudio> {
        if !path.is_file() {
            return Err(Error::msg(format!("audio file missing: {}", path.display())));
        }
        // With no output file ffmpeg exits non-zero after printing stream info.
        let output = self.run(&[OsStr::new("-i"), path.as_os_str()])?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        let duration_ms = parse_duration_ms(&stderr).ok_or_else(|| {
            tool_error(format!(
                "no duration reported for {}: {}",
                path.display(),
                last_line(&output.stderr)
            ))
        })?;
        Ok(FfmpegAudio {
            path: path.to_path_buf(),
            duration_ms,
        })
    }

    fn duration_ms(&self, audio: &FfmpegAudio) -> u64 {
        audio.duration_ms
    }

    fn detect(&self, audio: &FfmpegAudio, params: &GridParams) -> Result<Vec<Span>> {
        let filter = format!(
            "silencedetect=noise={}dB:d={}",
            params.threshold_db,
            seconds(u64::from(params.min_silence_ms))
        );
        let output = self.run_checked(&[
            OsStr::new("-i"),
            audio.path.as_os_str(),
            OsStr::new("-af"),
            OsStr::new(&filter),
            OsStr::new("-f"),
            OsStr::new("null"),
            OsStr::new("-"),
        ])?;
        let silences = parse_silences(&String::from_utf8_lossy(&output.stderr), audio.duration_ms);
        Ok(invert(&silences, audio.duration_ms))
    }

    fn extract(&self, audio: &FfmpegAudio, span: Span, dest: &Path) -> Result<()> {
        let dir = dest
            .parent()
            .ok_or_else(|| Error::msg(format!("clip path has no parent: {}", dest.display())))?;
        std::fs::create_dir_all(dir)?;
        let tmp = tempfile::Builder::new().suffix(".wav").tempfile_in(dir)?;

        let start = seconds(span.start_ms);
        let end = seconds(span.end_ms);
        let rate = self.clip_sample_rate.map(|r| r.to_string());
        let mut args: Vec<&OsStr> = vec![
            OsStr::new("-y"),
            OsStr::new("-i"),
            audio.path.as_os_str(),
            OsStr::new("-ss"),
            OsStr::new(&start),
            OsStr::new("-to"),
            OsStr::new(&end),
            OsStr::new("-ac"),
            OsStr::new("1"),
        ];
        if let Some(rate) = &rate {
            args.extend([OsStr::new("-ar"), OsStr::new(rate)]);
        }
        args.extend([
            OsStr::new("-acodec"),
            OsStr::new("pcm_s16le"),
            OsStr::new("-f"),
            OsStr::new("wav"),
            tmp.path().as_os_str(),
        ]);
        self.run_checked(&args)?;

        tmp.as_file().sync_all()?;
        tmp.persist(dest)?;
        Ok(())
    }
}

fn tool_error(detail: String) -> Error {
    Error::Tool { tool: TOOL, detail }
}

fn seconds(ms: u64) -> String {
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

fn last_line(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no output")
        .to_string()
}

/// `Duration: 00:01:02.50, start: ...` from ffmpeg's stream summary.
fn parse_duration_ms(stderr: &str) -> Option<u64> {
    let rest = stderr.split("Duration: ").nth(1)?;
    let stamp = rest.split(',').next()?.trim();
    let mut parts = stamp.split(':');
    let h: u64 = parts.next()?.parse().ok()?;
    let m: u64 = parts.next()?.parse().ok()?;
    let s: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !s.is_finite() || s < 0.0 {
        return None;
    }
    Some((h * 3600 + m * 60) * 1000 + (s * 1000.0).round() as u64)
}

/// Silent ranges from `silencedetect` log lines.
///
/// A trailing `silence_start` with no matching end runs to `duration_ms`.
fn parse_silences(stderr: &str, duration_ms: u64) -> Vec<Span> {
    let mut silences = Vec::new();
    let mut open: Option<u64> = None;
    for line in stderr.lines() {
        if let Some(start) = field_ms(line, "silence_start:") {
            open = Some(start.min(duration_ms));
        } else if let Some(end) = field_ms(line, "silence_end:") {
            let start = open.take().unwrap_or(0);
            silences.push(Span::new(start, end.min(duration_ms)));
        }
    }
    if let Some(start) = open {
        silences.push(Span::new(start, duration_ms));
    }
    silences
}

fn field_ms(line: &str, key: &str) -> Option<u64> {
    let value = line.split(key).nth(1)?.split_whitespace().next()?;
    let secs: f64 = value.parse().ok()?;
    Some((secs.max(0.0) * 1000.0).round() as u64)
}

/// Non-silent gaps between silences; zero-length gaps are dropped.
fn invert(silences: &[Span], duration_ms: u64) -> Vec<Span> {
    let mut spans = Vec::with_capacity(silences.len() + 1);
    let mut cursor = 0;
    for s in silences {
        if s.start_ms > cursor {
            spans.push(Span::new(cursor, s.start_ms));
        }
        cursor = cursor.max(s.end_ms);
    }
    if cursor < duration_ms {
        spans.push(Span::new(cursor, duration_ms));
    }
    spans
}
