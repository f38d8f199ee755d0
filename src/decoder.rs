//! Decode a whole recording into mono `f32`.
//!
//! Archive recordings are short enough to hold in memory, and silence
//! detection needs random access to the whole signal. Unlike a live stream,
//! a damaged file is not decoded around: a corrupt frame or a file shorter
//! than its header declares fails the decode.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;

use crate::audio_pipeline::AudioPipeline;
use crate::demux::{next_packet, probe_default_track};

#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_ms(&self) -> u64 {
        self.samples.len() as u64 * 1000 / u64::from(self.sample_rate.max(1))
    }
}

/// Decode `path`, resampling to `target_rate` when given.
pub fn decode_file(path: &Path, target_rate: Option<u32>) -> Result<DecodedAudio> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let extension = path.extension().and_then(|e| e.to_str());
    let (mut format, track) = probe_default_track(Box::new(file), extension)?;
    let declared_frames = track.codec_params.n_frames;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| anyhow!(e))
        .context("unsupported codec")?;

    let mut pipeline = AudioPipeline::new(target_rate);
    while let Some(packet) = next_packet(&mut format)? {
        if packet.track_id() != track.id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(buf) => pipeline.push(&buf)?,
            Err(SymphoniaError::DecodeError(msg)) => {
                bail!("corrupt frame at timestamp {}: {msg}", packet.ts())
            }
            Err(e) => return Err(anyhow!(e)).context("decoder failure"),
        }
    }

    if let Some(declared) = declared_frames {
        let decoded = pipeline.source_frames();
        if decoded < declared {
            bail!("truncated audio: decoded {decoded} of {declared} frames");
        }
    }

    let (samples, sample_rate) = pipeline.finish()?;
    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}
