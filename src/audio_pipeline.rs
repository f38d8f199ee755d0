//! PCM normalization for decoded recordings.
//!
//! Converts Symphonia buffers to interleaved `f32`, downmixes to mono and,
//! when a target rate is set, resamples with rubato. Output accumulates for
//! the whole recording; call [`AudioPipeline::finish`] once at end of stream.

use anyhow::{Context, Result, anyhow, bail};
use rubato::{Resampler, SincFixedIn, WindowFunction};
use symphonia::core::audio::{AudioBufferRef, SampleBuffer};

/// Source frames fed to rubato per `process()` call.
const RESAMPLE_CHUNK_FRAMES: usize = 2048;

pub struct AudioPipeline {
    target_rate: Option<u32>,
    source_rate: Option<u32>,

    // Scratch buffer for copying decoded PCM into interleaved f32.
    sample_buf: Option<SampleBuffer<f32>>,

    // Only built when the source rate differs from the target.
    resampler: Option<SincFixedIn<f32>>,

    // Mono source samples waiting for a full resampler block.
    pending: Vec<f32>,

    out: Vec<f32>,
    source_frames: u64,
}

impl AudioPipeline {
    /// `target_rate` of `None` keeps the source rate.
    pub fn new(target_rate: Option<u32>) -> Self {
        Self {
            target_rate,
            source_rate: None,
            sample_buf: None,
            resampler: None,
            pending: Vec::new(),
            out: Vec::new(),
            source_frames: 0,
        }
    }

    /// Frames received so far, counted at the source rate.
    pub fn source_frames(&self) -> u64 {
        self.source_frames
    }

    pub fn push(&mut self, decoded: &AudioBufferRef<'_>) -> Result<()> {
        let spec = *decoded.spec();
        let channels = spec.channels.count();
        if channels == 0 {
            bail!("decoded audio had zero channels");
        }
        match self.source_rate {
            Some(rate) if rate != spec.rate => {
                bail!("sample rate changed mid-stream ({rate} Hz to {} Hz)", spec.rate)
            }
            Some(_) => {}
            None => self.source_rate = Some(spec.rate),
        }

        let needed = decoded.capacity() * channels;
        if self.sample_buf.as_ref().is_none_or(|b| b.capacity() < needed) {
            self.sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        let buf = self
            .sample_buf
            .as_mut()
            .ok_or_else(|| anyhow!("sample buffer not initialized"))?;
        buf.copy_interleaved_ref(decoded.clone());

        let mono = downmix_to_mono(buf.samples(), channels);
        self.source_frames += mono.len() as u64;

        match self.target_rate {
            Some(target) if target != spec.rate => {
                self.ensure_resampler(spec.rate, target)?;
                self.pending.extend_from_slice(&mono);
                self.drain_full_blocks()
            }
            _ => {
                self.out.extend_from_slice(&mono);
                Ok(())
            }
        }
    }

    /// Flush the resampler and return mono samples with their rate.
    pub fn finish(mut self) -> Result<(Vec<f32>, u32)> {
        let source_rate = self
            .source_rate
            .ok_or_else(|| anyhow!("no audio was decoded"))?;

        let Some(rs) = self.resampler.as_ref() else {
            return Ok((self.out, source_rate));
        };
        let target = self.target_rate.unwrap_or(source_rate);
        let delay = rs.output_delay();
        let block = rs.input_frames_next();

        // Pad the tail to whole blocks, plus one extra block to push the
        // filter delay out.
        let rem = self.pending.len() % block;
        let padded = self.pending.len() + (block - rem) % block + block;
        self.pending.resize(padded, 0.0);
        self.drain_full_blocks()?;

        let expected =
            (self.source_frames as f64 * f64::from(target) / f64::from(source_rate)).round() as usize;
        let mut out = self.out;
        out.drain(..delay.min(out.len()));
        out.truncate(expected);
        Ok((out, target))
    }

    fn ensure_resampler(&mut self, source_rate: u32, target_rate: u32) -> Result<()> {
        if self.resampler.is_some() {
            return Ok(());
        }
        let rs = SincFixedIn::<f32>::new(
            f64::from(target_rate) / f64::from(source_rate),
            2.0,
            rubato::SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                interpolation: rubato::SincInterpolationType::Linear,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            },
            RESAMPLE_CHUNK_FRAMES,
            1,
        )
        .map_err(|e| anyhow!(e))
        .context("failed to init resampler")?;
        self.resampler = Some(rs);
        Ok(())
    }

    fn drain_full_blocks(&mut self) -> Result<()> {
        let rs = self
            .resampler
            .as_mut()
            .ok_or_else(|| anyhow!("resampler not initialized"))?;
        let block = rs.input_frames_next();
        while self.pending.len() >= block {
            let input = vec![self.pending.drain(..block).collect::<Vec<f32>>()];
            let mut output = rs
                .process(&input, None)
                .map_err(|e| anyhow!(e))
                .context("resampler process failed")?;
            let mono = output
                .pop()
                .ok_or_else(|| anyhow!("expected mono output from resampler"))?;
            self.out.extend_from_slice(&mono);
        }
        Ok(())
    }
}

/// Equal-weight average across channels.
fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
