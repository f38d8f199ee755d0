use std::path::Path;

use crate::backend::SegmentBackend;
use crate::decoder::{DecodedAudio, decode_file};
use crate::grid::GridParams;
use crate::records::SegmentMethod;
use crate::silence::{EnergyProfile, Span, detect_nonsilent};
use crate::wav::write_clip;
use crate::{Error, Result};

/// In-process backend: Symphonia decode, RMS silence detection, hound clips.
pub struct ReferenceBackend {
    clip_sample_rate: Option<u32>,
}

pub struct ReferenceAudio {
    audio: DecodedAudio,
    profile: EnergyProfile,
}

impl ReferenceBackend {
    /// `clip_sample_rate` of `None` keeps each recording's own rate.
    pub fn new(clip_sample_rate: Option<u32>) -> Self {
        Self { clip_sample_rate }
    }
}

impl SegmentBackend for ReferenceBackend {
    type Audio = ReferenceAudio;

    fn method(&self) -> SegmentMethod {
        SegmentMethod::Reference
    }

    fn load(&self, path: &Path) -> Result<ReferenceAudio> {
        let audio = decode_file(path, self.clip_sample_rate)
            .map_err(|e| Error::Decode(format!("{}: {e:#}", path.display())))?;
        let profile = EnergyProfile::new(&audio.samples, audio.sample_rate);
        Ok(ReferenceAudio { audio, profile })
    }

    fn duration_ms(&self, audio: &ReferenceAudio) -> u64 {
        audio.profile.len_ms()
    }

    fn detect(&self, audio: &ReferenceAudio, params: &GridParams) -> Result<Vec<Span>> {
        Ok(detect_nonsilent(
            &audio.profile,
            u64::from(params.min_silence_ms),
            params.threshold_db,
        ))
    }

    fn extract(&self, audio: &ReferenceAudio, span: Span, dest: &Path) -> Result<()> {
        let rate = u64::from(audio.audio.sample_rate);
        let len = audio.audio.samples.len();
        let start = ((span.start_ms * rate / 1000) as usize).min(len);
        let end = ((span.end_ms * rate / 1000) as usize).clamp(start, len);
        write_clip(dest, &audio.audio.samples[start..end], audio.audio.sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
    use tempfile::TempDir;

    /// 200 ms silence, 300 ms tone, 400 ms silence, 300 ms tone, 200 ms silence at 8 kHz.
    fn two_words(path: &Path) -> anyhow::Result<()> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut w = WavWriter::create(path, spec)?;
        for (loud, ms) in [(false, 200), (true, 300), (false, 400), (true, 300), (false, 200)] {
            for i in 0..ms * 8 {
                let v = if loud {
                    ((i as f32 * 0.2).sin() * 12_000.0) as i16
                } else {
                    0
                };
                w.write_sample(v)?;
            }
        }
        w.finalize()?;
        Ok(())
    }

    #[test]
    fn detects_and_extracts_words() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let src = dir.path().join("rec.wav");
        two_words(&src)?;

        let backend = ReferenceBackend::new(None);
        let audio = backend.load(&src)?;
        assert_eq!(backend.duration_ms(&audio), 1_400);

        let spans = backend.detect(
            &audio,
            &GridParams {
                threshold_db: -40.0,
                min_silence_ms: 150,
            },
        )?;
        assert_eq!(spans, vec![Span::new(200, 500), Span::new(900, 1_200)]);

        let clip = dir.path().join("out").join("w1.wav");
        backend.extract(&audio, spans[0], &clip)?;
        let reader = WavReader::open(&clip)?;
        assert_eq!(reader.spec().sample_rate, 8_000);
        assert_eq!(reader.duration(), 300 * 8);
        Ok(())
    }

    #[test]
    fn clips_can_be_resampled() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let src = dir.path().join("rec.wav");
        two_words(&src)?;

        let backend = ReferenceBackend::new(Some(16_000));
        let audio = backend.load(&src)?;
        let clip = dir.path().join("w.wav");
        backend.extract(&audio, Span::new(0, 100), &clip)?;
        let reader = WavReader::open(&clip)?;
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.duration(), 1_600);
        Ok(())
    }

    #[test]
    fn undecodable_file_is_a_decode_error() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let src = dir.path().join("bad.wav");
        std::fs::write(&src, b"not audio")?;
        let err = ReferenceBackend::new(None).load(&src).err().unwrap();
        assert!(matches!(err, Error::Decode(_)));
        Ok(())
    }
}
