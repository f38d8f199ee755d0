use std::fs;
use std::io::BufWriter;
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use tempfile::NamedTempFile;

use crate::{Error, Result};

/// Write mono `f32` samples as a 16-bit PCM WAV clip.
///
/// The clip is written to a temporary file next to `dest` and renamed into
/// place, so a reader never sees a half-written clip.
pub fn write_clip(dest: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let dir = dest
        .parent()
        .ok_or_else(|| Error::msg(format!("clip path has no parent: {}", dest.display())))?;
    fs::create_dir_all(dir)?;

    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = WavWriter::new(BufWriter::new(tmp.as_file_mut()), spec)?;
        for &s in samples {
            writer.write_sample(to_i16(s))?;
        }
        writer.finalize()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(dest)?;
    Ok(())
}

/// Inverse of the decoder's `i16 / 32768` normalization.
fn to_i16(sample: f32) -> i16 {
    (sample * 32_768.0).round().clamp(-32_768.0, 32_767.0) as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavReader;
    use tempfile::TempDir;

    #[test]
    fn clip_round_trips_pcm_values() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let dest = dir.path().join("nested").join("clip.wav");
        let samples = [0.0, 0.5, -0.5, 1.0, -1.0, 2.0];

        write_clip(&dest, &samples, 16_000)?;

        let mut reader = WavReader::open(&dest)?;
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.spec().channels, 1);
        let read: Vec<i16> = reader.samples::<i16>().collect::<std::result::Result<_, _>>()?;
        assert_eq!(read, vec![0, 16_384, -16_384, 32_767, -32_768, 32_767]);
        Ok(())
    }

    #[test]
    fn no_temp_files_are_left_behind() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        write_clip(&dir.path().join("a.wav"), &[0.1; 10], 8_000)?;
        let names: Vec<_> = fs::read_dir(dir.path())?
            .map(|e| e.map(|e| e.file_name()))
            .collect::<std::result::Result<_, _>>()?;
        assert_eq!(names, vec![std::ffi::OsString::from("a.wav")]);
        Ok(())
    }
}
