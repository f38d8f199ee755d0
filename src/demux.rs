//! Container probing and packet iteration over Symphonia.

use anyhow::{Context, Result, anyhow};
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet, Track};
use symphonia::core::io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Probe `source` and pick its first decodable audio track.
///
/// A track qualifies when it has a real codec and a known sample rate.
/// `extension` (e.g. "wav") helps the probe on ambiguous input.
pub fn probe_default_track(
    source: Box<dyn MediaSource>,
    extension: Option<&str>,
) -> Result<(Box<dyn FormatReader>, Track)> {
    let mss = MediaSourceStream::new(
        source,
        MediaSourceStreamOptions {
            // Must be a power of two above 32 KiB.
            buffer_len: 256 * 1024,
        },
    );

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| anyhow!(e))
        .context("unrecognised audio container")?;

    let format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
        .cloned()
        .ok_or_else(|| anyhow!("no audio track found"))?;

    Ok((format, track))
}

/// Next packet, or `None` at end of stream.
///
/// Symphonia reports the end of a stream as an unexpected-EOF I/O error;
/// any other I/O error is a real read failure.
pub fn next_packet(format: &mut Box<dyn FormatReader>) -> Result<Option<Packet>> {
    match format.next_packet() {
        Ok(p) => Ok(Some(p)),
        Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Ok(None)
        }
        Err(e) => Err(anyhow!(e)).context("failed reading packet"),
    }
}
