//! Energy-based silence detection.
//!
//! Detection works in whole milliseconds, the way pydub's `detect_nonsilent`
//! does: a window of `min_silence_ms` starting at every millisecond is
//! silent when its RMS is at or below the threshold, overlapping silent
//! windows merge into silent ranges, and the gaps between them are the
//! non-silent spans. [`EnergyProfile`] holds per-millisecond prefix sums of
//! squared samples so every window's RMS is O(1) and one profile serves the
//! whole parameter grid.

/// A half-open `[start_ms, end_ms)` range of audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start_ms: u64,
    pub end_ms: u64,
}

impl Span {
    pub fn new(start_ms: u64, end_ms: u64) -> Self {
        Self { start_ms, end_ms }
    }

    pub fn len_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    /// Widen by `pad_ms` on both sides, clamped to `[0, duration_ms]`.
    pub fn padded(self, pad_ms: u64, duration_ms: u64) -> Self {
        Self {
            start_ms: self.start_ms.saturating_sub(pad_ms),
            end_ms: (self.end_ms + pad_ms).min(duration_ms),
        }
    }
}

pub struct EnergyProfile {
    sample_rate: u32,
    len_ms: u64,
    /// `energy[i]`: sum of squared samples before millisecond `i`.
    energy: Vec<f64>,
}

impl EnergyProfile {
    pub fn new(samples: &[f32], sample_rate: u32) -> Self {
        let rate = u64::from(sample_rate.max(1));
        let len_ms = (samples.len() as u64 * 1000 + rate / 2) / rate;

        let mut energy = Vec::with_capacity(len_ms as usize + 1);
        let mut acc = 0.0f64;
        let mut consumed = 0usize;
        energy.push(0.0);
        for ms in 1..=len_ms {
            let upto = frame_at(ms, rate).min(samples.len());
            for &s in &samples[consumed..upto] {
                acc += f64::from(s) * f64::from(s);
            }
            consumed = upto;
            energy.push(acc);
        }

        Self {
            sample_rate,
            len_ms,
            energy,
        }
    }

    pub fn len_ms(&self) -> u64 {
        self.len_ms
    }

    /// RMS of `[start_ms, end_ms)`, in full-scale units.
    fn rms(&self, start_ms: u64, end_ms: u64) -> f64 {
        let rate = u64::from(self.sample_rate.max(1));
        let frames = frame_at(end_ms, rate).saturating_sub(frame_at(start_ms, rate));
        if frames == 0 {
            return 0.0;
        }
        let sum = self.energy[end_ms as usize] - self.energy[start_ms as usize];
        (sum.max(0.0) / frames as f64).sqrt()
    }
}

fn frame_at(ms: u64, rate: u64) -> usize {
    (ms * rate / 1000) as usize
}

/// Convert dBFS to a linear full-scale amplitude.
pub fn db_to_amplitude(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// Silent ranges of at least `min_silence_ms` with RMS at or below `threshold_db`.
pub fn detect_silence(profile: &EnergyProfile, min_silence_ms: u64, threshold_db: f64) -> Vec<Span> {
    let len = profile.len_ms;
    if min_silence_ms == 0 || len < min_silence_ms {
        return Vec::new();
    }
    let threshold = db_to_amplitude(threshold_db);

    let mut ranges: Vec<Span> = Vec::new();
    let mut current: Option<(u64, u64)> = None;
    for start in 0..=(len - min_silence_ms) {
        if profile.rms(start, start + min_silence_ms) > threshold {
            continue;
        }
        current = Some(match current {
            Some((range_start, prev)) if start == prev + 1 || start <= prev + min_silence_ms => {
                (range_start, start)
            }
            Some((range_start, prev)) => {
                ranges.push(Span::new(range_start, prev + min_silence_ms));
                (start, start)
            }
            None => (start, start),
        });
    }
    if let Some((range_start, prev)) = current {
        ranges.push(Span::new(range_start, prev + min_silence_ms));
    }
    ranges
}

/// Non-silent spans between the silent ranges found by [`detect_silence`].
pub fn detect_nonsilent(profile: &EnergyProfile, min_silence_ms: u64, threshold_db: f64) -> Vec<Span> {
    let len = profile.len_ms;
    let silent = detect_silence(profile, min_silence_ms, threshold_db);
    if silent.is_empty() {
        return vec![Span::new(0, len)];
    }
    if silent[0].start_ms == 0 && silent[0].end_ms == len {
        return Vec::new();
    }

    let mut spans = Vec::with_capacity(silent.len() + 1);
    let mut prev_end = 0;
    for s in &silent {
        spans.push(Span::new(prev_end, s.start_ms));
        prev_end = s.end_ms;
    }
    if prev_end != len {
        spans.push(Span::new(prev_end, len));
    }
    if spans.first() == Some(&Span::new(0, 0)) {
        spans.remove(0);
    }
    spans
}
