//! Amplitude measurement and the near-silence gate applied before transmission.

use super::chunk::AudioChunk;

/// Chunks quieter than this (RMS, 0.0-1.0) are treated as silence.
pub const DEFAULT_SILENCE_RMS_THRESHOLD: f32 = 0.01;

/// Root-mean-square amplitude of 16-bit PCM, normalised to 0.0-1.0
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_sq: f64 = samples
        .iter()
        .map(|&s| {
            let v = s as f64 / 32768.0;
            v * v
        })
        .sum();

    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// Decides which captured chunks may leave the machine.
#[derive(Debug, Clone, Copy)]
pub struct SilenceGate {
    threshold: f32,
}

impl Default for SilenceGate {
    fn default() -> Self {
        Self::new(DEFAULT_SILENCE_RMS_THRESHOLD)
    }
}

impl SilenceGate {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold: threshold.max(0.0),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Final chunks always pass; preview chunks pass only above the threshold.
    pub fn admits(&self, chunk: &AudioChunk) -> bool {
        chunk.is_final || chunk.rms >= self.threshold
    }
}
