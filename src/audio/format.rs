//! Frame format conversion using the rubato resampler
//!
//! Capture devices deliver whatever their default configuration is (44.1kHz
//! stereo is common); chunks are built at the configured rate and channel
//! count. The converter keeps resampler state across frames, so one instance
//! belongs to one capture stream.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::backend::{AudioFrame, CaptureError};

/// Input frames fed to the resampler per call
const RESAMPLE_CHUNK_FRAMES: usize = 1024;

pub struct FrameConverter {
    source_channels: u16,
    target_rate: u32,
    target_channels: u16,
    resampler: Option<SincFixedIn<f32>>,
    /// Planar input waiting for a full resampler chunk
    pending: Vec<Vec<f32>>,
    /// Output frames emitted so far, per channel
    emitted: u64,
}

impl FrameConverter {
    pub fn new(
        source_rate: u32,
        source_channels: u16,
        target_rate: u32,
        target_channels: u16,
    ) -> Result<Self, CaptureError> {
        if source_rate == 0 || target_rate == 0 {
            return Err(CaptureError::Resample(format!(
                "invalid sample rates {}Hz -> {}Hz",
                source_rate, target_rate
            )));
        }
        if target_channels != 1 && target_channels != source_channels {
            return Err(CaptureError::Resample(format!(
                "cannot map {} channels to {}",
                source_channels, target_channels
            )));
        }

        let resampler = if source_rate == target_rate {
            None
        } else {
            let params = SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            };
            let resampler = SincFixedIn::<f32>::new(
                target_rate as f64 / source_rate as f64,
                2.0,
                params,
                RESAMPLE_CHUNK_FRAMES,
                target_channels as usize,
            )
            .map_err(|e| CaptureError::Resample(e.to_string()))?;
            Some(resampler)
        };

        Ok(Self {
            source_channels: source_channels.max(1),
            target_rate,
            target_channels,
            resampler,
            pending: vec![Vec::new(); target_channels as usize],
            emitted: 0,
        })
    }

    /// Whether frames pass through without resampling
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none() && self.source_channels == self.target_channels
    }

    /// Convert one device frame. Returns `None` while the resampler is still
    /// collecting input for its next chunk.
    pub fn convert(&mut self, frame: AudioFrame) -> Result<Option<AudioFrame>, CaptureError> {
        if self.is_passthrough() {
            self.emitted += (frame.samples.len() / self.target_channels as usize) as u64;
            return Ok(Some(AudioFrame {
                sample_rate: self.target_rate,
                ..frame
            }));
        }

        let planes = self.to_planes(&frame.samples);

        let Some(resampler) = self.resampler.as_mut() else {
            let frames = planes.first().map(Vec::len).unwrap_or(0);
            self.emitted += frames as u64;
            return Ok(Some(AudioFrame {
                samples: interleave(&planes),
                sample_rate: self.target_rate,
                channels: self.target_channels,
                timestamp_ms: frame.timestamp_ms,
            }));
        };

        for (pending, plane) in self.pending.iter_mut().zip(planes) {
            pending.extend(plane);
        }

        let timestamp_ms = self.emitted * 1000 / self.target_rate as u64;
        let mut output: Vec<Vec<f32>> = vec![Vec::new(); self.target_channels as usize];
        loop {
            let needed = resampler.input_frames_next();
            if self.pending[0].len() < needed {
                break;
            }
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|plane| plane.drain(..needed).collect())
                .collect();
            let resampled = resampler
                .process(&chunk, None)
                .map_err(|e| CaptureError::Resample(e.to_string()))?;
            for (out, plane) in output.iter_mut().zip(resampled) {
                out.extend(plane);
            }
        }

        if output[0].is_empty() {
            return Ok(None);
        }

        self.emitted += output[0].len() as u64;
        Ok(Some(AudioFrame {
            samples: interleave(&output),
            sample_rate: self.target_rate,
            channels: self.target_channels,
            timestamp_ms,
        }))
    }

    /// Split interleaved i16 into planar f32, folding to mono when asked
    fn to_planes(&self, samples: &[i16]) -> Vec<Vec<f32>> {
        let channels = self.source_channels as usize;
        if self.target_channels == 1 {
            let mono = samples
                .chunks_exact(channels)
                .map(|group| group.iter().map(|&s| i16_to_f32(s)).sum::<f32>() / channels as f32)
                .collect();
            return vec![mono];
        }

        let mut planes = vec![Vec::with_capacity(samples.len() / channels); channels];
        for group in samples.chunks_exact(channels) {
            for (plane, &sample) in planes.iter_mut().zip(group) {
                plane.push(i16_to_f32(sample));
            }
        }
        planes
    }
}

fn interleave(planes: &[Vec<f32>]) -> Vec<i16> {
    let frames = planes.first().map(Vec::len).unwrap_or(0);
    let mut samples = Vec::with_capacity(frames * planes.len());
    for i in 0..frames {
        for plane in planes {
            samples.push(f32_to_i16(plane[i]));
        }
    }
    samples
}

pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}
