use std::io::Cursor;

use tracing::warn;

use super::backend::{AudioFrame, CaptureError};
use super::level;

/// Chunk configuration
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Duration of each chunk in milliseconds (default: 1000)
    pub chunk_duration_ms: u64,
    /// Sample rate of incoming frames
    pub sample_rate: u32,
    /// Number of channels of incoming frames
    pub channels: u16,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_duration_ms: 1000,
            sample_rate: 16000,
            channels: 1,
        }
    }
}

/// One unit of captured audio handed to the transport.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Chunk number within the recording turn (0-indexed)
    pub sequence: u32,
    /// Interleaved 16-bit PCM
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Start time in milliseconds since the recording started
    pub start_ms: u64,
    /// End time in milliseconds since the recording started
    pub end_ms: u64,
    /// Root-mean-square amplitude, normalised to 0.0-1.0
    pub rms: f32,
    /// The turn's closing payload
    pub is_final: bool,
}

impl AudioChunk {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Size of the raw PCM payload in bytes
    pub fn byte_len(&self) -> usize {
        self.samples.len() * std::mem::size_of::<i16>()
    }

    /// Encode as an in-memory WAV file
    pub fn to_wav(&self) -> Result<Vec<u8>, CaptureError> {
        encode_wav(&self.samples, self.sample_rate, self.channels)
    }

    /// Join buffered chunks into the turn's final payload.
    pub fn concat(chunks: &[AudioChunk], sample_rate: u32, channels: u16) -> AudioChunk {
        let samples: Vec<i16> = chunks.iter().flat_map(|c| c.samples.iter().copied()).collect();
        let rms = level::rms(&samples);

        AudioChunk {
            sequence: chunks.last().map(|c| c.sequence + 1).unwrap_or(0),
            start_ms: chunks.first().map(|c| c.start_ms).unwrap_or(0),
            end_ms: chunks.last().map(|c| c.end_ms).unwrap_or(0),
            samples,
            sample_rate,
            channels,
            rms,
            is_final: true,
        }
    }
}

/// Groups incoming frames into chunks of roughly `chunk_duration_ms`.
pub struct ChunkAssembler {
    config: ChunkConfig,
    pending: Vec<i16>,
    pending_start_ms: Option<u64>,
    last_end_ms: u64,
    sequence: u32,
}

impl ChunkAssembler {
    pub fn new(config: ChunkConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
            pending_start_ms: None,
            last_end_ms: 0,
            sequence: 0,
        }
    }

    fn samples_per_chunk(&self) -> usize {
        let per_channel = self.config.sample_rate as u64 * self.config.chunk_duration_ms / 1000;
        per_channel as usize * self.config.channels.max(1) as usize
    }

    /// Add a frame, returning a completed chunk once enough audio has accumulated.
    ///
    /// Frames must already be in the configured format; anything else is
    /// dropped, since the chunk is labelled with the configured rate.
    pub fn push(&mut self, frame: &AudioFrame) -> Option<AudioChunk> {
        if frame.sample_rate != self.config.sample_rate || frame.channels != self.config.channels {
            warn!(
                "Dropping {}Hz/{}ch frame, chunks are {}Hz/{}ch",
                frame.sample_rate, frame.channels, self.config.sample_rate, self.config.channels
            );
            return None;
        }

        if self.pending_start_ms.is_none() {
            self.pending_start_ms = Some(frame.timestamp_ms);
        }

        self.pending.extend_from_slice(&frame.samples);
        self.last_end_ms = frame.timestamp_ms + frame.duration_ms();

        if self.pending.len() >= self.samples_per_chunk() {
            self.take_chunk()
        } else {
            None
        }
    }

    /// Emit whatever is buffered, if anything
    pub fn flush(&mut self) -> Option<AudioChunk> {
        if self.pending.is_empty() {
            return None;
        }
        self.take_chunk()
    }

    fn take_chunk(&mut self) -> Option<AudioChunk> {
        let samples = std::mem::take(&mut self.pending);
        let start_ms = self.pending_start_ms.take().unwrap_or(self.last_end_ms);
        let rms = level::rms(&samples);

        let chunk = AudioChunk {
            sequence: self.sequence,
            samples,
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            start_ms,
            end_ms: self.last_end_ms,
            rms,
            is_final: false,
        };

        self.sequence += 1;
        Some(chunk)
    }
}

/// Encode 16-bit PCM as a WAV file in memory
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>, CaptureError> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| CaptureError::Encode(e.to_string()))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| CaptureError::Encode(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| CaptureError::Encode(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
