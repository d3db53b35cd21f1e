//! Microphone capture through cpal
//!
//! cpal streams are not `Send` on every platform, so the stream lives on a
//! dedicated thread for as long as the device is held. Frames cross back to
//! async code through a bounded channel; when the channel is full the frame
//! is dropped rather than blocking the audio callback.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use super::backend::{AudioBackend, AudioFrame, CaptureConstraints, CaptureError};
use super::format::FrameConverter;

/// Fragments of OS error text that mean the user (or a privacy policy)
/// refused microphone access
const PERMISSION_MARKERS: &[&str] = &[
    "permission",
    "denied",
    "not authorized",
    "not permitted",
    "unauthorized",
];

/// Map a device error to what the user can do about it
fn classify_device_error(message: String) -> CaptureError {
    let lower = message.to_lowercase();
    if PERMISSION_MARKERS.iter().any(|marker| lower.contains(marker)) {
        CaptureError::PermissionDenied(message)
    } else {
        CaptureError::DeviceUnavailable(message)
    }
}

/// Turns callback buffers into conformed frames on the capture channel
struct FrameSink {
    frame_tx: mpsc::Sender<AudioFrame>,
    converter: FrameConverter,
    source_rate: u32,
    source_channels: u16,
    emitted: u64,
}

impl FrameSink {
    fn push(&mut self, samples: Vec<i16>) {
        let frames_before = self.emitted;
        self.emitted += (samples.len() / self.source_channels.max(1) as usize) as u64;

        let frame = AudioFrame {
            samples,
            sample_rate: self.source_rate,
            channels: self.source_channels,
            timestamp_ms: frames_before * 1000 / self.source_rate.max(1) as u64,
        };
        match self.converter.convert(frame) {
            Ok(Some(frame)) => {
                if self.frame_tx.try_send(frame).is_err() {
                    warn!("Capture channel full, dropping frame");
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Dropping input buffer: {}", e),
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut sink: FrameSink,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let samples: Vec<i16> = data.iter().map(|&s| i16::from_sample(s)).collect();
            sink.push(samples);
        },
        |err| {
            warn!("Audio input stream error: {}", err);
        },
        None,
    )
}

pub struct MicrophoneBackend {
    constraints: CaptureConstraints,
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl MicrophoneBackend {
    pub fn new(constraints: CaptureConstraints) -> Self {
        Self {
            constraints,
            stop_tx: None,
            thread: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    #[allow(deprecated)] // cpal 0.17 deprecates name() but description() is not yet stable
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.thread.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }

        if self.constraints.noise_suppression
            || self.constraints.echo_cancellation
            || self.constraints.auto_gain_control
        {
            info!("Input processing (noise suppression, echo cancellation, AGC) is left to the OS audio stack");
        }

        let (frame_tx, frame_rx) = mpsc::channel(64);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), CaptureError>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let constraints = self.constraints.clone();

        let thread = std::thread::spawn(move || {
            let host = cpal::default_host();
            let device = match host.default_input_device() {
                Some(device) => device,
                None => {
                    let _ = ready_tx.send(Err(CaptureError::DeviceUnavailable(
                        "no default input device".to_string(),
                    )));
                    return;
                }
            };

            let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            let supported = match device.default_input_config() {
                Ok(config) => config,
                Err(e) => {
                    let _ = ready_tx.send(Err(classify_device_error(e.to_string())));
                    return;
                }
            };

            let source_rate = supported.sample_rate();
            let source_channels = supported.channels();
            let sample_format = supported.sample_format();
            info!(
                "Opening input device '{}': {}Hz, {} channels, format={:?}",
                device_name, source_rate, source_channels, sample_format
            );

            let converter = match FrameConverter::new(
                source_rate,
                source_channels,
                constraints.sample_rate,
                constraints.channels,
            ) {
                Ok(converter) => converter,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let sink = FrameSink {
                frame_tx,
                converter,
                source_rate,
                source_channels,
                emitted: 0,
            };

            let config: cpal::StreamConfig = supported.into();
            let stream = match sample_format {
                SampleFormat::F32 => build_stream::<f32>(&device, &config, sink),
                SampleFormat::I16 => build_stream::<i16>(&device, &config, sink),
                SampleFormat::U16 => build_stream::<u16>(&device, &config, sink),
                SampleFormat::I32 => build_stream::<i32>(&device, &config, sink),
                other => {
                    let _ = ready_tx.send(Err(CaptureError::DeviceUnavailable(format!(
                        "unsupported sample format {:?}",
                        other
                    ))));
                    return;
                }
            };

            let stream = match stream {
                Ok(stream) => stream,
                Err(cpal::BuildStreamError::DeviceNotAvailable) => {
                    let _ = ready_tx.send(Err(CaptureError::DeviceUnavailable(device_name)));
                    return;
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(classify_device_error(e.to_string())));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(classify_device_error(e.to_string())));
                return;
            }

            let _ = ready_tx.send(Ok(()));

            // Hold the stream until asked to stop (or the backend is dropped)
            let _ = stop_rx.recv();
            drop(stream);
            info!("Input device '{}' released", device_name);
        });

        match ready_rx.await {
            Ok(Ok(())) => {
                self.stop_tx = Some(stop_tx);
                self.thread = Some(thread);
                Ok(frame_rx)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CaptureError::DeviceUnavailable(
                "capture thread exited during start".to_string(),
            )),
        }
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            tokio::task::spawn_blocking(move || {
                if thread.join().is_err() {
                    warn!("Capture thread panicked");
                }
            })
            .await
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.thread.is_some()
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

impl Drop for MicrophoneBackend {
    fn drop(&mut self) {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
    }
}
