//! Microphone capture for a single recording turn
//!
//! The pipeline owns the capture device for the duration of one recording:
//! it acquires a backend, groups frames into ~1s chunks, drops near-silent
//! preview chunks, and releases the device when told to stop. Everything it
//! learns is reported as a `CaptureEvent` tagged with the turn it belongs to.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{BackendProvider, CaptureError};
use super::chunk::{AudioChunk, ChunkAssembler, ChunkConfig};
use super::level::SilenceGate;

#[derive(Debug)]
pub enum CaptureEvent {
    /// Device acquisition finished for `turn`
    Acquired {
        turn: u64,
        result: Result<(), CaptureError>,
    },
    /// A chunk that passed the silence gate, in capture order
    Chunk { turn: u64, chunk: AudioChunk },
    /// The device has been released and the tail of the recording flushed
    Finished { turn: u64 },
}

struct ActiveCapture {
    turn: u64,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

pub struct AudioCapturePipeline {
    provider: Arc<dyn BackendProvider>,
    chunk_config: ChunkConfig,
    gate: SilenceGate,
    events: mpsc::UnboundedSender<CaptureEvent>,
    active: Option<ActiveCapture>,
    next_turn: u64,
}

impl AudioCapturePipeline {
    pub fn new(
        provider: Arc<dyn BackendProvider>,
        chunk_config: ChunkConfig,
        gate: SilenceGate,
    ) -> (Self, mpsc::UnboundedReceiver<CaptureEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                provider,
                chunk_config,
                gate,
                events,
                active: None,
                next_turn: 0,
            },
            rx,
        )
    }

    /// Acquire the device and start recording a new turn.
    ///
    /// Fails with `AlreadyRecording` while a previous turn still holds the device.
    pub fn start(&mut self) -> Result<u64, CaptureError> {
        if self.active.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }

        self.next_turn += 1;
        let turn = self.next_turn;
        let (stop_tx, stop_rx) = oneshot::channel();

        let task = tokio::spawn(run_capture(
            turn,
            Arc::clone(&self.provider),
            self.chunk_config.clone(),
            self.gate,
            self.events.clone(),
            stop_rx,
        ));

        info!("Capture turn {} starting", turn);
        self.active = Some(ActiveCapture {
            turn,
            stop: Some(stop_tx),
            task,
        });
        Ok(turn)
    }

    /// Ask the active turn to flush and release the device.
    ///
    /// The turn stays active until its `Finished` event is acknowledged with
    /// [`finish`](Self::finish). Returns the turn being stopped.
    pub fn stop(&mut self) -> Option<u64> {
        let active = self.active.as_mut()?;
        if let Some(stop) = active.stop.take() {
            debug!("Stopping capture turn {}", active.turn);
            let _ = stop.send(());
        }
        Some(active.turn)
    }

    /// Stop and forget the active turn; its remaining events will not match.
    ///
    /// Safe to call any number of times.
    pub fn release(&mut self) {
        if let Some(mut active) = self.active.take() {
            info!("Releasing capture turn {}", active.turn);
            if let Some(stop) = active.stop.take() {
                let _ = stop.send(());
            }
            // the task releases the device on its own once signalled
            drop(active.task);
        }
    }

    /// Acknowledge a `Finished` event; true if it closed the active turn.
    pub fn finish(&mut self, turn: u64) -> bool {
        match &self.active {
            Some(active) if active.turn == turn => {
                self.active = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_turn(&self) -> Option<u64> {
        self.active.as_ref().map(|a| a.turn)
    }

    pub fn is_current(&self, turn: u64) -> bool {
        self.active_turn() == Some(turn)
    }

    pub fn chunk_config(&self) -> &ChunkConfig {
        &self.chunk_config
    }
}

impl Drop for AudioCapturePipeline {
    fn drop(&mut self) {
        self.release();
    }
}

async fn run_capture(
    turn: u64,
    provider: Arc<dyn BackendProvider>,
    chunk_config: ChunkConfig,
    gate: SilenceGate,
    events: mpsc::UnboundedSender<CaptureEvent>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut backend = match provider.open() {
        Ok(backend) => backend,
        Err(e) => {
            warn!("Capture turn {}: failed to open device: {}", turn, e);
            let _ = events.send(CaptureEvent::Acquired { turn, result: Err(e) });
            return;
        }
    };

    let mut frames = tokio::select! {
        started = backend.start() => match started {
            Ok(rx) => rx,
            Err(e) => {
                warn!("Capture turn {}: {} backend refused to start: {}", turn, backend.name(), e);
                let _ = backend.stop().await;
                let _ = events.send(CaptureEvent::Acquired { turn, result: Err(e) });
                return;
            }
        },
        _ = &mut stop_rx => {
            let _ = backend.stop().await;
            let _ = events.send(CaptureEvent::Finished { turn });
            return;
        }
    };

    info!("Capture turn {}: recording from {}", turn, backend.name());
    let _ = events.send(CaptureEvent::Acquired { turn, result: Ok(()) });

    let mut assembler = ChunkAssembler::new(chunk_config);
    let forward = |chunk: AudioChunk| {
        if gate.admits(&chunk) {
            let _ = events.send(CaptureEvent::Chunk { turn, chunk });
        } else {
            debug!(
                "Dropping silent chunk {} (rms {:.4} < {})",
                chunk.sequence,
                chunk.rms,
                gate.threshold()
            );
        }
    };

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            frame = frames.recv() => match frame {
                Some(frame) => {
                    if let Some(chunk) = assembler.push(&frame) {
                        forward(chunk);
                    }
                }
                None => {
                    warn!("Capture turn {}: device stream ended", turn);
                    break;
                }
            },
        }
    }

    if let Some(chunk) = assembler.flush() {
        forward(chunk);
    }

    if let Err(e) = backend.stop().await {
        warn!("Capture turn {}: failed to release device: {}", turn, e);
    }

    info!("Capture turn {} released", turn);
    let _ = events.send(CaptureEvent::Finished { turn });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::{AudioBackend, AudioFrame};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Emits one 100ms frame per tick at the given amplitude pattern, then holds.
    struct ScriptedBackend {
        levels: Vec<i16>,
        stops: Arc<AtomicUsize>,
        task: Option<JoinHandle<()>>,
    }

    #[async_trait::async_trait]
    impl AudioBackend for ScriptedBackend {
        async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
            let (tx, rx) = mpsc::channel(64);
            let levels = self.levels.clone();
            self.task = Some(tokio::spawn(async move {
                for (i, level) in levels.into_iter().enumerate() {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    let frame = AudioFrame {
                        samples: vec![level; 1600],
                        sample_rate: 16000,
                        channels: 1,
                        timestamp_ms: i as u64 * 100,
                    };
                    if tx.send(frame).await.is_err() {
                        return;
                    }
                }
                std::future::pending::<()>().await;
            }));
            Ok(rx)
        }

        async fn stop(&mut self) -> Result<(), CaptureError> {
            if let Some(task) = self.task.take() {
                task.abort();
                self.stops.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }

        fn is_capturing(&self) -> bool {
            self.task.is_some()
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct ScriptedProvider {
        levels: Vec<i16>,
        stops: Arc<AtomicUsize>,
        fail: bool,
    }

    impl BackendProvider for ScriptedProvider {
        fn open(&self) -> Result<Box<dyn AudioBackend>, CaptureError> {
            if self.fail {
                return Err(CaptureError::PermissionDenied("denied".into()));
            }
            Ok(Box::new(ScriptedBackend {
                levels: self.levels.clone(),
                stops: Arc::clone(&self.stops),
                task: None,
            }))
        }
    }

    fn chunk_config() -> ChunkConfig {
        ChunkConfig {
            chunk_duration_ms: 100,
            ..ChunkConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_previews_never_leave_the_pipeline() {
        // 0.02, 0.002, 0.002, 0.05 of full scale
        let levels = vec![655, 66, 66, 1638];
        let stops = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(ScriptedProvider {
            levels,
            stops: Arc::clone(&stops),
            fail: false,
        });
        let (mut capture, mut rx) = AudioCapturePipeline::new(provider, chunk_config(), SilenceGate::default());

        let turn = capture.start().unwrap();
        assert!(matches!(rx.recv().await, Some(CaptureEvent::Acquired { result: Ok(()), .. })));

        let mut sequences = Vec::new();
        while sequences.len() < 2 {
            match rx.recv().await.unwrap() {
                CaptureEvent::Chunk { chunk, .. } => sequences.push(chunk.sequence),
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(sequences, vec![0, 3]);

        assert_eq!(capture.stop(), Some(turn));
        assert!(matches!(rx.recv().await, Some(CaptureEvent::Finished { turn: t }) if t == turn));
        assert!(capture.finish(turn));
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_recording_at_a_time() {
        let provider = Arc::new(ScriptedProvider {
            levels: vec![],
            stops: Arc::new(AtomicUsize::new(0)),
            fail: false,
        });
        let (mut capture, _rx) = AudioCapturePipeline::new(provider, chunk_config(), SilenceGate::default());

        capture.start().unwrap();
        assert!(matches!(capture.start(), Err(CaptureError::AlreadyRecording)));

        capture.release();
        capture.release();
        assert!(!capture.is_active());
        assert!(capture.start().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquisition_failure_is_reported() {
        let provider = Arc::new(ScriptedProvider {
            levels: vec![],
            stops: Arc::new(AtomicUsize::new(0)),
            fail: true,
        });
        let (mut capture, mut rx) = AudioCapturePipeline::new(provider, chunk_config(), SilenceGate::default());

        let turn = capture.start().unwrap();
        match rx.recv().await.unwrap() {
            CaptureEvent::Acquired { turn: t, result } => {
                assert_eq!(t, turn);
                assert!(matches!(result, Err(CaptureError::PermissionDenied(_))));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_frees_the_device() {
        let stops = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(ScriptedProvider {
            levels: vec![1000; 3],
            stops: Arc::clone(&stops),
            fail: false,
        });
        let (mut capture, mut rx) = AudioCapturePipeline::new(provider, chunk_config(), SilenceGate::default());

        let turn = capture.start().unwrap();
        assert!(matches!(rx.recv().await, Some(CaptureEvent::Acquired { .. })));
        capture.release();

        loop {
            if let CaptureEvent::Finished { turn: t } = rx.recv().await.unwrap() {
                assert_eq!(t, turn);
                break;
            }
        }
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(!capture.finish(turn));
    }
}
