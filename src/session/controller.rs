//! The session actor
//!
//! One task owns everything that can change a session: the conversation
//! state, the capture pipeline, the playback controller and the transport
//! channel. User commands, transport events, completions of spawned work and
//! timers all arrive through `select!` and are handled one at a time, so no
//! two inputs ever race on the same state. Observers only see the
//! `SessionView` published after each input.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use super::config::SessionTimings;
use super::handle::{Command, SessionHandle};
use super::policy::{Advisory, AdvisoryKind, ErrorPolicy, SessionFailure, Severity};
use super::progress::ProgressTracker;
use super::state::{ConversationState, Turn};
use super::timeline::{Speaker, Timeline};
use super::view::SessionView;
use crate::audio::{
    AudioCapturePipeline, AudioChunk, AudioSink, BackendProvider, CaptureError, CaptureEvent,
    ChunkConfig, Endpointer, PlaybackController, PlaybackFinished, SilenceGate, StopReason,
    DEFAULT_SILENCE_RMS_THRESHOLD,
};
use crate::bootstrap::{Analysis, BackendError, CreatedSession, InterviewConfig, SessionBootstrapper};
use crate::transport::{
    AiResponse, AudioPayload, InboundEvent, InterviewSnapshot, ServerEvent, Transcription,
    Transport, TransportChannel, TransportError,
};

const PREPARING_MESSAGE: &str = "Preparing your interviewer…";
const CONNECTING_MESSAGE: &str = "Connecting to your interviewer…";
const CONNECTED_MESSAGE: &str = "Connected. Finalizing setup…";
const READY_MESSAGE: &str = "Your interviewer is ready.";
const RECONNECTING_MESSAGE: &str = "Disconnected. Attempting to reconnect…";
const ENDED_MESSAGE: &str = "Session ended";
const CONNECTION_LOST_MESSAGE: &str = "Connection lost. Please try restarting the interview.";

/// External collaborators of a session
#[derive(Clone)]
pub struct SessionServices {
    pub bootstrapper: Arc<SessionBootstrapper>,
    pub transport: Arc<dyn Transport>,
    pub capture: Arc<dyn BackendProvider>,
    pub sink: Arc<dyn AudioSink>,
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub timings: SessionTimings,
    pub chunk: ChunkConfig,
    pub silence_threshold: f32,
    pub policy: ErrorPolicy,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            timings: SessionTimings::default(),
            chunk: ChunkConfig::default(),
            silence_threshold: DEFAULT_SILENCE_RMS_THRESHOLD,
            policy: ErrorPolicy::default(),
        }
    }
}

/// Results of work the actor spawned, tagged so stale ones can be dropped
enum TaskResult {
    Bootstrapped {
        attempt: u64,
        result: Result<CreatedSession, BackendError>,
    },
    Connected {
        attempt: u64,
        result: Result<TransportChannel, TransportError>,
    },
    FinalSent {
        turn: u64,
        result: Result<(), TransportError>,
    },
    Analysis {
        attempt: u64,
        result: Result<Analysis, BackendError>,
    },
}

/// The candidate's answer currently being captured
struct Recording {
    turn: u64,
    /// Set once the device is delivering audio
    endpointer: Option<Endpointer>,
    /// Last interim with words that arrived before the device was ready
    early_speech: Option<Instant>,
    /// Chunks that passed the silence gate, in capture order
    chunks: Vec<AudioChunk>,
    stop_reason: Option<StopReason>,
}

#[derive(Debug, Default)]
struct Timers {
    /// Mic opens when this fires
    settle: Option<Instant>,
    /// Next endpointing evaluation
    poll: Option<Instant>,
    /// Pending silence stop
    debounce: Option<Instant>,
    /// Give up waiting on the server
    watchdog: Option<Instant>,
    /// Stop holding a response for its transcription
    grace: Option<Instant>,
}

pub struct SessionController {
    services: SessionServices,
    timings: SessionTimings,
    policy: ErrorPolicy,

    state: ConversationState,
    published_state: ConversationState,

    /// Bumped on every configure and teardown; results from older attempts are ignored
    attempt: u64,
    config: Option<InterviewConfig>,
    session_id: Option<String>,
    channel: Option<TransportChannel>,

    capture: AudioCapturePipeline,
    capture_rx: mpsc::UnboundedReceiver<CaptureEvent>,
    playback: PlaybackController,
    playback_rx: mpsc::UnboundedReceiver<PlaybackFinished>,
    tasks_tx: mpsc::UnboundedSender<TaskResult>,
    tasks_rx: mpsc::UnboundedReceiver<TaskResult>,

    recording: Option<Recording>,
    /// Turn whose final chunk is with the server
    processing_turn: Option<u64>,
    /// Final chunk sent, final transcription not seen yet
    awaiting_transcript: bool,
    /// Responses not played yet, oldest first. They queue behind a pending
    /// final transcription or the response currently being spoken.
    response_queue: VecDeque<AiResponse>,
    /// The response being played ends the interview
    closing: bool,
    timers: Timers,

    started: bool,
    manually_muted: bool,
    progress: ProgressTracker,
    timeline: Timeline,
    live_transcript: String,
    advisory: Option<Advisory>,
    failure: Option<SessionFailure>,
    connection_message: Option<&'static str>,
    analysis: Option<Analysis>,
    analysis_requested: bool,

    view: watch::Sender<SessionView>,
}

impl SessionController {
    /// Start a controller task; it runs until every handle is dropped
    pub fn spawn(services: SessionServices, settings: ControllerSettings) -> (SessionHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let progress = ProgressTracker::default();
        let (view_tx, view_rx) = watch::channel(SessionView::new(
            ConversationState::Idle,
            progress.current().clone(),
        ));

        let (capture, capture_rx) = AudioCapturePipeline::new(
            services.capture.clone(),
            settings.chunk.clone(),
            SilenceGate::new(settings.silence_threshold),
        );
        let (playback, playback_rx) =
            PlaybackController::new(services.sink.clone(), settings.timings.no_audio_delay());
        let (tasks_tx, tasks_rx) = mpsc::unbounded_channel();

        let controller = Self {
            services,
            timings: settings.timings,
            policy: settings.policy,
            state: ConversationState::Idle,
            published_state: ConversationState::Idle,
            attempt: 0,
            config: None,
            session_id: None,
            channel: None,
            capture,
            capture_rx,
            playback,
            playback_rx,
            tasks_tx,
            tasks_rx,
            recording: None,
            processing_turn: None,
            awaiting_transcript: false,
            response_queue: VecDeque::new(),
            closing: false,
            timers: Timers::default(),
            started: false,
            manually_muted: false,
            progress,
            timeline: Timeline::default(),
            live_transcript: String::new(),
            advisory: None,
            failure: None,
            connection_message: None,
            analysis: None,
            analysis_requested: false,
            view: view_tx,
        };

        let task = tokio::spawn(controller.run(commands_rx));
        (SessionHandle::new(commands_tx, view_rx), task)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!("Session controller started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
                event = next_inbound(&mut self.channel) => self.on_inbound(event),
                Some(event) = self.capture_rx.recv() => self.on_capture(event),
                Some(finished) = self.playback_rx.recv() => self.on_playback(finished),
                Some(result) = self.tasks_rx.recv() => self.on_task(result),
                _ = sleep_opt(self.timers.settle) => self.on_settle(),
                _ = sleep_opt(self.timers.poll) => self.on_poll(),
                _ = sleep_opt(self.timers.debounce) => self.on_debounce(),
                _ = sleep_opt(self.timers.watchdog) => self.on_watchdog(),
                _ = sleep_opt(self.timers.grace) => self.on_grace(),
            }

            self.publish();
        }

        self.teardown().await;
        self.publish();
        info!("Session controller stopped");
    }

    // ---- commands ----

    async fn on_command(&mut self, command: Command) {
        debug!("Command: {:?}", command);

        match command {
            Command::Configure(config) => self.configure(config).await,
            Command::Start => self.start_interview(),
            Command::StartRecording => {
                if self.state == ConversationState::Running(Turn::Listening) {
                    self.manually_muted = false;
                    self.timers.settle = None;
                    self.begin_recording();
                } else {
                    debug!("Ignoring start recording in {:?}", self.state);
                }
            }
            Command::StopRecording => self.stop_recording(StopReason::Manual),
            Command::ToggleMute => self.toggle_mute(),
            Command::DismissAdvisory => self.advisory = None,
            Command::Leave => self.teardown().await,
        }
    }

    async fn configure(&mut self, config: InterviewConfig) {
        let same = self
            .config
            .as_ref()
            .is_some_and(|current| current.fingerprint() == config.fingerprint());

        if same && self.state != ConversationState::Failed {
            debug!("Configuration unchanged, keeping session");
            return;
        }

        if self.config.is_some() {
            self.teardown().await;
        }

        self.attempt += 1;
        let attempt = self.attempt;
        info!(
            "Configuring interview (attempt {}): {} / {}",
            attempt, config.job_role, config.interview_type
        );

        self.config = Some(config.clone());
        self.failure = None;
        self.state = ConversationState::Creating;
        self.connection_message = Some(PREPARING_MESSAGE);

        let bootstrapper = self.services.bootstrapper.clone();
        let tasks = self.tasks_tx.clone();
        tokio::spawn(async move {
            let result = bootstrapper.create_session(&config).await;
            let _ = tasks.send(TaskResult::Bootstrapped { attempt, result });
        });
    }

    fn start_interview(&mut self) {
        let Some(channel) = &self.channel else {
            warn!("Cannot start: not connected");
            return;
        };
        if self.state != ConversationState::Ready {
            warn!("Cannot start interview in {:?}", self.state);
            return;
        }

        info!("Starting interview {}", channel.session_id());
        channel.start();
        self.started = true;
        self.progress.mark_started();
        self.state = ConversationState::Running(Turn::Speaking);
    }

    fn toggle_mute(&mut self) {
        self.manually_muted = !self.manually_muted;
        info!("Microphone {}", if self.manually_muted { "muted" } else { "unmuted" });

        if self.manually_muted {
            self.timers.settle = None;
            self.stop_recording(StopReason::Manual);
        } else {
            self.arm_settle();
        }
    }

    // ---- transport ----

    fn on_inbound(&mut self, event: Option<InboundEvent>) {
        match event {
            Some(InboundEvent::Connected) => {
                if !self.state.is_terminal() {
                    self.connection_message = Some(CONNECTED_MESSAGE);
                }
            }
            Some(InboundEvent::Disconnected) => self.on_disconnected(),
            Some(InboundEvent::Server(event)) => self.on_server_event(event),
            None => {
                warn!("Interview connection closed");
                if let Some(channel) = self.channel.take() {
                    tokio::spawn(channel.leave());
                }
                if !self.state.is_terminal() && self.state != ConversationState::Idle {
                    self.fail(SessionFailure::retryable(CONNECTION_LOST_MESSAGE));
                }
            }
        }
    }

    fn on_disconnected(&mut self) {
        if self.state.is_terminal() {
            return;
        }

        warn!("Disconnected from interview service, waiting for reconnect");
        self.abandon_turn();
        self.playback.stop();
        self.closing = false;
        self.state = ConversationState::Connecting;
        self.connection_message = Some(RECONNECTING_MESSAGE);
    }

    fn on_server_event(&mut self, event: ServerEvent) {
        if self.state.is_terminal() {
            debug!("Ignoring server event after session end: {:?}", event);
            return;
        }

        match event {
            ServerEvent::Joined { state } => self.on_joined(state),
            ServerEvent::Started(response) | ServerEvent::Response(response) => {
                self.on_response(response)
            }
            ServerEvent::Transcription(transcription) => self.on_transcription(transcription),
            ServerEvent::State { state } => {
                self.progress.apply(&state);
                if state.is_complete {
                    self.complete();
                }
            }
            ServerEvent::Complete { session_id } => {
                info!("Interview {} complete", session_id);
                self.complete();
            }
            ServerEvent::Error { error } => self.on_server_error(error),
        }
    }

    fn on_joined(&mut self, state: InterviewSnapshot) {
        self.progress.apply(&state);
        if state.is_complete {
            self.complete();
            return;
        }

        if self.state != ConversationState::Connecting {
            debug!("Join acknowledged in {:?}", self.state);
            return;
        }

        self.connection_message = Some(READY_MESSAGE);
        if self.started {
            info!("Rejoined running interview");
            self.state = ConversationState::Running(Turn::Listening);
            if !self.play_next() {
                self.arm_settle();
            }
        } else {
            info!("Interview ready");
            self.state = ConversationState::Ready;
        }
    }

    fn on_response(&mut self, response: AiResponse) {
        if !self.state.is_running() && self.state != ConversationState::Ready {
            debug!("Ignoring response in {:?}", self.state);
            return;
        }

        if self.awaiting_transcript {
            debug!("Response arrived before final transcription, holding it");
            self.response_queue.push_back(response);
            if self.timers.grace.is_none() {
                self.timers.grace = Some(Instant::now() + self.timings.transcript_grace());
            }
            return;
        }

        self.response_queue.push_back(response);
        if self.state == ConversationState::Running(Turn::Speaking) {
            debug!("Interviewer still speaking, queueing response");
            return;
        }
        self.play_next();
    }

    /// Play the oldest queued response, if any
    fn play_next(&mut self) -> bool {
        match self.response_queue.pop_front() {
            Some(response) => {
                self.play_response(response);
                true
            }
            None => false,
        }
    }

    /// Leave a turn that went nowhere: queued responses first, else listen again
    fn resume(&mut self) {
        if !self.play_next() {
            self.back_to_listening();
        }
    }

    fn play_response(&mut self, response: AiResponse) {
        self.timers.watchdog = None;
        self.timers.grace = None;
        self.timers.settle = None;
        self.awaiting_transcript = false;
        self.processing_turn = None;

        if self.recording.is_some() {
            debug!("Interviewer took the floor, dropping the recording in progress");
            self.abandon_turn();
        }

        self.progress.apply(&response.snapshot());
        self.timeline.push(Speaker::Ai, &response.text);
        self.closing = response.is_complete;
        self.started = true;

        let token = self.playback.play(response.audio_data, response.audio_format);
        debug!(
            "Interviewer speaking (playback {}, question {}/{})",
            token, response.current_question_index, response.total_questions
        );
        self.state = ConversationState::Running(Turn::Speaking);
    }

    fn on_transcription(&mut self, transcription: Transcription) {
        if !transcription.is_final {
            self.live_transcript = transcription.text.clone();
            if self.advisory.as_ref().map(|a| a.kind) == Some(AdvisoryKind::Retry) {
                self.advisory = None;
            }

            let now = Instant::now();
            let spoke = match self.recording.as_mut() {
                Some(Recording {
                    endpointer: Some(ep),
                    ..
                }) => ep.observe_interim(&transcription.text, now),
                Some(recording) => {
                    if !transcription.text.trim().is_empty() {
                        recording.early_speech = Some(now);
                    }
                    false
                }
                None => false,
            };
            if spoke {
                self.timers.debounce = None;
                self.schedule_poll(now);
            }
            return;
        }

        self.live_transcript.clear();
        self.awaiting_transcript = false;

        if transcription.should_retry {
            let advisory = Advisory::retry(transcription.retry_message.as_deref());
            info!("Server asked for the answer again: {}", advisory.message);
            self.advisory = Some(advisory);
            self.resume();
            return;
        }

        if self.timeline.push(Speaker::User, &transcription.text).is_none() {
            warn!("Received empty final transcription");
        }

        if !self.play_next() && self.state == ConversationState::Running(Turn::Processing) {
            self.timers.watchdog = Some(Instant::now() + self.timings.response_timeout());
        }
    }

    fn on_server_error(&mut self, error: String) {
        match self.policy.classify(&error) {
            Severity::Soft => {
                warn!("Recoverable server error: {}", error);
                self.advisory = Some(Advisory::retry(None));
                self.awaiting_transcript = false;
                if self.state.is_running() {
                    self.resume();
                }
            }
            Severity::Hard => {
                error!("Interview service error: {}", error);
                self.fail(SessionFailure::from_server(&error));
            }
        }
    }

    // ---- capture ----

    fn begin_recording(&mut self) {
        if self.channel.is_none() {
            warn!("Not recording: no connection");
            return;
        }

        match self.capture.start() {
            Ok(turn) => {
                self.recording = Some(Recording {
                    turn,
                    endpointer: None,
                    early_speech: None,
                    chunks: Vec::new(),
                    stop_reason: None,
                });
                self.state = ConversationState::Running(Turn::Preparing);
            }
            Err(CaptureError::AlreadyRecording) => {
                warn!("Previous recording still holds the device");
            }
            Err(e) => {
                warn!("Failed to start recording: {}", e);
                self.advisory = Some(Advisory::microphone(&e));
            }
        }
    }

    fn stop_recording(&mut self, reason: StopReason) {
        let Some(recording) = self.recording.as_mut() else {
            return;
        };
        if recording.stop_reason.is_some() {
            return;
        }

        info!("Stopping recording turn {} ({})", recording.turn, reason);
        recording.stop_reason = Some(reason);
        self.capture.stop();
        self.timers.poll = None;
        self.timers.debounce = None;
        self.state = ConversationState::Running(Turn::Processing);
    }

    fn on_capture(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Acquired { turn, result } => self.on_acquired(turn, result),
            CaptureEvent::Chunk { turn, chunk } => {
                let Some(recording) = self.recording.as_mut().filter(|r| r.turn == turn) else {
                    return;
                };
                if let Some(channel) = &self.channel {
                    let session_id = channel.session_id().to_string();
                    match AudioPayload::from_chunk(&session_id, &chunk, None) {
                        Ok(payload) => channel.send_preview(payload),
                        Err(e) => warn!("Failed to encode chunk {}: {}", chunk.sequence, e),
                    }
                }
                recording.chunks.push(chunk);
            }
            CaptureEvent::Finished { turn } => self.on_capture_finished(turn),
        }
    }

    fn on_acquired(&mut self, turn: u64, result: Result<(), CaptureError>) {
        if self.recording.as_ref().map(|r| r.turn) != Some(turn) {
            return;
        }

        match result {
            Ok(()) => {
                let now = Instant::now();
                let endpoint = self.timings.endpoint();
                if let Some(recording) = self.recording.as_mut() {
                    let mut endpointer = Endpointer::new(endpoint, now);
                    if let Some(at) = recording.early_speech.take() {
                        endpointer.mark_spoken(at);
                    }
                    recording.endpointer = Some(endpointer);
                    if recording.stop_reason.is_none() {
                        info!("Recording turn {}", turn);
                        self.state = ConversationState::Running(Turn::Recording);
                        self.schedule_poll(now);
                    }
                }
            }
            Err(e) => {
                warn!("Microphone unavailable for turn {}: {}", turn, e);
                self.capture.finish(turn);
                self.recording = None;
                self.advisory = Some(Advisory::microphone(&e));
                self.state = ConversationState::Running(Turn::Listening);
            }
        }
    }

    fn on_capture_finished(&mut self, turn: u64) {
        self.capture.finish(turn);

        if self.recording.as_ref().map(|r| r.turn) != Some(turn) {
            return;
        }
        let Some(recording) = self.recording.take() else {
            return;
        };

        let reason = recording.stop_reason.unwrap_or_else(|| {
            warn!("Capture turn {} ended without a stop request", turn);
            StopReason::Manual
        });
        self.timers.poll = None;
        self.timers.debounce = None;

        let chunk_config = self.capture.chunk_config();
        let final_chunk =
            AudioChunk::concat(&recording.chunks, chunk_config.sample_rate, chunk_config.channels);

        if final_chunk.is_empty() {
            warn!("Turn {} captured no audio", turn);
            self.advisory = Some(Advisory::no_audio());
            self.state = ConversationState::Running(Turn::Listening);
            if reason != StopReason::Manual {
                self.arm_settle();
            }
            return;
        }

        let Some(session_id) = self.channel.as_ref().map(|c| c.session_id().to_string()) else {
            self.back_to_listening();
            return;
        };

        let payload = match AudioPayload::from_chunk(&session_id, &final_chunk, Some(reason)) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode final payload: {}", e);
                self.advisory = Some(Advisory::send_failed());
                self.back_to_listening();
                return;
            }
        };

        info!(
            "Sending answer for turn {} ({} ms, {} bytes, {})",
            turn,
            final_chunk.end_ms.saturating_sub(final_chunk.start_ms),
            final_chunk.byte_len(),
            reason
        );

        let Some(channel) = &self.channel else {
            return;
        };
        let ack = channel.send_final(payload);
        let tasks = self.tasks_tx.clone();
        tokio::spawn(async move {
            let result = ack.await.unwrap_or(Err(TransportError::Closed));
            let _ = tasks.send(TaskResult::FinalSent { turn, result });
        });

        self.processing_turn = Some(turn);
        self.awaiting_transcript = true;
        self.timers.watchdog = Some(Instant::now() + self.timings.response_timeout());
        self.state = ConversationState::Running(Turn::Processing);
    }

    // ---- playback ----

    fn on_playback(&mut self, finished: PlaybackFinished) {
        if !self.playback.finish(finished.token) {
            debug!("Ignoring stale playback {}", finished.token);
            return;
        }
        if self.state != ConversationState::Running(Turn::Speaking) {
            return;
        }

        if self.play_next() {
            return;
        }

        if self.closing {
            info!("Closing remarks finished, waiting for the session to end");
            self.state = ConversationState::Running(Turn::Closing);
            self.timers.watchdog = Some(Instant::now() + self.timings.response_timeout());
            return;
        }

        self.state = ConversationState::Running(Turn::Listening);
        self.arm_settle();
    }

    // ---- spawned work ----

    fn on_task(&mut self, result: TaskResult) {
        match result {
            TaskResult::Bootstrapped { attempt, result } => {
                if attempt != self.attempt {
                    debug!("Discarding stale bootstrap result (attempt {})", attempt);
                    return;
                }
                self.on_bootstrapped(result);
            }
            TaskResult::Connected { attempt, result } => {
                if attempt != self.attempt {
                    debug!("Discarding stale connection (attempt {})", attempt);
                    if let Ok(channel) = result {
                        tokio::spawn(channel.leave());
                    }
                    return;
                }
                match result {
                    Ok(channel) => {
                        info!("Channel open for session {}", channel.session_id());
                        self.channel = Some(channel);
                    }
                    Err(e) => {
                        error!("Failed to connect: {}", e);
                        self.fail(SessionFailure::retryable(e.to_string()));
                    }
                }
            }
            TaskResult::FinalSent { turn, result } => {
                if self.processing_turn != Some(turn) {
                    return;
                }
                if let Err(e) = result {
                    warn!("Failed to send answer for turn {}: {}", turn, e);
                    self.advisory = Some(Advisory::send_failed());
                    self.awaiting_transcript = false;
                    if self.state == ConversationState::Running(Turn::Processing) {
                        self.resume();
                    }
                }
            }
            TaskResult::Analysis { attempt, result } => {
                if attempt != self.attempt {
                    return;
                }
                match result {
                    Ok(analysis) => {
                        info!("Analysis ready: overall score {}", analysis.overall_score);
                        self.analysis = Some(analysis);
                    }
                    Err(e) => warn!("Failed to fetch analysis: {}", e),
                }
            }
        }
    }

    fn on_bootstrapped(&mut self, result: Result<CreatedSession, BackendError>) {
        let created = match result {
            Ok(created) => created,
            Err(e) => {
                error!("Failed to create interview session: {}", e);
                self.fail(SessionFailure::from_backend(&e));
                return;
            }
        };

        let Some(config) = &self.config else {
            return;
        };

        self.progress = ProgressTracker::new(created.total_questions, config.num_questions);
        self.session_id = Some(created.session_id.clone());
        self.state = ConversationState::Connecting;
        self.connection_message = Some(CONNECTING_MESSAGE);

        let attempt = self.attempt;
        let transport = self.services.transport.clone();
        let user_id = config.user_id.clone();
        let tasks = self.tasks_tx.clone();
        tokio::spawn(async move {
            let result =
                TransportChannel::open(transport.as_ref(), &created.session_id, &user_id).await;
            let _ = tasks.send(TaskResult::Connected { attempt, result });
        });
    }

    // ---- timers ----

    fn on_settle(&mut self) {
        self.timers.settle = None;
        if self.state == ConversationState::Running(Turn::Listening) && !self.manually_muted {
            self.begin_recording();
        }
    }

    fn on_poll(&mut self) {
        self.timers.poll = None;
        if self.state != ConversationState::Running(Turn::Recording) {
            return;
        }

        let now = Instant::now();
        let verdict = self
            .recording
            .as_ref()
            .and_then(|r| r.endpointer.as_ref())
            .and_then(|ep| ep.evaluate(now, self.playback.is_active()));

        match verdict {
            Some(StopReason::Silence) => {
                if self.timers.debounce.is_none() {
                    debug!("Silence detected, stopping after debounce");
                    self.timers.debounce =
                        Some(now + self.timings.endpoint().silence_debounce);
                }
                self.schedule_poll(now);
            }
            Some(reason) => self.stop_recording(reason),
            None => self.schedule_poll(now),
        }
    }

    fn on_debounce(&mut self) {
        self.timers.debounce = None;
        let now = Instant::now();
        let verdict = self
            .recording
            .as_ref()
            .and_then(|r| r.endpointer.as_ref())
            .and_then(|ep| ep.evaluate(now, self.playback.is_active()));

        if let Some(reason) = verdict {
            self.stop_recording(reason);
        }
    }

    fn on_watchdog(&mut self) {
        self.timers.watchdog = None;
        match self.state {
            ConversationState::Running(Turn::Processing) => {
                warn!("No response from the interviewer");
                self.advisory = Some(Advisory::no_response());
                self.awaiting_transcript = false;
                self.resume();
            }
            ConversationState::Running(Turn::Closing) => {
                warn!("Session end not confirmed by the server, completing locally");
                self.complete();
            }
            _ => {}
        }
    }

    fn on_grace(&mut self) {
        self.timers.grace = None;
        if self.awaiting_transcript && !self.response_queue.is_empty() {
            warn!("Final transcription did not arrive, playing response anyway");
            self.play_next();
        }
    }

    /// Next endpointing check: the regular poll, pulled in to the moment
    /// silence or the cap could first trigger
    fn schedule_poll(&mut self, now: Instant) {
        let Some(ep) = self.recording.as_ref().and_then(|r| r.endpointer.as_ref()) else {
            self.timers.poll = None;
            return;
        };

        let mut next = now + ep.config().poll_interval;
        let cap = ep.started_at() + ep.config().max_recording;
        if cap > now {
            next = next.min(cap);
        }
        if let Some(due) = ep.silence_due_at().filter(|due| *due > now) {
            next = next.min(due);
        }
        self.timers.poll = Some(next);
    }

    fn arm_settle(&mut self) {
        if self.state == ConversationState::Running(Turn::Listening) && !self.manually_muted {
            self.timers.settle = Some(Instant::now() + self.timings.settle());
        }
    }

    // ---- transitions ----

    /// Drop whatever turn is in progress without sending anything
    fn abandon_turn(&mut self) {
        self.capture.release();
        self.recording = None;
        self.processing_turn = None;
        self.awaiting_transcript = false;
        self.live_transcript.clear();
        self.timers = Timers::default();
    }

    /// Recoverable turn failure: close the turn and open the mic again
    fn back_to_listening(&mut self) {
        self.abandon_turn();
        if self.state.is_running() {
            self.state = ConversationState::Running(Turn::Listening);
            self.arm_settle();
        }
    }

    fn fail(&mut self, failure: SessionFailure) {
        self.abandon_turn();
        self.response_queue.clear();
        self.playback.stop();
        self.closing = false;
        self.failure = Some(failure);
        self.connection_message = None;
        self.state = ConversationState::Failed;
    }

    fn complete(&mut self) {
        if self.state == ConversationState::Completed {
            return;
        }

        self.abandon_turn();
        self.response_queue.clear();
        self.playback.stop();
        self.closing = false;
        self.progress.mark_complete();
        self.state = ConversationState::Completed;
        self.connection_message = Some(ENDED_MESSAGE);

        if self.analysis_requested {
            return;
        }
        let Some(session_id) = self.session_id.clone() else {
            return;
        };
        self.analysis_requested = true;

        let attempt = self.attempt;
        let backend = self.services.bootstrapper.backend();
        let tasks = self.tasks_tx.clone();
        tokio::spawn(async move {
            let result = backend.fetch_analysis(&session_id).await;
            let _ = tasks.send(TaskResult::Analysis { attempt, result });
        });
    }

    /// Release every resource and forget the session
    async fn teardown(&mut self) {
        self.attempt += 1;
        self.abandon_turn();
        self.response_queue.clear();
        self.playback.stop();

        if let Some(config) = self.config.take() {
            self.services.bootstrapper.release(&config).await;
        }
        if let Some(channel) = self.channel.take() {
            channel.leave().await;
        }
        if let Some(session_id) = self.session_id.take() {
            info!("Left session {}", session_id);
        }

        self.state = ConversationState::Idle;
        self.closing = false;
        self.started = false;
        self.manually_muted = false;
        self.progress = ProgressTracker::default();
        self.timeline = Timeline::default();
        self.advisory = None;
        self.failure = None;
        self.connection_message = None;
        self.analysis = None;
        self.analysis_requested = false;
    }

    fn publish(&mut self) {
        if self.state != self.published_state {
            info!("Session state: {:?} -> {:?}", self.published_state, self.state);
            self.published_state = self.state;
        }

        let next = SessionView {
            state: self.state,
            session_status: self.state.session_status(),
            ai_state: self.state.ai_state(),
            mic_status: self.state.mic_status(),
            session_id: self.session_id.clone(),
            progress: self.progress.current().clone(),
            timeline: self.timeline.entries().to_vec(),
            live_transcript: self.live_transcript.clone(),
            advisory: self.advisory.clone(),
            error: self.failure.clone(),
            manually_muted: self.manually_muted,
            connection_message: self.connection_message.map(str::to_string),
            analysis: self.analysis.clone(),
        };

        self.view.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

async fn next_inbound(channel: &mut Option<TransportChannel>) -> Option<InboundEvent> {
    match channel {
        Some(channel) => channel.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
