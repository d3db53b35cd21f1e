use tokio::sync::{mpsc, watch};

use super::view::SessionView;
use crate::bootstrap::InterviewConfig;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ControllerError {
    #[error("Session controller has shut down")]
    Closed,
}

/// Requests from the candidate
#[derive(Debug, Clone)]
pub enum Command {
    /// Create (or keep) the session for this config
    Configure(InterviewConfig),
    /// Ask the interviewer to begin
    Start,
    StartRecording,
    StopRecording,
    ToggleMute,
    DismissAdvisory,
    /// Tear everything down and return to idle
    Leave,
}

/// Cheap, cloneable front door to a running session controller
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<SessionView>,
}

impl SessionHandle {
    pub(crate) fn new(commands: mpsc::Sender<Command>, view: watch::Receiver<SessionView>) -> Self {
        Self { commands, view }
    }

    pub async fn send(&self, command: Command) -> Result<(), ControllerError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ControllerError::Closed)
    }

    pub async fn configure(&self, config: InterviewConfig) -> Result<(), ControllerError> {
        self.send(Command::Configure(config)).await
    }

    pub async fn start(&self) -> Result<(), ControllerError> {
        self.send(Command::Start).await
    }

    pub async fn start_recording(&self) -> Result<(), ControllerError> {
        self.send(Command::StartRecording).await
    }

    pub async fn stop_recording(&self) -> Result<(), ControllerError> {
        self.send(Command::StopRecording).await
    }

    pub async fn toggle_mute(&self) -> Result<(), ControllerError> {
        self.send(Command::ToggleMute).await
    }

    pub async fn dismiss_advisory(&self) -> Result<(), ControllerError> {
        self.send(Command::DismissAdvisory).await
    }

    pub async fn leave(&self) -> Result<(), ControllerError> {
        self.send(Command::Leave).await
    }

    /// Latest published view
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Wait until the view satisfies `predicate`
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<SessionView, ControllerError>
    where
        F: FnMut(&SessionView) -> bool,
    {
        let mut view = self.view.clone();
        loop {
            {
                let current = view.borrow_and_update();
                if predicate(&current) {
                    return Ok(current.clone());
                }
            }
            view.changed().await.map_err(|_| ControllerError::Closed)?;
        }
    }
}
