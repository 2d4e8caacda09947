//! Voice service actor
//!
//! A single task owns the recognition controller and the synthesis handler.
//! Caller commands and engine callbacks are both delivered to it as messages,
//! so every state mutation happens on that one task. Callers hold a cheap
//! cloneable [`VoiceHandle`].

use std::ops::ControlFlow;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use crate::engine::{EngineMessage, RecognitionEngine, SynthesisProvider};
use crate::error::VoiceError;
use crate::events::{Notification, NotificationChannel};
use crate::permission::{PermissionGateway, PermissionState};
use crate::session::{ListenOptions, PendingCall, RecognitionController, Reply, SessionState};
use crate::synthesis::{SpeechRequest, SynthesisHandler};

const COMMAND_QUEUE: usize = 32;

/// Requests from handles to the service task
enum Command {
    StartListening {
        options: ListenOptions,
        call: PendingCall<Vec<String>>,
    },
    StopListening {
        done: PendingCall<()>,
    },
    Speak {
        request: SpeechRequest,
        call: PendingCall<()>,
    },
    Status {
        reply: PendingCall<ServiceStatus>,
    },
    Shutdown,
}

/// Snapshot of the active session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub token: u64,
    pub state: String,
    pub language: String,
    pub partial_results: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub listening: bool,
    pub session: Option<SessionStatus>,
    pub synthesizer_ready: bool,
}

/// State owned by the service task
struct ServiceCore {
    recognition: RecognitionController,
    synthesis: SynthesisHandler,
}

impl ServiceCore {
    fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::StartListening { options, call } => {
                self.recognition.start_listening(options, call);
            }
            Command::StopListening { done } => {
                self.recognition.stop_listening();
                done.resolve(());
            }
            Command::Speak { request, call } => {
                self.synthesis.speak(request, call);
            }
            Command::Status { reply } => {
                reply.resolve(self.status());
            }
            Command::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn handle_engine_message(&mut self, message: EngineMessage) {
        match message {
            EngineMessage::Recognition { token, event } => {
                self.recognition.on_event(token, event);
            }
            EngineMessage::SynthesisInit { generation, status } => {
                self.synthesis.on_init(generation, status);
            }
        }
    }

    fn status(&self) -> ServiceStatus {
        let active = self.recognition.active();

        ServiceStatus {
            listening: active.is_some_and(|s| s.state() == SessionState::Listening),
            session: active.map(|s| SessionStatus {
                token: s.token().0,
                state: s.state().to_string(),
                language: s.language().to_string(),
                partial_results: s.partial_results(),
            }),
            synthesizer_ready: self.synthesis.is_ready(),
        }
    }

    fn shutdown(&mut self) {
        self.recognition.shutdown();
        self.synthesis.shutdown();
    }
}

pub struct VoiceService {
    core: ServiceCore,
    commands: mpsc::Receiver<Command>,
    engine_rx: mpsc::UnboundedReceiver<EngineMessage>,
}

impl VoiceService {
    /// Create the service and the handle used to talk to it
    pub fn new(
        recognizer: Arc<dyn RecognitionEngine>,
        synthesizer: Arc<dyn SynthesisProvider>,
        permissions: PermissionGateway,
        notifications: NotificationChannel,
    ) -> (Self, VoiceHandle) {
        let (command_tx, commands) = mpsc::channel(COMMAND_QUEUE);
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();

        let core = ServiceCore {
            recognition: RecognitionController::new(
                recognizer.clone(),
                permissions.clone(),
                notifications.clone(),
                engine_tx.clone(),
            ),
            synthesis: SynthesisHandler::new(synthesizer, engine_tx),
        };

        let handle = VoiceHandle {
            commands: command_tx,
            permissions,
            recognizer,
            notifications,
        };

        (
            Self {
                core,
                commands,
                engine_rx,
            },
            handle,
        )
    }

    /// Process commands and engine callbacks until told to shut down or
    /// every handle is dropped
    pub async fn run(self) {
        let VoiceService {
            mut core,
            mut commands,
            mut engine_rx,
        } = self;

        info!("voice service started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if core.handle_command(command).is_break() {
                            info!("voice service shutdown requested");
                            break;
                        }
                    }
                    None => break,
                },
                Some(message) = engine_rx.recv() => {
                    core.handle_engine_message(message);
                }
            }
        }

        core.shutdown();
        info!("voice service stopped");
    }
}

/// Caller-side access to the voice service
#[derive(Clone)]
pub struct VoiceHandle {
    commands: mpsc::Sender<Command>,
    permissions: PermissionGateway,
    recognizer: Arc<dyn RecognitionEngine>,
    notifications: NotificationChannel,
}

impl VoiceHandle {
    pub fn check_permissions(&self) -> PermissionState {
        self.permissions.check()
    }

    /// Prompts on the caller's task, never on the service task
    pub async fn request_permissions(&self) -> bool {
        self.permissions.request().await
    }

    pub fn available(&self) -> bool {
        self.recognizer.is_available()
    }

    #[cfg(test)]
    pub async fn start_listening(&self, options: ListenOptions) -> Result<Vec<String>, VoiceError> {
        outcome(self.queue_start_listening(options).await?).await
    }

    /// Hand a start to the service without waiting for its result
    pub async fn queue_start_listening(
        &self,
        options: ListenOptions,
    ) -> Result<Reply<Vec<String>>, VoiceError> {
        let (call, reply) = PendingCall::new();
        self.send(Command::StartListening { options, call }).await?;
        Ok(reply)
    }

    /// Always succeeds, even with nothing listening or the service gone
    #[cfg(test)]
    pub async fn stop_listening(&self) {
        if let Ok(done) = self.queue_stop_listening().await {
            let _ = done.await;
        }
    }

    pub async fn queue_stop_listening(&self) -> Result<Reply<()>, VoiceError> {
        let (done, reply) = PendingCall::new();
        self.send(Command::StopListening { done }).await?;
        Ok(reply)
    }

    #[cfg(test)]
    pub async fn speak(&self, request: SpeechRequest) -> Result<(), VoiceError> {
        outcome(self.queue_speak(request).await?).await
    }

    pub async fn queue_speak(&self, request: SpeechRequest) -> Result<Reply<()>, VoiceError> {
        let (call, reply) = PendingCall::new();
        self.send(Command::Speak { request, call }).await?;
        Ok(reply)
    }

    #[cfg(test)]
    pub async fn status(&self) -> Result<ServiceStatus, VoiceError> {
        outcome(self.queue_status().await?).await
    }

    pub async fn queue_status(&self) -> Result<Reply<ServiceStatus>, VoiceError> {
        let (reply, status) = PendingCall::new();
        self.send(Command::Status { reply }).await?;
        Ok(status)
    }

    /// Stop the service task. Live sessions and waiting speech are rejected.
    pub async fn shutdown(&self) {
        let _ = self.send(Command::Shutdown).await;
    }

    /// Listen to recognition notifications
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    async fn send(&self, command: Command) -> Result<(), VoiceError> {
        self.commands.send(command).await.map_err(|_| {
            debug!("voice service is gone");
            VoiceError::ServiceUnavailable
        })
    }
}

/// Wait for a queued command to complete
pub async fn outcome<T>(reply: Reply<T>) -> Result<T, VoiceError> {
    reply.await.map_err(|_| VoiceError::ServiceUnavailable)?
}
