//! Interfaces to the platform speech engines
//!
//! Engines are callback driven: they are handed a sink when started and push
//! events into it from whatever thread they run on. Every sink is stamped
//! with the identity of the session (or initialization attempt) it belongs
//! to, so the service can tell current events from late ones.

mod espeak;
mod process;

use tokio::sync::mpsc;
use tracing::trace;

pub use espeak::EspeakProvider;
pub use process::ProcessRecognizer;

use crate::language::LanguageTag;

/// Status reported by the synthesis engine on success
pub const STATUS_SUCCESS: i32 = 0;

/// Generic failure status of the synthesis engine
pub const STATUS_ERROR: i32 = -1;

/// Identity of one recognition session. Tokens only ever increase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionToken(pub u64);

impl SessionToken {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Parameters a recognition engine is started with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionRequest {
    pub language: String,
    pub partial_results: bool,
    /// Upper bound on candidates per recognition
    pub max_results: u32,
}

/// Raw callbacks of a recognition engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    ReadyForSpeech,
    BeginningOfSpeech,
    EndOfSpeech,
    Partial(Vec<String>),
    Final(Vec<String>),
    Error(i32),
}

/// Named recognition engine error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionErrorCode {
    NetworkTimeout,
    Network,
    Audio,
    Server,
    Client,
    SpeechTimeout,
    NoMatch,
    RecognizerBusy,
    InsufficientPermissions,
    Other(i32),
}

impl RecognitionErrorCode {
    pub const CLIENT: i32 = 5;

    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::NetworkTimeout,
            2 => Self::Network,
            3 => Self::Audio,
            4 => Self::Server,
            5 => Self::Client,
            6 => Self::SpeechTimeout,
            7 => Self::NoMatch,
            8 => Self::RecognizerBusy,
            9 => Self::InsufficientPermissions,
            other => Self::Other(other),
        }
    }
}

impl std::fmt::Display for RecognitionErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NetworkTimeout => write!(f, "network timeout"),
            Self::Network => write!(f, "network"),
            Self::Audio => write!(f, "audio"),
            Self::Server => write!(f, "server"),
            Self::Client => write!(f, "client"),
            Self::SpeechTimeout => write!(f, "speech timeout"),
            Self::NoMatch => write!(f, "no match"),
            Self::RecognizerBusy => write!(f, "recognizer busy"),
            Self::InsufficientPermissions => write!(f, "insufficient permissions"),
            Self::Other(code) => write!(f, "unknown ({})", code),
        }
    }
}

/// Messages delivered from engines to the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineMessage {
    Recognition {
        token: SessionToken,
        event: RecognitionEvent,
    },
    SynthesisInit {
        generation: u64,
        status: i32,
    },
}

/// Callback target handed to a recognition engine for one session
#[derive(Debug, Clone)]
pub struct EventSink {
    token: SessionToken,
    tx: mpsc::UnboundedSender<EngineMessage>,
}

impl EventSink {
    pub fn new(token: SessionToken, tx: mpsc::UnboundedSender<EngineMessage>) -> Self {
        Self { token, tx }
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    /// Deliver an event. Returns false once the service is gone.
    pub fn emit(&self, event: RecognitionEvent) -> bool {
        trace!(token = %self.token, ?event, "engine event");
        self.tx
            .send(EngineMessage::Recognition {
                token: self.token,
                event,
            })
            .is_ok()
    }
}

/// One-shot callback for the outcome of synthesis engine initialization
#[derive(Debug)]
pub struct InitSink {
    generation: u64,
    tx: mpsc::UnboundedSender<EngineMessage>,
}

impl InitSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<EngineMessage>) -> Self {
        Self { generation, tx }
    }

    pub fn complete(self, status: i32) {
        let _ = self.tx.send(EngineMessage::SynthesisInit {
            generation: self.generation,
            status,
        });
    }
}

/// Errors raised while constructing an engine instance
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no recognition engine configured")]
    NotConfigured,

    #[error("failed to spawn engine process: {0}")]
    Spawn(#[from] std::io::Error),
}

/// A speech recognition engine
pub trait RecognitionEngine: Send + Sync {
    fn is_available(&self) -> bool;

    /// Start a new recognition run that reports into `sink`
    fn start(
        &self,
        request: &RecognitionRequest,
        sink: EventSink,
    ) -> Result<Box<dyn ActiveRecognition>, EngineError>;
}

/// A running recognition. Dropping it releases the engine instance.
pub trait ActiveRecognition: Send {
    /// Stop listening and discard anything not yet delivered
    fn cancel(&mut self);
}

/// How well the engine supports a requested language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageSupport {
    Available,
    NotSupported,
}

impl LanguageSupport {
    pub fn is_usable(&self) -> bool {
        matches!(self, LanguageSupport::Available)
    }
}

/// Factory for the synthesis engine
pub trait SynthesisProvider: Send + Sync {
    /// Construct an engine; initialization finishes asynchronously through `init`
    fn create(&self, init: InitSink) -> Result<Box<dyn Synthesizer>, EngineError>;
}

/// An initialized synthesis engine
pub trait Synthesizer: Send {
    fn set_language(&mut self, language: &LanguageTag) -> LanguageSupport;

    /// Submit an utterance, discarding whatever is currently being spoken.
    /// Returns the engine status code of the hand-off.
    fn speak_flush(&mut self, text: &str, utterance_id: &str) -> i32;

    fn stop(&mut self);
}

/// Recognition engine used when nothing is configured
pub struct UnavailableRecognizer;

impl RecognitionEngine for UnavailableRecognizer {
    fn is_available(&self) -> bool {
        false
    }

    fn start(
        &self,
        _request: &RecognitionRequest,
        _sink: EventSink,
    ) -> Result<Box<dyn ActiveRecognition>, EngineError> {
        Err(EngineError::NotConfigured)
    }
}
