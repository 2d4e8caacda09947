//! Synthesis request handling
//!
//! The engine is created on first use and may not accept utterances until
//! its asynchronous initialization reports success. While initialization is
//! in flight only the newest request is kept; older ones are pre-empted.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::{
    EngineMessage, InitSink, SynthesisProvider, Synthesizer, STATUS_ERROR, STATUS_SUCCESS,
};
use crate::error::VoiceError;
use crate::language::LanguageTag;
use crate::session::PendingCall;

/// Text to speak and the language to speak it in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    pub text: String,
    pub language: String,
}

struct QueuedSpeech {
    request: SpeechRequest,
    call: PendingCall<()>,
}

enum EngineState {
    Uninitialized,
    Initializing {
        generation: u64,
        engine: Box<dyn Synthesizer>,
        queued: Option<QueuedSpeech>,
    },
    Ready(Box<dyn Synthesizer>),
}

pub struct SynthesisHandler {
    provider: Arc<dyn SynthesisProvider>,
    engine_tx: mpsc::UnboundedSender<EngineMessage>,
    state: EngineState,
    generation: u64,
    utterances: u64,
}

impl SynthesisHandler {
    pub fn new(
        provider: Arc<dyn SynthesisProvider>,
        engine_tx: mpsc::UnboundedSender<EngineMessage>,
    ) -> Self {
        Self {
            provider,
            engine_tx,
            state: EngineState::Uninitialized,
            generation: 0,
            utterances: 0,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, EngineState::Ready(_))
    }

    pub fn speak(&mut self, request: SpeechRequest, call: PendingCall<()>) {
        let next = QueuedSpeech { request, call };

        match &mut self.state {
            EngineState::Uninitialized => {
                self.generation += 1;
                let generation = self.generation;
                let init = InitSink::new(generation, self.engine_tx.clone());

                match self.provider.create(init) {
                    Ok(engine) => {
                        info!(generation, "synthesis engine initializing");
                        self.state = EngineState::Initializing {
                            generation,
                            engine,
                            queued: Some(next),
                        };
                    }
                    Err(e) => {
                        warn!(?e, "failed to create synthesis engine");
                        next.call.reject(VoiceError::SynthesisInitFailed(STATUS_ERROR));
                    }
                }
            }

            EngineState::Initializing { queued, .. } => {
                if let Some(previous) = queued.replace(next) {
                    debug!("pre-empting speech request waiting on initialization");
                    previous.call.reject(VoiceError::Preempted);
                }
            }

            EngineState::Ready(engine) => {
                self.utterances += 1;
                submit(&mut **engine, self.utterances, next);
            }
        }
    }

    /// Outcome of an initialization started by `speak`
    pub fn on_init(&mut self, generation: u64, status: i32) {
        match std::mem::replace(&mut self.state, EngineState::Uninitialized) {
            EngineState::Initializing {
                generation: current,
                mut engine,
                queued,
            } if current == generation => {
                if status == STATUS_SUCCESS {
                    info!(generation, "synthesis engine ready");
                    if let Some(speech) = queued {
                        self.utterances += 1;
                        submit(engine.as_mut(), self.utterances, speech);
                    }
                    self.state = EngineState::Ready(engine);
                } else {
                    warn!(generation, status, "synthesis engine failed to initialize");
                    if let Some(speech) = queued {
                        speech.call.reject(VoiceError::SynthesisInitFailed(status));
                    }
                }
            }
            other => {
                debug!(generation, status, "ignoring stale synthesis init");
                self.state = other;
            }
        }
    }

    /// Silence the engine and drop anything still waiting
    pub fn shutdown(&mut self) {
        match std::mem::replace(&mut self.state, EngineState::Uninitialized) {
            EngineState::Initializing { queued, .. } => {
                if let Some(speech) = queued {
                    speech.call.reject(VoiceError::ServiceUnavailable);
                }
            }
            EngineState::Ready(mut engine) => engine.stop(),
            EngineState::Uninitialized => {}
        }
    }
}

/// Apply the language and hand the utterance to the engine
fn submit(engine: &mut dyn Synthesizer, utterance: u64, speech: QueuedSpeech) {
    let QueuedSpeech { request, call } = speech;

    let language = LanguageTag::resolve(&request.language);
    if !engine.set_language(&language).is_usable() {
        debug!(requested = %request.language, "language unsupported, using fallback");
        engine.set_language(&LanguageTag::fallback());
    }

    let utterance_id = format!("utterance-{}", utterance);
    let status = engine.speak_flush(&request.text, &utterance_id);
    if status == STATUS_SUCCESS {
        call.resolve(());
    } else {
        warn!(%utterance_id, status, "synthesis engine refused utterance");
        call.reject(VoiceError::SynthesisSpeakFailed(status));
    }
}
