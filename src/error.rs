//! Errors surfaced to callers as request rejections

/// Rejection reasons for caller-facing operations.
///
/// Recognition engine errors never appear here: they resolve the pending
/// request with an empty result and are reported on the notification channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoiceError {
    #[error("Microphone permission not granted")]
    PermissionDenied,

    #[error("Speech recognition not available on this device")]
    EngineUnavailable,

    #[error("TTS init failed: {0}")]
    SynthesisInitFailed(i32),

    #[error("TTS speak failed: {0}")]
    SynthesisSpeakFailed(i32),

    /// The listening session was replaced by a newer one before it resolved
    #[error("recognition session superseded by a newer session")]
    Superseded,

    /// The listening session was stopped before it resolved
    #[error("recognition session stopped before producing a result")]
    Cancelled,

    /// A newer speak request replaced this one while the engine was starting
    #[error("speech request pre-empted by a newer request")]
    Preempted,

    /// The service actor is gone (daemon shutting down)
    #[error("voice service is not running")]
    ServiceUnavailable,
}

impl VoiceError {
    /// Stable code used on the wire
    pub fn code(&self) -> &'static str {
        match self {
            VoiceError::PermissionDenied => "PERMISSION_DENIED",
            VoiceError::EngineUnavailable => "ENGINE_UNAVAILABLE",
            VoiceError::SynthesisInitFailed(_) => "SYNTHESIS_INIT_FAILED",
            VoiceError::SynthesisSpeakFailed(_) => "SYNTHESIS_SPEAK_FAILED",
            VoiceError::Superseded => "SUPERSEDED",
            VoiceError::Cancelled => "CANCELLED",
            VoiceError::Preempted => "PREEMPTED",
            VoiceError::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }
}
