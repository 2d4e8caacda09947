//! Speech synthesis requests
//!
//! One utterance at a time, flushed into the engine; a request completes
//! when the engine accepts the hand-off, not when the audio ends.

mod handler;

pub use handler::{SpeechRequest, SynthesisHandler};
