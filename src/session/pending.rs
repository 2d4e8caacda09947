//! Single-shot caller requests

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::VoiceError;

/// Receiving half held by the caller
pub type Reply<T> = oneshot::Receiver<Result<T, VoiceError>>;

/// An outstanding caller request awaiting exactly one outcome.
///
/// Resolving or rejecting consumes the call, so a call can never be
/// completed twice. Whoever holds it in an `Option` marks it released by
/// taking it out.
#[derive(Debug)]
pub struct PendingCall<T> {
    tx: oneshot::Sender<Result<T, VoiceError>>,
}

impl<T> PendingCall<T> {
    pub fn new() -> (Self, Reply<T>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Complete successfully. Returns false if nobody was waiting anymore.
    pub fn resolve(self, value: T) -> bool {
        self.complete(Ok(value))
    }

    /// Complete with an error. Returns false if nobody was waiting anymore.
    pub fn reject(self, error: VoiceError) -> bool {
        self.complete(Err(error))
    }

    fn complete(self, outcome: Result<T, VoiceError>) -> bool {
        let delivered = self.tx.send(outcome).is_ok();
        if !delivered {
            debug!("caller went away before the request completed");
        }
        delivered
    }
}
