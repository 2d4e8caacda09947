//! Headless permission host driven by configuration

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use super::{PermissionHost, PermissionState};
use crate::config::PromptResponse;

/// Keeps the microphone state in memory; the "prompt" answers with the
/// configured response and remembers it.
pub struct ConfiguredHost {
    state: Mutex<PermissionState>,
    response: PromptResponse,
    prompts: AtomicUsize,
}

impl ConfiguredHost {
    pub fn new(initial: PermissionState, response: PromptResponse) -> Self {
        Self {
            state: Mutex::new(initial),
            response,
            prompts: AtomicUsize::new(0),
        }
    }

    /// Number of prompts shown so far
    #[cfg(test)]
    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PermissionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PermissionHost for ConfiguredHost {
    fn microphone(&self) -> PermissionState {
        *self.lock()
    }

    async fn prompt_microphone(&self) -> PermissionState {
        let shown = self.prompts.fetch_add(1, Ordering::SeqCst) + 1;

        let answer = match self.response {
            PromptResponse::Grant => PermissionState::Granted,
            PromptResponse::Deny => PermissionState::Denied,
        };
        debug!(?answer, shown, "answering microphone prompt");

        *self.lock() = answer;
        answer
    }
}
