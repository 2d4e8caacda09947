//! Microphone permission gateway
//!
//! A pass-through to whatever host owns the permission. Reads are pure; a
//! request only prompts when the permission is not already granted.

mod host;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

pub use host::ConfiguredHost;

/// Authorization state reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Granted,
    Denied,
    /// Never asked
    Undetermined,
}

impl PermissionState {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionState::Granted)
    }
}

/// Host side of the microphone permission
#[async_trait]
pub trait PermissionHost: Send + Sync {
    /// Current state, without side effects
    fn microphone(&self) -> PermissionState;

    /// Show the permission prompt and wait for the answer
    async fn prompt_microphone(&self) -> PermissionState;
}

#[derive(Clone)]
pub struct PermissionGateway {
    host: Arc<dyn PermissionHost>,
}

impl PermissionGateway {
    pub fn new(host: Arc<dyn PermissionHost>) -> Self {
        Self { host }
    }

    pub fn check(&self) -> PermissionState {
        self.host.microphone()
    }

    /// Request the permission. Denial is an answer, not an error.
    pub async fn request(&self) -> bool {
        if self.check().is_granted() {
            return true;
        }

        let answer = self.host.prompt_microphone().await;
        info!(?answer, "microphone permission prompt answered");
        answer.is_granted()
    }
}
