//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.
//! Requests carry a client-chosen `id` that is echoed on the matching
//! `resolve` or `reject`, so several requests can be in flight at once.

use serde::{Deserialize, Serialize};

use crate::error::VoiceError;
use crate::events::Notification;
use crate::language::DEFAULT_REQUEST_LANGUAGE;
use crate::service::ServiceStatus;

fn default_language() -> String {
    DEFAULT_REQUEST_LANGUAGE.to_string()
}

fn default_true() -> bool {
    true
}

/// A request with its correlation id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: u64,

    #[serde(flatten)]
    pub request: Request,
}

/// Requests from clients to the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum Request {
    CheckPermissions,

    RequestPermissions,

    /// Whether a recognition engine is usable
    Available,

    StartListening {
        #[serde(default = "default_language")]
        language: String,
        #[serde(default = "default_true", rename = "partialResults")]
        partial_results: bool,
    },

    StopListening,

    Speak {
        #[serde(default)]
        text: String,
        #[serde(default = "default_language")]
        lang: String,
    },

    /// Ping to check connectivity
    Ping,

    GetStatus,

    /// Receive notifications on this connection
    Subscribe,
}

/// Messages from daemon to clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    /// Successful completion of request `id`
    Resolve { id: u64, data: Payload },

    /// Failed completion of request `id`
    Reject {
        id: u64,
        code: String,
        message: String,
    },

    /// Push notification for subscribed clients
    Notify(Notification),
}

impl Outbound {
    pub fn reject(id: u64, error: &VoiceError) -> Self {
        Outbound::Reject {
            id,
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }

    /// Reply to a frame that could not be parsed
    pub fn bad_request(message: impl Into<String>) -> Self {
        Outbound::Reject {
            id: 0,
            code: "BAD_REQUEST".to_string(),
            message: message.into(),
        }
    }
}

/// Result data of a resolved request
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Permission { granted: bool },
    Availability { available: bool },
    Matches { matches: Vec<String> },
    Status(DaemonStatus),
    Empty {},
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Uptime in seconds
    pub uptime_secs: u64,

    #[serde(flatten)]
    pub service: ServiceStatus,
}

impl DaemonStatus {
    pub fn new(uptime_secs: u64, service: ServiceStatus) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs,
            service,
        }
    }
}
