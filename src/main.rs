//! voice-assistant-daemon: Background daemon for local speech services
//!
//! This daemon runs as a user service and provides:
//! - Speech recognition sessions with partial/final results
//! - Speech synthesis of single utterances
//! - Microphone permission query and request
//! - IPC server exposing the operations and a notification stream
//!
//! The recognition and synthesis engines are external: a recognizer
//! process speaking JSON lines on stdout, and espeak-ng.

mod config;
mod engine;
mod error;
mod events;
mod ipc;
mod language;
mod lifecycle;
mod permission;
mod service;
mod session;
mod synthesis;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::engine::{EspeakProvider, ProcessRecognizer, RecognitionEngine, UnavailableRecognizer};
use crate::events::NotificationChannel;
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::permission::{ConfiguredHost, PermissionGateway};
use crate::service::VoiceService;

/// Capacity of the notification broadcast channel
const NOTIFICATION_BUFFER: usize = 64;

/// Grace period for the voice service to release its engines
const SERVICE_STOP_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "voice-assistant-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, "configuration loaded");

    let mut shutdown = ShutdownSignal::new().context("failed to register signal handlers")?;

    let recognizer: Arc<dyn RecognitionEngine> =
        match ProcessRecognizer::new(config.recognizer_command.clone()) {
            Some(recognizer) => {
                info!(command = ?config.recognizer_command, "using process recognizer");
                Arc::new(recognizer)
            }
            None => {
                warn!("no recognizer configured - speech recognition will report unavailable");
                Arc::new(UnavailableRecognizer)
            }
        };
    let synthesizer = Arc::new(EspeakProvider::new(config.espeak_bin.clone()));
    let permissions = PermissionGateway::new(Arc::new(ConfiguredHost::new(
        config.microphone,
        config.prompt_response,
    )));
    let notifications = NotificationChannel::new(NOTIFICATION_BUFFER);
    let mut log_rx = notifications.subscribe();

    let (service, handle) = VoiceService::new(recognizer, synthesizer, permissions, notifications);
    let service_task = tokio::spawn(service.run());

    let server = Server::new(&config.socket_path, handle.clone())?;

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Log notifications as they are published
        _ = async {
            loop {
                match log_rx.recv().await {
                    Ok(event) => info!(%event, "notification"),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "notification logger lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("notification channel closed");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    server.shutdown().await;
    handle.shutdown().await;

    if tokio::time::timeout(SERVICE_STOP_TIMEOUT, service_task).await.is_err() {
        warn!("voice service did not stop in time");
    }

    info!("voice-assistant-daemon stopped");

    Ok(())
}
