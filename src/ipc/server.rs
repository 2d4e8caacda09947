//! Unix domain socket server for IPC
//!
//! Exposes the voice operations as request/response pairs and pushes
//! recognition notifications to subscribed clients.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::VoiceError;
use crate::events::Notification;
use crate::service::{outcome, ServiceStatus, VoiceHandle};
use crate::session::{ListenOptions, Reply};
use crate::synthesis::SpeechRequest;

use super::protocol::{DaemonStatus, Outbound, Payload, Request, RequestEnvelope};

/// Largest accepted frame
const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Outbound messages buffered per client
const CLIENT_QUEUE: usize = 64;

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    handle: VoiceHandle,
    started_at: Instant,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Create a new IPC server
    pub fn new(socket_path: &Path, handle: VoiceHandle) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            handle,
            started_at: Instant::now(),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let handle = self.handle.clone();
                    let started_at = self.started_at;
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, handle, started_at) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    ///
    /// Requests reach the service in the order their frames arrive; only the
    /// wait for each outcome runs concurrently.
    async fn handle_client(
        stream: UnixStream,
        handle: VoiceHandle,
        started_at: Instant,
    ) -> Result<()> {
        let (mut reader, writer) = stream.into_split();
        let (out_tx, out_rx) = mpsc::channel::<Outbound>(CLIENT_QUEUE);
        let writer_task = tokio::spawn(Self::write_messages(writer, out_rx));
        let mut subscription: Option<JoinHandle<()>> = None;

        let result = loop {
            let msg_buf = match read_frame(&mut reader).await {
                Ok(Some(buf)) => buf,
                Ok(None) => {
                    debug!("client finished sending");
                    break Ok(());
                }
                Err(e) => break Err(e),
            };

            let envelope: RequestEnvelope = match serde_json::from_slice(&msg_buf) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(?e, "failed to parse request");
                    let _ = out_tx.send(Outbound::bad_request(e.to_string())).await;
                    continue;
                }
            };

            debug!(?envelope, "received request");
            let RequestEnvelope { id, request } = envelope;

            // Subscribe before answering so no notification after the reply is missed
            if request == Request::Subscribe && subscription.is_none() {
                debug!("client subscribed to notifications");
                subscription = Some(tokio::spawn(Self::forward_notifications(
                    handle.subscribe(),
                    out_tx.clone(),
                )));
            }

            match Self::dispatch(request, &handle).await {
                InFlight::Done(result) => {
                    let _ = out_tx.send(complete(id, result)).await;
                }
                in_flight => {
                    let out_tx = out_tx.clone();
                    tokio::spawn(async move {
                        let result = in_flight.finish(started_at).await;
                        let _ = out_tx.send(complete(id, result)).await;
                    });
                }
            }
        };

        if let Some(subscription) = subscription {
            subscription.abort();
        }

        // Replies still in flight hold their own senders; the writer drains
        // them and stops once the last one is gone
        drop(out_tx);
        if let Err(e) = writer_task.await {
            debug!(?e, "client writer ended abnormally");
        }

        result
    }

    /// Drain the client's outbound queue onto the socket
    async fn write_messages(mut writer: OwnedWriteHalf, mut out_rx: mpsc::Receiver<Outbound>) {
        while let Some(message) = out_rx.recv().await {
            if let Err(e) = write_frame(&mut writer, &message).await {
                debug!(?e, "failed to write to client");
                break;
            }
        }
    }

    /// Relay notifications until the client goes away
    async fn forward_notifications(
        mut events: broadcast::Receiver<Notification>,
        out_tx: mpsc::Sender<Outbound>,
    ) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if out_tx.send(Outbound::Notify(event)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "notification subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Hand a request to the service, returning what is left to wait for
    async fn dispatch(request: Request, handle: &VoiceHandle) -> InFlight {
        match request {
            Request::CheckPermissions => InFlight::Done(Ok(Payload::Permission {
                granted: handle.check_permissions().is_granted(),
            })),

            // Awaited in order so a following start sees the new permission
            Request::RequestPermissions => InFlight::Done(Ok(Payload::Permission {
                granted: handle.request_permissions().await,
            })),

            Request::Available => InFlight::Done(Ok(Payload::Availability {
                available: handle.available(),
            })),

            Request::StartListening {
                language,
                partial_results,
            } => queued(
                handle
                    .queue_start_listening(ListenOptions {
                        language,
                        partial_results,
                    })
                    .await,
                InFlight::Matches,
            ),

            Request::StopListening => match handle.queue_stop_listening().await {
                Ok(reply) => InFlight::Stopped(reply),
                Err(_) => InFlight::Done(Ok(Payload::Empty {})),
            },

            Request::Speak { text, lang } => queued(
                handle
                    .queue_speak(SpeechRequest {
                        text,
                        language: lang,
                    })
                    .await,
                InFlight::Spoken,
            ),

            Request::GetStatus => queued(handle.queue_status().await, InFlight::Status),

            Request::Ping | Request::Subscribe => InFlight::Done(Ok(Payload::Empty {})),
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// A request handed to the service whose outcome is still outstanding
enum InFlight {
    Done(Result<Payload, VoiceError>),
    Matches(Reply<Vec<String>>),
    Spoken(Reply<()>),
    Stopped(Reply<()>),
    Status(Reply<ServiceStatus>),
}

impl InFlight {
    async fn finish(self, started_at: Instant) -> Result<Payload, VoiceError> {
        match self {
            InFlight::Done(result) => result,
            InFlight::Matches(reply) => outcome(reply)
                .await
                .map(|matches| Payload::Matches { matches }),
            InFlight::Spoken(reply) => outcome(reply).await.map(|()| Payload::Empty {}),
            // Stopping always succeeds, even if the service went away meanwhile
            InFlight::Stopped(reply) => {
                let _ = outcome(reply).await;
                Ok(Payload::Empty {})
            }
            InFlight::Status(reply) => outcome(reply).await.map(|service| {
                Payload::Status(DaemonStatus::new(started_at.elapsed().as_secs(), service))
            }),
        }
    }
}

fn queued<T>(
    queued: Result<Reply<T>, VoiceError>,
    wait: fn(Reply<T>) -> InFlight,
) -> InFlight {
    match queued {
        Ok(reply) => wait(reply),
        Err(e) => InFlight::Done(Err(e)),
    }
}

/// The message completing request `id`
fn complete(id: u64, result: Result<Payload, VoiceError>) -> Outbound {
    match result {
        Ok(data) => Outbound::Resolve { id, data },
        Err(e) => {
            debug!(id, error = %e, "request rejected");
            Outbound::reject(id, &e)
        }
    }
}

/// Read one length-prefixed frame; `None` on a clean disconnect
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        anyhow::bail!("message too large ({len} bytes)");
    }

    let mut msg_buf = vec![0u8; len];
    reader.read_exact(&mut msg_buf).await?;
    Ok(Some(msg_buf))
}

/// Send a length-prefixed JSON message
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;

    Ok(())
}
