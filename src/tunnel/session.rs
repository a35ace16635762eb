//! Tunnel session actor.
//!
//! A session owns one backend TCP connection and is driven by a single task.
//! Client requests arrive over a channel; backend reads, request handling and
//! the idle timer are multiplexed with `tokio::select!`, so exactly one event
//! is processed at a time and session state is never shared.
//!
//! Backend reads are gated: one read is allowed, then the next is only
//! re-armed by a client poll. This keeps the pending downlink bounded by what
//! the backend sends between two polls.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use hickory_proto::op::ResponseCode;
use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};

use crate::address::NetLocation;
use crate::config::SessionConfig;

use super::answer::{AnswerData, AnswerKind};
use super::downlink::next_chunk;
use super::pending::PendingDownlink;
use super::request::TunnelRequest;
use super::response::{build_answer, build_rejection};
use super::sink::ResponseSink;
use super::uplink::{ack, advance_total, decode_payload};

/// Size of a single backend read.
const BACKEND_READ_SIZE: usize = 16 * 1024;

pub trait BackendStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> BackendStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEndReason {
    /// The backend closed its end of the connection.
    BackendClosed,
    /// No event arrived within the idle timeout.
    IdleTimeout,
    /// Reading from or writing to the backend failed.
    BackendError(String),
    /// Every handle to the session was dropped.
    Detached,
}

impl SessionEndReason {
    pub fn code(&self) -> &'static str {
        match self {
            SessionEndReason::BackendClosed => "backend-closed",
            SessionEndReason::IdleTimeout => "idle-timeout",
            SessionEndReason::BackendError(_) => "backend-error",
            SessionEndReason::Detached => "detached",
        }
    }
}

impl fmt::Display for SessionEndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEndReason::BackendError(detail) => write!(f, "{}: {}", self.code(), detail),
            _ => write!(f, "{}", self.code()),
        }
    }
}

/// Sent exactly once when a session task finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionExit {
    pub key: String,
    pub reason: SessionEndReason,
}

/// Handle used by the dispatcher to feed a running session.
///
/// Dropping the handle stops the session once its queued requests are
/// handled; it still reports [`SessionEndReason::Detached`].
pub struct SessionHandle {
    key: String,
    tx: mpsc::Sender<TunnelRequest>,
    join_handle: JoinHandle<()>,
}

impl SessionHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Queues a request without waiting. The response is sent by the session.
    pub fn deliver(&self, request: TunnelRequest) -> std::io::Result<()> {
        self.tx.try_send(request).map_err(|e| match e {
            TrySendError::Full(_) => std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                format!("session {} queue is full", self.key),
            ),
            TrySendError::Closed(_) => std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                format!("session {} has ended", self.key),
            ),
        })
    }

    pub fn is_alive(&self) -> bool {
        !self.join_handle.is_finished()
    }
}

/// Connects to `backend` and starts a session on the new connection.
///
/// Fails without creating a session if no backend address accepts.
pub async fn create_session(
    key: String,
    backend: &NetLocation,
    config: SessionConfig,
    sink: Arc<dyn ResponseSink>,
    exit_tx: mpsc::UnboundedSender<SessionExit>,
) -> std::io::Result<SessionHandle> {
    let mut last_error = None;
    for addr in backend.resolve().await? {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                debug!("[Session {key}] Connected to backend {backend} ({addr})");
                return Ok(spawn_session(key, Box::new(stream), config, sink, exit_tx));
            }
            Err(e) => {
                debug!("[Session {key}] Failed to connect to {addr}: {e}");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no address for backend {backend}"),
        )
    }))
}

/// Starts a session on an already established backend connection.
pub fn spawn_session(
    key: String,
    backend: Box<dyn BackendStream>,
    config: SessionConfig,
    sink: Arc<dyn ResponseSink>,
    exit_tx: mpsc::UnboundedSender<SessionExit>,
) -> SessionHandle {
    let (tx, rx) = mpsc::channel(config.queue_size);
    let session = Session::new(key.clone(), backend, config, sink);

    let task_key = key.clone();
    let join_handle = tokio::spawn(async move {
        let reason = session.run(rx).await;
        let _ = exit_tx.send(SessionExit {
            key: task_key,
            reason,
        });
    });

    SessionHandle {
        key,
        tx,
        join_handle,
    }
}

/// What a handled request is answered with.
enum Reply {
    Answer(AnswerData),
    Reject(ResponseCode),
}

struct Session {
    key: String,
    reader: ReadHalf<Box<dyn BackendStream>>,
    writer: WriteHalf<Box<dyn BackendStream>>,
    sink: Arc<dyn ResponseSink>,
    config: SessionConfig,
    /// Uplink bytes written to the backend, modulo 2^32.
    bytes_sent_total: u32,
    pending: PendingDownlink,
    read_armed: bool,
}

impl Session {
    fn new(
        key: String,
        backend: Box<dyn BackendStream>,
        config: SessionConfig,
        sink: Arc<dyn ResponseSink>,
    ) -> Self {
        let (reader, writer) = tokio::io::split(backend);
        Self {
            key,
            reader,
            writer,
            sink,
            config,
            bytes_sent_total: 0,
            pending: PendingDownlink::new(),
            read_armed: true,
        }
    }

    async fn run(mut self, mut requests: mpsc::Receiver<TunnelRequest>) -> SessionEndReason {
        debug!("[Session {}] Starting", self.key);

        let mut read_buf = vec![0u8; BACKEND_READ_SIZE];
        let idle = sleep(self.config.idle_timeout);
        tokio::pin!(idle);

        let reason = loop {
            tokio::select! {
                biased;

                // Armed at most once per poll.
                result = self.reader.read(&mut read_buf), if self.read_armed => {
                    match result {
                        Ok(0) => break SessionEndReason::BackendClosed,
                        Ok(n) => {
                            self.read_armed = false;
                            self.pending.push(&read_buf[..n]);
                            debug!(
                                "[Session {}] Backend sent {} bytes ({} pending)",
                                self.key,
                                n,
                                self.pending.len()
                            );
                        }
                        Err(e) => break SessionEndReason::BackendError(e.to_string()),
                    }
                }

                request = requests.recv() => {
                    let Some(request) = request else {
                        break SessionEndReason::Detached;
                    };
                    if let Err(e) = self.handle_request(request).await {
                        break SessionEndReason::BackendError(e.to_string());
                    }
                }

                _ = &mut idle => break SessionEndReason::IdleTimeout,
            }

            idle.as_mut().reset(Instant::now() + self.config.idle_timeout);
        };

        if self.pending.is_empty() {
            info!("[Session {}] Stopping: {}", self.key, reason);
        } else {
            info!(
                "[Session {}] Stopping: {} (dropping {} undelivered bytes)",
                self.key,
                reason,
                self.pending.len()
            );
        }
        reason
    }

    /// Handles one request and sends its response.
    ///
    /// Errors are backend faults and end the session.
    async fn handle_request(&mut self, request: TunnelRequest) -> std::io::Result<()> {
        let reply = match request.uplink.as_deref() {
            Some(encoded) => self.handle_uplink(request.kind, encoded).await?,
            None => self.handle_poll(request.kind),
        };

        let packet = match reply {
            Reply::Answer(data) => build_answer(&request.message, data),
            Reply::Reject(code) => build_rejection(&request.message, code),
        };

        match packet {
            Ok(packet) => self.send(&packet, request.client).await,
            Err(e) => error!("[Session {}] Failed to build response: {}", self.key, e),
        }
        Ok(())
    }

    async fn handle_uplink(&mut self, kind: AnswerKind, encoded: &str) -> std::io::Result<Reply> {
        let data = match decode_payload(encoded) {
            Ok(data) => data,
            Err(e) => {
                warn!("[Session {}] Rejecting uplink request: {}", self.key, e);
                return Ok(Reply::Reject(ResponseCode::FormErr));
            }
        };

        self.writer.write_all(&data).await?;
        self.writer.flush().await?;
        self.bytes_sent_total = advance_total(self.bytes_sent_total, data.len());

        debug!(
            "[Session {}] Wrote {} bytes to backend (total {})",
            self.key,
            data.len(),
            self.bytes_sent_total
        );
        Ok(Reply::Answer(ack(kind, self.bytes_sent_total)))
    }

    fn handle_poll(&mut self, kind: AnswerKind) -> Reply {
        self.read_armed = true;
        let before = self.pending.len();
        let data = next_chunk(kind, &mut self.pending, self.config.max_name_length);
        debug!(
            "[Session {}] {} poll drained {} bytes ({} pending)",
            self.key,
            kind,
            before - self.pending.len(),
            self.pending.len()
        );
        Reply::Answer(data)
    }

    async fn send(&mut self, packet: &[u8], client: SocketAddr) {
        if let Err(e) = self.sink.send_response(packet, client).await {
            warn!(
                "[Session {}] Failed to send response to {}: {}",
                self.key, client, e
            );
        }
    }
}
