//! Tunnel dispatcher.
//!
//! Receives queries on the shared UDP socket, routes them by session key, and
//! creates a session (and its backend connection) the first time a key is
//! seen. Sessions answer on the same socket.
//!
//! Backend connects run on their own tasks. Queries for a key whose connect
//! is in flight are queued and delivered once the session exists, so the
//! receive loop never waits on a backend.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use lru::LruCache;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::config::TunnelConfig;

use super::request::{RoutedRequest, TunnelRequest, parse_request};
use super::session::{SessionExit, SessionHandle, create_session};
use super::sink::ResponseSink;

const MAX_UDP_PACKET_SIZE: usize = 65536;

/// Bound on establishing a backend connection for a new session.
const BACKEND_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Ended keys remembered per session slot.
const TOMBSTONES_PER_SESSION: usize = 4;

/// Result of a backend connect started for `key`.
struct OpenedSession {
    key: String,
    result: io::Result<SessionHandle>,
}

pub struct Dispatcher {
    config: Arc<TunnelConfig>,
    socket: Arc<UdpSocket>,
    sink: Arc<dyn ResponseSink>,
    /// Live sessions keyed by routing key.
    sessions: LruCache<String, SessionHandle>,
    /// Keys whose session has ended; queries for them are dropped.
    ended: LruCache<String, ()>,
    /// Keys with a backend connect in flight, and the queries waiting on it.
    connecting: HashMap<String, Vec<TunnelRequest>>,
    exit_tx: mpsc::UnboundedSender<SessionExit>,
    exit_rx: mpsc::UnboundedReceiver<SessionExit>,
    opened_tx: mpsc::UnboundedSender<OpenedSession>,
    opened_rx: mpsc::UnboundedReceiver<OpenedSession>,
}

impl Dispatcher {
    pub fn new(config: Arc<TunnelConfig>, socket: Arc<UdpSocket>) -> Self {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        let (opened_tx, opened_rx) = mpsc::unbounded_channel();
        let max_sessions = NonZeroUsize::new(config.max_sessions).unwrap_or(NonZeroUsize::MIN);
        let max_ended = max_sessions.saturating_mul(
            NonZeroUsize::new(TOMBSTONES_PER_SESSION).unwrap_or(NonZeroUsize::MIN),
        );
        let sink: Arc<dyn ResponseSink> = socket.clone();

        Self {
            config,
            socket,
            sink,
            sessions: LruCache::new(max_sessions),
            ended: LruCache::new(max_ended),
            connecting: HashMap::new(),
            exit_tx,
            exit_rx,
            opened_tx,
            opened_rx,
        }
    }

    /// Run the dispatcher until the socket fails.
    pub async fn run(mut self) -> io::Result<()> {
        info!(
            "[Dispatcher] Serving {} on {}, backend {}",
            self.config.domain, self.config.bind_location, self.config.backend
        );

        let mut buf = vec![0u8; MAX_UDP_PACKET_SIZE];

        loop {
            tokio::select! {
                biased;

                Some(exit) = self.exit_rx.recv() => {
                    self.on_session_exit(exit);
                }

                Some(opened) = self.opened_rx.recv() => {
                    self.on_session_opened(opened);
                }

                result = self.socket.recv_from(&mut buf) => {
                    let (len, client) = match result {
                        Ok(v) => v,
                        Err(e) => {
                            // ICMP port unreachable from a previous reply surfaces here.
                            if e.kind() == io::ErrorKind::ConnectionReset {
                                debug!("[Dispatcher] Ignoring recv error: {}", e);
                                continue;
                            }
                            return Err(e);
                        }
                    };
                    self.handle_packet(&buf[..len], client);
                }
            }
        }
    }

    fn handle_packet(&mut self, packet: &[u8], client: SocketAddr) {
        let RoutedRequest { key, request } =
            match parse_request(packet, client, &self.config.domain) {
                Ok(routed) => routed,
                Err(e) => {
                    debug!("[Dispatcher] Dropping query from {}: {}", client, e);
                    return;
                }
            };

        if self.ended.contains(&key) {
            debug!("[Dispatcher] Dropping query for ended session {}", key);
            return;
        }

        if let Some(queued) = self.connecting.get_mut(&key) {
            if queued.len() < self.config.session.queue_size {
                queued.push(request);
            } else {
                debug!("[Dispatcher] Dropping query for connecting session {}", key);
            }
            return;
        }

        match self.sessions.get(&key) {
            Some(session) if !session.is_alive() => {
                // Its exit notice is already queued.
                debug!("[Dispatcher] Dropping query for finished session {}", key);
            }
            Some(session) => {
                if let Err(e) = session.deliver(request) {
                    debug!("[Dispatcher] Dropping query for session {}: {}", key, e);
                }
            }
            None => self.start_session(key, request),
        }
    }

    /// Starts connecting a session for `key` on its own task.
    fn start_session(&mut self, key: String, request: TunnelRequest) {
        if self.connecting.len() >= self.config.max_sessions {
            warn!(
                "[Dispatcher] Too many sessions connecting, dropping query for {}",
                key
            );
            return;
        }

        debug!("[Dispatcher] Creating session {}", key);
        self.connecting.insert(key.clone(), vec![request]);

        let backend = self.config.backend.clone();
        let session_config = self.config.session;
        let sink = self.sink.clone();
        let exit_tx = self.exit_tx.clone();
        let opened_tx = self.opened_tx.clone();
        tokio::spawn(async move {
            let result = timeout(
                BACKEND_CONNECT_TIMEOUT,
                create_session(key.clone(), &backend, session_config, sink, exit_tx),
            )
            .await
            .unwrap_or_else(|elapsed| {
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("backend connect timed out: {elapsed}"),
                ))
            });
            let _ = opened_tx.send(OpenedSession { key, result });
        });
    }

    fn on_session_opened(&mut self, opened: OpenedSession) {
        let OpenedSession { key, result } = opened;
        let queued = self.connecting.remove(&key).unwrap_or_default();

        let session = match result {
            Ok(session) => session,
            Err(e) => {
                warn!(
                    "[Dispatcher] Failed to create session {} to {}: {}",
                    key, self.config.backend, e
                );
                return;
            }
        };

        if self.ended.contains(&key) {
            // The session ended before its handle got here.
            debug!("[Dispatcher] Session {} ended while connecting", key);
            return;
        }

        for request in queued {
            if let Err(e) = session.deliver(request) {
                debug!("[Dispatcher] Dropping query for session {}: {}", key, e);
            }
        }

        if let Some((evicted_key, _evicted)) = self.sessions.push(key.clone(), session)
            && evicted_key != key
        {
            // Dropping the evicted handle detaches its session.
            warn!(
                "[Dispatcher] Session limit reached, evicting session {}",
                evicted_key
            );
            self.ended.put(evicted_key, ());
        }
    }

    fn on_session_exit(&mut self, exit: SessionExit) {
        info!("[Dispatcher] Session {} ended: {}", exit.key, exit.reason);
        self.sessions.pop(&exit.key);
        self.ended.put(exit.key, ());
    }
}
