//! Syncpad room registry server.
//!
//! Authoritative membership table and broadcast router for collaborative
//! text rooms. Clients join a room by id, and every edit is fanned out as a
//! full-buffer replacement to the other members.
//!
//! # Architecture
//!
//! The [`ServerDriver`] follows the sans-IO pattern shared with
//! [`syncpad_core`]: it consumes [`ServerEvent`]s and returns
//! [`ServerAction`]s, never touching sockets or clocks. [`Server`] is the
//! production runtime that executes those actions over tokio TCP, one
//! reader task and one writer task per connection.
//!
//! # Components
//!
//! - [`RoomRegistry`]: Membership table (sessions, rooms, activity)
//! - [`ServerDriver`]: Action-based orchestrator (pure logic, no I/O)
//! - [`Server`]: Tokio TCP runtime executing driver actions

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod driver;
mod error;
mod registry;

use std::{collections::HashMap, sync::Arc};

use bytes::BytesMut;
pub use driver::{LogLevel, ServerAction, ServerConfig, ServerDriver, ServerEvent};
pub use error::ServerError;
pub use registry::{JoinOutcome, RoomDeparture, RoomRegistry};
use syncpad_core::{Environment, SystemEnv};
use syncpad_proto::{Frame, FrameHeader};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, tcp::OwnedReadHalf},
    sync::{Mutex, Notify, RwLock, mpsc},
};

/// Outbound frame queue depth per connection.
///
/// A client that stops draining its socket gets its frames dropped rather
/// than stalling the broadcast path for the whole room.
const WRITE_QUEUE_DEPTH: usize = 64;

/// Runtime handle to one live connection.
#[derive(Clone)]
struct ConnectionHandle {
    /// Queue drained by the connection's writer task.
    frames: mpsc::Sender<Frame>,
    /// Signalled when the driver asks for the connection to close.
    shutdown: Arc<Notify>,
}

/// Per-session handles, shared by the accept loop and the executor.
type Connections = Arc<RwLock<HashMap<u64, ConnectionHandle>>>;

/// Production Syncpad server.
///
/// Wraps [`ServerDriver`] with a tokio TCP accept loop and per-connection
/// reader/writer tasks.
pub struct Server {
    driver: Arc<Mutex<ServerDriver<SystemEnv>>>,
    listener: TcpListener,
    config: ServerConfig,
    env: SystemEnv,
}

impl Server {
    /// Bind to `address` (`host:port`).
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] if the address cannot be bound.
    pub async fn bind(address: &str, config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| ServerError::Transport(format!("bind failed: {e}")))?;

        let env = SystemEnv::new();
        let driver = Arc::new(Mutex::new(ServerDriver::new(env.clone(), config.clone())));

        Ok(Self { driver, listener, config, env })
    }

    /// Local address the server is bound to.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] if the socket has no local
    /// address.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("local address unavailable: {e}")))
    }

    /// Accept connections and process frames until the task is aborted.
    ///
    /// # Errors
    ///
    /// This loop absorbs per-connection failures; it only returns if the
    /// listener itself is unusable.
    pub async fn run(self) -> Result<(), ServerError> {
        let connections: Connections = Arc::new(RwLock::new(HashMap::new()));

        {
            let driver = Arc::clone(&self.driver);
            let connections = Arc::clone(&connections);
            let sweep_interval = self.config.sweep_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(sweep_interval);
                loop {
                    ticker.tick().await;
                    let result = {
                        let mut driver = driver.lock().await;
                        driver.process_event(ServerEvent::Tick)
                    };
                    match result {
                        Ok(actions) => execute_actions(&driver, actions, &connections).await,
                        Err(e) => tracing::error!(error = %e, "tick processing failed"),
                    }
                }
            });
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let session_id = self.env.random_u64();
                    tracing::debug!(%peer, session_id, "connection accepted");

                    let driver = Arc::clone(&self.driver);
                    let connections = Arc::clone(&connections);
                    tokio::spawn(async move {
                        handle_connection(stream, session_id, driver, connections).await;
                    });
                },
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                },
            }
        }
    }
}

/// Serve one connection: register it, pump frames, and clean up.
async fn handle_connection(
    stream: TcpStream,
    session_id: u64,
    driver: Arc<Mutex<ServerDriver<SystemEnv>>>,
    connections: Connections,
) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(session_id, error = %e, "nodelay setup failed");
    }

    let (read_half, mut write_half) = stream.into_split();

    let (frames_tx, mut frames_rx) = mpsc::channel::<Frame>(WRITE_QUEUE_DEPTH);
    let shutdown = Arc::new(Notify::new());
    connections
        .write()
        .await
        .insert(session_id, ConnectionHandle { frames: frames_tx, shutdown: Arc::clone(&shutdown) });

    let write_task = tokio::spawn(async move {
        while let Some(frame) = frames_rx.recv().await {
            let mut buf = Vec::new();
            if frame.encode(&mut buf).is_err() {
                continue;
            }
            if write_half.write_all(&buf).await.is_err() {
                break;
            }
        }
    });

    let accept_result = {
        let mut driver = driver.lock().await;
        driver.process_event(ServerEvent::ConnectionAccepted { session_id })
    };
    match accept_result {
        Ok(actions) => execute_actions(&driver, actions, &connections).await,
        Err(e) => {
            tracing::error!(session_id, error = %e, "accept processing failed");
            connections.write().await.remove(&session_id);
            write_task.abort();
            return;
        },
    }

    let close_reason = tokio::select! {
        reason = read_loop(read_half, session_id, &driver, &connections) => reason,
        () = shutdown.notified() => "closed by server".to_string(),
    };

    connections.write().await.remove(&session_id);
    write_task.abort();

    let closed_result = {
        let mut driver = driver.lock().await;
        driver.process_event(ServerEvent::ConnectionClosed { session_id, reason: close_reason })
    };
    match closed_result {
        Ok(actions) => execute_actions(&driver, actions, &connections).await,
        Err(e) => tracing::debug!(session_id, error = %e, "close processing failed"),
    }
}

/// Read frames until the stream dies or the peer violates framing.
///
/// Returns the close reason. Framing-level garbage (bad magic, oversized
/// payloads) terminates the connection; payload-level garbage is the
/// driver's log-and-drop concern.
async fn read_loop(
    mut read_half: OwnedReadHalf,
    session_id: u64,
    driver: &Arc<Mutex<ServerDriver<SystemEnv>>>,
    connections: &Connections,
) -> String {
    let mut buf = BytesMut::with_capacity(65536);

    loop {
        buf.clear();
        buf.resize(FrameHeader::SIZE, 0);
        if let Err(e) = read_half.read_exact(&mut buf[..FrameHeader::SIZE]).await {
            return format!("read failed: {e}");
        }

        let payload_size = match FrameHeader::from_bytes(&buf[..FrameHeader::SIZE]) {
            Ok(header) => header.payload_size() as usize,
            Err(e) => return format!("invalid frame header: {e}"),
        };

        if payload_size > 0 {
            buf.resize(FrameHeader::SIZE + payload_size, 0);
            if let Err(e) = read_half.read_exact(&mut buf[FrameHeader::SIZE..]).await {
                return format!("payload read failed: {e}");
            }
        }

        let frame = match Frame::decode(&buf) {
            Ok(frame) => frame,
            Err(e) => return format!("frame decode failed: {e}"),
        };

        let result = {
            let mut driver = driver.lock().await;
            driver.process_event(ServerEvent::FrameReceived { session_id, frame })
        };
        match result {
            Ok(actions) => execute_actions(driver, actions, connections).await,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "frame processing failed");
            },
        }
    }
}

/// Execute driver actions over the per-session connection handles.
async fn execute_actions(
    driver: &Arc<Mutex<ServerDriver<SystemEnv>>>,
    actions: Vec<ServerAction>,
    connections: &Connections,
) {
    for action in actions {
        match action {
            ServerAction::SendToSession { session_id, frame } => {
                send_frame(session_id, frame, connections).await;
            },

            ServerAction::BroadcastToRoom { room_id, frame, exclude_session } => {
                let sessions = {
                    let driver = driver.lock().await;
                    driver.sessions_in_room(&room_id)
                };
                for session_id in sessions {
                    if Some(session_id) != exclude_session {
                        send_frame(session_id, frame.clone(), connections).await;
                    }
                }
            },

            ServerAction::CloseConnection { session_id, reason } => {
                tracing::info!(session_id, reason, "closing connection");
                if let Some(handle) = connections.read().await.get(&session_id) {
                    handle.shutdown.notify_one();
                }
            },

            ServerAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{message}"),
                LogLevel::Info => tracing::info!("{message}"),
                LogLevel::Warn => tracing::warn!("{message}"),
                LogLevel::Error => tracing::error!("{message}"),
            },
        }
    }
}

async fn send_frame(session_id: u64, frame: Frame, connections: &Connections) {
    let connections = connections.read().await;
    let Some(handle) = connections.get(&session_id) else {
        tracing::debug!(session_id, "dropping frame: session gone");
        return;
    };

    if handle.frames.try_send(frame).is_err() {
        tracing::warn!(session_id, "dropping frame: write queue full or closed");
    }
}
