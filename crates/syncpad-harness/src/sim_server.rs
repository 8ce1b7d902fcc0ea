//! Turmoil-backed server for simulated-network tests.
//!
//! [`SimServer`] runs the real [`ServerDriver`] behind turmoil's
//! deterministic TCP: real framing, real partial reads, simulated
//! partitions and latency. Tests that only need protocol semantics should
//! prefer [`crate::TestCluster`]; this exists to exercise the wire.

use std::{collections::HashMap, io, sync::Arc};

use bytes::BytesMut;
use syncpad_proto::{Frame, FrameHeader};
use syncpad_server::{LogLevel, ServerAction, ServerConfig, ServerDriver, ServerEvent};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf},
    sync::{Mutex, Notify, RwLock, mpsc},
};
use turmoil::net::{TcpListener, TcpStream};

use crate::SimEnv;

/// Outbound frame queue depth per simulated connection.
const WRITE_QUEUE_DEPTH: usize = 64;

/// Handles to one simulated connection's tasks.
struct ConnectionHandle {
    frames: mpsc::Sender<Frame>,
    shutdown: Arc<Notify>,
}

type Connections = Arc<RwLock<HashMap<u64, ConnectionHandle>>>;

/// Read one frame from any reliable byte stream.
///
/// # Errors
///
/// Returns an I/O error if the stream dies mid-frame or carries invalid
/// framing.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Frame> {
    let mut buf = BytesMut::with_capacity(4096);

    buf.resize(FrameHeader::SIZE, 0);
    reader.read_exact(&mut buf[..FrameHeader::SIZE]).await?;

    let payload_size = FrameHeader::from_bytes(&buf[..FrameHeader::SIZE])
        .map_err(io::Error::other)?
        .payload_size() as usize;

    if payload_size > 0 {
        buf.resize(FrameHeader::SIZE + payload_size, 0);
        reader.read_exact(&mut buf[FrameHeader::SIZE..]).await?;
    }

    Frame::decode(&buf).map_err(io::Error::other)
}

/// Write one frame to any reliable byte stream.
///
/// # Errors
///
/// Returns an I/O error if encoding fails or the stream rejects the write.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> io::Result<()> {
    let mut buf = Vec::new();
    frame.encode(&mut buf).map_err(io::Error::other)?;
    writer.write_all(&buf).await
}

/// Real server driver behind turmoil TCP.
pub struct SimServer {
    driver: Arc<Mutex<ServerDriver<SimEnv>>>,
    listener: TcpListener,
    connections: Connections,
    next_session_id: u64,
}

impl SimServer {
    /// Bind with the default server configuration.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if binding fails.
    pub async fn bind(address: &str) -> io::Result<Self> {
        Self::bind_with_config(address, ServerConfig::default()).await
    }

    /// Bind with a custom server configuration.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if binding fails.
    pub async fn bind_with_config(address: &str, config: ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        let driver = Arc::new(Mutex::new(ServerDriver::new(SimEnv::new(), config)));

        Ok(Self {
            driver,
            listener,
            connections: Arc::new(RwLock::new(HashMap::new())),
            next_session_id: 1,
        })
    }

    /// Accept and serve connections until the host is shut down.
    ///
    /// Session ids are handed out sequentially so test assertions are
    /// stable across runs.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if accepting fails.
    pub async fn run(mut self) -> io::Result<()> {
        loop {
            let (stream, _peer) = self.listener.accept().await?;

            let session_id = self.next_session_id;
            self.next_session_id += 1;

            let driver = Arc::clone(&self.driver);
            let connections = Arc::clone(&self.connections);
            tokio::spawn(async move {
                serve_connection(stream, session_id, driver, connections).await;
            });
        }
    }
}

/// Serve one simulated connection, mirroring the production runtime.
async fn serve_connection(
    stream: TcpStream,
    session_id: u64,
    driver: Arc<Mutex<ServerDriver<SimEnv>>>,
    connections: Connections,
) {
    let (mut read_half, mut write_half) = tokio::io::split(stream);

    let (frames_tx, mut frames_rx) = mpsc::channel::<Frame>(WRITE_QUEUE_DEPTH);
    let shutdown = Arc::new(Notify::new());
    connections
        .write()
        .await
        .insert(session_id, ConnectionHandle { frames: frames_tx, shutdown: Arc::clone(&shutdown) });

    let write_task = tokio::spawn(async move {
        while let Some(frame) = frames_rx.recv().await {
            if write_frame(&mut write_half, &frame).await.is_err() {
                break;
            }
        }
    });

    let accepted = {
        let mut driver = driver.lock().await;
        driver.process_event(ServerEvent::ConnectionAccepted { session_id })
    };
    if let Ok(actions) = accepted {
        execute_actions(&driver, actions, &connections).await;
    }

    let close_reason = tokio::select! {
        reason = read_loop(&mut read_half, session_id, &driver, &connections) => reason,
        () = shutdown.notified() => "closed by server".to_string(),
    };

    // Both stream halves drop here, so the peer observes a clean close.
    connections.write().await.remove(&session_id);
    write_task.abort();

    let closed = {
        let mut driver = driver.lock().await;
        driver.process_event(ServerEvent::ConnectionClosed { session_id, reason: close_reason })
    };
    if let Ok(actions) = closed {
        execute_actions(&driver, actions, &connections).await;
    }
}

/// Pump frames from one peer into the driver until the stream dies.
async fn read_loop(
    read_half: &mut ReadHalf<TcpStream>,
    session_id: u64,
    driver: &Arc<Mutex<ServerDriver<SimEnv>>>,
    connections: &Connections,
) -> String {
    loop {
        match read_frame(read_half).await {
            Ok(frame) => {
                let result = {
                    let mut driver = driver.lock().await;
                    driver.process_event(ServerEvent::FrameReceived { session_id, frame })
                };
                if let Ok(actions) = result {
                    execute_actions(driver, actions, connections).await;
                }
            },
            Err(e) => return format!("stream ended: {e}"),
        }
    }
}

async fn execute_actions(
    driver: &Arc<Mutex<ServerDriver<SimEnv>>>,
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

            ServerAction::CloseConnection { session_id, .. } => {
                let connections = connections.read().await;
                if let Some(handle) = connections.get(&session_id) {
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
    if let Some(handle) = connections.get(&session_id)
        && handle.frames.try_send(frame).is_err()
    {
        tracing::debug!(session_id, "dropping frame: write queue full or closed");
    }
}
