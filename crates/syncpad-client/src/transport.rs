//! TCP transport for the client.
//!
//! Provides [`ConnectedClient`] which handles socket I/O for frame
//! transport. This is a thin layer that just sends/receives frames -
//! protocol logic remains in the sans-IO [`crate::SessionController`].

use std::net::SocketAddr;

use bytes::BytesMut;
use syncpad_proto::{Frame, FrameHeader};
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::mpsc,
};

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Stream error.
    #[error("stream error: {0}")]
    Stream(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Handle to a connected client transport.
///
/// Provides channels for frame transport. Frames are sent/received via the
/// channels, and an internal task handles the socket I/O. Dropping the
/// receiver side of `from_server` (or observing `None` from it) means the
/// stream is gone.
pub struct ConnectedClient {
    /// Send frames to the server.
    pub to_server: mpsc::Sender<Frame>,
    /// Receive frames from the server.
    pub from_server: mpsc::Receiver<Frame>,
    /// Abort handle to stop the connection task.
    abort_handle: tokio::task::AbortHandle,
}

impl ConnectedClient {
    /// Stop the connection.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

/// Connect to a Syncpad server over TCP.
///
/// Returns a [`ConnectedClient`] with channels for frame transport.
///
/// # Errors
///
/// Returns [`TransportError::Connection`] if the address is invalid or the
/// socket cannot be established.
pub async fn connect(server_addr: &str) -> Result<ConnectedClient, TransportError> {
    let addr: SocketAddr = server_addr
        .parse()
        .map_err(|e| TransportError::Connection(format!("invalid address: {e}")))?;

    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| TransportError::Connection(format!("connect failed: {e}")))?;

    // Edits are single keystrokes away; latency matters more than batching.
    stream
        .set_nodelay(true)
        .map_err(|e| TransportError::Connection(format!("socket setup failed: {e}")))?;

    let (read_half, write_half) = stream.into_split();

    let (to_server_tx, to_server_rx) = mpsc::channel::<Frame>(32);
    let (from_server_tx, from_server_rx) = mpsc::channel::<Frame>(32);

    let handle = tokio::spawn(run_connection(read_half, write_half, to_server_rx, from_server_tx));

    Ok(ConnectedClient {
        to_server: to_server_tx,
        from_server: from_server_rx,
        abort_handle: handle.abort_handle(),
    })
}

/// Run the connection, bridging between channels and the socket.
async fn run_connection(
    read_half: OwnedReadHalf,
    mut write_half: OwnedWriteHalf,
    mut to_server: mpsc::Receiver<Frame>,
    from_server: mpsc::Sender<Frame>,
) {
    // Reader task: closing `from_server` is how stream death reaches the
    // driver, so the task simply returns on any error.
    let recv_handle = tokio::spawn(async move {
        let mut read_half = read_half;
        loop {
            match read_frame(&mut read_half).await {
                Ok(frame) => {
                    if from_server.send(frame).await.is_err() {
                        break;
                    }
                },
                Err(e) => {
                    tracing::debug!(error = %e, "read loop ended");
                    break;
                },
            }
        }
    });

    // Main loop: send outgoing frames.
    while let Some(frame) = to_server.recv().await {
        if let Err(e) = send_frame(&mut write_half, &frame).await {
            tracing::debug!(error = %e, "write loop ended");
            break;
        }
    }

    recv_handle.abort();
}

/// Read one length-prefixed frame from the socket.
async fn read_frame(read_half: &mut OwnedReadHalf) -> Result<Frame, TransportError> {
    let mut buf = BytesMut::with_capacity(65536);

    // Read header
    buf.resize(FrameHeader::SIZE, 0);
    read_half
        .read_exact(&mut buf[..FrameHeader::SIZE])
        .await
        .map_err(|e| TransportError::Stream(format!("header read failed: {e}")))?;

    let header = FrameHeader::from_bytes(&buf[..FrameHeader::SIZE])
        .map_err(|e| TransportError::Protocol(format!("invalid header: {e}")))?;

    let payload_size = header.payload_size() as usize;

    // Read payload if present
    if payload_size > 0 {
        buf.resize(FrameHeader::SIZE + payload_size, 0);
        read_half
            .read_exact(&mut buf[FrameHeader::SIZE..])
            .await
            .map_err(|e| TransportError::Stream(format!("payload read failed: {e}")))?;
    }

    Frame::decode(&buf).map_err(|e| TransportError::Protocol(format!("frame decode failed: {e}")))
}

/// Send a frame on the socket.
async fn send_frame(
    write_half: &mut OwnedWriteHalf,
    frame: &Frame,
) -> Result<(), TransportError> {
    let mut buf = Vec::new();
    frame.encode(&mut buf).map_err(|e| TransportError::Protocol(format!("encode failed: {e}")))?;

    write_half
        .write_all(&buf)
        .await
        .map_err(|e| TransportError::Stream(format!("write failed: {e}")))?;

    Ok(())
}
