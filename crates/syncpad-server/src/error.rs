//! Server error types.

use std::fmt;

/// Errors that can occur while processing server events.
///
/// Peer misbehavior (undecodable payloads, frames before the handshake) is
/// handled with log-and-drop or a connection close, never an error: one bad
/// client must not disturb the event loop. These variants cover runtime
/// bookkeeping going wrong instead.
#[derive(Debug)]
pub enum ServerError {
    /// A frame or close event referenced a session the registry does not
    /// know. Usually a race between a disconnect and in-flight frames;
    /// transient.
    SessionNotFound(u64),

    /// The runtime handed out a session id that is already registered.
    /// Session ids are minted from 64 random bits, so this indicates a bug.
    SessionAlreadyExists(u64),

    /// A locally constructed reply could not be encoded into a frame.
    Protocol(String),

    /// Transport-level failure in the runtime (bind, accept, socket I/O).
    Transport(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionNotFound(id) => write!(f, "session not found: {id}"),
            Self::SessionAlreadyExists(id) => write!(f, "session already exists: {id}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<syncpad_proto::ProtocolError> for ServerError {
    fn from(err: syncpad_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
