//! Connection error types.

use syncpad_proto::ProtocolError;
use thiserror::Error;

/// Errors produced by the connection manager.
///
/// Remote misbehavior (undecodable frames, unexpected opcodes) is absorbed
/// into log actions and state transitions rather than surfaced here; only
/// local failures become errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// A locally constructed payload could not be encoded into a frame.
    #[error("payload encoding failed: {0}")]
    Encode(#[from] ProtocolError),
}
