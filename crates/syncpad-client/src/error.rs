//! Client-side error types.

use thiserror::Error;

/// Errors surfaced synchronously by [`crate::SessionController`].
///
/// Only local validation failures become errors. Transport loss and server
/// misbehavior are reported through [`crate::SessionNotice`] values and log
/// actions instead, so a broken network can never unwind the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Join rejected before any network activity: the room id was empty.
    #[error("room id must not be empty")]
    EmptyRoomId,

    /// Join rejected before any network activity: the username was empty.
    #[error("username must not be empty")]
    EmptyUsername,
}
