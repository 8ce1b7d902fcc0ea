//! Event and action types for the session controller.
//!
//! The controller consumes [`SessionEvent`]s (user intent plus transport
//! signals forwarded by the driver) and emits [`SessionAction`]s describing
//! the I/O and UI effects to perform. The controller itself performs no I/O.

use syncpad_proto::{Frame, RoomSummary};

/// Input to [`crate::SessionController::handle`].
///
/// Generic over the instant type `I` so tests and simulations can drive the
/// controller with a virtual clock. Defaults to [`std::time::Instant`] for
/// production use.
#[derive(Debug, Clone)]
pub enum SessionEvent<I = std::time::Instant> {
    /// User submitted the join form.
    ///
    /// Both fields are validated before anything touches the network; an
    /// empty room id or username fails synchronously.
    Join {
        /// Identifier of the room to join.
        room_id: String,
        /// Display name to register under.
        username: String,
    },

    /// User replaced the local buffer with new content.
    ///
    /// Applied locally first, then broadcast on a best-effort basis. A dead
    /// channel drops the broadcast without blocking the local edit.
    SubmitEdit {
        /// Full buffer content after the edit.
        content: String,
    },

    /// User left the room. Idempotent.
    Leave,

    /// User asked for a fresh directory snapshot.
    ///
    /// Best-effort like edits: dropped with a log when no channel is up.
    RefreshDirectory,

    /// The driver's dial attempt produced a live transport stream.
    DialSucceeded {
        /// Time the stream came up.
        now: I,
    },

    /// The driver's dial attempt failed before a stream existed.
    DialFailed {
        /// Time the failure was observed.
        now: I,
    },

    /// A complete frame arrived from the server.
    FrameReceived {
        /// The decoded frame.
        frame: Frame,
        /// Time the frame arrived.
        now: I,
    },

    /// The live transport stream dropped.
    TransportClosed {
        /// Time the drop was observed.
        now: I,
    },

    /// Periodic timer tick driving retry backoff and keepalives.
    Tick {
        /// Current time.
        now: I,
    },
}

/// Output of [`crate::SessionController::handle`].
///
/// The caller (driver, test harness, or simulation) executes these in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Establish a transport stream to the server.
    Dial,

    /// Send a frame on the live stream.
    SendFrame(Frame),

    /// Tear the transport stream down.
    CloseTransport,

    /// Replace the editor buffer with content from another member.
    ///
    /// Unconditional: the controller has already overwritten its own copy,
    /// and any unsent local edit is gone. Last write wins.
    ApplyRemoteEdit {
        /// Full buffer content to display.
        content: String,
    },

    /// Replace the displayed member list.
    ///
    /// The server's list is authoritative; nothing is merged.
    MembersChanged {
        /// Current members, in server order.
        members: Vec<String>,
    },

    /// The join completed: the server acknowledged this client as a member.
    ///
    /// Emitted exactly once per join, on the first membership push. Drivers
    /// persist the visit and the username when they see this.
    RoomJoined {
        /// Identifier of the room that became live.
        room_id: String,
    },

    /// A fresh directory snapshot arrived from the server.
    DirectorySnapshot {
        /// Advisory summaries of active rooms.
        rooms: Vec<RoomSummary>,
    },

    /// User-facing notification.
    Notify(SessionNotice),

    /// Log message for debugging.
    Log {
        /// Human-readable description.
        message: String,
    },
}

/// User-facing notifications emitted by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// The channel to the server is live.
    Connected,

    /// The channel dropped; automatic recovery is running.
    ConnectionLost,

    /// A reconnect attempt has been scheduled.
    Reconnecting {
        /// 1-based attempt number within the current recovery.
        attempt: u32,
    },

    /// The retry budget ran out. Emitted exactly once per exhaustion; the
    /// user must rejoin manually.
    RetriesExhausted,

    /// Another member joined the room. Never emitted for the local user,
    /// and never emitted when members leave.
    UserJoined {
        /// Display name of the new member.
        username: String,
    },
}

/// Live state of one joined room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSession {
    /// Room identifier. Immutable for the session's life.
    pub room_id: String,

    /// Name this client registered under. Immutable for the session's life.
    pub local_user: String,

    /// Server-authoritative member list, replaced wholesale on every push.
    pub members: Vec<String>,

    /// Shared text buffer. Last write wins, local or remote.
    pub buffer: String,

    /// No membership push has confirmed the join yet.
    pub pending_join: bool,
}

impl RoomSession {
    /// Start a session for `room_id` as `local_user`.
    ///
    /// Begins with an empty buffer and no members; the first membership push
    /// confirms the join and fills the roster.
    #[must_use]
    pub fn new(room_id: String, local_user: String) -> Self {
        Self { room_id, local_user, members: Vec::new(), buffer: String::new(), pending_join: true }
    }
}
