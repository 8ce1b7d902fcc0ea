//! Connection events and actions.

use syncpad_proto::{Frame, Payload};

/// Events the caller feeds into the connection manager.
///
/// The caller is responsible for:
/// - Dialing the transport when a [`ConnectionAction::Dial`] is produced
/// - Receiving frames from the network
/// - Driving time forward via ticks
///
/// Generic over `I` (Instant type) to support both production
/// (`std::time::Instant`) and simulation environments.
#[derive(Debug, Clone)]
pub enum ConnectionEvent<I = std::time::Instant> {
    /// Application wants the channel open.
    ///
    /// Idempotent: ignored while a channel is already being established or
    /// active.
    Open,

    /// The transport dial produced a live byte stream.
    DialSucceeded {
        /// Current time from the environment.
        now: I,
    },

    /// The transport dial failed before a stream existed.
    DialFailed {
        /// Current time from the environment.
        now: I,
    },

    /// Frame received from the server.
    FrameReceived {
        /// The decoded frame.
        frame: Frame,
        /// Current time from the environment.
        now: I,
    },

    /// The live byte stream dropped (read error, EOF, reset).
    TransportClosed {
        /// Current time from the environment.
        now: I,
    },

    /// Application wants to send a payload to the server.
    ///
    /// Dropped with a log entry when the channel is not connected; nothing
    /// is queued for later delivery.
    Send {
        /// Payload to deliver.
        payload: Payload,
    },

    /// Time tick for backoff, handshake, and liveness processing.
    ///
    /// The caller should send ticks periodically to allow the connection to
    /// fire retries and detect dead channels.
    Tick {
        /// Current time from the environment.
        now: I,
    },

    /// Application wants the channel released.
    ///
    /// Terminal until a fresh `Open`.
    Close,
}

/// Status changes derived from connection state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionNotice {
    /// Handshake completed; application traffic may flow.
    Connected,

    /// A live channel dropped; automatic recovery starts next.
    ConnectionLost,

    /// A retry is scheduled.
    Reconnecting {
        /// Retry attempt number, starting at 1.
        attempt: u32,
    },

    /// The retry budget is spent; the channel stays down until the
    /// application opens it again.
    ///
    /// Emitted exactly once per exhaustion.
    RetriesExhausted,
}

/// Actions the connection manager produces for the caller to execute.
#[derive(Debug, Clone)]
pub enum ConnectionAction {
    /// Establish a transport stream to the server.
    ///
    /// The caller reports the outcome via `DialSucceeded` or `DialFailed`.
    Dial,

    /// Send a frame over the live transport.
    SendFrame(Frame),

    /// Tear down the transport stream.
    ///
    /// Produced when the connection abandons a channel itself (handshake
    /// timeout, liveness failure, explicit close).
    CloseTransport,

    /// Deliver an application payload to the layer above.
    ///
    /// Only produced while connected; handshake and keepalive traffic is
    /// consumed internally.
    Deliver(Payload),

    /// Report a status change to the layer above.
    Notify(ConnectionNotice),

    /// Log message for debugging.
    Log {
        /// Log message.
        message: String,
    },
}
