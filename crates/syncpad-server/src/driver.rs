//! Sans-IO server driver.
//!
//! Ties the [`RoomRegistry`] to the wire contract: handshakes, membership
//! pushes, edit fan-out, directory snapshots, and idle sweeping. The driver
//! performs no I/O; the runtime (production or simulation) feeds it
//! [`ServerEvent`]s and executes the returned [`ServerAction`]s.
//!
//! # Contract
//!
//! - `Hello` → `HelloReply`; any other frame before the handshake closes
//!   the connection.
//! - `JoinRoom` → a `RoomUsers` push to every member of the room, the
//!   sender included.
//! - `CodeChanged` → an `UpdateCode` broadcast to every member except the
//!   sender. The server never echoes an edit back to its author.
//! - Disconnects (observed or idle-swept) push fresh membership to the
//!   room left behind.
//! - Undecodable payloads are logged and dropped. There is no error frame
//!   in the vocabulary.

use std::time::Duration;

use syncpad_core::Environment;
use syncpad_proto::{
    CodeChanged, DirectoryResponse, Frame, Hello, HelloReply, JoinRoom, Payload, ProtocolError,
    RoomUsers, UpdateCode,
};

use crate::{
    error::ServerError,
    registry::{RoomDeparture, RoomRegistry},
};

/// Protocol version this server speaks.
const PROTOCOL_VERSION: u8 = 1;

/// Server tuning knobs.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Connections beyond this count are closed at accept time.
    pub max_connections: usize,

    /// A session silent for longer than this is swept on the next tick.
    ///
    /// Clients heartbeat well inside this window, so only dead transports
    /// hit it.
    pub idle_timeout: Duration,

    /// Cadence at which the runtime feeds [`ServerEvent::Tick`].
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            idle_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
        }
    }
}

/// Events the runtime feeds into the driver.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new connection was accepted.
    ConnectionAccepted {
        /// Unique session id minted by the runtime.
        session_id: u64,
    },

    /// A complete frame arrived from a connection.
    FrameReceived {
        /// Session that sent the frame.
        session_id: u64,
        /// The decoded frame.
        frame: Frame,
    },

    /// A connection closed (peer hangup or read error).
    ConnectionClosed {
        /// Session that closed.
        session_id: u64,
        /// Reason for closure.
        reason: String,
    },

    /// Periodic tick driving the idle sweep.
    Tick,
}

/// Actions the driver produces for the runtime to execute.
#[derive(Debug, Clone)]
pub enum ServerAction {
    /// Send a frame to one session.
    SendToSession {
        /// Target session.
        session_id: u64,
        /// Frame to send.
        frame: Frame,
    },

    /// Send a frame to every member of a room, minus an optional exclusion.
    BroadcastToRoom {
        /// Target room.
        room_id: String,
        /// Frame to broadcast.
        frame: Frame,
        /// Session to skip, if any. Used to keep edits from echoing back
        /// to their author.
        exclude_session: Option<u64>,
    },

    /// Close a connection.
    CloseConnection {
        /// Session to close.
        session_id: u64,
        /// Reason for closure.
        reason: String,
    },

    /// Log a message.
    Log {
        /// Severity.
        level: LogLevel,
        /// Message to log.
        message: String,
    },
}

/// Log severity for [`ServerAction::Log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational message.
    Info,
    /// Warning.
    Warn,
    /// Error.
    Error,
}

/// Action-based room registry server.
///
/// Owns a [`RoomRegistry`] keyed by the environment's instant type. One
/// event is processed at a time, to completion; the registry needs no
/// locking.
pub struct ServerDriver<E: Environment> {
    registry: RoomRegistry<E::Instant>,
    env: E,
    config: ServerConfig,
}

impl<E: Environment> ServerDriver<E> {
    /// Create a driver.
    pub fn new(env: E, config: ServerConfig) -> Self {
        Self { registry: RoomRegistry::new(), env, config }
    }

    /// Process one event and return the actions to execute, in order.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] for runtime bookkeeping failures (unknown or
    /// duplicate session ids, reply encoding). Peer misbehavior is handled
    /// through actions, never errors.
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, ServerError> {
        match event {
            ServerEvent::ConnectionAccepted { session_id } => self.on_accepted(session_id),
            ServerEvent::FrameReceived { session_id, frame } => self.on_frame(session_id, &frame),
            ServerEvent::ConnectionClosed { session_id, reason } => {
                Ok(self.on_closed(session_id, &reason))
            },
            ServerEvent::Tick => Ok(self.on_tick()),
        }
    }

    /// Session ids currently in a room. Used by runtimes to execute
    /// [`ServerAction::BroadcastToRoom`].
    #[must_use]
    pub fn sessions_in_room(&self, room_id: &str) -> Vec<u64> {
        self.registry.sessions_in_room(room_id)
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.registry.session_count()
    }

    /// Number of active rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.registry.room_count()
    }

    fn on_accepted(&mut self, session_id: u64) -> Result<Vec<ServerAction>, ServerError> {
        if self.registry.session_count() >= self.config.max_connections {
            return Ok(vec![ServerAction::CloseConnection {
                session_id,
                reason: "max connections exceeded".to_string(),
            }]);
        }

        if !self.registry.register_session(session_id, self.env.now()) {
            return Err(ServerError::SessionAlreadyExists(session_id));
        }

        Ok(vec![log(LogLevel::Debug, format!("session {session_id} accepted"))])
    }

    fn on_frame(&mut self, session_id: u64, frame: &Frame) -> Result<Vec<ServerAction>, ServerError> {
        if !self.registry.has_session(session_id) {
            return Err(ServerError::SessionNotFound(session_id));
        }

        let now = self.env.now();
        self.registry.touch_session(session_id, now);

        let payload = match Payload::from_frame(frame) {
            Ok(payload) => payload,
            Err(e @ (ProtocolError::UnknownOpcode(_) | ProtocolError::CborDecode(_))) => {
                return Ok(vec![log(
                    LogLevel::Warn,
                    format!("session {session_id}: dropping undecodable payload: {e}"),
                )]);
            },
            Err(e) => return Err(e.into()),
        };

        if !self.registry.is_handshaken(session_id) {
            return match payload {
                Payload::Hello(hello) => self.on_hello(session_id, &hello),
                other => Ok(vec![
                    log(
                        LogLevel::Warn,
                        format!(
                            "session {session_id}: {:?} before handshake",
                            other.opcode()
                        ),
                    ),
                    ServerAction::CloseConnection {
                        session_id,
                        reason: "handshake required".to_string(),
                    },
                ]),
            };
        }

        match payload {
            Payload::Hello(hello) => self.on_hello(session_id, &hello),
            Payload::Ping => {
                Ok(vec![send_to(session_id, Payload::Pong)?])
            },
            Payload::Pong => Ok(Vec::new()),
            Payload::JoinRoom(join) => self.on_join_room(session_id, &join),
            Payload::CodeChanged(edit) => self.on_code_changed(session_id, edit),
            Payload::DirectoryRequest => {
                let rooms = self.registry.summaries(now);
                Ok(vec![send_to(
                    session_id,
                    Payload::DirectoryResponse(DirectoryResponse { rooms }),
                )?])
            },
            other => Ok(vec![
                log(
                    LogLevel::Warn,
                    format!(
                        "session {session_id}: server-origin {:?} from client",
                        other.opcode()
                    ),
                ),
                ServerAction::CloseConnection {
                    session_id,
                    reason: "protocol violation".to_string(),
                },
            ]),
        }
    }

    fn on_hello(
        &mut self,
        session_id: u64,
        hello: &Hello,
    ) -> Result<Vec<ServerAction>, ServerError> {
        if hello.protocol_version != PROTOCOL_VERSION {
            return Ok(vec![
                log(
                    LogLevel::Warn,
                    format!(
                        "session {session_id}: unsupported protocol version {}",
                        hello.protocol_version
                    ),
                ),
                ServerAction::CloseConnection {
                    session_id,
                    reason: "unsupported protocol version".to_string(),
                },
            ]);
        }

        self.registry.mark_handshaken(session_id);
        Ok(vec![send_to(session_id, Payload::HelloReply(HelloReply { session_id }))?])
    }

    fn on_join_room(
        &mut self,
        session_id: u64,
        join: &JoinRoom,
    ) -> Result<Vec<ServerAction>, ServerError> {
        if join.room_id.is_empty() || join.username.is_empty() {
            return Ok(vec![log(
                LogLevel::Warn,
                format!("session {session_id}: dropping join with empty room id or username"),
            )]);
        }

        let now = self.env.now();
        let Some(outcome) =
            self.registry.join_room(session_id, &join.room_id, &join.username, now)
        else {
            return Err(ServerError::SessionNotFound(session_id));
        };

        let mut actions = vec![log(
            LogLevel::Info,
            format!("session {session_id}: {} joined room {}", join.username, join.room_id),
        )];

        if let Some(departure) = outcome.left {
            actions.extend(self.announce_departure(&departure)?);
        }

        actions.push(broadcast(
            &join.room_id,
            Payload::RoomUsers(RoomUsers { users: outcome.members }),
            None,
        )?);

        Ok(actions)
    }

    fn on_code_changed(
        &mut self,
        session_id: u64,
        edit: CodeChanged,
    ) -> Result<Vec<ServerAction>, ServerError> {
        if self.registry.room_for_session(session_id) != Some(edit.room_id.as_str()) {
            return Ok(vec![log(
                LogLevel::Warn,
                format!(
                    "session {session_id}: dropping edit for room {} it is not a member of",
                    edit.room_id
                ),
            )]);
        }

        self.registry.touch_room(&edit.room_id, self.env.now());

        Ok(vec![broadcast(
            &edit.room_id,
            Payload::UpdateCode(UpdateCode { code: edit.code }),
            Some(session_id),
        )?])
    }

    fn on_closed(&mut self, session_id: u64, reason: &str) -> Vec<ServerAction> {
        let mut actions =
            vec![log(LogLevel::Debug, format!("session {session_id} closed: {reason}"))];

        if let Some(departure) = self.registry.remove_session(session_id) {
            match self.announce_departure(&departure) {
                Ok(more) => actions.extend(more),
                Err(e) => actions.push(log(
                    LogLevel::Error,
                    format!("failed to announce departure from {}: {e}", departure.room_id),
                )),
            }
        }

        actions
    }

    /// Sweep sessions whose transport died without a clean close.
    fn on_tick(&mut self) -> Vec<ServerAction> {
        let now = self.env.now();
        let mut actions = Vec::new();

        for session_id in self.registry.idle_sessions(now, self.config.idle_timeout) {
            actions.push(ServerAction::CloseConnection {
                session_id,
                reason: "idle timeout".to_string(),
            });
            actions.extend(self.on_closed(session_id, "idle timeout"));
        }

        actions
    }

    /// Push fresh membership to a room somebody just left.
    fn announce_departure(
        &self,
        departure: &RoomDeparture,
    ) -> Result<Vec<ServerAction>, ServerError> {
        if departure.remaining.is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![broadcast(
            &departure.room_id,
            Payload::RoomUsers(RoomUsers { users: departure.remaining.clone() }),
            None,
        )?])
    }
}

fn send_to(session_id: u64, payload: Payload) -> Result<ServerAction, ServerError> {
    Ok(ServerAction::SendToSession { session_id, frame: payload.into_frame()? })
}

fn broadcast(
    room_id: &str,
    payload: Payload,
    exclude_session: Option<u64>,
) -> Result<ServerAction, ServerError> {
    Ok(ServerAction::BroadcastToRoom {
        room_id: room_id.to_string(),
        frame: payload.into_frame()?,
        exclude_session,
    })
}

fn log(level: LogLevel, message: String) -> ServerAction {
    ServerAction::Log { level, message }
}
