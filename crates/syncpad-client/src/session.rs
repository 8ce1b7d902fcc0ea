//! Session controller: the client-side state machine for one room.
//!
//! The controller owns a [`Connection`] outright. Each join gets a fresh
//! channel and leaving releases it, so connection lifetime is exactly
//! session lifetime and no state leaks between rooms.
//!
//! Like the connection machine underneath it, the controller is sans-IO:
//! it consumes [`SessionEvent`]s and returns [`SessionAction`]s for the
//! caller to execute. Events are applied one at a time in arrival order.

use std::{ops::Sub, time::Duration};

use syncpad_core::{
    Connection, ConnectionAction, ConnectionConfig, ConnectionEvent, ConnectionNotice,
    ConnectionState, Environment,
};
use syncpad_proto::{CodeChanged, JoinRoom, Payload};

use crate::{
    error::SessionError,
    event::{RoomSession, SessionAction, SessionEvent, SessionNotice},
};

/// Generate a fresh room id: 128 random bits as lowercase hex.
///
/// Ids are minted client-side without coordination; collisions are
/// negligible at this size.
pub fn generate_room_id(env: &impl Environment) -> String {
    format!("{:032x}", env.random_u128())
}

/// Controller for one room session.
///
/// # Invariants
///
/// - Join validation happens before any network activity
/// - The member list is replaced wholesale on every push, never merged
/// - The buffer converges on the last write applied, local or remote
/// - After leave, events from the released channel are discarded
pub struct SessionController<I = std::time::Instant> {
    connection: Connection<I>,
    session: Option<RoomSession>,
}

impl<I> SessionController<I>
where
    I: Copy + Sub<Output = Duration>,
{
    /// Create a controller with the given connection tuning.
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self { connection: Connection::new(config), session: None }
    }

    /// Current channel state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// The active room session, if any.
    #[must_use]
    pub fn session(&self) -> Option<&RoomSession> {
        self.session.as_ref()
    }

    /// Apply one event and return the actions to perform, in order.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] only when join validation fails, and then
    /// synchronously with no network activity. Every other failure mode is
    /// absorbed into actions and state transitions.
    pub fn handle(&mut self, event: SessionEvent<I>) -> Result<Vec<SessionAction>, SessionError> {
        match event {
            SessionEvent::Join { room_id, username } => self.handle_join(room_id, username),
            SessionEvent::SubmitEdit { content } => Ok(self.handle_submit_edit(content)),
            SessionEvent::Leave => Ok(self.release_session()),
            SessionEvent::RefreshDirectory => {
                let payload = Payload::DirectoryRequest;
                Ok(self.drive_connection(ConnectionEvent::Send { payload }))
            },
            SessionEvent::DialSucceeded { now } => {
                Ok(self.drive_connection(ConnectionEvent::DialSucceeded { now }))
            },
            SessionEvent::DialFailed { now } => {
                Ok(self.drive_connection(ConnectionEvent::DialFailed { now }))
            },
            SessionEvent::FrameReceived { frame, now } => {
                Ok(self.drive_connection(ConnectionEvent::FrameReceived { frame, now }))
            },
            SessionEvent::TransportClosed { now } => {
                Ok(self.drive_connection(ConnectionEvent::TransportClosed { now }))
            },
            SessionEvent::Tick { now } => Ok(self.drive_connection(ConnectionEvent::Tick { now })),
        }
    }

    /// Validate and start a join.
    ///
    /// A controller already in a room treats a second join as an implicit
    /// leave followed by a fresh join: the old channel is released before
    /// the new session dials. Validation failures happen before any of
    /// that, so a bad form submit touches nothing.
    fn handle_join(
        &mut self,
        room_id: String,
        username: String,
    ) -> Result<Vec<SessionAction>, SessionError> {
        if room_id.is_empty() {
            return Err(SessionError::EmptyRoomId);
        }
        if username.is_empty() {
            return Err(SessionError::EmptyUsername);
        }

        let mut actions = Vec::new();

        if self.session.is_some() || self.connection.state() != ConnectionState::Disconnected {
            actions.extend(self.release_session());
        }

        self.session = Some(RoomSession::new(room_id, username));
        actions.extend(self.drive_connection(ConnectionEvent::Open));

        Ok(actions)
    }

    /// Apply a local edit and broadcast it best-effort.
    ///
    /// The local buffer is updated first and unconditionally. The broadcast
    /// rides on the channel only if one is up; edits made while disconnected
    /// stay visible locally and are simply never sent.
    fn handle_submit_edit(&mut self, content: String) -> Vec<SessionAction> {
        let Some(session) = self.session.as_mut() else {
            return vec![SessionAction::Log {
                message: "Dropping edit: no active session".to_string(),
            }];
        };

        session.buffer.clone_from(&content);
        let payload =
            Payload::CodeChanged(CodeChanged { room_id: session.room_id.clone(), code: content });

        self.drive_connection(ConnectionEvent::Send { payload })
    }

    /// Drop the session and release the channel. Idempotent.
    fn release_session(&mut self) -> Vec<SessionAction> {
        self.session = None;
        self.drive_connection(ConnectionEvent::Close)
    }

    /// Run one event through the connection machine and lift the results.
    ///
    /// Connection errors never unwind the caller: a payload that fails to
    /// encode is logged and dropped.
    fn drive_connection(&mut self, event: ConnectionEvent<I>) -> Vec<SessionAction> {
        match self.connection.handle(event) {
            Ok(actions) => self.lift(actions),
            Err(e) => {
                vec![SessionAction::Log { message: format!("Dropping unencodable payload: {e}") }]
            },
        }
    }

    /// Translate connection actions into session actions, interpreting
    /// delivered payloads and lifecycle notices along the way.
    fn lift(&mut self, conn_actions: Vec<ConnectionAction>) -> Vec<SessionAction> {
        let mut actions = Vec::new();

        for action in conn_actions {
            match action {
                ConnectionAction::Dial => actions.push(SessionAction::Dial),
                ConnectionAction::SendFrame(frame) => actions.push(SessionAction::SendFrame(frame)),
                ConnectionAction::CloseTransport => actions.push(SessionAction::CloseTransport),
                ConnectionAction::Log { message } => actions.push(SessionAction::Log { message }),
                ConnectionAction::Notify(notice) => actions.extend(self.on_notice(notice)),
                ConnectionAction::Deliver(payload) => actions.extend(self.on_payload(payload)),
            }
        }

        actions
    }

    /// React to a connection lifecycle notice.
    ///
    /// Every notice is surfaced to the user. A fresh `Connected` also
    /// re-registers the session with the server, which is what makes
    /// reconnects rejoin the room without user involvement.
    fn on_notice(&mut self, notice: ConnectionNotice) -> Vec<SessionAction> {
        match notice {
            ConnectionNotice::Connected => {
                let mut actions = vec![SessionAction::Notify(SessionNotice::Connected)];

                let register = self.session.as_ref().map(|session| {
                    Payload::JoinRoom(JoinRoom {
                        room_id: session.room_id.clone(),
                        username: session.local_user.clone(),
                    })
                });
                if let Some(payload) = register {
                    actions.extend(self.drive_connection(ConnectionEvent::Send { payload }));
                }

                actions
            },
            ConnectionNotice::ConnectionLost => {
                vec![SessionAction::Notify(SessionNotice::ConnectionLost)]
            },
            ConnectionNotice::Reconnecting { attempt } => {
                vec![SessionAction::Notify(SessionNotice::Reconnecting { attempt })]
            },
            ConnectionNotice::RetriesExhausted => {
                vec![SessionAction::Notify(SessionNotice::RetriesExhausted)]
            },
        }
    }

    /// Apply a payload delivered on the live channel.
    fn on_payload(&mut self, payload: Payload) -> Vec<SessionAction> {
        match payload {
            Payload::UpdateCode(update) => self.on_remote_edit(update.code),
            Payload::RoomUsers(push) => self.on_membership_push(push.users),
            Payload::DirectoryResponse(response) => {
                vec![SessionAction::DirectorySnapshot { rooms: response.rooms }]
            },
            other => vec![SessionAction::Log {
                message: format!("Dropping unexpected {:?} payload from server", other.opcode()),
            }],
        }
    }

    /// Another member replaced the buffer.
    ///
    /// Applied unconditionally, even over unsent local edits. Concurrent
    /// writers converge on whichever edit the server relayed last.
    fn on_remote_edit(&mut self, code: String) -> Vec<SessionAction> {
        let Some(session) = self.session.as_mut() else {
            return vec![SessionAction::Log {
                message: "Dropping remote edit: no active session".to_string(),
            }];
        };

        session.buffer.clone_from(&code);
        vec![SessionAction::ApplyRemoteEdit { content: code }]
    }

    /// The server pushed the authoritative member list.
    ///
    /// The list replaces the roster wholesale. Members appearing for the
    /// first time (other than the local user) each produce one joined
    /// notice; disappearances produce nothing. The first push also confirms
    /// the join itself.
    fn on_membership_push(&mut self, users: Vec<String>) -> Vec<SessionAction> {
        let Some(session) = self.session.as_mut() else {
            return vec![SessionAction::Log {
                message: "Dropping membership push: no active session".to_string(),
            }];
        };

        let mut actions = Vec::new();

        if session.pending_join {
            session.pending_join = false;
            actions.push(SessionAction::RoomJoined { room_id: session.room_id.clone() });
        }

        let previous = std::mem::replace(&mut session.members, users.clone());
        actions.push(SessionAction::MembersChanged { members: users });

        for user in &session.members {
            if *user != session.local_user && !previous.contains(user) {
                actions.push(SessionAction::Notify(SessionNotice::UserJoined {
                    username: user.clone(),
                }));
            }
        }

        actions
    }
}

impl<I> Default for SessionController<I>
where
    I: Copy + Sub<Output = Duration>,
{
    fn default() -> Self {
        Self::new(ConnectionConfig::default())
    }
}
