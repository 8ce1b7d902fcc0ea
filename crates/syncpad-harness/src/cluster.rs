//! In-process cluster of session controllers and one server driver.
//!
//! [`TestCluster`] wires N client controllers to a [`ServerDriver`] with no
//! sockets: frames produced by one side are fed straight into the other,
//! run to completion, in a single thread. Combined with [`SimEnv`]'s manual
//! clock this gives fully deterministic end-to-end scenarios, including
//! wire drops and reconnect schedules.

use std::time::{Duration, Instant};

use syncpad_client::{
    RoomSession, SessionAction, SessionController, SessionError, SessionEvent, SessionNotice,
};
use syncpad_core::{ConnectionState, Environment};
use syncpad_proto::{Frame, RoomSummary};
use syncpad_server::{ServerAction, ServerConfig, ServerDriver, ServerEvent};

use crate::SimEnv;

/// One simulated client: a controller plus its wire state.
struct SimClient {
    controller: SessionController<Instant>,
    /// Server-side session id while a transport stream exists.
    session_id: Option<u64>,
    /// Whether dials can currently succeed and frames can flow.
    wire_up: bool,
    /// Notifications the controller surfaced, in order.
    notices: Vec<SessionNotice>,
    /// Latest directory snapshot the controller forwarded.
    directory: Option<Vec<RoomSummary>>,
}

/// Deterministic cluster: N session controllers against one server driver.
pub struct TestCluster {
    env: SimEnv,
    server: ServerDriver<SimEnv>,
    clients: Vec<SimClient>,
    next_session_id: u64,
}

impl TestCluster {
    /// Create a cluster with `num_clients` controllers and a default-config
    /// server, all sharing one seeded environment.
    #[must_use]
    pub fn new(seed: u64, num_clients: usize) -> Self {
        Self::with_server_config(seed, num_clients, ServerConfig::default())
    }

    /// Create a cluster with a custom server configuration.
    #[must_use]
    pub fn with_server_config(seed: u64, num_clients: usize, config: ServerConfig) -> Self {
        let env = SimEnv::with_seed(seed);
        let server = ServerDriver::new(env.clone(), config);
        let clients = (0..num_clients)
            .map(|_| SimClient {
                controller: SessionController::default(),
                session_id: None,
                wire_up: true,
                notices: Vec::new(),
                directory: None,
            })
            .collect();

        Self { env, server, clients, next_session_id: 1 }
    }

    /// Client `idx` joins a room. Runs the full exchange (dial, handshake,
    /// registration, membership push) before returning.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if join validation fails; nothing reaches
    /// the server in that case.
    pub fn join(&mut self, idx: usize, room_id: &str, username: &str) -> Result<(), SessionError> {
        let actions = self.clients[idx].controller.handle(SessionEvent::Join {
            room_id: room_id.to_string(),
            username: username.to_string(),
        })?;
        self.run_client_actions(idx, actions);
        Ok(())
    }

    /// Client `idx` submits a local edit.
    pub fn edit(&mut self, idx: usize, content: &str) {
        self.feed_client(idx, SessionEvent::SubmitEdit { content: content.to_string() });
    }

    /// Client `idx` leaves its room.
    pub fn leave(&mut self, idx: usize) {
        self.feed_client(idx, SessionEvent::Leave);
    }

    /// Client `idx` asks for a directory snapshot.
    pub fn refresh_directory(&mut self, idx: usize) {
        self.feed_client(idx, SessionEvent::RefreshDirectory);
    }

    /// Advance virtual time and deliver one tick to every party.
    pub fn tick(&mut self, duration: Duration) {
        self.env.advance(duration);
        let now = self.env.now();

        for idx in 0..self.clients.len() {
            self.feed_client(idx, SessionEvent::Tick { now });
        }

        match self.server.process_event(ServerEvent::Tick) {
            Ok(actions) => self.route_server_actions(actions),
            Err(_) => unreachable!("tick processing takes no session id"),
        }
    }

    /// Sever client `idx`'s wire: the server sees a disconnect and the
    /// client sees its transport die. Dials fail until
    /// [`TestCluster::restore_wire`].
    pub fn drop_wire(&mut self, idx: usize) {
        self.clients[idx].wire_up = false;

        if let Some(session_id) = self.clients[idx].session_id.take() {
            self.notify_server_closed(session_id, "wire dropped");
        }

        let now = self.env.now();
        self.feed_client(idx, SessionEvent::TransportClosed { now });
    }

    /// Let client `idx`'s dials succeed again.
    ///
    /// The client reconnects on its own backoff schedule; drive it with
    /// [`TestCluster::tick`].
    pub fn restore_wire(&mut self, idx: usize) {
        self.clients[idx].wire_up = true;
    }

    /// Client `idx`'s live session, if any.
    #[must_use]
    pub fn session(&self, idx: usize) -> Option<&RoomSession> {
        self.clients[idx].controller.session()
    }

    /// Client `idx`'s channel state.
    #[must_use]
    pub fn connection_state(&self, idx: usize) -> ConnectionState {
        self.clients[idx].controller.connection_state()
    }

    /// Notifications client `idx` has surfaced so far, in order.
    #[must_use]
    pub fn notices(&self, idx: usize) -> &[SessionNotice] {
        &self.clients[idx].notices
    }

    /// Drain client `idx`'s recorded notifications.
    pub fn take_notices(&mut self, idx: usize) -> Vec<SessionNotice> {
        std::mem::take(&mut self.clients[idx].notices)
    }

    /// Latest directory snapshot client `idx` received.
    #[must_use]
    pub fn directory(&self, idx: usize) -> Option<&[RoomSummary]> {
        self.clients[idx].directory.as_deref()
    }

    /// The server driver, for registry-level assertions.
    #[must_use]
    pub fn server(&self) -> &ServerDriver<SimEnv> {
        &self.server
    }

    /// Feed one event into a client controller and run the fallout.
    fn feed_client(&mut self, idx: usize, event: SessionEvent<Instant>) {
        // Only `Join` can fail validation, and `join()` handles that path.
        let actions = self.clients[idx].controller.handle(event).unwrap_or_default();
        self.run_client_actions(idx, actions);
    }

    /// Execute a client's actions against the simulated wire.
    fn run_client_actions(&mut self, idx: usize, actions: Vec<SessionAction>) {
        for action in actions {
            match action {
                SessionAction::Dial => self.dial(idx),
                SessionAction::SendFrame(frame) => {
                    if let Some(session_id) = self.clients[idx].session_id {
                        self.deliver_to_server(session_id, frame);
                    }
                },
                SessionAction::CloseTransport => {
                    if let Some(session_id) = self.clients[idx].session_id.take() {
                        self.notify_server_closed(session_id, "closed by client");
                    }
                },
                SessionAction::Notify(notice) => self.clients[idx].notices.push(notice),
                SessionAction::DirectorySnapshot { rooms } => {
                    self.clients[idx].directory = Some(rooms);
                },
                SessionAction::ApplyRemoteEdit { .. }
                | SessionAction::MembersChanged { .. }
                | SessionAction::RoomJoined { .. }
                | SessionAction::Log { .. } => {},
            }
        }
    }

    /// Resolve a dial attempt against the wire state.
    fn dial(&mut self, idx: usize) {
        let now = self.env.now();

        if !self.clients[idx].wire_up {
            self.feed_client(idx, SessionEvent::DialFailed { now });
            return;
        }

        let session_id = self.next_session_id;
        self.next_session_id += 1;
        self.clients[idx].session_id = Some(session_id);

        let event = ServerEvent::ConnectionAccepted { session_id };
        if let Ok(actions) = self.server.process_event(event) {
            self.route_server_actions(actions);
        }

        // The server may have refused the connection (capacity) during the
        // accept; only a surviving session gets the successful dial.
        if self.clients[idx].session_id == Some(session_id) {
            self.feed_client(idx, SessionEvent::DialSucceeded { now });
        }
    }

    fn deliver_to_server(&mut self, session_id: u64, frame: Frame) {
        let event = ServerEvent::FrameReceived { session_id, frame };
        // Frames racing a disconnect vanish, as on a real wire.
        if let Ok(actions) = self.server.process_event(event) {
            self.route_server_actions(actions);
        }
    }

    fn notify_server_closed(&mut self, session_id: u64, reason: &str) {
        if let Ok(actions) = self
            .server
            .process_event(ServerEvent::ConnectionClosed { session_id, reason: reason.to_string() })
        {
            self.route_server_actions(actions);
        }
    }

    /// Execute server actions against the simulated wires.
    fn route_server_actions(&mut self, actions: Vec<ServerAction>) {
        for action in actions {
            match action {
                ServerAction::SendToSession { session_id, frame } => {
                    self.deliver_to_client(session_id, frame);
                },
                ServerAction::BroadcastToRoom { room_id, frame, exclude_session } => {
                    for session_id in self.server.sessions_in_room(&room_id) {
                        if Some(session_id) != exclude_session {
                            self.deliver_to_client(session_id, frame.clone());
                        }
                    }
                },
                ServerAction::CloseConnection { session_id, .. } => {
                    if let Some(idx) = self.client_for_session(session_id) {
                        self.clients[idx].session_id = None;
                        let now = self.env.now();
                        self.feed_client(idx, SessionEvent::TransportClosed { now });
                    }
                    self.notify_server_closed(session_id, "closed by server");
                },
                ServerAction::Log { .. } => {},
            }
        }
    }

    fn deliver_to_client(&mut self, session_id: u64, frame: Frame) {
        let Some(idx) = self.client_for_session(session_id) else {
            return;
        };
        if !self.clients[idx].wire_up {
            return;
        }
        let now = self.env.now();
        self.feed_client(idx, SessionEvent::FrameReceived { frame, now });
    }

    fn client_for_session(&self, session_id: u64) -> Option<usize> {
        self.clients.iter().position(|c| c.session_id == Some(session_id))
    }
}
