//! Production event loop gluing the controller to real I/O.
//!
//! The [`ClientDriver`] owns a [`SessionController`], a [`SessionStore`],
//! and at most one live transport stream. It turns user commands and socket
//! activity into controller events, executes the resulting actions, and
//! publishes UI-relevant effects on an update channel.
//!
//! Everything stateful stays inside the controller; the driver is the only
//! place that touches sockets, clocks, and disk.

use std::{collections::VecDeque, time::Duration};

use syncpad_core::{Environment, SystemEnv};
use syncpad_proto::{Frame, RoomSummary};
use tokio::sync::mpsc;

use crate::{
    event::{SessionAction, SessionEvent, SessionNotice},
    session::SessionController,
    store::SessionStore,
    transport::{self, ConnectedClient},
};

/// Cadence of the timer driving retry backoff and keepalives.
const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// User intent fed into the driver.
#[derive(Debug, Clone)]
pub enum ClientCommand {
    /// Join a room (or switch to another one).
    Join {
        /// Identifier of the room to join.
        room_id: String,
        /// Display name to register under.
        username: String,
    },

    /// Replace the shared buffer with new content.
    Edit {
        /// Full buffer content after the edit.
        content: String,
    },

    /// Leave the current room.
    Leave,

    /// Ask the server for a fresh directory snapshot.
    RefreshDirectory,

    /// Shut the driver down.
    Quit,
}

/// UI-relevant effect published by the driver.
#[derive(Debug, Clone)]
pub enum ClientUpdate {
    /// Another member replaced the buffer; display this content.
    RemoteEdit {
        /// Full buffer content to display.
        content: String,
    },

    /// The member list changed; display this roster.
    Members {
        /// Current members, in server order.
        members: Vec<String>,
    },

    /// The join completed and the room is live.
    RoomJoined {
        /// Identifier of the room that became live.
        room_id: String,
    },

    /// A join was rejected before any network activity.
    JoinRejected {
        /// Human-readable validation failure.
        reason: String,
    },

    /// A fresh directory snapshot arrived.
    Directory {
        /// Advisory summaries of active rooms.
        rooms: Vec<RoomSummary>,
    },

    /// Connection lifecycle or membership notification.
    Notice(SessionNotice),
}

/// Event loop binding a [`SessionController`] to TCP, disk, and the clock.
pub struct ClientDriver<S> {
    controller: SessionController<std::time::Instant>,
    store: S,
    env: SystemEnv,
    server_addr: String,
    stream: Option<ConnectedClient>,
    commands: mpsc::Receiver<ClientCommand>,
    updates: mpsc::Sender<ClientUpdate>,
}

impl<S: SessionStore> ClientDriver<S> {
    /// Create a driver for a server at `server_addr` (`host:port`).
    pub fn new(
        controller: SessionController<std::time::Instant>,
        store: S,
        server_addr: String,
        commands: mpsc::Receiver<ClientCommand>,
        updates: mpsc::Sender<ClientUpdate>,
    ) -> Self {
        Self {
            controller,
            store,
            env: SystemEnv,
            server_addr,
            stream: None,
            commands,
            updates,
        }
    }

    /// Run until the command channel closes or a `Quit` arrives.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            let input = {
                let stream = self.stream.as_mut();
                tokio::select! {
                    command = self.commands.recv() => Input::Command(command),
                    frame = recv_or_pending(stream) => Input::Frame(frame),
                    _ = ticker.tick() => Input::Tick,
                }
            };

            match input {
                Input::Command(None) | Input::Command(Some(ClientCommand::Quit)) => break,
                Input::Command(Some(command)) => self.handle_command(command).await,
                Input::Frame(Some(frame)) => {
                    let now = self.env.now();
                    let actions = self.drive(SessionEvent::FrameReceived { frame, now });
                    self.apply(actions).await;
                },
                Input::Frame(None) => {
                    self.stream = None;
                    let now = self.env.now();
                    let actions = self.drive(SessionEvent::TransportClosed { now });
                    self.apply(actions).await;
                },
                Input::Tick => {
                    let now = self.env.now();
                    let actions = self.drive(SessionEvent::Tick { now });
                    self.apply(actions).await;
                },
            }
        }

        if let Some(stream) = self.stream.take() {
            stream.stop();
        }
    }

    async fn handle_command(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::Join { room_id, username } => {
                match self.controller.handle(SessionEvent::Join { room_id, username }) {
                    Ok(actions) => self.apply(actions).await,
                    Err(e) => {
                        self.publish(ClientUpdate::JoinRejected { reason: e.to_string() }).await;
                    },
                }
            },
            ClientCommand::Edit { content } => {
                let actions = self.drive(SessionEvent::SubmitEdit { content });
                self.apply(actions).await;
            },
            ClientCommand::Leave => {
                let actions = self.drive(SessionEvent::Leave);
                self.apply(actions).await;
            },
            ClientCommand::RefreshDirectory => {
                let actions = self.drive(SessionEvent::RefreshDirectory);
                self.apply(actions).await;
            },
            ClientCommand::Quit => {},
        }
    }

    /// Feed a driver-generated event through the controller.
    ///
    /// Validation errors only exist for user joins, which route through
    /// [`Self::handle_command`] instead, so the error arm is unreachable
    /// here and collapses to no actions.
    fn drive(&mut self, event: SessionEvent<std::time::Instant>) -> Vec<SessionAction> {
        self.controller.handle(event).unwrap_or_default()
    }

    /// Execute controller actions in order.
    ///
    /// Dial outcomes are fed straight back into the controller and their
    /// follow-up actions run before the rest of the queue.
    async fn apply(&mut self, actions: Vec<SessionAction>) {
        let mut queue: VecDeque<SessionAction> = actions.into();

        while let Some(action) = queue.pop_front() {
            match action {
                SessionAction::Dial => {
                    let event = self.dial().await;
                    let follow_up = self.drive(event);
                    for action in follow_up.into_iter().rev() {
                        queue.push_front(action);
                    }
                },
                SessionAction::SendFrame(frame) => self.send_frame(frame).await,
                SessionAction::CloseTransport => {
                    if let Some(stream) = self.stream.take() {
                        stream.stop();
                    }
                },
                SessionAction::ApplyRemoteEdit { content } => {
                    self.publish(ClientUpdate::RemoteEdit { content }).await;
                },
                SessionAction::MembersChanged { members } => {
                    self.publish(ClientUpdate::Members { members }).await;
                },
                SessionAction::RoomJoined { room_id } => {
                    self.persist_join(&room_id);
                    self.publish(ClientUpdate::RoomJoined { room_id }).await;
                },
                SessionAction::DirectorySnapshot { rooms } => {
                    self.publish(ClientUpdate::Directory { rooms }).await;
                },
                SessionAction::Notify(notice) => self.publish(ClientUpdate::Notice(notice)).await,
                SessionAction::Log { message } => tracing::debug!("{message}"),
            }
        }
    }

    /// Establish a transport stream and report the outcome.
    async fn dial(&mut self) -> SessionEvent<std::time::Instant> {
        match transport::connect(&self.server_addr).await {
            Ok(stream) => {
                self.stream = Some(stream);
                SessionEvent::DialSucceeded { now: self.env.now() }
            },
            Err(e) => {
                tracing::debug!(error = %e, "dial failed");
                SessionEvent::DialFailed { now: self.env.now() }
            },
        }
    }

    async fn send_frame(&mut self, frame: Frame) {
        let Some(stream) = &self.stream else {
            tracing::debug!("dropping frame: no transport stream");
            return;
        };

        if stream.to_server.send(frame).await.is_err() {
            tracing::debug!("dropping frame: transport task gone");
        }
    }

    /// Record the visit and refresh the saved username.
    ///
    /// Store failures are logged and swallowed; local bookkeeping must
    /// never interrupt a live session.
    fn persist_join(&self, room_id: &str) {
        if let Err(e) = self.store.record_join(room_id, self.env.wall_clock_secs()) {
            tracing::warn!(error = %e, "failed to record room visit");
        }

        if let Some(session) = self.controller.session()
            && let Err(e) = self.store.save_username(&session.local_user)
        {
            tracing::warn!(error = %e, "failed to save username");
        }
    }

    async fn publish(&self, update: ClientUpdate) {
        if self.updates.send(update).await.is_err() {
            tracing::debug!("update channel closed");
        }
    }
}

enum Input {
    Command(Option<ClientCommand>),
    Frame(Option<Frame>),
    Tick,
}

async fn recv_or_pending(stream: Option<&mut ConnectedClient>) -> Option<Frame> {
    match stream {
        Some(stream) => stream.from_server.recv().await,
        None => std::future::pending().await,
    }
}
