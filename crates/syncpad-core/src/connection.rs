//! Connection manager state machine.
//!
//! The `Connection` owns the lifecycle of the logical channel to the server:
//! dial, handshake, liveness probing, bounded-backoff recovery, and teardown.
//! It is Sans-IO: the caller feeds [`ConnectionEvent`]s in and executes the
//! returned [`ConnectionAction`]s, so the same state machine runs against a
//! real TCP stream in production and a scripted transport in tests.

use std::{ops::Sub, time::Duration};

use syncpad_proto::{Frame, FrameHeader, Hello, Payload};

use crate::{
    error::ConnectionError,
    event::{ConnectionAction, ConnectionEvent, ConnectionNotice},
};

/// Largest doubling applied to the base retry delay.
///
/// Caps the shift so the multiplier cannot overflow; the configured
/// `retry_max_delay` clamp applies long before this matters in practice.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Tunable timing and retry policy for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Retry dials allowed per recovery before giving up.
    pub max_retries: u32,

    /// Backoff before the first retry; doubles per attempt.
    pub retry_base_delay: Duration,

    /// Ceiling on the per-attempt backoff.
    pub retry_max_delay: Duration,

    /// How long to wait for the server's handshake reply.
    pub handshake_timeout: Duration,

    /// Quiet period after which a keepalive ping is sent.
    pub heartbeat_interval: Duration,

    /// Quiet period after which the channel is declared dead.
    pub idle_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(45),
        }
    }
}

/// Lifecycle state of the logical channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel. Initial state; also terminal after close or retry
    /// exhaustion until a fresh open.
    Disconnected,

    /// First dial or handshake in flight.
    Connecting,

    /// Handshake complete; application traffic flows.
    Connected,

    /// Channel lost; recovery dials run with backoff.
    Reconnecting,
}

/// Connection manager for one logical channel.
///
/// # Invariants
///
/// - At most one dial is in flight at a time
/// - `Disconnected` never schedules dials or timers
/// - `RetriesExhausted` is emitted at most once per recovery
pub struct Connection<I> {
    config: ConnectionConfig,
    state: ConnectionState,

    /// Retry attempt in flight or awaited (1-based). 0 outside recovery.
    attempt: u32,

    /// Backoff wait in progress: when it started and how long it lasts.
    backoff: Option<(I, Duration)>,

    /// Dial emitted, outcome not yet reported.
    dialing: bool,

    /// Greeting sent at this instant, awaiting the server's reply.
    hello_sent_at: Option<I>,

    /// Server-assigned id for the current logical channel.
    session_id: Option<u64>,

    /// Last instant any frame arrived on the live channel.
    last_activity: Option<I>,

    /// Keepalive ping sent and not yet answered.
    ping_sent_at: Option<I>,
}

impl<I> Connection<I>
where
    I: Copy + Sub<Output = Duration>,
{
    /// Create a connection manager in the `Disconnected` state.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            attempt: 0,
            backoff: None,
            dialing: false,
            hello_sent_at: None,
            session_id: None,
            last_activity: None,
            ping_sent_at: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Server-assigned session id. `None` unless connected.
    pub fn session_id(&self) -> Option<u64> {
        self.session_id
    }

    /// Process an event and return resulting actions.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError` only when a locally built payload fails to
    /// encode; everything the network does wrong is absorbed into state
    /// transitions and log actions.
    pub fn handle(
        &mut self,
        event: ConnectionEvent<I>,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        match event {
            ConnectionEvent::Open => Ok(self.handle_open()),
            ConnectionEvent::DialSucceeded { now } => self.handle_dial_succeeded(now),
            ConnectionEvent::DialFailed { now } => Ok(self.handle_dial_failed(now)),
            ConnectionEvent::FrameReceived { frame, now } => self.handle_frame(&frame, now),
            ConnectionEvent::TransportClosed { now } => Ok(self.handle_transport_closed(now)),
            ConnectionEvent::Send { payload } => self.handle_send(payload),
            ConnectionEvent::Tick { now } => self.handle_tick(now),
            ConnectionEvent::Close => Ok(self.handle_close()),
        }
    }

    fn handle_open(&mut self) -> Vec<ConnectionAction> {
        if self.state != ConnectionState::Disconnected {
            return vec![ConnectionAction::Log {
                message: "Open ignored: channel already active".to_string(),
            }];
        }

        self.state = ConnectionState::Connecting;
        self.attempt = 0;
        self.dialing = true;

        vec![ConnectionAction::Dial]
    }

    fn handle_dial_succeeded(&mut self, now: I) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if !self.dialing {
            return Ok(vec![ConnectionAction::Log {
                message: "Stale dial result ignored".to_string(),
            }]);
        }

        self.dialing = false;
        self.hello_sent_at = Some(now);

        let hello = Payload::Hello(Hello { protocol_version: FrameHeader::VERSION });
        Ok(vec![ConnectionAction::SendFrame(hello.into_frame()?)])
    }

    fn handle_dial_failed(&mut self, now: I) -> Vec<ConnectionAction> {
        if !self.dialing {
            return vec![ConnectionAction::Log {
                message: "Stale dial result ignored".to_string(),
            }];
        }

        self.dialing = false;
        self.schedule_retry(now, Vec::new())
    }

    fn handle_transport_closed(&mut self, now: I) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Disconnected => Vec::new(),
            ConnectionState::Connected => {
                let actions = vec![
                    ConnectionAction::Notify(ConnectionNotice::ConnectionLost),
                    ConnectionAction::Log { message: "Channel lost, recovering".to_string() },
                ];
                self.schedule_retry(now, actions)
            },
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                // Only meaningful while a stream exists or a dial is in
                // flight; a closure racing our own teardown is stale.
                if self.hello_sent_at.is_some() || self.dialing {
                    self.dialing = false;
                    self.schedule_retry(now, Vec::new())
                } else {
                    Vec::new()
                }
            },
        }
    }

    fn handle_frame(
        &mut self,
        frame: &Frame,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if self.state == ConnectionState::Disconnected {
            return Ok(vec![ConnectionAction::Log {
                message: "Frame after close discarded".to_string(),
            }]);
        }

        self.last_activity = Some(now);

        let payload = match Payload::from_frame(frame) {
            Ok(payload) => payload,
            Err(e) => {
                return Ok(vec![ConnectionAction::Log {
                    message: format!("Dropping undecodable frame: {e}"),
                }]);
            },
        };

        match payload {
            Payload::HelloReply(reply) => Ok(self.complete_handshake(reply.session_id)),
            Payload::Ping => Ok(vec![ConnectionAction::SendFrame(Payload::Pong.into_frame()?)]),
            Payload::Pong => {
                self.ping_sent_at = None;
                Ok(Vec::new())
            },
            Payload::Hello(_) => Ok(vec![ConnectionAction::Log {
                message: "Unexpected hello from server dropped".to_string(),
            }]),
            other => {
                if self.state == ConnectionState::Connected {
                    Ok(vec![ConnectionAction::Deliver(other)])
                } else {
                    Ok(vec![ConnectionAction::Log {
                        message: "Application frame before handshake dropped".to_string(),
                    }])
                }
            },
        }
    }

    fn complete_handshake(&mut self, session_id: u64) -> Vec<ConnectionAction> {
        if self.hello_sent_at.is_none() {
            return vec![ConnectionAction::Log {
                message: "Unexpected handshake reply ignored".to_string(),
            }];
        }

        self.hello_sent_at = None;
        self.session_id = Some(session_id);
        self.state = ConnectionState::Connected;
        self.attempt = 0;
        self.backoff = None;
        self.ping_sent_at = None;

        vec![
            ConnectionAction::Notify(ConnectionNotice::Connected),
            ConnectionAction::Log { message: format!("Handshake complete, session {session_id}") },
        ]
    }

    fn handle_send(&mut self, payload: Payload) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if self.state != ConnectionState::Connected {
            return Ok(vec![ConnectionAction::Log {
                message: "Send dropped: channel not connected".to_string(),
            }]);
        }

        Ok(vec![ConnectionAction::SendFrame(payload.into_frame()?)])
    }

    fn handle_tick(&mut self, now: I) -> Result<Vec<ConnectionAction>, ConnectionError> {
        match self.state {
            ConnectionState::Disconnected => Ok(Vec::new()),
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                if let Some((since, delay)) = self.backoff
                    && now - since >= delay
                {
                    self.backoff = None;
                    self.dialing = true;
                    return Ok(vec![
                        ConnectionAction::Dial,
                        ConnectionAction::Log {
                            message: format!("Dialing, attempt {}", self.attempt),
                        },
                    ]);
                }

                if let Some(sent) = self.hello_sent_at
                    && now - sent >= self.config.handshake_timeout
                {
                    let actions = vec![
                        ConnectionAction::CloseTransport,
                        ConnectionAction::Log { message: "Handshake timed out".to_string() },
                    ];
                    return Ok(self.schedule_retry(now, actions));
                }

                Ok(Vec::new())
            },
            ConnectionState::Connected => {
                if let Some(last) = self.last_activity
                    && now - last >= self.config.idle_timeout
                {
                    let actions = vec![
                        ConnectionAction::CloseTransport,
                        ConnectionAction::Notify(ConnectionNotice::ConnectionLost),
                        ConnectionAction::Log {
                            message: "Channel idle past liveness deadline".to_string(),
                        },
                    ];
                    return Ok(self.schedule_retry(now, actions));
                }

                if self.ping_sent_at.is_none()
                    && let Some(last) = self.last_activity
                    && now - last >= self.config.heartbeat_interval
                {
                    self.ping_sent_at = Some(now);
                    return Ok(vec![ConnectionAction::SendFrame(Payload::Ping.into_frame()?)]);
                }

                Ok(Vec::new())
            },
        }
    }

    fn handle_close(&mut self) -> Vec<ConnectionAction> {
        if self.state == ConnectionState::Disconnected {
            return Vec::new();
        }

        let had_stream = self.state == ConnectionState::Connected
            || self.hello_sent_at.is_some()
            || self.dialing;

        self.state = ConnectionState::Disconnected;
        self.attempt = 0;
        self.backoff = None;
        self.dialing = false;
        self.reset_channel();

        let mut actions = Vec::new();
        if had_stream {
            actions.push(ConnectionAction::CloseTransport);
        }
        actions.push(ConnectionAction::Log { message: "Channel released".to_string() });
        actions
    }

    /// Move into the retry path, or give up when the budget is spent.
    fn schedule_retry(
        &mut self,
        now: I,
        mut actions: Vec<ConnectionAction>,
    ) -> Vec<ConnectionAction> {
        self.reset_channel();

        let next = self.attempt + 1;
        if next > self.config.max_retries {
            self.state = ConnectionState::Disconnected;
            self.attempt = 0;
            self.backoff = None;

            actions.push(ConnectionAction::Notify(ConnectionNotice::RetriesExhausted));
            actions.push(ConnectionAction::Log {
                message: format!(
                    "Gave up after {} reconnect attempts",
                    self.config.max_retries
                ),
            });
            return actions;
        }

        self.state = ConnectionState::Reconnecting;
        self.attempt = next;
        let delay = self.retry_delay(next);
        self.backoff = Some((now, delay));

        actions.push(ConnectionAction::Notify(ConnectionNotice::Reconnecting { attempt: next }));
        actions.push(ConnectionAction::Log {
            message: format!("Reconnect attempt {next} in {}ms", delay.as_millis()),
        });
        actions
    }

    /// Backoff for the given attempt: base doubled per attempt, clamped.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        let delay = self.config.retry_base_delay.saturating_mul(1 << exponent);
        delay.min(self.config.retry_max_delay)
    }

    /// Forget everything tied to the current (now dead) stream.
    fn reset_channel(&mut self) {
        self.session_id = None;
        self.hello_sent_at = None;
        self.last_activity = None;
        self.ping_sent_at = None;
    }
}

impl<I> Default for Connection<I>
where
    I: Copy + Sub<Output = Duration>,
{
    fn default() -> Self {
        Self::new(ConnectionConfig::default())
    }
}
