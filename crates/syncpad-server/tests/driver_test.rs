//! Scenario tests for the sans-IO server driver.
//!
//! Each test feeds a sequence of events into [`ServerDriver`] and asserts
//! on the produced actions: who gets which frame, who is excluded, and
//! which connections are closed.

#![allow(clippy::unwrap_used)]

use syncpad_core::env::test_utils::MockEnv;
use syncpad_proto::{
    CodeChanged, Frame, Hello, JoinRoom, Payload, UpdateCode,
};
use syncpad_server::{ServerAction, ServerConfig, ServerDriver, ServerEvent};

fn driver() -> ServerDriver<MockEnv> {
    ServerDriver::new(MockEnv::new(), ServerConfig::default())
}

fn hello() -> Frame {
    Payload::Hello(Hello { protocol_version: 1 }).into_frame().unwrap()
}

fn join(room_id: &str, username: &str) -> Frame {
    Payload::JoinRoom(JoinRoom { room_id: room_id.to_string(), username: username.to_string() })
        .into_frame()
        .unwrap()
}

fn edit(room_id: &str, code: &str) -> Frame {
    Payload::CodeChanged(CodeChanged { room_id: room_id.to_string(), code: code.to_string() })
        .into_frame()
        .unwrap()
}

/// Accept a session and complete its handshake.
fn connect(driver: &mut ServerDriver<MockEnv>, session_id: u64) {
    driver.process_event(ServerEvent::ConnectionAccepted { session_id }).unwrap();
    driver.process_event(ServerEvent::FrameReceived { session_id, frame: hello() }).unwrap();
}

/// Accept, handshake, and join a room in one go.
fn connect_and_join(
    driver: &mut ServerDriver<MockEnv>,
    session_id: u64,
    room_id: &str,
    username: &str,
) {
    connect(driver, session_id);
    driver
        .process_event(ServerEvent::FrameReceived { session_id, frame: join(room_id, username) })
        .unwrap();
}

/// Frames sent directly to one session, decoded.
fn sent_to(actions: &[ServerAction], target: u64) -> Vec<Payload> {
    actions
        .iter()
        .filter_map(|action| match action {
            ServerAction::SendToSession { session_id, frame } if *session_id == target => {
                Payload::from_frame(frame).ok()
            },
            _ => None,
        })
        .collect()
}

/// Broadcasts to a room, as (decoded payload, excluded session) pairs.
fn broadcasts(actions: &[ServerAction], room: &str) -> Vec<(Payload, Option<u64>)> {
    actions
        .iter()
        .filter_map(|action| match action {
            ServerAction::BroadcastToRoom { room_id, frame, exclude_session } if room_id == room => {
                Payload::from_frame(frame).ok().map(|p| (p, *exclude_session))
            },
            _ => None,
        })
        .collect()
}

fn closes(actions: &[ServerAction]) -> Vec<u64> {
    actions
        .iter()
        .filter_map(|action| match action {
            ServerAction::CloseConnection { session_id, .. } => Some(*session_id),
            _ => None,
        })
        .collect()
}

#[test]
fn hello_is_answered_with_the_session_id() {
    let mut driver = driver();
    driver.process_event(ServerEvent::ConnectionAccepted { session_id: 7 }).unwrap();

    let actions =
        driver.process_event(ServerEvent::FrameReceived { session_id: 7, frame: hello() }).unwrap();

    let replies = sent_to(&actions, 7);
    assert!(matches!(
        replies.as_slice(),
        [Payload::HelloReply(reply)] if reply.session_id == 7
    ));
}

#[test]
fn frames_before_the_handshake_close_the_connection() {
    let mut driver = driver();
    driver.process_event(ServerEvent::ConnectionAccepted { session_id: 7 }).unwrap();

    let actions = driver
        .process_event(ServerEvent::FrameReceived { session_id: 7, frame: join("r1", "alice") })
        .unwrap();

    assert_eq!(closes(&actions), [7]);
    assert!(broadcasts(&actions, "r1").is_empty());
}

#[test]
fn unsupported_protocol_version_is_refused() {
    let mut driver = driver();
    driver.process_event(ServerEvent::ConnectionAccepted { session_id: 7 }).unwrap();

    let bad_hello = Payload::Hello(Hello { protocol_version: 9 }).into_frame().unwrap();
    let actions = driver
        .process_event(ServerEvent::FrameReceived { session_id: 7, frame: bad_hello })
        .unwrap();

    assert_eq!(closes(&actions), [7]);
    assert!(sent_to(&actions, 7).is_empty());
}

#[test]
fn join_pushes_membership_to_the_whole_room_including_the_sender() {
    let mut driver = driver();
    connect_and_join(&mut driver, 1, "r1", "alice");
    connect(&mut driver, 2);

    let actions = driver
        .process_event(ServerEvent::FrameReceived { session_id: 2, frame: join("r1", "bob") })
        .unwrap();

    let pushes = broadcasts(&actions, "r1");
    assert_eq!(pushes.len(), 1);
    let (payload, excluded) = &pushes[0];
    assert!(matches!(
        payload,
        Payload::RoomUsers(push) if push.users == ["alice", "bob"]
    ));
    assert_eq!(*excluded, None, "membership pushes go to everyone, sender included");
}

#[test]
fn edits_fan_out_to_everyone_except_the_sender() {
    let mut driver = driver();
    connect_and_join(&mut driver, 1, "r1", "alice");
    connect_and_join(&mut driver, 2, "r1", "bob");

    let actions = driver
        .process_event(ServerEvent::FrameReceived {
            session_id: 1,
            frame: edit("r1", "fn main() {}"),
        })
        .unwrap();

    let pushes = broadcasts(&actions, "r1");
    assert_eq!(pushes.len(), 1);
    let (payload, excluded) = &pushes[0];
    assert!(matches!(
        payload,
        Payload::UpdateCode(UpdateCode { code }) if code == "fn main() {}"
    ));
    assert_eq!(*excluded, Some(1), "the author must never receive their own edit");
}

#[test]
fn edits_for_a_room_the_sender_is_not_in_are_dropped() {
    let mut driver = driver();
    connect_and_join(&mut driver, 1, "r1", "alice");
    connect_and_join(&mut driver, 2, "r2", "bob");

    let actions = driver
        .process_event(ServerEvent::FrameReceived { session_id: 2, frame: edit("r1", "hijack") })
        .unwrap();

    assert!(broadcasts(&actions, "r1").is_empty());
    assert!(closes(&actions).is_empty());
}

#[test]
fn join_with_empty_fields_is_dropped() {
    let mut driver = driver();
    connect(&mut driver, 1);

    let actions = driver
        .process_event(ServerEvent::FrameReceived { session_id: 1, frame: join("", "alice") })
        .unwrap();
    assert!(actions.iter().all(|a| matches!(a, ServerAction::Log { .. })));

    let actions = driver
        .process_event(ServerEvent::FrameReceived { session_id: 1, frame: join("r1", "") })
        .unwrap();
    assert!(actions.iter().all(|a| matches!(a, ServerAction::Log { .. })));

    assert_eq!(driver.room_count(), 0);
}

#[test]
fn disconnect_pushes_membership_to_the_survivors() {
    let mut driver = driver();
    connect_and_join(&mut driver, 1, "r1", "alice");
    connect_and_join(&mut driver, 2, "r1", "bob");

    let actions = driver
        .process_event(ServerEvent::ConnectionClosed {
            session_id: 2,
            reason: "peer hung up".to_string(),
        })
        .unwrap();

    let pushes = broadcasts(&actions, "r1");
    assert_eq!(pushes.len(), 1);
    assert!(matches!(
        &pushes[0].0,
        Payload::RoomUsers(push) if push.users == ["alice"]
    ));
}

#[test]
fn last_disconnect_prunes_the_room_silently() {
    let mut driver = driver();
    connect_and_join(&mut driver, 1, "r1", "alice");

    let actions = driver
        .process_event(ServerEvent::ConnectionClosed {
            session_id: 1,
            reason: "peer hung up".to_string(),
        })
        .unwrap();

    assert!(broadcasts(&actions, "r1").is_empty());
    assert_eq!(driver.room_count(), 0);
}

#[test]
fn switching_rooms_announces_the_departure_to_the_old_room() {
    let mut driver = driver();
    connect_and_join(&mut driver, 1, "r1", "alice");
    connect_and_join(&mut driver, 2, "r1", "bob");

    let actions = driver
        .process_event(ServerEvent::FrameReceived { session_id: 2, frame: join("r2", "bob") })
        .unwrap();

    let old_room = broadcasts(&actions, "r1");
    assert_eq!(old_room.len(), 1);
    assert!(matches!(
        &old_room[0].0,
        Payload::RoomUsers(push) if push.users == ["alice"]
    ));

    let new_room = broadcasts(&actions, "r2");
    assert_eq!(new_room.len(), 1);
    assert!(matches!(
        &new_room[0].0,
        Payload::RoomUsers(push) if push.users == ["bob"]
    ));
}

#[test]
fn duplicate_username_rebinds_without_ghosting() {
    let mut driver = driver();
    connect_and_join(&mut driver, 1, "r1", "alice");

    // Same user reconnects on a fresh session before the old one is swept.
    connect(&mut driver, 2);
    let actions = driver
        .process_event(ServerEvent::FrameReceived { session_id: 2, frame: join("r1", "alice") })
        .unwrap();

    let pushes = broadcasts(&actions, "r1");
    assert_eq!(pushes.len(), 1);
    assert!(matches!(
        &pushes[0].0,
        Payload::RoomUsers(push) if push.users == ["alice"]
    ));
    assert_eq!(driver.sessions_in_room("r1"), [2]);
}

#[test]
fn directory_request_reports_active_rooms() {
    let mut driver = driver();
    connect_and_join(&mut driver, 1, "r1", "alice");
    connect_and_join(&mut driver, 2, "r2", "bob");

    let request = Payload::DirectoryRequest.into_frame().unwrap();
    let actions = driver
        .process_event(ServerEvent::FrameReceived { session_id: 1, frame: request })
        .unwrap();

    let replies = sent_to(&actions, 1);
    assert_eq!(replies.len(), 1);
    let Payload::DirectoryResponse(response) = &replies[0] else {
        panic!("expected a directory response");
    };
    assert_eq!(response.rooms.len(), 2);
    assert_eq!(response.rooms[0].room_id, "r1");
    assert_eq!(response.rooms[0].users, ["alice"]);
    assert_eq!(response.rooms[1].room_id, "r2");
}

#[test]
fn undecodable_payloads_are_logged_and_dropped() {
    let mut driver = driver();
    connect_and_join(&mut driver, 1, "r1", "alice");

    let garbage = Frame::new(
        syncpad_proto::FrameHeader::new(syncpad_proto::Opcode::JoinRoom),
        vec![0xFF, 0x13, 0x37],
    );
    let actions = driver
        .process_event(ServerEvent::FrameReceived { session_id: 1, frame: garbage })
        .unwrap();

    assert!(actions.iter().all(|a| matches!(a, ServerAction::Log { .. })));
    assert_eq!(driver.session_count(), 1, "payload garbage must not drop the session");
}

#[test]
fn server_origin_opcodes_from_a_client_close_the_connection() {
    let mut driver = driver();
    connect_and_join(&mut driver, 1, "r1", "alice");

    let forged =
        Payload::UpdateCode(UpdateCode { code: "spoof".to_string() }).into_frame().unwrap();
    let actions = driver
        .process_event(ServerEvent::FrameReceived { session_id: 1, frame: forged })
        .unwrap();

    assert_eq!(closes(&actions), [1]);
}

#[test]
fn accepts_beyond_the_connection_limit_are_refused() {
    let mut driver =
        ServerDriver::new(MockEnv::new(), ServerConfig { max_connections: 1, ..Default::default() });

    driver.process_event(ServerEvent::ConnectionAccepted { session_id: 1 }).unwrap();
    let actions = driver.process_event(ServerEvent::ConnectionAccepted { session_id: 2 }).unwrap();

    assert_eq!(closes(&actions), [2]);
    assert_eq!(driver.session_count(), 1);
}

#[test]
fn frames_from_unknown_sessions_are_an_error() {
    let mut driver = driver();

    let result = driver.process_event(ServerEvent::FrameReceived { session_id: 99, frame: hello() });

    assert!(result.is_err());
}

mod properties {
    use proptest::prelude::*;

    use super::*;

    /// Random connect/join/edit/disconnect schedules.
    #[derive(Debug, Clone)]
    enum Step {
        Connect(u64),
        Join { session: u64, room: String, user: String },
        Edit { session: u64, room: String },
        Close(u64),
    }

    fn step_strategy() -> impl Strategy<Value = Step> {
        let session = 1u64..6;
        let room = "[ab]";
        let user = "[uvw]";
        prop_oneof![
            session.clone().prop_map(Step::Connect),
            (session.clone(), room, user)
                .prop_map(|(session, room, user)| Step::Join { session, room, user }),
            (session.clone(), "[ab]").prop_map(|(session, room)| Step::Edit { session, room }),
            session.prop_map(Step::Close),
        ]
    }

    proptest! {
        /// Whatever the schedule, every membership push is duplicate-free
        /// and every edit broadcast excludes its author.
        #[test]
        fn membership_pushes_never_carry_duplicates(
            steps in prop::collection::vec(step_strategy(), 1..64)
        ) {
            let mut driver = driver();

            for step in steps {
                let result = match step {
                    Step::Connect(session) => {
                        let _ = driver.process_event(
                            ServerEvent::ConnectionAccepted { session_id: session },
                        );
                        let frame = hello();
                        driver.process_event(
                            ServerEvent::FrameReceived { session_id: session, frame },
                        )
                    },
                    Step::Join { session, room, user } => driver.process_event(
                        ServerEvent::FrameReceived { session_id: session, frame: join(&room, &user) },
                    ),
                    Step::Edit { session, room } => driver.process_event(
                        ServerEvent::FrameReceived { session_id: session, frame: edit(&room, "x") },
                    ),
                    Step::Close(session) => driver.process_event(ServerEvent::ConnectionClosed {
                        session_id: session,
                        reason: "test".to_string(),
                    }),
                };

                // Unknown sessions produce errors; everything else must not.
                let Ok(actions) = result else { continue };

                for action in &actions {
                    if let ServerAction::BroadcastToRoom { frame, exclude_session, .. } = action {
                        match Payload::from_frame(frame) {
                            Ok(Payload::RoomUsers(push)) => {
                                let mut users = push.users.clone();
                                users.sort();
                                users.dedup();
                                prop_assert_eq!(
                                    users.len(),
                                    push.users.len(),
                                    "duplicate username in membership push"
                                );
                            },
                            Ok(Payload::UpdateCode(_)) => {
                                prop_assert!(
                                    exclude_session.is_some(),
                                    "edit broadcast without sender exclusion"
                                );
                            },
                            _ => {},
                        }
                    }
                }
            }
        }
    }
}
