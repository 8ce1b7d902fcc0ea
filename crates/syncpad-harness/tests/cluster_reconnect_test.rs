//! Wire-failure and recovery scenarios on the deterministic cluster.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use syncpad_client::{ConnectionState, SessionNotice};
use syncpad_harness::TestCluster;
use syncpad_server::ServerConfig;

const ALICE: usize = 0;
const BOB: usize = 1;

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

#[test]
fn reconnect_rejoins_the_room_without_user_involvement() {
    let mut cluster = TestCluster::new(1, 2);

    cluster.join(ALICE, "r1", "alice").unwrap();
    cluster.join(BOB, "r1", "bob").unwrap();

    cluster.drop_wire(ALICE);
    assert_eq!(cluster.connection_state(ALICE), ConnectionState::Reconnecting);
    assert_eq!(cluster.session(BOB).unwrap().members, ["bob"]);

    cluster.restore_wire(ALICE);
    cluster.tick(secs(2));

    assert_eq!(cluster.connection_state(ALICE), ConnectionState::Connected);
    assert_eq!(cluster.session(ALICE).unwrap().members, ["bob", "alice"]);
    assert_eq!(cluster.session(BOB).unwrap().members, ["bob", "alice"]);

    // No ghost entry: one session per client on the server.
    assert_eq!(cluster.server().session_count(), 2);
}

#[test]
fn edits_while_the_wire_is_down_are_lost() {
    let mut cluster = TestCluster::new(1, 2);

    cluster.join(ALICE, "r1", "alice").unwrap();
    cluster.join(BOB, "r1", "bob").unwrap();

    cluster.drop_wire(ALICE);
    cluster.edit(ALICE, "written into the void");

    // Local buffer keeps the edit; nobody else ever sees it.
    assert_eq!(cluster.session(ALICE).unwrap().buffer, "written into the void");
    assert_eq!(cluster.session(BOB).unwrap().buffer, "");

    cluster.restore_wire(ALICE);
    cluster.tick(secs(2));

    // Reconnecting does not replay the dropped edit.
    assert_eq!(cluster.session(BOB).unwrap().buffer, "");

    // The next live edit flows normally and overwrites the orphan.
    cluster.edit(BOB, "fresh start");
    assert_eq!(cluster.session(ALICE).unwrap().buffer, "fresh start");
}

#[test]
fn retry_budget_exhaustion_is_reported_exactly_once() {
    let mut cluster = TestCluster::new(1, 1);

    cluster.join(ALICE, "r1", "alice").unwrap();
    cluster.drop_wire(ALICE);

    // Each tick lands after the pending backoff, so every attempt in the
    // budget runs and fails.
    for _ in 0..5 {
        cluster.tick(secs(60));
    }

    let exhausted = cluster
        .notices(ALICE)
        .iter()
        .filter(|n| matches!(n, SessionNotice::RetriesExhausted))
        .count();
    assert_eq!(exhausted, 1);
    assert_eq!(cluster.connection_state(ALICE), ConnectionState::Disconnected);

    // The session survives for a manual rejoin, and no further dials run.
    assert!(cluster.session(ALICE).is_some());
    cluster.tick(secs(60));
    assert_eq!(cluster.connection_state(ALICE), ConnectionState::Disconnected);
}

#[test]
fn manual_rejoin_recovers_after_exhaustion() {
    let mut cluster = TestCluster::new(1, 1);

    cluster.join(ALICE, "r1", "alice").unwrap();
    cluster.drop_wire(ALICE);
    for _ in 0..5 {
        cluster.tick(secs(60));
    }
    assert_eq!(cluster.connection_state(ALICE), ConnectionState::Disconnected);

    cluster.restore_wire(ALICE);
    cluster.join(ALICE, "r1", "alice").unwrap();

    assert_eq!(cluster.connection_state(ALICE), ConnectionState::Connected);
    assert_eq!(cluster.session(ALICE).unwrap().members, ["alice"]);
}

#[test]
fn idle_sessions_are_swept() {
    let config = ServerConfig { idle_timeout: secs(2), ..ServerConfig::default() };
    let mut cluster = TestCluster::with_server_config(1, 1, config);

    cluster.join(ALICE, "r1", "alice").unwrap();
    assert_eq!(cluster.server().session_count(), 1);

    // Quiet for longer than the idle budget but shorter than the client's
    // heartbeat interval, so nothing touches the session.
    cluster.tick(secs(3));

    assert_eq!(cluster.server().session_count(), 0);
    assert_eq!(cluster.server().room_count(), 0);
    assert!(cluster.notices(ALICE).contains(&SessionNotice::ConnectionLost));
}

#[test]
fn heartbeats_keep_an_idle_session_alive() {
    let config = ServerConfig { idle_timeout: secs(20), ..ServerConfig::default() };
    let mut cluster = TestCluster::with_server_config(1, 1, config);

    cluster.join(ALICE, "r1", "alice").unwrap();

    // Each step crosses the 15s heartbeat interval but not the 20s idle
    // budget, so pings keep the session registered.
    for _ in 0..4 {
        cluster.tick(secs(16));
    }

    assert_eq!(cluster.connection_state(ALICE), ConnectionState::Connected);
    assert_eq!(cluster.server().session_count(), 1);
}
