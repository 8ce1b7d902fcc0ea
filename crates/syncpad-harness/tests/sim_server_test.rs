//! Wire-level server tests over turmoil's simulated TCP.
//!
//! These exercise the real framing path: header reads, payload reads, and
//! connection teardown as a peer actually observes them.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::time::Duration;

use syncpad_harness::{SimServer, read_frame, write_frame};
use syncpad_proto::{CodeChanged, Hello, JoinRoom, Payload};
use turmoil::{Builder, net::TcpStream};

fn frame(payload: Payload) -> syncpad_proto::Frame {
    payload.into_frame().unwrap()
}

fn start_server(sim: &mut turmoil::Sim<'_>) {
    sim.host("server", || async {
        let server = SimServer::bind("0.0.0.0:7420").await?;
        server.run().await?;
        Ok(())
    });
}

#[test]
fn handshake_completes_over_the_wire() {
    let mut sim = Builder::new().build();
    start_server(&mut sim);

    sim.client("alice", async {
        let mut stream = TcpStream::connect("server:7420").await?;

        write_frame(&mut stream, &frame(Payload::Hello(Hello { protocol_version: 1 }))).await?;

        let reply = read_frame(&mut stream).await?;
        match Payload::from_frame(&reply)? {
            Payload::HelloReply(reply) => assert_eq!(reply.session_id, 1),
            other => panic!("expected HelloReply, got {other:?}"),
        }

        Ok(())
    });

    sim.run().unwrap();
}

#[test]
fn frames_before_the_handshake_end_the_connection() {
    let mut sim = Builder::new().build();
    start_server(&mut sim);

    sim.client("alice", async {
        let mut stream = TcpStream::connect("server:7420").await?;

        let join = JoinRoom { room_id: "r1".to_string(), username: "alice".to_string() };
        write_frame(&mut stream, &frame(Payload::JoinRoom(join))).await?;

        // The server closes without replying; the next read sees EOF.
        assert!(read_frame(&mut stream).await.is_err());

        Ok(())
    });

    sim.run().unwrap();
}

#[test]
fn unsupported_protocol_version_ends_the_connection() {
    let mut sim = Builder::new().build();
    start_server(&mut sim);

    sim.client("alice", async {
        let mut stream = TcpStream::connect("server:7420").await?;

        write_frame(&mut stream, &frame(Payload::Hello(Hello { protocol_version: 99 }))).await?;

        assert!(read_frame(&mut stream).await.is_err());

        Ok(())
    });

    sim.run().unwrap();
}

#[test]
fn edits_fan_out_over_the_wire_without_echo() {
    let mut sim = Builder::new().build();
    start_server(&mut sim);

    sim.client("alice", async {
        let mut stream = TcpStream::connect("server:7420").await?;

        write_frame(&mut stream, &frame(Payload::Hello(Hello { protocol_version: 1 }))).await?;
        read_frame(&mut stream).await?;

        let join = JoinRoom { room_id: "r1".to_string(), username: "alice".to_string() };
        write_frame(&mut stream, &frame(Payload::JoinRoom(join))).await?;

        // Own join: membership is just alice.
        match Payload::from_frame(&read_frame(&mut stream).await?)? {
            Payload::RoomUsers(push) => assert_eq!(push.users, ["alice"]),
            other => panic!("expected RoomUsers, got {other:?}"),
        }

        // Bob's join reaches alice too.
        match Payload::from_frame(&read_frame(&mut stream).await?)? {
            Payload::RoomUsers(push) => assert_eq!(push.users, ["alice", "bob"]),
            other => panic!("expected RoomUsers, got {other:?}"),
        }

        // Bob's edit arrives as a buffer replacement.
        match Payload::from_frame(&read_frame(&mut stream).await?)? {
            Payload::UpdateCode(update) => assert_eq!(update.code, "bob's draft"),
            other => panic!("expected UpdateCode, got {other:?}"),
        }

        let edit = CodeChanged { room_id: "r1".to_string(), code: "alice's reply".to_string() };
        write_frame(&mut stream, &frame(Payload::CodeChanged(edit))).await?;

        Ok(())
    });

    sim.client("bob", async {
        // Let alice join first so membership order is deterministic.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut stream = TcpStream::connect("server:7420").await?;

        write_frame(&mut stream, &frame(Payload::Hello(Hello { protocol_version: 1 }))).await?;
        match Payload::from_frame(&read_frame(&mut stream).await?)? {
            Payload::HelloReply(reply) => assert_eq!(reply.session_id, 2),
            other => panic!("expected HelloReply, got {other:?}"),
        }

        let join = JoinRoom { room_id: "r1".to_string(), username: "bob".to_string() };
        write_frame(&mut stream, &frame(Payload::JoinRoom(join))).await?;

        match Payload::from_frame(&read_frame(&mut stream).await?)? {
            Payload::RoomUsers(push) => assert_eq!(push.users, ["alice", "bob"]),
            other => panic!("expected RoomUsers, got {other:?}"),
        }

        let edit = CodeChanged { room_id: "r1".to_string(), code: "bob's draft".to_string() };
        write_frame(&mut stream, &frame(Payload::CodeChanged(edit))).await?;

        // The next frame bob sees is alice's reply: his own edit was never
        // echoed back, or it would have arrived first.
        match Payload::from_frame(&read_frame(&mut stream).await?)? {
            Payload::UpdateCode(update) => assert_eq!(update.code, "alice's reply"),
            other => panic!("expected UpdateCode, got {other:?}"),
        }

        Ok(())
    });

    sim.run().unwrap();
}

#[test]
fn disconnect_over_the_wire_updates_the_survivors() {
    let mut sim = Builder::new().build();
    start_server(&mut sim);

    sim.client("alice", async {
        let mut stream = TcpStream::connect("server:7420").await?;

        write_frame(&mut stream, &frame(Payload::Hello(Hello { protocol_version: 1 }))).await?;
        read_frame(&mut stream).await?;

        let join = JoinRoom { room_id: "r1".to_string(), username: "alice".to_string() };
        write_frame(&mut stream, &frame(Payload::JoinRoom(join))).await?;
        read_frame(&mut stream).await?;

        // Bob joins, then his stream drops.
        match Payload::from_frame(&read_frame(&mut stream).await?)? {
            Payload::RoomUsers(push) => assert_eq!(push.users, ["alice", "bob"]),
            other => panic!("expected RoomUsers, got {other:?}"),
        }
        match Payload::from_frame(&read_frame(&mut stream).await?)? {
            Payload::RoomUsers(push) => assert_eq!(push.users, ["alice"]),
            other => panic!("expected RoomUsers, got {other:?}"),
        }

        Ok(())
    });

    sim.client("bob", async {
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut stream = TcpStream::connect("server:7420").await?;

        write_frame(&mut stream, &frame(Payload::Hello(Hello { protocol_version: 1 }))).await?;
        read_frame(&mut stream).await?;

        let join = JoinRoom { room_id: "r1".to_string(), username: "bob".to_string() };
        write_frame(&mut stream, &frame(Payload::JoinRoom(join))).await?;
        read_frame(&mut stream).await?;

        drop(stream);
        Ok(())
    });

    sim.run().unwrap();
}
