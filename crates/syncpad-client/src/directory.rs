//! Advisory directory of active rooms.

use syncpad_proto::{Payload, RoomSummary};

/// Client-side view of the room directory.
///
/// The directory exists for discovery UIs only. It is never authoritative:
/// join decisions do not consult it and stale summaries are expected. Until
/// a live snapshot arrives the directory serves a canned sample so the
/// discovery screen has something to render.
#[derive(Debug, Clone)]
pub struct RoomDirectory {
    rooms: Vec<RoomSummary>,
    live: bool,
}

impl RoomDirectory {
    /// Create a directory pre-populated with the sample rooms.
    #[must_use]
    pub fn new() -> Self {
        Self { rooms: sample_rooms(), live: false }
    }

    /// Payload that asks the server for a fresh snapshot.
    #[must_use]
    pub fn refresh_request() -> Payload {
        Payload::DirectoryRequest
    }

    /// Replace the whole snapshot with a server response.
    ///
    /// An empty response is still live: it means no rooms are active, not
    /// that the sample should come back.
    pub fn apply_response(&mut self, rooms: Vec<RoomSummary>) {
        self.rooms = rooms;
        self.live = true;
    }

    /// Current summaries, in server order.
    #[must_use]
    pub fn list(&self) -> &[RoomSummary] {
        &self.rooms
    }

    /// Whether the snapshot came from the server rather than the sample.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live
    }
}

impl Default for RoomDirectory {
    fn default() -> Self {
        Self::new()
    }
}

/// Canned summaries shown before any server snapshot arrives.
#[must_use]
pub fn sample_rooms() -> Vec<RoomSummary> {
    vec![
        RoomSummary {
            room_id: "1a2b3c".to_string(),
            users: vec!["Alice".to_string(), "Bob".to_string()],
            primary_language: "javascript".to_string(),
            idle_secs: 0,
        },
        RoomSummary {
            room_id: "4d5e6f".to_string(),
            users: vec!["Charlie".to_string(), "Dave".to_string()],
            primary_language: "python".to_string(),
            idle_secs: 300,
        },
        RoomSummary {
            room_id: "7g8h9i".to_string(),
            users: vec!["Eve".to_string()],
            primary_language: "java".to_string(),
            idle_secs: 900,
        },
    ]
}
