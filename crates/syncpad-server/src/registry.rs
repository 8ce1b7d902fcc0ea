//! Room registry: sessions, membership, and activity tracking.
//!
//! The registry is the authoritative membership table. It maintains three
//! maps: session id → session state, room id → room, and session id → room
//! id (reverse index for cleanup on disconnect). Rooms are created lazily on
//! the first join and pruned when their last member leaves.
//!
//! # Invariants
//!
//! - A room's member list never contains duplicate usernames. A join under
//!   a name already present re-binds that member to the new session instead
//!   of growing the list, which keeps reconnect-after-drop from ghosting a
//!   second copy of the user.
//! - A session is a member of at most one room; joining a second room
//!   leaves the first.

use std::{collections::HashMap, ops::Sub, time::Duration};

use syncpad_proto::RoomSummary;

/// Language reported in directory summaries.
///
/// Clients do not announce their editor language, so every live room is
/// summarized with the client default.
const DEFAULT_LANGUAGE: &str = "javascript";

/// Per-session state tracked by the registry.
#[derive(Debug, Clone)]
struct Session<I> {
    /// Whether the `Hello`/`HelloReply` exchange has completed.
    handshaken: bool,
    /// Last time a frame arrived on this session.
    last_seen: I,
}

/// One member of a room.
#[derive(Debug, Clone)]
struct Member {
    username: String,
    session_id: u64,
}

/// One active room.
#[derive(Debug, Clone)]
struct Room<I> {
    /// Members in join order. Unique by username.
    members: Vec<Member>,
    /// Last join or edit.
    last_active: I,
}

/// A room a session just left, with whoever is still in it.
///
/// The driver pushes a fresh membership list to `remaining` so peers see
/// the departure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomDeparture {
    /// Room that lost a member.
    pub room_id: String,
    /// Usernames still in the room. Empty means the room was pruned.
    pub remaining: Vec<String>,
}

/// Result of a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Membership of the joined room after the join, in join order.
    pub members: Vec<String>,
    /// Room the session implicitly left to get here, if any.
    pub left: Option<RoomDeparture>,
}

/// Authoritative membership table and activity tracker.
///
/// Generic over the instant type `I` so it runs identically under the
/// system clock and a simulated one.
#[derive(Debug, Default)]
pub struct RoomRegistry<I> {
    sessions: HashMap<u64, Session<I>>,
    rooms: HashMap<String, Room<I>>,
    session_rooms: HashMap<u64, String>,
}

impl<I> RoomRegistry<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { sessions: HashMap::new(), rooms: HashMap::new(), session_rooms: HashMap::new() }
    }

    /// Register a freshly accepted session.
    ///
    /// Returns `false` if the id is already taken (a runtime bug: session
    /// ids are minted uniquely).
    pub fn register_session(&mut self, session_id: u64, now: I) -> bool {
        if self.sessions.contains_key(&session_id) {
            return false;
        }
        self.sessions.insert(session_id, Session { handshaken: false, last_seen: now });
        true
    }

    /// Whether the session is registered.
    #[must_use]
    pub fn has_session(&self, session_id: u64) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// Mark the session's handshake complete.
    pub fn mark_handshaken(&mut self, session_id: u64) {
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.handshaken = true;
        }
    }

    /// Whether the session has completed its handshake.
    #[must_use]
    pub fn is_handshaken(&self, session_id: u64) -> bool {
        self.sessions.get(&session_id).is_some_and(|s| s.handshaken)
    }

    /// Record frame arrival on a session.
    pub fn touch_session(&mut self, session_id: u64, now: I) {
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.last_seen = now;
        }
    }

    /// Sessions that have been silent longer than `timeout`.
    #[must_use]
    pub fn idle_sessions(&self, now: I, timeout: Duration) -> Vec<u64> {
        self.sessions
            .iter()
            .filter(|(_, session)| now - session.last_seen > timeout)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Move a session into a room, leaving any room it was in before.
    ///
    /// The room is created if it does not exist. If `username` is already
    /// present in the room, the existing member entry is re-bound to this
    /// session and the member list is unchanged.
    ///
    /// Returns `None` if the session is not registered.
    pub fn join_room(
        &mut self,
        session_id: u64,
        room_id: &str,
        username: &str,
        now: I,
    ) -> Option<JoinOutcome> {
        if !self.sessions.contains_key(&session_id) {
            return None;
        }

        let left = match self.session_rooms.get(&session_id) {
            Some(current) if current == room_id => None,
            Some(_) => self.leave_room(session_id),
            None => None,
        };

        let room = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room { members: Vec::new(), last_active: now });
        room.last_active = now;

        if let Some(member) = room.members.iter_mut().find(|m| m.username == username) {
            let stale_session = member.session_id;
            member.session_id = session_id;
            if stale_session != session_id {
                self.session_rooms.remove(&stale_session);
            }
        } else {
            room.members.push(Member { username: username.to_string(), session_id });
        }

        self.session_rooms.insert(session_id, room_id.to_string());

        Some(JoinOutcome { members: self.member_names(room_id), left })
    }

    /// Remove a session entirely (disconnect or idle sweep).
    ///
    /// Returns the departure to announce if the session was in a room.
    pub fn remove_session(&mut self, session_id: u64) -> Option<RoomDeparture> {
        let departure = self.leave_room(session_id);
        self.sessions.remove(&session_id);
        departure
    }

    /// Take a session out of its room without unregistering it.
    ///
    /// Prunes the room if it becomes empty.
    fn leave_room(&mut self, session_id: u64) -> Option<RoomDeparture> {
        let room_id = self.session_rooms.remove(&session_id)?;
        let room = self.rooms.get_mut(&room_id)?;

        room.members.retain(|m| m.session_id != session_id);
        let remaining = room.members.iter().map(|m| m.username.clone()).collect::<Vec<_>>();

        if remaining.is_empty() {
            self.rooms.remove(&room_id);
        }

        Some(RoomDeparture { room_id, remaining })
    }

    /// Current member usernames of a room, in join order.
    #[must_use]
    pub fn member_names(&self, room_id: &str) -> Vec<String> {
        self.rooms
            .get(room_id)
            .map(|room| room.members.iter().map(|m| m.username.clone()).collect())
            .unwrap_or_default()
    }

    /// Session ids of a room's members.
    #[must_use]
    pub fn sessions_in_room(&self, room_id: &str) -> Vec<u64> {
        self.rooms
            .get(room_id)
            .map(|room| room.members.iter().map(|m| m.session_id).collect())
            .unwrap_or_default()
    }

    /// Room a session is currently a member of.
    #[must_use]
    pub fn room_for_session(&self, session_id: u64) -> Option<&str> {
        self.session_rooms.get(&session_id).map(String::as_str)
    }

    /// Record activity (an edit) in a room.
    pub fn touch_room(&mut self, room_id: &str, now: I) {
        if let Some(room) = self.rooms.get_mut(room_id) {
            room.last_active = now;
        }
    }

    /// Advisory summaries of all active rooms.
    ///
    /// Idleness is reported as whole seconds since the room last saw a
    /// join or edit.
    #[must_use]
    pub fn summaries(&self, now: I) -> Vec<RoomSummary> {
        let mut rooms: Vec<_> = self.rooms.iter().collect();
        rooms.sort_by(|(a, _), (b, _)| a.cmp(b));

        rooms
            .into_iter()
            .map(|(room_id, room)| RoomSummary {
                room_id: room_id.clone(),
                users: room.members.iter().map(|m| m.username.clone()).collect(),
                primary_language: DEFAULT_LANGUAGE.to_string(),
                idle_secs: (now - room.last_active).as_secs(),
            })
            .collect()
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of active rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn registry_with_sessions(ids: &[u64]) -> (RoomRegistry<Instant>, Instant) {
        let now = Instant::now();
        let mut registry = RoomRegistry::new();
        for id in ids {
            assert!(registry.register_session(*id, now));
        }
        (registry, now)
    }

    #[test]
    fn duplicate_session_id_is_rejected() {
        let (mut registry, now) = registry_with_sessions(&[1]);

        assert!(!registry.register_session(1, now));
        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn join_creates_room_and_orders_members_by_arrival() {
        let (mut registry, now) = registry_with_sessions(&[1, 2]);

        let outcome = registry.join_room(1, "r1", "alice", now).unwrap();
        assert_eq!(outcome.members, ["alice"]);
        assert!(outcome.left.is_none());

        let outcome = registry.join_room(2, "r1", "bob", now).unwrap();
        assert_eq!(outcome.members, ["alice", "bob"]);

        assert_eq!(registry.sessions_in_room("r1"), [1, 2]);
    }

    #[test]
    fn join_by_unregistered_session_is_refused() {
        let (mut registry, now) = registry_with_sessions(&[1]);

        assert!(registry.join_room(99, "r1", "mallory", now).is_none());
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn duplicate_username_rebinds_instead_of_duplicating() {
        let (mut registry, now) = registry_with_sessions(&[1, 2]);

        registry.join_room(1, "r1", "alice", now).unwrap();
        let outcome = registry.join_room(2, "r1", "alice", now).unwrap();

        assert_eq!(outcome.members, ["alice"]);
        assert_eq!(registry.sessions_in_room("r1"), [2]);
        // The stale session is no longer considered a member.
        assert!(registry.room_for_session(1).is_none());
    }

    #[test]
    fn switching_rooms_reports_the_departure() {
        let (mut registry, now) = registry_with_sessions(&[1, 2]);

        registry.join_room(1, "r1", "alice", now).unwrap();
        registry.join_room(2, "r1", "bob", now).unwrap();

        let outcome = registry.join_room(2, "r2", "bob", now).unwrap();
        assert_eq!(outcome.members, ["bob"]);
        assert_eq!(
            outcome.left,
            Some(RoomDeparture { room_id: "r1".to_string(), remaining: vec!["alice".to_string()] })
        );
    }

    #[test]
    fn rejoining_the_same_room_is_a_no_op_for_membership() {
        let (mut registry, now) = registry_with_sessions(&[1]);

        registry.join_room(1, "r1", "alice", now).unwrap();
        let outcome = registry.join_room(1, "r1", "alice", now).unwrap();

        assert_eq!(outcome.members, ["alice"]);
        assert!(outcome.left.is_none());
        assert_eq!(registry.room_count(), 1);
    }

    #[test]
    fn removing_last_member_prunes_the_room() {
        let (mut registry, now) = registry_with_sessions(&[1]);

        registry.join_room(1, "r1", "alice", now).unwrap();
        let departure = registry.remove_session(1).unwrap();

        assert_eq!(departure.room_id, "r1");
        assert!(departure.remaining.is_empty());
        assert_eq!(registry.room_count(), 0);
        assert!(!registry.has_session(1));
    }

    #[test]
    fn remove_session_outside_any_room_reports_nothing() {
        let (mut registry, _) = registry_with_sessions(&[1]);

        assert!(registry.remove_session(1).is_none());
    }

    #[test]
    fn idle_sessions_are_found_by_last_frame_time() {
        let (mut registry, now) = registry_with_sessions(&[1, 2]);

        let later = now + Duration::from_secs(120);
        registry.touch_session(2, later);

        let idle = registry.idle_sessions(later, Duration::from_secs(60));
        assert_eq!(idle, [1]);
    }

    #[test]
    fn summaries_report_membership_and_idleness() {
        let (mut registry, now) = registry_with_sessions(&[1, 2]);

        registry.join_room(1, "r1", "alice", now).unwrap();
        registry.join_room(2, "r2", "bob", now).unwrap();

        let later = now + Duration::from_secs(300);
        registry.touch_room("r2", later);

        let summaries = registry.summaries(later);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].room_id, "r1");
        assert_eq!(summaries[0].users, ["alice"]);
        assert_eq!(summaries[0].idle_secs, 300);
        assert_eq!(summaries[0].primary_language, "javascript");
        assert_eq!(summaries[1].room_id, "r2");
        assert_eq!(summaries[1].idle_secs, 0);
    }
}
