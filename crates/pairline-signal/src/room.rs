//! Room management for signal server
//!
//! A room pairs a caller with a callee. It lives from the `create-room` that
//! names it until its last member leaves:
//!
//! ```text
//! NonExistent -> Created (1 member) -> Full (2 members) -> ... -> NonExistent
//! ```
//!
//! For every connection with a room id, that room exists and lists the
//! connection as a member, and vice versa. [`RoomManager`] is the only code
//! that changes either side.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use pairline_core::ids::{generate_room_code, room_code_at, room_code_space, ROOM_CODE_LENGTH};
use pairline_core::{ClientId, RoomId, RoomSummary, SignalError, MAX_ROOM_ID_LENGTH, MAX_ROOM_MEMBERS};

/// Random draws before falling back to a scan of the code space
const MAX_CODE_ATTEMPTS: usize = 64;

/// Largest code space scanned for a free code (three characters)
const MAX_SCANNED_CODES: u64 = 32 * 32 * 32;

use crate::registry::{ConnectionRegistry, Role};

/// A rendezvous point for two peers
#[derive(Debug, Clone)]
pub struct Room {
    id: RoomId,
    /// Members in join order
    members: Vec<ClientId>,
    created_by: ClientId,
    created_at: DateTime<Utc>,
}

impl Room {
    fn new(id: RoomId, creator: ClientId) -> Self {
        Self {
            id,
            members: vec![creator.clone()],
            created_by: creator,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn members(&self) -> &[ClientId] {
        &self.members
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.iter().any(|m| m == id)
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= MAX_ROOM_MEMBERS
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Every member except `id`
    pub fn others(&self, id: &str) -> Vec<ClientId> {
        self.members.iter().filter(|m| *m != id).cloned().collect()
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            client_count: self.members.len(),
            created_by: self.created_by.clone(),
            created_at: self.created_at,
        }
    }
}

/// Result of a successful join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub room_id: RoomId,
    /// Members that were already in the room
    pub other_members: Vec<ClientId>,
    /// All members after the join, joiner last
    pub members: Vec<ClientId>,
}

/// Result of a connection leaving its room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveOutcome {
    pub room_id: RoomId,
    /// Members still in the room; empty means the room was deleted
    pub remaining: Vec<ClientId>,
}

impl LeaveOutcome {
    pub fn room_deleted(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// Owns every room
#[derive(Debug)]
pub struct RoomManager {
    rooms: HashMap<RoomId, Room>,
    code_length: usize,
    max_id_length: usize,
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new(ROOM_CODE_LENGTH)
    }
}

impl RoomManager {
    /// Create a manager generating codes of `code_length` characters
    pub fn new(code_length: usize) -> Self {
        Self {
            rooms: HashMap::new(),
            code_length: code_length.max(1),
            max_id_length: MAX_ROOM_ID_LENGTH.max(code_length),
        }
    }

    /// Cap the length of room ids clients may choose
    pub fn with_max_id_length(mut self, max_id_length: usize) -> Self {
        self.max_id_length = max_id_length.max(self.code_length);
        self
    }

    fn check_id_length(&self, room_id: &str) -> Result<(), SignalError> {
        if room_id.len() > self.max_id_length {
            return Err(SignalError::InvalidMessageFormat(format!(
                "room id longer than {} bytes",
                self.max_id_length
            )));
        }
        Ok(())
    }

    /// Create a room with `conn_id` as its caller
    pub fn create(
        &mut self,
        registry: &mut ConnectionRegistry,
        conn_id: &str,
        requested: Option<&str>,
    ) -> Result<RoomId, SignalError> {
        let conn = registry
            .get_mut(conn_id)
            .ok_or_else(|| SignalError::ConnectionNotFound(conn_id.to_string()))?;

        if let Some(current) = &conn.room_id {
            return Err(SignalError::AlreadyInRoom(current.clone()));
        }

        let room_id = match requested.map(str::trim).filter(|r| !r.is_empty()) {
            Some(requested) => {
                self.check_id_length(requested)?;
                if self.rooms.contains_key(requested) {
                    return Err(SignalError::RoomAlreadyExists(requested.to_string()));
                }
                requested.to_string()
            }
            None => self.unused_code()?,
        };

        conn.room_id = Some(room_id.clone());
        conn.role = Role::Caller;
        self.rooms
            .insert(room_id.clone(), Room::new(room_id.clone(), conn_id.to_string()));

        info!("Room created: {} by {}", room_id, conn_id);
        Ok(room_id)
    }

    /// Generate a code no existing room uses.
    ///
    /// Short codes can run out: after repeated collisions a small code space
    /// is scanned in order, and a full one is reported as exhausted.
    fn unused_code(&self) -> Result<RoomId, SignalError> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = generate_room_code(self.code_length)
                .map_err(|e| SignalError::Entropy(e.to_string()))?;
            if !self.rooms.contains_key(&code) {
                return Ok(code);
            }
            debug!("Room code {} collided, regenerating", code);
        }

        match room_code_space(self.code_length) {
            Some(space) if space <= MAX_SCANNED_CODES => (0..space)
                .map(|index| room_code_at(self.code_length, index))
                .find(|code| !self.rooms.contains_key(code))
                .ok_or(SignalError::RoomCodesExhausted(self.code_length)),
            _ => Err(SignalError::RoomCodesExhausted(self.code_length)),
        }
    }

    /// Add `conn_id` to an existing room as its callee
    pub fn join(
        &mut self,
        registry: &mut ConnectionRegistry,
        conn_id: &str,
        room_id: &str,
    ) -> Result<JoinOutcome, SignalError> {
        let room_id = room_id.trim();
        if room_id.is_empty() {
            return Err(SignalError::RoomIdRequired);
        }
        self.check_id_length(room_id)?;

        let conn = registry
            .get_mut(conn_id)
            .ok_or_else(|| SignalError::ConnectionNotFound(conn_id.to_string()))?;

        if let Some(current) = &conn.room_id {
            return Err(SignalError::AlreadyInRoom(current.clone()));
        }

        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| SignalError::RoomNotFound(room_id.to_string()))?;

        if room.is_full() {
            return Err(SignalError::RoomFull(room_id.to_string()));
        }

        let other_members = room.members.clone();
        room.members.push(conn_id.to_string());
        conn.room_id = Some(room_id.to_string());
        conn.role = Role::Callee;

        info!("Peer {} joined room {}", conn_id, room_id);
        Ok(JoinOutcome {
            room_id: room_id.to_string(),
            other_members,
            members: room.members.clone(),
        })
    }

    /// Remove `conn_id` from its room, deleting the room once empty.
    /// Returns None if the connection was not in a room.
    pub fn leave(&mut self, registry: &mut ConnectionRegistry, conn_id: &str) -> Option<LeaveOutcome> {
        let conn = registry.get_mut(conn_id)?;
        let room_id = conn.room_id.take()?;
        conn.role = Role::None;

        let remaining = match self.rooms.get_mut(&room_id) {
            Some(room) => {
                room.members.retain(|m| m != conn_id);
                room.members.clone()
            }
            None => Vec::new(),
        };

        if remaining.is_empty() {
            self.rooms.remove(&room_id);
            info!("Room {} removed (empty)", room_id);
        } else {
            debug!("Peer {} left room {}", conn_id, room_id);
        }

        Some(LeaveOutcome { room_id, remaining })
    }

    /// Snapshot of every room, oldest first
    pub fn list(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<_> = self.rooms.values().map(Room::summary).collect();
        rooms.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        rooms
    }

    pub fn get(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Drop every room without notifying anyone
    pub fn clear(&mut self) {
        self.rooms.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionHandle;

    fn connect(registry: &mut ConnectionRegistry) -> ClientId {
        registry.register("127.0.0.1:4000".parse().unwrap(), ConnectionHandle::channel().0)
    }

    /// Check both directions of the membership invariant
    fn assert_consistent(registry: &ConnectionRegistry, rooms: &RoomManager) {
        for conn in registry.iter() {
            if let Some(room_id) = conn.room_id() {
                let room = rooms.get(room_id).expect("room of a member must exist");
                assert!(room.contains(conn.id()));
            }
        }
        for summary in rooms.list() {
            let room = rooms.get(&summary.id).unwrap();
            assert!(!room.is_empty());
            assert!(room.member_count() <= MAX_ROOM_MEMBERS);
            for member in room.members() {
                assert_eq!(registry.get(member).unwrap().room_id(), Some(room.id()));
            }
        }
    }

    #[test]
    fn test_create_room_generated_code() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::default();
        let a = connect(&mut registry);

        let room_id = rooms.create(&mut registry, &a, None).unwrap();
        assert_eq!(room_id.len(), ROOM_CODE_LENGTH);

        let room = rooms.get(&room_id).unwrap();
        assert_eq!(room.members(), &[a.clone()]);
        assert_eq!(room.created_by(), a);
        assert_eq!(registry.get(&a).unwrap().role(), Role::Caller);
        assert_consistent(&registry, &rooms);
    }

    #[test]
    fn test_create_room_requested_code() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::default();
        let a = connect(&mut registry);

        let room_id = rooms.create(&mut registry, &a, Some("  lobby ")).unwrap();
        assert_eq!(room_id, "lobby");

        // Blank ids fall back to a generated code
        let b = connect(&mut registry);
        let generated = rooms.create(&mut registry, &b, Some("   ")).unwrap();
        assert_eq!(generated.len(), ROOM_CODE_LENGTH);
    }

    #[test]
    fn test_create_existing_room_fails() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::default();
        let a = connect(&mut registry);
        let b = connect(&mut registry);

        rooms.create(&mut registry, &a, Some("lobby")).unwrap();
        let err = rooms.create(&mut registry, &b, Some("lobby")).unwrap_err();

        assert_eq!(err, SignalError::RoomAlreadyExists("lobby".into()));
        assert_eq!(rooms.get("lobby").unwrap().members(), &[a]);
        assert!(registry.get(&b).unwrap().room_id().is_none());
        assert_consistent(&registry, &rooms);
    }

    #[test]
    fn test_create_while_in_room_fails() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::default();
        let a = connect(&mut registry);

        rooms.create(&mut registry, &a, Some("one")).unwrap();
        let err = rooms.create(&mut registry, &a, Some("two")).unwrap_err();

        assert_eq!(err, SignalError::AlreadyInRoom("one".into()));
        assert!(!rooms.contains("two"));
    }

    #[test]
    fn test_join_room() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::default();
        let a = connect(&mut registry);
        let b = connect(&mut registry);

        let room_id = rooms.create(&mut registry, &a, None).unwrap();
        let outcome = rooms.join(&mut registry, &b, &room_id).unwrap();

        assert_eq!(outcome.room_id, room_id);
        assert_eq!(outcome.other_members, vec![a.clone()]);
        assert_eq!(outcome.members, vec![a, b.clone()]);
        assert_eq!(registry.get(&b).unwrap().role(), Role::Callee);
        assert!(rooms.get(&room_id).unwrap().is_full());
        assert_consistent(&registry, &rooms);
    }

    #[test]
    fn test_join_errors() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::default();
        let a = connect(&mut registry);
        let b = connect(&mut registry);
        let c = connect(&mut registry);

        assert_eq!(
            rooms.join(&mut registry, &b, "  ").unwrap_err(),
            SignalError::RoomIdRequired
        );
        assert_eq!(
            rooms.join(&mut registry, &b, "nowhere").unwrap_err(),
            SignalError::RoomNotFound("nowhere".into())
        );

        let room_id = rooms.create(&mut registry, &a, None).unwrap();
        rooms.join(&mut registry, &b, &room_id).unwrap();

        assert_eq!(
            rooms.join(&mut registry, &c, &room_id).unwrap_err(),
            SignalError::RoomFull(room_id.clone())
        );
        assert_eq!(rooms.get(&room_id).unwrap().members(), &[a, b.clone()]);
        assert!(registry.get(&c).unwrap().room_id().is_none());

        assert_eq!(
            rooms.join(&mut registry, &b, &room_id).unwrap_err(),
            SignalError::AlreadyInRoom(room_id)
        );
        assert_consistent(&registry, &rooms);
    }

    #[test]
    fn test_leave_keeps_room_with_remaining_member() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::default();
        let a = connect(&mut registry);
        let b = connect(&mut registry);

        let room_id = rooms.create(&mut registry, &a, None).unwrap();
        rooms.join(&mut registry, &b, &room_id).unwrap();

        let outcome = rooms.leave(&mut registry, &b).unwrap();
        assert_eq!(outcome.remaining, vec![a]);
        assert!(!outcome.room_deleted());
        assert_eq!(rooms.get(&room_id).unwrap().member_count(), 1);
        assert_eq!(registry.get(&b).unwrap().role(), Role::None);
        assert_consistent(&registry, &rooms);
    }

    #[test]
    fn test_leave_last_member_deletes_room() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::default();
        let a = connect(&mut registry);
        let b = connect(&mut registry);

        let room_id = rooms.create(&mut registry, &a, None).unwrap();
        let outcome = rooms.leave(&mut registry, &a).unwrap();

        assert!(outcome.room_deleted());
        assert!(rooms.is_empty());
        assert_eq!(
            rooms.join(&mut registry, &b, &room_id).unwrap_err(),
            SignalError::RoomNotFound(room_id)
        );
    }

    #[test]
    fn test_leave_without_room_is_noop() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::default();
        let a = connect(&mut registry);

        assert!(rooms.leave(&mut registry, &a).is_none());
        assert!(rooms.leave(&mut registry, "missing").is_none());
    }

    #[test]
    fn test_rejoin_after_leave() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::default();
        let a = connect(&mut registry);
        let b = connect(&mut registry);
        let c = connect(&mut registry);

        let room_id = rooms.create(&mut registry, &a, None).unwrap();
        rooms.join(&mut registry, &b, &room_id).unwrap();
        rooms.leave(&mut registry, &b).unwrap();

        // The freed slot can be taken by someone else
        let outcome = rooms.join(&mut registry, &c, &room_id).unwrap();
        assert_eq!(outcome.members, vec![a, c]);
        assert_consistent(&registry, &rooms);
    }

    #[test]
    fn test_list_rooms() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::default();
        let a = connect(&mut registry);
        let b = connect(&mut registry);
        let c = connect(&mut registry);

        rooms.create(&mut registry, &a, Some("first")).unwrap();
        rooms.create(&mut registry, &b, Some("second")).unwrap();
        rooms.join(&mut registry, &c, "first").unwrap();

        let list = rooms.list();
        assert_eq!(list.len(), 2);

        let first = list.iter().find(|r| r.id == "first").unwrap();
        assert_eq!(first.client_count, 2);
        assert_eq!(first.created_by, a);

        let second = list.iter().find(|r| r.id == "second").unwrap();
        assert_eq!(second.client_count, 1);

        // Listing has no side effects
        assert_eq!(rooms.list(), list);
    }

    #[test]
    fn test_generated_codes_fill_then_exhaust() {
        // One-character codes leave only 32 possibilities
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::new(1);

        for _ in 0..32 {
            let id = connect(&mut registry);
            rooms.create(&mut registry, &id, None).unwrap();
        }
        assert_eq!(rooms.len(), 32);
        assert_consistent(&registry, &rooms);

        let late = connect(&mut registry);
        assert_eq!(
            rooms.create(&mut registry, &late, None).unwrap_err(),
            SignalError::RoomCodesExhausted(1)
        );
        assert!(registry.get(&late).unwrap().room_id().is_none());

        // Named rooms are still available, and a freed code is reused
        rooms.create(&mut registry, &late, Some("named")).unwrap();
        let first = rooms
            .list()
            .into_iter()
            .map(|summary| summary.id)
            .find(|id| id != "named")
            .unwrap();
        let owner = rooms.get(&first).unwrap().created_by().to_string();
        rooms.leave(&mut registry, &owner).unwrap();
        assert_eq!(rooms.create(&mut registry, &owner, None).unwrap(), first);
        assert_consistent(&registry, &rooms);
    }

    #[test]
    fn test_room_id_length_limit() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::default().with_max_id_length(8);
        let a = connect(&mut registry);
        let b = connect(&mut registry);

        let long = "x".repeat(9);
        assert!(matches!(
            rooms.create(&mut registry, &a, Some(&long)),
            Err(SignalError::InvalidMessageFormat(_))
        ));
        assert!(matches!(
            rooms.join(&mut registry, &b, &long),
            Err(SignalError::InvalidMessageFormat(_))
        ));
        assert!(rooms.is_empty());

        // Surrounding whitespace does not count
        let room_id = rooms.create(&mut registry, &a, Some("  12345678  ")).unwrap();
        assert_eq!(room_id, "12345678");

        // Generated codes are never cut short by the cap
        let tight = RoomManager::new(10).with_max_id_length(4);
        assert_eq!(tight.max_id_length, 10);
    }
}
