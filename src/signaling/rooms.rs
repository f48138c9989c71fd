use std::collections::HashMap;

use super::types::{ConnId, RoomId, SignalingError};

/// Rooms hold exactly two participants once full.
pub(crate) const ROOM_CAPACITY: usize = 2;

/// An active discussion room.
#[derive(Debug, Default)]
struct Room {
    members: Vec<ConnId>,
}

/// Outcome of a join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RoomJoin {
    /// The connection entered the room. `peer` is the member that was
    /// already inside, if any.
    Entered { members: usize, peer: Option<ConnId> },
    /// The connection is already a member; membership unchanged.
    AlreadyMember { members: usize },
}

/// Outcome of removing one member from one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Departure {
    /// The room lost its last member and was deleted.
    Emptied,
    /// One member stays behind.
    PeerRemains(ConnId),
    NotAMember,
}

/// Tracks active rooms and their membership.
///
/// Rooms come into being two ways: the matchmaker creates one with both
/// matched connections at once, or the first direct join creates it empty
/// and later joins fill it. A room is deleted the moment its last member
/// leaves; a stale id simply names a room that no longer exists.
#[derive(Debug, Default)]
pub(crate) struct RoomRegistry {
    rooms: HashMap<RoomId, Room>,
}

impl RoomRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Matchmaker path: create a room already holding both matched sides.
    pub(crate) fn create(&mut self, room_id: RoomId, first: ConnId, second: ConnId) {
        self.rooms.insert(
            room_id,
            Room {
                members: vec![first, second],
            },
        );
    }

    /// Direct path: enter a room, creating it when absent. A repeat join by
    /// a current member is absorbed; a third distinct connection is turned
    /// away with the membership untouched.
    pub(crate) fn join(
        &mut self,
        room_id: RoomId,
        conn: ConnId,
    ) -> Result<RoomJoin, SignalingError> {
        let room = self.rooms.entry(room_id).or_default();
        if room.members.contains(&conn) {
            return Ok(RoomJoin::AlreadyMember {
                members: room.members.len(),
            });
        }
        if room.members.len() >= ROOM_CAPACITY {
            return Err(SignalingError::RoomFull(room_id));
        }
        let peer = room.members.first().copied();
        room.members.push(conn);
        Ok(RoomJoin::Entered {
            members: room.members.len(),
            peer,
        })
    }

    /// Current members, oldest first. Empty slice for an unknown room.
    pub(crate) fn members_of(&self, room_id: &RoomId) -> &[ConnId] {
        self.rooms
            .get(room_id)
            .map(|room| room.members.as_slice())
            .unwrap_or(&[])
    }

    /// Remove one member from one room, deleting the room when it empties.
    pub(crate) fn remove_member(&mut self, room_id: &RoomId, conn: &ConnId) -> Departure {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return Departure::NotAMember;
        };
        let Some(pos) = room.members.iter().position(|member| member == conn) else {
            return Departure::NotAMember;
        };
        room.members.remove(pos);
        match room.members.first().copied() {
            Some(peer) => Departure::PeerRemains(peer),
            None => {
                self.rooms.remove(room_id);
                Departure::Emptied
            }
        }
    }

    /// Evict a connection from every room it occupies. Disconnect path.
    pub(crate) fn remove_conn(&mut self, conn: &ConnId) -> Vec<(RoomId, Departure)> {
        let occupied: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|(_, room)| room.members.contains(conn))
            .map(|(room_id, _)| *room_id)
            .collect();
        occupied
            .into_iter()
            .map(|room_id| {
                let departure = self.remove_member(&room_id, conn);
                (room_id, departure)
            })
            .collect()
    }

    /// Throw away a room whose pairing was aborted before anyone was told.
    pub(crate) fn discard(&mut self, room_id: &RoomId) {
        self.rooms.remove(room_id);
    }

    #[cfg(test)]
    pub(crate) fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
