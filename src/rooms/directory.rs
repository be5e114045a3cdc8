//! Room records, membership and the start barrier

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use uuid::Uuid;

use crate::ws::protocol::{Room, RoomId, RoomPhase};

/// Upper bound accepted for `maxPlayers`
pub const MAX_ROOM_CAPACITY: u32 = 16;

/// Room operation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("room not found")]
    NotFound(RoomId),

    #[error("room full")]
    Full(RoomId),

    #[error("game already started")]
    AlreadyStarted(RoomId),

    #[error("only the host can start the game")]
    NotHost,

    #[error("player is not in this room")]
    NotMember,

    #[error("room name must not be empty")]
    EmptyName,

    #[error("max players must be between 1 and {MAX_ROOM_CAPACITY}, got {0}")]
    InvalidCapacity(u32),
}

impl RoomError {
    /// Stable machine-readable code for wire errors
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "room_not_found",
            Self::Full(_) => "room_full",
            Self::AlreadyStarted(_) => "already_started",
            Self::NotHost => "not_host",
            Self::NotMember => "not_member",
            Self::EmptyName => "invalid_name",
            Self::InvalidCapacity(_) => "invalid_capacity",
        }
    }
}

/// A room as held by the directory
#[derive(Debug, Clone)]
pub struct RoomEntry {
    pub room_id: RoomId,
    pub room_name: String,
    pub host_user_id: String,
    pub max_players: u32,
    /// Join order; the first entry inherits host when the host leaves
    pub players: Vec<String>,
    pub phase: RoomPhase,
    /// Creation order
    pub seq: u64,
}

impl RoomEntry {
    pub fn record(&self) -> Room {
        let current_players = self.players.len() as u32;
        Room {
            room_id: self.room_id,
            room_name: self.room_name.clone(),
            host_user_id: self.host_user_id.clone(),
            max_players: self.max_players,
            current_players,
            is_joinable: current_players < self.max_players,
            phase: self.phase,
        }
    }
}

/// Result of a successful leave
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Room still has members
    Left { room: Room, roster: Vec<String> },
    /// That was the last member; the room is gone
    Closed(RoomId),
}

/// All live rooms
pub struct RoomDirectory {
    rooms: DashMap<RoomId, RoomEntry>,
    next_seq: AtomicU64,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Create a room with `user_id` as host and only member
    pub fn create(&self, room_name: &str, user_id: &str, max_players: u32) -> Result<Room, RoomError> {
        let room_name = room_name.trim();
        if room_name.is_empty() {
            return Err(RoomError::EmptyName);
        }
        if !(1..=MAX_ROOM_CAPACITY).contains(&max_players) {
            return Err(RoomError::InvalidCapacity(max_players));
        }

        let entry = RoomEntry {
            room_id: Uuid::new_v4(),
            room_name: room_name.to_string(),
            host_user_id: user_id.to_string(),
            max_players,
            players: vec![user_id.to_string()],
            phase: RoomPhase::Waiting,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };
        let room = entry.record();
        self.rooms.insert(entry.room_id, entry);
        Ok(room)
    }

    /// Add a player. Rejoining a room one is already in succeeds unchanged.
    pub fn join(&self, room_id: RoomId, user_id: &str) -> Result<Room, RoomError> {
        let mut entry = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;

        if entry.players.iter().any(|p| p == user_id) {
            return Ok(entry.record());
        }
        if entry.phase != RoomPhase::Waiting {
            return Err(RoomError::AlreadyStarted(room_id));
        }
        if entry.players.len() as u32 >= entry.max_players {
            return Err(RoomError::Full(room_id));
        }

        entry.players.push(user_id.to_string());
        Ok(entry.record())
    }

    /// Remove a player; the last one out destroys the room
    pub fn leave(&self, room_id: RoomId, user_id: &str) -> Result<LeaveOutcome, RoomError> {
        {
            let mut entry = self
                .rooms
                .get_mut(&room_id)
                .ok_or(RoomError::NotFound(room_id))?;

            let position = entry
                .players
                .iter()
                .position(|p| p == user_id)
                .ok_or(RoomError::NotMember)?;
            entry.players.remove(position);

            if entry.host_user_id == user_id {
                if let Some(next_host) = entry.players.first().cloned() {
                    entry.host_user_id = next_host;
                }
            }
        }

        // Only an empty room is removed, even if someone joined in between
        if self
            .rooms
            .remove_if(&room_id, |_, entry| entry.players.is_empty())
            .is_some()
        {
            return Ok(LeaveOutcome::Closed(room_id));
        }

        match self.rooms.get(&room_id) {
            Some(entry) => Ok(LeaveOutcome::Left {
                room: entry.record(),
                roster: entry.players.clone(),
            }),
            None => Ok(LeaveOutcome::Closed(room_id)),
        }
    }

    /// Host-only: enter the start barrier
    pub fn begin_countdown(&self, room_id: RoomId, user_id: &str) -> Result<Room, RoomError> {
        let mut entry = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;

        if entry.host_user_id != user_id {
            return Err(RoomError::NotHost);
        }
        if entry.phase != RoomPhase::Waiting {
            return Err(RoomError::AlreadyStarted(room_id));
        }
        entry.phase = RoomPhase::Countdown;
        Ok(entry.record())
    }

    /// Move into the game. With `user_id` set the caller must be host and the
    /// room may still be waiting; without it the room must be counting down.
    pub fn begin_game(&self, room_id: RoomId, user_id: Option<&str>) -> Result<Room, RoomError> {
        let mut entry = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;

        match user_id {
            Some(user_id) if entry.host_user_id != user_id => return Err(RoomError::NotHost),
            Some(_) if entry.phase == RoomPhase::InGame => {
                return Err(RoomError::AlreadyStarted(room_id))
            }
            None if entry.phase != RoomPhase::Countdown => {
                return Err(RoomError::AlreadyStarted(room_id))
            }
            _ => {}
        }
        entry.phase = RoomPhase::InGame;
        Ok(entry.record())
    }

    /// Reopen a room whose start was aborted
    pub fn reopen(&self, room_id: RoomId) -> Option<Room> {
        let mut entry = self.rooms.get_mut(&room_id)?;
        entry.phase = RoomPhase::Waiting;
        Some(entry.record())
    }

    pub fn phase(&self, room_id: RoomId) -> Option<RoomPhase> {
        self.rooms.get(&room_id).map(|e| e.phase)
    }

    pub fn get(&self, room_id: RoomId) -> Option<Room> {
        self.rooms.get(&room_id).map(|e| e.record())
    }

    pub fn roster(&self, room_id: RoomId) -> Option<Vec<String>> {
        self.rooms.get(&room_id).map(|e| e.players.clone())
    }

    /// Every room, oldest first
    pub fn list(&self) -> Vec<Room> {
        let mut entries: Vec<(u64, Room)> = self
            .rooms
            .iter()
            .map(|e| (e.seq, e.record()))
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, room)| room).collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl Default for RoomDirectory {
    fn default() -> Self {
        Self::new()
    }
}
