//! Messaging channel wire types
//! Frames, topic names, destination names and their JSON payloads

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::game::grid::Grid;

/// Server-assigned room identifier
pub type RoomId = Uuid;

/// Room lifecycle as seen by the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomPhase {
    /// Accepting players
    Waiting,
    /// Start barrier: countdown running, joins refused
    Countdown,
    /// Game in progress, joins refused
    InGame,
}

/// Room directory record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub room_id: RoomId,
    pub room_name: String,
    pub host_user_id: String,
    pub max_players: u32,
    pub current_players: u32,
    /// `current_players < max_players`
    pub is_joinable: bool,
    pub phase: RoomPhase,
}

impl Room {
    /// True if a join would be accepted right now
    pub fn accepts_joins(&self) -> bool {
        self.is_joinable && self.phase == RoomPhase::Waiting
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Start receiving a topic under the given subscription id
    Subscribe { id: String, topic: String },

    /// Stop a subscription
    Unsubscribe { id: String },

    /// Publish to an application destination
    Send {
        destination: String,
        #[serde(default)]
        body: Value,
    },

    /// Ping for latency measurement
    Ping { t: u64 },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// First frame on every connection
    Connected { server_time: u64 },

    /// A message published on a subscribed topic
    Message {
        subscription: String,
        topic: String,
        body: Value,
    },

    /// A frame or destination request failed
    Error { code: String, message: String },

    /// Pong response
    Pong { t: u64 },
}

/// Inbound topics (server publishes, clients subscribe)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Single updated [`Room`] record
    Rooms,
    /// [`RoomClosedNotice`] when a room is destroyed
    RoomsClosed,
    /// Ordered list of player ids
    Roster(RoomId),
    /// Null payload; the room was destroyed
    RoomClosed(RoomId),
    /// Remaining seconds
    Countdown(RoomId),
    /// Null payload; the game has started
    GameStart(RoomId),
    /// [`GameStatePayload`]
    GameState(RoomId),
    /// [`CellRemoval`]
    CellRemoval(RoomId),
    /// [`Scoreboard`]
    Scores(RoomId),
}

impl Topic {
    pub fn path(&self) -> String {
        match self {
            Self::Rooms => "/topic/rooms".to_string(),
            Self::RoomsClosed => "/topic/rooms/closed".to_string(),
            Self::Roster(id) => format!("/topic/waitingRoom/{id}/player/update"),
            Self::RoomClosed(id) => format!("/topic/waitingRoom/{id}/closed"),
            Self::Countdown(id) => format!("/topic/gameRoom/{id}/game/countdown"),
            Self::GameStart(id) => format!("/topic/gameRoom/{id}/game/start"),
            Self::GameState(id) => format!("/topic/gameRoom/{id}/gameState"),
            Self::CellRemoval(id) => format!("/topic/gameRoom/{id}/appleUpdate"),
            Self::Scores(id) => format!("/topic/gameRoom/{id}/scores"),
        }
    }

    pub fn parse(path: &str) -> Option<Self> {
        let parts: Vec<&str> = path.strip_prefix("/topic/")?.split('/').collect();
        let topic = match parts.as_slice() {
            ["rooms"] => Self::Rooms,
            ["rooms", "closed"] => Self::RoomsClosed,
            ["waitingRoom", id, "player", "update"] => Self::Roster(id.parse().ok()?),
            ["waitingRoom", id, "closed"] => Self::RoomClosed(id.parse().ok()?),
            ["gameRoom", id, "game", "countdown"] => Self::Countdown(id.parse().ok()?),
            ["gameRoom", id, "game", "start"] => Self::GameStart(id.parse().ok()?),
            ["gameRoom", id, "gameState"] => Self::GameState(id.parse().ok()?),
            ["gameRoom", id, "appleUpdate"] => Self::CellRemoval(id.parse().ok()?),
            ["gameRoom", id, "scores"] => Self::Scores(id.parse().ok()?),
            _ => return None,
        };
        Some(topic)
    }

    /// Room this topic is scoped to, if any
    pub fn room_id(&self) -> Option<RoomId> {
        match self {
            Self::Rooms | Self::RoomsClosed => None,
            Self::Roster(id)
            | Self::RoomClosed(id)
            | Self::Countdown(id)
            | Self::GameStart(id)
            | Self::GameState(id)
            | Self::CellRemoval(id)
            | Self::Scores(id) => Some(*id),
        }
    }

    /// Every topic scoped to one room
    pub fn room_topics(room_id: RoomId) -> [Topic; 7] {
        [
            Self::Roster(room_id),
            Self::RoomClosed(room_id),
            Self::Countdown(room_id),
            Self::GameStart(room_id),
            Self::GameState(room_id),
            Self::CellRemoval(room_id),
            Self::Scores(room_id),
        ]
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Outbound destinations (clients publish, server handles)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// [`CreateRoomRequest`]
    CreateRoom,
    /// [`JoinRoomRequest`]
    JoinRoom,
    /// [`PlayerUpdate`]; republishes the roster
    PlayerUpdate(RoomId),
    /// [`HostAction`]; host only
    StartCountdown(RoomId),
    /// [`HostAction`]; host only, skips the countdown
    StartGame(RoomId),
    /// No payload; republishes the grid snapshot
    RequestState(RoomId),
    /// [`CellRemoval`]
    RemoveCells(RoomId),
}

impl Destination {
    pub fn path(&self) -> String {
        match self {
            Self::CreateRoom => "/app/rooms/create".to_string(),
            Self::JoinRoom => "/app/rooms/join".to_string(),
            Self::PlayerUpdate(id) => format!("/app/waitingRoom/{id}/player/update"),
            Self::StartCountdown(id) => format!("/app/gameRoom/{id}/game/start-countdown"),
            Self::StartGame(id) => format!("/app/gameRoom/{id}/game/start"),
            Self::RequestState(id) => format!("/app/gameRoom/{id}/game/state"),
            Self::RemoveCells(id) => format!("/app/gameRoom/{id}/apple/remove"),
        }
    }

    pub fn parse(path: &str) -> Option<Self> {
        let parts: Vec<&str> = path.strip_prefix("/app/")?.split('/').collect();
        let destination = match parts.as_slice() {
            ["rooms", "create"] => Self::CreateRoom,
            ["rooms", "join"] => Self::JoinRoom,
            ["waitingRoom", id, "player", "update"] => Self::PlayerUpdate(id.parse().ok()?),
            ["gameRoom", id, "game", "start-countdown"] => Self::StartCountdown(id.parse().ok()?),
            ["gameRoom", id, "game", "start"] => Self::StartGame(id.parse().ok()?),
            ["gameRoom", id, "game", "state"] => Self::RequestState(id.parse().ok()?),
            ["gameRoom", id, "apple", "remove"] => Self::RemoveCells(id.parse().ok()?),
            _ => return None,
        };
        Some(destination)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub room_name: String,
    pub user_id: String,
    #[serde(default)]
    pub max_players: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    pub room_id: RoomId,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoomRequest {
    pub room_id: RoomId,
    pub user_id: String,
}

/// Join announcement (with id) or plain roster refresh (without)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
}

/// Host-only requests carry the caller so the server can check it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostAction {
    pub user_id: String,
}

/// Full grid snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStatePayload {
    pub apples: Grid,
}

/// Cells cleared by a match. Sent by the matching client, rebroadcast by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellRemoval {
    pub removed_indices: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomClosedNotice {
    pub room_id: RoomId,
}

/// Server-side score per player id
pub type Scoreboard = BTreeMap<String, u32>;
