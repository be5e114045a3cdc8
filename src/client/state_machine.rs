//! Room state machine: Lobby -> WaitingRoom -> Countdown -> InGame
//!
//! Pure state. Transitions come only from local intent (the `joined`, `left`
//! and `authorize_start` calls) and from inbound [`SyncEvent`]s via `apply`.

use std::collections::BTreeMap;

use tracing::debug;

use crate::ws::protocol::{Room, RoomId};

use super::synchronizer::SyncEvent;

/// Wire code for a removal the server refused
const REMOVAL_REJECTED: &str = "removal_rejected";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Lobby,
    WaitingRoom,
    Countdown { remaining: u32 },
    InGame,
}

impl Screen {
    pub fn in_room(&self) -> bool {
        !matches!(self, Screen::Lobby)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Screen,
    pub to: Screen,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("only the host can start the game")]
    NotHost,

    #[error("not in a room")]
    NotInRoom,

    #[error("already in a room")]
    AlreadyInRoom,

    #[error("the game is already starting")]
    AlreadyStarting,
}

#[derive(Debug, Clone)]
pub struct RoomStateMachine {
    user_id: String,
    screen: Screen,
    room: Option<Room>,
    roster: Vec<String>,
    /// Lobby listing keyed by id
    rooms: BTreeMap<RoomId, Room>,
    notice: Option<String>,
}

impl RoomStateMachine {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            screen: Screen::Lobby,
            room: None,
            roster: Vec::new(),
            rooms: BTreeMap::new(),
            notice: None,
        }
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn room(&self) -> Option<&Room> {
        self.room.as_ref()
    }

    pub fn room_id(&self) -> Option<RoomId> {
        self.room.as_ref().map(|r| r.room_id)
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn clear_notice(&mut self) {
        self.notice = None;
    }

    pub fn is_host(&self) -> bool {
        self.room
            .as_ref()
            .map(|r| r.host_user_id == self.user_id)
            .unwrap_or(false)
    }

    fn go(&mut self, to: Screen) -> Option<Transition> {
        let from = self.screen;
        if from == to {
            return None;
        }
        self.screen = to;
        debug!(?from, ?to, "Screen transition");
        Some(Transition { from, to })
    }

    /// Replace the lobby listing with a freshly pulled list
    pub fn rooms_loaded(&mut self, rooms: Vec<Room>) {
        self.rooms = rooms.into_iter().map(|r| (r.room_id, r)).collect();
    }

    /// A join or create succeeded
    pub fn joined(&mut self, room: Room) -> Result<Transition, StateError> {
        if self.screen.in_room() {
            return Err(StateError::AlreadyInRoom);
        }
        self.rooms.insert(room.room_id, room.clone());
        self.room = Some(room);
        self.roster.clear();
        self.notice = None;
        self.go(Screen::WaitingRoom).ok_or(StateError::AlreadyInRoom)
    }

    /// A join failed; stay put and surface the reason
    pub fn join_failed(&mut self, reason: impl Into<String>) {
        self.notice = Some(reason.into());
    }

    /// Gate for the host-only start control
    pub fn authorize_start(&self) -> Result<RoomId, StateError> {
        let room_id = self.room_id().ok_or(StateError::NotInRoom)?;
        match self.screen {
            Screen::WaitingRoom if self.is_host() => Ok(room_id),
            Screen::WaitingRoom => Err(StateError::NotHost),
            Screen::Countdown { .. } | Screen::InGame => Err(StateError::AlreadyStarting),
            Screen::Lobby => Err(StateError::NotInRoom),
        }
    }

    /// Back to the lobby, with an optional message for the user
    pub fn left(&mut self, notice: Option<String>) -> Option<Transition> {
        self.room = None;
        self.roster.clear();
        self.notice = notice;
        self.go(Screen::Lobby)
    }

    /// Fold one inbound event into the state
    pub fn apply(&mut self, event: &SyncEvent) -> Option<Transition> {
        match event {
            SyncEvent::RoomUpdated(room) => {
                self.rooms.insert(room.room_id, room.clone());
                if self.room_id() == Some(room.room_id) {
                    self.room = Some(room.clone());
                }
                None
            }
            SyncEvent::RoomRemoved(room_id) => {
                self.rooms.remove(room_id);
                if self.room_id() == Some(*room_id) {
                    self.left(Some("room closed".to_string()))
                } else {
                    None
                }
            }
            SyncEvent::RosterUpdated(players) => {
                if self.screen.in_room() {
                    self.roster = players.clone();
                }
                None
            }
            SyncEvent::CountdownTick(remaining) => match self.screen {
                Screen::WaitingRoom | Screen::Countdown { .. } => {
                    self.go(Screen::Countdown {
                        remaining: *remaining,
                    })
                }
                _ => None,
            },
            SyncEvent::GameStarted => match self.screen {
                Screen::WaitingRoom | Screen::Countdown { .. } => self.go(Screen::InGame),
                _ => None,
            },
            SyncEvent::RoomClosed => {
                if self.screen.in_room() {
                    if let Some(room_id) = self.room_id() {
                        self.rooms.remove(&room_id);
                    }
                    self.left(Some("room closed".to_string()))
                } else {
                    None
                }
            }
            // A lost race for cells is a silent reject; the snapshot that
            // follows it reconciles the board
            SyncEvent::ServerError { code, .. } if code == REMOVAL_REJECTED => None,
            SyncEvent::ServerError { message, .. } => {
                self.notice = Some(message.clone());
                None
            }
            SyncEvent::Connected
            | SyncEvent::Disconnected
            | SyncEvent::GridReplaced(_)
            | SyncEvent::CellsRemoved { .. }
            | SyncEvent::ScoresUpdated(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::RoomPhase;
    use uuid::Uuid;

    fn room(host: &str, current: u32, max: u32) -> Room {
        Room {
            room_id: Uuid::new_v4(),
            room_name: "orchard".to_string(),
            host_user_id: host.to_string(),
            max_players: max,
            current_players: current,
            is_joinable: current < max,
            phase: RoomPhase::Waiting,
        }
    }

    fn in_waiting_room(user: &str, host: &str) -> RoomStateMachine {
        let mut machine = RoomStateMachine::new(user);
        machine.joined(room(host, 1, 8)).unwrap();
        machine
    }

    #[test]
    fn join_enters_waiting_room() {
        let mut machine = RoomStateMachine::new("GUEST_10000");
        let transition = machine.joined(room("GUEST_10000", 1, 8)).unwrap();
        assert_eq!(
            transition,
            Transition {
                from: Screen::Lobby,
                to: Screen::WaitingRoom
            }
        );
        assert_eq!(
            machine.joined(room("GUEST_10000", 1, 8)),
            Err(StateError::AlreadyInRoom)
        );
    }

    #[test]
    fn failed_join_changes_nothing() {
        let mut machine = RoomStateMachine::new("GUEST_10000");
        machine.join_failed("room full");
        assert_eq!(machine.screen(), Screen::Lobby);
        assert_eq!(machine.notice(), Some("room full"));
    }

    #[test]
    fn non_host_cannot_start() {
        let machine = in_waiting_room("GUEST_20000", "GUEST_10000");
        assert_eq!(machine.authorize_start(), Err(StateError::NotHost));
        assert_eq!(machine.screen(), Screen::WaitingRoom);

        let host = in_waiting_room("GUEST_10000", "GUEST_10000");
        assert_eq!(host.authorize_start(), Ok(host.room_id().unwrap()));
    }

    #[test]
    fn host_handoff_arrives_via_room_update() {
        let mut machine = in_waiting_room("GUEST_20000", "GUEST_10000");
        let mut updated = machine.room().unwrap().clone();
        updated.host_user_id = "GUEST_20000".to_string();

        assert!(machine.apply(&SyncEvent::RoomUpdated(updated)).is_none());
        assert!(machine.is_host());
    }

    #[test]
    fn countdown_then_start() {
        let mut machine = in_waiting_room("GUEST_10000", "GUEST_10000");

        let t = machine.apply(&SyncEvent::CountdownTick(3)).unwrap();
        assert_eq!(t.to, Screen::Countdown { remaining: 3 });
        machine.apply(&SyncEvent::CountdownTick(2));
        assert_eq!(machine.screen(), Screen::Countdown { remaining: 2 });
        assert_eq!(machine.authorize_start(), Err(StateError::AlreadyStarting));

        let t = machine.apply(&SyncEvent::GameStarted).unwrap();
        assert_eq!(t.to, Screen::InGame);
        assert!(machine.apply(&SyncEvent::CountdownTick(1)).is_none());
    }

    #[test]
    fn events_outside_a_room_do_not_transition() {
        let mut machine = RoomStateMachine::new("GUEST_10000");
        for event in [
            SyncEvent::CountdownTick(3),
            SyncEvent::GameStarted,
            SyncEvent::RoomClosed,
            SyncEvent::RosterUpdated(vec!["GUEST_1".to_string()]),
        ] {
            assert!(machine.apply(&event).is_none(), "{event:?}");
        }
        assert_eq!(machine.screen(), Screen::Lobby);
        assert!(machine.roster().is_empty());
    }

    #[test]
    fn room_closure_returns_to_lobby() {
        let mut machine = in_waiting_room("GUEST_10000", "GUEST_10000");
        machine.apply(&SyncEvent::GameStarted);

        let t = machine.apply(&SyncEvent::RoomClosed).unwrap();
        assert_eq!(t.to, Screen::Lobby);
        assert!(machine.room().is_none());
        assert_eq!(machine.notice(), Some("room closed"));
        assert_eq!(machine.rooms().count(), 0);
    }

    #[test]
    fn lobby_list_upserts_and_removes() {
        let mut machine = RoomStateMachine::new("GUEST_10000");
        let a = room("GUEST_1", 1, 8);
        let b = room("GUEST_2", 8, 8);
        machine.rooms_loaded(vec![a.clone()]);

        machine.apply(&SyncEvent::RoomUpdated(b.clone()));
        let mut a2 = a.clone();
        a2.current_players = 2;
        machine.apply(&SyncEvent::RoomUpdated(a2.clone()));
        assert_eq!(machine.rooms().count(), 2);
        assert!(machine.rooms().any(|r| *r == a2));
        assert!(!machine.rooms().find(|r| r.room_id == b.room_id).unwrap().accepts_joins());

        machine.apply(&SyncEvent::RoomRemoved(a.room_id));
        assert_eq!(machine.rooms().count(), 1);
    }

    #[test]
    fn rejected_removal_is_not_shown() {
        let mut machine = in_waiting_room("GUEST_10000", "GUEST_10000");
        machine.apply(&SyncEvent::GameStarted);

        machine.apply(&SyncEvent::ServerError {
            code: "removal_rejected".to_string(),
            message: "removal rejected: cell 0 is already removed".to_string(),
        });
        assert!(machine.notice().is_none());

        machine.apply(&SyncEvent::ServerError {
            code: "not_member".to_string(),
            message: "player is not in this room".to_string(),
        });
        assert_eq!(machine.notice(), Some("player is not in this room"));
    }

    #[test]
    fn leave_always_returns_to_lobby() {
        let mut machine = in_waiting_room("GUEST_10000", "GUEST_10000");
        machine.apply(&SyncEvent::CountdownTick(2));

        let t = machine.left(Some("leave failed".to_string())).unwrap();
        assert_eq!(t.from, Screen::Countdown { remaining: 2 });
        assert_eq!(t.to, Screen::Lobby);
        assert!(machine.left(None).is_none());
    }
}
