//! Session synchronizer
//!
//! Owns the single live connection context for the current screen and turns
//! inbound topic messages into [`SyncEvent`]s. Every event is stamped with the
//! generation of the context that produced it, so anything still in flight
//! from a torn-down context can be recognised and dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::game::Grid;
use crate::ws::protocol::{
    CellRemoval, Destination, GameStatePayload, HostAction, PlayerUpdate, Room, RoomClosedNotice,
    RoomId, Scoreboard, Topic,
};

use super::channel::{ChannelError, MessageChannel};
use super::connection::{Active, ConnectionContext, ContextHandler, ContextPlan};

/// Screen contexts, each with its own connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Lobby,
    WaitingRoom(RoomId),
    Game(RoomId),
}

impl ContextKind {
    pub fn room_id(&self) -> Option<RoomId> {
        match self {
            Self::Lobby => None,
            Self::WaitingRoom(id) | Self::Game(id) => Some(*id),
        }
    }

    /// Topics and announcement for this context
    pub fn plan(&self, user_id: &str) -> ContextPlan {
        match *self {
            Self::Lobby => ContextPlan {
                topics: vec![Topic::Rooms, Topic::RoomsClosed],
                announcement: None,
            },
            Self::WaitingRoom(id) => ContextPlan {
                topics: vec![
                    Topic::Roster(id),
                    Topic::Countdown(id),
                    Topic::GameStart(id),
                    Topic::RoomClosed(id),
                    Topic::Rooms,
                ],
                announcement: Some((
                    Destination::PlayerUpdate(id),
                    serde_json::json!({ "playerId": user_id }),
                )),
            },
            Self::Game(id) => ContextPlan {
                topics: vec![
                    Topic::GameState(id),
                    Topic::CellRemoval(id),
                    Topic::Scores(id),
                    Topic::Roster(id),
                    Topic::RoomClosed(id),
                ],
                announcement: Some((Destination::RequestState(id), Value::Null)),
            },
        }
    }
}

/// Local view updates produced by inbound traffic
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Connected,
    Disconnected,
    RoomUpdated(Room),
    RoomRemoved(RoomId),
    RosterUpdated(Vec<String>),
    CountdownTick(u32),
    GameStarted,
    GridReplaced(Grid),
    CellsRemoved {
        indices: Vec<usize>,
        by: Option<String>,
    },
    ScoresUpdated(Scoreboard),
    RoomClosed,
    ServerError {
        code: String,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stamped {
    pub generation: u64,
    pub event: SyncEvent,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("no active connection context")]
    NoContext,

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Decodes topic payloads into events for one context generation
struct EventForwarder {
    generation: u64,
    events: mpsc::UnboundedSender<Stamped>,
}

impl EventForwarder {
    fn emit(&self, event: SyncEvent) {
        let stamped = Stamped {
            generation: self.generation,
            event,
        };
        if self.events.send(stamped).is_err() {
            debug!(generation = self.generation, "Event receiver gone");
        }
    }
}

fn decode<T: DeserializeOwned>(topic: &Topic, body: Value) -> Option<T> {
    match serde_json::from_value(body) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(topic = %topic, error = %e, "Dropping undecodable message");
            None
        }
    }
}

impl ContextHandler for EventForwarder {
    fn on_connect(&self) {
        self.emit(SyncEvent::Connected);
    }

    fn on_disconnect(&self) {
        self.emit(SyncEvent::Disconnected);
    }

    fn on_message(&self, topic: Topic, body: Value) {
        let event = match topic {
            Topic::Rooms => decode::<Room>(&topic, body).map(SyncEvent::RoomUpdated),
            Topic::RoomsClosed => decode::<RoomClosedNotice>(&topic, body)
                .map(|notice| SyncEvent::RoomRemoved(notice.room_id)),
            Topic::Roster(_) => decode::<Vec<String>>(&topic, body).map(SyncEvent::RosterUpdated),
            Topic::Countdown(_) => decode::<u32>(&topic, body).map(SyncEvent::CountdownTick),
            Topic::GameStart(_) => Some(SyncEvent::GameStarted),
            Topic::RoomClosed(_) => Some(SyncEvent::RoomClosed),
            Topic::GameState(_) => decode::<GameStatePayload>(&topic, body)
                .map(|payload| SyncEvent::GridReplaced(payload.apples)),
            Topic::CellRemoval(_) => {
                decode::<CellRemoval>(&topic, body).map(|removal| SyncEvent::CellsRemoved {
                    indices: removal.removed_indices,
                    by: removal.user_id,
                })
            }
            Topic::Scores(_) => decode::<Scoreboard>(&topic, body).map(SyncEvent::ScoresUpdated),
        };
        if let Some(event) = event {
            self.emit(event);
        }
    }

    fn on_error(&self, code: String, message: String) {
        self.emit(SyncEvent::ServerError { code, message });
    }
}

pub struct SessionSynchronizer {
    user_id: String,
    channel: Arc<dyn MessageChannel>,
    reconnect_delay: Duration,
    events: mpsc::UnboundedSender<Stamped>,
    generation: u64,
    current: Option<(ContextKind, ConnectionContext<Active>)>,
}

impl SessionSynchronizer {
    pub fn new(
        user_id: impl Into<String>,
        channel: Arc<dyn MessageChannel>,
        reconnect_delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<Stamped>) {
        let (events, rx) = mpsc::unbounded_channel();
        let sync = Self {
            user_id: user_id.into(),
            channel,
            reconnect_delay,
            events,
            generation: 0,
            current: None,
        };
        (sync, rx)
    }

    /// Switch to `kind`. Entering the context that is already live is a
    /// no-op and returns false; otherwise the old context is torn down first.
    pub fn enter(&mut self, kind: ContextKind) -> bool {
        if self.context() == Some(kind) {
            debug!(context = ?kind, "Context already active");
            return false;
        }
        self.leave();

        self.generation += 1;
        let handler = EventForwarder {
            generation: self.generation,
            events: self.events.clone(),
        };
        let context = ConnectionContext::new(
            kind.plan(&self.user_id),
            self.channel.clone(),
            Arc::new(handler),
            self.reconnect_delay,
        )
        .activate();

        debug!(context = ?kind, generation = self.generation, "Context entered");
        self.current = Some((kind, context));
        true
    }

    /// Tear down the live context, if any
    pub fn leave(&mut self) {
        if let Some((kind, context)) = self.current.take() {
            context.teardown();
            debug!(context = ?kind, generation = self.generation, "Context left");
        }
    }

    pub fn context(&self) -> Option<ContextKind> {
        self.current.as_ref().map(|(kind, _)| *kind)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True if the event came from the live context
    pub fn is_current(&self, stamped: &Stamped) -> bool {
        self.current.is_some() && stamped.generation == self.generation
    }

    pub fn is_connected(&self) -> bool {
        self.current
            .as_ref()
            .map(|(_, context)| context.is_connected())
            .unwrap_or(false)
    }

    fn publish<T: Serialize + ?Sized>(&self, destination: Destination, body: &T) -> Result<(), SyncError> {
        let (_, context) = self.current.as_ref().ok_or(SyncError::NoContext)?;
        context.publish(destination, body)?;
        Ok(())
    }

    pub fn request_countdown(&self, room_id: RoomId) -> Result<(), SyncError> {
        self.publish(
            Destination::StartCountdown(room_id),
            &HostAction {
                user_id: self.user_id.clone(),
            },
        )
    }

    pub fn request_start(&self, room_id: RoomId) -> Result<(), SyncError> {
        self.publish(
            Destination::StartGame(room_id),
            &HostAction {
                user_id: self.user_id.clone(),
            },
        )
    }

    /// Ask for a roster republish without announcing anyone
    pub fn refresh_roster(&self, room_id: RoomId) -> Result<(), SyncError> {
        self.publish(Destination::PlayerUpdate(room_id), &PlayerUpdate::default())
    }

    pub fn request_state(&self, room_id: RoomId) -> Result<(), SyncError> {
        self.publish(Destination::RequestState(room_id), &())
    }

    pub fn publish_removal(&self, room_id: RoomId, indices: &[usize]) -> Result<(), SyncError> {
        self.publish(
            Destination::RemoveCells(room_id),
            &CellRemoval {
                removed_indices: indices.to_vec(),
                user_id: Some(self.user_id.clone()),
            },
        )
    }
}

impl Drop for SessionSynchronizer {
    fn drop(&mut self) {
        self.leave();
    }
}
