//! Client session driver
//!
//! Ties the room directory, the synchronizer, the state machine and the
//! board together. Every method takes `&mut self`, so one input, event or
//! animation frame is handled to completion before the next.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::game::animation::ANIMATION_TICK;
use crate::game::{Board, CompletedRemoval, MatchOutcome, Point};
use crate::ws::protocol::{
    CreateRoomRequest, JoinRoomRequest, LeaveRoomRequest, Room, RoomId, Scoreboard,
};

use super::channel::{MessageChannel, WsChannel};
use super::directory::{DirectoryError, HttpRoomDirectory, RoomDirectoryApi};
use super::state_machine::{RoomStateMachine, Screen, StateError, Transition};
use super::synchronizer::{ContextKind, SessionSynchronizer, Stamped, SyncError, SyncEvent};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    State(#[from] StateError),
}

pub struct ClientSession {
    user_id: String,
    directory: Arc<dyn RoomDirectoryApi>,
    sync: SessionSynchronizer,
    events: tokio::sync::mpsc::UnboundedReceiver<Stamped>,
    machine: RoomStateMachine,
    board: Board,
    scores: Scoreboard,
    /// Runs only while a removal is animating
    frame_clock: Option<Interval>,
}

enum Wake {
    Event(Option<Stamped>),
    Frame,
}

impl ClientSession {
    pub fn new(
        user_id: impl Into<String>,
        directory: Arc<dyn RoomDirectoryApi>,
        channel: Arc<dyn MessageChannel>,
        reconnect_delay: Duration,
    ) -> Self {
        let user_id = user_id.into();
        let (sync, events) = SessionSynchronizer::new(user_id.clone(), channel, reconnect_delay);
        Self {
            machine: RoomStateMachine::new(user_id.clone()),
            user_id,
            directory,
            sync,
            events,
            board: Board::default(),
            scores: Scoreboard::new(),
            frame_clock: None,
        }
    }

    /// Session over HTTP and WebSocket to a running server
    pub fn connect(user_id: impl Into<String>, config: &ClientConfig) -> Self {
        let user_id = user_id.into();
        let directory = Arc::new(HttpRoomDirectory::new(config.api_base()));
        let channel = Arc::new(WsChannel::new(config.ws_url(&user_id)));
        Self::new(user_id, directory, channel, config.reconnect_delay)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn screen(&self) -> Screen {
        self.machine.screen()
    }

    pub fn state(&self) -> &RoomStateMachine {
        &self.machine
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Server-side scores, as last pushed
    pub fn scores(&self) -> &Scoreboard {
        &self.scores
    }

    pub fn is_connected(&self) -> bool {
        self.sync.is_connected()
    }

    pub fn context(&self) -> Option<ContextKind> {
        self.sync.context()
    }

    /// Subscribe to directory pushes, then pull the current list
    pub async fn enter_lobby(&mut self) -> Result<(), ClientError> {
        self.sync.enter(ContextKind::Lobby);
        self.refresh_rooms().await
    }

    pub async fn refresh_rooms(&mut self) -> Result<(), ClientError> {
        let rooms = self.directory.list_rooms().await?;
        self.machine.rooms_loaded(rooms);
        Ok(())
    }

    pub async fn create_room(
        &mut self,
        room_name: &str,
        max_players: Option<u32>,
    ) -> Result<Room, ClientError> {
        self.ensure_in_lobby()?;
        let req = CreateRoomRequest {
            room_name: room_name.to_string(),
            user_id: self.user_id.clone(),
            max_players,
        };
        match self.directory.create_room(&req).await {
            Ok(room) => self.enter_waiting_room(room),
            Err(e) => {
                self.machine.join_failed(e.to_string());
                Err(e.into())
            }
        }
    }

    pub async fn join_room(&mut self, room_id: RoomId) -> Result<Room, ClientError> {
        self.ensure_in_lobby()?;
        let req = JoinRoomRequest {
            room_id,
            user_id: self.user_id.clone(),
        };
        match self.directory.join_room(&req).await {
            Ok(room) => self.enter_waiting_room(room),
            Err(e) => {
                warn!(room_id = %room_id, error = %e, "Join failed");
                self.machine.join_failed(e.to_string());
                Err(e.into())
            }
        }
    }

    fn ensure_in_lobby(&self) -> Result<(), ClientError> {
        if self.machine.screen().in_room() {
            return Err(StateError::AlreadyInRoom.into());
        }
        Ok(())
    }

    fn enter_waiting_room(&mut self, room: Room) -> Result<Room, ClientError> {
        self.machine.joined(room.clone())?;
        self.sync.enter(ContextKind::WaitingRoom(room.room_id));
        info!(room_id = %room.room_id, user_id = %self.user_id, "Entered waiting room");
        Ok(room)
    }

    /// Host-only. Non-hosts get `NotHost` and nothing is published.
    pub fn start_countdown(&mut self) -> Result<(), ClientError> {
        let room_id = self.machine.authorize_start()?;
        self.sync.request_countdown(room_id)?;
        Ok(())
    }

    /// Host-only start without a countdown
    pub fn start_now(&mut self) -> Result<(), ClientError> {
        let room_id = self.machine.authorize_start()?;
        self.sync.request_start(room_id)?;
        Ok(())
    }

    /// Leave the current room.
    ///
    /// Subscriptions are released first and the session always ends up in
    /// the lobby. A room that is already gone counts as left; any other
    /// failure is surfaced after the return to the lobby.
    pub async fn leave_room(&mut self) -> Result<(), ClientError> {
        let room_id = self.machine.room_id().ok_or(StateError::NotInRoom)?;
        self.sync.leave();

        let req = LeaveRoomRequest {
            room_id,
            user_id: self.user_id.clone(),
        };
        let result = match self.directory.leave_room(&req).await {
            Ok(()) => Ok(()),
            Err(DirectoryError::RoomNotFound) => {
                debug!(room_id = %room_id, "Room already gone on leave");
                Ok(())
            }
            Err(e) => {
                warn!(room_id = %room_id, error = %e, "Leave failed");
                Err(e)
            }
        };

        let notice = result.as_ref().err().map(|e| format!("leave failed: {e}"));
        self.machine.left(notice);
        self.return_to_lobby().await;
        result.map_err(Into::into)
    }

    async fn return_to_lobby(&mut self) {
        self.board = Board::default();
        self.scores.clear();
        self.sync.enter(ContextKind::Lobby);
        if let Err(e) = self.refresh_rooms().await {
            warn!(error = %e, "Room list refresh failed");
        }
    }

    pub fn pointer_down(&mut self, point: Point) {
        if self.machine.screen() == Screen::InGame {
            self.board.pointer_down(point);
        }
    }

    pub fn pointer_move(&mut self, point: Point) {
        if self.machine.screen() == Screen::InGame {
            self.board.pointer_move(point);
        }
    }

    pub fn pointer_up(&mut self) -> MatchOutcome {
        if self.machine.screen() != Screen::InGame {
            return MatchOutcome::Rejected;
        }
        self.board.pointer_up()
    }

    /// Advance removal animations and publish every batch that finished.
    /// Batches are committed locally even if publishing fails; the first
    /// publish failure is returned.
    pub fn tick(&mut self) -> Result<Vec<CompletedRemoval>, ClientError> {
        let completed = self.board.tick();
        let Some(room_id) = self.machine.room_id() else {
            return Ok(completed);
        };

        let mut first_error = None;
        for removal in &completed {
            if let Err(e) = self.sync.publish_removal(room_id, &removal.indices) {
                warn!(room_id = %room_id, error = %e, "Removal publish failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(completed),
        }
    }

    /// Wait for the next event from the live context and apply it. While a
    /// removal is animating, an animation frame due every `ANIMATION_TICK`
    /// counts as a step too. Returns `None` when the event stream has ended.
    pub async fn step(&mut self) -> Option<Option<Transition>> {
        if self.board.animator().is_idle() {
            self.frame_clock = None;
            let stamped = self.events.recv().await?;
            return Some(self.handle(stamped).await);
        }

        let clock = self.frame_clock.get_or_insert_with(|| {
            let mut clock = interval_at(Instant::now() + ANIMATION_TICK, ANIMATION_TICK);
            clock.set_missed_tick_behavior(MissedTickBehavior::Delay);
            clock
        });
        let wake = tokio::select! {
            stamped = self.events.recv() => Wake::Event(stamped),
            _ = clock.tick() => Wake::Frame,
        };

        match wake {
            Wake::Event(stamped) => Some(self.handle(stamped?).await),
            Wake::Frame => {
                // Publish failures are already logged by `tick`
                let _ = self.tick();
                Some(None)
            }
        }
    }

    /// Process events until `done` holds or `limit` elapses
    pub async fn run_until<F>(&mut self, limit: Duration, mut done: F) -> bool
    where
        F: FnMut(&Self) -> bool,
    {
        let deadline = tokio::time::Instant::now() + limit;
        while !done(self) {
            match tokio::time::timeout_at(deadline, self.step()).await {
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => return false,
            }
        }
        true
    }

    /// Apply one stamped event. Events from a torn-down context are dropped.
    pub async fn handle(&mut self, stamped: Stamped) -> Option<Transition> {
        if !self.sync.is_current(&stamped) {
            debug!(generation = stamped.generation, "Dropping event from stale context");
            return None;
        }
        let event = stamped.event;

        match &event {
            SyncEvent::GridReplaced(grid) if self.machine.screen() == Screen::InGame => {
                let cancelled = self.board.replace_grid(grid.clone());
                if cancelled > 0 {
                    debug!(cancelled, "Snapshot cancelled in-flight removals");
                }
            }
            SyncEvent::CellsRemoved { indices, .. } if self.machine.screen() == Screen::InGame => {
                self.board.apply_removal(indices);
            }
            SyncEvent::ScoresUpdated(scores) => self.scores = scores.clone(),
            SyncEvent::Disconnected => debug!("Waiting for reconnect"),
            _ => {}
        }

        let transition = self.machine.apply(&event)?;
        match transition.to {
            Screen::InGame => {
                if let Some(room_id) = self.machine.room_id() {
                    self.board = Board::default();
                    self.scores.clear();
                    self.sync.enter(ContextKind::Game(room_id));
                }
            }
            Screen::Lobby => self.return_to_lobby().await,
            Screen::WaitingRoom | Screen::Countdown { .. } => {}
        }
        Some(transition)
    }
}
