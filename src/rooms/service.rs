//! Room service - room operations, topic fan-out and the countdown driver

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::game::{Grid, GridError, GameRegistry, GameSession, RemovalDecision, RemovalError};
use crate::ws::broker::Broker;
use crate::ws::protocol::{
    CellRemoval, CreateRoomRequest, GameStatePayload, JoinRoomRequest, LeaveRoomRequest, Room,
    RoomClosedNotice, RoomId, RoomPhase, Scoreboard, Topic,
};

use super::directory::{LeaveOutcome, RoomDirectory, RoomError};

/// Tunables for room behaviour
#[derive(Debug, Clone)]
pub struct RoomSettings {
    pub default_max_players: u32,
    pub countdown_secs: u32,
    pub countdown_tick: Duration,
}

impl RoomSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_max_players: config.default_max_players,
            countdown_secs: config.countdown_secs,
            countdown_tick: Duration::from_secs(1),
        }
    }
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            default_max_players: 8,
            countdown_secs: 3,
            countdown_tick: Duration::from_secs(1),
        }
    }
}

/// Errors from starting a game
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Generation(#[from] GridError),
}

/// Room service
pub struct RoomService {
    directory: RoomDirectory,
    games: GameRegistry,
    broker: Arc<Broker>,
    settings: RoomSettings,
}

impl RoomService {
    pub fn new(broker: Arc<Broker>, settings: RoomSettings) -> Self {
        Self {
            directory: RoomDirectory::new(),
            games: GameRegistry::new(),
            broker,
            settings,
        }
    }

    pub fn directory(&self) -> &RoomDirectory {
        &self.directory
    }

    pub fn games(&self) -> &GameRegistry {
        &self.games
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    pub fn list_rooms(&self) -> Vec<Room> {
        self.directory.list()
    }

    /// Create a room; the creator becomes host
    pub fn create_room(&self, req: &CreateRoomRequest) -> Result<Room, RoomError> {
        let max_players = req.max_players.unwrap_or(self.settings.default_max_players);
        let room = self.directory.create(&req.room_name, &req.user_id, max_players)?;

        info!(
            room_id = %room.room_id,
            host = %room.host_user_id,
            max_players = room.max_players,
            "Room created"
        );

        self.broker.publish(&Topic::Rooms, &room);
        Ok(room)
    }

    pub fn join_room(&self, req: &JoinRoomRequest) -> Result<Room, RoomError> {
        let room = self.directory.join(req.room_id, &req.user_id)?;

        info!(
            room_id = %room.room_id,
            user_id = %req.user_id,
            player_count = room.current_players,
            "Player joined room"
        );

        self.broker.publish(&Topic::Rooms, &room);
        self.publish_roster(room.room_id);
        Ok(room)
    }

    pub fn leave_room(&self, req: &LeaveRoomRequest) -> Result<LeaveOutcome, RoomError> {
        let outcome = self.directory.leave(req.room_id, &req.user_id)?;

        match &outcome {
            LeaveOutcome::Left { room, roster } => {
                info!(room_id = %room.room_id, user_id = %req.user_id, "Player left room");
                self.broker.publish(&Topic::Rooms, room);
                self.broker.publish(&Topic::Roster(room.room_id), roster);
            }
            LeaveOutcome::Closed(room_id) => {
                info!(room_id = %room_id, user_id = %req.user_id, "Last player left, closing room");
                self.close_room(*room_id);
            }
        }

        Ok(outcome)
    }

    fn close_room(&self, room_id: RoomId) {
        self.games.remove(&room_id);
        self.broker.publish(&Topic::RoomClosed(room_id), &());
        self.broker.publish(&Topic::RoomsClosed, &RoomClosedNotice { room_id });
        self.broker.forget_room(room_id);
    }

    /// Republish the roster. A room that is already gone is a tolerated no-op.
    pub fn publish_roster(&self, room_id: RoomId) {
        match self.directory.roster(room_id) {
            Some(roster) => {
                self.broker.publish(&Topic::Roster(room_id), &roster);
            }
            None => {
                warn!(room_id = %room_id, "Roster refresh for a room that no longer exists");
            }
        }
    }

    /// Broadcast the grid snapshot and scores to the whole room. No-op
    /// without a running game.
    pub fn publish_state(&self, room_id: RoomId) {
        let Some((apples, scores)) = self.game_state(room_id) else {
            return;
        };
        self.broker.publish(&Topic::GameState(room_id), &apples);
        self.broker.publish(&Topic::Scores(room_id), &scores);
    }

    /// Snapshot and scores for a single requester
    pub fn game_state(&self, room_id: RoomId) -> Option<(GameStatePayload, Scoreboard)> {
        match self.games.state(&room_id) {
            Some((grid, scores)) => Some((GameStatePayload { apples: grid }, scores)),
            None => {
                debug!(room_id = %room_id, "State requested for a room without a game");
                None
            }
        }
    }

    /// Host-only: start the countdown, after which the game starts on its own
    pub fn start_countdown(self: &Arc<Self>, room_id: RoomId, user_id: &str) -> Result<(), RoomError> {
        let room = self.directory.begin_countdown(room_id, user_id)?;
        info!(room_id = %room_id, seconds = self.settings.countdown_secs, "Countdown started");
        self.broker.publish(&Topic::Rooms, &room);

        let service = Arc::clone(self);
        tokio::spawn(async move {
            service.run_countdown(room_id).await;
        });
        Ok(())
    }

    /// Host-only: start without a countdown
    pub fn start_now(&self, room_id: RoomId, user_id: &str) -> Result<(), StartError> {
        self.directory.begin_game(room_id, Some(user_id))?;
        self.launch_game(room_id)?;
        Ok(())
    }

    async fn run_countdown(&self, room_id: RoomId) {
        let mut ticker = tokio::time::interval(self.settings.countdown_tick);

        for remaining in (1..=self.settings.countdown_secs).rev() {
            ticker.tick().await;
            if !self.still_counting(room_id) {
                return;
            }
            self.broker.publish(&Topic::Countdown(room_id), &remaining);
        }
        ticker.tick().await;
        if !self.still_counting(room_id) {
            return;
        }

        if let Err(e) = self.directory.begin_game(room_id, None) {
            debug!(room_id = %room_id, error = %e, "Countdown finished for a room that moved on");
            return;
        }
        if let Err(e) = self.launch_game(room_id) {
            error!(room_id = %room_id, error = %e, "Game start aborted");
        }
    }

    fn still_counting(&self, room_id: RoomId) -> bool {
        let counting = self.directory.phase(room_id) == Some(RoomPhase::Countdown);
        if !counting {
            debug!(room_id = %room_id, "Countdown abandoned");
        }
        counting
    }

    /// Generate the board, then publish snapshot and start signal. A board
    /// that fails to generate reopens the room instead of starting it.
    fn launch_game(&self, room_id: RoomId) -> Result<(), GridError> {
        let mut rng = ChaCha8Rng::seed_from_u64(rand::random());
        let grid = match Grid::generate(&mut rng) {
            Ok(grid) => grid,
            Err(e) => {
                if let Some(room) = self.directory.reopen(room_id) {
                    self.broker.publish(&Topic::Rooms, &room);
                }
                return Err(e);
            }
        };

        let players = self.directory.roster(room_id).unwrap_or_default();
        self.games.insert(GameSession::new(room_id, grid, &players));

        if let Some(room) = self.directory.get(room_id) {
            self.broker.publish(&Topic::Rooms, &room);
        }
        self.publish_state(room_id);
        self.broker.publish(&Topic::GameStart(room_id), &());

        info!(room_id = %room_id, players = players.len(), "Game started");
        Ok(())
    }

    /// Revalidate and apply a client's removal.
    ///
    /// Accepted removals are rebroadcast with fresh scores. Rejected ones
    /// republish the authoritative snapshot so the predicting client
    /// converges. Rooms without a game are a tolerated no-op.
    pub fn remove_cells(&self, room_id: RoomId, removal: &CellRemoval) -> Result<(), RemovalError> {
        let decision =
            self.games
                .apply_removal(&room_id, removal.user_id.as_deref(), &removal.removed_indices);

        match decision {
            Some(RemovalDecision::Accepted { indices, scores }) => {
                self.broker.publish(
                    &Topic::CellRemoval(room_id),
                    &CellRemoval {
                        removed_indices: indices,
                        user_id: removal.user_id.clone(),
                    },
                );
                self.broker.publish(&Topic::Scores(room_id), &scores);
                Ok(())
            }
            Some(RemovalDecision::Rejected { reason, snapshot }) => {
                self.broker
                    .publish(&Topic::GameState(room_id), &GameStatePayload { apples: snapshot });
                Err(reason)
            }
            None => {
                warn!(room_id = %room_id, "Removal for a room without a running game");
                Ok(())
            }
        }
    }

    pub fn settings(&self) -> &RoomSettings {
        &self.settings
    }
}
