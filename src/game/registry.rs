//! Authoritative per-room game sessions

use dashmap::DashMap;
use tracing::{debug, info};

use crate::util::time::now_millis;
use crate::ws::protocol::{RoomId, Scoreboard};

use super::grid::Grid;
use super::matching::{revalidate_removal, RemovalError};

/// Server-side state of one running game
#[derive(Debug, Clone)]
pub struct GameSession {
    pub room_id: RoomId,
    pub grid: Grid,
    pub scores: Scoreboard,
    pub started_at: u64,
}

impl GameSession {
    pub fn new(room_id: RoomId, grid: Grid, players: &[String]) -> Self {
        Self {
            room_id,
            grid,
            scores: players.iter().map(|p| (p.clone(), 0)).collect(),
            started_at: now_millis(),
        }
    }

    /// Revalidate a peer's removal against the authoritative grid and apply it
    pub fn apply_removal(
        &mut self,
        user_id: Option<&str>,
        indices: &[usize],
    ) -> Result<Vec<usize>, RemovalError> {
        let selection = revalidate_removal(&self.grid, indices)?;
        let removed: Vec<usize> = selection.into_iter().collect();
        self.grid.clear(&removed);
        // Only players seeded at game start hold a score
        match user_id.and_then(|u| self.scores.get_mut(u)) {
            Some(score) => *score += removed.len() as u32,
            None => debug!(room_id = %self.room_id, ?user_id, "Removal credited to nobody"),
        }
        Ok(removed)
    }
}

/// Outcome of a removal request against the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalDecision {
    Accepted {
        indices: Vec<usize>,
        scores: Scoreboard,
    },
    Rejected {
        reason: RemovalError,
        snapshot: Grid,
    },
}

/// Registry of all running games
pub struct GameRegistry {
    games: DashMap<RoomId, GameSession>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self {
            games: DashMap::new(),
        }
    }

    pub fn insert(&self, session: GameSession) {
        info!(room_id = %session.room_id, total = session.grid.total(), "Game session created");
        self.games.insert(session.room_id, session);
    }

    pub fn remove(&self, room_id: &RoomId) -> Option<GameSession> {
        self.games.remove(room_id).map(|(_, session)| session)
    }

    /// Grid and scores read together
    pub fn state(&self, room_id: &RoomId) -> Option<(Grid, Scoreboard)> {
        self.games
            .get(room_id)
            .map(|g| (g.grid.clone(), g.scores.clone()))
    }

    pub fn snapshot(&self, room_id: &RoomId) -> Option<Grid> {
        self.games.get(room_id).map(|g| g.grid.clone())
    }

    pub fn scores(&self, room_id: &RoomId) -> Option<Scoreboard> {
        self.games.get(room_id).map(|g| g.scores.clone())
    }

    /// Apply a removal. `None` when the room has no running game.
    pub fn apply_removal(
        &self,
        room_id: &RoomId,
        user_id: Option<&str>,
        indices: &[usize],
    ) -> Option<RemovalDecision> {
        let mut game = self.games.get_mut(room_id)?;
        let decision = match game.apply_removal(user_id, indices) {
            Ok(indices) => RemovalDecision::Accepted {
                indices,
                scores: game.scores.clone(),
            },
            Err(reason) => {
                debug!(room_id = %room_id, reason = %reason, "Removal rejected");
                RemovalDecision::Rejected {
                    reason,
                    snapshot: game.grid.clone(),
                }
            }
        };
        Some(decision)
    }

    pub fn active_games(&self) -> usize {
        self.games.len()
    }
}

impl Default for GameRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::test_helpers::grid_with_prefix;
    use uuid::Uuid;

    fn registry_with(prefix: &[u8]) -> (GameRegistry, RoomId) {
        let registry = GameRegistry::new();
        let room_id = Uuid::new_v4();
        registry.insert(GameSession::new(
            room_id,
            grid_with_prefix(prefix),
            &["GUEST_11111".to_string(), "GUEST_22222".to_string()],
        ));
        (registry, room_id)
    }

    #[test]
    fn accepted_removal_credits_requester() {
        let (registry, room_id) = registry_with(&[3, 3, 4]);

        let decision = registry.apply_removal(&room_id, Some("GUEST_11111"), &[2, 0, 1]);
        let Some(RemovalDecision::Accepted { indices, scores }) = decision else {
            panic!("expected acceptance, got {decision:?}");
        };
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(scores["GUEST_11111"], 3);
        assert_eq!(scores["GUEST_22222"], 0);
        assert_eq!(&registry.snapshot(&room_id).unwrap().cells()[..3], &[0, 0, 0]);
    }

    #[test]
    fn second_claim_on_same_cells_is_rejected() {
        let (registry, room_id) = registry_with(&[5, 5]);

        registry.apply_removal(&room_id, Some("GUEST_11111"), &[0, 1]);
        let decision = registry.apply_removal(&room_id, Some("GUEST_22222"), &[0, 1]);

        assert!(matches!(
            decision,
            Some(RemovalDecision::Rejected {
                reason: RemovalError::AlreadyRemoved(0),
                ..
            })
        ));
        assert_eq!(registry.scores(&room_id).unwrap()["GUEST_22222"], 0);
    }

    #[test]
    fn outsiders_are_never_added_to_the_scoreboard() {
        let (registry, room_id) = registry_with(&[4, 6]);

        let decision = registry.apply_removal(&room_id, Some("GUEST_66666"), &[0, 1]);
        let Some(RemovalDecision::Accepted { scores, .. }) = decision else {
            panic!("expected acceptance, got {decision:?}");
        };
        assert!(!scores.contains_key("GUEST_66666"));
        assert_eq!(scores.values().sum::<u32>(), 0);
    }

    #[test]
    fn missing_game_is_none() {
        let registry = GameRegistry::new();
        assert!(registry.apply_removal(&Uuid::new_v4(), None, &[0]).is_none());
    }
}
