//! Testing utilities for the game engine.
//!
//! This module provides tools for unit and integration tests:
//! - `TableBuilder` for seating a deterministic game in one line
//! - `seat_players` for driving the same through an [`Engine`]
//! - Assertion helpers for verifying session state

use crate::catalog::ObjectivePool;
use crate::command::{Command, Effect, Reply};
use crate::engine::Engine;
use crate::error::{GameError, GameResult};
use crate::model::{ChatId, PlayerId, Status};
use crate::policy::{ScalingPolicy, SessionRules, DEFAULT_MIN_PLAYERS};
use crate::session::GameSession;
use crate::victory::Victory;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Builds a session with approved players and a fixed objective order.
///
/// Players get ids `1..=n` and names `Player1..PlayerN`.
pub struct TableBuilder {
    players: usize,
    seed: u64,
    objectives: Vec<String>,
    min_players: usize,
    scaling: ScalingPolicy,
    rules: SessionRules,
}

impl TableBuilder {
    pub fn new(players: usize) -> Self {
        Self {
            players,
            seed: 7,
            objectives: (1..=10).map(|n| format!("objective {n}")).collect(),
            min_players: DEFAULT_MIN_PLAYERS,
            scaling: ScalingPolicy::default(),
            rules: SessionRules::default(),
        }
    }

    /// Seed for role assignment.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Objectives in draw order.
    pub fn objectives(mut self, objectives: &[&str]) -> Self {
        self.objectives = objectives.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn min_players(mut self, min_players: usize) -> Self {
        self.min_players = min_players;
        self
    }

    pub fn scaling(mut self, scaling: ScalingPolicy) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn rules(mut self, rules: SessionRules) -> Self {
        self.rules = rules;
        self
    }

    /// A lobby with every player already approved.
    pub fn lobby(&self) -> GameSession {
        let pool = ObjectivePool::from_ordered(self.objectives.clone());
        let mut session = GameSession::new(ChatId(-1), pool, self.rules);
        for n in 1..=self.players {
            let id = PlayerId(n as i64);
            session
                .apply(id, format!("Player{n}"))
                .expect("apply should succeed in a fresh lobby");
            session.approve(id).expect("approve should succeed");
        }
        session
    }

    /// A started game.
    pub fn start(self) -> GameSession {
        let mut session = self.lobby();
        let mut rng = StdRng::seed_from_u64(self.seed);
        session
            .start(self.min_players, &self.scaling, &mut rng)
            .expect("start should succeed");
        session
    }
}

/// Apply and approve players `1..=n` in `chat` through the engine, with
/// `admin` approving.
pub async fn seat_players(engine: &Engine, chat: ChatId, admin: PlayerId, n: usize) {
    for i in 1..=n {
        let id = PlayerId(i as i64);
        engine
            .dispatch(chat, id, Command::Apply { name: format!("Player{i}") })
            .await
            .expect("apply should succeed");
        engine
            .dispatch(chat, admin, Command::Approve { player: id })
            .await
            .expect("approve should succeed");
    }
}

/// Ids of the crew, in join order.
pub fn crew_of(session: &GameSession) -> Vec<PlayerId> {
    session
        .players()
        .iter()
        .filter(|p| !p.is_impostor())
        .map(|p| p.id)
        .collect()
}

/// Ids of the hidden impostors, in id order.
pub fn impostors_of(session: &GameSession) -> Vec<PlayerId> {
    session.impostors().collect()
}

/// Run `op`, expect a rejection, and check the session did not change.
#[track_caller]
pub fn assert_rejected_unchanged<T, F>(session: &mut GameSession, op: F) -> GameError
where
    T: std::fmt::Debug,
    F: FnOnce(&mut GameSession) -> GameResult<T>,
{
    let before = serde_json::to_value(session.snapshot()).expect("snapshot serializes");
    let err = match op(session) {
        Ok(value) => panic!("Expected a rejection, got {value:?}"),
        Err(err) => err,
    };
    let after = serde_json::to_value(session.snapshot()).expect("snapshot serializes");
    assert_eq!(before, after, "Rejected operation ({err}) changed the session");
    err
}

/// Assert the session is in the given status.
#[track_caller]
pub fn assert_status(session: &GameSession, status: Status) {
    assert_eq!(
        session.status(),
        status,
        "Expected status {status}, got {}",
        session.status()
    );
}

/// Assert the game ended with the given victory.
#[track_caller]
pub fn assert_victory(session: &GameSession, victory: Victory) {
    assert_status(session, Status::Ended);
    let actual = session.ending().and_then(|e| e.victory);
    assert_eq!(actual, Some(victory), "Expected {victory:?}, got {actual:?}");
}

/// Assert a reply carries a `GameEnded` effect with the given victory.
#[track_caller]
pub fn assert_reply_ended(reply: &Reply, victory: Victory) {
    let ending = reply
        .ending()
        .unwrap_or_else(|| panic!("Expected the game to end, effects: {:?}", reply.effects));
    assert_eq!(ending.victory, Some(victory));
    assert_eq!(reply.snapshot.status, Status::Ended);
}

/// Assert some effect in the list matches.
#[track_caller]
pub fn assert_has_effect(effects: &[Effect], pred: impl Fn(&Effect) -> bool) {
    assert!(
        effects.iter().any(pred),
        "No matching effect in {effects:?}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_builder_seats_players() {
        let session = TableBuilder::new(5).lobby();
        assert_eq!(session.players().len(), 5);
        assert_status(&session, Status::Lobby);
        assert_eq!(session.player(PlayerId(3)).unwrap().name, "Player3");
    }

    #[test]
    fn test_same_seed_same_roles() {
        let a = TableBuilder::new(8).seed(42).start();
        let b = TableBuilder::new(8).seed(42).start();
        assert_eq!(impostors_of(&a), impostors_of(&b));
        assert_eq!(crew_of(&a).len(), 6);
    }

    #[test]
    fn test_fixed_scaling() {
        let session = TableBuilder::new(5)
            .scaling(ScalingPolicy::Fixed { impostors: 2 })
            .start();
        assert_eq!(impostors_of(&session).len(), 2);
    }
}
