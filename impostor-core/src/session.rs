//! GameSession - the game state machine.
//!
//! A session moves `lobby → in_progress → ended`. Every operation either
//! returns the [`Effect`]s it produced or a [`GameError`]; a rejected
//! operation never changes state.
//!
//! The session is synchronous and owns no tasks. The engine serializes
//! access behind a per-session lock, spawns vote timers and hands their
//! abort handles back through [`GameSession::attach_vote_timer`].

use crate::catalog::ObjectivePool;
use crate::command::Effect;
use crate::error::{Budget, GameError, GameResult, Missing};
use crate::model::{ChatId, PendingApplication, Player, PlayerId, Role, SessionId, Status, Team};
use crate::policy::{ScalingPolicy, SessionRules};
use crate::victory::{self, Standing, Victory};
use crate::vote::{BallotCount, Plurality, Verdict, VoteRound};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// An objective handed to the impostor team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedObjective {
    pub text: String,
    /// Whether the team may still trade this objective for another.
    pub can_skip: bool,
}

/// How a game finished, with everything needed for the final reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ending {
    /// `None` when an admin stopped the game.
    pub victory: Option<Victory>,
    /// The impostors as assigned at start, including unmasked ones.
    pub impostors: Vec<PlayerId>,
    /// Objectives the impostors finished, in order.
    pub completed_objectives: Vec<String>,
}

impl Ending {
    pub fn winner(&self) -> Option<Team> {
        self.victory.map(|v| v.winner())
    }
}

/// A game in one chat.
#[derive(Debug)]
pub struct GameSession {
    id: SessionId,
    chat: ChatId,
    status: Status,
    rules: SessionRules,

    players: Vec<Player>,
    pending: BTreeMap<PlayerId, PendingApplication>,
    impostors: BTreeSet<PlayerId>,
    original_impostors: Vec<PlayerId>,
    voted_out: Vec<PlayerId>,

    pool: ObjectivePool,
    current_objective: Option<String>,
    objective_history: Vec<String>,
    completed_objectives: Vec<String>,
    objectives_completed: u32,
    objectives_to_win: u32,
    skips_left: u32,

    votes_total: u32,
    votes_used: u32,
    vote: Option<VoteRound>,

    ending: Option<Ending>,
}

impl GameSession {
    /// Open a lobby with a private draw order.
    pub fn new(chat: ChatId, pool: ObjectivePool, rules: SessionRules) -> Self {
        Self {
            id: SessionId::new(),
            chat,
            status: Status::Lobby,
            rules,
            players: Vec::new(),
            pending: BTreeMap::new(),
            impostors: BTreeSet::new(),
            original_impostors: Vec::new(),
            voted_out: Vec::new(),
            pool,
            current_objective: None,
            objective_history: Vec::new(),
            completed_objectives: Vec::new(),
            objectives_completed: 0,
            objectives_to_win: 0,
            skips_left: rules.skip_allowance,
            votes_total: 0,
            votes_used: 0,
            vote: None,
            ending: None,
        }
    }

    // ========================================================================
    // Lobby
    // ========================================================================

    /// Request to join the lobby.
    pub fn apply(&mut self, id: PlayerId, name: impl Into<String>) -> GameResult<Vec<Effect>> {
        self.require(Status::Lobby, "apply")?;
        if self.is_member(id) {
            return Err(GameError::AlreadyMember(id));
        }
        if self.pending.contains_key(&id) {
            return Err(GameError::AlreadyPending(id));
        }

        let name = name.into();
        self.pending.insert(
            id,
            PendingApplication {
                id,
                name: name.clone(),
            },
        );
        debug!(chat = %self.chat, player = %id, "Application received");
        Ok(vec![Effect::Applied { player: id, name }])
    }

    pub fn approve(&mut self, id: PlayerId) -> GameResult<Vec<Effect>> {
        self.require(Status::Lobby, "approve applications")?;
        let application = self
            .pending
            .remove(&id)
            .ok_or(GameError::NotFound(Missing::Application(id)))?;

        self.players.push(Player::new(application.id, application.name));
        info!(chat = %self.chat, player = %id, players = self.players.len(), "Player joined");
        Ok(vec![Effect::Approved {
            player: id,
            players: self.players.len(),
        }])
    }

    pub fn reject(&mut self, id: PlayerId) -> GameResult<Vec<Effect>> {
        self.require(Status::Lobby, "reject applications")?;
        self.pending
            .remove(&id)
            .ok_or(GameError::NotFound(Missing::Application(id)))?;
        debug!(chat = %self.chat, player = %id, "Application rejected");
        Ok(vec![Effect::Rejected { player: id }])
    }

    /// Assign roles and begin play.
    ///
    /// Impostors are drawn uniformly without replacement from all players.
    /// A lineup that would leave the crew no larger than the impostor team
    /// is rejected. The first objective is issued straight away.
    pub fn start<R: Rng + ?Sized>(
        &mut self,
        min_players: usize,
        scaling: &ScalingPolicy,
        rng: &mut R,
    ) -> GameResult<Vec<Effect>> {
        self.require(Status::Lobby, "start")?;

        let have = self.players.len();
        let lineup = scaling.lineup(have);
        // The crew must start strictly larger than the impostor team.
        let need = min_players.max(2 * lineup.impostors + 1);
        if have < need {
            return Err(GameError::NotEnoughPlayers { have, need });
        }

        for index in rand::seq::index::sample(rng, have, lineup.impostors) {
            let player = &mut self.players[index];
            player.role = Role::Impostor;
            self.impostors.insert(player.id);
        }
        self.original_impostors = self
            .players
            .iter()
            .filter(|p| p.is_impostor())
            .map(|p| p.id)
            .collect();

        self.pending.clear();
        self.objectives_to_win = lineup.objectives_to_win;
        self.votes_total = lineup.votes_total;
        self.status = Status::InProgress;

        info!(
            chat = %self.chat,
            players = have,
            impostors = lineup.impostors,
            objectives_to_win = lineup.objectives_to_win,
            votes_total = lineup.votes_total,
            "Game started"
        );

        let mut effects = vec![Effect::Started {
            impostors: self.original_impostors.clone(),
            objectives_to_win: self.objectives_to_win,
            votes_total: self.votes_total,
        }];
        effects.push(self.issue_or_exhausted());
        Ok(effects)
    }

    // ========================================================================
    // Objectives
    // ========================================================================

    /// Draw the next objective and make it current.
    ///
    /// An empty pool yields `Exhausted` on every call without touching the
    /// session.
    pub fn issue_objective(&mut self) -> GameResult<IssuedObjective> {
        self.require(Status::InProgress, "issue objectives")?;
        let text = self.pool.draw_next().ok_or(GameError::Exhausted)?;

        self.current_objective = Some(text.clone());
        self.objective_history.push(text.clone());
        debug!(chat = %self.chat, remaining = self.pool.remaining(), "Objective issued");
        Ok(IssuedObjective {
            text,
            can_skip: self.skips_left > 0,
        })
    }

    fn issue_or_exhausted(&mut self) -> Effect {
        match self.issue_objective() {
            Ok(objective) => Effect::ObjectiveIssued(objective),
            Err(_) => {
                info!(chat = %self.chat, "Objectives exhausted");
                Effect::ObjectivesExhausted
            }
        }
    }

    /// An impostor reports the current objective done.
    pub fn complete_objective(&mut self, actor: PlayerId) -> GameResult<Vec<Effect>> {
        self.require(Status::InProgress, "complete objectives")?;
        self.require_impostor(actor)?;
        let Some(done) = self.current_objective.take() else {
            return Err(GameError::Exhausted);
        };

        self.completed_objectives.push(done);
        self.objectives_completed += 1;
        info!(
            chat = %self.chat,
            completed = self.objectives_completed,
            to_win = self.objectives_to_win,
            "Objective completed"
        );

        let mut effects = vec![Effect::ObjectiveCompleted {
            completed: self.objectives_completed,
            to_win: self.objectives_to_win,
        }];
        match victory::after_objective(&self.standing()) {
            Some(win) => effects.push(self.finish(Some(win))),
            None => effects.push(self.issue_or_exhausted()),
        }
        Ok(effects)
    }

    /// Trade the current objective for a fresh one, spending a skip.
    pub fn skip_objective(&mut self, actor: PlayerId) -> GameResult<Vec<Effect>> {
        self.require(Status::InProgress, "skip objectives")?;
        self.require_impostor(actor)?;
        if self.skips_left == 0 {
            return Err(GameError::BudgetExhausted(Budget::Skips));
        }
        if self.pool.is_exhausted() {
            return Err(GameError::Exhausted);
        }

        self.skips_left -= 1;
        let objective = self.issue_objective()?;
        info!(chat = %self.chat, skips_left = self.skips_left, "Objective skipped");
        Ok(vec![
            Effect::ObjectiveSkipped {
                skips_left: self.skips_left,
            },
            Effect::ObjectiveIssued(objective),
        ])
    }

    /// Admin override: replace the current objective without spending a
    /// skip.
    pub fn resend_objective(&mut self) -> GameResult<Vec<Effect>> {
        self.require(Status::InProgress, "resend objectives")?;
        let objective = self.issue_objective()?;
        Ok(vec![Effect::ObjectiveIssued(objective)])
    }

    // ========================================================================
    // Voting
    // ========================================================================

    /// Call an emergency vote, spending one vote attempt.
    pub fn open_vote(&mut self, actor: PlayerId, now: Instant) -> GameResult<Vec<Effect>> {
        self.require_active_player(actor)?;
        if self.status == Status::Lobby {
            return Err(GameError::invalid("open a vote", self.status));
        }
        if self.votes_used >= self.votes_total {
            return Err(GameError::BudgetExhausted(Budget::Votes));
        }
        if self.status != Status::InProgress {
            return Err(GameError::invalid("open a vote", self.status));
        }
        if self.vote.is_some() {
            return Err(GameError::VoteInProgress);
        }

        self.votes_used += 1;
        let round = VoteRound::open(self.votes_used, now, self.rules.vote_timeout);
        info!(
            chat = %self.chat,
            round = round.number(),
            called_by = %actor,
            votes_used = self.votes_used,
            votes_total = self.votes_total,
            "Vote opened"
        );
        let effect = Effect::VoteOpened {
            round: round.number(),
            called_by: actor,
            votes_used: self.votes_used,
            votes_total: self.votes_total,
            timeout: round.timeout(),
        };
        self.vote = Some(round);
        Ok(vec![effect])
    }

    /// Hand the round its timeout task. A handle for a round that is no
    /// longer open is aborted immediately.
    pub fn attach_vote_timer(&mut self, round: u32, handle: AbortHandle) -> bool {
        match self.vote.as_mut() {
            Some(vote) if vote.number() == round && vote.is_open() => {
                vote.set_timer(handle);
                true
            }
            _ => {
                handle.abort();
                false
            }
        }
    }

    /// Record an accusation. Closes the round once every eligible player
    /// has voted.
    pub fn cast_ballot(&mut self, voter: PlayerId, accused: PlayerId) -> GameResult<Vec<Effect>> {
        self.require(Status::InProgress, "cast a ballot")?;
        if !self.vote.as_ref().is_some_and(VoteRound::is_open) {
            return Err(GameError::NoOpenVote);
        }
        self.require_active_player(voter)?;
        self.require_active_player(accused)?;
        if voter == accused {
            return Err(GameError::SelfAccusation(voter));
        }

        let eligible = self.eligible_voters();
        let Some(round) = self.vote.as_mut() else {
            return Err(GameError::NoOpenVote);
        };
        round.record(voter, accused)?;
        let outstanding = eligible.saturating_sub(round.ballots_cast());
        debug!(chat = %self.chat, round = round.number(), voter = %voter, outstanding, "Ballot cast");

        let mut effects = vec![Effect::BallotCast { voter, outstanding }];
        if outstanding == 0 {
            effects.extend(self.resolve_vote());
        }
        Ok(effects)
    }

    /// Close round `round` on timeout with whatever ballots exist.
    ///
    /// Returns `None` when that round is already closed, which makes a late
    /// timer a no-op.
    pub fn expire_vote(&mut self, round: u32) -> Option<Vec<Effect>> {
        if self.status != Status::InProgress {
            return None;
        }
        let vote = self.vote.as_mut()?;
        if vote.number() != round || !vote.is_open() {
            return None;
        }
        // The caller is the timer task itself; closing must not abort it.
        vote.disarm();
        info!(chat = %self.chat, round, ballots = vote.ballots_cast(), "Vote timed out");
        Some(self.resolve_vote())
    }

    fn resolve_vote(&mut self) -> Vec<Effect> {
        let Some(mut round) = self.vote.take() else {
            return Vec::new();
        };
        let number = round.number();
        let verdict = match round.close() {
            Plurality::NoBallots => Verdict::NoVotes,
            Plurality::Tied(accused, votes) => Verdict::Tie { accused, votes },
            Plurality::Leader(player, votes) => {
                if self.impostors.remove(&player) {
                    self.voted_out.push(player);
                    Verdict::Unmasked { player, votes }
                } else {
                    Verdict::Missed { player, votes }
                }
            }
        };
        info!(chat = %self.chat, round = number, verdict = ?verdict, "Vote resolved");

        let mut effects = vec![Effect::VoteResolved {
            round: number,
            verdict,
            votes_left: self.votes_left(),
        }];
        if let Some(win) = victory::after_vote(&self.standing()) {
            effects.push(self.finish(Some(win)));
        }
        effects
    }

    // ========================================================================
    // Admin overrides
    // ========================================================================

    /// Force-end the game from any non-terminal state.
    pub fn stop(&mut self) -> GameResult<Vec<Effect>> {
        if self.status.is_terminal() {
            return Err(GameError::invalid("stop", self.status));
        }
        Ok(vec![self.finish(None)])
    }

    pub fn force_add_score(&mut self) -> GameResult<Vec<Effect>> {
        self.require(Status::InProgress, "adjust the score")?;
        self.objectives_completed += 1;
        let mut effects = vec![self.score_adjusted()];
        if let Some(win) = victory::after_objective(&self.standing()) {
            effects.push(self.finish(Some(win)));
        }
        Ok(effects)
    }

    pub fn force_remove_score(&mut self) -> GameResult<Vec<Effect>> {
        self.require(Status::InProgress, "adjust the score")?;
        self.objectives_completed = self.objectives_completed.saturating_sub(1);
        Ok(vec![self.score_adjusted()])
    }

    pub fn force_add_vote_budget(&mut self) -> GameResult<Vec<Effect>> {
        self.require(Status::InProgress, "adjust the vote budget")?;
        self.votes_total += 1;
        Ok(vec![self.budget_adjusted()])
    }

    /// Take one vote attempt away. Never drops below the attempts already
    /// spent.
    pub fn force_remove_vote_budget(&mut self) -> GameResult<Vec<Effect>> {
        self.require(Status::InProgress, "adjust the vote budget")?;
        if self.votes_total <= self.votes_used {
            return Err(GameError::BudgetExhausted(Budget::Votes));
        }
        self.votes_total -= 1;
        let mut effects = vec![self.budget_adjusted()];
        if self.vote.is_none() {
            if let Some(win) = victory::after_budget_change(&self.standing()) {
                effects.push(self.finish(Some(win)));
            }
        }
        Ok(effects)
    }

    fn score_adjusted(&self) -> Effect {
        info!(chat = %self.chat, completed = self.objectives_completed, "Score adjusted");
        Effect::ScoreAdjusted {
            completed: self.objectives_completed,
            to_win: self.objectives_to_win,
        }
    }

    fn budget_adjusted(&self) -> Effect {
        info!(chat = %self.chat, votes_total = self.votes_total, "Vote budget adjusted");
        Effect::VoteBudgetAdjusted {
            votes_used: self.votes_used,
            votes_total: self.votes_total,
        }
    }

    fn finish(&mut self, victory: Option<Victory>) -> Effect {
        self.status = Status::Ended;
        self.vote = None;
        let ending = Ending {
            victory,
            impostors: self.original_impostors.clone(),
            completed_objectives: self.completed_objectives.clone(),
        };
        info!(chat = %self.chat, victory = ?victory, "Game ended");
        self.ending = Some(ending.clone());
        Effect::GameEnded(ending)
    }

    // ========================================================================
    // Guards
    // ========================================================================

    fn require(&self, status: Status, action: &'static str) -> GameResult<()> {
        if self.status == status {
            Ok(())
        } else {
            Err(GameError::invalid(action, self.status))
        }
    }

    fn require_active_player(&self, id: PlayerId) -> GameResult<()> {
        if !self.is_member(id) {
            return Err(GameError::NotFound(Missing::Player(id)));
        }
        if self.voted_out.contains(&id) {
            return Err(GameError::VotedOut(id));
        }
        Ok(())
    }

    fn require_impostor(&self, id: PlayerId) -> GameResult<()> {
        if self.impostors.contains(&id) {
            Ok(())
        } else {
            Err(GameError::NotAnImpostor(id))
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn chat(&self) -> ChatId {
        self.chat
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn is_member(&self, id: PlayerId) -> bool {
        self.player(id).is_some()
    }

    pub fn is_pending(&self, id: PlayerId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Impostors still hidden.
    pub fn impostors(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.impostors.iter().copied()
    }

    pub fn is_impostor(&self, id: PlayerId) -> bool {
        self.impostors.contains(&id)
    }

    pub fn original_impostors(&self) -> &[PlayerId] {
        &self.original_impostors
    }

    pub fn voted_out(&self) -> &[PlayerId] {
        &self.voted_out
    }

    pub fn votes_used(&self) -> u32 {
        self.votes_used
    }

    pub fn votes_total(&self) -> u32 {
        self.votes_total
    }

    pub fn votes_left(&self) -> u32 {
        self.votes_total.saturating_sub(self.votes_used)
    }

    pub fn objectives_completed(&self) -> u32 {
        self.objectives_completed
    }

    pub fn objectives_to_win(&self) -> u32 {
        self.objectives_to_win
    }

    pub fn skips_left(&self) -> u32 {
        self.skips_left
    }

    pub fn current_objective(&self) -> Option<IssuedObjective> {
        self.current_objective.as_ref().map(|text| IssuedObjective {
            text: text.clone(),
            can_skip: self.skips_left > 0,
        })
    }

    pub fn objective_history(&self) -> &[String] {
        &self.objective_history
    }

    pub fn completed_objectives(&self) -> &[String] {
        &self.completed_objectives
    }

    pub fn objectives_remaining(&self) -> usize {
        self.pool.remaining()
    }

    pub fn vote(&self) -> Option<&VoteRound> {
        self.vote.as_ref()
    }

    pub fn vote_timeout(&self) -> Duration {
        self.rules.vote_timeout
    }

    pub fn ending(&self) -> Option<&Ending> {
        self.ending.as_ref()
    }

    /// Players who may still vote: everyone not voted out.
    pub fn eligible_voters(&self) -> usize {
        self.players
            .iter()
            .filter(|p| !self.voted_out.contains(&p.id))
            .count()
    }

    /// Counts for the win evaluator, derived from state alone.
    pub fn standing(&self) -> Standing {
        let living_impostors = self.impostors.len();
        Standing {
            living_impostors,
            living_crew: self.eligible_voters().saturating_sub(living_impostors),
            votes_used: self.votes_used,
            votes_total: self.votes_total,
            objectives_completed: self.objectives_completed,
            objectives_to_win: self.objectives_to_win,
        }
    }

    /// Read-only view for rendering.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session: self.id,
            chat: self.chat,
            status: self.status,
            players: self.players.clone(),
            pending: self.pending.values().cloned().collect(),
            impostors: self.impostors().collect(),
            original_impostors: self.original_impostors.clone(),
            voted_out: self.voted_out.clone(),
            objectives_completed: self.objectives_completed,
            objectives_to_win: self.objectives_to_win,
            skips_left: self.skips_left,
            current_objective: self.current_objective(),
            objective_history: self.objective_history.clone(),
            completed_objectives: self.completed_objectives.clone(),
            objectives_remaining: self.pool.remaining(),
            votes_used: self.votes_used,
            votes_total: self.votes_total,
            vote: self.vote.as_ref().map(|round| {
                let mut voters: Vec<PlayerId> = round.voters().collect();
                voters.sort();
                VoteSnapshot {
                    round: round.number(),
                    counts: round.counts(),
                    voters,
                    eligible: self.eligible_voters(),
                    timeout: round.timeout(),
                }
            }),
            ending: self.ending.clone(),
        }
    }
}

/// Serializable view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session: SessionId,
    pub chat: ChatId,
    pub status: Status,
    pub players: Vec<Player>,
    pub pending: Vec<PendingApplication>,
    pub impostors: Vec<PlayerId>,
    pub original_impostors: Vec<PlayerId>,
    pub voted_out: Vec<PlayerId>,
    pub objectives_completed: u32,
    pub objectives_to_win: u32,
    pub skips_left: u32,
    pub current_objective: Option<IssuedObjective>,
    pub objective_history: Vec<String>,
    pub completed_objectives: Vec<String>,
    pub objectives_remaining: usize,
    pub votes_used: u32,
    pub votes_total: u32,
    pub vote: Option<VoteSnapshot>,
    pub ending: Option<Ending>,
}

impl SessionSnapshot {
    pub fn player_name(&self, id: PlayerId) -> Option<&str> {
        self.players
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.name.as_str())
    }

    pub fn objectives_exhausted(&self) -> bool {
        self.objectives_remaining == 0
    }
}

/// Serializable view of the open vote.
#[derive(Debug, Clone, Serialize)]
pub struct VoteSnapshot {
    pub round: u32,
    pub counts: Vec<BallotCount>,
    pub voters: Vec<PlayerId>,
    pub eligible: usize,
    pub timeout: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_rejected_unchanged, TableBuilder};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn lobby() -> GameSession {
        GameSession::new(
            ChatId(-1),
            ObjectivePool::from_ordered(vec!["a".to_string(), "b".to_string()]),
            SessionRules::default(),
        )
    }

    #[test]
    fn test_apply_and_approve() {
        let mut session = lobby();
        session.apply(PlayerId(1), "Ann").unwrap();
        assert!(session.is_pending(PlayerId(1)));

        let err = session.apply(PlayerId(1), "Ann").unwrap_err();
        assert!(matches!(err, GameError::AlreadyPending(PlayerId(1))));

        session.approve(PlayerId(1)).unwrap();
        assert!(session.is_member(PlayerId(1)));
        assert!(!session.is_pending(PlayerId(1)));
        assert_eq!(session.player(PlayerId(1)).unwrap().role, Role::Crew);

        let err = session.apply(PlayerId(1), "Ann").unwrap_err();
        assert!(matches!(err, GameError::AlreadyMember(PlayerId(1))));
    }

    #[test]
    fn test_reject_discards_application() {
        let mut session = lobby();
        session.apply(PlayerId(2), "Bob").unwrap();
        session.reject(PlayerId(2)).unwrap();
        assert!(!session.is_pending(PlayerId(2)));
        assert!(!session.is_member(PlayerId(2)));

        let err = session.approve(PlayerId(2)).unwrap_err();
        assert!(matches!(
            err,
            GameError::NotFound(Missing::Application(PlayerId(2)))
        ));
    }

    #[test]
    fn test_start_requires_min_players() {
        let mut session = lobby();
        for id in 1..=2 {
            session.apply(PlayerId(id), format!("P{id}")).unwrap();
            session.approve(PlayerId(id)).unwrap();
        }
        let mut rng = StdRng::seed_from_u64(1);
        let err = session
            .start(3, &ScalingPolicy::default(), &mut rng)
            .unwrap_err();
        assert!(matches!(err, GameError::NotEnoughPlayers { have: 2, need: 3 }));
        assert_eq!(session.status(), Status::Lobby);
    }

    #[test]
    fn test_start_rejects_impostor_majority() {
        let mut rng = StdRng::seed_from_u64(1);
        for players in 3..=4 {
            let mut session = TableBuilder::new(players).lobby();
            let err = assert_rejected_unchanged(&mut session, |s| {
                s.start(3, &ScalingPolicy::Fixed { impostors: 2 }, &mut rng)
            });
            assert!(matches!(err, GameError::NotEnoughPlayers { need: 5, .. }));
            assert_eq!(session.status(), Status::Lobby);
        }

        let mut session = TableBuilder::new(3).lobby();
        let err = session
            .start(3, &ScalingPolicy::Headcount { pair_threshold: 3 }, &mut rng)
            .unwrap_err();
        assert!(matches!(err, GameError::NotEnoughPlayers { have: 3, need: 5 }));
        assert!(session.impostors().next().is_none());

        let session = TableBuilder::new(5)
            .scaling(ScalingPolicy::Fixed { impostors: 2 })
            .start();
        assert_eq!(session.standing().living_crew, 3);
    }

    #[test]
    fn test_start_partitions_players() {
        for seed in 0..20 {
            let session = TableBuilder::new(7).seed(seed).start();
            let impostors: BTreeSet<PlayerId> = session.impostors().collect();
            let crew: BTreeSet<PlayerId> = session
                .players()
                .iter()
                .filter(|p| p.role == Role::Crew)
                .map(|p| p.id)
                .collect();
            let everyone: BTreeSet<PlayerId> = session.players().iter().map(|p| p.id).collect();

            assert_eq!(impostors.len(), 2);
            assert!(impostors.is_disjoint(&crew));
            assert_eq!(&impostors | &crew, everyone);
            assert_eq!(session.original_impostors().len(), 2);
        }
    }

    #[test]
    fn test_start_only_once() {
        let mut session = TableBuilder::new(4).start();
        let mut rng = StdRng::seed_from_u64(5);
        let err = session
            .start(3, &ScalingPolicy::default(), &mut rng)
            .unwrap_err();
        assert!(matches!(err, GameError::InvalidState { status: Status::InProgress, .. }));
    }

    #[test]
    fn test_start_issues_first_objective() {
        let session = TableBuilder::new(3).objectives(&["sing", "dance"]).start();
        let current = session.current_objective().unwrap();
        assert_eq!(current.text, "sing");
        assert!(current.can_skip);
        assert_eq!(session.objective_history(), ["sing".to_string()]);
    }

    #[test]
    fn test_start_with_empty_pool() {
        let session = TableBuilder::new(3).objectives(&[]).start();
        assert_eq!(session.status(), Status::InProgress);
        assert!(session.current_objective().is_none());
    }

    #[test]
    fn test_exhaustion_is_stable() {
        let mut session = TableBuilder::new(3).objectives(&["a", "b"]).start();
        session.issue_objective().unwrap();
        let history = session.objective_history().to_vec();
        for _ in 0..3 {
            assert!(matches!(session.issue_objective(), Err(GameError::Exhausted)));
        }
        assert_eq!(session.objective_history(), history.as_slice());
        assert_eq!(session.current_objective().unwrap().text, "b");
    }

    #[test]
    fn test_complete_objective_rotates() {
        let mut session = TableBuilder::new(3).objectives(&["a", "b", "c"]).start();
        let impostor = session.impostors().next().unwrap();

        let effects = session.complete_objective(impostor).unwrap();
        assert!(effects.contains(&Effect::ObjectiveCompleted { completed: 1, to_win: 2 }));
        assert_eq!(session.current_objective().unwrap().text, "b");
        assert_eq!(session.completed_objectives(), ["a".to_string()]);
    }

    #[test]
    fn test_complete_objective_wins() {
        let mut session = TableBuilder::new(3).objectives(&["a", "b", "c"]).start();
        let impostor = session.impostors().next().unwrap();
        session.complete_objective(impostor).unwrap();
        let effects = session.complete_objective(impostor).unwrap();

        assert_eq!(session.status(), Status::Ended);
        let ending = session.ending().unwrap();
        assert_eq!(ending.victory, Some(Victory::ImpostorsCompletedObjectives));
        assert_eq!(ending.completed_objectives, vec!["a", "b"]);
        assert!(matches!(effects.last(), Some(Effect::GameEnded(_))));
    }

    #[test]
    fn test_complete_objective_needs_impostor() {
        let mut session = TableBuilder::new(3).start();
        let crew = session.players().iter().find(|p| !p.is_impostor()).unwrap().id;
        assert_rejected_unchanged(&mut session, |s| s.complete_objective(crew));
    }

    #[test]
    fn test_complete_when_exhausted() {
        let mut session = TableBuilder::new(6).objectives(&["only"]).start();
        let impostor = session.impostors().next().unwrap();
        let effects = session.complete_objective(impostor).unwrap();
        assert!(effects.contains(&Effect::ObjectivesExhausted));
        assert!(matches!(
            session.complete_objective(impostor),
            Err(GameError::Exhausted)
        ));
    }

    #[test]
    fn test_skip_disables_after_allowance() {
        let mut session = TableBuilder::new(3).objectives(&["a", "b", "c"]).start();
        let impostor = session.impostors().next().unwrap();

        let effects = session.skip_objective(impostor).unwrap();
        assert_eq!(session.skips_left(), 0);
        match &effects[1] {
            Effect::ObjectiveIssued(objective) => {
                assert_eq!(objective.text, "b");
                assert!(!objective.can_skip);
            }
            other => panic!("unexpected effect {other:?}"),
        }

        assert_rejected_unchanged(&mut session, |s| s.skip_objective(impostor));
        let next = session.issue_objective().unwrap();
        assert!(!next.can_skip);
    }

    #[test]
    fn test_skip_with_empty_pool_keeps_allowance() {
        let mut session = TableBuilder::new(3).objectives(&["a"]).start();
        let impostor = session.impostors().next().unwrap();
        assert!(matches!(session.skip_objective(impostor), Err(GameError::Exhausted)));
        assert_eq!(session.skips_left(), 1);
    }

    #[test]
    fn test_resend_does_not_spend_skip() {
        let mut session = TableBuilder::new(3).objectives(&["a", "b"]).start();
        session.resend_objective().unwrap();
        assert_eq!(session.current_objective().unwrap().text, "b");
        assert_eq!(session.skips_left(), 1);
        assert!(matches!(session.resend_objective(), Err(GameError::Exhausted)));
    }

    #[test]
    fn test_open_vote_guards() {
        let mut session = TableBuilder::new(4).start();
        let caller = session.players()[0].id;

        assert!(matches!(
            session.open_vote(PlayerId(999), Instant::now()),
            Err(GameError::NotFound(Missing::Player(PlayerId(999))))
        ));

        session.open_vote(caller, Instant::now()).unwrap();
        assert_eq!(session.votes_used(), 1);
        assert_rejected_unchanged(&mut session, |s| s.open_vote(caller, Instant::now()));
    }

    #[test]
    fn test_open_vote_in_lobby() {
        let mut session = lobby();
        session.apply(PlayerId(1), "Ann").unwrap();
        session.approve(PlayerId(1)).unwrap();
        assert!(matches!(
            session.open_vote(PlayerId(1), Instant::now()),
            Err(GameError::InvalidState { status: Status::Lobby, .. })
        ));
    }

    #[test]
    fn test_self_accusation_rejected() {
        let mut session = TableBuilder::new(4).start();
        let voter = session.players()[0].id;
        session.open_vote(voter, Instant::now()).unwrap();

        assert_rejected_unchanged(&mut session, |s| s.cast_ballot(voter, voter));
        assert_eq!(session.vote().unwrap().ballots_cast(), 0);
    }

    #[test]
    fn test_ballot_without_vote() {
        let mut session = TableBuilder::new(4).start();
        let ids: Vec<PlayerId> = session.players().iter().map(|p| p.id).collect();
        assert!(matches!(
            session.cast_ballot(ids[0], ids[1]),
            Err(GameError::NoOpenVote)
        ));
    }

    #[test]
    fn test_double_ballot_rejected() {
        let mut session = TableBuilder::new(4).start();
        let ids: Vec<PlayerId> = session.players().iter().map(|p| p.id).collect();
        session.open_vote(ids[0], Instant::now()).unwrap();
        session.cast_ballot(ids[0], ids[1]).unwrap();
        assert!(matches!(
            session.cast_ballot(ids[0], ids[2]),
            Err(GameError::AlreadyVoted(_))
        ));
        assert_eq!(session.vote().unwrap().counts()[0].votes, 1);
    }

    #[test]
    fn test_quorum_unmasks_impostor() {
        let mut session = TableBuilder::new(6).start();
        let impostor = session.impostors().next().unwrap();
        let voters: Vec<PlayerId> = session.players().iter().map(|p| p.id).collect();
        session.open_vote(voters[0], Instant::now()).unwrap();

        let mut last = Vec::new();
        for &voter in &voters {
            let target = if voter == impostor {
                voters.iter().copied().find(|&id| id != impostor).unwrap()
            } else {
                impostor
            };
            last = session.cast_ballot(voter, target).unwrap();
        }

        assert!(last.iter().any(|e| matches!(
            e,
            Effect::VoteResolved { verdict: Verdict::Unmasked { .. }, .. }
        )));
        assert!(!session.is_impostor(impostor));
        assert_eq!(session.voted_out(), [impostor]);
        assert!(session.original_impostors().contains(&impostor));
        assert!(session.vote().is_none());
        assert_eq!(session.status(), Status::InProgress);
    }

    #[test]
    fn test_voted_out_player_is_barred() {
        let mut session = TableBuilder::new(6).start();
        let impostor = session.impostors().next().unwrap();
        let voters: Vec<PlayerId> = session.players().iter().map(|p| p.id).collect();
        session.open_vote(voters[0], Instant::now()).unwrap();
        for &voter in &voters {
            if voter != impostor {
                session.cast_ballot(voter, impostor).unwrap();
            }
        }
        session.expire_vote(1).unwrap();

        assert!(matches!(
            session.open_vote(impostor, Instant::now()),
            Err(GameError::VotedOut(_))
        ));
        session.open_vote(voters.iter().copied().find(|&v| v != impostor).unwrap(), Instant::now()).unwrap();
        assert!(matches!(
            session.cast_ballot(impostor, voters[0]),
            Err(GameError::VotedOut(_))
        ));
        // Quorum now excludes the voted-out player.
        assert_eq!(session.eligible_voters(), 5);
    }

    #[test]
    fn test_stop_from_lobby() {
        let mut session = lobby();
        let effects = session.stop().unwrap();
        assert_eq!(session.status(), Status::Ended);
        assert!(matches!(
            &effects[0],
            Effect::GameEnded(Ending { victory: None, .. })
        ));
        assert!(session.stop().is_err());
    }

    #[test]
    fn test_force_score_reaches_threshold() {
        let mut session = TableBuilder::new(3).start();
        session.force_add_score().unwrap();
        session.force_remove_score().unwrap();
        session.force_remove_score().unwrap();
        assert_eq!(session.objectives_completed(), 0);

        session.force_add_score().unwrap();
        let effects = session.force_add_score().unwrap();
        assert_eq!(session.status(), Status::Ended);
        assert!(matches!(effects.last(), Some(Effect::GameEnded(_))));
    }

    #[test]
    fn test_force_vote_budget() {
        let mut session = TableBuilder::new(6).start();
        assert_eq!(session.votes_total(), 4);
        session.force_add_vote_budget().unwrap();
        assert_eq!(session.votes_total(), 5);
        session.force_remove_vote_budget().unwrap();
        session.force_remove_vote_budget().unwrap();
        assert_eq!(session.votes_total(), 3);
    }

    #[test]
    fn test_removing_last_vote_ends_game() {
        let mut session = TableBuilder::new(3).start();
        assert_eq!(session.votes_total(), 1);
        let effects = session.force_remove_vote_budget().unwrap();
        assert_eq!(session.status(), Status::Ended);
        assert_eq!(
            session.ending().unwrap().victory,
            Some(Victory::ImpostorsOutlastedVotes)
        );
        assert!(matches!(effects.last(), Some(Effect::GameEnded(_))));
    }

    #[test]
    fn test_remove_vote_budget_below_used_rejected() {
        let mut session = TableBuilder::new(3).start();
        let caller = session.players()[0].id;
        session.open_vote(caller, Instant::now()).unwrap();
        assert_rejected_unchanged(&mut session, |s| s.force_remove_vote_budget());
    }
}
