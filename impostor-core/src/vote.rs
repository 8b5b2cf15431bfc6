//! Accusation vote rounds.
//!
//! A round collects at most one ballot per voter and is closed either by
//! quorum or by its timeout. The timer task itself is spawned by the
//! engine; the round only owns its abort handle, so dropping or closing a
//! round always stops a pending timeout.

use crate::error::{GameError, GameResult};
use crate::model::PlayerId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// How a closed round was decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// Nobody voted before the round closed.
    NoVotes,
    /// Two or more players shared the highest count. Nobody is removed.
    Tie { accused: Vec<PlayerId>, votes: u32 },
    /// The plurality pick was an impostor and is out.
    Unmasked { player: PlayerId, votes: u32 },
    /// The plurality pick was crew. Nobody is removed.
    Missed { player: PlayerId, votes: u32 },
}

impl Verdict {
    pub fn unmasked(&self) -> Option<PlayerId> {
        match self {
            Verdict::Unmasked { player, .. } => Some(*player),
            _ => None,
        }
    }
}

/// Raw outcome of counting ballots, before roles are consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plurality {
    NoBallots,
    Tied(Vec<PlayerId>, u32),
    Leader(PlayerId, u32),
}

/// Ballots received for one accused player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotCount {
    pub accused: PlayerId,
    pub votes: u32,
}

/// One in-flight accusation vote.
#[derive(Debug)]
pub struct VoteRound {
    number: u32,
    open: bool,
    tally: HashMap<PlayerId, u32>,
    voters: HashSet<PlayerId>,
    started_at: Instant,
    timeout: Duration,
    timer: Option<AbortHandle>,
}

impl VoteRound {
    pub fn open(number: u32, started_at: Instant, timeout: Duration) -> Self {
        Self {
            number,
            open: true,
            tally: HashMap::new(),
            voters: HashSet::new(),
            started_at,
            timeout,
            timer: None,
        }
    }

    /// Sequence number of this round within its game, starting at 1.
    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn deadline(&self) -> Instant {
        self.started_at + self.timeout
    }

    pub fn has_voted(&self, voter: PlayerId) -> bool {
        self.voters.contains(&voter)
    }

    pub fn ballots_cast(&self) -> usize {
        self.voters.len()
    }

    pub fn voters(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.voters.iter().copied()
    }

    /// Ballot counts ordered by count (highest first), then by id.
    pub fn counts(&self) -> Vec<BallotCount> {
        let mut counts: Vec<BallotCount> = self
            .tally
            .iter()
            .map(|(&accused, &votes)| BallotCount { accused, votes })
            .collect();
        counts.sort_by(|a, b| b.votes.cmp(&a.votes).then(a.accused.cmp(&b.accused)));
        counts
    }

    /// Record a ballot. Role and membership checks are the session's job.
    pub fn record(&mut self, voter: PlayerId, accused: PlayerId) -> GameResult<()> {
        if !self.voters.insert(voter) {
            return Err(GameError::AlreadyVoted(voter));
        }
        *self.tally.entry(accused).or_insert(0) += 1;
        Ok(())
    }

    /// Attach the timeout task so it can be cancelled on quorum.
    pub fn set_timer(&mut self, handle: AbortHandle) {
        if let Some(previous) = self.timer.replace(handle) {
            previous.abort();
        }
    }

    /// Forget the timer without aborting it. Used from inside the timer task.
    pub fn disarm(&mut self) -> Option<AbortHandle> {
        self.timer.take()
    }

    pub fn has_timer(&self) -> bool {
        self.timer.is_some()
    }

    /// Close the round, stop its timer, and count the ballots.
    pub fn close(&mut self) -> Plurality {
        self.open = false;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.plurality()
    }

    /// Strict plurality over the current tally.
    pub fn plurality(&self) -> Plurality {
        let Some(max) = self.tally.values().copied().max() else {
            return Plurality::NoBallots;
        };
        let mut leaders: Vec<PlayerId> = self
            .tally
            .iter()
            .filter(|(_, votes)| **votes == max)
            .map(|(&id, _)| id)
            .collect();
        leaders.sort();
        match leaders.as_slice() {
            [single] => Plurality::Leader(*single, max),
            _ => Plurality::Tied(leaders, max),
        }
    }
}

impl Drop for VoteRound {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
