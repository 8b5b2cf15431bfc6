//! Start-time balancing rules.
//!
//! A game's size decides how many impostors are hidden among the players,
//! how many objectives they need, and how many votes the crew gets.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default minimum headcount to start a game.
pub const DEFAULT_MIN_PLAYERS: usize = 3;

/// Headcount from which a second impostor joins the game.
pub const DEFAULT_PAIR_THRESHOLD: usize = 6;

/// Objective skips shared by the impostor team.
pub const DEFAULT_SKIP_ALLOWANCE: u32 = 1;

/// How long a vote round stays open.
pub const DEFAULT_VOTE_TIMEOUT: Duration = Duration::from_secs(300);

/// How the impostor count is derived from the headcount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScalingPolicy {
    /// Always the same number of impostors.
    Fixed { impostors: usize },
    /// One impostor, or two once `pair_threshold` players have joined.
    Headcount { pair_threshold: usize },
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        ScalingPolicy::Headcount {
            pair_threshold: DEFAULT_PAIR_THRESHOLD,
        }
    }
}

impl ScalingPolicy {
    pub fn impostors_for(&self, players: usize) -> usize {
        match *self {
            ScalingPolicy::Fixed { impostors } => impostors.max(1),
            ScalingPolicy::Headcount { pair_threshold } => {
                if players >= pair_threshold {
                    2
                } else {
                    1
                }
            }
        }
    }

    /// Compute the full lineup for a headcount.
    pub fn lineup(&self, players: usize) -> Lineup {
        Lineup::for_headcount(players, self.impostors_for(players))
    }
}

/// Counts fixed at game start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineup {
    pub impostors: usize,
    pub objectives_to_win: u32,
    pub votes_total: u32,
}

impl Lineup {
    /// Derive the objective threshold and vote budget.
    ///
    /// More impostors need one more objective. The crew gets one vote per
    /// crew member against a team, but one fewer against a lone impostor,
    /// never less than a single vote.
    pub fn for_headcount(players: usize, impostors: usize) -> Self {
        let crew = players.saturating_sub(impostors) as u32;
        let votes_total = if impostors >= 2 {
            crew
        } else {
            crew.saturating_sub(1).max(1)
        };
        Self {
            impostors,
            objectives_to_win: impostors as u32 + 1,
            votes_total,
        }
    }
}

/// Tunables a session is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRules {
    pub skip_allowance: u32,
    pub vote_timeout: Duration,
}

impl Default for SessionRules {
    fn default() -> Self {
        Self {
            skip_allowance: DEFAULT_SKIP_ALLOWANCE,
            vote_timeout: DEFAULT_VOTE_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headcount_scaling() {
        let policy = ScalingPolicy::default();
        assert_eq!(policy.impostors_for(3), 1);
        assert_eq!(policy.impostors_for(5), 1);
        assert_eq!(policy.impostors_for(6), 2);
        assert_eq!(policy.impostors_for(10), 2);
    }

    #[test]
    fn test_six_player_lineup() {
        let lineup = ScalingPolicy::default().lineup(6);
        assert_eq!(
            lineup,
            Lineup {
                impostors: 2,
                objectives_to_win: 3,
                votes_total: 4,
            }
        );
    }

    #[test]
    fn test_three_player_lineup() {
        let lineup = ScalingPolicy::default().lineup(3);
        assert_eq!(lineup.impostors, 1);
        assert_eq!(lineup.objectives_to_win, 2);
        assert_eq!(lineup.votes_total, 1);
    }

    #[test]
    fn test_single_impostor_keeps_one_vote() {
        assert_eq!(Lineup::for_headcount(2, 1).votes_total, 1);
    }

    #[test]
    fn test_fixed_scaling() {
        let policy = ScalingPolicy::Fixed { impostors: 3 };
        let lineup = policy.lineup(9);
        assert_eq!(lineup.impostors, 3);
        assert_eq!(lineup.objectives_to_win, 4);
        assert_eq!(lineup.votes_total, 6);
    }
}
