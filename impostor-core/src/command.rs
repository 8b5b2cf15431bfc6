//! Command/Effect surface of the engine.
//!
//! A transport adapter turns chat input into a [`Command`]; the engine
//! resolves it against one session and answers with a [`Reply`]: the
//! [`Effect`]s that happened plus a fresh snapshot for rendering.

use crate::model::PlayerId;
use crate::policy::ScalingPolicy;
use crate::session::{Ending, IssuedObjective, SessionSnapshot};
use crate::vote::Verdict;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Everything a participant or admin can ask of a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Open a lobby in this chat.
    CreateLobby,
    /// Ask to join the lobby.
    Apply { name: String },
    /// Admit a pending applicant.
    Approve { player: PlayerId },
    /// Turn a pending applicant away.
    Reject { player: PlayerId },
    /// Assign roles and begin. `None` falls back to the engine config.
    Start {
        min_players: Option<usize>,
        scaling: Option<ScalingPolicy>,
    },
    /// Force-end the game.
    Stop,
    /// Call an emergency vote.
    OpenVote,
    /// Accuse a player in the open vote.
    CastBallot { accused: PlayerId },
    /// Impostor reports the current objective done.
    CompleteObjective,
    /// Impostor trades the current objective for another.
    SkipObjective,
    ForceAddScore,
    ForceRemoveScore,
    ForceAddVoteBudget,
    ForceRemoveVoteBudget,
    /// Draw a fresh objective for the impostors.
    ResendObjective,
}

impl Command {
    /// Short name used in logs and rejections.
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateLobby => "create_lobby",
            Command::Apply { .. } => "apply",
            Command::Approve { .. } => "approve",
            Command::Reject { .. } => "reject",
            Command::Start { .. } => "start",
            Command::Stop => "stop",
            Command::OpenVote => "open_vote",
            Command::CastBallot { .. } => "cast_ballot",
            Command::CompleteObjective => "complete_objective",
            Command::SkipObjective => "skip_objective",
            Command::ForceAddScore => "force_add_score",
            Command::ForceRemoveScore => "force_remove_score",
            Command::ForceAddVoteBudget => "force_add_vote_budget",
            Command::ForceRemoveVoteBudget => "force_remove_vote_budget",
            Command::ResendObjective => "resend_objective",
        }
    }

    /// Whether only a configured admin may issue this command.
    pub fn requires_admin(&self) -> bool {
        !matches!(
            self,
            Command::Apply { .. }
                | Command::OpenVote
                | Command::CastBallot { .. }
                | Command::CompleteObjective
                | Command::SkipObjective
        )
    }
}

/// A state change produced by a command or a timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    LobbyOpened,
    Applied {
        player: PlayerId,
        name: String,
    },
    Approved {
        player: PlayerId,
        players: usize,
    },
    Rejected {
        player: PlayerId,
    },
    Started {
        impostors: Vec<PlayerId>,
        objectives_to_win: u32,
        votes_total: u32,
    },
    ObjectiveIssued(IssuedObjective),
    ObjectivesExhausted,
    ObjectiveCompleted {
        completed: u32,
        to_win: u32,
    },
    ObjectiveSkipped {
        skips_left: u32,
    },
    VoteOpened {
        round: u32,
        called_by: PlayerId,
        votes_used: u32,
        votes_total: u32,
        timeout: Duration,
    },
    BallotCast {
        voter: PlayerId,
        outstanding: usize,
    },
    VoteResolved {
        round: u32,
        verdict: Verdict,
        votes_left: u32,
    },
    ScoreAdjusted {
        completed: u32,
        to_win: u32,
    },
    VoteBudgetAdjusted {
        votes_used: u32,
        votes_total: u32,
    },
    GameEnded(Ending),
}

/// Successful answer to a command.
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub effects: Vec<Effect>,
    pub snapshot: SessionSnapshot,
}

impl Reply {
    /// The ending, if this command finished the game.
    pub fn ending(&self) -> Option<&Ending> {
        self.effects.iter().find_map(|effect| match effect {
            Effect::GameEnded(ending) => Some(ending),
            _ => None,
        })
    }

    /// The verdict, if this command closed a vote.
    pub fn verdict(&self) -> Option<&Verdict> {
        self.effects.iter().find_map(|effect| match effect {
            Effect::VoteResolved { verdict, .. } => Some(verdict),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_gating() {
        assert!(Command::Stop.requires_admin());
        assert!(Command::ForceAddScore.requires_admin());
        assert!(Command::Approve { player: PlayerId(1) }.requires_admin());
        assert!(!Command::OpenVote.requires_admin());
        assert!(!Command::CastBallot { accused: PlayerId(2) }.requires_admin());
    }

    #[test]
    fn test_command_json_shape() {
        let json = serde_json::to_value(Command::CastBallot { accused: PlayerId(5) }).unwrap();
        assert_eq!(json["command"], "cast_ballot");
        assert_eq!(json["accused"], 5);

        let parsed: Command = serde_json::from_str(r#"{"command":"open_vote"}"#).unwrap();
        assert_eq!(parsed, Command::OpenVote);
    }
}
