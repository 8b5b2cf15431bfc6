//! Win evaluation.
//!
//! Pure functions over a [`Standing`], which is rebuilt from session state
//! on demand. Quorum, timeout, and admin paths all ask the same questions.

use crate::model::Team;
use serde::{Deserialize, Serialize};

/// How a game was won.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Victory {
    /// Every impostor was voted out.
    CrewUnmaskedAll,
    /// The impostors reached their objective threshold.
    ImpostorsCompletedObjectives,
    /// Impostors equal or outnumber the remaining crew.
    ImpostorsOutnumbered,
    /// The crew spent its last vote with impostors still hidden.
    ImpostorsOutlastedVotes,
}

impl Victory {
    pub fn winner(&self) -> Team {
        match self {
            Victory::CrewUnmaskedAll => Team::Crew,
            Victory::ImpostorsCompletedObjectives
            | Victory::ImpostorsOutnumbered
            | Victory::ImpostorsOutlastedVotes => Team::Impostors,
        }
    }
}

/// The counts every win check needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Standing {
    pub living_impostors: usize,
    pub living_crew: usize,
    pub votes_used: u32,
    pub votes_total: u32,
    pub objectives_completed: u32,
    pub objectives_to_win: u32,
}

impl Standing {
    pub fn votes_exhausted(&self) -> bool {
        self.votes_used >= self.votes_total
    }
}

/// Checks run after a vote round closes, in fixed order.
pub fn after_vote(standing: &Standing) -> Option<Victory> {
    if standing.living_impostors == 0 {
        return Some(Victory::CrewUnmaskedAll);
    }
    if standing.living_impostors >= standing.living_crew {
        return Some(Victory::ImpostorsOutnumbered);
    }
    if standing.votes_exhausted() {
        return Some(Victory::ImpostorsOutlastedVotes);
    }
    None
}

/// Check run after the objective counter moves up.
pub fn after_objective(standing: &Standing) -> Option<Victory> {
    (standing.objectives_completed >= standing.objectives_to_win)
        .then_some(Victory::ImpostorsCompletedObjectives)
}

/// Check run after the vote budget shrinks while no round is open.
pub fn after_budget_change(standing: &Standing) -> Option<Victory> {
    (standing.living_impostors > 0 && standing.votes_exhausted())
        .then_some(Victory::ImpostorsOutlastedVotes)
}
