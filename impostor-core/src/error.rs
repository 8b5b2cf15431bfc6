//! Rejections reported by the engine.
//!
//! Every variant is recoverable: a rejected operation leaves the session in
//! its prior state and the caller turns the error into a user-facing reply.

use crate::catalog::CatalogError;
use crate::model::{ChatId, PlayerId, Status};
use std::fmt;
use thiserror::Error;

/// What a `NotFound` rejection was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Session(ChatId),
    Player(PlayerId),
    Application(PlayerId),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Session(chat) => write!(f, "no game in chat {chat}"),
            Missing::Player(id) => write!(f, "player {id} is not in the game"),
            Missing::Application(id) => write!(f, "no pending application from {id}"),
        }
    }
}

/// A depleted allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    Votes,
    Skips,
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Budget::Votes => write!(f, "vote attempts"),
            Budget::Skips => write!(f, "objective skips"),
        }
    }
}

/// Errors from game operations.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("Not found: {0}")]
    NotFound(Missing),

    #[error("Cannot {action} while the game is {status}")]
    InvalidState { action: &'static str, status: Status },

    #[error("A game already exists in chat {0}")]
    AlreadyExists(ChatId),

    #[error("Player {0} has already voted this round")]
    AlreadyVoted(PlayerId),

    #[error("Player {0} already has a pending application")]
    AlreadyPending(PlayerId),

    #[error("Player {0} is already in the game")]
    AlreadyMember(PlayerId),

    #[error("No {0} left")]
    BudgetExhausted(Budget),

    #[error("No objectives left")]
    Exhausted,

    #[error("A vote is already in progress")]
    VoteInProgress,

    #[error("No vote is open")]
    NoOpenVote,

    #[error("Player {0} cannot accuse themselves")]
    SelfAccusation(PlayerId),

    #[error("Player {0} has been voted out")]
    VotedOut(PlayerId),

    #[error("Not enough players: have {have}, need {need}")]
    NotEnoughPlayers { have: usize, need: usize },

    #[error("Player {0} is not an active impostor")]
    NotAnImpostor(PlayerId),

    #[error("Player {0} is not allowed to do that")]
    NotPermitted(PlayerId),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl GameError {
    pub(crate) fn invalid(action: &'static str, status: Status) -> Self {
        GameError::InvalidState { action, status }
    }
}

/// Result alias for game operations.
pub type GameResult<T> = Result<T, GameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = GameError::invalid("open a vote", Status::Lobby);
        assert_eq!(err.to_string(), "Cannot open a vote while the game is lobby");

        let err = GameError::NotFound(Missing::Session(ChatId(-100)));
        assert_eq!(err.to_string(), "Not found: no game in chat -100");

        let err = GameError::BudgetExhausted(Budget::Votes);
        assert_eq!(err.to_string(), "No vote attempts left");
    }

    #[test]
    fn test_catalog_error_converts() {
        let err: GameError = CatalogError::EmptyTask.into();
        assert!(matches!(err, GameError::Catalog(CatalogError::EmptyTask)));
    }
}
