//! Game model types.
//!
//! Identities, roles, players and the lifecycle status shared by every
//! other module.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Identity of a conversation (group chat) hosting a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a participant. Opaque to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub i64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one session instance.
///
/// A chat can host many games over time; vote timers carry this id so they
/// never touch a newer game in the same chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Roles and Players
// ============================================================================

/// Hidden role of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Crew,
    Impostor,
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Crew => "crew",
            Role::Impostor => "impostor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The side that wins a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Crew,
    Impostors,
}

/// An approved participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub role: Role,
}

impl Player {
    /// Create a player with the default crew role.
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            role: Role::Crew,
        }
    }

    pub fn is_impostor(&self) -> bool {
        self.role == Role::Impostor
    }
}

/// A request to join, waiting for an admin decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingApplication {
    pub id: PlayerId,
    pub name: String,
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Lifecycle status of a game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Accepting applications.
    Lobby,
    /// Roles assigned; objectives and votes active.
    InProgress,
    /// Terminal.
    Ended,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Ended)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Lobby => write!(f, "lobby"),
            Status::InProgress => write!(f, "in_progress"),
            Status::Ended => write!(f, "ended"),
        }
    }
}
