//! Session engine for a chat-based social deduction game.
//!
//! This crate provides:
//! - Lobby management with applications and approvals
//! - Hidden role assignment scaled to the headcount
//! - A private objective draw order per game, backed by a shared catalog
//! - Timed accusation votes that close on quorum or timeout
//! - Win evaluation after every vote, objective, and admin override
//!
//! Transports stay outside: an adapter turns chat input into [`Command`]s
//! and renders the returned [`Reply`] or published [`GameEvent`]s.
//!
//! # Quick Start
//!
//! ```ignore
//! use impostor_core::{ChatId, Command, Engine, EngineConfig, PlayerId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::new()
//!         .with_catalog_path("tasks.json")
//!         .with_admin(PlayerId(1));
//!
//!     let engine = Engine::load(config).await?;
//!     let chat = ChatId(-100);
//!
//!     engine.dispatch(chat, PlayerId(1), Command::CreateLobby).await?;
//!     engine
//!         .dispatch(chat, PlayerId(2), Command::Apply { name: "Ann".into() })
//!         .await?;
//!
//!     let reply = engine
//!         .dispatch(chat, PlayerId(1), Command::Approve { player: PlayerId(2) })
//!         .await?;
//!     println!("{} players", reply.snapshot.players.len());
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod policy;
pub mod registry;
pub mod session;
pub mod testing;
pub mod victory;
pub mod vote;

// Primary public API
pub use catalog::{Bucket, CatalogEdit, CatalogError, CatalogFile, ObjectivePool, TaskCatalog};
pub use command::{Command, Effect, Reply};
pub use config::{ConfigError, EngineConfig};
pub use engine::{Cause, Engine, GameEvent};
pub use error::{Budget, GameError, GameResult, Missing};
pub use model::{ChatId, PendingApplication, Player, PlayerId, Role, SessionId, Status, Team};
pub use policy::{Lineup, ScalingPolicy, SessionRules};
pub use registry::{SessionHandle, SessionRegistry};
pub use session::{Ending, GameSession, IssuedObjective, SessionSnapshot, VoteSnapshot};
pub use victory::{Standing, Victory};
pub use vote::{BallotCount, Verdict, VoteRound};
