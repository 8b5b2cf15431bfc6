//! Engine - routes commands to sessions and runs vote timers.
//!
//! The engine owns the task catalog, the session registry, and the random
//! source. Every command locks exactly one session for its whole duration,
//! so operations on a session are serialized while chats stay independent.
//!
//! Vote timeouts run as detached tokio tasks. A timer re-locks its session,
//! checks it is still the same game and the same round, and only then
//! closes the vote. Whatever it produces is published as a [`GameEvent`].

use crate::catalog::{Bucket, CatalogEdit, CatalogFile, ObjectivePool, TaskCatalog};
use crate::command::{Command, Effect, Reply};
use crate::config::EngineConfig;
use crate::error::{GameError, GameResult};
use crate::model::{ChatId, PlayerId, SessionId, Status};
use crate::registry::SessionRegistry;
use crate::session::{GameSession, SessionSnapshot};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Capacity of the event channel.
const EVENT_CAPACITY: usize = 256;

/// What caused a published event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum Cause {
    Command {
        actor: PlayerId,
        command: &'static str,
    },
    VoteTimeout {
        round: u32,
    },
}

/// A batch of effects applied to one session.
#[derive(Debug, Clone, Serialize)]
pub struct GameEvent {
    pub chat: ChatId,
    pub cause: Cause,
    pub effects: Vec<Effect>,
    pub snapshot: SessionSnapshot,
}

impl GameEvent {
    pub fn is_timeout(&self) -> bool {
        matches!(self.cause, Cause::VoteTimeout { .. })
    }
}

/// The game engine. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

struct Inner {
    config: EngineConfig,
    registry: SessionRegistry,
    catalog: RwLock<TaskCatalog>,
    catalog_file: Option<CatalogFile>,
    rng: Mutex<StdRng>,
    events: broadcast::Sender<GameEvent>,
}

impl Engine {
    /// Create an engine over an in-memory catalog.
    ///
    /// Edits are persisted only if the config names a catalog path.
    pub fn new(config: EngineConfig, catalog: TaskCatalog) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let catalog_file = config.catalog_path.as_ref().map(CatalogFile::new);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                registry: SessionRegistry::new(),
                catalog: RwLock::new(catalog),
                catalog_file,
                rng: Mutex::new(rng),
                events,
            }),
        }
    }

    /// Create an engine, loading the catalog from the configured path.
    ///
    /// Without a path the catalog starts empty.
    pub async fn load(config: EngineConfig) -> GameResult<Self> {
        let catalog = match &config.catalog_path {
            Some(path) => {
                let catalog = CatalogFile::new(path).load().await?;
                info!(
                    path = %path.display(),
                    active = catalog.active.len(),
                    backlog = catalog.backlog.len(),
                    "Catalog loaded"
                );
                catalog
            }
            None => TaskCatalog::default(),
        };
        Ok(Self::new(config, catalog))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    /// Receive every effect batch, including timer-driven ones.
    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.inner.events.subscribe()
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Run one command against the chat's session.
    pub async fn dispatch(&self, chat: ChatId, actor: PlayerId, command: Command) -> GameResult<Reply> {
        if command.requires_admin() && !self.inner.config.is_admin(actor) {
            debug!(chat = %chat, player = %actor, command = command.name(), "Not permitted");
            return Err(GameError::NotPermitted(actor));
        }
        let name = command.name();

        let result = match command {
            Command::CreateLobby => self.create_lobby(chat).await,
            command => self.run(chat, actor, command).await,
        };
        match &result {
            Ok(reply) => {
                debug!(chat = %chat, player = %actor, command = name, effects = reply.effects.len(), "Command applied");
                self.inner.publish(GameEvent {
                    chat,
                    cause: Cause::Command { actor, command: name },
                    effects: reply.effects.clone(),
                    snapshot: reply.snapshot.clone(),
                });
            }
            Err(err) => {
                debug!(chat = %chat, player = %actor, command = name, error = %err, "Command rejected");
            }
        }
        result
    }

    async fn create_lobby(&self, chat: ChatId) -> GameResult<Reply> {
        let pool = {
            let catalog = self.inner.catalog.read().await;
            let mut rng = self.inner.rng.lock().await;
            ObjectivePool::from_catalog(&catalog, &mut *rng)
        };
        let session = GameSession::new(chat, pool, self.inner.config.session_rules());
        let snapshot = session.snapshot();
        self.inner.registry.create(session).await?;
        info!(chat = %chat, objectives = snapshot.objectives_remaining, "Lobby opened");
        Ok(Reply {
            effects: vec![Effect::LobbyOpened],
            snapshot,
        })
    }

    async fn run(&self, chat: ChatId, actor: PlayerId, command: Command) -> GameResult<Reply> {
        let handle = self.inner.registry.get(chat).await?;
        let mut session = handle.lock().await;

        let effects = match command {
            Command::CreateLobby => return Err(GameError::AlreadyExists(chat)),
            Command::Apply { name } => session.apply(actor, name)?,
            Command::Approve { player } => session.approve(player)?,
            Command::Reject { player } => session.reject(player)?,
            Command::Start {
                min_players,
                scaling,
            } => {
                let config = &self.inner.config;
                let min_players = min_players.unwrap_or(config.min_players);
                let scaling = scaling.unwrap_or(config.scaling);
                let mut rng = self.inner.rng.lock().await;
                session.start(min_players, &scaling, &mut *rng)?
            }
            Command::Stop => session.stop()?,
            Command::OpenVote => {
                let effects = session.open_vote(actor, Instant::now())?;
                let round = session.vote().map(|v| (v.number(), v.timeout()));
                if let Some((round, timeout)) = round {
                    let timer = self.spawn_vote_timer(chat, session.id(), round, timeout);
                    session.attach_vote_timer(round, timer);
                }
                effects
            }
            Command::CastBallot { accused } => session.cast_ballot(actor, accused)?,
            Command::CompleteObjective => session.complete_objective(actor)?,
            Command::SkipObjective => session.skip_objective(actor)?,
            Command::ForceAddScore => session.force_add_score()?,
            Command::ForceRemoveScore => session.force_remove_score()?,
            Command::ForceAddVoteBudget => session.force_add_vote_budget()?,
            Command::ForceRemoveVoteBudget => session.force_remove_vote_budget()?,
            Command::ResendObjective => session.resend_objective()?,
        };

        let snapshot = session.snapshot();
        let finished = session.status() == Status::Ended;
        let id = session.id();
        drop(session);

        if finished {
            self.inner.registry.end_instance(chat, id).await;
        }
        Ok(Reply { effects, snapshot })
    }

    fn spawn_vote_timer(&self, chat: ChatId, session: SessionId, round: u32, timeout: Duration) -> AbortHandle {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            inner.expire_vote(chat, session, round).await;
        });
        debug!(chat = %chat, round, timeout_secs = timeout.as_secs(), "Vote timer armed");
        task.abort_handle()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Current view of a chat's game.
    pub async fn snapshot(&self, chat: ChatId) -> GameResult<SessionSnapshot> {
        let handle = self.inner.registry.get(chat).await?;
        let session = handle.lock().await;
        Ok(session.snapshot())
    }

    /// The chat of a live game `player` sits in, if any.
    ///
    /// Lets private-chat actions be routed back to their game.
    pub async fn find_session_of(&self, player: PlayerId) -> Option<ChatId> {
        let mut handles = self.inner.registry.handles().await;
        handles.sort_by_key(|(chat, _)| *chat);
        for (chat, handle) in handles {
            let session = handle.lock().await;
            if session.status() != Status::Ended && session.is_member(player) {
                return Some(chat);
            }
        }
        None
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    pub async fn catalog_list(&self, bucket: Bucket) -> Vec<String> {
        self.inner.catalog.read().await.list(bucket).to_vec()
    }

    /// Apply an edit and persist it.
    ///
    /// Running sessions keep their own draw order. If saving fails the edit
    /// is not applied.
    pub async fn edit_catalog(&self, edit: CatalogEdit) -> GameResult<()> {
        let mut catalog = self.inner.catalog.write().await;
        let mut edited = catalog.clone();
        edited.apply(edit)?;
        if let Some(file) = &self.inner.catalog_file {
            file.save(&edited).await?;
        }
        info!(
            active = edited.active.len(),
            backlog = edited.backlog.len(),
            "Catalog updated"
        );
        *catalog = edited;
        Ok(())
    }
}

impl Inner {
    async fn expire_vote(&self, chat: ChatId, id: SessionId, round: u32) {
        let Ok(handle) = self.registry.get(chat).await else {
            debug!(chat = %chat, round, "Vote timer fired after the game was removed");
            return;
        };
        let mut session = handle.lock().await;
        if session.id() != id {
            debug!(chat = %chat, round, "Vote timer fired for a previous game");
            return;
        }
        let Some(effects) = session.expire_vote(round) else {
            warn!(chat = %chat, round, "Vote timer fired for a closed round");
            return;
        };

        let snapshot = session.snapshot();
        let finished = session.status() == Status::Ended;
        drop(session);

        if finished {
            self.registry.end_instance(chat, id).await;
        }
        self.publish(GameEvent {
            chat,
            cause: Cause::VoteTimeout { round },
            effects,
            snapshot,
        });
    }

    fn publish(&self, event: GameEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
