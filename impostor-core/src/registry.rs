//! Chat → session registry.
//!
//! At most one live session per chat. Each session sits behind its own
//! mutex so operations on one chat never block another.

use crate::error::{GameError, GameResult, Missing};
use crate::model::{ChatId, SessionId};
use crate::session::GameSession;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Shared, lockable session.
pub type SessionHandle = Arc<Mutex<GameSession>>;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ChatId, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, chat: ChatId) -> GameResult<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(&chat)
            .cloned()
            .ok_or(GameError::NotFound(Missing::Session(chat)))
    }

    /// Register a new session. Fails if the chat already has one.
    pub async fn create(&self, session: GameSession) -> GameResult<SessionHandle> {
        let chat = session.chat();
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&chat) {
            return Err(GameError::AlreadyExists(chat));
        }
        let handle = Arc::new(Mutex::new(session));
        sessions.insert(chat, Arc::clone(&handle));
        debug!(chat = %chat, "Session registered");
        Ok(handle)
    }

    /// Drop the chat's session. Returns whether one was present.
    pub async fn end(&self, chat: ChatId) -> bool {
        let removed = self.sessions.write().await.remove(&chat).is_some();
        if removed {
            debug!(chat = %chat, "Session removed");
        }
        removed
    }

    /// Drop the chat's session only if it is still the instance `id`.
    ///
    /// A newer game in the same chat is left alone. The caller must not hold
    /// that session's lock.
    pub async fn end_instance(&self, chat: ChatId, id: SessionId) -> bool {
        let Ok(handle) = self.get(chat).await else {
            return false;
        };
        if handle.lock().await.id() != id {
            return false;
        }

        let mut sessions = self.sessions.write().await;
        let same = sessions
            .get(&chat)
            .is_some_and(|current| Arc::ptr_eq(current, &handle));
        if same {
            sessions.remove(&chat);
            debug!(chat = %chat, session = %id, "Session removed");
        }
        same
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Chats with a live session, in id order.
    pub async fn chats(&self) -> Vec<ChatId> {
        let mut chats: Vec<ChatId> = self.sessions.read().await.keys().copied().collect();
        chats.sort();
        chats
    }

    /// Every registered session handle.
    pub async fn handles(&self) -> Vec<(ChatId, SessionHandle)> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(chat, handle)| (*chat, Arc::clone(handle)))
            .collect()
    }
}
