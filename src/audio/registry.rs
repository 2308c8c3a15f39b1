use dashmap::DashMap;
use futures::future::join_all;
use serenity::model::id::{ChannelId, GuildId};
use std::{collections::HashMap, future::Future, sync::Arc};
use tokio::sync::Mutex;
use tracing::info;

use crate::audio::session::AudioSession;

/// How a session was brought in line with the bot's own voice state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceStateChange {
    /// The bot is still where the session thinks it is (or there is no session).
    Unchanged,
    /// The bot was dragged to another channel; the session now follows it.
    Moved(ChannelId),
    /// The bot is out of voice; the session was torn down.
    Disconnected,
}

/// Guild → session map; the only state shared across guilds.
///
/// The map lock is only held for lookups and inserts. Voice joins are
/// serialised per guild through `joining`, so two concurrent `play`s in one
/// guild never join twice while other guilds keep answering.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<GuildId, Arc<AudioSession>>>,
    /// One creation guard per guild that ever joined.
    joining: DashMap<GuildId, Arc<Mutex<()>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, guild_id: GuildId) -> Option<Arc<AudioSession>> {
        self.sessions.lock().await.get(&guild_id).cloned()
    }

    /// Returns the guild's session, creating it with `join` if absent.
    ///
    /// The boolean is `true` when a new session was created.
    pub async fn get_or_create<F, Fut, E>(
        &self,
        guild_id: GuildId,
        join: F,
    ) -> Result<(Arc<AudioSession>, bool), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AudioSession, E>>,
    {
        if let Some(session) = self.get(guild_id).await {
            return Ok((session, false));
        }

        let guard = self.joining.entry(guild_id).or_default().value().clone();
        let _joining = guard.lock().await;

        // Another caller may have finished joining while we waited
        if let Some(session) = self.get(guild_id).await {
            return Ok((session, false));
        }

        let session = Arc::new(join().await?);
        self.sessions.lock().await.insert(guild_id, session.clone());
        info!("🔊 Sesión de audio creada en guild {}", guild_id);
        Ok((session, true))
    }

    /// Reconciles the guild's session with the channel the bot is in now.
    ///
    /// `current` must come from live platform state rather than from the
    /// event that triggered the call: a disconnect event can arrive after a
    /// replacement session already joined, and must not tear that one down.
    pub async fn sync_bot_voice(
        &self,
        guild_id: GuildId,
        current: Option<ChannelId>,
    ) -> VoiceStateChange {
        let Some(session) = self.get(guild_id).await else {
            return VoiceStateChange::Unchanged;
        };

        match current {
            Some(channel_id) if channel_id == session.channel_id() => VoiceStateChange::Unchanged,
            Some(channel_id) => {
                session.move_to(channel_id);
                VoiceStateChange::Moved(channel_id)
            }
            None => {
                if !self.remove_if_same(guild_id, &session).await {
                    return VoiceStateChange::Unchanged;
                }
                info!("🔌 Bot desconectado en guild {}", guild_id);
                session.shutdown().await;
                VoiceStateChange::Disconnected
            }
        }
    }

    /// Removes the entry; a no-op when absent.
    pub async fn remove(&self, guild_id: GuildId) -> Option<Arc<AudioSession>> {
        self.sessions.lock().await.remove(&guild_id)
    }

    /// Removes the entry only if it still is `session`, so a stale reference
    /// never evicts a session created after it.
    pub async fn remove_if_same(&self, guild_id: GuildId, session: &Arc<AudioSession>) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(&guild_id) {
            Some(current) if Arc::ptr_eq(current, session) => {
                sessions.remove(&guild_id);
                true
            }
            _ => false,
        }
    }

    pub async fn snapshot(&self) -> Vec<Arc<AudioSession>> {
        self.sessions.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Disconnects and drops every live session (process exit).
    pub async fn shutdown_all(&self) {
        let sessions: Vec<_> = self.sessions.lock().await.drain().map(|(_, s)| s).collect();
        info!("🛑 Cerrando {} sesiones de audio", sessions.len());
        join_all(sessions.iter().map(|session| session.shutdown())).await;
    }
}
