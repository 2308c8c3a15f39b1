use async_trait::async_trait;
use serenity::{
    builder::CreateMessage,
    cache::Cache,
    http::Http,
    model::{
        channel::ReactionType,
        id::{ChannelId, GuildId, MessageId, UserId},
    },
};
use std::sync::Arc;

use crate::{
    audio::transport::{MessageSink, VoiceRoster},
    error::TransportError,
    ui::Reply,
};

/// Cache-backed roster and HTTP-backed sink for the live gateway connection.
#[derive(Clone)]
pub struct SerenityPlatform {
    cache: Arc<Cache>,
    http: Arc<Http>,
}

impl SerenityPlatform {
    pub fn new(cache: Arc<Cache>, http: Arc<Http>) -> Self {
        Self { cache, http }
    }

    fn message_for(reply: Reply) -> CreateMessage {
        match reply {
            Reply::Text(content) | Reply::Voice(content) => CreateMessage::new().content(content),
            Reply::Embed(embed) => CreateMessage::new().embed(embed.into_serenity()),
        }
    }
}

#[async_trait]
impl VoiceRoster for SerenityPlatform {
    fn voice_channel_of(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
        let guild = guild_id.to_guild_cached(&self.cache)?;
        guild
            .voice_states
            .get(&user_id)
            .and_then(|voice_state| voice_state.channel_id)
    }

    async fn listener_count(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<usize, TransportError> {
        // The cache guard must not outlive this block
        let guild = guild_id
            .to_guild_cached(&self.cache)
            .ok_or(TransportError::GuildUnavailable(guild_id))?;

        Ok(guild
            .voice_states
            .values()
            .filter(|voice_state| voice_state.channel_id == Some(channel_id))
            .count())
    }
}

#[async_trait]
impl MessageSink for SerenityPlatform {
    async fn send(&self, channel_id: ChannelId, reply: Reply) -> anyhow::Result<()> {
        channel_id
            .send_message(&self.http, Self::message_for(reply))
            .await?;
        Ok(())
    }

    async fn send_direct(&self, user_id: UserId, reply: Reply) -> anyhow::Result<()> {
        let dm = user_id.create_dm_channel(&self.http).await?;
        dm.id.send_message(&self.http, Self::message_for(reply)).await?;
        Ok(())
    }

    async fn react(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: &str,
    ) -> anyhow::Result<()> {
        self.http
            .create_reaction(
                channel_id,
                message_id,
                &ReactionType::Unicode(emoji.to_string()),
            )
            .await?;
        Ok(())
    }
}
