//! Seams between the playback core and the chat platform.
//!
//! The session, registry and watchdog only talk to these traits; the
//! songbird/serenity implementations live in
//! [`songbird_transport`](super::songbird_transport) and
//! [`platform`](crate::bot::platform).

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::{
    audio::queue::QueuedTrack,
    error::{TransportError, VoiceError},
    ui::Reply,
};

/// Outcome delivered when a stream stops producing frames on its own.
pub type StreamEnd = Result<(), TransportError>;

/// Pause/abort handle for a stream that is currently playing.
pub trait StreamControl: Send + Sync {
    fn set_paused(&self, paused: bool) -> Result<(), TransportError>;

    /// Suspends and discards the stream. Its completion signal may or may
    /// not fire afterwards.
    fn abort(&self);
}

/// A track being transcoded and streamed into a voice channel.
pub struct ActiveStream {
    pub control: Box<dyn StreamControl>,
    pub finished: oneshot::Receiver<StreamEnd>,
}

impl ActiveStream {
    pub fn new(control: Box<dyn StreamControl>, finished: oneshot::Receiver<StreamEnd>) -> Self {
        Self { control, finished }
    }
}

/// One joined voice connection, owned by exactly one session.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    fn guild_id(&self) -> GuildId;

    fn channel_id(&self) -> ChannelId;

    async fn set_speaking(&self, speaking: bool) -> Result<(), TransportError>;

    /// Starts transcoding and streaming `track`.
    async fn stream(&self, track: &QueuedTrack) -> Result<ActiveStream, TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceTransport>, VoiceError>;
}

/// Read access to who is sitting in which voice channel.
#[async_trait]
pub trait VoiceRoster: Send + Sync {
    fn voice_channel_of(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId>;

    /// Number of users in `channel_id`, the bot included.
    async fn listener_count(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<usize, TransportError>;
}

/// Outbound side of the chat platform.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, channel_id: ChannelId, reply: Reply) -> anyhow::Result<()>;

    /// Sends to the user's private channel.
    async fn send_direct(&self, user_id: UserId, reply: Reply) -> anyhow::Result<()>;

    async fn react(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: &str,
    ) -> anyhow::Result<()>;
}
