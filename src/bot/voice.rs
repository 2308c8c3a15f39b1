//! Voice command handlers.
//!
//! Every handler answers with a [`Reply`]; voice feedback is a
//! [`Reply::Voice`] that the router posts verbatim. `play` answers `None`
//! when it started playback, since the "now playing" embed follows.

use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    audio::{
        queue::QueuedTrack,
        registry::SessionRegistry,
        session::{AudioSession, PlaybackStatus},
        transport::{MessageSink, VoiceConnector, VoiceRoster},
    },
    error::VoiceError,
    sources::MediaResolver,
    ui::{embeds, Reply},
};

const SAME_CHANNEL: &str = "you must be in the same channel to use this command";
const NOT_IN_VOICE: &str = "you must be in a voice channel to use this command";

/// Who ran a command, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandContext {
    pub guild_id: GuildId,
    /// Text channel the command came from; replies and "now playing" go here.
    pub channel_id: ChannelId,
    pub author_id: UserId,
}

/// Name and help line of every voice command, in help order.
pub const VOICE_COMMANDS: &[(&str, &str)] = &[
    ("play", "play next in queue"),
    ("pause", "pause/unpause audio"),
    ("resume", "resume paused audio"),
    ("skip", "skip current track"),
    ("queue", "show the current queue"),
    ("join", "join your voice channel"),
    ("leave", "leave the voice channel"),
];

pub struct VoiceCommands {
    registry: Arc<SessionRegistry>,
    resolver: Arc<dyn MediaResolver>,
    connector: Arc<dyn VoiceConnector>,
    roster: Arc<dyn VoiceRoster>,
    sink: Arc<dyn MessageSink>,
}

impl VoiceCommands {
    pub fn new(
        registry: Arc<SessionRegistry>,
        resolver: Arc<dyn MediaResolver>,
        connector: Arc<dyn VoiceConnector>,
        roster: Arc<dyn VoiceRoster>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            registry,
            resolver,
            connector,
            roster,
            sink,
        }
    }

    pub fn is_voice_command(name: &str) -> bool {
        VOICE_COMMANDS.iter().any(|(command, _)| *command == name)
    }

    /// Runs the named voice command; `None` for names this module doesn't own.
    pub async fn dispatch(
        &self,
        name: &str,
        ctx: CommandContext,
        args: &[String],
    ) -> Option<Option<Reply>> {
        let reply = match name {
            "play" => self.play(ctx, args.first().map(String::as_str)).await,
            "pause" => Some(self.pause(ctx).await),
            "resume" => Some(self.resume(ctx).await),
            "skip" => Some(self.skip(ctx).await),
            "queue" => Some(self.queue(ctx).await),
            "join" => Some(self.join(ctx).await),
            "leave" => Some(self.leave(ctx).await),
            _ => return None,
        };
        Some(reply)
    }

    /// Registered session, unless it is being torn down.
    async fn live_session(&self, guild_id: GuildId) -> Option<Arc<AudioSession>> {
        self.registry
            .get(guild_id)
            .await
            .filter(|session| !session.is_closed())
    }

    fn author_channel(&self, ctx: CommandContext) -> Option<ChannelId> {
        self.roster.voice_channel_of(ctx.guild_id, ctx.author_id)
    }

    fn co_located(&self, ctx: CommandContext, session: &AudioSession) -> bool {
        self.author_channel(ctx) == Some(session.channel_id())
    }

    async fn session_for(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<(Arc<AudioSession>, bool), VoiceError> {
        self.registry
            .get_or_create(guild_id, || async {
                let transport = self.connector.join(guild_id, channel_id).await?;
                Ok(AudioSession::new(transport, self.sink.clone()))
            })
            .await
    }

    pub async fn play(&self, ctx: CommandContext, link: Option<&str>) -> Option<Reply> {
        let Some(link) = link else {
            return Some(Reply::voice("play requires a link argument"));
        };

        let Some(voice_channel) = self.author_channel(ctx) else {
            return Some(Reply::voice(NOT_IN_VOICE));
        };

        let session = match self.session_for(ctx.guild_id, voice_channel).await {
            Ok((session, _)) => session,
            Err(e) => {
                error!(guild_id = %ctx.guild_id, "Error joining voice: {}", e);
                return Some(Reply::voice("error joining voice channel"));
            }
        };

        if session.channel_id() != voice_channel {
            return Some(Reply::voice(SAME_CHANNEL));
        }

        let media = match self.resolver.resolve(link).await {
            Ok(media) => media,
            Err(e) => {
                warn!(link, source = self.resolver.source_name(), "Error obteniendo info del video: {}", e);
                return Some(Reply::voice("failed to add item to queue"));
            }
        };

        let track = QueuedTrack::new(link, media, ctx.channel_id, ctx.author_id);
        let title = track.title.clone();
        match session.enqueue(track) {
            Ok(enqueued) if enqueued.started => None,
            Ok(enqueued) => Some(Reply::voice(format!(
                "queued `{}` in position {}",
                title, enqueued.position
            ))),
            Err(e) => {
                warn!(guild_id = %ctx.guild_id, "Sesión cerrada durante play: {}", e);
                Some(Reply::voice("failed to add item to queue"))
            }
        }
    }

    /// Toggles between paused and playing.
    pub async fn pause(&self, ctx: CommandContext) -> Reply {
        let Some(session) = self.live_session(ctx.guild_id).await else {
            return Reply::voice("unable to pause, not in channel");
        };
        if !self.co_located(ctx, &session) {
            return Reply::voice(SAME_CHANNEL);
        }

        match session.status() {
            PlaybackStatus::Paused if session.resume() => Reply::voice("resuming audio"),
            PlaybackStatus::Playing if session.pause() => Reply::voice("pausing audio"),
            _ => Reply::voice("nothing is playing"),
        }
    }

    pub async fn resume(&self, ctx: CommandContext) -> Reply {
        let Some(session) = self.live_session(ctx.guild_id).await else {
            return Reply::voice("unable to resume, not in channel");
        };
        if !self.co_located(ctx, &session) {
            return Reply::voice(SAME_CHANNEL);
        }

        if session.resume() {
            Reply::voice("resuming audio")
        } else {
            Reply::voice("audio is not paused")
        }
    }

    pub async fn skip(&self, ctx: CommandContext) -> Reply {
        let Some(session) = self.live_session(ctx.guild_id).await else {
            return Reply::voice("unable to skip, not in channel");
        };
        if !self.co_located(ctx, &session) {
            return Reply::voice(SAME_CHANNEL);
        }

        if session.skip() {
            Reply::voice("skipping...")
        } else {
            Reply::voice("can't skip, no audio playing")
        }
    }

    pub async fn queue(&self, ctx: CommandContext) -> Reply {
        let Some(session) = self.live_session(ctx.guild_id).await else {
            return Reply::voice("the queue is empty");
        };

        let current = session.queue().current();
        let pending = session.queue().pending();
        if current.is_none() && pending.is_empty() {
            return Reply::voice("the queue is empty");
        }
        Reply::Embed(embeds::queue_listing(current.as_ref(), &pending))
    }

    pub async fn join(&self, ctx: CommandContext) -> Reply {
        let Some(voice_channel) = self.author_channel(ctx) else {
            return Reply::voice(NOT_IN_VOICE);
        };

        match self.session_for(ctx.guild_id, voice_channel).await {
            Ok((_, true)) => Reply::voice("joined voice channel"),
            Ok((_, false)) => Reply::voice("already connected to a voice channel"),
            Err(e) => {
                error!(guild_id = %ctx.guild_id, "Error joining voice: {}", e);
                Reply::voice("error joining voice channel")
            }
        }
    }

    pub async fn leave(&self, ctx: CommandContext) -> Reply {
        let Some(session) = self.live_session(ctx.guild_id).await else {
            return Reply::voice("not in a voice channel");
        };
        if !self.co_located(ctx, &session) {
            return Reply::voice(SAME_CHANNEL);
        }

        session.shutdown().await;
        self.registry.remove_if_same(ctx.guild_id, &session).await;
        info!("👋 Sesión cerrada por comando en guild {}", ctx.guild_id);
        Reply::voice("left voice channel")
    }
}
