use dashmap::DashMap;
use serenity::model::{
    id::{ChannelId, GuildId, MessageId, UserId},
    mention::Mentionable,
};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, error};

use crate::{
    audio::transport::MessageSink,
    bot::voice::{CommandContext, VoiceCommands, VOICE_COMMANDS},
    config::Config,
    plugins::PluginRegistry,
    ui::{embeds, Reply},
};

/// Platform-neutral view of an inbound chat message.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub author_id: UserId,
    pub author_is_bot: bool,
    pub content: String,
}

/// What a command produced, before rendering.
#[derive(Debug, PartialEq)]
enum Outcome {
    Reply { reply: Reply, private: bool },
    Silent,
    Unknown,
}

/// Splits `!name arg arg` into a lower-cased name and its arguments.
pub fn parse_command(prefix: &str, content: &str) -> Option<(String, Vec<String>)> {
    let rest = content.strip_prefix(prefix)?;
    let mut words = rest.split_whitespace();
    let name = words.next()?.to_lowercase();
    Some((name, words.map(str::to_string).collect()))
}

/// Per-user command cooldown.
#[derive(Debug)]
pub struct Cooldowns {
    window: Duration,
    last_command: DashMap<UserId, Instant>,
}

impl Cooldowns {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_command: DashMap::new(),
        }
    }

    pub fn can_post(&self, user_id: UserId) -> bool {
        match self.last_command.get(&user_id) {
            Some(started) => started.elapsed() > self.window,
            None => true,
        }
    }

    pub fn start(&self, user_id: UserId) {
        self.last_command.insert(user_id, Instant::now());
    }
}

pub struct CommandRouter {
    prefix: String,
    cooldown_message: String,
    unknown_command_message: String,
    cooldowns: Cooldowns,
    voice: Option<Arc<VoiceCommands>>,
    plugins: Arc<PluginRegistry>,
    sink: Arc<dyn MessageSink>,
}

impl CommandRouter {
    pub fn new(
        config: &Config,
        voice: Option<Arc<VoiceCommands>>,
        plugins: Arc<PluginRegistry>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            prefix: config.command_prefix.clone(),
            cooldown_message: config.cooldown_message.clone(),
            unknown_command_message: config.unknown_command_message.clone(),
            cooldowns: Cooldowns::new(config.cooldown()),
            voice,
            plugins,
            sink,
        }
    }

    /// Commands and reactions for one message.
    pub async fn handle(&self, message: &IncomingMessage) {
        // Always ignore bot users (including itself)
        if message.author_is_bot {
            return;
        }

        tokio::join!(self.handle_command(message), self.handle_reactions(message));
    }

    async fn handle_command(&self, message: &IncomingMessage) {
        let Some((name, args)) = parse_command(&self.prefix, &message.content) else {
            return;
        };

        if !self.cooldowns.can_post(message.author_id) {
            self.respond_to_user(message, &self.cooldown_message).await;
            return;
        }

        debug!(command = %name, author = %message.author_id, "Comando recibido");
        match self.dispatch(&name, &args, message).await {
            Outcome::Reply { reply, private } => {
                let starts_cooldown = reply.starts_cooldown();
                self.deliver(message, reply, private).await;
                if starts_cooldown {
                    self.cooldowns.start(message.author_id);
                }
            }
            Outcome::Silent => {}
            Outcome::Unknown => {
                self.respond_to_user(message, &self.unknown_command_message)
                    .await;
            }
        }
    }

    async fn dispatch(&self, name: &str, args: &[String], message: &IncomingMessage) -> Outcome {
        // Voice commands win over plugins with the same name
        if let Some(voice) = &self.voice {
            if VoiceCommands::is_voice_command(name) {
                let Some(guild_id) = message.guild_id else {
                    return Outcome::Reply {
                        reply: Reply::voice("you must be in a voice channel to use this command"),
                        private: false,
                    };
                };
                let ctx = CommandContext {
                    guild_id,
                    channel_id: message.channel_id,
                    author_id: message.author_id,
                };
                return match voice.dispatch(name, ctx, args).await {
                    Some(Some(reply)) => Outcome::Reply {
                        reply,
                        private: false,
                    },
                    Some(None) => Outcome::Silent,
                    None => Outcome::Unknown,
                };
            }
        }

        if name == "help" {
            return Outcome::Reply {
                reply: Reply::Embed(self.help()),
                private: false,
            };
        }

        match self.plugins.command(name) {
            Some(plugin) => Outcome::Reply {
                reply: (plugin.exec)(args),
                private: plugin.private,
            },
            None => Outcome::Unknown,
        }
    }

    fn help(&self) -> embeds::Embed {
        let mut commands: Vec<(&str, &str)> = Vec::new();
        if self.voice.is_some() {
            commands.extend(VOICE_COMMANDS.iter().copied());
        }
        commands.extend(
            self.plugins
                .command_help()
                .filter(|(name, _)| self.voice.is_none() || !VoiceCommands::is_voice_command(name)),
        );
        commands.push(("help", "list available commands"));

        embeds::help(commands, &self.prefix)
    }

    async fn deliver(&self, message: &IncomingMessage, reply: Reply, private: bool) {
        let result = match (reply, private) {
            (Reply::Voice(text), _) => self.sink.send(message.channel_id, Reply::Voice(text)).await,
            (reply, true) => self.sink.send_direct(message.author_id, reply).await,
            (Reply::Text(text), false) => {
                self.sink
                    .send(
                        message.channel_id,
                        Reply::Text(format!("{} {}", message.author_id.mention(), text)),
                    )
                    .await
            }
            (reply @ Reply::Embed(_), false) => self.sink.send(message.channel_id, reply).await,
        };

        if let Err(e) = result {
            error!("Failed to send message response - {:?}", e);
        }
    }

    async fn respond_to_user(&self, message: &IncomingMessage, text: &str) {
        let reply = Reply::Text(format!("{} {}", message.author_id.mention(), text));
        if let Err(e) = self.sink.send(message.channel_id, reply).await {
            error!("Failed to send message response - {:?}", e);
        }
    }

    async fn handle_reactions(&self, message: &IncomingMessage) {
        let reactions = self
            .plugins
            .reactions_for_user(message.author_id)
            .into_iter()
            .chain(self.plugins.reactions_for_message(&message.content));

        for emoji in reactions {
            if let Err(e) = self
                .sink
                .react(message.channel_id, message.message_id, emoji)
                .await
            {
                error!("Error adding reaction - {:?}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            registry::SessionRegistry,
            testing::{FakeConnector, FakeRoster, FakeSink},
        },
        plugins::{builtin, CommandPlugin, Plugin, UserReaction},
        sources::MockMediaResolver,
    };
    use pretty_assertions::assert_eq;

    const CHANNEL: u64 = 10;
    const AUTHOR: u64 = 77;

    fn config() -> Config {
        Config {
            discord_token: "token".to_string(),
            ..Config::default()
        }
    }

    fn whisper(_args: &[String]) -> Reply {
        Reply::text("psst")
    }

    fn plugins() -> PluginRegistry {
        let enabled: Vec<String> = ["ping", "hello", "embed", "okay"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut registry = PluginRegistry::from_table(builtin::table(), &enabled);
        registry.register(Plugin::Command(CommandPlugin {
            name: "whisper".to_string(),
            description: "private reply".to_string(),
            private: true,
            exec: whisper,
        }));
        registry.register(Plugin::Command(CommandPlugin {
            name: "play".to_string(),
            description: "shadowed by the voice command".to_string(),
            private: false,
            exec: whisper,
        }));
        registry.register(Plugin::UserReaction(UserReaction {
            name: "fan".to_string(),
            user_ids: vec![UserId::new(AUTHOR)],
            reactions: vec!["👍".to_string()],
        }));
        registry
    }

    fn router(sink: &Arc<FakeSink>, with_voice: bool) -> CommandRouter {
        let voice = with_voice.then(|| {
            Arc::new(VoiceCommands::new(
                Arc::new(SessionRegistry::new()),
                Arc::new(MockMediaResolver::new()),
                Arc::new(FakeConnector::default()),
                Arc::new(FakeRoster::default()),
                sink.clone(),
            ))
        });
        CommandRouter::new(&config(), voice, Arc::new(plugins()), sink.clone())
    }

    fn message(content: &str) -> IncomingMessage {
        IncomingMessage {
            guild_id: Some(GuildId::new(1)),
            channel_id: ChannelId::new(CHANNEL),
            message_id: MessageId::new(5),
            author_id: UserId::new(AUTHOR),
            author_is_bot: false,
            content: content.to_string(),
        }
    }

    fn mention(text: &str) -> Reply {
        Reply::Text(format!("<@{AUTHOR}> {text}"))
    }

    #[test]
    fn parse_command_splits_name_and_args() {
        assert_eq!(
            parse_command("!", "!Hello big  world"),
            Some((
                "hello".to_string(),
                vec!["big".to_string(), "world".to_string()]
            ))
        );
        assert_eq!(parse_command("!", "hello"), None);
        assert_eq!(parse_command("!", "!"), None);
    }

    #[test]
    fn cooldown_window() {
        let cooldowns = Cooldowns::new(Duration::from_secs(60));
        let user = UserId::new(1);

        assert!(cooldowns.can_post(user));
        cooldowns.start(user);
        assert!(!cooldowns.can_post(user));
        assert!(cooldowns.can_post(UserId::new(2)));
        assert!(Cooldowns::new(Duration::ZERO).can_post(user));
    }

    #[tokio::test]
    async fn text_reply_mentions_author_and_starts_cooldown() {
        let sink = Arc::new(FakeSink::default());
        let router = router(&sink, false);

        router.handle(&message("!ping")).await;
        router.handle(&message("!ping")).await;

        assert_eq!(
            sink.sent_to(ChannelId::new(CHANNEL)),
            vec![mention("Pong!"), mention("Too many commands at once!")]
        );
    }

    #[tokio::test]
    async fn unknown_command_does_not_start_cooldown() {
        let sink = Arc::new(FakeSink::default());
        let router = router(&sink, false);

        router.handle(&message("!nope")).await;
        router.handle(&message("!hello there")).await;

        assert_eq!(
            sink.sent_to(ChannelId::new(CHANNEL)),
            vec![mention("Invalid command!"), mention("Hello there")]
        );
    }

    #[tokio::test]
    async fn private_replies_go_to_direct_messages() {
        let sink = Arc::new(FakeSink::default());
        let router = router(&sink, false);

        router.handle(&message("!whisper")).await;

        assert!(sink.sent_to(ChannelId::new(CHANNEL)).is_empty());
        assert_eq!(sink.direct(), vec![(UserId::new(AUTHOR), Reply::text("psst"))]);
    }

    #[tokio::test]
    async fn voice_commands_override_plugins_and_skip_cooldown() {
        let sink = Arc::new(FakeSink::default());
        let router = router(&sink, true);

        router.handle(&message("!play")).await;
        router.handle(&message("!play")).await;

        assert_eq!(
            sink.sent_to(ChannelId::new(CHANNEL)),
            vec![
                Reply::voice("play requires a link argument"),
                Reply::voice("play requires a link argument"),
            ]
        );
    }

    #[tokio::test]
    async fn voice_commands_are_plugins_when_audio_is_disabled() {
        let sink = Arc::new(FakeSink::default());
        let router = router(&sink, false);

        router.handle(&message("!play")).await;

        assert_eq!(sink.sent_to(ChannelId::new(CHANNEL)), vec![mention("psst")]);
    }

    #[tokio::test]
    async fn help_lists_commands() {
        let sink = Arc::new(FakeSink::default());
        let router = router(&sink, true);

        router.handle(&message("!help")).await;

        let replies = sink.sent_to(ChannelId::new(CHANNEL));
        let Some(Reply::Embed(embed)) = replies.first() else {
            panic!("expected help embed");
        };
        let names: Vec<&str> = embed.fields.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"!play"));
        assert!(names.contains(&"!ping"));
        assert!(names.contains(&"!help"));
        assert_eq!(names.iter().filter(|n| **n == "!play").count(), 1);
    }

    #[tokio::test]
    async fn bots_are_ignored() {
        let sink = Arc::new(FakeSink::default());
        let router = router(&sink, false);
        let mut msg = message("!ping ok");
        msg.author_is_bot = true;

        router.handle(&msg).await;

        assert!(sink.replies().is_empty());
        assert!(sink.reactions().is_empty());
    }

    #[tokio::test]
    async fn reactions_apply_without_prefix() {
        let sink = Arc::new(FakeSink::default());
        let router = router(&sink, false);

        router.handle(&message("sounds OK to me")).await;

        assert!(sink.replies().is_empty());
        assert_eq!(
            sink.reactions(),
            vec![
                (MessageId::new(5), "👍".to_string()),
                (MessageId::new(5), "👌".to_string()),
            ]
        );
    }
}
