//! # Bot Module
//!
//! Gateway glue for Guild Jukebox.
//!
//! - [`GuildJukebox`] implements Serenity's [`EventHandler`]
//! - [`router`] turns messages into command replies and reactions
//! - [`voice`] holds the voice command handlers
//! - [`platform`] adapts the serenity cache/HTTP client to the audio seams
//!
//! Services that need the live HTTP client are built after the client and
//! stored in its type map under [`BotServices`].

use serenity::{
    all::{Context, EventHandler, Message, Ready, VoiceState},
    async_trait,
    prelude::TypeMapKey,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub mod platform;
pub mod router;
pub mod voice;

use crate::{
    audio::{
        registry::{SessionRegistry, VoiceStateChange},
        transport::{MessageSink, VoiceRoster},
    },
    config::Config,
    plugins::{timed, PluginRegistry},
    ui::Reply,
};
use router::{CommandRouter, IncomingMessage};

/// Shared services, reachable from every event through the client data.
pub struct BotServices {
    pub router: Arc<CommandRouter>,
    pub registry: Arc<SessionRegistry>,
    pub roster: Arc<dyn VoiceRoster>,
    pub sink: Arc<dyn MessageSink>,
}

impl TypeMapKey for BotServices {
    type Value = Arc<BotServices>;
}

async fn services(ctx: &Context) -> Option<Arc<BotServices>> {
    let data = ctx.data.read().await;
    data.get::<BotServices>().cloned()
}

pub struct GuildJukebox {
    config: Arc<Config>,
    plugins: Arc<PluginRegistry>,
    /// Ready fires again on every reconnect; timers start only once.
    timers_started: AtomicBool,
    shutdown: CancellationToken,
}

impl GuildJukebox {
    pub fn new(config: Arc<Config>, plugins: Arc<PluginRegistry>, shutdown: CancellationToken) -> Self {
        Self {
            config,
            plugins,
            timers_started: AtomicBool::new(false),
            shutdown,
        }
    }
}

#[async_trait]
impl EventHandler for GuildJukebox {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        let Some(services) = services(&ctx).await else {
            warn!("Servicios no inicializados en ready");
            return;
        };
        let Some(channel_id) = self.config.default_channel_id else {
            return;
        };

        if !self.config.welcome_back_message.is_empty() {
            let welcome = Reply::text(self.config.welcome_back_message.clone());
            if let Err(e) = services.sink.send(channel_id, welcome).await {
                error!("Failed to send message response - {:?}", e);
            }
        }

        if !self.timers_started.swap(true, Ordering::SeqCst) {
            let handles = timed::start(
                self.plugins.timed_messages(),
                channel_id,
                services.sink.clone(),
                self.shutdown.clone(),
            );
            info!("⏰ {} mensajes programados iniciados", handles.len());
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let Some(services) = services(&ctx).await else {
            return;
        };

        let incoming = IncomingMessage {
            guild_id: msg.guild_id,
            channel_id: msg.channel_id,
            message_id: msg.id,
            author_id: msg.author.id,
            author_is_bot: msg.author.bot,
            content: msg.content,
        };

        tokio::spawn(async move {
            services.router.handle(&incoming).await;
        });
    }

    async fn voice_state_update(&self, ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id {
            return;
        }
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let Some(services) = services(&ctx).await else {
            return;
        };

        // The cache may already hold a newer state than this event (a late
        // disconnect after the bot rejoined), so reconcile against it.
        let current = services.roster.voice_channel_of(guild_id, current_user_id);
        match services.registry.sync_bot_voice(guild_id, current).await {
            VoiceStateChange::Moved(channel_id) => {
                info!("🔀 Bot movido a {} en guild {}", channel_id, guild_id);
            }
            VoiceStateChange::Disconnected | VoiceStateChange::Unchanged => {}
        }
    }
}
