use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod error;
mod plugins;
mod sources;
mod ui;

use crate::audio::{
    registry::SessionRegistry, songbird_transport::SongbirdConnector,
    watchdog::DisconnectWatchdog,
};
use crate::bot::{
    platform::SerenityPlatform, router::CommandRouter, voice::VoiceCommands, BotServices,
    GuildJukebox,
};
use crate::config::Config;
use crate::plugins::PluginRegistry;
use crate::sources::YtDlpResolver;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Guild Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let plugins = Arc::new(PluginRegistry::from_config(&config));
    let shutdown = CancellationToken::new();
    let handler = GuildJukebox::new(config.clone(), plugins.clone(), shutdown.clone());

    // Construir cliente
    let songbird = Songbird::serenity();
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird.clone())
        .await?;

    let platform = Arc::new(SerenityPlatform::new(
        client.cache.clone(),
        client.http.clone(),
    ));
    let registry = Arc::new(SessionRegistry::new());

    let voice = if config.audio_enabled {
        let resolver = YtDlpResolver::new(config.resolve_timeout());
        if let Err(e) = resolver.verify_dependencies().await {
            warn!("Error verificando dependencias: {:?}", e);
        }

        let connector = SongbirdConnector::new(songbird.clone())?;
        let watchdog = DisconnectWatchdog::new(
            registry.clone(),
            platform.clone(),
            config.watchdog_interval(),
        );
        tokio::spawn(watchdog.run(shutdown.clone()));

        Some(Arc::new(VoiceCommands::new(
            registry.clone(),
            Arc::new(resolver),
            Arc::new(connector),
            platform.clone(),
            platform.clone(),
        )))
    } else {
        info!("🔇 Audio deshabilitado");
        None
    };

    let router = Arc::new(CommandRouter::new(
        &config,
        voice,
        plugins,
        platform.clone(),
    ));
    {
        let mut data = client.data.write().await;
        data.insert::<BotServices>(Arc::new(BotServices {
            router,
            registry: registry.clone(),
            roster: platform.clone(),
            sink: platform,
        }));
    }

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shutdown.cancel();
        registry.shutdown_all().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    YtDlpResolver::new(Duration::from_secs(30))
        .verify_dependencies()
        .await?;
    println!("OK");
    Ok(())
}
