use anyhow::{Context as _, Result};
use serenity::{
    model::{gateway::GatewayIntents, id::ApplicationId},
    Client,
};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod cache;
mod config;
mod error;
mod sources;
mod ui;

use crate::audio::{ControllerSettings, PlayerManager, SongbirdGateway};
use crate::bot::EchidnaBot;
use crate::config::Config;
use crate::sources::{CachingResolver, YouTubeClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("echidna_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Echidna v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("⚙️ {}", config.summary());

    let youtube = YouTubeClient::new(config.ytdlp_path.clone(), config.resolver_concurrency);

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&youtube).await;
    }

    // Resolver compartido con caché de tracks
    let resolver = Arc::new(CachingResolver::new(
        Arc::new(youtube),
        config.track_cache_size,
        config.track_cache_ttl,
    ));

    let songbird = Songbird::serenity();
    let gateway = Arc::new(SongbirdGateway::new(songbird.clone()));
    let players = Arc::new(PlayerManager::new(
        resolver.clone(),
        gateway,
        ControllerSettings::from(&config),
    ));

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = EchidnaBot::new(config.clone(), players, resolver, songbird.clone());

    let mut client = Client::builder(&config.discord_token, intents)
        .application_id(ApplicationId::new(config.application_id))
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await
        .context("Error al crear el cliente de Discord")?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(youtube: &YouTubeClient) -> Result<()> {
    let version = youtube.version().await.context("yt-dlp no disponible")?;
    println!("OK (yt-dlp {})", version.trim());
    Ok(())
}
