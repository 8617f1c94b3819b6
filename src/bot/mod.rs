//! # Bot Module
//!
//! Discord side of the bot: slash command registration, interaction routing
//! to the per-guild controllers, and voice state tracking.
//!
//! [`EchidnaBot`] implements Serenity's [`EventHandler`]. It owns no playback
//! state itself; every command is turned into a
//! [`ControllerMsg`](crate::audio::ControllerMsg) and handed to the
//! [`PlayerManager`].

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use songbird::Songbird;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;
pub mod responder;

use crate::{
    audio::{ControllerMsg, PlayerManager},
    config::Config,
    sources::CachingResolver,
};

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(600);

/// Main Discord event handler.
pub struct EchidnaBot {
    config: Arc<Config>,
    /// Guild controllers
    pub players: Arc<PlayerManager>,
    /// Resolver shared by every controller, kept for cache maintenance
    resolver: Arc<CachingResolver>,
    songbird: Arc<Songbird>,
}

impl EchidnaBot {
    pub fn new(
        config: Config,
        players: Arc<PlayerManager>,
        resolver: Arc<CachingResolver>,
        songbird: Arc<Songbird>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            players,
            resolver,
            songbird,
        }
    }

    /// Registers slash commands, per guild when `GUILD_ID` is set (instant
    /// propagation) or globally otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for EchidnaBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        let players = self.players.clone();
        let resolver = self.resolver.clone();
        tokio::spawn(async move {
            maintenance_tasks(players, resolver).await;
        });
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) =
                    handlers::handle_component(&ctx, component_interaction, self).await
                {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Tells the guild controller when the bot was removed from voice by
    /// someone else.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        // Una desconexión propia ya quitó el Call del manager
        if self.songbird.get(guild_id).is_some() {
            warn!("🔌 Bot desconectado externamente en guild {}", guild_id);
            self.players.notify(guild_id, ControllerMsg::Disconnected);
        }
    }
}

/// Limpieza periódica de caché y controladores inactivos
async fn maintenance_tasks(players: Arc<PlayerManager>, resolver: Arc<CachingResolver>) {
    let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);

    loop {
        interval.tick().await;

        let expired = resolver.cleanup_expired();
        let pruned = players.prune();
        let metrics = resolver.metrics();

        info!(
            "🧹 Mantenimiento: {} tracks expirados, {} controladores liberados, {} guilds activas, hit rate {:.1}%",
            expired,
            pruned,
            players.active_guilds(),
            metrics.hit_rate() * 100.0
        );

        for (guild_id, snapshot) in players.snapshots().await {
            debug!(
                "📊 Guild {}: {:?}, {} en cola, actual {:?}, conectado {}, generación {}",
                guild_id,
                snapshot.state,
                snapshot.queue.len(),
                snapshot.current,
                snapshot.connected,
                snapshot.generation
            );
        }
    }
}
