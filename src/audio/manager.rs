use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    controller::{ControllerHandle, ControllerMsg, ControllerSettings, GuildController, Snapshot},
    session::VoiceGateway,
};
use crate::{error::PlayerError, sources::TrackResolver};

/// Registry of guild controllers.
///
/// Controllers are created on the first message for a guild. A controller
/// that went idle closes its inbox and exits; the next message for that
/// guild transparently starts a fresh one.
pub struct PlayerManager {
    controllers: DashMap<GuildId, ControllerHandle>,
    resolver: Arc<dyn TrackResolver>,
    gateway: Arc<dyn VoiceGateway>,
    settings: ControllerSettings,
}

impl PlayerManager {
    pub fn new(
        resolver: Arc<dyn TrackResolver>,
        gateway: Arc<dyn VoiceGateway>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            controllers: DashMap::new(),
            resolver,
            gateway,
            settings,
        }
    }

    /// Delivers `msg` to the controller of `guild_id`, starting one if needed.
    pub fn dispatch(&self, guild_id: GuildId, msg: ControllerMsg) -> Result<(), PlayerError> {
        let handle = self.handle(guild_id);

        // El controlador pudo cerrarse por inactividad entre el lookup y el envío
        let msg = match handle.send(msg) {
            Ok(()) => return Ok(()),
            Err(returned) => returned.0,
        };

        debug!("♻️ Controlador cerrado en guild {}, reiniciando", guild_id);
        self.controllers.remove(&guild_id);
        self.handle(guild_id)
            .send(msg)
            .map_err(|_| PlayerError::ControllerClosed)
    }

    /// Only reaches controllers that already exist; never starts one.
    pub fn notify(&self, guild_id: GuildId, msg: ControllerMsg) {
        if let Some(handle) = self.controllers.get(&guild_id) {
            let _ = handle.send(msg);
        }
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> Option<Snapshot> {
        let handle = self.controllers.get(&guild_id).map(|entry| entry.clone())?;
        handle.snapshot().await.ok()
    }

    /// Snapshots of every live controller, for status logging.
    pub async fn snapshots(&self) -> Vec<(GuildId, Snapshot)> {
        // No retener referencias del DashMap a través de un await
        let guilds: Vec<GuildId> = self.controllers.iter().map(|entry| *entry.key()).collect();

        let mut snapshots = Vec::with_capacity(guilds.len());
        for guild_id in guilds {
            if let Some(snapshot) = self.snapshot(guild_id).await {
                snapshots.push((guild_id, snapshot));
            }
        }
        snapshots
    }

    /// Drops handles of controllers that already exited.
    pub fn prune(&self) -> usize {
        let before = self.controllers.len();
        self.controllers.retain(|_, handle| !handle.is_closed());
        let removed = before - self.controllers.len();
        if removed > 0 {
            info!("🧹 {} controladores inactivos liberados", removed);
        }
        removed
    }

    pub fn active_guilds(&self) -> usize {
        self.controllers.len()
    }

    fn handle(&self, guild_id: GuildId) -> ControllerHandle {
        let mut entry = self.controllers.entry(guild_id).or_insert_with(|| {
            GuildController::spawn(
                guild_id,
                self.resolver.clone(),
                self.gateway.clone(),
                self.settings.clone(),
            )
        });

        if entry.is_closed() {
            *entry = GuildController::spawn(
                guild_id,
                self.resolver.clone(),
                self.gateway.clone(),
                self.settings.clone(),
            );
        }

        entry.clone()
    }
}
