use anyhow::{Context as _, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use songbird::{
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tracing::{debug, info, warn};

use super::session::{
    AudioResource, NoSubscriberBehavior, OutputSession, PlayerStatus, SessionEvent,
    SessionEventSender, VoiceGateway, VoiceTarget,
};

/// Voice gateway backed by the songbird manager registered on the client.
pub struct SongbirdGateway {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdGateway {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn connect(
        &self,
        target: VoiceTarget,
        behavior: NoSubscriberBehavior,
        events: SessionEventSender,
    ) -> Result<Box<dyn OutputSession>> {
        let call = self
            .manager
            .join(target.guild_id, target.channel_id)
            .await
            .with_context(|| format!("Error al conectar al canal de voz {}", target.channel_id))?;

        // songbird siempre emite aunque nadie escuche
        debug!("🔊 Sesión creada en guild {} ({:?})", target.guild_id, behavior);

        call.lock().await.add_global_event(
            Event::Core(CoreEvent::DriverDisconnect),
            DisconnectLogger {
                guild_id: target.guild_id,
            },
        );

        Ok(Box::new(SongbirdSession {
            guild_id: target.guild_id,
            manager: self.manager.clone(),
            call,
            http: self.http.clone(),
            track: None,
            shared: Arc::new(SharedStatus {
                status: Mutex::new(PlayerStatus::Idle),
                current: AtomicU64::new(0),
                events,
            }),
        }))
    }
}

/// Status shared between the session and the track event handlers.
struct SharedStatus {
    status: Mutex<PlayerStatus>,
    /// Sequence number of the track whose events still count.
    current: AtomicU64,
    events: SessionEventSender,
}

impl SharedStatus {
    /// Records the new status and reports the transition, if any.
    fn transition(&self, new: PlayerStatus) {
        let old = std::mem::replace(&mut *self.status.lock(), new);
        if old != new {
            let _ = self.events.send(SessionEvent::StateChange { old, new });
        }
    }
}

pub struct SongbirdSession {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    call: Arc<tokio::sync::Mutex<Call>>,
    http: reqwest::Client,
    track: Option<TrackHandle>,
    shared: Arc<SharedStatus>,
}

#[async_trait]
impl OutputSession for SongbirdSession {
    fn status(&self) -> PlayerStatus {
        *self.shared.status.lock()
    }

    async fn play(&mut self, resource: AudioResource) -> Result<()> {
        let sequence = self.shared.current.fetch_add(1, Ordering::SeqCst) + 1;
        let input: Input = HttpRequest::new(self.http.clone(), resource.stream_url.clone()).into();

        let handle = self.call.lock().await.play_input(input);
        self.shared.transition(PlayerStatus::Buffering);

        for event in [
            TrackEvent::Playable,
            TrackEvent::Play,
            TrackEvent::Pause,
            TrackEvent::End,
            TrackEvent::Error,
        ] {
            handle
                .add_event(
                    Event::Track(event),
                    TrackStatusHandler {
                        shared: self.shared.clone(),
                        sequence,
                    },
                )
                .map_err(|e| anyhow::anyhow!("Error al agregar event handler: {}", e))?;
        }

        debug!("▶️ Stream iniciado: {} ({:?})", resource.title, resource.container);
        self.track = Some(handle);
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        if let Some(track) = &self.track {
            track.pause()?;
            self.shared.transition(PlayerStatus::Paused);
            info!("⏸️ Reproducción pausada");
        }
        Ok(())
    }

    async fn unpause(&mut self) -> Result<()> {
        if let Some(track) = &self.track {
            track.play()?;
            self.shared.transition(PlayerStatus::Playing);
            info!("▶️ Reproducción reanudada");
        }
        Ok(())
    }

    async fn stop(&mut self, force: bool) -> Result<()> {
        if let Some(track) = self.track.take() {
            if let Err(e) = track.stop() {
                debug!("Track ya terminado: {:?}", e);
            }
        }

        if force {
            // Los eventos de tracks anteriores dejan de contar
            self.shared.current.fetch_add(1, Ordering::SeqCst);
            self.call.lock().await.stop();
            self.shared.transition(PlayerStatus::Idle);
        }
        Ok(())
    }

    async fn destroy(&mut self) -> Result<()> {
        self.shared.current.fetch_add(1, Ordering::SeqCst);
        self.track = None;
        self.manager
            .remove(self.guild_id)
            .await
            .context("Error al salir del canal de voz")?;

        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        Ok(())
    }
}

struct TrackStatusHandler {
    shared: Arc<SharedStatus>,
    sequence: u64,
}

#[async_trait]
impl VoiceEventHandler for TrackStatusHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if self.shared.current.load(Ordering::SeqCst) != self.sequence {
            return None;
        }

        let EventContext::Track(tracks) = ctx else {
            return None;
        };

        for (state, _) in tracks.iter() {
            match &state.playing {
                PlayMode::Play => self.shared.transition(PlayerStatus::Playing),
                PlayMode::Pause => self.shared.transition(PlayerStatus::Paused),
                PlayMode::End | PlayMode::Stop => self.shared.transition(PlayerStatus::Idle),
                PlayMode::Errored(e) => {
                    let _ = self.shared.events.send(SessionEvent::Error(e.to_string()));
                    self.shared.transition(PlayerStatus::Idle);
                }
                _ => {}
            }
        }

        None
    }
}

struct DisconnectLogger {
    guild_id: GuildId,
}

#[async_trait]
impl VoiceEventHandler for DisconnectLogger {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::DriverDisconnect(data) = ctx {
            warn!("🔌 Driver de voz desconectado en guild {}: {:?}", self.guild_id, data.reason);
        }
        None
    }
}
