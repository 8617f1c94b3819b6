//! Per-guild playback controller.
//!
//! Each guild gets one [`GuildController`] running as its own task. Commands,
//! finished resolutions and output-session events all reach it as messages,
//! so handler bodies never interleave. Network resolutions run in a
//! [`JoinSet`] owned by the controller and are tagged with the generation
//! they were started in; `stop` bumps the generation and late results from
//! before it are dropped.

use anyhow::Result;
use serenity::model::id::GuildId;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinSet,
};
use tracing::{debug, error, info, warn};

use super::{
    context::{CommandContext, NowPlaying, Picker, Responder, Selection},
    queue::MusicQueue,
    session::{
        AudioResource, NoSubscriberBehavior, OutputSession, PlayerStatus, SessionEvent,
        SessionEventReceiver, VoiceGateway, VoiceTarget,
    },
};
use crate::{
    config::Config,
    error::{PlayerError, GENERIC_FAILURE},
    sources::{CandidateKind, QueryKind, SearchCandidate, Track, TrackRef, TrackResolver},
};

pub const NO_QUERY: &str = "No query provided";
pub const NO_RESULTS: &str = "No results found";
pub const SELECT_PROMPT: &str = "Select a song!";
pub const NOTHING_SELECTED: &str = "Nothing selected";
pub const NO_MUSIC: &str = "No music is playing.";
pub const ALREADY_PAUSED: &str = "Music is already paused.";
pub const PAUSED: &str = "Music paused.";
pub const ALREADY_PLAYING: &str = "Music is already playing.";
pub const RESUMED: &str = "Music resumed.";
pub const NO_MORE_SONGS: &str = "No more songs in the queue.";
pub const SKIPPED: &str = "Song skipped.";
pub const STOPPED: &str = "Stopping the music and disconnecting from the voice channel.";
pub const QUEUE_EMPTY: &str = "Music queue is empty, So I will disconnect from the voice channel.";
pub const HEAD_SKIPPED: &str = "Could not load the next song in the queue, skipping it.";

/// Limits applied by every guild controller.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub max_queue_size: usize,
    pub max_playlist_size: usize,
    pub search_limit: usize,
    pub idle_timeout: Duration,
}

impl From<&Config> for ControllerSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_queue_size: config.max_queue_size,
            max_playlist_size: config.max_playlist_size,
            search_limit: config.search_limit,
            idle_timeout: config.idle_timeout,
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Messages understood by a guild controller.
pub enum ControllerMsg {
    Play { ctx: CommandContext, query: String },
    Select(Selection),
    Pause(CommandContext),
    Resume(CommandContext),
    Skip(CommandContext),
    Stop(CommandContext),
    /// The bot was removed from the voice channel by someone else.
    Disconnected,
    Snapshot(oneshot::Sender<Snapshot>),
}

/// Controller view of playback, derived from the session status and the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Empty,
    Connecting,
    Buffering,
    Playing,
    Paused,
}

/// Point-in-time view of a controller.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub state: PlaybackState,
    pub queue: Vec<String>,
    pub current: Option<String>,
    pub connected: bool,
    pub generation: u64,
}

/// Cheap cloneable handle to a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<ControllerMsg>,
}

impl ControllerHandle {
    pub fn send(&self, msg: ControllerMsg) -> Result<(), mpsc::error::SendError<ControllerMsg>> {
        self.tx.send(msg)
    }

    /// True once the controller stopped accepting messages (idle eviction).
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub async fn snapshot(&self) -> Result<Snapshot, PlayerError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(ControllerMsg::Snapshot(tx))
            .map_err(|_| PlayerError::ControllerClosed)?;
        rx.await.map_err(|_| PlayerError::ControllerClosed)
    }
}

/// Who asked for a single-track resolution, and how to answer them.
enum TrackRequest {
    Command(CommandContext),
    Selection(Selection),
}

impl TrackRequest {
    fn responder(&self) -> &dyn Responder {
        match self {
            TrackRequest::Command(ctx) => ctx.responder.as_ref(),
            TrackRequest::Selection(selection) => selection.responder.as_ref(),
        }
    }

    /// Slash commands edit their deferred reply; picker selections rewrite
    /// the picker message.
    async fn answer(&self, text: &str) {
        let result = match self {
            TrackRequest::Command(ctx) => ctx.responder.reply(text).await,
            TrackRequest::Selection(selection) => selection.responder.update(text).await,
        };
        if let Err(e) = result {
            warn!("⚠️ No se pudo responder a la interacción: {:?}", e);
        }
    }
}

/// Results of background resolutions.
enum Work {
    Track {
        generation: u64,
        request: TrackRequest,
        token: String,
        result: Result<Track>,
    },
    Playlist {
        generation: u64,
        ctx: CommandContext,
        token: String,
        result: Result<Vec<String>>,
    },
    Search {
        ctx: CommandContext,
        query: String,
        result: Result<Vec<SearchCandidate>>,
    },
    Head {
        generation: u64,
        token: String,
        result: Result<Track>,
    },
}

pub struct GuildController {
    guild_id: GuildId,
    resolver: Arc<dyn TrackResolver>,
    gateway: Arc<dyn VoiceGateway>,
    settings: ControllerSettings,
    inbox: mpsc::UnboundedReceiver<ControllerMsg>,

    queue: MusicQueue,
    session: Option<Box<dyn OutputSession>>,
    events: Option<SessionEventReceiver>,
    current: Option<Track>,
    active: Option<CommandContext>,
    picker: Option<Picker>,
    /// Set while a track handed to the session has not ended yet. The
    /// session status flips to Idle before its event is handled.
    playing: bool,
    /// The current track is ending because of `/skip`.
    skipping: bool,
    loading_head: bool,
    /// Resolutions that will add to or replace entries of the queue.
    queue_work: usize,
    generation: u64,
    work: JoinSet<Work>,
}

impl GuildController {
    /// Starts a controller task for `guild_id` and returns its handle.
    pub fn spawn(
        guild_id: GuildId,
        resolver: Arc<dyn TrackResolver>,
        gateway: Arc<dyn VoiceGateway>,
        settings: ControllerSettings,
    ) -> ControllerHandle {
        let (tx, inbox) = mpsc::unbounded_channel();
        let controller = Self {
            guild_id,
            resolver,
            gateway,
            queue: MusicQueue::new(settings.max_queue_size),
            settings,
            inbox,
            session: None,
            events: None,
            current: None,
            active: None,
            picker: None,
            playing: false,
            skipping: false,
            loading_head: false,
            queue_work: 0,
            generation: 0,
            work: JoinSet::new(),
        };

        tokio::spawn(controller.run());
        ControllerHandle { tx }
    }

    async fn run(mut self) {
        debug!("🎛️ Controlador iniciado para guild {}", self.guild_id);
        let mut inbox_open = true;

        loop {
            let idle = inbox_open && self.is_idle();

            tokio::select! {
                msg = self.inbox.recv(), if inbox_open => match msg {
                    Some(msg) => self.handle_message(msg).await,
                    None => inbox_open = false,
                },
                Some(done) = self.work.join_next(), if !self.work.is_empty() => {
                    match done {
                        Ok(work) => self.handle_work(work).await,
                        Err(e) => error!("❌ Tarea de resolución abortada: {:?}", e),
                    }
                    self.release_if_drained().await;
                }
                event = next_event(&mut self.events) => match event {
                    Some(event) => self.handle_session_event(event).await,
                    None => {
                        warn!("🔌 La sesión de audio cerró su canal de eventos en guild {}", self.guild_id);
                        self.events = None;
                    }
                },
                _ = tokio::time::sleep(self.settings.idle_timeout), if idle => {
                    info!("💤 Controlador inactivo en guild {}, liberando", self.guild_id);
                    self.inbox.close();
                }
                else => break,
            }

            if !inbox_open && self.is_idle() {
                break;
            }
        }

        debug!("🎛️ Controlador detenido para guild {}", self.guild_id);
    }

    fn is_idle(&self) -> bool {
        self.session.is_none() && self.queue.is_empty() && self.work.is_empty()
    }

    async fn handle_message(&mut self, msg: ControllerMsg) {
        match msg {
            ControllerMsg::Play { ctx, query } => self.play(ctx, query).await,
            ControllerMsg::Select(selection) => self.select_music(selection).await,
            ControllerMsg::Pause(ctx) => self.pause(ctx).await,
            ControllerMsg::Resume(ctx) => self.resume(ctx).await,
            ControllerMsg::Skip(ctx) => self.skip(ctx).await,
            ControllerMsg::Stop(ctx) => self.stop(ctx).await,
            ControllerMsg::Disconnected => self.on_disconnected().await,
            ControllerMsg::Snapshot(tx) => {
                let _ = tx.send(self.snapshot());
            }
        }
    }

    // Comandos

    async fn play(&mut self, ctx: CommandContext, query: String) {
        self.active = Some(ctx.clone());
        self.picker = None;

        let query = query.trim();
        if query.is_empty() {
            reply(ctx.responder.as_ref(), NO_QUERY).await;
            return;
        }

        match QueryKind::classify(query) {
            QueryKind::Track(id) => self.spawn_track(TrackRequest::Command(ctx), id),
            QueryKind::Playlist(id) => self.spawn_playlist(ctx, id),
            QueryKind::Search(text) => self.spawn_search(ctx, text),
        }
    }

    async fn select_music(&mut self, selection: Selection) {
        let from_active_picker = match (&self.active, selection.origin) {
            (Some(active), Some(origin)) => active.interaction_id == origin && self.picker.is_some(),
            _ => false,
        };

        if !from_active_picker {
            debug!("🚫 Selección rechazada: no pertenece al picker activo");
            update(selection.responder.as_ref(), &PlayerError::StaleSelection.user_message()).await;
            return;
        }

        let chosen = selection
            .values
            .first()
            .filter(|value| self.picker.as_ref().is_some_and(|picker| picker.contains(value)))
            .cloned();

        let Some(id) = chosen else {
            update(selection.responder.as_ref(), NOTHING_SELECTED).await;
            return;
        };

        self.picker = None;
        self.spawn_track(TrackRequest::Selection(selection), id);
    }

    async fn pause(&mut self, ctx: CommandContext) {
        let Some(session) = self.session.as_mut() else {
            self.report(ctx.responder.as_ref(), PlayerError::EmptyState(NO_MUSIC)).await;
            return;
        };

        if session.status().is_paused() {
            self.report(ctx.responder.as_ref(), PlayerError::EmptyState(ALREADY_PAUSED)).await;
            return;
        }

        match session.pause().await {
            Ok(()) => reply(ctx.responder.as_ref(), PAUSED).await,
            Err(e) => self.report(ctx.responder.as_ref(), PlayerError::Session(e)).await,
        }
    }

    async fn resume(&mut self, ctx: CommandContext) {
        let Some(session) = self.session.as_mut() else {
            self.report(ctx.responder.as_ref(), PlayerError::EmptyState(NO_MUSIC)).await;
            return;
        };

        if session.status() == PlayerStatus::Playing {
            self.report(ctx.responder.as_ref(), PlayerError::EmptyState(ALREADY_PLAYING)).await;
            return;
        }

        match session.unpause().await {
            Ok(()) => reply(ctx.responder.as_ref(), RESUMED).await,
            Err(e) => self.report(ctx.responder.as_ref(), PlayerError::Session(e)).await,
        }
    }

    async fn skip(&mut self, ctx: CommandContext) {
        let Some(session) = self.session.as_mut() else {
            self.report(ctx.responder.as_ref(), PlayerError::EmptyState(NO_MUSIC)).await;
            return;
        };

        if self.queue.len() <= 1 {
            self.report(ctx.responder.as_ref(), PlayerError::EmptyState(NO_MORE_SONGS)).await;
            return;
        }

        // El fin del track avanza la cola
        match session.stop(false).await {
            Ok(()) => {
                self.skipping = true;
                reply(ctx.responder.as_ref(), SKIPPED).await
            }
            Err(e) => self.report(ctx.responder.as_ref(), PlayerError::Session(e)).await,
        }
    }

    async fn stop(&mut self, ctx: CommandContext) {
        let had_session = self.session.is_some();
        self.reset().await;

        let text = if had_session { STOPPED } else { NO_MUSIC };
        reply(ctx.responder.as_ref(), text).await;
    }

    async fn on_disconnected(&mut self) {
        if self.session.is_some() {
            info!("🔌 Desconectado externamente en guild {}, limpiando estado", self.guild_id);
            self.reset().await;
        }
    }

    /// Detaches listeners, clears the queue, force-stops and tears down.
    /// Every resolution still in flight becomes stale.
    async fn reset(&mut self) {
        self.events = None;
        self.generation += 1;
        self.loading_head = false;
        self.queue.clear();

        if let Some(session) = self.session.as_mut() {
            if let Err(e) = session.stop(true).await {
                warn!("⚠️ Error al detener la sesión: {:?}", e);
            }
        }

        self.teardown().await;
    }

    // Resoluciones en segundo plano

    fn spawn_track(&mut self, request: TrackRequest, token: String) {
        let resolver = self.resolver.clone();
        let generation = self.generation;
        self.queue_work += 1;

        self.work.spawn(async move {
            let result = resolver.resolve(&token).await;
            Work::Track {
                generation,
                request,
                token,
                result,
            }
        });
    }

    fn spawn_playlist(&mut self, ctx: CommandContext, token: String) {
        let resolver = self.resolver.clone();
        let generation = self.generation;
        let limit = self.settings.max_playlist_size;
        self.queue_work += 1;

        self.work.spawn(async move {
            let result = resolver.resolve_playlist(&token, limit).await;
            Work::Playlist {
                generation,
                ctx,
                token,
                result,
            }
        });
    }

    fn spawn_search(&mut self, ctx: CommandContext, query: String) {
        let resolver = self.resolver.clone();
        let limit = self.settings.search_limit;

        self.work.spawn(async move {
            let result = resolver.search(&query, limit).await;
            Work::Search { ctx, query, result }
        });
    }

    fn spawn_head(&mut self, token: String) {
        let resolver = self.resolver.clone();
        let generation = self.generation;
        self.loading_head = true;
        self.queue_work += 1;

        self.work.spawn(async move {
            let result = resolver.resolve(&token).await;
            Work::Head {
                generation,
                token,
                result,
            }
        });
    }

    async fn handle_work(&mut self, work: Work) {
        if !matches!(work, Work::Search { .. }) {
            self.queue_work = self.queue_work.saturating_sub(1);
        }

        match work {
            Work::Track {
                generation,
                request,
                token,
                result,
            } => self.on_track_resolved(generation, request, token, result).await,
            Work::Playlist {
                generation,
                ctx,
                token,
                result,
            } => self.on_playlist_resolved(generation, ctx, token, result).await,
            Work::Search { ctx, query, result } => self.on_search_done(ctx, query, result).await,
            Work::Head {
                generation,
                token,
                result,
            } => self.on_head_resolved(generation, token, result).await,
        }
    }

    async fn on_track_resolved(
        &mut self,
        generation: u64,
        request: TrackRequest,
        token: String,
        result: Result<Track>,
    ) {
        let track = match result {
            Ok(track) => track,
            Err(source) => {
                self.report(request.responder(), PlayerError::resolution(token, source))
                    .await;
                return;
            }
        };

        if generation != self.generation {
            info!("⏭️ Resolución descartada tras /stop: {}", track.title);
            request
                .answer(&format!(
                    "Playback was stopped before {} could be added to the queue.",
                    track.title
                ))
                .await;
            return;
        }

        let title = track.title.clone();
        if let Err(e) = self.queue.add_track(track.into()) {
            self.report(request.responder(), e).await;
            return;
        }

        request.answer(&format!("{} added to the queue.", title)).await;
        self.advance().await;
    }

    async fn on_playlist_resolved(
        &mut self,
        generation: u64,
        ctx: CommandContext,
        token: String,
        result: Result<Vec<String>>,
    ) {
        let ids = match result {
            Ok(ids) => ids,
            Err(source) => {
                self.report(ctx.responder.as_ref(), PlayerError::resolution(token, source))
                    .await;
                return;
            }
        };

        if generation != self.generation {
            info!("⏭️ Playlist descartada tras /stop: {}", token);
            reply(
                ctx.responder.as_ref(),
                "Playback was stopped before the playlist could be added to the queue.",
            )
            .await;
            return;
        }

        let added = self.queue.add_playlist(ids.into_iter().map(TrackRef::Pending));
        if added == 0 {
            let full = PlayerError::QueueFull {
                max: self.settings.max_queue_size,
            };
            self.report(ctx.responder.as_ref(), full).await;
            return;
        }

        reply(
            ctx.responder.as_ref(),
            &format!("{} songs have been added to the Queue.", added),
        )
        .await;
        self.advance().await;
    }

    async fn on_search_done(
        &mut self,
        ctx: CommandContext,
        query: String,
        result: Result<Vec<SearchCandidate>>,
    ) {
        let candidates = match result {
            Ok(candidates) => candidates,
            Err(source) => {
                self.report(ctx.responder.as_ref(), PlayerError::resolution(query, source))
                    .await;
                return;
            }
        };

        let videos: Vec<SearchCandidate> = candidates
            .into_iter()
            .filter(|candidate| candidate.kind == CandidateKind::Video)
            .collect();

        if videos.is_empty() {
            reply(ctx.responder.as_ref(), NO_RESULTS).await;
            return;
        }

        let picker = Picker::from_candidates(&videos);
        if let Err(e) = ctx.responder.reply_with_picker(SELECT_PROMPT, &picker).await {
            self.report(ctx.responder.as_ref(), PlayerError::Session(e)).await;
            return;
        }

        // La búsqueda que muestra el picker vuelve a ser el contexto activo
        self.active = Some(ctx);
        self.picker = Some(picker);
    }

    async fn on_head_resolved(&mut self, generation: u64, token: String, result: Result<Track>) {
        if generation != self.generation {
            debug!("⏭️ Resolución de cabecera obsoleta descartada: {}", token);
            return;
        }
        self.loading_head = false;

        let head_matches = matches!(self.queue.head(), Some(TrackRef::Pending(id)) if *id == token);
        if !head_matches {
            warn!("⚠️ La cabecera cambió durante la resolución de {}", token);
            self.advance().await;
            return;
        }

        match result {
            Ok(track) => {
                self.queue.replace_head(track.into());
            }
            Err(source) => {
                error!("{}", PlayerError::resolution(token, source));
                self.queue.pop_head();
                self.notify_active(HEAD_SKIPPED).await;
            }
        }

        self.advance().await;
    }

    // Avance de la cola

    /// Starts the queue head if nothing is playing. Safe to call redundantly.
    async fn advance(&mut self) {
        loop {
            if self.loading_head || self.playing {
                return;
            }

            let Some(head) = self.queue.head().cloned() else {
                self.release_if_drained().await;
                return;
            };

            if self.session.is_none() {
                if let Err(e) = self.connect().await {
                    self.report_active(e).await;
                    return;
                }
            }

            let track = match head {
                TrackRef::Pending(token) => {
                    self.spawn_head(token);
                    return;
                }
                TrackRef::Resolved(track) => track,
            };

            match self.start_track(track).await {
                Ok(()) => {
                    self.playing = true;
                    return;
                }
                Err(e) => {
                    self.report_active(e).await;
                    self.queue.pop_head();
                    self.current = None;
                }
            }
        }
    }

    async fn connect(&mut self) -> Result<(), PlayerError> {
        let channel_id = self
            .active
            .as_ref()
            .and_then(|ctx| ctx.voice_channel)
            .ok_or(PlayerError::NoVoiceTarget)?;

        let target = VoiceTarget {
            guild_id: self.guild_id,
            channel_id,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let session = self
            .gateway
            .connect(target, NoSubscriberBehavior::Play, tx)
            .await
            .map_err(PlayerError::Connection)?;

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, self.guild_id);
        self.session = Some(session);
        self.events = Some(rx);
        Ok(())
    }

    async fn start_track(&mut self, track: Track) -> Result<(), PlayerError> {
        self.current = Some(track.clone());

        let format = track
            .best_audio_format()
            .ok_or_else(|| PlayerError::NoPlayableFormat {
                title: track.title.clone(),
            })?;
        let resource = AudioResource::new(&track, format);

        let session = self
            .session
            .as_mut()
            .ok_or_else(|| PlayerError::Session(anyhow::anyhow!("no output session")))?;

        info!(
            "🎵 Reproduciendo: {} ({} kbps) en guild {}",
            track.title,
            format.audio_bitrate.unwrap_or_default(),
            self.guild_id
        );
        session.play(resource).await.map_err(PlayerError::Session)
    }

    // Eventos de la sesión

    async fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Error(message) => {
                error!("❌ Error del reproductor en guild {}: {}", self.guild_id, message);
            }
            SessionEvent::StateChange { old, new } => {
                debug!("🔄 {:?} -> {:?} en guild {}", old, new, self.guild_id);
                match (old, new) {
                    (PlayerStatus::Playing | PlayerStatus::Paused | PlayerStatus::AutoPaused, PlayerStatus::Idle) => {
                        self.on_track_end().await
                    }
                    (PlayerStatus::Buffering, PlayerStatus::Idle) => self.on_track_failed().await,
                    (PlayerStatus::Buffering, PlayerStatus::Playing) => self.on_track_start().await,
                    _ => {}
                }
            }
        }
    }

    async fn on_track_end(&mut self) {
        if !self.playing {
            debug!("Fin de track sin reproducción en curso en guild {}", self.guild_id);
            return;
        }

        debug!("🏁 Track terminado en guild {}", self.guild_id);
        self.playing = false;
        self.skipping = false;
        self.queue.pop_head();
        self.current = None;

        if self.queue.is_empty() {
            self.finish_queue().await;
        } else {
            self.advance().await;
        }
    }

    async fn on_track_failed(&mut self) {
        // Un /skip durante la carga también termina en Buffering -> Idle
        if self.playing && !self.skipping {
            let title = self
                .current
                .as_ref()
                .map(|track| track.title.clone())
                .unwrap_or_default();
            error!("❌ El stream de '{}' terminó antes de sonar", title);
            self.notify_active(HEAD_SKIPPED).await;
        }
        self.on_track_end().await;
    }

    async fn on_track_start(&mut self) {
        let Some(track) = self.current.as_ref() else {
            error!("❌ Track iniciado sin información actual en guild {}", self.guild_id);
            return;
        };
        let Some(ctx) = self.active.as_ref() else {
            return;
        };

        let message = NowPlaying::from(track);
        if let Err(e) = ctx.responder.send_to_channel(&message).await {
            error!("❌ Error al enviar mensaje now playing: {:?}", e);
            if let Err(e) = ctx.responder.follow_up(GENERIC_FAILURE).await {
                warn!("⚠️ No se pudo notificar el error: {:?}", e);
            }
        }
    }

    /// Disconnects when the queue ran dry without a natural track end,
    /// e.g. every queued entry failed. Pending searches do not hold the
    /// session open.
    async fn release_if_drained(&mut self) {
        let drained = self.session.is_some()
            && self.queue.is_empty()
            && !self.playing
            && !self.loading_head
            && self.queue_work == 0;

        if drained {
            self.finish_queue().await;
        }
    }

    async fn finish_queue(&mut self) {
        info!("📭 Cola vacía en guild {}, desconectando", self.guild_id);
        self.notify_active(QUEUE_EMPTY).await;
        self.teardown().await;
    }

    /// Shared by `stop` and natural end: detach listeners, destroy the
    /// transport, forget the session.
    async fn teardown(&mut self) {
        self.events = None;
        self.current = None;
        self.playing = false;
        self.skipping = false;

        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.destroy().await {
                warn!("⚠️ Error al desconectar de voz en guild {}: {:?}", self.guild_id, e);
            }
        }
    }

    // Respuestas

    async fn report(&self, responder: &dyn Responder, err: PlayerError) {
        log_error(self.guild_id, &err);
        reply(responder, &err.user_message()).await;
    }

    async fn report_active(&self, err: PlayerError) {
        log_error(self.guild_id, &err);
        self.notify_active(&err.user_message()).await;
    }

    async fn notify_active(&self, text: &str) {
        match &self.active {
            Some(ctx) => {
                if let Err(e) = ctx.responder.follow_up(text).await {
                    warn!("⚠️ No se pudo notificar en guild {}: {:?}", self.guild_id, e);
                }
            }
            None => debug!("Sin contexto activo para: {}", text),
        }
    }

    fn snapshot(&self) -> Snapshot {
        let state = match self.session.as_ref().map(|session| session.status()) {
            None => PlaybackState::Empty,
            // Terminó en la salida pero el controlador aún no lo procesó
            Some(PlayerStatus::Idle) if self.playing => PlaybackState::Playing,
            Some(PlayerStatus::Idle) if self.loading_head || !self.queue.is_empty() => {
                PlaybackState::Connecting
            }
            Some(PlayerStatus::Idle) => PlaybackState::Empty,
            Some(PlayerStatus::Buffering) => PlaybackState::Buffering,
            Some(PlayerStatus::Playing) => PlaybackState::Playing,
            Some(PlayerStatus::Paused | PlayerStatus::AutoPaused) => PlaybackState::Paused,
        };

        Snapshot {
            state,
            queue: self.queue.iter().map(|item| item.label().to_string()).collect(),
            current: self.current.as_ref().map(|track| track.title.clone()),
            connected: self.session.is_some(),
            generation: self.generation,
        }
    }
}

async fn next_event(events: &mut Option<SessionEventReceiver>) -> Option<SessionEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn log_error(guild_id: GuildId, err: &PlayerError) {
    if err.is_internal() {
        error!("❌ Error en guild {}: {}", guild_id, err);
    } else {
        debug!("Guild {}: {}", guild_id, err);
    }
}

async fn reply(responder: &dyn Responder, text: &str) {
    if let Err(e) = responder.reply(text).await {
        warn!("⚠️ No se pudo responder a la interacción: {:?}", e);
    }
}

async fn update(responder: &dyn Responder, text: &str) {
    if let Err(e) = responder.update(text).await {
        warn!("⚠️ No se pudo actualizar el mensaje: {:?}", e);
    }
}
