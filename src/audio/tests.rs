//! Controller behaviour against recording fakes of the voice backend and the
//! command surface.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serenity::model::id::{ChannelId, GuildId, InteractionId, UserId};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};
use tokio::sync::Notify;

use super::{
    context::{CommandContext, NowPlaying, Picker, Responder, Selection},
    controller::*,
    manager::PlayerManager,
    session::*,
};
use crate::{
    error::GENERIC_FAILURE,
    sources::{AudioFormat, CandidateKind, SearchCandidate, Track, TrackResolver},
};

const GUILD: u64 = 10;
const VOICE: u64 = 20;
const TEXT: u64 = 30;

// Fakes

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Reply(String),
    Picker(String, Picker),
    Update(String),
    FollowUp(String),
    NowPlaying(NowPlaying),
}

#[derive(Default)]
struct RecordingResponder {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingResponder {
    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    fn has(&self, message: &Sent) -> bool {
        self.sent.lock().contains(message)
    }
}

#[async_trait]
impl Responder for RecordingResponder {
    async fn reply(&self, text: &str) -> Result<()> {
        self.sent.lock().push(Sent::Reply(text.to_string()));
        Ok(())
    }

    async fn reply_with_picker(&self, text: &str, picker: &Picker) -> Result<()> {
        self.sent.lock().push(Sent::Picker(text.to_string(), picker.clone()));
        Ok(())
    }

    async fn update(&self, text: &str) -> Result<()> {
        self.sent.lock().push(Sent::Update(text.to_string()));
        Ok(())
    }

    async fn follow_up(&self, text: &str) -> Result<()> {
        self.sent.lock().push(Sent::FollowUp(text.to_string()));
        Ok(())
    }

    async fn send_to_channel(&self, message: &NowPlaying) -> Result<()> {
        self.sent.lock().push(Sent::NowPlaying(message.clone()));
        Ok(())
    }
}

#[derive(Default)]
struct SessionLog {
    connects: Vec<VoiceTarget>,
    status: Option<PlayerStatus>,
    played: Vec<AudioResource>,
    stops: Vec<bool>,
    pauses: usize,
    destroyed: usize,
    events: Option<SessionEventSender>,
}

#[derive(Default)]
struct FakeGateway {
    log: Arc<Mutex<SessionLog>>,
}

impl FakeGateway {
    fn played(&self) -> Vec<String> {
        self.log
            .lock()
            .played
            .iter()
            .map(|resource| resource.stream_url.clone())
            .collect()
    }

    /// Moves the session to `new` and reports it like a real backend would.
    fn emit(&self, new: PlayerStatus) {
        let old = self.set_status(new);
        self.report(old, new);
    }

    /// Changes what the session reports without delivering the event yet.
    fn set_status(&self, new: PlayerStatus) -> PlayerStatus {
        self.log.lock().status.replace(new).unwrap_or(PlayerStatus::Idle)
    }

    fn report(&self, old: PlayerStatus, new: PlayerStatus) {
        if let Some(events) = &self.log.lock().events {
            let _ = events.send(SessionEvent::StateChange { old, new });
        }
    }
}

#[async_trait]
impl VoiceGateway for FakeGateway {
    async fn connect(
        &self,
        target: VoiceTarget,
        _behavior: NoSubscriberBehavior,
        events: SessionEventSender,
    ) -> Result<Box<dyn OutputSession>> {
        let mut log = self.log.lock();
        log.connects.push(target);
        log.status = Some(PlayerStatus::Idle);
        log.events = Some(events);
        Ok(Box::new(FakeSession {
            log: self.log.clone(),
        }))
    }
}

struct FakeSession {
    log: Arc<Mutex<SessionLog>>,
}

#[async_trait]
impl OutputSession for FakeSession {
    fn status(&self) -> PlayerStatus {
        self.log.lock().status.unwrap_or(PlayerStatus::Idle)
    }

    async fn play(&mut self, resource: AudioResource) -> Result<()> {
        let mut log = self.log.lock();
        log.played.push(resource);
        log.status = Some(PlayerStatus::Buffering);
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        let mut log = self.log.lock();
        log.pauses += 1;
        log.status = Some(PlayerStatus::Paused);
        Ok(())
    }

    async fn unpause(&mut self) -> Result<()> {
        self.log.lock().status = Some(PlayerStatus::Playing);
        Ok(())
    }

    async fn stop(&mut self, force: bool) -> Result<()> {
        self.log.lock().stops.push(force);
        Ok(())
    }

    async fn destroy(&mut self) -> Result<()> {
        let mut log = self.log.lock();
        log.destroyed += 1;
        log.status = None;
        log.events = None;
        Ok(())
    }
}

/// Resolver answering from fixed tables. Tokens and search queries listed
/// in `gated` block until `release` is notified.
#[derive(Default)]
struct TableResolver {
    tracks: HashMap<String, Track>,
    playlists: HashMap<String, Vec<String>>,
    search: Vec<SearchCandidate>,
    gated: HashSet<String>,
    release: Arc<Notify>,
    resolved: Mutex<Vec<String>>,
}

#[async_trait]
impl TrackResolver for TableResolver {
    async fn resolve(&self, token: &str) -> Result<Track> {
        if self.gated.contains(token) {
            self.release.notified().await;
        }
        self.resolved.lock().push(token.to_string());
        self.tracks
            .get(token)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("video unavailable: {}", token))
    }

    async fn resolve_playlist(&self, token: &str, limit: usize) -> Result<Vec<String>> {
        let ids = self
            .playlists
            .get(token)
            .ok_or_else(|| anyhow::anyhow!("playlist not found"))?;
        Ok(ids.iter().take(limit).cloned().collect())
    }

    async fn search(&self, text: &str, limit: usize) -> Result<Vec<SearchCandidate>> {
        if self.gated.contains(text) {
            self.release.notified().await;
        }
        Ok(self.search.iter().take(limit).cloned().collect())
    }
}

// Helpers

fn audio(id: &str, abr: Option<u32>) -> AudioFormat {
    AudioFormat {
        format_id: id.to_string(),
        url: format!("https://cdn.example/{}", id),
        audio_bitrate: abr,
        codec: Some("opus".to_string()),
        container: Some("webm".to_string()),
    }
}

/// Video ids are 11 characters so queries classify as direct tracks.
fn track(id: &str) -> Track {
    Track {
        id: id.to_string(),
        title: format!("Song {}", &id[..4]),
        url: format!("https://www.youtube.com/watch?v={}", id),
        duration: Some(Duration::from_secs(215)),
        thumbnail: None,
        formats: vec![audio(&format!("{}-64", id), Some(64)), audio(&format!("{}-128", id), Some(128))],
    }
}

fn candidate(id: &str, kind: CandidateKind) -> SearchCandidate {
    SearchCandidate {
        id: id.to_string(),
        title: format!("Result {}", id),
        kind,
        duration: None,
    }
}

struct Harness {
    handle: ControllerHandle,
    gateway: Arc<FakeGateway>,
    resolver: Arc<TableResolver>,
    responder: Arc<RecordingResponder>,
}

impl Harness {
    fn new(resolver: TableResolver) -> Self {
        let gateway = Arc::new(FakeGateway::default());
        let resolver = Arc::new(resolver);
        let settings = ControllerSettings {
            idle_timeout: Duration::from_secs(60),
            ..ControllerSettings::default()
        };
        let handle = GuildController::spawn(
            GuildId::new(GUILD),
            resolver.clone(),
            gateway.clone(),
            settings,
        );

        Self {
            handle,
            gateway,
            resolver,
            responder: Arc::new(RecordingResponder::default()),
        }
    }

    fn ctx(&self, interaction: u64) -> CommandContext {
        CommandContext {
            interaction_id: InteractionId::new(interaction),
            guild_id: GuildId::new(GUILD),
            channel_id: ChannelId::new(TEXT),
            user_id: UserId::new(1),
            voice_channel: Some(ChannelId::new(VOICE)),
            responder: self.responder.clone(),
        }
    }

    fn send(&self, msg: ControllerMsg) {
        assert!(self.handle.send(msg).is_ok());
    }

    fn play(&self, interaction: u64, query: &str) {
        self.send(ControllerMsg::Play {
            ctx: self.ctx(interaction),
            query: query.to_string(),
        });
    }

    fn select(&self, origin: u64, values: &[&str]) {
        self.send(ControllerMsg::Select(Selection {
            origin: Some(InteractionId::new(origin)),
            user_id: UserId::new(1),
            values: values.iter().map(|value| value.to_string()).collect(),
            responder: self.responder.clone(),
        }));
    }

    async fn snapshot(&self) -> Snapshot {
        self.handle.snapshot().await.unwrap()
    }

    async fn wait_for(&self, message: Sent) {
        wait_until(|| self.responder.has(&message)).await;
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

fn with_tracks(ids: &[&str]) -> TableResolver {
    TableResolver {
        tracks: ids.iter().map(|id| (id.to_string(), track(id))).collect(),
        ..TableResolver::default()
    }
}

const A: &str = "aaaaaaaaaaa";
const B: &str = "bbbbbbbbbbb";
const C: &str = "ccccccccccc";

// Tests

#[tokio::test]
async fn test_play_direct_link_connects_and_picks_highest_bitrate() {
    let h = Harness::new(with_tracks(&[A]));

    h.play(1, &format!("https://www.youtube.com/watch?v={}", A));
    h.wait_for(Sent::Reply("Song aaaa added to the queue.".to_string())).await;
    wait_until(|| !h.gateway.played().is_empty()).await;

    let log = h.gateway.log.lock();
    assert_eq!(
        log.connects,
        vec![VoiceTarget {
            guild_id: GuildId::new(GUILD),
            channel_id: ChannelId::new(VOICE),
        }]
    );
    assert_eq!(log.played[0].stream_url, format!("https://cdn.example/{}-128", A));
    assert_eq!(log.played[0].bitrate, Some(128));
}

#[tokio::test]
async fn test_sequential_plays_queue_in_order_and_start_once() {
    let h = Harness::new(with_tracks(&[A, B, C]));

    for (interaction, id) in [(1, A), (2, B), (3, C)] {
        h.play(interaction, id);
        h.wait_for(Sent::Reply(format!("Song {} added to the queue.", &id[..4])))
            .await;
    }

    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.queue, vec!["Song aaaa", "Song bbbb", "Song cccc"]);
    assert_eq!(snapshot.state, PlaybackState::Buffering);
    // El resto de plays encontraron la sesión ocupada
    assert_eq!(h.gateway.played().len(), 1);
}

#[tokio::test]
async fn test_empty_query_is_rejected() {
    let h = Harness::new(TableResolver::default());

    h.play(1, "   ");
    h.wait_for(Sent::Reply(NO_QUERY.to_string())).await;

    assert!(h.snapshot().await.queue.is_empty());
}

#[tokio::test]
async fn test_resolution_failure_replies_generic_message() {
    let h = Harness::new(TableResolver::default());

    h.play(1, A);
    h.wait_for(Sent::Reply(GENERIC_FAILURE.to_string())).await;

    let snapshot = h.snapshot().await;
    assert!(snapshot.queue.is_empty());
    assert!(!snapshot.connected);
}

#[tokio::test]
async fn test_search_without_videos_replies_no_results() {
    let h = Harness::new(TableResolver {
        search: vec![
            candidate("PLxxxxxxxxxxxxxx", CandidateKind::Playlist),
            candidate("UCxxxxxxxxxxxxxxxxxxxxxx", CandidateKind::Channel),
        ],
        ..TableResolver::default()
    });

    h.play(1, "lofi");
    h.wait_for(Sent::Reply(NO_RESULTS.to_string())).await;

    assert_eq!(h.responder.sent(), vec![Sent::Reply(NO_RESULTS.to_string())]);
    assert!(h.snapshot().await.queue.is_empty());
}

#[tokio::test]
async fn test_search_selection_queues_and_consumes_picker() {
    let mut resolver = with_tracks(&[A]);
    resolver.search = vec![
        candidate(A, CandidateKind::Video),
        candidate("PLxxxxxxxxxxxxxx", CandidateKind::Playlist),
    ];
    let h = Harness::new(resolver);

    h.play(7, "lofi beats");
    wait_until(|| {
        h.responder
            .sent()
            .iter()
            .any(|sent| matches!(sent, Sent::Picker(text, picker) if text == SELECT_PROMPT && picker.options.len() == 1))
    })
    .await;

    h.select(7, &[A]);
    h.wait_for(Sent::Update("Song aaaa added to the queue.".to_string())).await;

    h.select(7, &[A]);
    h.wait_for(Sent::Update("Wrong interaction".to_string())).await;

    assert_eq!(h.snapshot().await.queue, vec!["Song aaaa"]);
}

#[tokio::test]
async fn test_selection_from_foreign_interaction_never_appends() {
    let mut resolver = with_tracks(&[A]);
    resolver.search = vec![candidate(A, CandidateKind::Video)];
    let h = Harness::new(resolver);

    h.play(7, "lofi");
    wait_until(|| h.responder.sent().iter().any(|sent| matches!(sent, Sent::Picker(..)))).await;

    // Un /play más nuevo invalida el picker
    h.play(8, "   ");
    h.select(7, &[A]);
    h.wait_for(Sent::Update("Wrong interaction".to_string())).await;

    assert!(h.snapshot().await.queue.is_empty());
    assert!(h.resolver.resolved.lock().is_empty());
}

#[tokio::test]
async fn test_empty_selection_keeps_picker() {
    let mut resolver = with_tracks(&[A]);
    resolver.search = vec![candidate(A, CandidateKind::Video)];
    let h = Harness::new(resolver);

    h.play(7, "lofi");
    wait_until(|| h.responder.sent().iter().any(|sent| matches!(sent, Sent::Picker(..)))).await;

    h.select(7, &[]);
    h.wait_for(Sent::Update(NOTHING_SELECTED.to_string())).await;

    h.select(7, &[A]);
    h.wait_for(Sent::Update("Song aaaa added to the queue.".to_string())).await;
}

#[tokio::test]
async fn test_skip_with_single_entry_never_stops() {
    let h = Harness::new(with_tracks(&[A]));

    h.play(1, A);
    wait_until(|| !h.gateway.played().is_empty()).await;

    h.send(ControllerMsg::Skip(h.ctx(2)));
    h.wait_for(Sent::Reply(NO_MORE_SONGS.to_string())).await;

    assert!(h.gateway.log.lock().stops.is_empty());
}

#[tokio::test]
async fn test_skip_stops_stream_and_track_end_advances() {
    let h = Harness::new(with_tracks(&[A, B]));

    h.play(1, A);
    h.wait_for(Sent::Reply("Song aaaa added to the queue.".to_string())).await;
    h.play(2, B);
    wait_until(|| h.queued_replies() == 2).await;
    h.gateway.emit(PlayerStatus::Playing);

    h.send(ControllerMsg::Skip(h.ctx(3)));
    h.wait_for(Sent::Reply(SKIPPED.to_string())).await;
    assert_eq!(h.gateway.log.lock().stops, vec![false]);

    h.gateway.emit(PlayerStatus::Idle);
    wait_until(|| h.gateway.played().len() == 2).await;

    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.queue, vec!["Song bbbb"]);
    assert_eq!(h.gateway.played()[1], format!("https://cdn.example/{}-128", B));
}

#[tokio::test]
async fn test_skip_while_paused_advances() {
    let h = Harness::new(with_tracks(&[A, B]));

    h.play(1, A);
    h.wait_for(Sent::Reply("Song aaaa added to the queue.".to_string())).await;
    h.play(2, B);
    wait_until(|| h.queued_replies() == 2).await;
    h.gateway.emit(PlayerStatus::Playing);

    h.send(ControllerMsg::Pause(h.ctx(3)));
    h.wait_for(Sent::Reply(PAUSED.to_string())).await;
    h.send(ControllerMsg::Skip(h.ctx(4)));
    h.wait_for(Sent::Reply(SKIPPED.to_string())).await;

    // Paused -> Idle
    h.gateway.emit(PlayerStatus::Idle);
    wait_until(|| h.gateway.played().len() == 2).await;

    assert_eq!(h.gateway.played()[1], format!("https://cdn.example/{}-128", B));
    assert_eq!(h.snapshot().await.queue, vec!["Song bbbb"]);
}

#[tokio::test]
async fn test_skip_while_buffering_is_not_reported_as_failure() {
    let h = Harness::new(with_tracks(&[A, B]));

    h.play(1, A);
    h.wait_for(Sent::Reply("Song aaaa added to the queue.".to_string())).await;
    h.play(2, B);
    wait_until(|| h.queued_replies() == 2).await;

    h.send(ControllerMsg::Skip(h.ctx(3)));
    h.wait_for(Sent::Reply(SKIPPED.to_string())).await;
    h.gateway.emit(PlayerStatus::Idle);
    wait_until(|| h.gateway.played().len() == 2).await;

    assert!(!h.responder.has(&Sent::FollowUp(HEAD_SKIPPED.to_string())));
    assert_eq!(h.gateway.played()[1], format!("https://cdn.example/{}-128", B));
}

#[tokio::test]
async fn test_stream_ending_while_buffering_skips_to_next() {
    let h = Harness::new(with_tracks(&[A, B]));

    h.play(1, A);
    h.wait_for(Sent::Reply("Song aaaa added to the queue.".to_string())).await;
    h.play(2, B);
    wait_until(|| h.queued_replies() == 2).await;

    // Buffering -> Idle sin haber sonado
    h.gateway.emit(PlayerStatus::Idle);
    h.wait_for(Sent::FollowUp(HEAD_SKIPPED.to_string())).await;
    wait_until(|| h.gateway.played().len() == 2).await;

    assert_eq!(h.gateway.played()[1], format!("https://cdn.example/{}-128", B));
    assert_eq!(h.snapshot().await.queue, vec!["Song bbbb"]);
}

#[tokio::test]
async fn test_resolution_landing_before_track_end_event_keeps_order() {
    let mut resolver = with_tracks(&[A, B]);
    resolver.gated.insert(B.to_string());
    let h = Harness::new(resolver);

    h.play(1, A);
    wait_until(|| h.gateway.played().len() == 1).await;
    h.gateway.emit(PlayerStatus::Playing);
    h.play(2, B);

    // La salida ya terminó A pero su evento sigue pendiente
    let old = h.gateway.set_status(PlayerStatus::Idle);
    h.resolver.release.notify_one();
    h.wait_for(Sent::Reply("Song bbbb added to the queue.".to_string())).await;

    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.queue, vec!["Song aaaa", "Song bbbb"]);
    assert_eq!(snapshot.state, PlaybackState::Playing);
    assert_eq!(h.gateway.played().len(), 1);

    h.gateway.report(old, PlayerStatus::Idle);
    wait_until(|| h.gateway.played().len() == 2).await;

    assert_eq!(h.gateway.played()[1], format!("https://cdn.example/{}-128", B));
    assert_eq!(h.snapshot().await.queue, vec!["Song bbbb"]);
}

#[tokio::test]
async fn test_track_end_racing_resolution_plays_each_once() {
    let mut resolver = with_tracks(&[A, B]);
    resolver.gated.insert(B.to_string());
    let h = Harness::new(resolver);

    h.play(1, A);
    wait_until(|| h.gateway.played().len() == 1).await;
    h.gateway.emit(PlayerStatus::Playing);
    h.play(2, B);

    h.gateway.emit(PlayerStatus::Idle);
    h.resolver.release.notify_one();
    wait_until(|| h.gateway.played().len() == 2).await;

    assert_eq!(
        h.gateway.played(),
        vec![
            format!("https://cdn.example/{}-128", A),
            format!("https://cdn.example/{}-128", B),
        ]
    );
    assert_eq!(h.snapshot().await.queue, vec!["Song bbbb"]);
}

#[tokio::test]
async fn test_pause_and_resume_replies() {
    let h = Harness::new(with_tracks(&[A]));

    h.send(ControllerMsg::Pause(h.ctx(1)));
    h.wait_for(Sent::Reply(NO_MUSIC.to_string())).await;

    h.play(2, A);
    wait_until(|| !h.gateway.played().is_empty()).await;
    h.gateway.emit(PlayerStatus::Playing);

    h.send(ControllerMsg::Resume(h.ctx(3)));
    h.wait_for(Sent::Reply(ALREADY_PLAYING.to_string())).await;

    h.send(ControllerMsg::Pause(h.ctx(4)));
    h.wait_for(Sent::Reply(PAUSED.to_string())).await;

    h.send(ControllerMsg::Pause(h.ctx(5)));
    h.wait_for(Sent::Reply(ALREADY_PAUSED.to_string())).await;
    assert_eq!(h.snapshot().await.state, PlaybackState::Paused);

    h.send(ControllerMsg::Resume(h.ctx(6)));
    h.wait_for(Sent::Reply(RESUMED.to_string())).await;
    assert_eq!(h.gateway.log.lock().pauses, 1);
}

#[tokio::test]
async fn test_stop_resets_regardless_of_state() {
    let h = Harness::new(with_tracks(&[A, B]));

    h.send(ControllerMsg::Stop(h.ctx(1)));
    h.wait_for(Sent::Reply(NO_MUSIC.to_string())).await;

    h.play(2, A);
    h.play(3, B);
    wait_until(|| h.queued_replies() == 2).await;

    h.send(ControllerMsg::Stop(h.ctx(4)));
    h.wait_for(Sent::Reply(STOPPED.to_string())).await;

    let snapshot = h.snapshot().await;
    assert!(snapshot.queue.is_empty());
    assert!(!snapshot.connected);
    assert_eq!(snapshot.state, PlaybackState::Empty);
    assert_eq!(snapshot.generation, 2);

    let log = h.gateway.log.lock();
    assert_eq!(log.stops, vec![true]);
    assert_eq!(log.destroyed, 1);
}

#[tokio::test]
async fn test_controller_is_reusable_after_stop() {
    let h = Harness::new(with_tracks(&[A]));

    h.play(1, A);
    wait_until(|| h.gateway.played().len() == 1).await;
    h.send(ControllerMsg::Stop(h.ctx(2)));
    h.wait_for(Sent::Reply(STOPPED.to_string())).await;

    h.play(3, A);
    wait_until(|| h.gateway.played().len() == 2).await;
    assert_eq!(h.gateway.log.lock().connects.len(), 2);
}

#[tokio::test]
async fn test_natural_end_of_last_track_disconnects() {
    let h = Harness::new(with_tracks(&[A]));

    h.play(1, A);
    wait_until(|| !h.gateway.played().is_empty()).await;
    h.gateway.emit(PlayerStatus::Playing);
    h.gateway.emit(PlayerStatus::Idle);

    h.wait_for(Sent::FollowUp(QUEUE_EMPTY.to_string())).await;

    let snapshot = h.snapshot().await;
    assert!(snapshot.queue.is_empty());
    assert!(!snapshot.connected);
    assert_eq!(h.gateway.log.lock().destroyed, 1);
}

#[tokio::test]
async fn test_audible_track_sends_now_playing() {
    let h = Harness::new(with_tracks(&[A]));

    h.play(1, A);
    wait_until(|| !h.gateway.played().is_empty()).await;
    h.gateway.emit(PlayerStatus::Playing);

    h.wait_for(Sent::NowPlaying(NowPlaying::from(&track(A)))).await;
    assert_eq!(h.snapshot().await.current.as_deref(), Some("Song aaaa"));
}

#[tokio::test]
async fn test_track_without_bitrate_is_dropped_without_playing() {
    let mut resolver = with_tracks(&[B]);
    let mut silent = track(A);
    silent.formats = vec![audio("video-only", None)];
    resolver.tracks.insert(A.to_string(), silent);
    let h = Harness::new(resolver);

    h.play(1, A);
    h.wait_for(Sent::FollowUp(GENERIC_FAILURE.to_string())).await;
    h.wait_for(Sent::FollowUp(QUEUE_EMPTY.to_string())).await;

    assert!(h.gateway.played().is_empty());
    assert!(h.snapshot().await.queue.is_empty());
}

#[tokio::test]
async fn test_pending_search_does_not_hold_empty_session() {
    let mut resolver = TableResolver {
        search: vec![candidate(B, CandidateKind::Video)],
        ..TableResolver::default()
    };
    let mut silent = track(A);
    silent.formats = vec![audio("video-only", None)];
    resolver.tracks.insert(A.to_string(), silent);
    resolver.gated.insert("lofi".to_string());
    let h = Harness::new(resolver);

    h.play(1, "lofi");
    h.play(2, A);
    h.wait_for(Sent::FollowUp(GENERIC_FAILURE.to_string())).await;
    h.wait_for(Sent::FollowUp(QUEUE_EMPTY.to_string())).await;

    let snapshot = h.snapshot().await;
    assert!(!snapshot.connected);
    assert!(snapshot.queue.is_empty());
    assert_eq!(h.gateway.log.lock().destroyed, 1);

    h.resolver.release.notify_one();
    wait_until(|| h.responder.sent().iter().any(|sent| matches!(sent, Sent::Picker(..)))).await;
    assert!(!h.snapshot().await.connected);
}

#[tokio::test]
async fn test_requester_without_voice_channel() {
    let h = Harness::new(with_tracks(&[A]));

    let mut ctx = h.ctx(1);
    ctx.voice_channel = None;
    h.send(ControllerMsg::Play {
        ctx,
        query: A.to_string(),
    });

    h.wait_for(Sent::FollowUp("No voice channel found".to_string())).await;
    assert!(h.gateway.log.lock().connects.is_empty());
    assert_eq!(h.snapshot().await.queue, vec!["Song aaaa"]);
}

#[tokio::test]
async fn test_late_resolution_after_stop_is_dropped() {
    let mut resolver = with_tracks(&[A]);
    resolver.gated.insert(A.to_string());
    let h = Harness::new(resolver);

    h.play(1, A);
    h.send(ControllerMsg::Stop(h.ctx(2)));
    h.wait_for(Sent::Reply(NO_MUSIC.to_string())).await;

    h.resolver.release.notify_one();
    h.wait_for(Sent::Reply(
        "Playback was stopped before Song aaaa could be added to the queue.".to_string(),
    ))
    .await;

    assert!(h.snapshot().await.queue.is_empty());
    assert!(h.gateway.log.lock().connects.is_empty());
}

#[tokio::test]
async fn test_playlist_skips_failing_head() {
    let mut resolver = with_tracks(&[B]);
    resolver
        .playlists
        .insert("PLabcdefghijklmnop".to_string(), vec![A.to_string(), B.to_string()]);
    let h = Harness::new(resolver);

    h.play(1, "https://www.youtube.com/playlist?list=PLabcdefghijklmnop");
    h.wait_for(Sent::Reply("2 songs have been added to the Queue.".to_string()))
        .await;
    h.wait_for(Sent::FollowUp(HEAD_SKIPPED.to_string())).await;
    wait_until(|| !h.gateway.played().is_empty()).await;

    assert_eq!(h.gateway.played(), vec![format!("https://cdn.example/{}-128", B)]);
    assert_eq!(h.snapshot().await.queue, vec!["Song bbbb"]);
}

#[tokio::test]
async fn test_external_disconnect_clears_state() {
    let h = Harness::new(with_tracks(&[A]));

    h.play(1, A);
    wait_until(|| !h.gateway.played().is_empty()).await;
    h.send(ControllerMsg::Disconnected);

    let snapshot = h.snapshot().await;
    assert!(!snapshot.connected);
    assert!(snapshot.queue.is_empty());
}

#[tokio::test]
async fn test_manager_restarts_idle_controller() {
    let gateway = Arc::new(FakeGateway::default());
    let settings = ControllerSettings {
        idle_timeout: Duration::from_millis(20),
        ..ControllerSettings::default()
    };
    let manager = PlayerManager::new(Arc::new(TableResolver::default()), gateway, settings);
    let responder = Arc::new(RecordingResponder::default());
    let guild_id = GuildId::new(GUILD);

    let stop = |interaction: u64| {
        ControllerMsg::Stop(CommandContext {
            interaction_id: InteractionId::new(interaction),
            guild_id,
            channel_id: ChannelId::new(TEXT),
            user_id: UserId::new(1),
            voice_channel: None,
            responder: responder.clone(),
        })
    };

    manager.dispatch(guild_id, stop(1)).unwrap();
    wait_until(|| responder.sent().len() == 1).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.snapshot(guild_id).await, None);

    manager.dispatch(guild_id, stop(2)).unwrap();
    wait_until(|| responder.sent().len() == 2).await;
    assert_eq!(manager.active_guilds(), 1);
}

#[tokio::test]
async fn test_manager_lists_live_controllers() {
    let manager = PlayerManager::new(
        Arc::new(TableResolver::default()),
        Arc::new(FakeGateway::default()),
        ControllerSettings::default(),
    );
    let responder = Arc::new(RecordingResponder::default());
    let guild_id = GuildId::new(GUILD);

    let ctx = CommandContext {
        interaction_id: InteractionId::new(1),
        guild_id,
        channel_id: ChannelId::new(TEXT),
        user_id: UserId::new(1),
        voice_channel: None,
        responder: responder.clone(),
    };
    manager.dispatch(guild_id, ControllerMsg::Stop(ctx)).unwrap();
    wait_until(|| responder.sent().len() == 1).await;

    let snapshots = manager.snapshots().await;
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].0, guild_id);
    assert_eq!(snapshots[0].1.state, PlaybackState::Empty);
    assert!(!snapshots[0].1.connected);
}

impl Harness {
    /// How many "added to the queue" replies were sent so far.
    fn queued_replies(&self) -> usize {
        self.responder
            .sent()
            .iter()
            .filter(|sent| matches!(sent, Sent::Reply(text) if text.ends_with("added to the queue.")))
            .count()
    }
}
