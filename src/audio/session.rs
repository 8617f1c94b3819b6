use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::mpsc;

use crate::sources::{AudioFormat, Track};

/// Status reported by the output session. The controller never sets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    Idle,
    Buffering,
    Playing,
    Paused,
    AutoPaused,
}

impl PlayerStatus {
    pub fn is_paused(self) -> bool {
        matches!(self, PlayerStatus::Paused | PlayerStatus::AutoPaused)
    }
}

/// What the session does when nobody is subscribed to its audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoSubscriberBehavior {
    Play,
    Pause,
    Stop,
}

/// Notifications emitted by an output session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChange { old: PlayerStatus, new: PlayerStatus },
    Error(String),
}

pub type SessionEventSender = mpsc::UnboundedSender<SessionEvent>;
pub type SessionEventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Where to connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceTarget {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

/// Playable input built from one encoding variant of a track.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioResource {
    pub title: String,
    pub stream_url: String,
    pub bitrate: Option<u32>,
    pub container: Option<String>,
}

impl AudioResource {
    pub fn new(track: &Track, format: &AudioFormat) -> Self {
        Self {
            title: track.title.clone(),
            stream_url: format.url.clone(),
            bitrate: format.audio_bitrate,
            container: format.container.clone(),
        }
    }
}

/// Opens voice connections and hands back the output session bound to them.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Joins `target` and creates a session subscribed to it. Every status
    /// transition of the session is sent on `events` until the session is
    /// destroyed or the receiver dropped.
    async fn connect(
        &self,
        target: VoiceTarget,
        behavior: NoSubscriberBehavior,
        events: SessionEventSender,
    ) -> Result<Box<dyn OutputSession>>;
}

/// Live audio pipeline plus the voice transport it is subscribed to.
#[async_trait]
pub trait OutputSession: Send + Sync {
    fn status(&self) -> PlayerStatus;

    async fn play(&mut self, resource: AudioResource) -> Result<()>;

    async fn pause(&mut self) -> Result<()>;

    async fn unpause(&mut self) -> Result<()>;

    /// Stops the current stream. A non-forced stop ends the track the same
    /// way reaching its end does.
    async fn stop(&mut self, force: bool) -> Result<()>;

    /// Leaves the voice channel and releases the transport.
    async fn destroy(&mut self) -> Result<()>;
}
