pub mod cached;
pub mod query;
pub mod youtube;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

pub use cached::CachingResolver;
pub use query::QueryKind;
pub use youtube::YouTubeClient;

/// Media resolution service used by the playback controller.
///
/// Any error returned here is treated uniformly as a resolution failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resolves a URL or a video id to a single playable track.
    async fn resolve(&self, token: &str) -> Result<Track>;

    /// Expands a playlist into the ordered ids of its entries.
    async fn resolve_playlist(&self, token: &str, limit: usize) -> Result<Vec<String>>;

    /// Free-text search, ranked by the upstream service.
    async fn search(&self, text: &str, limit: usize) -> Result<Vec<SearchCandidate>>;
}

/// A fully resolved track.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub url: String,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
    pub formats: Vec<AudioFormat>,
}

impl Track {
    /// Highest-bitrate format among those reporting an audio bitrate.
    pub fn best_audio_format(&self) -> Option<&AudioFormat> {
        let mut candidates: Vec<&AudioFormat> = self
            .formats
            .iter()
            .filter(|format| format.audio_bitrate.is_some_and(|abr| abr > 0))
            .collect();

        // Estable: en empate gana el primero que reportó yt-dlp
        candidates.sort_by(|a, b| b.audio_bitrate.cmp(&a.audio_bitrate));
        candidates.into_iter().next()
    }
}

/// One encoding variant of a track.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFormat {
    pub format_id: String,
    pub url: String,
    /// Audio bitrate in kbps, absent for video-only variants.
    pub audio_bitrate: Option<u32>,
    pub codec: Option<String>,
    pub container: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Video,
    Playlist,
    Channel,
}

/// A search hit offered to the user in the picker.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCandidate {
    pub id: String,
    pub title: String,
    pub kind: CandidateKind,
    pub duration: Option<Duration>,
}

/// Queue entry: a resolved track or an id still waiting to be resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackRef {
    Pending(String),
    Resolved(Track),
}

impl TrackRef {
    pub fn label(&self) -> &str {
        match self {
            TrackRef::Pending(id) => id,
            TrackRef::Resolved(track) => &track.title,
        }
    }
}

impl From<Track> for TrackRef {
    fn from(track: Track) -> Self {
        TrackRef::Resolved(track)
    }
}
