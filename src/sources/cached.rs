use anyhow::Result;
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tracing::debug;

use super::{SearchCandidate, Track, TrackResolver};
use crate::cache::{CacheMetrics, TtlCache};

/// Resolver decorator that remembers single-track resolutions.
///
/// Playlist expansion and search always go upstream: their results change
/// over time and are cheap compared to full format extraction.
pub struct CachingResolver {
    inner: Arc<dyn TrackResolver>,
    tracks: TtlCache<String, Track>,
}

impl CachingResolver {
    pub fn new(inner: Arc<dyn TrackResolver>, capacity: usize, ttl: Duration) -> Self {
        Self {
            inner,
            tracks: TtlCache::new(capacity, ttl),
        }
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.tracks.metrics()
    }

    pub fn cleanup_expired(&self) -> usize {
        self.tracks.cleanup_expired()
    }
}

#[async_trait]
impl TrackResolver for CachingResolver {
    async fn resolve(&self, token: &str) -> Result<Track> {
        let key = token.trim().to_string();
        if let Some(track) = self.tracks.get(&key) {
            debug!("💾 Cache hit: {}", track.title);
            return Ok(track);
        }

        let track = self.inner.resolve(&key).await?;
        self.tracks.insert(key, track.clone());
        // El id canónico también sirve para entradas de playlist
        self.tracks.insert(track.id.clone(), track.clone());

        Ok(track)
    }

    async fn resolve_playlist(&self, token: &str, limit: usize) -> Result<Vec<String>> {
        self.inner.resolve_playlist(token, limit).await
    }

    async fn search(&self, text: &str, limit: usize) -> Result<Vec<SearchCandidate>> {
        self.inner.search(text, limit).await
    }
}
