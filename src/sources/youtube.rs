use anyhow::{Context, Result};
use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{
    query::{playlist_url, watch_url},
    AudioFormat, CandidateKind, SearchCandidate, Track, TrackResolver,
};

/// Cliente para interactuar con YouTube/yt-dlp
pub struct YouTubeClient {
    binary: String,
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

/// Información extraída de yt-dlp (`--dump-json`)
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: String,
    duration: Option<f64>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
    webpage_url: Option<String>,
    #[serde(default)]
    formats: Vec<Format>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
    preference: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Format {
    format_id: String,
    url: Option<String>,
    acodec: Option<String>,
    abr: Option<f64>,
    ext: Option<String>,
}

/// Entrada de `--flat-playlist` (búsquedas y playlists)
#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: String,
    title: Option<String>,
    ie_key: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
}

impl YouTubeClient {
    pub fn new(binary: impl Into<String>, concurrency: usize) -> Self {
        Self {
            binary: binary.into(),
            rate_limiter: Semaphore::new(concurrency.max(1)),
        }
    }

    /// Verifica que yt-dlp esté disponible
    pub async fn version(&self) -> Result<String> {
        let stdout = self.run(&["--version"]).await?;
        Ok(stdout.trim().to_string())
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let _permit = self.rate_limiter.acquire().await?;

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .with_context(|| format!("Error al ejecutar {}", self.binary))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Normaliza un token a una URL que yt-dlp entienda
    fn track_target(token: &str) -> String {
        if token.starts_with("http://") || token.starts_with("https://") {
            token.to_string()
        } else {
            watch_url(token)
        }
    }

    fn playlist_target(token: &str) -> String {
        if token.starts_with("http://") || token.starts_with("https://") {
            token.to_string()
        } else {
            playlist_url(token)
        }
    }
}

#[async_trait]
impl TrackResolver for YouTubeClient {
    async fn resolve(&self, token: &str) -> Result<Track> {
        let target = Self::track_target(token);
        debug!("📊 Obteniendo info de: {}", target);

        let stdout = self
            .run(&["--no-playlist", "--dump-json", "--no-warnings", &target])
            .await?;

        parse_track(&stdout)
    }

    async fn resolve_playlist(&self, token: &str, limit: usize) -> Result<Vec<String>> {
        let target = Self::playlist_target(token);
        info!("📋 Obteniendo playlist: {}", target);

        let limit = limit.to_string();
        let stdout = self
            .run(&[
                "--flat-playlist",
                "--dump-json",
                "--playlist-end",
                &limit,
                "--no-warnings",
                &target,
            ])
            .await?;

        let ids = parse_flat_entries(&stdout)
            .into_iter()
            .map(|entry| entry.id)
            .collect::<Vec<_>>();

        if ids.is_empty() {
            anyhow::bail!("Playlist vacía o inexistente: {}", token);
        }

        Ok(ids)
    }

    async fn search(&self, text: &str, limit: usize) -> Result<Vec<SearchCandidate>> {
        info!("🔍 Buscando en YouTube: {}", text);

        let search_query = format!("ytsearch{}:{}", limit, text);
        let stdout = self
            .run(&[
                "--flat-playlist",
                "--dump-json",
                "--no-warnings",
                &search_query,
            ])
            .await?;

        Ok(parse_flat_entries(&stdout)
            .into_iter()
            .map(FlatEntry::into_candidate)
            .collect())
    }
}

impl FlatEntry {
    fn into_candidate(self) -> SearchCandidate {
        let url = self.url.unwrap_or_default();
        let kind = match self.ie_key.as_deref() {
            Some("Youtube") => CandidateKind::Video,
            _ if url.contains("/playlist") || url.contains("list=") => CandidateKind::Playlist,
            _ => CandidateKind::Channel,
        };

        SearchCandidate {
            title: self.title.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            kind,
            duration: self.duration.map(Duration::from_secs_f64),
        }
    }
}

fn parse_track(stdout: &str) -> Result<Track> {
    let info: YtDlpInfo =
        serde_json::from_str(stdout.trim()).context("Error al parsear respuesta de yt-dlp")?;

    let thumbnail = info.thumbnail.or_else(|| {
        info.thumbnails
            .iter()
            .max_by_key(|thumb| thumb.preference.unwrap_or(i64::MIN))
            .map(|thumb| thumb.url.clone())
    });

    let formats = info
        .formats
        .into_iter()
        .filter_map(|format| {
            let url = format.url?;
            let has_audio = format.acodec.as_deref() != Some("none");
            Some(AudioFormat {
                audio_bitrate: format
                    .abr
                    .filter(|abr| has_audio && *abr > 0.0)
                    .map(|abr| abr.round() as u32),
                format_id: format.format_id,
                url,
                codec: format.acodec.filter(|codec| codec != "none"),
                container: format.ext,
            })
        })
        .collect();

    Ok(Track {
        url: info.webpage_url.unwrap_or_else(|| watch_url(&info.id)),
        id: info.id,
        title: info.title,
        duration: info.duration.map(Duration::from_secs_f64),
        thumbnail,
        formats,
    })
}

fn parse_flat_entries(stdout: &str) -> Vec<FlatEntry> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<FlatEntry>(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("⚠️ Línea de yt-dlp ignorada: {}", e);
                None
            }
        })
        .collect()
}
