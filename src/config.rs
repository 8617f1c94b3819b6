use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Registro de comandos por guild en desarrollo

    // Cola
    pub max_queue_size: usize,
    pub max_playlist_size: usize,
    pub search_limit: usize,
    pub idle_timeout: Duration,

    // Resolución
    pub ytdlp_path: String,
    pub resolver_concurrency: usize,
    pub track_cache_ttl: Duration,
    pub track_cache_size: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// `load` feeds this with the process environment; tests feed it a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or_default = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            application_id: var("APPLICATION_ID")
                .context("APPLICATION_ID is not set")?
                .parse()
                .context("APPLICATION_ID must be a numeric id")?,
            guild_id: var("GUILD_ID").and_then(|s| s.parse().ok()),

            max_queue_size: or_default("MAX_QUEUE_SIZE", "1000")
                .parse()
                .context("MAX_QUEUE_SIZE must be a number")?,
            max_playlist_size: or_default("MAX_PLAYLIST_SIZE", "100")
                .parse()
                .context("MAX_PLAYLIST_SIZE must be a number")?,
            search_limit: or_default("SEARCH_LIMIT", "5")
                .parse()
                .context("SEARCH_LIMIT must be a number")?,
            idle_timeout: humantime::parse_duration(&or_default("IDLE_TIMEOUT", "5m"))
                .context("IDLE_TIMEOUT must be a duration such as `5m`")?,

            ytdlp_path: or_default("YTDLP_PATH", "yt-dlp"),
            resolver_concurrency: or_default("RESOLVER_CONCURRENCY", "3")
                .parse()
                .context("RESOLVER_CONCURRENCY must be a number")?,
            track_cache_ttl: humantime::parse_duration(&or_default("TRACK_CACHE_TTL", "30m"))
                .context("TRACK_CACHE_TTL must be a duration such as `30m`")?,
            track_cache_size: or_default("TRACK_CACHE_SIZE", "200")
                .parse()
                .context("TRACK_CACHE_SIZE must be a number")?,
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Queue and playlist limits must be greater than zero
    /// - The search limit must fit in a Discord select menu (1-25 options)
    /// - At least one concurrent yt-dlp process must be allowed
    pub fn validate(&self) -> Result<()> {
        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if !(1..=25).contains(&self.search_limit) {
            anyhow::bail!("Search limit must be between 1 and 25, got: {}", self.search_limit);
        }

        if self.resolver_concurrency == 0 {
            anyhow::bail!("Resolver concurrency must be greater than 0");
        }

        if self.track_cache_size == 0 {
            anyhow::bail!("Track cache size must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the bot token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Queue: {} max, {} per playlist, {} search results, idle after {}\n  \
            Resolver: {} ({} concurrent), cache {} entries for {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.max_queue_size,
            self.max_playlist_size,
            self.search_limit,
            humantime::format_duration(self.idle_timeout),
            self.ytdlp_path,
            self.resolver_concurrency,
            self.track_cache_size,
            humantime::format_duration(self.track_cache_ttl),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            max_queue_size: 1000,
            max_playlist_size: 100,
            search_limit: 5,
            idle_timeout: Duration::from_secs(300),

            ytdlp_path: "yt-dlp".to_string(),
            resolver_concurrency: 3,
            track_cache_ttl: Duration::from_secs(1800),
            track_cache_size: 200,
        }
    }
}
