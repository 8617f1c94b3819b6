use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("valid video id regex"));

static PLAYLIST_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:PL|UU|LL|RD|OL|FL|UL)[A-Za-z0-9_-]{10,}$").expect("valid playlist id regex")
});

static CHANNEL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^UC[A-Za-z0-9_-]{22}$").expect("valid channel id regex"));

const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "gaming.youtube.com",
];

/// How a `/play` query is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    /// A single video, carrying its 11-character id.
    Track(String),
    /// A playlist, carrying its id.
    Playlist(String),
    /// Anything else: free text for the search picker.
    Search(String),
}

impl QueryKind {
    /// Classifies a raw query. Video links win over playlist links, so a
    /// `watch?v=..&list=..` URL plays the single video.
    pub fn classify(query: &str) -> Self {
        let query = query.trim();

        if let Some(id) = video_id(query) {
            return QueryKind::Track(id);
        }

        if let Some(id) = playlist_id(query) {
            return QueryKind::Playlist(id);
        }

        QueryKind::Search(query.to_string())
    }
}

/// Canonical watch URL for a video id.
pub fn watch_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", id)
}

/// Canonical URL for a playlist id.
pub fn playlist_url(id: &str) -> String {
    format!("https://www.youtube.com/playlist?list={}", id)
}

fn video_id(query: &str) -> Option<String> {
    if VIDEO_ID.is_match(query) {
        return Some(query.to_string());
    }

    let url = parse_url(query)?;
    let host = url.host_str()?;

    let candidate = if host == "youtu.be" {
        url.path_segments()?.next().map(str::to_string)
    } else if YOUTUBE_HOSTS.contains(&host) {
        let mut segments = url.path_segments()?;
        match segments.next() {
            Some("watch") => query_param(&url, "v"),
            Some("embed" | "v" | "shorts" | "live") => segments.next().map(str::to_string),
            _ => None,
        }
    } else {
        None
    };

    candidate.filter(|id| VIDEO_ID.is_match(id))
}

fn playlist_id(query: &str) -> Option<String> {
    if PLAYLIST_ID.is_match(query) {
        return Some(query.to_string());
    }

    // Un canal se reproduce como la playlist de sus subidas
    if CHANNEL_ID.is_match(query) {
        return Some(format!("UU{}", &query[2..]));
    }

    let url = parse_url(query)?;
    let host = url.host_str()?;
    if !YOUTUBE_HOSTS.contains(&host) && host != "youtu.be" {
        return None;
    }

    query_param(&url, "list").filter(|id| PLAYLIST_ID.is_match(id))
}

fn parse_url(query: &str) -> Option<Url> {
    if query.starts_with("http://") || query.starts_with("https://") {
        Url::parse(query).ok()
    } else if query.contains("youtube.com/") || query.starts_with("youtu.be/") {
        Url::parse(&format!("https://{}", query)).ok()
    } else {
        None
    }
}

fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
