use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId, InteractionId, UserId};
use std::{fmt, sync::Arc, time::Duration};

use crate::sources::{SearchCandidate, Track};

/// Custom id of the search picker component.
pub const PICKER_ID: &str = "music";

/// Outbound side of the command surface: how the controller talks back.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Replaces the (deferred) reply of the originating interaction.
    async fn reply(&self, text: &str) -> Result<()>;

    /// Replies with a single-choice picker attached.
    async fn reply_with_picker(&self, text: &str, picker: &Picker) -> Result<()>;

    /// Rewrites the message the interaction belongs to, dropping its components.
    async fn update(&self, text: &str) -> Result<()>;

    /// Sends an additional message after the reply.
    async fn follow_up(&self, text: &str) -> Result<()>;

    /// Posts a rich message in the channel the interaction came from.
    async fn send_to_channel(&self, message: &NowPlaying) -> Result<()>;
}

/// Addressing information of a command. The most recent one becomes the
/// controller's active context.
#[derive(Clone)]
pub struct CommandContext {
    pub interaction_id: InteractionId,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    /// Voice channel the requester was in when issuing the command.
    pub voice_channel: Option<ChannelId>,
    pub responder: Arc<dyn Responder>,
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("interaction_id", &self.interaction_id)
            .field("guild_id", &self.guild_id)
            .field("channel_id", &self.channel_id)
            .field("user_id", &self.user_id)
            .field("voice_channel", &self.voice_channel)
            .finish_non_exhaustive()
    }
}

/// A picker choice. `origin` is the interaction whose reply carried the picker.
#[derive(Clone)]
pub struct Selection {
    pub origin: Option<InteractionId>,
    pub user_id: UserId,
    pub values: Vec<String>,
    pub responder: Arc<dyn Responder>,
}

impl fmt::Debug for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selection")
            .field("origin", &self.origin)
            .field("user_id", &self.user_id)
            .field("values", &self.values)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PickerOption {
    pub label: String,
    pub value: String,
}

/// Single-choice list shown after a free-text search.
#[derive(Debug, Clone, PartialEq)]
pub struct Picker {
    pub custom_id: String,
    pub placeholder: String,
    pub options: Vec<PickerOption>,
}

impl Picker {
    /// Discord rejects option labels longer than 100 characters.
    const MAX_LABEL: usize = 100;

    pub fn from_candidates(candidates: &[SearchCandidate]) -> Self {
        Self {
            custom_id: PICKER_ID.to_string(),
            placeholder: "Click here to select a music".to_string(),
            options: candidates
                .iter()
                .map(|candidate| PickerOption {
                    label: truncate_label(&candidate.title, Self::MAX_LABEL),
                    value: candidate.id.clone(),
                })
                .collect(),
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        self.options.iter().any(|option| option.value == value)
    }
}

fn truncate_label(label: &str, max: usize) -> String {
    if label.chars().count() <= max {
        label.to_string()
    } else {
        let mut truncated: String = label.chars().take(max - 3).collect();
        truncated.push_str("...");
        truncated
    }
}

/// Content of the "now playing" notification.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub title: String,
    pub url: String,
    pub thumbnail: Option<String>,
    pub duration: Option<Duration>,
}

impl From<&Track> for NowPlaying {
    fn from(track: &Track) -> Self {
        Self {
            title: track.title.clone(),
            url: track.url.clone(),
            thumbnail: track.thumbnail.clone(),
            duration: track.duration,
        }
    }
}
