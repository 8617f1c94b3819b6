use thiserror::Error;

/// Message shown to users whenever the underlying failure must stay internal.
pub const GENERIC_FAILURE: &str = "Something went wrong, please try again later.";

/// Failures the playback controller can run into.
///
/// Only some variants carry a user-facing message of their own; the rest are
/// logged with full detail and surfaced as [`GENERIC_FAILURE`].
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("failed to resolve `{token}`: {source:#}")]
    ResolutionFailure {
        token: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("no audio format with a bitrate for `{title}`")]
    NoPlayableFormat { title: String },

    #[error("requester is not connected to a voice channel")]
    NoVoiceTarget,

    #[error("selection does not belong to the active picker")]
    StaleSelection,

    #[error("nothing to act on: {0}")]
    EmptyState(&'static str),

    #[error("queue is full ({max} tracks)")]
    QueueFull { max: usize },

    #[error("voice connection failed: {0:#}")]
    Connection(anyhow::Error),

    #[error("output session failed: {0:#}")]
    Session(anyhow::Error),

    #[error("guild controller is no longer running")]
    ControllerClosed,
}

impl PlayerError {
    pub fn resolution(token: impl Into<String>, source: anyhow::Error) -> Self {
        Self::ResolutionFailure {
            token: token.into(),
            source,
        }
    }

    /// Text safe to send back to the requester.
    pub fn user_message(&self) -> String {
        match self {
            Self::NoVoiceTarget => "No voice channel found".to_string(),
            Self::StaleSelection => "Wrong interaction".to_string(),
            Self::EmptyState(message) => message.to_string(),
            Self::QueueFull { max } => format!("The queue is full ({} songs max).", max),
            Self::ResolutionFailure { .. }
            | Self::NoPlayableFormat { .. }
            | Self::Connection(_)
            | Self::Session(_)
            | Self::ControllerClosed => GENERIC_FAILURE.to_string(),
        }
    }

    /// Whether the failure is an internal one that must be logged at error level.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::ResolutionFailure { .. }
                | Self::NoPlayableFormat { .. }
                | Self::Connection(_)
                | Self::Session(_)
                | Self::ControllerClosed
        )
    }
}
