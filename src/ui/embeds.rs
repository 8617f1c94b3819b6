use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::context::NowPlaying;

/// Paleta de colores del bot
pub mod colors {
    use serenity::all::Colour;

    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

/// Crea el embed "now playing" que se envía al canal
pub fn create_now_playing_embed(track: &NowPlaying) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("Now playing: ")
        .description(format!("[{}]({})", track.title, track.url))
        .color(colors::MUSIC_PURPLE)
        .timestamp(Timestamp::now());

    // Los directos no reportan duración
    let duration = track.duration.map(format_duration).unwrap_or_else(|| "live".to_string());
    embed = embed.footer(CreateEmbedFooter::new(format!("Duration: {}", duration)));

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
}

/// Formatea una duración como `HH:MM:SS`
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}
