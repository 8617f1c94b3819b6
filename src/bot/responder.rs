use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serenity::{
    builder::{CreateInteractionResponseFollowup, CreateMessage, EditInteractionResponse},
    http::Http,
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::ChannelId,
    },
};
use std::sync::Arc;
use tracing::debug;

use crate::{
    audio::context::{NowPlaying, Picker, Responder},
    ui::{components, embeds},
};

enum Origin {
    Command(Box<CommandInteraction>),
    Component(Box<ComponentInteraction>),
}

/// [`Responder`] answering through a deferred Discord interaction.
///
/// Interaction tokens expire after 15 minutes; once editing or following up
/// fails the text is posted to the channel instead.
pub struct InteractionResponder {
    http: Arc<Http>,
    channel_id: ChannelId,
    origin: Origin,
}

impl InteractionResponder {
    pub fn command(http: Arc<Http>, interaction: CommandInteraction) -> Self {
        Self {
            http,
            channel_id: interaction.channel_id,
            origin: Origin::Command(Box::new(interaction)),
        }
    }

    pub fn component(http: Arc<Http>, interaction: ComponentInteraction) -> Self {
        Self {
            http,
            channel_id: interaction.channel_id,
            origin: Origin::Component(Box::new(interaction)),
        }
    }

    async fn edit(&self, builder: EditInteractionResponse) -> Result<()> {
        let http = self.http.as_ref();
        match &self.origin {
            Origin::Command(interaction) => interaction.edit_response(http, builder).await?,
            Origin::Component(interaction) => interaction.edit_response(http, builder).await?,
        };
        Ok(())
    }

    async fn edit_or_post(&self, text: &str, builder: EditInteractionResponse) -> Result<()> {
        if let Err(e) = self.edit(builder).await {
            debug!("Interacción expirada, enviando al canal: {:?}", e);
            return self.post(text).await;
        }
        Ok(())
    }

    async fn post(&self, text: &str) -> Result<()> {
        self.channel_id
            .send_message(self.http.as_ref(), CreateMessage::new().content(text))
            .await
            .context("Error al enviar mensaje al canal")?;
        Ok(())
    }
}

#[async_trait]
impl Responder for InteractionResponder {
    async fn reply(&self, text: &str) -> Result<()> {
        self.edit_or_post(text, EditInteractionResponse::new().content(text))
            .await
    }

    async fn reply_with_picker(&self, text: &str, picker: &Picker) -> Result<()> {
        let builder = EditInteractionResponse::new()
            .content(text)
            .components(vec![components::create_picker_row(picker)]);
        self.edit(builder).await
    }

    async fn update(&self, text: &str) -> Result<()> {
        let builder = EditInteractionResponse::new()
            .content(text)
            .components(Vec::new());
        self.edit_or_post(text, builder).await
    }

    async fn follow_up(&self, text: &str) -> Result<()> {
        let http = self.http.as_ref();
        let builder = CreateInteractionResponseFollowup::new().content(text);
        let sent = match &self.origin {
            Origin::Command(interaction) => interaction.create_followup(http, builder).await,
            Origin::Component(interaction) => interaction.create_followup(http, builder).await,
        };

        if let Err(e) = sent {
            debug!("Follow-up fallido, enviando al canal: {:?}", e);
            return self.post(text).await;
        }
        Ok(())
    }

    async fn send_to_channel(&self, message: &NowPlaying) -> Result<()> {
        let embed = embeds::create_now_playing_embed(message);
        self.channel_id
            .send_message(self.http.as_ref(), CreateMessage::new().embed(embed))
            .await
            .context("Error al enviar el embed now playing")?;
        Ok(())
    }
}
