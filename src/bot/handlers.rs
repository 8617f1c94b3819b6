use anyhow::Result;
use serenity::{
    builder::CreateInteractionResponse,
    model::{
        application::{CommandInteraction, ComponentInteraction, ComponentInteractionDataKind},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{info, warn};

use super::{responder::InteractionResponder, EchidnaBot};
use crate::audio::{
    context::{CommandContext, Responder, Selection, PICKER_ID},
    ControllerMsg,
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &EchidnaBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    // Respuesta diferida: resolver puede tardar varios segundos
    command.defer(&ctx.http).await?;

    let responder: Arc<dyn Responder> =
        Arc::new(InteractionResponder::command(ctx.http.clone(), command.clone()));
    let command_ctx = CommandContext {
        interaction_id: command.id,
        guild_id,
        channel_id: command.channel_id,
        user_id: command.user.id,
        voice_channel: user_voice_channel(ctx, guild_id, command.user.id),
        responder: responder.clone(),
    };

    let msg = match command.data.name.as_str() {
        "play" => ControllerMsg::Play {
            query: query_option(&command),
            ctx: command_ctx,
        },
        "pause" => ControllerMsg::Pause(command_ctx),
        "resume" => ControllerMsg::Resume(command_ctx),
        "skip" => ControllerMsg::Skip(command_ctx),
        "stop" => ControllerMsg::Stop(command_ctx),
        other => {
            warn!("❓ Comando no reconocido: {}", other);
            responder.reply("Unknown command").await?;
            return Ok(());
        }
    };

    if let Err(e) = bot.players.dispatch(guild_id, msg) {
        responder.reply(&e.user_message()).await?;
        return Err(e.into());
    }

    Ok(())
}

/// Maneja interacciones con componentes (menú de búsqueda)
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &EchidnaBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    if component.data.custom_id != PICKER_ID {
        warn!("❓ Componente desconocido: {}", component.data.custom_id);
        return Ok(());
    }

    info!(
        "🔘 Selección de {} en guild {}",
        component.user.name, guild_id
    );

    component
        .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
        .await?;

    let values = match &component.data.kind {
        ComponentInteractionDataKind::StringSelect { values } => values.clone(),
        _ => Vec::new(),
    };

    #[allow(deprecated)]
    let origin = component.message.interaction.as_ref().map(|interaction| interaction.id);

    let selection = Selection {
        origin,
        user_id: component.user.id,
        values,
        responder: Arc::new(InteractionResponder::component(
            ctx.http.clone(),
            component.clone(),
        )),
    };

    bot.players
        .dispatch(guild_id, ControllerMsg::Select(selection))?;

    Ok(())
}

fn query_option(command: &CommandInteraction) -> String {
    command
        .data
        .options
        .iter()
        .find(|option| option.name == "query")
        .and_then(|option| option.value.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Canal de voz del usuario según la caché de la guild
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
