use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseFollowup,
        CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::info;

use crate::{
    bot::AriaMusicBot,
    error::PlayerError,
    player::queue::LoopMode,
    ui::{buttons, embeds},
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &AriaMusicBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, command, bot, guild_id).await?,
        "pause" => handle_pause(ctx, command, bot, guild_id).await?,
        "resume" => handle_resume(ctx, command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, command, bot, guild_id).await?,
        "loop" => handle_loop(ctx, command, bot, guild_id).await?,
        "volume" => handle_volume(ctx, command, bot, guild_id).await?,
        "shuffle" => handle_shuffle(ctx, command, bot, guild_id).await?,
        "remove" => handle_remove(ctx, command, bot, guild_id).await?,
        "clear" => handle_clear(ctx, command, bot, guild_id).await?,
        "help" => handle_help(ctx, command).await?,
        _ => {
            respond_ephemeral(ctx, &command, embeds::error_embed("Comando no reconocido")).await?;
        }
    }

    Ok(())
}

// ---------- Guardias ----------

/// Canal de voz del usuario, según el caché de la gateway.
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    ctx.cache
        .guild(guild_id)?
        .voice_states
        .get(&user_id)?
        .channel_id
}

/// Canal de voz en el que está el bot, si está conectado.
pub(crate) async fn bot_channel_for(ctx: &Context, guild_id: GuildId) -> Option<ChannelId> {
    let manager = songbird::get(ctx).await?;
    let call = manager.get(guild_id)?;
    let channel = call.lock().await.current_channel()?;
    Some(ChannelId::new(channel.0.get()))
}

/// Exige que el usuario esté en un canal de voz y, si el bot ya está
/// conectado, que sea el mismo.
async fn require_same_channel(
    ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
) -> Result<ChannelId, PlayerError> {
    let user_channel =
        user_voice_channel(ctx, guild_id, user_id).ok_or(PlayerError::NotInVoiceChannel)?;

    if let Some(bot_channel) = bot_channel_for(ctx, guild_id).await {
        if bot_channel != user_channel {
            return Err(PlayerError::NotInVoiceChannel);
        }
    }

    Ok(user_channel)
}

// ---------- Respuestas ----------

async fn respond_embed(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;
    Ok(())
}

async fn respond_ephemeral(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embed).ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

fn option_str<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn option_i64(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

// ---------- Comandos ----------

async fn handle_play(
    ctx: &Context,
    command: CommandInteraction,
    bot: &AriaMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(query) = option_str(&command, "query").map(str::to_string) else {
        return respond_ephemeral(ctx, &command, embeds::error_embed("Falta el término de búsqueda")).await;
    };

    let Some(voice_channel) = user_voice_channel(ctx, guild_id, command.user.id) else {
        return respond_ephemeral(
            ctx,
            &command,
            embeds::error_embed("¡Debes estar en un canal de voz!"),
        )
        .await;
    };

    // Resolver puede tardar varios segundos; se difiere la respuesta
    command.defer(&ctx.http).await?;

    let outcome = bot
        .registry
        .enqueue(guild_id, voice_channel, command.channel_id, command.user.id, &query)
        .await;

    let embed = match outcome {
        Ok(receipt) => embeds::track_added(&receipt.track, receipt.position),
        Err(e) => embeds::error_embed(&e.to_string()),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

async fn handle_pause(
    ctx: &Context,
    command: CommandInteraction,
    bot: &AriaMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    if let Err(e) = require_same_channel(ctx, guild_id, command.user.id).await {
        return respond_ephemeral(ctx, &command, embeds::error_embed(&e.to_string())).await;
    }

    let embed = match bot.registry.pause(guild_id).await {
        Ok(true) => embeds::success_embed("⏸️ Reproducción pausada."),
        Ok(false) => embeds::simple_embed("La reproducción ya estaba pausada."),
        Err(PlayerError::NoActiveSession) => embeds::error_embed("No hay nada que pausar."),
        Err(e) => embeds::error_embed(&e.to_string()),
    };
    respond_embed(ctx, &command, embed).await
}

async fn handle_resume(
    ctx: &Context,
    command: CommandInteraction,
    bot: &AriaMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    if let Err(e) = require_same_channel(ctx, guild_id, command.user.id).await {
        return respond_ephemeral(ctx, &command, embeds::error_embed(&e.to_string())).await;
    }

    let embed = match bot.registry.resume(guild_id).await {
        Ok(true) => embeds::success_embed("▶️ Reproducción reanudada."),
        Ok(false) => embeds::simple_embed("La reproducción no estaba pausada."),
        Err(PlayerError::NoActiveSession) => embeds::error_embed("El reproductor no está activo."),
        Err(e) => embeds::error_embed(&e.to_string()),
    };
    respond_embed(ctx, &command, embed).await
}

async fn handle_skip(
    ctx: &Context,
    command: CommandInteraction,
    bot: &AriaMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    if let Err(e) = require_same_channel(ctx, guild_id, command.user.id).await {
        return respond_ephemeral(ctx, &command, embeds::error_embed(&e.to_string())).await;
    }

    let embed = match bot.registry.skip(guild_id).await {
        Ok(skipped) => embeds::success_embed(&format!("⏭️ Saltando **{}**...", skipped.title)),
        Err(PlayerError::NoActiveSession) => embeds::error_embed("No hay nada que saltar."),
        Err(e) => embeds::error_embed(&e.to_string()),
    };
    respond_embed(ctx, &command, embed).await
}

async fn handle_stop(
    ctx: &Context,
    command: CommandInteraction,
    bot: &AriaMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    if let Err(e) = require_same_channel(ctx, guild_id, command.user.id).await {
        return respond_ephemeral(ctx, &command, embeds::error_embed(&e.to_string())).await;
    }

    // Responder antes del teardown: la limpieza borra los mensajes del bot
    match bot.registry.has_session(guild_id) {
        true => {
            respond_embed(
                ctx,
                &command,
                embeds::success_embed("⏹️ Deteniendo la reproducción y saliendo del canal..."),
            )
            .await?;
            let reason = format!("comando stop de {}", command.user.name);
            let _ = bot.registry.stop(guild_id, &reason).await;
        }
        false => {
            respond_ephemeral(
                ctx,
                &command,
                embeds::error_embed("El bot no está en un canal de voz."),
            )
            .await?;
        }
    }
    Ok(())
}

async fn handle_queue(
    ctx: &Context,
    command: CommandInteraction,
    bot: &AriaMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let posted = bot
        .registry
        .repost_queue_message(guild_id, command.channel_id)
        .await?;

    let embed = if posted {
        let state = bot.registry.render_state(guild_id).await?;
        let sonando = state
            .current
            .as_ref()
            .map(|t| t.title.as_str())
            .unwrap_or("nada");
        embeds::simple_embed(&format!(
            "📋 **Cola publicada**\n\n\
             • Sonando: {}\n\
             • En espera: {} canciones ({} visibles en la página {}/{})\n\
             • Repetición: {} | Volumen: {}%",
            sonando,
            state.queued,
            state.page_items.len(),
            state.page + 1,
            state.total_pages,
            state.loop_mode.label(),
            state.volume,
        ))
    } else {
        embeds::simple_embed("La cola está vacía y no hay nada sonando.")
    };
    respond_ephemeral(ctx, &command, embed).await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: CommandInteraction,
    bot: &AriaMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let embed = match bot.registry.repost_now_playing(guild_id).await {
        Ok(true) => embeds::simple_embed("🎵 Panel de reproducción actualizado."),
        Ok(false) | Err(PlayerError::NoActiveSession) => {
            embeds::simple_embed("No hay nada reproduciéndose ahora.")
        }
        Err(e) => embeds::error_embed(&e.to_string()),
    };
    respond_ephemeral(ctx, &command, embed).await
}

async fn handle_loop(
    ctx: &Context,
    command: CommandInteraction,
    bot: &AriaMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    if let Err(e) = require_same_channel(ctx, guild_id, command.user.id).await {
        return respond_ephemeral(ctx, &command, embeds::error_embed(&e.to_string())).await;
    }

    let outcome = match option_str(&command, "mode") {
        Some("off") => bot.registry.set_loop(guild_id, LoopMode::Off).await,
        Some("track") => bot.registry.set_loop(guild_id, LoopMode::Track).await,
        Some("queue") => bot.registry.set_loop(guild_id, LoopMode::Queue).await,
        // Sin argumento: cicla off → canción → cola
        _ => bot.registry.cycle_loop(guild_id).await,
    };

    let embed = match outcome {
        Ok(LoopMode::Track) => embeds::success_embed("🔂 Repitiendo la canción actual."),
        Ok(LoopMode::Queue) => embeds::success_embed("🔁 Repitiendo la cola."),
        Ok(LoopMode::Off) => embeds::success_embed("▶️ Repetición desactivada."),
        Err(PlayerError::NoActiveSession) => embeds::error_embed("El reproductor no está activo."),
        Err(e) => embeds::error_embed(&e.to_string()),
    };
    respond_embed(ctx, &command, embed).await
}

async fn handle_volume(
    ctx: &Context,
    command: CommandInteraction,
    bot: &AriaMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    if let Err(e) = require_same_channel(ctx, guild_id, command.user.id).await {
        return respond_ephemeral(ctx, &command, embeds::error_embed(&e.to_string())).await;
    }

    let Some(level) = option_i64(&command, "level") else {
        let embed = match bot.registry.volume(guild_id) {
            Ok(volume) => embeds::simple_embed(&format!("El volumen actual es {}%.", volume)),
            Err(_) => embeds::error_embed("El reproductor no está activo."),
        };
        return respond_embed(ctx, &command, embed).await;
    };

    if !(0..=200).contains(&level) {
        return respond_ephemeral(
            ctx,
            &command,
            embeds::error_embed("El volumen debe ser un número entre 0 y 200."),
        )
        .await;
    }

    let embed = match bot.registry.set_volume(guild_id, level as u16).await {
        Ok(_) => embeds::success_embed(&format!("🔊 Volumen fijado en {}%.", level)),
        Err(PlayerError::NoActiveSession) => embeds::error_embed("El reproductor no está activo."),
        Err(e) => embeds::error_embed(&e.to_string()),
    };
    respond_embed(ctx, &command, embed).await
}

async fn handle_shuffle(
    ctx: &Context,
    command: CommandInteraction,
    bot: &AriaMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    if let Err(e) = require_same_channel(ctx, guild_id, command.user.id).await {
        return respond_ephemeral(ctx, &command, embeds::error_embed(&e.to_string())).await;
    }

    let embed = match bot.registry.shuffle(guild_id).await {
        Ok(n) if n < 2 => {
            embeds::simple_embed("Se necesitan al menos 2 canciones en la cola para mezclar.")
        }
        Ok(_) => embeds::success_embed("🔀 ¡Cola mezclada!"),
        Err(PlayerError::NoActiveSession) => embeds::error_embed("El reproductor no está activo."),
        Err(e) => embeds::error_embed(&e.to_string()),
    };
    respond_embed(ctx, &command, embed).await
}

async fn handle_remove(
    ctx: &Context,
    command: CommandInteraction,
    bot: &AriaMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    if let Err(e) = require_same_channel(ctx, guild_id, command.user.id).await {
        return respond_ephemeral(ctx, &command, embeds::error_embed(&e.to_string())).await;
    }

    let Some(position) = option_i64(&command, "position").filter(|p| *p > 0) else {
        return respond_ephemeral(ctx, &command, embeds::error_embed("Posición inválida.")).await;
    };

    let embed = match bot.registry.remove_at(guild_id, position as usize).await {
        Ok(removed) => {
            embeds::success_embed(&format!("Se eliminó **{}** de la cola.", removed.title))
        }
        Err(PlayerError::NoActiveSession) => embeds::error_embed("El reproductor no está activo."),
        Err(e) => embeds::error_embed(&e.to_string()),
    };
    respond_embed(ctx, &command, embed).await
}

async fn handle_clear(
    ctx: &Context,
    command: CommandInteraction,
    bot: &AriaMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    if let Err(e) = require_same_channel(ctx, guild_id, command.user.id).await {
        return respond_ephemeral(ctx, &command, embeds::error_embed(&e.to_string())).await;
    }

    let embed = match bot.registry.clear_queue(guild_id).await {
        Ok(0) => embeds::simple_embed("La cola ya está vacía."),
        Ok(n) => embeds::success_embed(&format!("🗑️ Se eliminaron {} canciones de la cola.", n)),
        Err(PlayerError::NoActiveSession) => embeds::error_embed("El reproductor no está activo."),
        Err(e) => embeds::error_embed(&e.to_string()),
    };
    respond_embed(ctx, &command, embed).await
}

async fn handle_help(ctx: &Context, command: CommandInteraction) -> Result<()> {
    let embed = embeds::simple_embed(
        "**🎵 Comandos de Aria Music**\n\n\
         **/play** `query`: Reproduce una canción o la agrega a la cola\n\
         **/pause** / **/resume**: Pausa o reanuda la reproducción\n\
         **/skip**: Salta a la siguiente canción\n\
         **/stop**: Detiene todo y sale del canal de voz\n\
         **/queue**: Muestra la cola paginada\n\
         **/nowplaying**: Vuelve a publicar el panel de reproducción\n\
         **/loop** `[mode]`: Repetición off / canción / cola\n\
         **/volume** `[0-200]`: Consulta o ajusta el volumen\n\
         **/shuffle**: Mezcla la cola\n\
         **/remove** `posición`: Elimina una canción de la cola\n\
         **/clear**: Vacía la cola",
    );
    respond_embed(ctx, &command, embed).await
}

// ---------- Componentes (botones) ----------

/// Maneja interacciones con los botones del panel y de la cola.
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &AriaMusicBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    // La sesión pudo terminar entre el render y el click
    if !bot.registry.has_session(guild_id) {
        component
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("Esta sesión de música ya terminó.")
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    }

    let custom_id = component.data.custom_id.clone();

    // Paginación de la cola
    if let Some((direction, rendered_page)) = buttons::parse_queue_button(&custom_id) {
        let valid_target = bot
            .registry
            .queue_message_ref(guild_id)
            .map(|r| r.message == component.message.id)
            .unwrap_or(false);
        if !valid_target {
            return reply_ephemeral_text(ctx, &component, "Este mensaje de cola quedó desactualizado.").await;
        }

        component.defer(&ctx.http).await?;
        // Un click sobre un render viejo se ignora en lugar de aplicarse
        let _ = bot
            .registry
            .turn_queue_page(guild_id, direction, rendered_page)
            .await;
        return Ok(());
    }

    // Controles del panel de reproducción
    let is_np_control = matches!(
        custom_id.as_str(),
        buttons::button_ids::NP_PAUSE_RESUME
            | buttons::button_ids::NP_SKIP
            | buttons::button_ids::NP_STOP
            | buttons::button_ids::NP_LOOP
    );
    if !is_np_control {
        return reply_ephemeral_text(ctx, &component, "Acción no reconocida.").await;
    }

    if require_same_channel(ctx, guild_id, component.user.id).await.is_err() {
        return reply_ephemeral_text(
            ctx,
            &component,
            "Debes estar en el mismo canal de voz que el bot para usar los controles.",
        )
        .await;
    }

    let valid_target = bot
        .registry
        .now_playing_ref(guild_id)
        .map(|r| r.message == component.message.id)
        .unwrap_or(false);
    if !valid_target {
        return reply_ephemeral_text(ctx, &component, "Este panel de reproducción quedó desactualizado.").await;
    }

    component.defer(&ctx.http).await?;

    let feedback = match custom_id.as_str() {
        buttons::button_ids::NP_PAUSE_RESUME => {
            let paused = bot
                .registry
                .render_state(guild_id)
                .await
                .map(|s| s.paused)
                .unwrap_or(false);
            if paused {
                match bot.registry.resume(guild_id).await {
                    Ok(true) => Some("▶️ Reanudado.".to_string()),
                    _ => Some("❌ No se pudo reanudar.".to_string()),
                }
            } else {
                match bot.registry.pause(guild_id).await {
                    Ok(true) => Some("⏸️ Pausado.".to_string()),
                    _ => Some("❌ No se pudo pausar.".to_string()),
                }
            }
        }
        buttons::button_ids::NP_SKIP => match bot.registry.skip(guild_id).await {
            Ok(skipped) => Some(format!("⏭️ Saltando **{}**...", skipped.title)),
            Err(_) => Some("No hay nada que saltar.".to_string()),
        },
        buttons::button_ids::NP_STOP => {
            let reason = format!("botón stop de {}", component.user.name);
            let _ = bot.registry.stop(guild_id, &reason).await;
            Some("⏹️ Reproducción detenida.".to_string())
        }
        buttons::button_ids::NP_LOOP => match bot.registry.cycle_loop(guild_id).await {
            Ok(mode) => Some(format!("Modo de repetición: {}.", mode.label())),
            Err(_) => None,
        },
        _ => None,
    };

    if let Some(feedback) = feedback {
        component
            .create_followup(
                &ctx.http,
                CreateInteractionResponseFollowup::new()
                    .content(feedback)
                    .ephemeral(true),
            )
            .await?;
    }

    Ok(())
}

async fn reply_ephemeral_text(
    ctx: &Context,
    component: &ComponentInteraction,
    text: &str,
) -> Result<()> {
    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(text)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}
