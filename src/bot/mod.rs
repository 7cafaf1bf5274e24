//! Superficie de Discord: registro de comandos, despacho de interacciones
//! y vigilancia de los estados de voz.
//!
//! Toda la lógica de reproducción vive en [`crate::player`]; este módulo
//! solo traduce eventos de la gateway a operaciones del registro y errores
//! a embeds. El despacho externo atrapa cualquier fallo: un comando roto se
//! loguea y responde un aviso genérico, nunca tira el proceso.

use serenity::{
    all::{ChannelId, Context, EventHandler, GatewayIntents, GuildId, Interaction, Ready, VoiceState},
    async_trait,
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage},
    gateway::ActivityData,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{config::Config, player::inactivity, player::PlayerRegistry, ui::embeds};

/// Intents mínimos que necesita el bot.
pub fn gateway_intents() -> GatewayIntents {
    GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES | GatewayIntents::GUILD_MESSAGES
}

/// Handler principal de eventos de Discord.
pub struct AriaMusicBot {
    config: Arc<Config>,
    pub registry: Arc<PlayerRegistry>,
}

impl AriaMusicBot {
    pub fn new(config: Arc<Config>, registry: Arc<PlayerRegistry>) -> Self {
        Self { config, registry }
    }

    async fn register_commands(&self, ctx: &Context) -> anyhow::Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                commands::register_guild_commands(ctx, guild_id).await?;
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await?;
            }
        }

        info!("✅ Comandos registrados");
        Ok(())
    }

    /// Cuenta los miembros humanos en un canal de voz, según el caché.
    fn non_bot_members(ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> Option<usize> {
        let guild = ctx.cache.guild(guild_id)?;
        let channel = guild.channels.get(&channel_id)?;
        let members = channel.members(&ctx.cache).ok()?;
        Some(members.iter().filter(|m| !m.user.bot).count())
    }
}

#[async_trait]
impl EventHandler for AriaMusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        ctx.set_activity(Some(ActivityData::playing("música | /help")));
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => {
                let fallback = command.clone();
                if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                    error!("Error manejando comando: {:?}", e);
                    // Aviso genérico; si ya se respondió, este intento falla
                    // en silencio
                    let _ = fallback
                        .create_response(
                            &ctx.http,
                            CreateInteractionResponse::Message(
                                CreateInteractionResponseMessage::new()
                                    .embed(embeds::error_embed(
                                        "Ocurrió un error al ejecutar ese comando.",
                                    ))
                                    .ephemeral(true),
                            ),
                        )
                        .await;
                }
            }
            Interaction::Component(component) => {
                if let Err(e) = handlers::handle_component(&ctx, component, self).await {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Vigila los estados de voz para el ciclo de vida de la sesión:
    /// expulsión del bot ⇒ teardown; canal vacío de humanos ⇒ timer corto;
    /// alguien vuelve ⇒ el timer se desarma.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id.or_else(|| old.as_ref().and_then(|o| o.guild_id)) else {
            return;
        };

        // El propio bot fue desconectado del canal
        let bot_id = ctx.cache.current_user().id;
        if new.user_id == bot_id {
            if old.as_ref().and_then(|o| o.channel_id).is_some() && new.channel_id.is_none() {
                info!("🔌 Bot desconectado del canal de voz en guild {}", guild_id);
                self.registry
                    .teardown(guild_id, "bot desconectado del canal de voz")
                    .await;
            }
            return;
        }

        if !self.registry.has_session(guild_id) {
            return;
        }

        let Some(bot_channel) = handlers::bot_channel_for(&ctx, guild_id).await else {
            return;
        };

        let old_channel = old.as_ref().and_then(|o| o.channel_id);
        let left_bot_channel = old_channel == Some(bot_channel) && new.channel_id != Some(bot_channel);
        let joined_bot_channel = new.channel_id == Some(bot_channel) && old_channel != Some(bot_channel);

        if left_bot_channel {
            match Self::non_bot_members(&ctx, guild_id, bot_channel) {
                Some(0) => {
                    info!(
                        "🚪 Canal de voz {} vacío en guild {}, armando timer corto",
                        bot_channel, guild_id
                    );
                    inactivity::arm(
                        &self.registry,
                        guild_id,
                        self.config.empty_channel_timeout,
                    );
                }
                Some(_) => {}
                None => warn!("[{}] no se pudo contar miembros del canal {}", guild_id, bot_channel),
            }
        } else if joined_bot_channel {
            info!(
                "👥 Usuario volvió al canal {} en guild {}, desarmando timer",
                bot_channel, guild_id
            );
            inactivity::disarm(&self.registry, guild_id);
        }
    }
}
