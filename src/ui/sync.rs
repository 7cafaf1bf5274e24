//! Sincronización de los mensajes acompañantes de una sesión.
//!
//! Cada sesión mantiene a lo sumo un mensaje de "reproduciendo ahora" y un
//! mensaje de cola. Las referencias se limpian ANTES de iniciar cualquier
//! borrado asíncrono, para que una ruta concurrente nunca vea un puntero
//! a un mensaje que está por desaparecer. Un "mensaje no encontrado" al
//! editar o borrar se traga y solo limpia la referencia.

use async_trait::async_trait;
use serenity::builder::{CreateActionRow, CreateEmbed, CreateMessage, EditMessage};
use serenity::http::Http;
use serenity::model::id::{ChannelId, MessageId};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::error::MessageError;
use crate::player::queue::{LoopMode, Track};
use crate::player::session::Session;
use crate::player::transport::PlaybackTransport;
use crate::ui::{buttons, embeds};

/// Referencia a un mensaje que este bot publicó.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub channel: ChannelId,
    pub message: MessageId,
}

/// Contenido saliente: embeds más filas de componentes.
#[derive(Debug, Clone, Default)]
pub struct OutboundMessage {
    pub embeds: Vec<CreateEmbed>,
    pub components: Vec<CreateActionRow>,
}

impl OutboundMessage {
    pub fn embed(embed: CreateEmbed) -> Self {
        Self {
            embeds: vec![embed],
            components: Vec::new(),
        }
    }

    pub fn with_components(mut self, components: Vec<CreateActionRow>) -> Self {
        self.components = components;
        self
    }
}

/// Mensajería de chat vista desde el núcleo.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(
        &self,
        channel: ChannelId,
        content: OutboundMessage,
    ) -> Result<MessageRef, MessageError>;

    async fn edit(&self, target: &MessageRef, content: OutboundMessage)
        -> Result<(), MessageError>;

    /// Borrar un mensaje ya borrado devuelve `MessageError::NotFound`.
    async fn delete(&self, target: &MessageRef) -> Result<(), MessageError>;
}

// ---------- Vistas ----------

/// Snapshot de lo que muestra el embed de "reproduciendo ahora".
pub struct NowPlayingView {
    pub track: Track,
    pub loop_mode: LoopMode,
    pub volume: u16,
    pub queue_len: usize,
    pub paused: bool,
    pub elapsed: Option<Duration>,
}

/// Snapshot de una página del mensaje de cola.
pub struct QueueView {
    pub current: Option<Track>,
    pub items: Vec<Track>,
    pub page: usize,
    pub total_pages: usize,
    pub total: usize,
}

async fn now_playing_view(session: &Session) -> Option<(ChannelId, NowPlayingView)> {
    let (track, loop_mode, volume, queue_len, channel, transport) = session.with_state(|s| {
        (
            s.current.clone(),
            s.loop_mode,
            s.volume,
            s.queue.len(),
            s.status_channel,
            s.transport.clone(),
        )
    });

    let track = track?;
    let (paused, elapsed) = match transport {
        Some(t) => (t.is_paused().await, t.elapsed().await),
        None => (false, None),
    };

    Some((
        channel,
        NowPlayingView {
            track,
            loop_mode,
            volume,
            queue_len,
            paused,
            elapsed,
        },
    ))
}

fn queue_view(session: &Session) -> (ChannelId, Option<MessageRef>, QueueView) {
    session.with_state(|s| {
        s.clamp_queue_page();
        (
            s.status_channel,
            s.queue_msg.clone(),
            QueueView {
                current: s.current.clone(),
                items: s.queue.page(s.queue_page),
                page: s.queue_page,
                total_pages: s.queue.total_pages(),
                total: s.queue.len(),
            },
        )
    })
}

fn queue_message(view: &QueueView) -> OutboundMessage {
    let components = if view.total_pages > 1 {
        vec![buttons::queue_pagination(view.page, view.total_pages)]
    } else {
        Vec::new()
    };
    OutboundMessage::embed(embeds::queue_overview(view)).with_components(components)
}

// ---------- Reconciliación ----------

/// Retira el mensaje de "reproduciendo ahora" vigente, si existe.
pub async fn retire_now_playing(messenger: &dyn Messenger, session: &Session) {
    let old = session.with_state(|s| s.now_playing_msg.take());
    if let Some(old) = old {
        swallow_delete(messenger, session, &old, "now playing").await;
    }
}

/// Retira el mensaje de cola vigente, si existe.
pub async fn retire_queue_message(messenger: &dyn Messenger, session: &Session) {
    let old = session.with_state(|s| s.queue_msg.take());
    if let Some(old) = old {
        swallow_delete(messenger, session, &old, "cola").await;
    }
}

async fn swallow_delete(
    messenger: &dyn Messenger,
    session: &Session,
    target: &MessageRef,
    label: &str,
) {
    match messenger.delete(target).await {
        Ok(()) | Err(MessageError::NotFound) => {}
        Err(e) => warn!(
            "[{}] no se pudo borrar el mensaje de {}: {}",
            session.guild_id(),
            label,
            e
        ),
    }
}

/// Publica un mensaje de "reproduciendo ahora" nuevo y guarda la referencia.
pub async fn publish_now_playing(messenger: &dyn Messenger, session: &Session) {
    let Some((channel, view)) = now_playing_view(session).await else {
        return;
    };

    let content = OutboundMessage::embed(embeds::now_playing(&view))
        .with_components(vec![buttons::now_playing_controls(view.paused, view.loop_mode)]);

    match messenger.send(channel, content).await {
        Ok(message) => session.with_state(|s| s.now_playing_msg = Some(message)),
        Err(e) => warn!(
            "[{}] no se pudo publicar el mensaje de now playing: {}",
            session.guild_id(),
            e
        ),
    }
}

/// Re-renderiza el mensaje de "reproduciendo ahora": edita el existente o
/// publica uno nuevo si no hay.
pub async fn refresh_now_playing(messenger: &dyn Messenger, session: &Session) {
    let existing = session.with_state(|s| s.now_playing_msg.clone());
    let Some(existing) = existing else {
        publish_now_playing(messenger, session).await;
        return;
    };

    let Some((_, view)) = now_playing_view(session).await else {
        return;
    };

    let content = OutboundMessage::embed(embeds::now_playing(&view))
        .with_components(vec![buttons::now_playing_controls(view.paused, view.loop_mode)]);

    match messenger.edit(&existing, content).await {
        Ok(()) => {}
        Err(MessageError::NotFound) => {
            session.with_state(|s| {
                if s.now_playing_msg.as_ref() == Some(&existing) {
                    s.now_playing_msg = None;
                }
            });
        }
        Err(e) => warn!(
            "[{}] no se pudo editar el mensaje de now playing: {}",
            session.guild_id(),
            e
        ),
    }
}

/// Re-renderiza el mensaje de cola desde el estado actual.
///
/// Edita en el lugar; si no hay mensaje vivo, publica uno solo cuando hay
/// algo que mostrar (track actual o cola no vacía).
pub async fn refresh_queue_message(messenger: &dyn Messenger, session: &Session) {
    let (channel, existing, view) = queue_view(session);
    let content = queue_message(&view);

    match existing {
        Some(existing) => match messenger.edit(&existing, content).await {
            Ok(()) => {}
            Err(MessageError::NotFound) => {
                session.with_state(|s| {
                    if s.queue_msg.as_ref() == Some(&existing) {
                        s.queue_msg = None;
                    }
                });
            }
            Err(e) => warn!(
                "[{}] no se pudo actualizar el mensaje de cola: {}",
                session.guild_id(),
                e
            ),
        },
        None => {
            if view.current.is_some() || view.total > 0 {
                match messenger.send(channel, content).await {
                    Ok(message) => session.with_state(|s| s.queue_msg = Some(message)),
                    Err(e) => warn!(
                        "[{}] no se pudo publicar el mensaje de cola: {}",
                        session.guild_id(),
                        e
                    ),
                }
            }
        }
    }
}

// ---------- Adaptador serenity ----------

pub struct SerenityMessenger {
    http: Arc<Http>,
}

impl SerenityMessenger {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

/// Código JSON de Discord para "Unknown Message".
const UNKNOWN_MESSAGE: isize = 10008;

fn map_serenity_error(err: serenity::Error) -> MessageError {
    if let serenity::Error::Http(serenity::http::HttpError::UnsuccessfulRequest(resp)) = &err {
        if resp.error.code == UNKNOWN_MESSAGE {
            return MessageError::NotFound;
        }
    }
    MessageError::Other(err.to_string())
}

#[async_trait]
impl Messenger for SerenityMessenger {
    async fn send(
        &self,
        channel: ChannelId,
        content: OutboundMessage,
    ) -> Result<MessageRef, MessageError> {
        let message = channel
            .send_message(
                &self.http,
                CreateMessage::new()
                    .embeds(content.embeds)
                    .components(content.components),
            )
            .await
            .map_err(map_serenity_error)?;

        Ok(MessageRef {
            channel,
            message: message.id,
        })
    }

    async fn edit(
        &self,
        target: &MessageRef,
        content: OutboundMessage,
    ) -> Result<(), MessageError> {
        target
            .channel
            .edit_message(
                &self.http,
                target.message,
                EditMessage::new()
                    .embeds(content.embeds)
                    .components(content.components),
            )
            .await
            .map_err(map_serenity_error)?;
        Ok(())
    }

    async fn delete(&self, target: &MessageRef) -> Result<(), MessageError> {
        target
            .channel
            .delete_message(&self.http, target.message)
            .await
            .map_err(map_serenity_error)
    }
}
