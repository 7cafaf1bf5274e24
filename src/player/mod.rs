//! Núcleo de reproducción: una sesión por guild, su cola y su ciclo de vida.

use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod driver;
pub mod inactivity;
pub mod queue;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod fakes;

use crate::config::Config;
use crate::error::{MessageError, PlayerError, ResolveError};
use crate::player::queue::{LoopMode, Track};
use crate::player::session::Session;
use crate::player::transport::{perceptual_gain, PlaybackTransport, VoiceConnector};
use crate::sources::MediaResolver;
use crate::ui::buttons::PageDirection;
use crate::ui::sync::{self, Messenger};

/// Resultado de encolar un track.
#[derive(Debug, Clone)]
pub struct EnqueueReceipt {
    pub track: Track,
    /// Posición 1-based contando el track en reproducción.
    pub position: usize,
}

/// Snapshot del estado visible de una sesión, para la capa de UI.
pub struct RenderState {
    pub current: Option<Track>,
    pub page_items: Vec<Track>,
    pub page: usize,
    pub total_pages: usize,
    pub queued: usize,
    pub loop_mode: LoopMode,
    pub volume: u16,
    pub paused: bool,
}

/// Resultado de un click de paginación.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTurn {
    Applied(usize),
    /// El botón fue renderizado para otra página; se ignora.
    Stale,
}

/// Registro global de sesiones: la única autoridad sobre cada guild.
pub struct PlayerRegistry {
    sessions: DashMap<GuildId, Arc<Session>>,
    connector: Arc<dyn VoiceConnector>,
    resolver: Arc<dyn MediaResolver>,
    messenger: Arc<dyn Messenger>,
    config: Arc<Config>,
}

impl PlayerRegistry {
    pub fn new(
        config: Arc<Config>,
        connector: Arc<dyn VoiceConnector>,
        resolver: Arc<dyn MediaResolver>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            connector,
            resolver,
            messenger,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn messenger(&self) -> &dyn Messenger {
        self.messenger.as_ref()
    }

    pub(crate) fn resolver(&self) -> &dyn MediaResolver {
        self.resolver.as_ref()
    }

    /// Devuelve la sesión de la guild, o la crea con sus valores por defecto.
    ///
    /// El canal de estado se actualiza al canal más reciente desde el que se
    /// usó un comando.
    pub fn ensure(&self, guild_id: GuildId, status_channel: ChannelId) -> Arc<Session> {
        let session = self
            .sessions
            .entry(guild_id)
            .or_insert_with(|| {
                info!("[{}] sesión creada", guild_id);
                Arc::new(Session::new(guild_id, status_channel, &self.config))
            })
            .clone();

        session.with_state(|s| s.status_channel = status_channel);
        session
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<Session>> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }

    pub fn has_session(&self, guild_id: GuildId) -> bool {
        self.sessions.contains_key(&guild_id)
    }

    /// Referencia al mensaje de "reproduciendo ahora" vigente, si existe.
    pub fn now_playing_ref(&self, guild_id: GuildId) -> Option<sync::MessageRef> {
        self.get(guild_id)?.with_state(|s| s.now_playing_msg.clone())
    }

    /// Referencia al mensaje de cola vigente, si existe.
    pub fn queue_message_ref(&self, guild_id: GuildId) -> Option<sync::MessageRef> {
        self.get(guild_id)?.with_state(|s| s.queue_msg.clone())
    }

    /// Encola un pedido: asegura sesión y transporte, resuelve el medio y
    /// arranca la reproducción si no hay nada sonando.
    pub async fn enqueue(
        self: &Arc<Self>,
        guild_id: GuildId,
        voice_channel: ChannelId,
        text_channel: ChannelId,
        requester: UserId,
        query: &str,
    ) -> Result<EnqueueReceipt, PlayerError> {
        let session = self.ensure(guild_id, text_channel);

        // El tope de la cola se valida antes de pagar la resolución
        session.with_state(|s| {
            if s.queue.is_full() {
                Err(PlayerError::QueueFull(s.queue.capacity()))
            } else {
                Ok(())
            }
        })?;

        // Conexión de voz perezosa: solo si no hay transporte vivo
        let needs_join = session.with_state(|s| match &s.transport {
            Some(t) => !t.is_alive(),
            None => true,
        });

        if needs_join {
            let transport = self.connector.connect(guild_id, voice_channel).await?;
            match self.get(guild_id) {
                Some(session) => session.with_state(|s| s.transport = Some(transport)),
                None => {
                    // La sesión se destruyó mientras conectábamos
                    transport.destroy().await;
                    return Err(PlayerError::NoActiveSession);
                }
            }
        }

        let media = self.resolver.resolve(query).await?;
        if media.is_live {
            return Err(ResolveError::LiveNotSupported.into());
        }
        let track = Track::new(media, requester);

        // La resolución pudo tardar; la sesión debe seguir registrada
        let session = self.get(guild_id).ok_or(PlayerError::NoActiveSession)?;

        let (position, idle) = session.with_state(|s| {
            let in_queue = s.queue.enqueue(track.clone())?;
            let position = in_queue + usize::from(s.current.is_some());
            Ok::<_, PlayerError>((position, s.current.is_none()))
        })?;

        sync::refresh_queue_message(self.messenger(), &session).await;

        if idle && !session.is_busy() {
            self.spawn_advance(guild_id, None);
        }

        Ok(EnqueueReceipt { track, position })
    }

    /// Salta el track actual. El evento de fin del transporte dispara el
    /// avance al siguiente.
    pub async fn skip(&self, guild_id: GuildId) -> Result<Track, PlayerError> {
        let session = self.get(guild_id).ok_or(PlayerError::NoActiveSession)?;
        let (transport, current) =
            session.with_state(|s| (s.transport.clone(), s.current.clone()));

        let current = current.ok_or(PlayerError::NoActiveSession)?;
        let transport = transport.ok_or(PlayerError::NoActiveSession)?;

        info!("[{}] ⏭️ saltando: {}", guild_id, current.title);
        transport.stop().await;
        Ok(current)
    }

    /// Detiene todo y libera la sesión.
    pub async fn stop(&self, guild_id: GuildId, reason: &str) -> Result<(), PlayerError> {
        if !self.has_session(guild_id) {
            return Err(PlayerError::NoActiveSession);
        }
        self.teardown(guild_id, reason).await;
        Ok(())
    }

    /// Pausa la reproducción. `Ok(false)` si ya estaba pausada.
    pub async fn pause(&self, guild_id: GuildId) -> Result<bool, PlayerError> {
        let session = self.get(guild_id).ok_or(PlayerError::NoActiveSession)?;
        let (transport, has_current) =
            session.with_state(|s| (s.transport.clone(), s.current.is_some()));
        let transport = transport.filter(|_| has_current).ok_or(PlayerError::NoActiveSession)?;

        let changed = transport.pause().await;
        if changed {
            sync::refresh_now_playing(self.messenger(), &session).await;
        }
        Ok(changed)
    }

    /// Reanuda la reproducción. `Ok(false)` si no estaba pausada.
    pub async fn resume(&self, guild_id: GuildId) -> Result<bool, PlayerError> {
        let session = self.get(guild_id).ok_or(PlayerError::NoActiveSession)?;
        let transport = session
            .with_state(|s| s.transport.clone())
            .ok_or(PlayerError::NoActiveSession)?;

        let changed = transport.resume().await;
        if changed {
            sync::refresh_now_playing(self.messenger(), &session).await;
        }
        Ok(changed)
    }

    /// Fija el volumen (0-200 %). Persiste entre tracks; devuelve si además
    /// se aplicó al recurso en vivo.
    pub async fn set_volume(&self, guild_id: GuildId, percent: u16) -> Result<bool, PlayerError> {
        let session = self.get(guild_id).ok_or(PlayerError::NoActiveSession)?;
        let percent = percent.min(200);

        let (transport, has_current) = session.with_state(|s| {
            s.volume = percent;
            (s.transport.clone(), s.current.is_some())
        });

        let applied_live = match transport {
            Some(t) if has_current => t.set_gain(perceptual_gain(percent)).await,
            _ => false,
        };

        info!("[{}] 🔊 volumen fijado en {}%", guild_id, percent);
        if has_current {
            sync::refresh_now_playing(self.messenger(), &session).await;
        }
        Ok(applied_live)
    }

    pub fn volume(&self, guild_id: GuildId) -> Result<u16, PlayerError> {
        let session = self.get(guild_id).ok_or(PlayerError::NoActiveSession)?;
        Ok(session.with_state(|s| s.volume))
    }

    /// Fija el modo de repetición.
    pub async fn set_loop(&self, guild_id: GuildId, mode: LoopMode) -> Result<LoopMode, PlayerError> {
        let session = self.get(guild_id).ok_or(PlayerError::NoActiveSession)?;
        session.with_state(|s| s.loop_mode = mode);
        info!("[{}] 🔁 modo de repetición: {}", guild_id, mode.label());
        sync::refresh_now_playing(self.messenger(), &session).await;
        Ok(mode)
    }

    /// Cicla off → canción → cola → off.
    pub async fn cycle_loop(&self, guild_id: GuildId) -> Result<LoopMode, PlayerError> {
        let session = self.get(guild_id).ok_or(PlayerError::NoActiveSession)?;
        let mode = session.with_state(|s| {
            s.loop_mode = s.loop_mode.next();
            s.loop_mode
        });
        info!("[{}] 🔁 modo de repetición: {}", guild_id, mode.label());
        sync::refresh_now_playing(self.messenger(), &session).await;
        Ok(mode)
    }

    /// Mezcla la cola. Devuelve cuántos tracks había; con menos de 2 no hace
    /// nada.
    pub async fn shuffle(&self, guild_id: GuildId) -> Result<usize, PlayerError> {
        let session = self.get(guild_id).ok_or(PlayerError::NoActiveSession)?;
        let len = session.with_state(|s| {
            let len = s.queue.len();
            if len >= 2 {
                s.queue.shuffle();
            }
            len
        });
        if len >= 2 {
            sync::refresh_queue_message(self.messenger(), &session).await;
        }
        Ok(len)
    }

    /// Elimina el track en la posición 1-based dada.
    pub async fn remove_at(&self, guild_id: GuildId, position: usize) -> Result<Track, PlayerError> {
        let session = self.get(guild_id).ok_or(PlayerError::NoActiveSession)?;
        let removed = session.with_state(|s| s.queue.remove_at(position))?;
        sync::refresh_queue_message(self.messenger(), &session).await;
        Ok(removed)
    }

    /// Vacía la cola y devuelve cuántos tracks había.
    pub async fn clear_queue(&self, guild_id: GuildId) -> Result<usize, PlayerError> {
        let session = self.get(guild_id).ok_or(PlayerError::NoActiveSession)?;
        let cleared = session.with_state(|s| s.queue.clear());
        sync::refresh_queue_message(self.messenger(), &session).await;
        Ok(cleared)
    }

    /// Snapshot del estado visible para comandos de consulta.
    pub async fn render_state(&self, guild_id: GuildId) -> Result<RenderState, PlayerError> {
        let session = self.get(guild_id).ok_or(PlayerError::NoActiveSession)?;

        let (current, page_items, page, total_pages, queued, loop_mode, volume, transport) =
            session.with_state(|s| {
                s.clamp_queue_page();
                (
                    s.current.clone(),
                    s.queue.page(s.queue_page),
                    s.queue_page,
                    s.queue.total_pages(),
                    s.queue.len(),
                    s.loop_mode,
                    s.volume,
                    s.transport.clone(),
                )
            });

        let paused = match transport {
            Some(t) => t.is_paused().await,
            None => false,
        };

        Ok(RenderState {
            current,
            page_items,
            page,
            total_pages,
            queued,
            loop_mode,
            volume,
            paused,
        })
    }

    /// Aplica un click de paginación, solo si el botón corresponde a la
    /// página vigente.
    pub async fn turn_queue_page(
        &self,
        guild_id: GuildId,
        direction: PageDirection,
        rendered_page: usize,
    ) -> Result<PageTurn, PlayerError> {
        let session = self.get(guild_id).ok_or(PlayerError::NoActiveSession)?;

        let applied = session.with_state(|s| {
            s.clamp_queue_page();
            if s.queue_page != rendered_page {
                return None;
            }
            let last = s.queue.total_pages() - 1;
            s.queue_page = match direction {
                PageDirection::Next => (s.queue_page + 1).min(last),
                PageDirection::Prev => s.queue_page.saturating_sub(1),
            };
            Some(s.queue_page)
        });

        match applied {
            Some(page) => {
                sync::refresh_queue_message(self.messenger(), &session).await;
                Ok(PageTurn::Applied(page))
            }
            None => {
                debug!(
                    "[{}] click de paginación ignorado (render viejo: página {})",
                    guild_id, rendered_page
                );
                Ok(PageTurn::Stale)
            }
        }
    }

    /// Reemplaza el mensaje de cola por uno nuevo en el canal dado,
    /// reiniciando la paginación. `Ok(false)` si no hay nada que mostrar.
    pub async fn repost_queue_message(
        &self,
        guild_id: GuildId,
        channel: ChannelId,
    ) -> Result<bool, PlayerError> {
        let session = self.ensure(guild_id, channel);

        sync::retire_queue_message(self.messenger(), &session).await;
        let has_content =
            session.with_state(|s| {
                s.queue_page = 0;
                s.current.is_some() || !s.queue.is_empty()
            });

        if !has_content {
            return Ok(false);
        }

        sync::refresh_queue_message(self.messenger(), &session).await;
        Ok(true)
    }

    /// Reemplaza el mensaje de "reproduciendo ahora" por uno nuevo.
    /// `Ok(false)` si no hay track en reproducción.
    pub async fn repost_now_playing(&self, guild_id: GuildId) -> Result<bool, PlayerError> {
        let session = self.get(guild_id).ok_or(PlayerError::NoActiveSession)?;

        sync::retire_now_playing(self.messenger(), &session).await;
        if session.with_state(|s| s.current.is_none()) {
            return Ok(false);
        }

        sync::publish_now_playing(self.messenger(), &session).await;
        Ok(true)
    }

    /// Libera todos los recursos de la sesión y la saca del registro.
    ///
    /// Idempotente: la entrada se toma del registro de forma atómica, así
    /// que un segundo llamado (incluso concurrente) no encuentra nada que
    /// limpiar. Ningún fallo parcial bloquea el resto de la limpieza.
    pub async fn teardown(&self, guild_id: GuildId, reason: &str) {
        let Some((_, session)) = self.sessions.remove(&guild_id) else {
            debug!("[{}] teardown sin sesión registrada, nada que hacer", guild_id);
            return;
        };

        info!("[{}] liberando sesión: {}", guild_id, reason);

        session.cancel_idle_timer();

        // Referencias limpiadas antes de cualquier borrado asíncrono
        let (transport, now_playing, queue_msg) = session.with_state(|s| {
            (s.transport.take(), s.now_playing_msg.take(), s.queue_msg.take())
        });

        if let Some(transport) = &transport {
            transport.stop().await;
        }

        for target in [now_playing, queue_msg].into_iter().flatten() {
            match self.messenger.delete(&target).await {
                Ok(()) | Err(MessageError::NotFound) => {}
                Err(e) => warn!("[{}] fallo al borrar mensaje durante teardown: {}", guild_id, e),
            }
        }

        if let Some(transport) = transport {
            transport.destroy().await;
        }

        info!("[{}] sesión eliminada del registro", guild_id);
    }
}
