//! Enlace con el transporte de audio.
//!
//! El núcleo solo conoce [`PlaybackTransport`] y [`VoiceConnector`]; la
//! implementación de producción envuelve la conexión de Songbird y el
//! `TrackHandle` vigente.

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::HttpRequest,
    tracks::{PlayMode, ReadyState, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::PlayerError;
use crate::player::PlayerRegistry;
use crate::sources::StreamSource;

/// Curva perceptual de volumen: porcentaje 0-200 → ganancia del motor.
///
/// Potencia 1.660964, la misma curva "logarítmica" que aplicaba la
/// librería de voz original. 100 % ≡ ganancia 1.0.
pub fn perceptual_gain(percent: u16) -> f32 {
    let normalized = percent.min(200) as f32 / 100.0;
    normalized.powf(1.660_964)
}

/// Capacidad de reproducción que el driver recibe de forma opaca.
#[async_trait]
pub trait PlaybackTransport: Send + Sync {
    /// Entrega un recurso al motor y espera, acotado, la confirmación de
    /// que empezó a sonar de verdad.
    async fn start(
        &self,
        source: &StreamSource,
        gain: f32,
        confirm_timeout: Duration,
    ) -> Result<(), PlayerError>;

    /// Pausa. Devuelve false si no había nada que pausar.
    async fn pause(&self) -> bool;

    /// Reanuda. Devuelve false si no estaba pausado.
    async fn resume(&self) -> bool;

    async fn stop(&self);

    /// Ajusta la ganancia del recurso vigente. False si no hay recurso.
    async fn set_gain(&self, gain: f32) -> bool;

    async fn is_paused(&self) -> bool;

    /// Tiempo reproducido del track vigente.
    async fn elapsed(&self) -> Option<Duration>;

    /// Libera la conexión. Idempotente.
    async fn destroy(&self);

    fn is_alive(&self) -> bool;
}

/// Establece la conexión de voz de una guild y devuelve su transporte.
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn PlaybackTransport>, PlayerError>;
}

// ---------- Implementación Songbird ----------

pub struct SongbirdConnector {
    manager: Arc<Songbird>,
    http_client: reqwest::Client,
    registry: Weak<PlayerRegistry>,
    join_timeout: Duration,
}

impl SongbirdConnector {
    pub fn new(
        manager: Arc<Songbird>,
        http_client: reqwest::Client,
        registry: Weak<PlayerRegistry>,
        join_timeout: Duration,
    ) -> Self {
        Self {
            manager,
            http_client,
            registry,
            join_timeout,
        }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn PlaybackTransport>, PlayerError> {
        let call = match tokio::time::timeout(
            self.join_timeout,
            self.manager.join(guild_id, channel_id),
        )
        .await
        {
            Ok(Ok(call)) => call,
            Ok(Err(e)) => return Err(PlayerError::TransportJoin(e.to_string())),
            Err(_) => {
                return Err(PlayerError::TransportJoin(
                    "la conexión de voz no quedó lista a tiempo".into(),
                ))
            }
        };

        {
            // Reconexiones sobre el mismo Call no deben duplicar handlers
            let mut call_lock = call.lock().await;
            call_lock.remove_all_global_events();
            call_lock.add_global_event(
                Event::Track(TrackEvent::End),
                TrackEndHandler {
                    guild_id,
                    registry: self.registry.clone(),
                },
            );
            call_lock.add_global_event(
                Event::Track(TrackEvent::Error),
                TrackErrorHandler {
                    guild_id,
                    registry: self.registry.clone(),
                },
            );
        }

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);

        Ok(Arc::new(SongbirdTransport {
            guild_id,
            call,
            manager: self.manager.clone(),
            http_client: self.http_client.clone(),
            handle: SyncMutex::new(None),
            dead: AtomicBool::new(false),
        }))
    }
}

pub struct SongbirdTransport {
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
    manager: Arc<Songbird>,
    http_client: reqwest::Client,
    /// Handle del track vigente en el motor.
    handle: SyncMutex<Option<TrackHandle>>,
    dead: AtomicBool,
}

impl SongbirdTransport {
    fn current_handle(&self) -> Option<TrackHandle> {
        self.handle.lock().clone()
    }
}

#[async_trait]
impl PlaybackTransport for SongbirdTransport {
    async fn start(
        &self,
        source: &StreamSource,
        gain: f32,
        confirm_timeout: Duration,
    ) -> Result<(), PlayerError> {
        let input = HttpRequest::new(self.http_client.clone(), source.url.clone());

        let handle = {
            let mut call = self.call.lock().await;
            call.play_input(input.into())
        };

        // El volumen de la sesión se aplica antes de que suene el primer frame
        let _ = handle.set_volume(gain);
        *self.handle.lock() = Some(handle.clone());

        let deadline = tokio::time::Instant::now() + confirm_timeout;
        loop {
            match handle.get_info().await {
                Ok(info) => match info.playing {
                    PlayMode::Play if matches!(info.ready, ReadyState::Playable) => {
                        return Ok(());
                    }
                    PlayMode::Play | PlayMode::Pause => {}
                    _ => {
                        return Err(PlayerError::TransportPlayback(
                            "el motor de audio rechazó el track".into(),
                        ));
                    }
                },
                Err(e) => {
                    return Err(PlayerError::TransportPlayback(format!(
                        "el track se descartó antes de iniciar: {e}"
                    )));
                }
            }

            if tokio::time::Instant::now() >= deadline {
                let _ = handle.stop();
                return Err(PlayerError::TransportPlayback(
                    "el motor de audio no confirmó la reproducción a tiempo".into(),
                ));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn pause(&self) -> bool {
        let Some(handle) = self.current_handle() else {
            return false;
        };
        match handle.get_info().await {
            Ok(info) if matches!(info.playing, PlayMode::Play) => handle.pause().is_ok(),
            _ => false,
        }
    }

    async fn resume(&self) -> bool {
        let Some(handle) = self.current_handle() else {
            return false;
        };
        match handle.get_info().await {
            Ok(info) if matches!(info.playing, PlayMode::Pause) => handle.play().is_ok(),
            _ => false,
        }
    }

    async fn stop(&self) {
        if let Some(handle) = self.current_handle() {
            let _ = handle.stop();
        }
    }

    async fn set_gain(&self, gain: f32) -> bool {
        self.current_handle()
            .map(|h| h.set_volume(gain).is_ok())
            .unwrap_or(false)
    }

    async fn is_paused(&self) -> bool {
        let Some(handle) = self.current_handle() else {
            return false;
        };
        handle
            .get_info()
            .await
            .map(|info| matches!(info.playing, PlayMode::Pause))
            .unwrap_or(false)
    }

    async fn elapsed(&self) -> Option<Duration> {
        let handle = self.current_handle()?;
        handle.get_info().await.ok().map(|info| info.position)
    }

    async fn destroy(&self) {
        if self.dead.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.manager.remove(self.guild_id).await {
            debug!("[{}] la conexión ya estaba cerrada: {}", self.guild_id, e);
        }
    }

    fn is_alive(&self) -> bool {
        !self.dead.load(Ordering::Acquire) && self.manager.get(self.guild_id).is_some()
    }
}

/// Reinyecta el fin de un track en el driver.
struct TrackEndHandler {
    guild_id: GuildId,
    registry: Weak<PlayerRegistry>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndHandler {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        debug!("[{}] track terminado, evaluando siguiente", self.guild_id);
        if let Some(registry) = self.registry.upgrade() {
            registry.on_playback_idle(self.guild_id, true).await;
        }
        None
    }
}

/// Reporta errores del motor y dispara el reintento diferido.
struct TrackErrorHandler {
    guild_id: GuildId,
    registry: Weak<PlayerRegistry>,
}

#[async_trait]
impl VoiceEventHandler for TrackErrorHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                error!("❌ Error del motor de audio en guild {}: {:?}", self.guild_id, state.playing);
            }
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.on_transport_error(self.guild_id).await;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn la_curva_de_volumen_es_perceptual() {
        assert_eq!(perceptual_gain(0), 0.0);
        assert!((perceptual_gain(100) - 1.0).abs() < f32::EPSILON);

        // 50 % queda muy por debajo de la mitad lineal
        let half = perceptual_gain(50);
        assert!(half > 0.2 && half < 0.4, "ganancia a 50 %: {half}");

        // 150 % amplifica y 200+ se clampa
        assert!(perceptual_gain(150) > 1.9);
        assert_eq!(perceptual_gain(200), perceptual_gain(250));
    }
}
