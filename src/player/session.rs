use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::Config;
use crate::player::queue::{LoopMode, Track, TrackQueue};
use crate::player::transport::PlaybackTransport;
use crate::ui::sync::MessageRef;

/// Estado mutable de una sesión.
///
/// Se muta únicamente bajo el mutex síncrono de [`Session`], que nunca se
/// retiene a través de un `await`: cada handler toma el lock, aplica su
/// cambio y lo suelta antes de volver a suspender.
pub struct SessionState {
    pub transport: Option<Arc<dyn PlaybackTransport>>,
    pub queue: TrackQueue,
    pub current: Option<Track>,
    pub loop_mode: LoopMode,
    /// Porcentaje 0-200, persiste entre tracks.
    pub volume: u16,
    /// Último canal de texto desde el que se usó un comando.
    pub status_channel: ChannelId,
    /// A lo sumo un timer de inactividad pendiente; rearmar aborta el previo.
    pub idle_timer: Option<JoinHandle<()>>,
    pub now_playing_msg: Option<MessageRef>,
    pub queue_msg: Option<MessageRef>,
    /// Cursor 0-based de paginación del mensaje de cola.
    pub queue_page: usize,
}

impl SessionState {
    /// Reajusta el cursor de página a los límites actuales de la cola.
    pub fn clamp_queue_page(&mut self) {
        let last = self.queue.total_pages() - 1;
        if self.queue_page > last {
            self.queue_page = last;
        }
    }
}

/// Sesión de reproducción de una guild.
pub struct Session {
    guild_id: GuildId,
    state: Mutex<SessionState>,
    /// Guardia de reentrada: true mientras un `advance` está en vuelo.
    busy: AtomicBool,
}

impl Session {
    pub fn new(guild_id: GuildId, status_channel: ChannelId, config: &Config) -> Self {
        Self {
            guild_id,
            state: Mutex::new(SessionState {
                transport: None,
                queue: TrackQueue::new(config.max_queue_size),
                current: None,
                loop_mode: LoopMode::Off,
                volume: config.default_volume,
                status_channel,
                idle_timer: None,
                now_playing_msg: None,
                queue_msg: None,
                queue_page: 0,
            }),
            busy: AtomicBool::new(false),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Acceso exclusivo y síncrono al estado.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        f(&mut self.state.lock())
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Intenta tomar la guardia de avance. `None` si ya hay uno en vuelo.
    ///
    /// La guardia libera el flag al soltarse, incluyendo retornos tempranos
    /// y rutas de error.
    pub fn begin_advance(self: &Arc<Self>) -> Option<AdvanceGuard> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(AdvanceGuard {
                session: self.clone(),
            })
        } else {
            debug!("[{}] advance descartado: ya hay uno en vuelo", self.guild_id);
            None
        }
    }

    /// Aborta el timer de inactividad pendiente, si existe.
    pub fn cancel_idle_timer(&self) {
        let timer = self.with_state(|s| s.idle_timer.take());
        if let Some(timer) = timer {
            timer.abort();
        }
    }
}

/// Libera el flag `busy` de la sesión al soltarse.
pub struct AdvanceGuard {
    session: Arc<Session>,
}

impl Drop for AdvanceGuard {
    fn drop(&mut self) {
        self.session.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Arc<Session> {
        Arc::new(Session::new(
            GuildId::new(1),
            ChannelId::new(2),
            &Config::default(),
        ))
    }

    #[test]
    fn la_guardia_es_exclusiva_y_se_libera_al_soltar() {
        let session = session();

        let guard = session.begin_advance().expect("primera toma");
        assert!(session.is_busy());
        assert!(session.begin_advance().is_none(), "no debe haber dos en vuelo");

        drop(guard);
        assert!(!session.is_busy());
        assert!(session.begin_advance().is_some());
    }

    #[test]
    fn el_cursor_de_pagina_se_clampa() {
        let session = session();
        session.with_state(|s| {
            s.queue_page = 9;
            s.clamp_queue_page();
            assert_eq!(s.queue_page, 0, "cola vacía ⇒ una sola página");
        });
    }
}
