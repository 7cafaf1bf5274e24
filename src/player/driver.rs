//! Máquina de avance: decide qué suena a continuación en cada disparador
//! (fin de track, skip, encolado en reposo, error del motor).
//!
//! Hay a lo sumo un avance en vuelo por sesión; la guardia atómica de la
//! sesión descarta cualquier disparador redundante mientras tanto. Todo lo
//! demás se apoya en re-consultar el registro después de cada suspensión.

use serenity::model::id::GuildId;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::PlayerError;
use crate::player::queue::LoopMode;
use crate::player::transport::{perceptual_gain, PlaybackTransport};
use crate::player::{inactivity, PlayerRegistry};
use crate::ui::embeds;
use crate::ui::sync::{self, OutboundMessage};

impl PlayerRegistry {
    /// Selecciona y arranca el siguiente track de la sesión.
    ///
    /// No hace nada si ya hay un avance en vuelo o si la sesión no tiene
    /// transporte. Cualquier salida libera la guardia de reentrada.
    pub async fn advance(self: &Arc<Self>, guild_id: GuildId) {
        let Some(session) = self.get(guild_id) else {
            return;
        };
        let Some(guard) = session.begin_advance() else {
            return;
        };
        let Some(transport) = session.with_state(|s| s.transport.clone()) else {
            debug!("[{}] advance sin transporte, se ignora", guild_id);
            return;
        };

        session.cancel_idle_timer();

        // El mensaje de now playing anterior se retira antes de publicar
        // el del siguiente track
        sync::retire_now_playing(self.messenger(), &session).await;

        // Política de selección: loop de canción re-elige la actual; loop de
        // cola la reinserta al final antes de sacar la nueva cabeza
        let (selected, volume) = session.with_state(|s| {
            let next = if s.loop_mode == LoopMode::Track && s.current.is_some() {
                s.current.clone()
            } else {
                if s.loop_mode == LoopMode::Queue {
                    if let Some(current) = s.current.take() {
                        s.queue.requeue(current);
                    }
                }
                s.queue.pop_front()
            };
            (next, s.volume)
        });

        let Some(track) = selected else {
            // Cola agotada: la sesión queda en reposo con el timer largo armado
            info!("[{}] 📭 cola agotada, sesión en reposo", guild_id);
            session.with_state(|s| s.current = None);
            sync::refresh_queue_message(self.messenger(), &session).await;
            inactivity::arm(self, guild_id, self.config().idle_timeout);
            return;
        };

        session.with_state(|s| s.current = Some(track.clone()));
        info!("[{}] 🎵 iniciando: {}", guild_id, track.title);

        let started = match self.resolver().stream_source(&track).await {
            Ok(source) => {
                transport
                    .start(
                        &source,
                        perceptual_gain(volume),
                        self.config().play_start_timeout,
                    )
                    .await
            }
            Err(e) => Err(PlayerError::from(e)),
        };

        match started {
            Ok(()) => {
                // La sesión pudo destruirse mientras arrancaba el stream
                let Some(session) = self.get(guild_id) else {
                    return;
                };
                sync::publish_now_playing(self.messenger(), &session).await;
                sync::refresh_queue_message(self.messenger(), &session).await;
            }
            Err(err) => {
                warn!("[{}] fallo al iniciar {}: {}", guild_id, track.title, err);
                if let Some(session) = self.get(guild_id) {
                    let channel = session.with_state(|s| {
                        s.current = None;
                        s.status_channel
                    });
                    let notice = embeds::error_embed(&format!(
                        "❌ No se pudo reproducir **{}**. Saltando. {}",
                        track.title, err
                    ));
                    if let Err(e) = self
                        .messenger()
                        .send(channel, OutboundMessage::embed(notice))
                        .await
                    {
                        warn!("[{}] no se pudo reportar el fallo: {}", guild_id, e);
                    }
                }
                // La guardia se suelta antes de programar el reintento; el
                // único límite es que la cola se agote
                drop(guard);
                self.spawn_advance(guild_id, Some(self.config().retry_delay));
            }
        }
    }

    /// Programa un avance en segundo plano, con retraso opcional.
    pub fn spawn_advance(self: &Arc<Self>, guild_id: GuildId, delay: Option<Duration>) {
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(registry) = registry.upgrade() {
                registry.advance(guild_id).await;
            }
        });
    }

    /// Reentrada disparada por el transporte al quedar en reposo.
    ///
    /// `from_playing` indica que venía de un estado de reproducción genuino
    /// (fin natural del track o skip). En los demás casos solo se avanza si
    /// hay cola pendiente y nadie más está avanzando; con la cola vacía se
    /// (re)arma el timer de inactividad.
    pub async fn on_playback_idle(self: &Arc<Self>, guild_id: GuildId, from_playing: bool) {
        let Some(session) = self.get(guild_id) else {
            return;
        };

        let (has_current, queue_empty) =
            session.with_state(|s| (s.current.is_some(), s.queue.is_empty()));

        if from_playing && has_current {
            self.advance(guild_id).await;
        } else if !has_current && !queue_empty && !session.is_busy() {
            self.advance(guild_id).await;
        } else if !has_current && queue_empty {
            inactivity::arm(self, guild_id, self.config().idle_timeout);
        }
    }

    /// Error asíncrono del motor de audio: reporta, descarta el track
    /// vigente y reintenta tras el retraso corto.
    pub async fn on_transport_error(self: &Arc<Self>, guild_id: GuildId) {
        let Some(session) = self.get(guild_id) else {
            return;
        };

        let (channel, failed) = session.with_state(|s| (s.status_channel, s.current.take()));
        if let Some(failed) = failed {
            let notice = embeds::error_embed(&format!(
                "❌ Error del reproductor con **{}**. Saltando.",
                failed.title
            ));
            if let Err(e) = self
                .messenger()
                .send(channel, OutboundMessage::embed(notice))
                .await
            {
                warn!("[{}] no se pudo reportar el error del motor: {}", guild_id, e);
            }
        }

        self.spawn_advance(guild_id, Some(self.config().retry_delay));
    }
}

#[cfg(test)]
mod tests {
    use crate::player::fakes::{harness, seed_session, track, Harness};
    use crate::player::queue::LoopMode;
    use crate::player::transport::perceptual_gain;
    use crate::player::PageTurn;
    use crate::ui::buttons::PageDirection;
    use pretty_assertions::assert_eq;
    use serenity::model::id::{ChannelId, GuildId, UserId};
    use std::time::Duration;

    const GUILD: GuildId = GuildId::new(7);

    async fn advance(h: &Harness) {
        h.registry.advance(GUILD).await;
    }

    #[tokio::test]
    async fn avance_con_guardia_tomada_es_noop() {
        let h = harness();
        let session = seed_session(&h, GUILD, vec![track("a", 180)], None);

        let _guard = session.begin_advance().expect("guardia libre");
        advance(&h).await;

        assert!(h.transport.started().is_empty(), "no debe arrancar nada");
        assert_eq!(session.with_state(|s| s.queue.len()), 1);
    }

    #[tokio::test]
    async fn dos_senales_de_fin_concurrentes_producen_un_solo_avance() {
        let h = harness();
        h.transport.set_start_delay(Duration::from_millis(100));
        seed_session(&h, GUILD, vec![track("b", 200), track("c", 90)], Some(track("a", 180)));

        let r1 = h.registry.clone();
        let r2 = h.registry.clone();
        let t1 = tokio::spawn(async move { r1.on_playback_idle(GUILD, true).await });
        let t2 = tokio::spawn(async move { r2.on_playback_idle(GUILD, true).await });
        let _ = tokio::join!(t1, t2);

        let started = h.transport.started();
        assert_eq!(started.len(), 1, "exactamente una transición de track");
        assert_eq!(started[0].0, "fake://b");
    }

    #[tokio::test]
    async fn loop_de_cancion_reelige_sin_achicar_la_cola() {
        let h = harness();
        let session = seed_session(&h, GUILD, vec![track("b", 200)], Some(track("a", 180)));
        session.with_state(|s| s.loop_mode = LoopMode::Track);

        for _ in 0..3 {
            h.registry.on_playback_idle(GUILD, true).await;
        }

        let started = h.transport.started();
        assert_eq!(started.len(), 3);
        assert!(started.iter().all(|(url, _)| url == "fake://a"));
        assert_eq!(session.with_state(|s| s.queue.len()), 1, "la cola no se achica");
    }

    #[tokio::test]
    async fn loop_de_cola_reproduce_a_b_a_y_deja_b_en_cola() {
        let h = harness();
        let session = seed_session(&h, GUILD, vec![track("a", 180), track("b", 200)], None);
        session.with_state(|s| s.loop_mode = LoopMode::Queue);

        advance(&h).await; // arranca a
        h.registry.on_playback_idle(GUILD, true).await; // a termina → b
        h.registry.on_playback_idle(GUILD, true).await; // b termina → a

        let started: Vec<String> = h.transport.started().into_iter().map(|(u, _)| u).collect();
        assert_eq!(started, vec!["fake://a", "fake://b", "fake://a"]);

        let remaining: Vec<String> =
            session.with_state(|s| s.queue.iter().map(|t| t.title.clone()).collect());
        assert_eq!(remaining, vec!["b"], "tras el tercer avance la cola vuelve a [b]");
    }

    #[tokio::test]
    async fn loop_de_cola_da_la_vuelta_completa_en_n_avances() {
        // Estado estable: sonando a, cola [b, c]. Tras tantos avances como
        // tracks hay en el ciclo, todo vuelve a su orden original.
        let h = harness();
        let session = seed_session(&h, GUILD, vec![track("b", 60), track("c", 60)], Some(track("a", 60)));
        session.with_state(|s| s.loop_mode = LoopMode::Queue);

        for _ in 0..3 {
            h.registry.on_playback_idle(GUILD, true).await;
        }

        assert_eq!(
            session.with_state(|s| s.current.as_ref().map(|t| t.title.clone())),
            Some("a".into())
        );
        let remaining: Vec<String> =
            session.with_state(|s| s.queue.iter().map(|t| t.title.clone()).collect());
        assert_eq!(remaining, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn el_volumen_fijado_en_reposo_se_aplica_al_proximo_track() {
        let h = harness();
        seed_session(&h, GUILD, vec![track("a", 180)], None);

        h.registry.set_volume(GUILD, 150).await.expect("sesión viva");
        advance(&h).await;

        let started = h.transport.started();
        assert_eq!(started.len(), 1);
        let (_, gain) = started[0].clone();
        assert!((gain - perceptual_gain(150)).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn avance_con_cola_vacia_arma_el_timer_largo_y_no_publica() {
        let h = harness();
        let session = seed_session(&h, GUILD, vec![], None);

        advance(&h).await;

        assert!(session.with_state(|s| s.current.is_none()));
        assert!(session.with_state(|s| s.idle_timer.is_some()), "timer largo armado");
        assert!(h.transport.started().is_empty());
        // Sin track actual ni cola no se publica mensaje alguno
        assert!(h.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn un_fallo_de_inicio_reporta_y_reintenta_con_el_siguiente() {
        let h = harness();
        let session = seed_session(&h, GUILD, vec![track("a", 180), track("b", 200)], None);
        h.transport.fail_next_starts(1);

        advance(&h).await;
        // El reintento corre en segundo plano tras el retraso corto
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started: Vec<String> = h.transport.started().into_iter().map(|(u, _)| u).collect();
        assert_eq!(started, vec!["fake://b"], "a falló, b arrancó");
        assert_eq!(session.with_state(|s| s.current.as_ref().map(|t| t.title.clone())), Some("b".into()));

        let reports = h.messenger.sent();
        assert!(!reports.is_empty(), "el fallo se reporta al canal de estado");
    }

    #[tokio::test]
    async fn una_cola_enteramente_fallida_se_agota_y_queda_en_reposo() {
        let h = harness();
        let session = seed_session(&h, GUILD, vec![track("a", 1), track("b", 1), track("c", 1)], None);
        h.transport.fail_next_starts(usize::MAX);

        advance(&h).await;
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(session.with_state(|s| s.queue.is_empty()), "cada track se intentó una vez");
        assert!(session.with_state(|s| s.current.is_none()));
        assert!(session.with_state(|s| s.idle_timer.is_some()), "reposo con timer armado");
    }

    #[tokio::test]
    async fn teardown_es_idempotente() {
        let h = harness();
        seed_session(&h, GUILD, vec![track("a", 180)], Some(track("b", 200)));

        h.registry.teardown(GUILD, "prueba").await;
        assert!(!h.registry.has_session(GUILD));
        let destroys = h.transport.destroy_count();

        // Segundo llamado: no hay sesión, no hay efectos nuevos
        h.registry.teardown(GUILD, "prueba repetida").await;
        assert_eq!(h.transport.destroy_count(), destroys);

        // Y concurrente sobre una sesión fresca: una sola limpieza efectiva
        seed_session(&h, GUILD, vec![], None);
        let r1 = h.registry.clone();
        let r2 = h.registry.clone();
        let _ = tokio::join!(
            tokio::spawn(async move { r1.teardown(GUILD, "carrera 1").await }),
            tokio::spawn(async move { r2.teardown(GUILD, "carrera 2").await }),
        );
        assert!(!h.registry.has_session(GUILD));
    }

    #[tokio::test]
    async fn el_avance_retira_el_mensaje_de_now_playing_anterior() {
        let h = harness();
        let session = seed_session(&h, GUILD, vec![track("b", 200)], Some(track("a", 180)));
        let old_ref = h.messenger.fabricate_ref(ChannelId::new(99));
        session.with_state(|s| s.now_playing_msg = Some(old_ref.clone()));

        h.registry.on_playback_idle(GUILD, true).await;

        assert!(h.messenger.deleted().contains(&old_ref), "el viejo se borra");
        let new_ref = session.with_state(|s| s.now_playing_msg.clone());
        assert!(new_ref.is_some() && new_ref.as_ref() != Some(&old_ref));
    }

    #[tokio::test]
    async fn click_de_paginacion_viejo_se_ignora() {
        let h = harness();
        let tracks = (0..25).map(|i| track(&format!("t{i}"), 60)).collect();
        seed_session(&h, GUILD, tracks, None);

        let turn = h
            .registry
            .turn_queue_page(GUILD, PageDirection::Next, 0)
            .await
            .unwrap();
        assert_eq!(turn, PageTurn::Applied(1));

        // Botón renderizado para la página 0, pero el cursor ya está en 1
        let stale = h
            .registry
            .turn_queue_page(GUILD, PageDirection::Next, 0)
            .await
            .unwrap();
        assert_eq!(stale, PageTurn::Stale);

        let state = h.registry.render_state(GUILD).await.unwrap();
        assert_eq!(state.page, 1, "el click viejo no movió el cursor");
    }

    #[tokio::test]
    async fn encolar_en_reposo_arranca_la_reproduccion() {
        let h = harness();

        let receipt = h
            .registry
            .enqueue(GUILD, ChannelId::new(11), ChannelId::new(99), UserId::new(42), "lofi beats")
            .await
            .expect("enqueue");
        assert_eq!(receipt.position, 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let started = h.transport.started();
        assert_eq!(started.len(), 1);
        assert_eq!(h.connector.connect_count(), 1, "la conexión de voz es perezosa");
    }

    #[tokio::test]
    async fn el_contenido_en_vivo_se_rechaza() {
        let h = harness();
        let result = h
            .registry
            .enqueue(GUILD, ChannelId::new(11), ChannelId::new(99), UserId::new(42), "live:concierto")
            .await;

        assert!(matches!(
            result,
            Err(crate::error::PlayerError::Resolution(
                crate::error::ResolveError::LiveNotSupported
            ))
        ));
    }

    #[tokio::test]
    async fn el_avance_cancela_el_timer_de_inactividad() {
        let h = harness();
        let session = seed_session(&h, GUILD, vec![track("a", 180)], None);
        crate::player::inactivity::arm(&h.registry, GUILD, Duration::from_secs(300));
        assert!(session.with_state(|s| s.idle_timer.is_some()));

        advance(&h).await;

        assert!(
            session.with_state(|s| s.idle_timer.is_none()),
            "reproducir de nuevo desarma el timer"
        );
    }
}
