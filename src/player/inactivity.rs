//! Timer de inactividad: un único disparo diferido por sesión.
//!
//! Rearmar siempre reemplaza (aborta) el timer anterior. Al dispararse, la
//! sesión se re-resuelve por guild: si ya fue destruida, el timer muere en
//! silencio.

use serenity::model::id::GuildId;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::player::transport::PlaybackTransport;
use crate::player::PlayerRegistry;
use crate::ui::embeds;
use crate::ui::sync::OutboundMessage;

/// Arma (o rearma) el timer de la sesión con el timeout dado.
pub fn arm(registry: &Arc<PlayerRegistry>, guild_id: GuildId, timeout: Duration) {
    let Some(session) = registry.get(guild_id) else {
        return;
    };

    debug!("[{}] timer de inactividad armado ({:?})", guild_id, timeout);

    let weak = Arc::downgrade(registry);
    let handle = tokio::spawn(async move {
        tokio::time::sleep(timeout).await;

        let Some(registry) = weak.upgrade() else {
            return;
        };
        let Some(session) = registry.get(guild_id) else {
            return; // la sesión ya fue destruida
        };

        let transport_live = session.with_state(|s| {
            s.transport.as_ref().map(|t| t.is_alive()).unwrap_or(false)
        });
        if !transport_live {
            return;
        }

        info!("[{}] ⏰ inactividad agotada, saliendo del canal", guild_id);
        let channel = session.with_state(|s| s.status_channel);
        let farewell = embeds::simple_embed("👋 Salí del canal de voz por inactividad.");
        let _ = registry
            .messenger()
            .send(channel, OutboundMessage::embed(farewell))
            .await;

        registry.teardown(guild_id, "tiempo de inactividad agotado").await;
    });

    session.with_state(|s| {
        if let Some(previous) = s.idle_timer.replace(handle) {
            previous.abort();
        }
    });
}

/// Desarma el timer pendiente de la sesión, si existe.
pub fn disarm(registry: &PlayerRegistry, guild_id: GuildId) {
    if let Some(session) = registry.get(guild_id) {
        session.cancel_idle_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::fakes::{harness, seed_session, track};
    use serenity::model::id::GuildId;

    const GUILD: GuildId = GuildId::new(7);

    #[tokio::test]
    async fn al_dispararse_avisa_y_destruye_la_sesion() {
        let h = harness();
        seed_session(&h, GUILD, vec![], None);

        arm(&h.registry, GUILD, Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(!h.registry.has_session(GUILD), "la sesión se destruyó");
        assert_eq!(h.transport.destroy_count(), 1);
        assert!(
            !h.messenger.sent().is_empty(),
            "se notificó la despedida al canal de estado"
        );
    }

    #[tokio::test]
    async fn rearmar_reemplaza_el_timer_anterior() {
        let h = harness();
        let session = seed_session(&h, GUILD, vec![], None);

        arm(&h.registry, GUILD, Duration::from_millis(30));
        // El rearme con un timeout largo supera al disparo corto pendiente
        arm(&h.registry, GUILD, Duration::from_secs(300));
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(h.registry.has_session(GUILD), "el timer corto fue abortado");
        assert!(session.with_state(|s| s.idle_timer.is_some()));
    }

    #[tokio::test]
    async fn desarmar_cancela_el_disparo() {
        let h = harness();
        let session = seed_session(&h, GUILD, vec![track("a", 60)], None);

        arm(&h.registry, GUILD, Duration::from_millis(30));
        disarm(&h.registry, GUILD);
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(h.registry.has_session(GUILD));
        assert!(session.with_state(|s| s.idle_timer.is_none()));
    }

    #[tokio::test]
    async fn un_disparo_sobre_sesion_destruida_es_noop() {
        let h = harness();
        seed_session(&h, GUILD, vec![], None);

        arm(&h.registry, GUILD, Duration::from_millis(30));
        h.registry.teardown(GUILD, "antes del disparo").await;
        tokio::time::sleep(Duration::from_millis(120)).await;

        // Solo el teardown explícito destruyó el transporte
        assert_eq!(h.transport.destroy_count(), 1);
    }
}
