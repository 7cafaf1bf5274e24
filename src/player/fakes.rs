//! Colaboradores falsos para las pruebas del driver: transporte, conexión,
//! resolución y mensajería en memoria.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{MessageError, PlayerError, ResolveError};
use crate::player::queue::{Track, TrackOrigin};
use crate::player::session::Session;
use crate::player::transport::{PlaybackTransport, VoiceConnector};
use crate::player::PlayerRegistry;
use crate::sources::{MediaResolver, ResolvedMedia, StreamSource};
use crate::ui::sync::{MessageRef, Messenger, OutboundMessage};

pub(crate) fn track(title: &str, secs: u64) -> Track {
    Track {
        title: title.to_string(),
        url: format!("fake://{title}"),
        thumbnail: None,
        duration: Some(Duration::from_secs(secs)),
        requested_by: UserId::new(42),
        origin: TrackOrigin::Search,
        added_at: chrono::Utc::now(),
    }
}

#[derive(Default)]
pub(crate) struct FakeTransport {
    started: Mutex<Vec<(String, f32)>>,
    start_delay: Mutex<Duration>,
    fail_next: AtomicUsize,
    paused: AtomicBool,
    destroyed: AtomicUsize,
    stopped: AtomicUsize,
}

impl FakeTransport {
    pub(crate) fn started(&self) -> Vec<(String, f32)> {
        self.started.lock().clone()
    }

    pub(crate) fn set_start_delay(&self, delay: Duration) {
        *self.start_delay.lock() = delay;
    }

    pub(crate) fn fail_next_starts(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub(crate) fn destroy_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub(crate) fn stop_count(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaybackTransport for FakeTransport {
    async fn start(
        &self,
        source: &StreamSource,
        gain: f32,
        _confirm_timeout: Duration,
    ) -> Result<(), PlayerError> {
        let delay = *self.start_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let pending_failures = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or(0);
        if pending_failures > 0 {
            return Err(PlayerError::TransportPlayback("fallo simulado".into()));
        }

        self.paused.store(false, Ordering::SeqCst);
        self.started.lock().push((source.url.clone(), gain));
        Ok(())
    }

    async fn pause(&self) -> bool {
        !self.paused.swap(true, Ordering::SeqCst)
    }

    async fn resume(&self) -> bool {
        self.paused.swap(false, Ordering::SeqCst)
    }

    async fn stop(&self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }

    async fn set_gain(&self, _gain: f32) -> bool {
        true
    }

    async fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    async fn elapsed(&self) -> Option<Duration> {
        Some(Duration::from_secs(30))
    }

    async fn destroy(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    fn is_alive(&self) -> bool {
        true
    }
}

pub(crate) struct FakeConnector {
    transport: Arc<FakeTransport>,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub(crate) fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceConnector for FakeConnector {
    async fn connect(
        &self,
        _guild_id: GuildId,
        _channel_id: ChannelId,
    ) -> Result<Arc<dyn PlaybackTransport>, PlayerError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.transport.clone())
    }
}

/// Resuelve cualquier consulta a un medio determinista. Las consultas con
/// prefijo `live:` se reportan como transmisiones en vivo.
pub(crate) struct FakeResolver;

#[async_trait]
impl MediaResolver for FakeResolver {
    async fn resolve(&self, query: &str) -> Result<ResolvedMedia, ResolveError> {
        Ok(ResolvedMedia {
            title: query.to_string(),
            canonical_url: format!("fake://{query}"),
            thumbnail: None,
            duration: Some(Duration::from_secs(180)),
            is_live: query.starts_with("live:"),
            origin: TrackOrigin::Search,
        })
    }

    async fn stream_source(&self, track: &Track) -> Result<StreamSource, ResolveError> {
        Ok(StreamSource {
            url: track.url.clone(),
        })
    }
}

#[derive(Default)]
pub(crate) struct FakeMessenger {
    sent: Mutex<Vec<(ChannelId, OutboundMessage)>>,
    edited: Mutex<Vec<MessageRef>>,
    deleted: Mutex<Vec<MessageRef>>,
    next_id: AtomicU64,
}

impl FakeMessenger {
    pub(crate) fn sent(&self) -> Vec<(ChannelId, OutboundMessage)> {
        self.sent.lock().clone()
    }

    #[allow(dead_code)]
    pub(crate) fn edited(&self) -> Vec<MessageRef> {
        self.edited.lock().clone()
    }

    pub(crate) fn deleted(&self) -> Vec<MessageRef> {
        self.deleted.lock().clone()
    }

    /// Crea una referencia como si este messenger la hubiera emitido antes.
    pub(crate) fn fabricate_ref(&self, channel: ChannelId) -> MessageRef {
        MessageRef {
            channel,
            message: MessageId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
        }
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn send(
        &self,
        channel: ChannelId,
        content: OutboundMessage,
    ) -> Result<MessageRef, MessageError> {
        self.sent.lock().push((channel, content));
        Ok(self.fabricate_ref(channel))
    }

    async fn edit(
        &self,
        target: &MessageRef,
        _content: OutboundMessage,
    ) -> Result<(), MessageError> {
        self.edited.lock().push(target.clone());
        Ok(())
    }

    async fn delete(&self, target: &MessageRef) -> Result<(), MessageError> {
        self.deleted.lock().push(target.clone());
        Ok(())
    }
}

pub(crate) struct Harness {
    pub(crate) registry: Arc<PlayerRegistry>,
    pub(crate) transport: Arc<FakeTransport>,
    pub(crate) connector: Arc<FakeConnector>,
    pub(crate) messenger: Arc<FakeMessenger>,
}

pub(crate) fn harness() -> Harness {
    let config = Arc::new(Config {
        retry_delay: Duration::from_millis(10),
        ..Config::default()
    });

    let transport = Arc::new(FakeTransport::default());
    let connector = Arc::new(FakeConnector {
        transport: transport.clone(),
        connects: AtomicUsize::new(0),
    });
    let messenger = Arc::new(FakeMessenger::default());

    let registry = Arc::new(PlayerRegistry::new(
        config,
        connector.clone(),
        Arc::new(FakeResolver),
        messenger.clone(),
    ));

    Harness {
        registry,
        transport,
        connector,
        messenger,
    }
}

/// Crea una sesión con transporte falso, cola inicial y track en curso.
pub(crate) fn seed_session(
    harness: &Harness,
    guild_id: GuildId,
    tracks: Vec<Track>,
    current: Option<Track>,
) -> Arc<Session> {
    let session = harness.registry.ensure(guild_id, ChannelId::new(99));
    session.with_state(|s| {
        s.transport = Some(harness.transport.clone());
        for t in tracks {
            s.queue
                .enqueue(t)
                .expect("la cola de prueba no debería llenarse");
        }
        s.current = current;
    });
    session
}
