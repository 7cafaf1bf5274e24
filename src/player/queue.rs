use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serenity::model::id::UserId;
use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use crate::error::PlayerError;
use crate::sources::ResolvedMedia;

/// Canciones mostradas por página en el mensaje de cola.
pub const TRACKS_PER_PAGE: usize = 10;

/// Cómo se resolvió el pedido original.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOrigin {
    Url,
    Search,
}

/// Metadatos inmutables de una canción en cola.
#[derive(Debug, Clone)]
pub struct Track {
    pub title: String,
    pub url: String,
    pub thumbnail: Option<String>,
    /// `None` cuando la duración es desconocida.
    pub duration: Option<Duration>,
    pub requested_by: UserId,
    pub origin: TrackOrigin,
    #[allow(dead_code)]
    pub added_at: DateTime<Utc>,
}

impl Track {
    pub fn new(media: ResolvedMedia, requested_by: UserId) -> Self {
        Self {
            title: media.title,
            url: media.canonical_url,
            thumbnail: media.thumbnail,
            duration: media.duration,
            requested_by,
            origin: media.origin,
            added_at: Utc::now(),
        }
    }
}

/// Modo de repetición de la sesión.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Off,
    Track,
    Queue,
}

impl LoopMode {
    /// Ciclo off → track → queue → off, usado cuando `/loop` llega sin modo.
    pub fn next(self) -> Self {
        match self {
            LoopMode::Off => LoopMode::Track,
            LoopMode::Track => LoopMode::Queue,
            LoopMode::Queue => LoopMode::Off,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LoopMode::Off => "desactivado",
            LoopMode::Track => "canción",
            LoopMode::Queue => "cola",
        }
    }
}

/// Cola FIFO de una sesión, con tope de capacidad.
#[derive(Debug)]
pub struct TrackQueue {
    items: VecDeque<Track>,
    max_size: usize,
}

impl TrackQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Agrega un track al final. Devuelve la posición 1-based dentro de la cola.
    pub fn enqueue(&mut self, track: Track) -> Result<usize, PlayerError> {
        if self.items.len() >= self.max_size {
            return Err(PlayerError::QueueFull(self.max_size));
        }

        info!("➕ Agregado a la cola: {}", track.title);
        self.items.push_back(track);
        Ok(self.items.len())
    }

    /// Reinserta un track al final sin chequear capacidad.
    ///
    /// Usado por el loop de cola: el track que vuelve acaba de salir de la
    /// sesión, así que la reinserción nunca debe fallar.
    pub fn requeue(&mut self, track: Track) {
        debug!("🔁 Track reinsertado al final por loop de cola: {}", track.title);
        self.items.push_back(track);
    }

    /// Saca y devuelve el primer track, o `None` si la cola está vacía.
    pub fn pop_front(&mut self) -> Option<Track> {
        self.items.pop_front()
    }

    /// Elimina el track en la posición 1-based dada.
    pub fn remove_at(&mut self, position: usize) -> Result<Track, PlayerError> {
        if position == 0 || position > self.items.len() {
            return Err(PlayerError::InvalidPosition(self.items.len()));
        }

        // La posición fue validada, remove no puede fallar
        let removed = self
            .items
            .remove(position - 1)
            .ok_or(PlayerError::InvalidPosition(self.items.len()))?;
        debug!("❌ Track eliminado en posición {}: {}", position, removed.title);
        Ok(removed)
    }

    /// Permutación in-place de Fisher–Yates sobre toda la cola.
    pub fn shuffle(&mut self) {
        let mut rng = rand::thread_rng();
        self.items.make_contiguous().shuffle(&mut rng);
        info!("🔀 Cola mezclada ({} canciones)", self.items.len());
    }

    /// Vacía la cola y devuelve cuántos tracks había.
    pub fn clear(&mut self) -> usize {
        let cleared = self.items.len();
        self.items.clear();
        info!("🗑️ Cola limpiada ({} canciones)", cleared);
        cleared
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.max_size
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Total de páginas para el mensaje de cola, siempre al menos 1.
    pub fn total_pages(&self) -> usize {
        if self.items.is_empty() {
            1
        } else {
            self.items.len().div_ceil(TRACKS_PER_PAGE)
        }
    }

    /// Tracks de la página 0-based dada (ya clampeada por el llamador).
    pub fn page(&self, page: usize) -> Vec<Track> {
        let start = page * TRACKS_PER_PAGE;
        let end = (start + TRACKS_PER_PAGE).min(self.items.len());
        if start >= self.items.len() {
            return Vec::new();
        }
        self.items.range(start..end).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn track(title: &str) -> Track {
        Track {
            title: title.to_string(),
            url: format!("https://youtu.be/{title}"),
            thumbnail: None,
            duration: Some(Duration::from_secs(180)),
            requested_by: UserId::new(42),
            origin: TrackOrigin::Search,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn enqueue_falla_exactamente_en_la_101() {
        let mut queue = TrackQueue::new(100);

        for i in 0..100 {
            let pos = queue.enqueue(track(&format!("t{i}"))).expect("debería caber");
            assert_eq!(pos, i + 1);
        }

        match queue.enqueue(track("t100")) {
            Err(PlayerError::QueueFull(100)) => {}
            other => panic!("se esperaba QueueFull, llegó {other:?}"),
        }
        assert_eq!(queue.len(), 100);
    }

    #[test]
    fn remove_at_fuera_de_rango_no_muta() {
        let mut queue = TrackQueue::new(100);
        queue.enqueue(track("a")).unwrap();
        queue.enqueue(track("b")).unwrap();

        for pos in [0, 3, 99] {
            match queue.remove_at(pos) {
                Err(PlayerError::InvalidPosition(2)) => {}
                other => panic!("se esperaba InvalidPosition(2), llegó {other:?}"),
            }
        }
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.iter().map(|t| t.title.as_str()).collect::<Vec<_>>(), ["a", "b"]);
    }

    #[test]
    fn remove_at_es_1_based() {
        let mut queue = TrackQueue::new(100);
        queue.enqueue(track("a")).unwrap();
        queue.enqueue(track("b")).unwrap();
        queue.enqueue(track("c")).unwrap();

        let removed = queue.remove_at(2).unwrap();
        assert_eq!(removed.title, "b");
        assert_eq!(queue.iter().map(|t| t.title.as_str()).collect::<Vec<_>>(), ["a", "c"]);
    }

    #[test]
    fn shuffle_preserva_el_multiconjunto() {
        let mut queue = TrackQueue::new(100);
        for i in 0..20 {
            queue.enqueue(track(&format!("t{i}"))).unwrap();
        }

        let mut before: Vec<String> = queue.iter().map(|t| t.title.clone()).collect();
        queue.shuffle();
        let mut after: Vec<String> = queue.iter().map(|t| t.title.clone()).collect();

        before.sort();
        after.sort();
        assert_eq!(before, after);
    }

    #[test]
    fn shuffle_es_aproximadamente_uniforme() {
        // Con 3 elementos hay 6 permutaciones; sobre 6000 corridas cada una
        // debería aparecer ~1000 veces. Cotas laxas para no ser flaky.
        const RUNS: usize = 6000;
        let mut counts: HashMap<Vec<String>, usize> = HashMap::new();

        for _ in 0..RUNS {
            let mut queue = TrackQueue::new(10);
            for name in ["a", "b", "c"] {
                queue.enqueue(track(name)).unwrap();
            }
            queue.shuffle();
            let order: Vec<String> = queue.iter().map(|t| t.title.clone()).collect();
            *counts.entry(order).or_default() += 1;
        }

        assert_eq!(counts.len(), 6, "deberían aparecer las 6 permutaciones");
        for (order, count) in counts {
            assert!(
                (700..=1300).contains(&count),
                "permutación {order:?} apareció {count} veces, fuera del rango esperado"
            );
        }
    }

    #[test]
    fn clear_devuelve_el_conteo_previo() {
        let mut queue = TrackQueue::new(100);
        for i in 0..7 {
            queue.enqueue(track(&format!("t{i}"))).unwrap();
        }

        assert_eq!(queue.clear(), 7);
        assert!(queue.is_empty());
        assert_eq!(queue.clear(), 0);
    }

    #[test]
    fn requeue_ignora_la_capacidad() {
        let mut queue = TrackQueue::new(1);
        queue.enqueue(track("a")).unwrap();
        queue.requeue(track("b"));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn paginacion_clampeada() {
        let mut queue = TrackQueue::new(100);
        assert_eq!(queue.total_pages(), 1);
        assert!(queue.page(0).is_empty());

        for i in 0..25 {
            queue.enqueue(track(&format!("t{i}"))).unwrap();
        }
        assert_eq!(queue.total_pages(), 3);
        assert_eq!(queue.page(0).len(), 10);
        assert_eq!(queue.page(2).len(), 5);
        assert!(queue.page(3).is_empty());
        assert_eq!(queue.page(1)[0].title, "t10");
    }
}
