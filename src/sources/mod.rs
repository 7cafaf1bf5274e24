//! Resolución de medios: de una URL o término de búsqueda a un
//! descriptor reproducible.
//!
//! El núcleo de reproducción solo conoce el trait [`MediaResolver`];
//! la implementación de producción ([`ytdlp::YtDlpResolver`]) delega en
//! el binario `yt-dlp`.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::ResolveError;
use crate::player::queue::{Track, TrackOrigin};

pub mod ytdlp;

/// Metadatos de un medio ya resuelto.
#[derive(Debug, Clone)]
pub struct ResolvedMedia {
    pub title: String,
    pub canonical_url: String,
    pub thumbnail: Option<String>,
    /// `None` cuando la fuente no reporta duración.
    pub duration: Option<Duration>,
    pub is_live: bool,
    pub origin: TrackOrigin,
}

/// Recurso listo para entregar al transporte de audio.
#[derive(Debug, Clone)]
pub struct StreamSource {
    pub url: String,
}

#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Resuelve una URL o término de búsqueda a sus metadatos.
    async fn resolve(&self, query: &str) -> Result<ResolvedMedia, ResolveError>;

    /// Obtiene el recurso de streaming para un track ya resuelto.
    async fn stream_source(&self, track: &Track) -> Result<StreamSource, ResolveError>;
}

/// Distingue URLs de términos de búsqueda libres.
pub fn is_url(query: &str) -> bool {
    url::Url::parse(query)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detecta_urls_y_busquedas() {
        assert!(is_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_url("http://youtu.be/abc"));
        assert!(!is_url("never gonna give you up"));
        assert!(!is_url("ftp://example.com/file"));
    }
}
