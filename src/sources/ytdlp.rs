//! Resolución vía el binario `yt-dlp`.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::ResolveError;
use crate::player::queue::{Track, TrackOrigin};
use crate::sources::{is_url, MediaResolver, ResolvedMedia, StreamSource};

/// Salida de `yt-dlp --dump-json`, solo los campos que usamos.
#[derive(Debug, Deserialize)]
struct VideoInfo {
    title: String,
    webpage_url: String,
    thumbnail: Option<String>,
    duration: Option<f64>,
    #[serde(default)]
    is_live: bool,
}

pub struct YtDlpResolver;

impl YtDlpResolver {
    pub fn new() -> Self {
        Self
    }

    /// Verifica que yt-dlp esté instalado y sea invocable.
    pub async fn verify_dependencies() -> anyhow::Result<()> {
        let output = tokio::process::Command::new("yt-dlp")
            .arg("--version")
            .output()
            .await?;

        if !output.status.success() {
            anyhow::bail!("yt-dlp no está disponible en el PATH");
        }

        let version = String::from_utf8_lossy(&output.stdout);
        info!("✅ yt-dlp disponible: {}", version.trim());
        Ok(())
    }

    async fn dump_json(&self, target: &str) -> Result<VideoInfo, ResolveError> {
        let output = tokio::process::Command::new("yt-dlp")
            .args([
                "--dump-json",
                "--no-playlist",
                "--socket-timeout",
                "30",
                "--retries",
                "3",
                target,
            ])
            .output()
            .await
            .map_err(|e| ResolveError::Generic(format!("no se pudo ejecutar yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| ResolveError::Generic(format!("respuesta de yt-dlp inválida: {e}")))
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<ResolvedMedia, ResolveError> {
        let (target, origin) = if is_url(query) {
            (query.to_string(), TrackOrigin::Url)
        } else {
            (format!("ytsearch1:{query}"), TrackOrigin::Search)
        };

        debug!("🔍 Resolviendo: {}", target);
        let info = self.dump_json(&target).await?;

        if info.is_live {
            return Err(ResolveError::LiveNotSupported);
        }

        Ok(ResolvedMedia {
            title: info.title,
            canonical_url: info.webpage_url,
            thumbnail: info.thumbnail,
            duration: info
                .duration
                .filter(|d| *d > 0.0)
                .map(Duration::from_secs_f64),
            is_live: info.is_live,
            origin,
        })
    }

    async fn stream_source(&self, track: &Track) -> Result<StreamSource, ResolveError> {
        let output = tokio::process::Command::new("yt-dlp")
            .args([
                "-f",
                "bestaudio/best",
                "-g",
                "--no-playlist",
                "--socket-timeout",
                "30",
                &track.url,
            ])
            .output()
            .await
            .map_err(|e| ResolveError::Generic(format!("no se pudo ejecutar yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp no entregó stream para {}: {}", track.url, stderr.trim());
            return Err(classify_failure(&stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let url = stdout
            .lines()
            .next()
            .map(str::to_string)
            .ok_or_else(|| ResolveError::Generic("yt-dlp no devolvió una URL de stream".into()))?;

        Ok(StreamSource { url })
    }
}

/// Mapea el stderr de yt-dlp a la taxonomía de errores de resolución.
fn classify_failure(stderr: &str) -> ResolveError {
    let lowered = stderr.to_lowercase();

    if lowered.contains("private video") {
        ResolveError::Private
    } else if lowered.contains("age") && (lowered.contains("confirm") || lowered.contains("restricted")) {
        ResolveError::AgeRestricted
    } else if lowered.contains("video unavailable") || lowered.contains("has been removed") {
        ResolveError::Unavailable
    } else if lowered.contains("not available in your country")
        || lowered.contains("geo restriction")
        || lowered.contains("410")
    {
        ResolveError::RegionLocked
    } else if lowered.contains("live event") || lowered.contains("premieres in") {
        ResolveError::LiveNotSupported
    } else {
        let first_line = stderr.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
        ResolveError::Generic(first_line.chars().take(120).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clasifica_errores_de_ytdlp() {
        assert!(matches!(
            classify_failure("ERROR: Private video. Sign in if you've been granted access"),
            ResolveError::Private
        ));
        assert!(matches!(
            classify_failure("ERROR: Sign in to confirm your age"),
            ResolveError::AgeRestricted
        ));
        assert!(matches!(
            classify_failure("ERROR: Video unavailable"),
            ResolveError::Unavailable
        ));
        assert!(matches!(
            classify_failure("ERROR: The uploader has not made this video available in your country"),
            ResolveError::RegionLocked
        ));
        assert!(matches!(
            classify_failure("ERROR: HTTP Error 410: Gone"),
            ResolveError::RegionLocked
        ));
        assert!(matches!(
            classify_failure("ERROR: something completely different"),
            ResolveError::Generic(_)
        ));
    }
}
