use serenity::all::Timestamp;
use serenity::builder::{CreateEmbed, CreateEmbedFooter};
use std::time::Duration;

use crate::player::queue::{LoopMode, Track, TrackOrigin};
use crate::ui::sync::{NowPlayingView, QueueView};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Aria Music";

/// Largo de la barra de progreso en caracteres.
const PROGRESS_BAR_LEN: usize = 15;

fn loop_emoji(mode: LoopMode) -> &'static str {
    match mode {
        LoopMode::Track => "🔂",
        LoopMode::Queue => "🔁",
        LoopMode::Off => "▶️",
    }
}

/// Embed de la canción en reproducción, con barra de progreso.
pub fn now_playing(view: &NowPlayingView) -> CreateEmbed {
    let title = if view.paused {
        "⏸️ Pausado".to_string()
    } else {
        format!("{} Reproduciendo Ahora", loop_emoji(view.loop_mode))
    };

    let mut embed = CreateEmbed::default()
        .title(title)
        .description(format!("**[{}]({})**", view.track.title, view.track.url))
        .color(colors::INFO_BLUE)
        .field("👤 Solicitado por", format!("<@{}>", view.track.requested_by), true)
        .field("⏱️ Duración", format_duration(view.track.duration), true)
        .field("🔊 Volumen", format!("{}%", view.volume), true)
        .field("📋 En cola", format!("{} canciones", view.queue_len), true)
        .field("🔁 Repetición", view.loop_mode.label(), true)
        .field("Progreso", progress_bar(view.elapsed, view.track.duration), false);

    if let Some(thumbnail) = &view.track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Embed de una página de la cola.
pub fn queue_overview(view: &QueueView) -> CreateEmbed {
    let offset = view.page * crate::player::queue::TRACKS_PER_PAGE;
    let description = if view.items.is_empty() {
        "La cola está vacía.".to_string()
    } else {
        view.items
            .iter()
            .enumerate()
            .map(|(i, track)| {
                format!(
                    "**{}.** [{}]({}) `[{}]` - <@{}>",
                    offset + i + 1,
                    track.title,
                    track.url,
                    format_duration(track.duration),
                    track.requested_by
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut embed = CreateEmbed::default()
        .title("🎵 Cola de Reproducción")
        .description(description)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(format!(
            "Página {}/{} | Total: {} canciones",
            view.page + 1,
            view.total_pages,
            view.total
        )));

    if let Some(current) = &view.current {
        embed = embed.field(
            "Reproduciendo ahora",
            format!(
                "▶️ **[{}]({})** `[{}]` - <@{}>",
                current.title,
                current.url,
                format_duration(current.duration),
                current.requested_by
            ),
            false,
        );
    }

    embed
}

/// Embed de confirmación al encolar un track.
pub fn track_added(track: &Track, position: usize) -> CreateEmbed {
    let origin = match track.origin {
        TrackOrigin::Url => "URL directa",
        TrackOrigin::Search => "Búsqueda",
    };

    let mut embed = CreateEmbed::default()
        .title(format!("✅ Agregado a la cola (#{position})"))
        .description(format!("**[{}]({})**", track.title, track.url))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", format_duration(track.duration), true)
        .field("🔗 Origen", origin, true);

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
}

pub fn error_embed(message: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Error")
        .description(message)
        .color(colors::ERROR_RED)
}

pub fn success_embed(message: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("✅ Listo")
        .description(message)
        .color(colors::SUCCESS_GREEN)
}

pub fn simple_embed(message: &str) -> CreateEmbed {
    CreateEmbed::default()
        .description(message)
        .color(colors::INFO_BLUE)
}

/// Formatea una duración como MM:SS o H:MM:SS. Desconocida ⇒ 00:00.
pub fn format_duration(duration: Option<Duration>) -> String {
    let total_seconds = duration.map(|d| d.as_secs()).unwrap_or(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// Barra de progreso textual a partir del tiempo reproducido.
pub fn progress_bar(elapsed: Option<Duration>, total: Option<Duration>) -> String {
    let Some(total) = total.filter(|t| !t.is_zero()) else {
        return format!("`[{}]`", "─".repeat(PROGRESS_BAR_LEN));
    };

    let elapsed = elapsed.unwrap_or_default().min(total);
    let ratio = elapsed.as_secs_f64() / total.as_secs_f64();
    let filled = (ratio * PROGRESS_BAR_LEN as f64).round() as usize;
    let filled = filled.min(PROGRESS_BAR_LEN);

    format!(
        "`[{} / {}] [{}{}]`",
        format_duration(Some(elapsed)),
        format_duration(Some(total)),
        "🔘".repeat(filled),
        "─".repeat(PROGRESS_BAR_LEN - filled),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn formatea_duraciones() {
        assert_eq!(format_duration(None), "00:00");
        assert_eq!(format_duration(Some(Duration::from_secs(0))), "00:00");
        assert_eq!(format_duration(Some(Duration::from_secs(65))), "01:05");
        assert_eq!(format_duration(Some(Duration::from_secs(3600 + 125))), "1:02:05");
    }

    #[test]
    fn barra_de_progreso() {
        // Sin duración total, barra neutra
        assert_eq!(
            progress_bar(Some(Duration::from_secs(10)), None),
            format!("`[{}]`", "─".repeat(15))
        );

        // A mitad de una canción de 200 s
        let bar = progress_bar(Some(Duration::from_secs(100)), Some(Duration::from_secs(200)));
        assert!(bar.contains("[01:40 / 03:20]"));
        assert_eq!(bar.matches("🔘").count(), 8, "mitad redondeada de 15");

        // El tiempo transcurrido nunca supera el total
        let bar = progress_bar(Some(Duration::from_secs(999)), Some(Duration::from_secs(200)));
        assert!(bar.contains("[03:20 / 03:20]"));
        assert_eq!(bar.matches("🔘").count(), 15);
    }
}
