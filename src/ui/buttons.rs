use serenity::all::ButtonStyle;
use serenity::builder::{CreateActionRow, CreateButton};

use crate::player::queue::LoopMode;

/// IDs personalizados para los botones
pub mod button_ids {
    pub const NP_PAUSE_RESUME: &str = "np_pause_resume";
    pub const NP_SKIP: &str = "np_skip";
    pub const NP_STOP: &str = "np_stop";
    pub const NP_LOOP: &str = "np_loop";

    /// Prefijos de paginación; el id completo lleva la página renderizada
    /// (`queue_prev_3`) para detectar clicks sobre un render viejo.
    pub const QUEUE_PREV_PREFIX: &str = "queue_prev_";
    pub const QUEUE_NEXT_PREFIX: &str = "queue_next_";
}

/// Dirección de un click de paginación.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDirection {
    Prev,
    Next,
}

/// Controles del mensaje de "reproduciendo ahora".
pub fn now_playing_controls(paused: bool, loop_mode: LoopMode) -> CreateActionRow {
    let pause_resume = CreateButton::new(button_ids::NP_PAUSE_RESUME)
        .label(if paused { "▶️ Reanudar" } else { "⏸️ Pausar" })
        .style(if paused {
            ButtonStyle::Success
        } else {
            ButtonStyle::Secondary
        });

    let skip = CreateButton::new(button_ids::NP_SKIP)
        .label("⏭️ Saltar")
        .style(ButtonStyle::Primary);

    let stop = CreateButton::new(button_ids::NP_STOP)
        .label("⏹️ Detener")
        .style(ButtonStyle::Danger);

    let loop_label = match loop_mode {
        LoopMode::Track => "🔂 Canción",
        LoopMode::Queue => "🔁 Cola",
        LoopMode::Off => "▶️ Sin loop",
    };
    let loop_btn = CreateButton::new(button_ids::NP_LOOP)
        .label(loop_label)
        .style(if loop_mode != LoopMode::Off {
            ButtonStyle::Success
        } else {
            ButtonStyle::Secondary
        });

    CreateActionRow::Buttons(vec![pause_resume, skip, stop, loop_btn])
}

/// Botones de paginación de la cola, deshabilitados en los extremos.
pub fn queue_pagination(current_page: usize, total_pages: usize) -> CreateActionRow {
    let prev = CreateButton::new(format!("{}{}", button_ids::QUEUE_PREV_PREFIX, current_page))
        .label("◀️ Anterior")
        .style(ButtonStyle::Primary)
        .disabled(current_page == 0);

    let next = CreateButton::new(format!("{}{}", button_ids::QUEUE_NEXT_PREFIX, current_page))
        .label("Siguiente ▶️")
        .style(ButtonStyle::Primary)
        .disabled(current_page + 1 >= total_pages);

    CreateActionRow::Buttons(vec![prev, next])
}

/// Interpreta un custom id de paginación: dirección y página renderizada.
pub fn parse_queue_button(custom_id: &str) -> Option<(PageDirection, usize)> {
    if let Some(page) = custom_id.strip_prefix(button_ids::QUEUE_PREV_PREFIX) {
        return page.parse().ok().map(|p| (PageDirection::Prev, p));
    }
    if let Some(page) = custom_id.strip_prefix(button_ids::QUEUE_NEXT_PREFIX) {
        return page.parse().ok().map(|p| (PageDirection::Next, p));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parsea_ids_de_paginacion() {
        assert_eq!(parse_queue_button("queue_prev_0"), Some((PageDirection::Prev, 0)));
        assert_eq!(parse_queue_button("queue_next_12"), Some((PageDirection::Next, 12)));
        assert_eq!(parse_queue_button("queue_next_"), None);
        assert_eq!(parse_queue_button("np_skip"), None);
    }
}
