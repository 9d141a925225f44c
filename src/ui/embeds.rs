use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::audio::queue::QueueEntry;
use crate::audio::sequencer::QueueReport;
use crate::sources::TrackDescriptor;

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Fila Music";

/// Embed para la canción que empieza a sonar ya mismo
pub fn now_playing(track: &TrackDescriptor) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN)
        .url(&track.page_url);

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Embed para tracks que quedaron en cola detrás de una reproducción activa
pub fn queued(count: usize) -> CreateEmbed {
    let description = if count == 1 {
        "Se agregó **1 canción** a la cola de reproducción".to_string()
    } else {
        format!("Se agregaron **{count} canciones** a la cola de reproducción")
    };

    CreateEmbed::default()
        .title("➕ Agregado a la Cola")
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Embed para un primer track que quedó resolviéndose en segundo plano
pub fn starting(queued: usize) -> CreateEmbed {
    let description = if queued == 0 {
        "Preparando la reproducción...".to_string()
    } else {
        format!("Preparando la reproducción ({queued} más en cola)...")
    };

    CreateEmbed::default()
        .title("⏳ Conectado")
        .description(description)
        .color(colors::WARNING_ORANGE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn skipped() -> CreateEmbed {
    CreateEmbed::default()
        .title("⏭️ Canción Saltada")
        .description("Pasando a la siguiente de la cola")
        .color(colors::WARNING_ORANGE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn stopped() -> CreateEmbed {
    CreateEmbed::default()
        .title("⏹️ Reproducción Detenida")
        .description("Cola limpiada y desconectado del canal de voz")
        .color(colors::WARNING_ORANGE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Embed del listado de cola para una guild con carril ya creado.
pub fn queue_list(report: &QueueReport) -> CreateEmbed {
    let mut description = String::new();

    match &report.now_playing {
        Some(track) => {
            description.push_str(&format!("**Sonando:** [{}]({})\n\n", track.title, track.page_url));
        }
        None => description.push_str("**Sonando:** nada en este momento\n\n"),
    }

    if report.pending.is_empty() {
        description.push_str("La cola está vacía");
    } else {
        for (i, entry) in report.pending.iter().enumerate().take(10) {
            description.push_str(&format_entry(i + 1, entry));
        }
        if report.pending.len() > 10 {
            description.push_str(&format!("\n... y {} más", report.pending.len() - 10));
        }
    }

    CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .description(description)
        .color(colors::MUSIC_PURPLE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Embed para guilds que todavía no reprodujeron nada en esta sesión.
pub fn queue_never_used() -> CreateEmbed {
    CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .description("Todavía no se reprodujo nada en este servidor")
        .color(colors::NEUTRAL_GRAY)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn error(message: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Error")
        .description(message.to_string())
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn format_entry(position: usize, entry: &QueueEntry) -> String {
    let when = entry.enqueued_at.timestamp();
    match &entry.page_url {
        Some(url) => format!("`{position}.` [{}]({url}) · <t:{when}:R>\n", entry.title),
        None => format!("`{position}.` {} · <t:{when}:R>\n", entry.title),
    }
}
