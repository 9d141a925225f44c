use serenity::all::{Context, Message};
use serenity::builder::{CreateEmbed, CreateMessage};
use std::sync::Arc;
use tracing::{info, warn};

use crate::audio::queue::QueueItem;
use crate::audio::sequencer::{EnqueueOutcome, PlayerRegistry};
use crate::audio::voice::{SongbirdLane, VoiceLane};
use crate::audio::PlayerError;
use crate::config::Config;
use crate::ui::embeds;

/// Comandos de prefijo reconocidos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Play(&'a str),
    Stop,
    Skip,
    Queue,
}

/// Interpreta un mensaje con prefijo. Devuelve `None` para cualquier cosa
/// que no sea un comando conocido; esos mensajes se ignoran en silencio.
pub fn parse<'a>(content: &'a str, prefix: &str) -> Option<Command<'a>> {
    let rest = content.strip_prefix(prefix)?.trim_start();
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    match name {
        "p" | "play" => Some(Command::Play(args)),
        "stop" => Some(Command::Stop),
        "skip" => Some(Command::Skip),
        "q" | "queue" => Some(Command::Queue),
        _ => None,
    }
}

pub async fn dispatch(
    ctx: &Context,
    msg: &Message,
    command: Command<'_>,
    registry: &Arc<PlayerRegistry>,
    config: &Arc<Config>,
) {
    info!(
        "📨 Comando {:?} de {} en guild {:?}",
        command, msg.author.name, msg.guild_id
    );

    match command {
        Command::Play(query) => handle_play(ctx, msg, registry, config, query).await,
        Command::Stop => handle_stop(ctx, msg, registry).await,
        Command::Skip => handle_skip(ctx, msg, registry).await,
        Command::Queue => handle_queue(ctx, msg, registry).await,
    }
}

async fn handle_play(
    ctx: &Context,
    msg: &Message,
    registry: &Arc<PlayerRegistry>,
    config: &Arc<Config>,
    query: &str,
) {
    let Some(guild_id) = msg.guild_id else { return };

    if query.is_empty() {
        send_embed(
            ctx,
            msg,
            embeds::error("Indicá qué reproducir: una búsqueda o una URL"),
        )
        .await;
        return;
    }

    // El autor tiene que estar en un canal de voz; el bot lo sigue ahí
    let voice_channel = {
        ctx.cache.guild(guild_id).and_then(|guild| {
            guild
                .voice_states
                .get(&msg.author.id)
                .and_then(|vs| vs.channel_id)
        })
    };
    let Some(channel) = voice_channel else {
        send_embed(
            ctx,
            msg,
            embeds::error(&PlayerError::NotInVoiceChannel.to_string()),
        )
        .await;
        return;
    };

    let resolver = registry.resolver();
    let refs = match resolver.search(query).await {
        Ok(refs) => refs,
        Err(e) => {
            warn!("🔍 Búsqueda fallida para '{}': {}", query, e);
            send_embed(ctx, msg, embeds::error(&e.to_string())).await;
            return;
        }
    };

    // El primer track se resuelve acá para poder arrancar sin más vueltas;
    // el resto de la playlist queda sin resolver hasta que le toque sonar
    let mut items = Vec::with_capacity(refs.len());
    let mut refs = refs.into_iter();
    if let Some(first) = refs.next() {
        match resolver.resolve_detail(&first).await {
            Ok(detail) => items.push(QueueItem::resolved(detail)),
            Err(e) => {
                warn!("📄 Detalle del primer track falló, se difiere: {}", e);
                items.push(QueueItem::unresolved(first));
            }
        }
    }
    items.extend(refs.map(QueueItem::unresolved));

    let Some(manager) = songbird::get(ctx).await else {
        send_embed(ctx, msg, embeds::error(&PlayerError::Unavailable.to_string())).await;
        return;
    };

    let handle = registry.get_or_spawn(guild_id, || {
        Arc::new(SongbirdLane::new(manager, guild_id, config)) as Arc<dyn VoiceLane>
    });

    match handle.enqueue(channel, items).await {
        Ok(EnqueueOutcome::Started { track, queued }) => {
            send_embed(ctx, msg, embeds::now_playing(&track)).await;
            if queued > 0 {
                send_embed(ctx, msg, embeds::queued(queued)).await;
            }
        }
        Ok(EnqueueOutcome::Starting { queued }) => {
            send_embed(ctx, msg, embeds::starting(queued)).await;
        }
        Ok(EnqueueOutcome::Queued { queued }) => {
            send_embed(ctx, msg, embeds::queued(queued)).await;
        }
        Err(e) => {
            send_embed(ctx, msg, embeds::error(&e.to_string())).await;
        }
    }
}

async fn handle_stop(ctx: &Context, msg: &Message, registry: &Arc<PlayerRegistry>) {
    let Some(guild_id) = msg.guild_id else { return };

    // Detener sin carril creado es un no-op válido: la guild ya está ociosa
    if let Some(handle) = registry.get(guild_id) {
        if let Err(e) = handle.stop().await {
            send_embed(ctx, msg, embeds::error(&e.to_string())).await;
            return;
        }
    }
    send_embed(ctx, msg, embeds::stopped()).await;
}

async fn handle_skip(ctx: &Context, msg: &Message, registry: &Arc<PlayerRegistry>) {
    let Some(guild_id) = msg.guild_id else { return };

    let Some(handle) = registry.get(guild_id) else {
        send_embed(
            ctx,
            msg,
            embeds::error(&PlayerError::NothingPlaying.to_string()),
        )
        .await;
        return;
    };

    match handle.skip().await {
        Ok(()) => send_embed(ctx, msg, embeds::skipped()).await,
        Err(e) => send_embed(ctx, msg, embeds::error(&e.to_string())).await,
    }
}

async fn handle_queue(ctx: &Context, msg: &Message, registry: &Arc<PlayerRegistry>) {
    let Some(guild_id) = msg.guild_id else { return };

    // Guild nunca vista y cola vacía son estados distintos con textos distintos
    let Some(handle) = registry.get(guild_id) else {
        send_embed(ctx, msg, embeds::queue_never_used()).await;
        return;
    };

    match handle.report().await {
        Ok(report) => send_embed(ctx, msg, embeds::queue_list(&report)).await,
        Err(e) => send_embed(ctx, msg, embeds::error(&e.to_string())).await,
    }
}

async fn send_embed(ctx: &Context, msg: &Message, embed: CreateEmbed) {
    let builder = CreateMessage::new().embed(embed);
    if let Err(e) = msg.channel_id.send_message(&ctx.http, builder).await {
        warn!("💬 No se pudo enviar la respuesta: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_play_with_query() {
        assert_eq!(
            parse("#p lofi hip hop radio", "#"),
            Some(Command::Play("lofi hip hop radio"))
        );
        assert_eq!(
            parse("#play https://youtu.be/abc", "#"),
            Some(Command::Play("https://youtu.be/abc"))
        );
    }

    #[test]
    fn parses_bare_commands() {
        assert_eq!(parse("#stop", "#"), Some(Command::Stop));
        assert_eq!(parse("#skip", "#"), Some(Command::Skip));
        assert_eq!(parse("#queue", "#"), Some(Command::Queue));
        assert_eq!(parse("#q", "#"), Some(Command::Queue));
    }

    #[test]
    fn play_without_query_still_parses() {
        // El handler responde con el error de uso, no el parser
        assert_eq!(parse("#p", "#"), Some(Command::Play("")));
    }

    #[test]
    fn ignores_unprefixed_and_unknown() {
        assert_eq!(parse("hola que tal", "#"), None);
        assert_eq!(parse("#baila", "#"), None);
        assert_eq!(parse("p lofi", "#"), None);
    }

    #[test]
    fn trailing_text_on_bare_commands_is_tolerated() {
        assert_eq!(parse("#skip esta porfa", "#"), Some(Command::Skip));
    }

    #[test]
    fn respects_configured_prefix() {
        assert_eq!(parse("!p algo", "!"), Some(Command::Play("algo")));
        assert_eq!(parse("#p algo", "!"), None);
    }
}
