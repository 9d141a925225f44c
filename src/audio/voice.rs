use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::events::{Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent};
use songbird::input::{ChildContainer, Input};
use songbird::tracks::{PlayMode, TrackHandle};
use songbird::Songbird;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::sequencer::TrackEventSink;
use super::PlayerError;
use crate::config::Config;
use crate::sources::TrackDescriptor;

/// Operaciones de voz de una guild, vistas desde el secuenciador.
///
/// La costura existe para que la máquina de estados se pruebe sin gateway
/// ni procesos externos; en producción la implementa `SongbirdLane`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceLane: Send + Sync {
    /// Se une al canal (o se mueve, si ya estaba en otro).
    async fn connect(&self, channel: ChannelId) -> Result<(), PlayerError>;
    /// Arranca el stream del track; `sink` recibe la señal de fin.
    async fn play(&self, track: &TrackDescriptor, sink: TrackEventSink)
        -> Result<(), PlayerError>;
    /// Detiene el track actual. El pipeline emite después su señal de fin.
    async fn stop_current(&self);
    /// Abandona el canal de voz. Nunca falla hacia el llamador.
    async fn disconnect(&self);
}

/// Carril de voz real: songbird para la conexión y ffmpeg como transcodador
/// externo del stream HTTP.
pub struct SongbirdLane {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    current: parking_lot::Mutex<Option<TrackHandle>>,
    disconnect_timeout: Duration,
    reconnect_delay_max: u64,
}

impl SongbirdLane {
    pub fn new(manager: Arc<Songbird>, guild_id: GuildId, config: &Config) -> Self {
        Self {
            manager,
            guild_id,
            current: parking_lot::Mutex::new(None),
            disconnect_timeout: Duration::from_secs(config.disconnect_timeout_secs),
            reconnect_delay_max: config.reconnect_delay_max_secs,
        }
    }
}

/// Argumentos de ffmpeg para transcodar un stream HTTP a WAV por stdout.
///
/// Los flags de reconexión cubren los cortes transitorios de los CDN; la
/// salida va en contenedor WAV para que el pipeline de audio pueda sondear
/// formato y parámetros desde el propio stream.
fn ffmpeg_args(stream_url: &str, reconnect_delay_max: u64) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-reconnect".into(),
        "1".into(),
        "-reconnect_streamed".into(),
        "1".into(),
        "-reconnect_delay_max".into(),
        reconnect_delay_max.to_string(),
        "-i".into(),
        stream_url.to_string(),
        "-vn".into(),
        "-f".into(),
        "wav".into(),
        "-acodec".into(),
        "pcm_s16le".into(),
        "-ar".into(),
        "48000".into(),
        "-ac".into(),
        "2".into(),
        "pipe:1".into(),
    ]
}

#[async_trait]
impl VoiceLane for SongbirdLane {
    async fn connect(&self, channel: ChannelId) -> Result<(), PlayerError> {
        self.manager
            .join(self.guild_id, channel)
            .await
            .map_err(|e| PlayerError::Connection(e.to_string()))?;
        info!("🔊 Unido al canal {} en guild {}", channel, self.guild_id);
        Ok(())
    }

    async fn play(
        &self,
        track: &TrackDescriptor,
        sink: TrackEventSink,
    ) -> Result<(), PlayerError> {
        let call = self
            .manager
            .get(self.guild_id)
            .ok_or_else(|| PlayerError::Playback("sin conexión de voz activa".into()))?;

        let child = std::process::Command::new("ffmpeg")
            .args(ffmpeg_args(&track.stream_url, self.reconnect_delay_max))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| PlayerError::Playback(format!("no se pudo lanzar ffmpeg: {e}")))?;

        let input: Input = ChildContainer::from(child).into();

        let handle = {
            let mut call = call.lock().await;
            call.play_input(input)
        };

        handle
            .add_event(
                Event::Track(TrackEvent::End),
                EndNotifier { sink: sink.clone() },
            )
            .map_err(|e| PlayerError::Playback(format!("registro de eventos: {e}")))?;
        handle
            .add_event(Event::Track(TrackEvent::Error), ErrorNotifier { sink })
            .map_err(|e| PlayerError::Playback(format!("registro de eventos: {e}")))?;

        *self.current.lock() = Some(handle);
        debug!("▶️ Pipeline iniciado para: {}", track.title);
        Ok(())
    }

    async fn stop_current(&self) {
        let handle = self.current.lock().take();
        if let Some(handle) = handle {
            // El stop dispara el evento End del track, igual que un fin natural
            if let Err(e) = handle.stop() {
                debug!("el track ya había terminado: {}", e);
            }
        }
    }

    async fn disconnect(&self) {
        self.current.lock().take();

        let leave = async {
            if let Some(call) = self.manager.get(self.guild_id) {
                let mut call = call.lock().await;
                if let Err(e) = call.leave().await {
                    debug!("fallo al salir del canal: {}", e);
                }
            }
        };

        if tokio::time::timeout(self.disconnect_timeout, leave)
            .await
            .is_err()
        {
            warn!(
                "⏱️ Desconexión lenta en guild {}, removiendo la sesión",
                self.guild_id
            );
            let manager = self.manager.clone();
            let guild_id = self.guild_id;
            tokio::spawn(async move {
                let _ = manager.remove(guild_id).await;
            });
        }
    }
}

struct EndNotifier {
    sink: TrackEventSink,
}

#[async_trait]
impl VoiceEventHandler for EndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        self.sink.track_ended(None);
        None
    }
}

struct ErrorNotifier {
    sink: TrackEventSink,
}

#[async_trait]
impl VoiceEventHandler for ErrorNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let detail = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| {
                match &state.playing {
                    PlayMode::Errored(e) => Some(e.to_string()),
                    _ => None,
                }
            }),
            _ => None,
        };
        self.sink
            .track_ended(Some(detail.unwrap_or_else(|| "error del pipeline de audio".into())));
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ffmpeg_command_transcodes_to_wav_on_stdout() {
        let args = ffmpeg_args("https://cdn.example/audio.m4a", 5);

        let url_pos = args.iter().position(|a| a == "-i").unwrap() + 1;
        assert_eq!(args[url_pos], "https://cdn.example/audio.m4a");
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
        assert!(args.contains(&"-vn".to_string()));
        assert!(args.contains(&"pcm_s16le".to_string()));

        let delay_pos = args
            .iter()
            .position(|a| a == "-reconnect_delay_max")
            .unwrap()
            + 1;
        assert_eq!(args[delay_pos], "5");
    }
}
