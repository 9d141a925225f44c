pub mod queue;
pub mod sequencer;
pub mod voice;

use crate::sources::ResolveError;

/// Taxonomía de errores del reproductor.
///
/// Ningún error acá es fatal para el proceso: la máquina de estados por
/// guild sigue operable después de cualquier fallo individual.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    /// Precondición del usuario: debe estar en un canal de voz
    #[error("tenés que estar en un canal de voz para reproducir música")]
    NotInVoiceChannel,
    /// Precondición del usuario: no hay track activo para saltar
    #[error("no hay música reproduciéndose en este momento")]
    NothingPlaying,
    /// La resolución no devolvió ningún track utilizable
    #[error("no se encontró la canción o playlist")]
    EmptyResolution,
    /// Fallo upstream de búsqueda/extracción; la cola no se toca
    #[error("{0}")]
    Resolution(#[from] ResolveError),
    /// Fallo al unirse o moverse de canal de voz; el estado vuelve a Idle
    #[error("no se pudo conectar al canal de voz: {0}")]
    Connection(String),
    /// El pipeline de audio no pudo iniciar el track
    #[error("no se pudo iniciar la reproducción: {0}")]
    Playback(String),
    /// El carril del reproductor ya no está recibiendo mensajes
    #[error("el reproductor no está disponible")]
    Unavailable,
}
