pub mod cookies;
pub mod ytdlp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use ytdlp::YtDlpResolver;

/// Referencia ligera a un track, suficiente para re-resolverlo después.
///
/// Una búsqueda o playlist produce varias de estas; el detalle completo
/// se obtiene recién cuando el track va a reproducirse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackRef {
    /// Identificador opaco (normalmente la URL de la página del video)
    pub source_ref: String,
}

impl TrackRef {
    pub fn new(source_ref: impl Into<String>) -> Self {
        Self {
            source_ref: source_ref.into(),
        }
    }
}

/// Metadatos resueltos y reproducibles de un track. Inmutable una vez creado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    /// Referencia con la que se resolvió (clave de caché)
    pub source_ref: String,
    /// URL de stream reproducible, posiblemente con vencimiento
    pub stream_url: String,
    /// Título para mostrar
    pub title: String,
    /// Enlace a la página del video
    pub page_url: String,
    /// Miniatura, si el extractor la entrega
    pub thumbnail: Option<String>,
}

/// Errores del servicio de resolución de metadatos.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    #[error("no se encontraron resultados")]
    NotFound,
    #[error("fallo del servicio de extracción: {0}")]
    Upstream(String),
}

/// Seam entre el secuenciador/comandos y el servicio externo de extracción.
///
/// Ambas operaciones son idempotentes vía caché y nunca propagan pánicos:
/// cualquier fallo upstream llega como [`ResolveError`].
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    /// Resuelve una búsqueda libre o URL a una o más referencias de track,
    /// en el orden que las entrega el servicio.
    async fn search(&self, query: &str) -> Result<Vec<TrackRef>, ResolveError>;

    /// Obtiene URL de stream y metadatos de presentación para una referencia.
    async fn resolve_detail(&self, track: &TrackRef) -> Result<TrackDescriptor, ResolveError>;
}
