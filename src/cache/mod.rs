use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::sources::{ResolveError, TrackDescriptor, TrackRef};

/// Caché de resoluciones compartida entre todas las guilds.
///
/// Dos mapas: resultados de búsqueda por query exacta y descriptores por
/// `source_ref`. Las entradas viven hasta el reinicio del proceso, sin
/// expiración.
///
/// Cada clave usa una `OnceCell` propia: resoluciones concurrentes de la
/// misma clave colapsan en una sola llamada upstream y los perdedores
/// reciben el resultado del ganador. Los errores no se cachean.
#[derive(Debug, Default)]
pub struct ResolverCache {
    searches: DashMap<String, Arc<OnceCell<Vec<TrackRef>>>>,
    details: DashMap<String, Arc<OnceCell<TrackDescriptor>>>,
}

impl ResolverCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Devuelve el resultado cacheado para `query` o lo resuelve con `fetch`,
    /// garantizando a lo sumo una resolución en vuelo por clave.
    pub async fn search_with<F, Fut>(
        &self,
        query: &str,
        fetch: F,
    ) -> Result<Vec<TrackRef>, ResolveError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<TrackRef>, ResolveError>>,
    {
        let cell = self
            .searches
            .entry(query.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        if let Some(hit) = cell.get() {
            debug!("caché de búsqueda: hit para '{}'", query);
            return Ok(hit.clone());
        }

        cell.get_or_try_init(fetch).await.cloned()
    }

    /// Ídem para el detalle de un track, con clave `source_ref`.
    pub async fn detail_with<F, Fut>(
        &self,
        source_ref: &str,
        fetch: F,
    ) -> Result<TrackDescriptor, ResolveError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TrackDescriptor, ResolveError>>,
    {
        let cell = self
            .details
            .entry(source_ref.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        if let Some(hit) = cell.get() {
            debug!("caché de detalle: hit para '{}'", source_ref);
            return Ok(hit.clone());
        }

        cell.get_or_try_init(fetch).await.cloned()
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.searches.len() + self.details.len()
    }
}
