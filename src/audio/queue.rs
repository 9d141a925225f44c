use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::sources::{TrackDescriptor, TrackRef};

/// Un track pendiente: siempre tiene referencia, puede o no tener detalle.
///
/// Los items entran normalmente sin resolver (una playlist no se resuelve
/// entera por adelantado) y el secuenciador resuelve el detalle recién al
/// avanzar hasta ellos.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub reference: TrackRef,
    pub detail: Option<TrackDescriptor>,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn unresolved(reference: TrackRef) -> Self {
        Self {
            reference,
            detail: None,
            enqueued_at: Utc::now(),
        }
    }

    pub fn resolved(detail: TrackDescriptor) -> Self {
        Self {
            reference: TrackRef::new(detail.source_ref.clone()),
            detail: Some(detail),
            enqueued_at: Utc::now(),
        }
    }

    /// Título para listados: el resuelto, o la referencia cruda como fallback.
    pub fn display_title(&self) -> &str {
        self.detail
            .as_ref()
            .map(|d| d.title.as_str())
            .unwrap_or(&self.reference.source_ref)
    }
}

/// Entrada de un listado de cola, apta para renderizar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub title: String,
    pub page_url: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

/// Cola de reproducción de una guild: FIFO puro, sin lógica propia.
///
/// Su único contrato es que la muta exactamente un dueño a la vez; eso lo
/// garantiza el carril serializado del secuenciador, no esta estructura.
#[derive(Debug)]
pub struct GuildQueue {
    pending: VecDeque<QueueItem>,
    max_size: usize,
}

impl GuildQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            max_size,
        }
    }

    /// Agrega items al final respetando la capacidad; devuelve cuántos
    /// entraron realmente.
    pub fn enqueue(&mut self, items: Vec<QueueItem>) -> usize {
        let available = self.max_size.saturating_sub(self.pending.len());
        let accepted = items.len().min(available);

        for item in items.into_iter().take(accepted) {
            debug!("➕ En cola: {}", item.display_title());
            self.pending.push_back(item);
        }

        if accepted > 0 {
            info!("➕ {} track(s) agregados a la cola", accepted);
        }
        accepted
    }

    /// Saca el primero de la cola (orden FIFO estricto).
    pub fn dequeue_next(&mut self) -> Option<QueueItem> {
        let next = self.pending.pop_front();
        if let Some(item) = &next {
            info!("➡️ Siguiente en cola: {}", item.display_title());
        }
        next
    }

    pub fn clear(&mut self) {
        if !self.pending.is_empty() {
            info!("🗑️ Cola limpiada ({} pendientes descartados)", self.pending.len());
        }
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Vista de los pendientes con títulos best-effort.
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.pending
            .iter()
            .map(|item| QueueEntry {
                title: item.display_title().to_string(),
                page_url: item.detail.as_ref().map(|d| d.page_url.clone()),
                enqueued_at: item.enqueued_at,
            })
            .collect()
    }
}
