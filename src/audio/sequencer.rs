use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::queue::{GuildQueue, QueueEntry, QueueItem};
use super::voice::VoiceLane;
use super::PlayerError;
use crate::sources::{MetadataResolver, ResolveError, TrackDescriptor, TrackRef};

/// Estados de reproducción de una guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Connecting,
    Playing,
    /// Alcanzable solo por una pausa externa; ningún comando llega acá
    #[allow(dead_code)]
    Paused,
    Advancing,
    Disconnecting,
}

/// Resultado de un encolado, para que el comando arme su respuesta.
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// El primer track arrancó ya mismo; `queued` quedaron pendientes
    Started { track: TrackDescriptor, queued: usize },
    /// Conectado y resolviendo el primer track en segundo plano
    Starting { queued: usize },
    /// Había reproducción activa: todo fue a la cola
    Queued { queued: usize },
}

/// Vista del estado de una guild para el comando `queue`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueReport {
    pub now_playing: Option<TrackDescriptor>,
    pub pending: Vec<QueueEntry>,
}

enum PlayerMessage {
    Enqueue {
        channel: ChannelId,
        items: Vec<QueueItem>,
        reply: oneshot::Sender<Result<EnqueueOutcome, PlayerError>>,
    },
    Skip {
        reply: oneshot::Sender<Result<(), PlayerError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Report {
        reply: oneshot::Sender<QueueReport>,
    },
    /// Señal del pipeline de audio: el track actual terminó (bien o mal).
    /// Llega desde otro contexto de ejecución como mensaje, nunca como
    /// llamada directa.
    TrackEnded {
        play_id: u64,
        error: Option<String>,
    },
    /// Resultado de una resolución de detalle lanzada durante `Advancing`.
    NextResolved {
        epoch: u64,
        result: Result<TrackDescriptor, ResolveError>,
    },
}

/// Emisor que el carril de voz entrega al pipeline de audio: convierte el
/// callback de fin de track en un mensaje hacia el carril de la guild.
#[derive(Debug, Clone)]
pub struct TrackEventSink {
    tx: mpsc::UnboundedSender<PlayerMessage>,
    play_id: u64,
}

impl TrackEventSink {
    pub fn track_ended(&self, error: Option<String>) {
        let _ = self.tx.send(PlayerMessage::TrackEnded {
            play_id: self.play_id,
            error,
        });
    }
}

/// Handle clonable hacia el carril serializado de una guild.
#[derive(Clone)]
pub struct PlayerHandle {
    tx: mpsc::UnboundedSender<PlayerMessage>,
}

impl PlayerHandle {
    pub async fn enqueue(
        &self,
        channel: ChannelId,
        items: Vec<QueueItem>,
    ) -> Result<EnqueueOutcome, PlayerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PlayerMessage::Enqueue {
                channel,
                items,
                reply,
            })
            .map_err(|_| PlayerError::Unavailable)?;
        rx.await.map_err(|_| PlayerError::Unavailable)?
    }

    pub async fn skip(&self) -> Result<(), PlayerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PlayerMessage::Skip { reply })
            .map_err(|_| PlayerError::Unavailable)?;
        rx.await.map_err(|_| PlayerError::Unavailable)?
    }

    pub async fn stop(&self) -> Result<(), PlayerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PlayerMessage::Stop { reply })
            .map_err(|_| PlayerError::Unavailable)?;
        rx.await.map_err(|_| PlayerError::Unavailable)
    }

    pub async fn report(&self) -> Result<QueueReport, PlayerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PlayerMessage::Report { reply })
            .map_err(|_| PlayerError::Unavailable)?;
        rx.await.map_err(|_| PlayerError::Unavailable)
    }
}

/// Registro dueño de un carril por guild y del resolutor compartido.
///
/// Estado explícito y pasado por referencia en lugar de mapas globales:
/// la ausencia de entrada equivale a "esta guild nunca reprodujo nada".
pub struct PlayerRegistry {
    players: DashMap<GuildId, PlayerHandle>,
    resolver: Arc<dyn MetadataResolver>,
    max_queue_size: usize,
}

impl PlayerRegistry {
    pub fn new(resolver: Arc<dyn MetadataResolver>, max_queue_size: usize) -> Self {
        Self {
            players: DashMap::new(),
            resolver,
            max_queue_size,
        }
    }

    pub fn resolver(&self) -> Arc<dyn MetadataResolver> {
        self.resolver.clone()
    }

    /// Carril existente, si esta guild ya reprodujo algo alguna vez.
    pub fn get(&self, guild_id: GuildId) -> Option<PlayerHandle> {
        self.players.get(&guild_id).map(|h| h.clone())
    }

    /// Carril existente o recién creado (creación perezosa en el primer play).
    pub fn get_or_spawn<F>(&self, guild_id: GuildId, make_lane: F) -> PlayerHandle
    where
        F: FnOnce() -> Arc<dyn VoiceLane>,
    {
        self.players
            .entry(guild_id)
            .or_insert_with(|| {
                info!("🆕 Creando carril de reproducción para guild {}", guild_id);
                GuildPlayer::spawn(
                    guild_id,
                    make_lane(),
                    self.resolver.clone(),
                    self.max_queue_size,
                )
            })
            .clone()
    }
}

/// Máquina de estados de reproducción de UNA guild.
///
/// Corre como actor: todos los eventos (comandos, fin de track, resultados
/// de resolución) entran por el mismo canal y se aplican en el orden en que
/// se observaron. Dos guilds nunca se bloquean entre sí.
struct GuildPlayer {
    guild_id: GuildId,
    state: PlayerState,
    queue: GuildQueue,
    lane: Arc<dyn VoiceLane>,
    resolver: Arc<dyn MetadataResolver>,
    tx: mpsc::UnboundedSender<PlayerMessage>,
    rx: mpsc::UnboundedReceiver<PlayerMessage>,
    /// Época de cancelación: `stop` la incrementa y cualquier resolución en
    /// vuelo con época vieja se descarta al llegar.
    epoch: u64,
    /// Identificador del track sonando; dedup de señales de fin duplicadas
    current_play: Option<u64>,
    next_play_id: u64,
    now_playing: Option<TrackDescriptor>,
}

impl GuildPlayer {
    fn spawn(
        guild_id: GuildId,
        lane: Arc<dyn VoiceLane>,
        resolver: Arc<dyn MetadataResolver>,
        max_queue_size: usize,
    ) -> PlayerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let player = Self {
            guild_id,
            state: PlayerState::Idle,
            queue: GuildQueue::new(max_queue_size),
            lane,
            resolver,
            tx: tx.clone(),
            rx,
            epoch: 0,
            current_play: None,
            next_play_id: 1,
            now_playing: None,
        };
        tokio::spawn(player.run());
        PlayerHandle { tx }
    }

    async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                PlayerMessage::Enqueue {
                    channel,
                    items,
                    reply,
                } => {
                    let outcome = self.handle_enqueue(channel, items).await;
                    let _ = reply.send(outcome);
                }
                PlayerMessage::Skip { reply } => {
                    let _ = reply.send(self.handle_skip().await);
                }
                PlayerMessage::Stop { reply } => {
                    self.handle_stop().await;
                    let _ = reply.send(());
                }
                PlayerMessage::Report { reply } => {
                    let _ = reply.send(QueueReport {
                        now_playing: self.now_playing.clone(),
                        pending: self.queue.snapshot(),
                    });
                }
                PlayerMessage::TrackEnded { play_id, error } => {
                    self.handle_track_ended(play_id, error).await;
                }
                PlayerMessage::NextResolved { epoch, result } => {
                    self.handle_next_resolved(epoch, result).await;
                }
            }
        }
        debug!("carril de guild {} terminado", self.guild_id);
    }

    async fn handle_enqueue(
        &mut self,
        channel: ChannelId,
        mut items: Vec<QueueItem>,
    ) -> Result<EnqueueOutcome, PlayerError> {
        if items.is_empty() {
            return Err(PlayerError::EmptyResolution);
        }

        if self.state != PlayerState::Idle {
            let queued = self.queue.enqueue(items);
            return Ok(EnqueueOutcome::Queued { queued });
        }

        self.state = PlayerState::Connecting;
        if let Err(e) = self.lane.connect(channel).await {
            warn!("🔌 Falló la conexión de voz en guild {}: {}", self.guild_id, e);
            self.state = PlayerState::Idle;
            return Err(e);
        }
        info!("🔊 Conectado al canal de voz en guild {}", self.guild_id);

        let first = items.remove(0);
        let queued = self.queue.enqueue(items);

        match first.detail {
            Some(desc) => match self.start_track(desc.clone()).await {
                Ok(()) => Ok(EnqueueOutcome::Started {
                    track: desc,
                    queued,
                }),
                Err(e) => {
                    warn!("⚠️ No arrancó el primer track: {}", e);
                    self.advance().await;
                    Err(e)
                }
            },
            None => {
                self.state = PlayerState::Advancing;
                self.begin_resolve(first.reference);
                Ok(EnqueueOutcome::Starting { queued })
            }
        }
    }

    async fn handle_skip(&mut self) -> Result<(), PlayerError> {
        if !matches!(self.state, PlayerState::Playing | PlayerState::Paused) {
            return Err(PlayerError::NothingPlaying);
        }
        info!("⏭️ Salto solicitado en guild {}", self.guild_id);
        // Solo detiene el track: la señal TrackEnded resultante corre el
        // MISMO camino de avance que un fin natural.
        self.lane.stop_current().await;
        Ok(())
    }

    async fn handle_stop(&mut self) {
        // Cancelación autoritativa: resoluciones en vuelo quedan huérfanas
        self.epoch += 1;
        self.queue.clear();
        self.current_play = None;
        self.now_playing = None;
        self.lane.stop_current().await;
        self.state = PlayerState::Disconnecting;
        self.lane.disconnect().await;
        self.state = PlayerState::Idle;
        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
    }

    async fn handle_track_ended(&mut self, play_id: u64, error: Option<String>) {
        if self.current_play != Some(play_id) {
            debug!(
                "señal de fin ignorada en guild {} (play_id {} ya no es el actual)",
                self.guild_id, play_id
            );
            return;
        }
        if let Some(err) = error {
            // No bloquea la cola: un track roto jamás deja colgada la guild
            warn!("⚠️ El track terminó con error en guild {}: {}", self.guild_id, err);
        }
        self.advance().await;
    }

    async fn handle_next_resolved(
        &mut self,
        epoch: u64,
        result: Result<TrackDescriptor, ResolveError>,
    ) {
        if epoch != self.epoch || self.state != PlayerState::Advancing {
            debug!(
                "resolución tardía descartada en guild {} (época {} vs {})",
                self.guild_id, epoch, self.epoch
            );
            return;
        }
        match result {
            Ok(desc) => {
                if let Err(e) = self.start_track(desc).await {
                    warn!("⚠️ No arrancó el track resuelto: {}", e);
                    self.advance().await;
                }
            }
            Err(e) => {
                warn!("⚠️ No se pudo resolver el siguiente track: {}", e);
                self.advance().await;
            }
        }
    }

    /// Camino único de avance, compartido por fin natural, salto y errores.
    async fn advance(&mut self) {
        self.now_playing = None;
        self.current_play = None;
        self.state = PlayerState::Advancing;

        loop {
            match self.queue.dequeue_next() {
                Some(item) => match item.detail {
                    Some(desc) => match self.start_track(desc).await {
                        Ok(()) => break,
                        Err(e) => {
                            warn!("⚠️ Falló el inicio, avanzando al siguiente: {}", e);
                            continue;
                        }
                    },
                    None => {
                        self.begin_resolve(item.reference);
                        break;
                    }
                },
                None => {
                    info!("📭 Cola vacía en guild {}, desconectando", self.guild_id);
                    self.state = PlayerState::Disconnecting;
                    self.lane.disconnect().await;
                    self.state = PlayerState::Idle;
                    break;
                }
            }
        }
    }

    async fn start_track(&mut self, desc: TrackDescriptor) -> Result<(), PlayerError> {
        let play_id = self.next_play_id;
        self.next_play_id += 1;

        let sink = TrackEventSink {
            tx: self.tx.clone(),
            play_id,
        };
        self.lane.play(&desc, sink).await?;

        info!("🎵 Reproduciendo en guild {}: {}", self.guild_id, desc.title);
        self.state = PlayerState::Playing;
        self.current_play = Some(play_id);
        self.now_playing = Some(desc);
        Ok(())
    }

    /// Lanza la resolución del detalle fuera del carril; el resultado vuelve
    /// como mensaje etiquetado con la época vigente.
    fn begin_resolve(&self, reference: TrackRef) {
        let epoch = self.epoch;
        let resolver = self.resolver.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = resolver.resolve_detail(&reference).await;
            let _ = tx.send(PlayerMessage::NextResolved { epoch, result });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::voice::MockVoiceLane;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn descriptor(title: &str) -> TrackDescriptor {
        TrackDescriptor {
            source_ref: format!("https://youtu.be/{title}"),
            stream_url: format!("https://cdn/{title}.m4a"),
            title: title.to_string(),
            page_url: format!("https://youtu.be/{title}"),
            thumbnail: None,
        }
    }

    /// Resolutor de prueba: detalles programados y compuerta opcional para
    /// controlar cuándo completa una resolución en vuelo.
    struct FakeResolver {
        details: StdMutex<HashMap<String, TrackDescriptor>>,
        gate: Option<Arc<Notify>>,
        calls: AtomicUsize,
    }

    impl FakeResolver {
        fn new() -> Self {
            Self {
                details: StdMutex::new(HashMap::new()),
                gate: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn gated(gate: Arc<Notify>) -> Self {
            Self {
                details: StdMutex::new(HashMap::new()),
                gate: Some(gate),
                calls: AtomicUsize::new(0),
            }
        }

        fn with_detail(self, desc: TrackDescriptor) -> Self {
            self.details
                .lock()
                .unwrap()
                .insert(desc.source_ref.clone(), desc.clone());
            self
        }
    }

    #[async_trait]
    impl MetadataResolver for FakeResolver {
        async fn search(&self, _query: &str) -> Result<Vec<TrackRef>, ResolveError> {
            unreachable!("el secuenciador no busca, solo resuelve detalles")
        }

        async fn resolve_detail(&self, track: &TrackRef) -> Result<TrackDescriptor, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.details
                .lock()
                .unwrap()
                .get(&track.source_ref)
                .cloned()
                .ok_or(ResolveError::NotFound)
        }
    }

    struct Harness {
        handle: PlayerHandle,
        played: Arc<StdMutex<Vec<String>>>,
        sinks: Arc<StdMutex<Vec<TrackEventSink>>>,
        connects: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
        disconnects: Arc<AtomicUsize>,
    }

    impl Harness {
        fn new(resolver: Arc<dyn MetadataResolver>) -> Self {
            let played = Arc::new(StdMutex::new(Vec::new()));
            let sinks = Arc::new(StdMutex::new(Vec::new()));
            let connects = Arc::new(AtomicUsize::new(0));
            let stops = Arc::new(AtomicUsize::new(0));
            let disconnects = Arc::new(AtomicUsize::new(0));

            let mut lane = MockVoiceLane::new();
            {
                let connects = connects.clone();
                lane.expect_connect().returning(move |_| {
                    connects.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
            }
            {
                let played = played.clone();
                let sinks = sinks.clone();
                lane.expect_play().returning(move |track, sink| {
                    played.lock().unwrap().push(track.title.clone());
                    sinks.lock().unwrap().push(sink);
                    Ok(())
                });
            }
            {
                let stops = stops.clone();
                lane.expect_stop_current().returning(move || {
                    stops.fetch_add(1, Ordering::SeqCst);
                });
            }
            {
                let disconnects = disconnects.clone();
                lane.expect_disconnect().returning(move || {
                    disconnects.fetch_add(1, Ordering::SeqCst);
                });
            }

            let handle =
                GuildPlayer::spawn(GuildId::new(99), Arc::new(lane), resolver, 100);

            Self {
                handle,
                played,
                sinks,
                connects,
                stops,
                disconnects,
            }
        }

        fn end_current(&self, index: usize, error: Option<String>) {
            let sink = self.sinks.lock().unwrap()[index].clone();
            sink.track_ended(error);
        }

        fn played_titles(&self) -> Vec<String> {
            self.played.lock().unwrap().clone()
        }
    }

    fn channel() -> ChannelId {
        ChannelId::new(7)
    }

    #[tokio::test]
    async fn play_on_idle_starts_immediately() {
        let h = Harness::new(Arc::new(FakeResolver::new()));
        let t1 = descriptor("T1");

        let outcome = h
            .handle
            .enqueue(channel(), vec![QueueItem::resolved(t1.clone())])
            .await
            .unwrap();

        assert_eq!(
            outcome,
            EnqueueOutcome::Started {
                track: t1.clone(),
                queued: 0
            }
        );
        assert_eq!(h.played_titles(), vec!["T1"]);
        assert_eq!(h.connects.load(Ordering::SeqCst), 1);

        let report = h.handle.report().await.unwrap();
        assert_eq!(report.now_playing, Some(t1));
        assert!(report.pending.is_empty());
    }

    #[tokio::test]
    async fn enqueue_while_playing_appends_in_resolution_order() {
        let h = Harness::new(Arc::new(FakeResolver::new()));
        h.handle
            .enqueue(channel(), vec![QueueItem::resolved(descriptor("T1"))])
            .await
            .unwrap();

        let outcome = h
            .handle
            .enqueue(
                channel(),
                vec![
                    QueueItem::resolved(descriptor("T2")),
                    QueueItem::unresolved(TrackRef::new("https://youtu.be/T3")),
                ],
            )
            .await
            .unwrap();

        assert_eq!(outcome, EnqueueOutcome::Queued { queued: 2 });

        let report = h.handle.report().await.unwrap();
        let titles: Vec<&str> = report.pending.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["T2", "https://youtu.be/T3"]);
        // Sin reinicio del track actual
        assert_eq!(h.played_titles(), vec!["T1"]);
    }

    #[tokio::test]
    async fn natural_end_advances_and_empty_queue_disconnects() {
        let h = Harness::new(Arc::new(FakeResolver::new()));
        h.handle
            .enqueue(
                channel(),
                vec![
                    QueueItem::resolved(descriptor("T1")),
                    QueueItem::resolved(descriptor("T2")),
                ],
            )
            .await
            .unwrap();

        h.end_current(0, None);
        let report = h.handle.report().await.unwrap();
        assert_eq!(report.now_playing, Some(descriptor("T2")));
        assert!(report.pending.is_empty());

        h.end_current(1, None);
        let report = h.handle.report().await.unwrap();
        assert_eq!(report.now_playing, None);
        assert_eq!(h.disconnects.load(Ordering::SeqCst), 1);
    }

    async fn enqueue_a_then_b(h: &Harness) {
        h.handle
            .enqueue(
                channel(),
                vec![
                    QueueItem::resolved(descriptor("A")),
                    QueueItem::resolved(descriptor("B")),
                ],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn skip_and_natural_end_yield_identical_state() {
        // Dos carriles idénticos con cola [A, B] reproduciendo A
        let skipped = Harness::new(Arc::new(FakeResolver::new()));
        enqueue_a_then_b(&skipped).await;
        skipped.handle.skip().await.unwrap();
        assert_eq!(skipped.stops.load(Ordering::SeqCst), 1);
        // El stop del driver emite la misma señal de fin que un fin natural
        skipped.end_current(0, None);

        let natural = Harness::new(Arc::new(FakeResolver::new()));
        enqueue_a_then_b(&natural).await;
        natural.end_current(0, None);

        let a = skipped.handle.report().await.unwrap();
        let b = natural.handle.report().await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.now_playing, Some(descriptor("B")));
        assert!(a.pending.is_empty());
    }

    #[tokio::test]
    async fn skip_with_nothing_playing_is_a_precondition_error() {
        let h = Harness::new(Arc::new(FakeResolver::new()));
        let err = h.handle.skip().await.unwrap_err();
        assert!(matches!(err, PlayerError::NothingPlaying));
        assert_eq!(h.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stop_always_clears_and_returns_to_idle() {
        let h = Harness::new(Arc::new(FakeResolver::new()));
        h.handle
            .enqueue(
                channel(),
                vec![
                    QueueItem::resolved(descriptor("T1")),
                    QueueItem::resolved(descriptor("T2")),
                    QueueItem::resolved(descriptor("T3")),
                ],
            )
            .await
            .unwrap();

        h.handle.stop().await.unwrap();

        let report = h.handle.report().await.unwrap();
        assert_eq!(report.now_playing, None);
        assert!(report.pending.is_empty());
        assert!(h.disconnects.load(Ordering::SeqCst) >= 1);

        // El carril sigue operable: un nuevo play reconecta y arranca
        let outcome = h
            .handle
            .enqueue(channel(), vec![QueueItem::resolved(descriptor("T4"))])
            .await
            .unwrap();
        assert!(matches!(outcome, EnqueueOutcome::Started { .. }));
        assert_eq!(h.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stop_supersedes_in_flight_resolution() {
        let gate = Arc::new(Notify::new());
        let resolver = Arc::new(
            FakeResolver::gated(gate.clone()).with_detail(descriptor("tardio")),
        );
        let h = Harness::new(resolver);

        // El primer track entra sin detalle: el carril queda en Advancing
        // esperando la resolución
        let outcome = h
            .handle
            .enqueue(
                channel(),
                vec![QueueItem::unresolved(TrackRef::new("https://youtu.be/tardio"))],
            )
            .await
            .unwrap();
        assert_eq!(outcome, EnqueueOutcome::Starting { queued: 0 });

        h.handle.stop().await.unwrap();

        // Recién ahora completa la resolución pre-stop
        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let report = h.handle.report().await.unwrap();
        assert_eq!(report.now_playing, None);
        assert!(report.pending.is_empty());
        assert!(h.played_titles().is_empty(), "la resolución tardía no debe resucitar la reproducción");
    }

    #[tokio::test]
    async fn deferred_head_resolution_starts_playback() {
        let gate = Arc::new(Notify::new());
        let resolver = Arc::new(
            FakeResolver::gated(gate.clone()).with_detail(descriptor("lento")),
        );
        let h = Harness::new(resolver);

        h.handle
            .enqueue(
                channel(),
                vec![QueueItem::unresolved(TrackRef::new("https://youtu.be/lento"))],
            )
            .await
            .unwrap();

        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let report = h.handle.report().await.unwrap();
        assert_eq!(report.now_playing, Some(descriptor("lento")));
        assert_eq!(h.played_titles(), vec!["lento"]);
    }

    #[tokio::test]
    async fn playback_error_on_completion_still_advances() {
        let h = Harness::new(Arc::new(FakeResolver::new()));
        h.handle
            .enqueue(
                channel(),
                vec![
                    QueueItem::resolved(descriptor("roto")),
                    QueueItem::resolved(descriptor("sano")),
                ],
            )
            .await
            .unwrap();

        h.end_current(0, Some("fin de stream inesperado".into()));

        let report = h.handle.report().await.unwrap();
        assert_eq!(report.now_playing, Some(descriptor("sano")));
    }

    #[tokio::test]
    async fn duplicate_end_signals_are_deduplicated() {
        let h = Harness::new(Arc::new(FakeResolver::new()));
        h.handle
            .enqueue(
                channel(),
                vec![
                    QueueItem::resolved(descriptor("A")),
                    QueueItem::resolved(descriptor("B")),
                    QueueItem::resolved(descriptor("C")),
                ],
            )
            .await
            .unwrap();

        // El driver puede emitir End y Error para el mismo track: solo la
        // primera señal avanza la cola
        h.end_current(0, None);
        h.end_current(0, Some("duplicada".into()));

        let report = h.handle.report().await.unwrap();
        assert_eq!(report.now_playing, Some(descriptor("B")));
        assert_eq!(
            report.pending.iter().map(|e| e.title.as_str()).collect::<Vec<_>>(),
            vec!["C"]
        );
    }

    #[tokio::test]
    async fn failed_resolution_never_wedges_the_queue() {
        // "inexistente" no está programado en el resolutor: su resolución
        // falla y el avance sigue hasta el siguiente track resuelto
        let h = Harness::new(Arc::new(FakeResolver::new()));
        h.handle
            .enqueue(
                channel(),
                vec![
                    QueueItem::resolved(descriptor("A")),
                    QueueItem::unresolved(TrackRef::new("https://youtu.be/inexistente")),
                    QueueItem::resolved(descriptor("C")),
                ],
            )
            .await
            .unwrap();

        h.end_current(0, None);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let report = h.handle.report().await.unwrap();
        assert_eq!(report.now_playing, Some(descriptor("C")));
        assert!(report.pending.is_empty());
    }

    #[tokio::test]
    async fn empty_enqueue_is_an_error_not_a_no_op_connect() {
        let h = Harness::new(Arc::new(FakeResolver::new()));
        let err = h.handle.enqueue(channel(), Vec::new()).await.unwrap_err();
        assert!(matches!(err, PlayerError::EmptyResolution));
        assert_eq!(h.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn registry_distinguishes_never_seen_from_empty() {
        let registry = PlayerRegistry::new(Arc::new(FakeResolver::new()), 100);
        let guild = GuildId::new(42);

        assert!(registry.get(guild).is_none(), "guild nunca vista");

        let handle = registry.get_or_spawn(guild, || Arc::new(MockVoiceLane::new()));

        let report = handle.report().await.unwrap();
        assert!(report.pending.is_empty());
        assert!(registry.get(guild).is_some(), "cola vacía pero guild conocida");
    }

    /// Escenario completo: p foo → T1; p bar → [T2, T3]; fin T1; skip; fin T3.
    #[tokio::test]
    async fn end_to_end_scenario() {
        let h = Harness::new(Arc::new(FakeResolver::new()));

        // `p foo` resuelve a un solo track T1 con la guild ociosa
        let outcome = h
            .handle
            .enqueue(channel(), vec![QueueItem::resolved(descriptor("T1"))])
            .await
            .unwrap();
        assert!(matches!(outcome, EnqueueOutcome::Started { .. }));

        // `p bar` resuelve a [T2, T3] mientras T1 suena
        let outcome = h
            .handle
            .enqueue(
                channel(),
                vec![
                    QueueItem::resolved(descriptor("T2")),
                    QueueItem::resolved(descriptor("T3")),
                ],
            )
            .await
            .unwrap();
        assert_eq!(outcome, EnqueueOutcome::Queued { queued: 2 });

        // T1 termina sin error
        h.end_current(0, None);
        let report = h.handle.report().await.unwrap();
        assert_eq!(report.now_playing, Some(descriptor("T2")));
        assert_eq!(report.pending.len(), 1);

        // skip sobre T2
        h.handle.skip().await.unwrap();
        h.end_current(1, None);
        let report = h.handle.report().await.unwrap();
        assert_eq!(report.now_playing, Some(descriptor("T3")));
        assert!(report.pending.is_empty());

        // T3 termina: conexión liberada, guild ociosa
        h.end_current(2, None);
        let report = h.handle.report().await.unwrap();
        assert_eq!(report.now_playing, None);
        assert_eq!(h.disconnects.load(Ordering::SeqCst), 1);

        assert_eq!(h.played_titles(), vec!["T1", "T2", "T3"]);
    }
}
