use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{cookies, MetadataResolver, ResolveError, TrackDescriptor, TrackRef};
use crate::cache::ResolverCache;
use crate::config::Config;

const UPSTREAM_DOMAIN: &str = "youtube.com";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Resolutor de metadatos respaldado por el proceso externo `yt-dlp`.
///
/// Las llamadas al proceso pasan por un pool acotado (`Semaphore`) para no
/// saturar el runtime con extracciones lentas, y por la caché compartida con
/// colapso de resoluciones concurrentes por clave.
pub struct YtDlpResolver {
    cache: ResolverCache,
    permits: Arc<Semaphore>,
    cookies_file: Option<PathBuf>,
}

impl YtDlpResolver {
    pub fn new(config: &Config) -> Self {
        Self {
            cache: ResolverCache::new(),
            permits: Arc::new(Semaphore::new(config.max_concurrent_resolutions)),
            cookies_file: config.cookies_file.clone(),
        }
    }

    /// Una query que ya es URL http(s) se pasa tal cual; el resto se envuelve
    /// como búsqueda de un resultado.
    fn search_target(query: &str) -> String {
        if is_direct_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{query}")
        }
    }

    async fn run_ytdlp(&self, extra_args: &[&str], target: &str) -> Result<String, ResolveError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ResolveError::Upstream("pool de resolución cerrado".into()))?;

        // Export transitorio: vive solo lo que dura esta llamada
        let cookies = cookies::export_for(self.cookies_file.as_deref(), UPSTREAM_DOMAIN);

        let mut cmd = tokio::process::Command::new("yt-dlp");
        cmd.args([
            "-J",
            "--skip-download",
            "--no-warnings",
            "--quiet",
            "--user-agent",
            USER_AGENT,
            "--socket-timeout",
            "15",
            "--retries",
            "2",
        ]);
        cmd.args(extra_args);
        if let Some(export) = &cookies {
            cmd.arg("--cookies").arg(export.path());
        }
        cmd.arg(target);

        let output = cmd
            .output()
            .await
            .map_err(|e| ResolveError::Upstream(format!("no se pudo ejecutar yt-dlp: {e}")))?;

        drop(cookies);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp terminó con error: {}", stderr.trim());
            return Err(ResolveError::Upstream(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl MetadataResolver for YtDlpResolver {
    async fn search(&self, query: &str) -> Result<Vec<TrackRef>, ResolveError> {
        self.cache
            .search_with(query, || async {
                info!("🔍 Buscando upstream: {}", query);
                let target = Self::search_target(query);
                let json = self
                    .run_ytdlp(&["--flat-playlist"], &target)
                    .await?;
                let refs = parse_search_json(&json)?;
                info!("🔍 {} referencia(s) para: {}", refs.len(), query);
                Ok(refs)
            })
            .await
    }

    async fn resolve_detail(&self, track: &TrackRef) -> Result<TrackDescriptor, ResolveError> {
        self.cache
            .detail_with(&track.source_ref, || async {
                debug!("📄 Resolviendo detalle de: {}", track.source_ref);
                let json = self
                    .run_ytdlp(
                        &["--no-playlist", "--format", "bestaudio/best"],
                        &track.source_ref,
                    )
                    .await?;
                parse_detail_json(&json, &track.source_ref)
            })
            .await
    }
}

fn is_direct_url(query: &str) -> bool {
    url::Url::parse(query)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
struct FlatInfo {
    entries: Option<Vec<FlatEntry>>,
    webpage_url: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FlatEntry {
    url: Option<String>,
    id: Option<String>,
}

/// Interpreta la salida `-J --flat-playlist`: una playlist o búsqueda trae
/// `entries`; un video suelto es el objeto directo. Mantiene el orden que
/// entrega el extractor.
fn parse_search_json(json: &str) -> Result<Vec<TrackRef>, ResolveError> {
    let info: FlatInfo = serde_json::from_str(json)
        .map_err(|e| ResolveError::Upstream(format!("respuesta ilegible de yt-dlp: {e}")))?;

    let refs: Vec<TrackRef> = match info.entries {
        Some(entries) => entries
            .into_iter()
            .filter_map(|entry| {
                entry.url.or_else(|| {
                    entry
                        .id
                        .map(|id| format!("https://www.youtube.com/watch?v={id}"))
                })
            })
            .map(TrackRef::new)
            .collect(),
        None => info
            .webpage_url
            .or(info.url)
            .map(TrackRef::new)
            .into_iter()
            .collect(),
    };

    if refs.is_empty() {
        return Err(ResolveError::NotFound);
    }
    Ok(refs)
}

#[derive(Debug, Deserialize)]
struct DetailInfo {
    url: Option<String>,
    title: Option<String>,
    webpage_url: Option<String>,
    thumbnail: Option<String>,
    entries: Option<Vec<DetailInfo>>,
}

/// Interpreta la salida `-J` de una extracción completa. Si el extractor
/// devolvió una lista (búsqueda), se toma la primera entrada.
fn parse_detail_json(json: &str, source_ref: &str) -> Result<TrackDescriptor, ResolveError> {
    let mut info: DetailInfo = serde_json::from_str(json)
        .map_err(|e| ResolveError::Upstream(format!("respuesta ilegible de yt-dlp: {e}")))?;

    if let Some(entries) = info.entries.take() {
        info = entries.into_iter().next().ok_or(ResolveError::NotFound)?;
    }

    let stream_url = info
        .url
        .ok_or_else(|| ResolveError::Upstream("respuesta sin URL de stream".into()))?;

    Ok(TrackDescriptor {
        source_ref: source_ref.to_string(),
        stream_url,
        title: info.title.unwrap_or_else(|| source_ref.to_string()),
        page_url: info.webpage_url.unwrap_or_else(|| source_ref.to_string()),
        thumbnail: info.thumbnail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_direct_url_detection() {
        assert!(is_direct_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_direct_url("http://youtu.be/dQw4w9WgXcQ"));
        assert!(!is_direct_url("lofi hip hop radio"));
        assert!(!is_direct_url("ftp://example.com/archivo"));
    }

    #[test]
    fn search_target_wraps_free_text() {
        assert_eq!(
            YtDlpResolver::search_target("musica brasileira"),
            "ytsearch1:musica brasileira"
        );
        assert_eq!(
            YtDlpResolver::search_target("https://youtu.be/abc"),
            "https://youtu.be/abc"
        );
    }

    #[test]
    fn parses_playlist_entries_in_order() {
        let json = r#"{
            "entries": [
                {"url": "https://www.youtube.com/watch?v=a1", "id": "a1"},
                {"id": "b2"},
                {"url": "https://www.youtube.com/watch?v=c3", "id": "c3"}
            ]
        }"#;
        let refs = parse_search_json(json).unwrap();
        assert_eq!(
            refs,
            vec![
                TrackRef::new("https://www.youtube.com/watch?v=a1"),
                TrackRef::new("https://www.youtube.com/watch?v=b2"),
                TrackRef::new("https://www.youtube.com/watch?v=c3"),
            ]
        );
    }

    #[test]
    fn single_video_becomes_one_ref() {
        let json = r#"{"webpage_url": "https://www.youtube.com/watch?v=solo"}"#;
        let refs = parse_search_json(json).unwrap();
        assert_eq!(refs, vec![TrackRef::new("https://www.youtube.com/watch?v=solo")]);
    }

    #[test]
    fn empty_entries_is_not_found() {
        let json = r#"{"entries": []}"#;
        assert!(matches!(parse_search_json(json), Err(ResolveError::NotFound)));
    }

    #[test]
    fn detail_reads_stream_url_and_metadata() {
        let json = r#"{
            "url": "https://cdn.example/audio.m4a",
            "title": "Una | Canción",
            "webpage_url": "https://www.youtube.com/watch?v=xyz",
            "thumbnail": "https://i.ytimg.com/vi/xyz/hq720.jpg"
        }"#;
        let desc = parse_detail_json(json, "https://youtu.be/xyz").unwrap();
        assert_eq!(desc.stream_url, "https://cdn.example/audio.m4a");
        assert_eq!(desc.title, "Una | Canción");
        assert_eq!(desc.page_url, "https://www.youtube.com/watch?v=xyz");
        assert_eq!(
            desc.thumbnail.as_deref(),
            Some("https://i.ytimg.com/vi/xyz/hq720.jpg")
        );
        assert_eq!(desc.source_ref, "https://youtu.be/xyz");
    }

    #[test]
    fn detail_unwraps_search_entries() {
        let json = r#"{"entries": [{"url": "https://cdn.example/a.m4a", "title": "A"}]}"#;
        let desc = parse_detail_json(json, "consulta").unwrap();
        assert_eq!(desc.stream_url, "https://cdn.example/a.m4a");
        assert_eq!(desc.title, "A");
        assert_eq!(desc.page_url, "consulta");
    }

    #[test]
    fn detail_without_stream_url_is_upstream_error() {
        let json = r#"{"title": "Sin stream"}"#;
        assert!(matches!(
            parse_detail_json(json, "ref"),
            Err(ResolveError::Upstream(_))
        ));
    }
}
