use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

const NETSCAPE_HEADER: &str = "# Netscape HTTP Cookie File";

/// Archivo de cookies transitorio en formato Netscape.
///
/// Se crea inmediatamente antes de cada llamada al extractor y se borra al
/// salir de alcance (drop del temporal). La extracción es best-effort: si no
/// hay material de cookies disponible se degrada a una consulta sin
/// autenticar en lugar de fallar.
pub struct CookieExport {
    file: NamedTempFile,
}

impl CookieExport {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Rutas conocidas donde suele existir un export de cookies del navegador.
fn default_sources() -> Vec<PathBuf> {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    vec![
        PathBuf::from(format!("{home}/.config/yt-dlp/cookies.txt")),
        PathBuf::from(format!("{home}/.config/fila-music/cookies.txt")),
        PathBuf::from("./cookies.txt"),
    ]
}

/// Exporta las cookies del dominio `domain` a un archivo temporal Netscape.
///
/// Devuelve `None` ante cualquier problema (sin fuente, sin líneas del
/// dominio, error de E/S); el llamador continúa sin cookies.
pub fn export_for(configured: Option<&Path>, domain: &str) -> Option<CookieExport> {
    let mut candidates = Vec::new();
    if let Some(path) = configured {
        candidates.push(path.to_path_buf());
    }
    candidates.extend(default_sources());

    for source in &candidates {
        if source.exists() {
            debug!("🍪 Fuente de cookies encontrada en: {}", source.display());
            match export_from(source, domain) {
                Ok(Some(export)) => return Some(export),
                Ok(None) => {
                    debug!("🍪 Sin cookies del dominio {} en {}", domain, source.display())
                }
                Err(e) => warn!("🍪 Error exportando cookies de {}: {}", source.display(), e),
            }
        }
    }

    warn!("🍪 No se encontraron cookies, consultando sin autenticar");
    None
}

/// Filtra `source` a las líneas del dominio y las escribe en un temporal.
fn export_from(source: &Path, domain: &str) -> std::io::Result<Option<CookieExport>> {
    let content = std::fs::read_to_string(source)?;

    let matching: Vec<&str> = content
        .lines()
        .filter(|line| {
            if line.starts_with('#') || line.trim().is_empty() {
                return false;
            }
            // Campo 1 del formato Netscape: dominio de la cookie
            line.split('\t')
                .next()
                .map(|d| d.contains(domain))
                .unwrap_or(false)
        })
        .collect();

    if matching.is_empty() {
        return Ok(None);
    }

    let mut file = NamedTempFile::new()?;
    writeln!(file, "{NETSCAPE_HEADER}")?;
    for line in &matching {
        writeln!(file, "{line}")?;
    }
    file.flush()?;

    Ok(Some(CookieExport { file }))
}
