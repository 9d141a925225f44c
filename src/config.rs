use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Cola
    pub max_queue_size: usize,

    // Resolución de metadatos
    pub max_concurrent_resolutions: usize,
    pub cookies_file: Option<PathBuf>,

    // Voz
    pub disconnect_timeout_secs: u64,
    pub reconnect_delay_max_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            command_prefix: std::env::var("COMMAND_PREFIX")
                .unwrap_or_else(|_| "#".to_string()),

            // Cola
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,

            // Resolución
            max_concurrent_resolutions: match std::env::var("MAX_CONCURRENT_RESOLUTIONS") {
                Ok(val) if !val.trim().is_empty() => val.parse()?,
                _ => num_cpus::get(),
            },
            cookies_file: std::env::var("COOKIES_FILE").ok().map(PathBuf::from),

            // Voz
            disconnect_timeout_secs: std::env::var("DISCONNECT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            reconnect_delay_max_secs: std::env::var("RECONNECT_DELAY_MAX_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Chequeos de sanidad sobre los valores cargados.
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN no puede estar vacío");
        }

        if self.command_prefix.is_empty() {
            anyhow::bail!("El prefijo de comandos no puede estar vacío");
        }

        if self.command_prefix.len() > 3 {
            anyhow::bail!(
                "El prefijo de comandos debe tener a lo sumo 3 caracteres, tiene: {}",
                self.command_prefix.len()
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("MAX_QUEUE_SIZE debe ser mayor que 0");
        }

        if self.max_concurrent_resolutions == 0 {
            anyhow::bail!("MAX_CONCURRENT_RESOLUTIONS debe ser mayor que 0");
        }

        if self.disconnect_timeout_secs == 0 {
            anyhow::bail!("DISCONNECT_TIMEOUT_SECS debe ser mayor que 0");
        }

        Ok(())
    }

    /// Resumen apto para loguear: nunca incluye el token.
    pub fn summary(&self) -> String {
        format!(
            "Config: prefijo '{}', cola máx {}, {} resoluciones concurrentes, \
             cookies {}, timeout de desconexión {}s",
            self.command_prefix,
            self.max_queue_size,
            self.max_concurrent_resolutions,
            self.cookies_file
                .as_ref()
                .map_or("auto".to_string(), |p| p.display().to_string()),
            self.disconnect_timeout_secs,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Sin default: tiene que venir del entorno
            discord_token: String::new(),
            command_prefix: "#".to_string(),
            max_queue_size: 1000,
            max_concurrent_resolutions: num_cpus::get(),
            cookies_file: None,
            disconnect_timeout_secs: 5,
            reconnect_delay_max_secs: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn valid_config() -> Config {
        Config {
            discord_token: "token-de-prueba".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn default_prefix_is_hash() {
        assert_eq!(Config::default().command_prefix, "#");
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn empty_token_is_rejected() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_prefix_is_rejected() {
        let config = Config {
            command_prefix: String::new(),
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_queue_size_is_rejected() {
        let config = Config {
            max_queue_size: 0,
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn summary_never_leaks_the_token() {
        let config = valid_config();
        assert!(!config.summary().contains("token-de-prueba"));
    }
}
