use anyhow::Context;
use serde::Deserialize;
use std::{path::Path, path::PathBuf, time::Duration};

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Reads the config file, or falls back to defaults when no path is given
    pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
        let Some(path) = path else {
            return Ok(Config::default());
        };

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.to_string_lossy()))?;
        toml::from_str(&contents).with_context(|| "Failed to parse config TOML")
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub bind_addr: String,
    pub port: u16,
    /// How long in-flight requests may run after a shutdown signal
    pub shutdown_timeout_secs: u64,
}

impl HttpConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 8080,
            shutdown_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    #[default]
    Memory,
    Sqlite {
        path: PathBuf,
        #[serde(default = "default_busy_timeout_ms")]
        busy_timeout_ms: u64,
    },
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_config_toml() -> anyhow::Result<()> {
        let toml_str = r#"
[http]
bind_addr = "0.0.0.0"
port = 9090
shutdown_timeout_secs = 3

[store]
backend = "sqlite"
path = "/var/lib/trackdeck/tracks.db"

[log]
level = "debug"
"#;

        let cfg: Config = toml::from_str(toml_str)?;

        assert_eq!(cfg.http.addr(), "0.0.0.0:9090");
        assert_eq!(cfg.http.shutdown_timeout(), Duration::from_secs(3));
        assert_eq!(
            cfg.store,
            StoreConfig::Sqlite {
                path: PathBuf::from("/var/lib/trackdeck/tracks.db"),
                busy_timeout_ms: 5000,
            }
        );
        assert_eq!(cfg.log.level, "debug");

        Ok(())
    }

    #[test]
    fn test_empty_config_uses_defaults() -> anyhow::Result<()> {
        let cfg: Config = toml::from_str("")?;

        assert_eq!(cfg.http.addr(), "127.0.0.1:8080");
        assert_eq!(cfg.http.shutdown_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.store, StoreConfig::Memory);
        assert_eq!(cfg.log.level, "info");

        Ok(())
    }

    #[test]
    fn test_partial_http_section() -> anyhow::Result<()> {
        let cfg: Config = toml::from_str("[http]\nport = 3000\n")?;

        assert_eq!(cfg.http.addr(), "127.0.0.1:3000");
        Ok(())
    }

    #[test]
    fn test_memory_backend() -> anyhow::Result<()> {
        let cfg: Config = toml::from_str("[store]\nbackend = \"memory\"\n")?;

        assert_eq!(cfg.store, StoreConfig::Memory);
        Ok(())
    }

    #[test]
    fn test_load_without_path() -> anyhow::Result<()> {
        let cfg = Config::load(None)?;

        assert_eq!(cfg.store, StoreConfig::Memory);
        Ok(())
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(Config::load(Some(Path::new("/nonexistent/trackdeck.toml"))).is_err());
    }
}
