use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Docpair";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default bind address for the HTTP API.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

/// Default per-call timeout for backend requests. The backends are never
/// retried, so an expired timeout surfaces as a backend failure for the
/// one document being processed.
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} environment variable must be set")]
    MissingEnv(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Connection settings for one extraction backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub api_key: String,
}

/// Process-wide configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub gemini: BackendConfig,
    pub openai: BackendConfig,
    pub backend_timeout_secs: u64,
}

impl AppConfig {
    /// Load configuration from the environment.
    ///
    /// `GEMINI_API_KEY` and `OPENAI_API_KEY` are required; everything else
    /// has a default. Base URLs are overridable for test stubs and proxies.
    pub fn from_env() -> Result<Self, ConfigError> {
        let gemini_key =
            std::env::var("GEMINI_API_KEY").map_err(|_| ConfigError::MissingEnv("GEMINI_API_KEY"))?;
        let openai_key =
            std::env::var("OPENAI_API_KEY").map_err(|_| ConfigError::MissingEnv("OPENAI_API_KEY"))?;

        let bind_raw =
            std::env::var("DOCPAIR_BIND").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let bind_addr: SocketAddr = bind_raw.parse().map_err(|_| ConfigError::Invalid {
            name: "DOCPAIR_BIND",
            value: bind_raw.clone(),
        })?;

        let data_dir = std::env::var("DOCPAIR_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| app_data_dir());

        let backend_timeout_secs = match std::env::var("DOCPAIR_BACKEND_TIMEOUT_SECS") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "DOCPAIR_BACKEND_TIMEOUT_SECS",
                value: raw,
            })?,
            Err(_) => DEFAULT_BACKEND_TIMEOUT_SECS,
        };

        Ok(Self {
            bind_addr,
            data_dir,
            gemini: BackendConfig {
                base_url: std::env::var("GEMINI_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.to_string()),
                api_key: gemini_key,
            },
            openai: BackendConfig {
                base_url: std::env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string()),
                api_key: openai_key,
            },
            backend_timeout_secs,
        })
    }

    /// SQLite database path under the data directory.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("docpair.db")
    }

    /// Directory where uploaded originals are stored.
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }
}

/// Default application data directory: ~/Docpair/
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join(APP_NAME)
}

/// Default log filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    format!("{}=info,tower_http=warn", env!("CARGO_PKG_NAME"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_under_home() {
        let dir = app_data_dir();
        let home = dirs::home_dir().unwrap();
        assert!(dir.starts_with(home));
        assert!(dir.ends_with("Docpair"));
    }

    #[test]
    fn database_path_under_data_dir() {
        let config = AppConfig {
            bind_addr: DEFAULT_BIND_ADDR.parse().unwrap(),
            data_dir: PathBuf::from("/tmp/docpair-test"),
            gemini: BackendConfig {
                base_url: DEFAULT_GEMINI_BASE_URL.into(),
                api_key: "k".into(),
            },
            openai: BackendConfig {
                base_url: DEFAULT_OPENAI_BASE_URL.into(),
                api_key: "k".into(),
            },
            backend_timeout_secs: DEFAULT_BACKEND_TIMEOUT_SECS,
        };
        assert!(config.database_path().ends_with("docpair.db"));
        assert!(config.uploads_dir().ends_with("uploads"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn default_timeout_is_two_minutes() {
        assert_eq!(DEFAULT_BACKEND_TIMEOUT_SECS, 120);
    }
}
