//! Settings file loading.
//!
//! The agent reads one TOML file at startup. The `[Server]` section holds the
//! collector endpoint; the remaining sections hold per-feature rules. A
//! missing file yields defaults for everything.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the settings file location.
pub const CONFIG_ENV: &str = "USERACTION_CONFIG";

pub const DEFAULT_IP: &str = "localhost";
pub const DEFAULT_PORT: &str = "30002";

/// Complete settings file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    #[serde(rename = "Server")]
    pub server: ServerSettings,

    #[serde(rename = "Watch")]
    pub watch: WatchSettings,

    #[serde(rename = "Away")]
    pub away: AwaySettings,

    #[serde(rename = "Process")]
    pub process: ProcessSettings,

    #[serde(rename = "Print")]
    pub print: PrintSettings,

    #[serde(rename = "FileIo")]
    pub file_io: FileIoSettings,

    #[serde(rename = "Outbox")]
    pub outbox: OutboxSettings,
}

/// Collector endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerSettings {
    pub ip: String,
    pub port: String,
    /// Reconnect interval in milliseconds. Zero disables reconnection.
    pub retry_interval: u64,
    /// Connect timeout in milliseconds.
    pub connect_timeout: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            ip: DEFAULT_IP.to_string(),
            port: DEFAULT_PORT.to_string(),
            retry_interval: 0,
            connect_timeout: 3000,
        }
    }
}

impl ServerSettings {
    /// Parses the configured port.
    pub fn port_number(&self) -> Result<u16, ConfigError> {
        match self.port.trim().parse::<u16>() {
            Ok(port) if port != 0 => Ok(port),
            _ => Err(ConfigError::InvalidPort(self.port.clone())),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatchSettings {
    /// Watch tick in milliseconds.
    pub interval: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self { interval: 1000 }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AwaySettings {
    /// Idle seconds before the user counts as away.
    pub threshold: u64,
}

impl Default for AwaySettings {
    fn default() -> Self {
        Self { threshold: 300 }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessSettings {
    /// Name patterns to report. Empty means every launch.
    pub watch: Vec<String>,
    /// Name patterns never reported.
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PrintSettings {
    pub enabled: bool,
    pub spool_dir: Option<PathBuf>,
}

impl Default for PrintSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            spool_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileIoSettings {
    pub paths: Vec<PathBuf>,
    pub recursive: bool,
    /// Extensions to report, without the dot. Empty means all.
    pub extensions: Vec<String>,
    pub create: bool,
    pub modify: bool,
    pub remove: bool,
}

impl Default for FileIoSettings {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            recursive: true,
            extensions: Vec::new(),
            create: true,
            modify: true,
            remove: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct OutboxSettings {
    pub enabled: bool,
    pub max_records: usize,
}

impl Default for OutboxSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_records: 10_000,
        }
    }
}

impl Settings {
    /// Resolves the settings path: `$USERACTION_CONFIG`, else
    /// `<home>/.userAction/settings.toml`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        dirs::home_dir()
            .map(|home| home.join(".userAction").join("settings.toml"))
            .ok_or(ConfigError::NoProfileDir)
    }

    /// Loads settings from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = ?path, "Settings file not found, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let settings = Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        // Reject an unusable port now rather than on the first connect.
        settings.server.port_number()?;

        tracing::info!(
            path = ?path,
            ip = %settings.server.ip,
            port = %settings.server.port,
            retry_ms = settings.server.retry_interval,
            "Settings loaded"
        );
        Ok(settings)
    }

    /// Parses settings text.
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}
