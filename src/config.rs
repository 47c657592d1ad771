use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Settings for the ports trigger binary
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    /// Property store location
    #[serde(default)]
    pub store: StoreSettings,

    /// Log output
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Port allocation behavior
    #[serde(default)]
    pub ports: PortSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreSettings {
    /// Path to the SQLite database (default: <data dir>/spawngate/ports.db)
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    /// tracing filter directive, overridden by RUST_LOG
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PortSettings {
    /// Lowest port `ports-get-available` may hand out (default: 1025)
    #[serde(default = "default_available_port_min")]
    pub available_port_min: u16,

    /// Ephemeral bind attempts before giving up (default: 20)
    #[serde(default = "default_available_port_attempts")]
    pub available_port_attempts: u32,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            available_port_min: default_available_port_min(),
            available_port_attempts: default_available_port_attempts(),
        }
    }
}

fn default_store_path() -> PathBuf {
    dirs_next::data_dir()
        .map(|dir| dir.join("spawngate"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ports.db")
}

fn default_log_filter() -> String {
    "spawngate_ports=info".to_string()
}

fn default_available_port_min() -> u16 {
    1025
}

fn default_available_port_attempts() -> u32 {
    20
}

impl Settings {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load `path` when it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate all settings
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut errors = Vec::new();

        if self.ports.available_port_min == 0 {
            errors.push("ports.available_port_min must be at least 1".to_string());
        }

        if self.ports.available_port_attempts == 0 {
            errors.push("ports.available_port_attempts must be at least 1".to_string());
        }

        if self.store.path.as_os_str().is_empty() {
            errors.push("store.path must not be empty".to_string());
        }

        if !errors.is_empty() {
            anyhow::bail!("Configuration errors:\n  - {}", errors.join("\n  - "));
        }

        Ok(())
    }
}
