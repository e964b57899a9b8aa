//! Application configuration management.
//!
//! This module handles loading and saving the configuration: where the
//! backend lives, which storage backend holds the token, which routes are
//! public and how the guard decides.
//!
//! Configuration is stored at `~/.config/authgate/config.json`; a few fields
//! can be overridden from the environment.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::client::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::auth::{GuardMode, PublicRoutes, DEFAULT_LOGIN_PATH, DEFAULT_PUBLIC_ROUTES, DEFAULT_TOKEN_KEY};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "authgate";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Storage file name in the cache directory
const STORAGE_FILE: &str = "storage.json";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

const DEFAULT_WATCH_INTERVAL_MS: u64 = 1000;

const ENV_API_URL: &str = "AUTHGATE_API_URL";
const ENV_TOKEN_KEY: &str = "AUTHGATE_TOKEN_KEY";
const ENV_GUARD_MODE: &str = "AUTHGATE_GUARD_MODE";
const ENV_STORAGE: &str = "AUTHGATE_STORAGE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Memory,
    Keyring,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageBackend::File => "file",
            StorageBackend::Memory => "memory",
            StorageBackend::Keyring => "keyring",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageBackend::File),
            "memory" => Ok(StorageBackend::Memory),
            "keyring" => Ok(StorageBackend::Keyring),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub token_key: String,
    pub login_path: String,
    pub public_routes: Vec<String>,
    pub guard_mode: GuardMode,
    pub storage: StorageBackend,
    /// Overrides the default storage file location.
    pub storage_path: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub watch_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            token_key: DEFAULT_TOKEN_KEY.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            public_routes: DEFAULT_PUBLIC_ROUTES.iter().map(|r| r.to_string()).collect(),
            guard_mode: GuardMode::default(),
            storage: StorageBackend::default(),
            storage_path: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            watch_interval_ms: DEFAULT_WATCH_INTERVAL_MS,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            debug!(path = %path.display(), "Loaded config");
            let config: Self = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            config
                .validate()
                .with_context(|| format!("Invalid config file {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values that would silently break the session: a zero timeout
    /// fails every request, a zero watch interval stops file syncing.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than zero");
        }
        if self.watch_interval_ms == 0 {
            bail!("watch_interval_ms must be greater than zero");
        }
        if self.token_key.is_empty() {
            bail!("token_key must not be empty");
        }
        if self.login_path.is_empty() {
            bail!("login_path must not be empty");
        }
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = var(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(key) = var(ENV_TOKEN_KEY) {
            self.token_key = key;
        }
        if let Some(mode) = var(ENV_GUARD_MODE) {
            self.guard_mode = mode
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .with_context(|| format!("Invalid {}", ENV_GUARD_MODE))?;
        }
        if let Some(storage) = var(ENV_STORAGE) {
            self.storage = storage
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .with_context(|| format!("Invalid {}", ENV_STORAGE))?;
        }
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn storage_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.storage_path {
            return Ok(path.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join(STORAGE_FILE))
    }

    pub fn public_routes(&self) -> PublicRoutes {
        PublicRoutes::new(self.public_routes.iter().cloned())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }
}
