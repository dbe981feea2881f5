//! CruzeiroChat configuration loader.
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML file,
//! environment variables (after `.env` is loaded), then CLI flags.

use ct_llm::{GEMINI_API_BASE_URL, ModelConfig};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "cruzeiro.toml";
pub const CREDENTIAL_ENV_VAR: &str = "GOOGLE_API_KEY";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Raises the default log filter to `debug`.
    #[serde(default)]
    pub debug: bool,
}

fn default_bind_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            debug: false,
        }
    }
}

#[derive(Clone, Default, Deserialize)]
pub struct KeysConfig {
    pub google_api_key: Option<String>,
}

impl std::fmt::Debug for KeysConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeysConfig")
            .field(
                "google_api_key",
                &self.google_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_provider_base_url() -> String {
    GEMINI_API_BASE_URL.to_string()
}

fn default_request_timeout_seconds() -> u64 {
    60
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

/// Bounds on the in-memory session registry.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Sessions idle longer than this are dropped when a new one is created.
    #[serde(default = "default_idle_timeout_seconds")]
    pub idle_timeout_seconds: u64,
}

fn default_max_sessions() -> usize {
    1000
}

fn default_idle_timeout_seconds() -> u64 {
    60 * 60
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            idle_timeout_seconds: default_idle_timeout_seconds(),
        }
    }
}

impl AppConfig {
    /// Load from `path` (must exist) or from `./cruzeiro.toml` when present,
    /// then apply environment overrides and validate.
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<(Self, Option<PathBuf>)> {
        let path = match path {
            Some(p) => Some(p),
            None => {
                let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
                tokio::fs::try_exists(&candidate)
                    .await
                    .unwrap_or(false)
                    .then_some(candidate)
            }
        };

        let mut cfg = match path.as_deref() {
            Some(p) => Self::from_file(p).await?,
            None => Self::default(),
        };

        cfg.apply_env_overrides(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok((cfg, path))
    }

    async fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("read config {}: {e}", path.display()))?;
        toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))
    }

    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(CREDENTIAL_ENV_VAR) {
            self.keys.google_api_key = Some(v);
        }
        if let Some(v) = get("CRUZEIRO_MODEL") {
            self.model.model = v.trim().to_string();
        }
        if let Some(v) = get("CRUZEIRO_BIND_ADDR") {
            self.server.bind_addr = v.trim().to_string();
        }
        if let Some(v) = get("CRUZEIRO_PORT") {
            self.server.port = v
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("CRUZEIRO_PORT {v:?} is not a valid port: {e}"))?;
        }
        if let Some(v) = get("CRUZEIRO_GEMINI_BASE_URL") {
            self.provider.base_url = v.trim().to_string();
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.model.model.trim().is_empty() {
            return Err(anyhow::anyhow!("model.model is required"));
        }
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("server.port must be > 0"));
        }
        if self.provider.base_url.trim().is_empty() {
            return Err(anyhow::anyhow!("provider.base_url is required"));
        }
        if self.provider.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!(
                "provider.request_timeout_seconds must be > 0"
            ));
        }
        if self.sessions.max_sessions == 0 || self.sessions.idle_timeout_seconds == 0 {
            return Err(anyhow::anyhow!(
                "sessions.max_sessions and sessions.idle_timeout_seconds must be > 0"
            ));
        }
        let g = &self.model.generation;
        if !(0.0..=2.0).contains(&g.temperature) {
            return Err(anyhow::anyhow!(
                "model.generation.temperature must be within [0, 2]"
            ));
        }
        if !(0.0..=1.0).contains(&g.top_p) {
            return Err(anyhow::anyhow!(
                "model.generation.top_p must be within [0, 1]"
            ));
        }
        if g.top_k == 0 || g.max_output_tokens == 0 {
            return Err(anyhow::anyhow!(
                "model.generation.top_k and max_output_tokens must be > 0"
            ));
        }
        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        let ip: IpAddr = self.server.bind_addr.trim().parse().map_err(|e| {
            anyhow::anyhow!("server.bind_addr {:?} is invalid: {e}", self.server.bind_addr)
        })?;
        Ok(SocketAddr::new(ip, self.server.port))
    }
}
