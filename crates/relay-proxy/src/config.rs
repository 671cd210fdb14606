//! Configuration types and loading logic.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use relay_tracing::TracingConfig;
use serde::{Deserialize, Serialize};
use url::Url;

/// Environment variable that overrides `backend.base_url` directly.
pub const BACKEND_BASE_URL_ENV: &str = "BACKEND_BASE_URL";

/// Top-level proxy configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

/// Server listen configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Path prefix under which requests are relayed to the backend.
    #[serde(default = "default_mount_path")]
    pub mount_path: String,
}

/// Backend origin configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Connect timeout and longest silence tolerated while waiting for backend
    /// bytes. A response that keeps streaming is not cut off.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Upper bound on a buffered inbound request body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_listen_address() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_mount_path() -> String {
    "/api/backend".to_string()
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout() -> u64 {
    300
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            mount_path: default_mount_path(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Serialize)]
struct BaseUrlOverride<'a> {
    backend: BaseUrlOnly<'a>,
}

#[derive(Serialize)]
struct BaseUrlOnly<'a> {
    base_url: &'a str,
}

impl ProxyConfig {
    /// Load configuration from an optional TOML file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. `BACKEND_BASE_URL`
    /// 2. Environment variables (RELAY_ prefix, __ for nesting)
    /// 3. TOML config file (missing file is not an error)
    /// 4. Defaults
    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        Self::from_figment(Self::figment(config_path))
    }

    fn figment(config_path: &str) -> Figment {
        let mut figment = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("RELAY_").split("__"));

        if let Ok(url) = std::env::var(BACKEND_BASE_URL_ENV) {
            figment = figment.merge(Serialized::defaults(BaseUrlOverride {
                backend: BaseUrlOnly { base_url: &url },
            }));
        }
        figment
    }

    fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let mut config: ProxyConfig = figment.extract()?;
        config.server.mount_path = normalize_mount_path(&config.server.mount_path)?;
        Ok(config)
    }
}

impl BackendConfig {
    /// Parse and validate `base_url` as an absolute http(s) origin.
    ///
    /// A path on the base URL is kept and becomes a prefix of every target.
    pub fn origin(&self) -> anyhow::Result<Url> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| anyhow::anyhow!("invalid backend base_url {:?}: {e}", self.base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!(
                "backend base_url must use http or https, got {:?}",
                url.scheme()
            );
        }
        if url.host_str().is_none() {
            anyhow::bail!("backend base_url {:?} has no host", self.base_url);
        }
        Ok(url)
    }
}

/// Normalize the mount prefix to a leading `/` and no trailing `/`.
fn normalize_mount_path(raw: &str) -> anyhow::Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        anyhow::bail!("server.mount_path must not be the root path");
    }
    if trimmed.contains(['?', '#', '{', '}']) {
        anyhow::bail!("server.mount_path {raw:?} contains reserved characters");
    }
    if trimmed.starts_with('/') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("/{trimmed}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(toml: &str) -> anyhow::Result<ProxyConfig> {
        ProxyConfig::from_figment(Figment::new().merge(Toml::string(toml)))
    }

    #[test]
    fn test_defaults_without_file() {
        let config = from_toml("").unwrap();
        assert_eq!(config.server.listen_address, "0.0.0.0:3000");
        assert_eq!(config.server.mount_path, "/api/backend");
        assert_eq!(config.backend.base_url, "http://localhost:8080");
        assert_eq!(config.backend.timeout_secs, 300);
        assert_eq!(config.backend.max_body_bytes, 10 * 1024 * 1024);
        assert_eq!(config.tracing.service_name, "relay-proxy");
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config = from_toml(
            r#"
            [backend]
            base_url = "https://auth.internal:8443"

            [server]
            mount_path = "proxy/"
            "#,
        )
        .unwrap();
        assert_eq!(config.backend.base_url, "https://auth.internal:8443");
        assert_eq!(config.backend.timeout_secs, 300);
        assert_eq!(config.server.mount_path, "/proxy");
        assert_eq!(config.server.listen_address, "0.0.0.0:3000");
    }

    #[test]
    fn test_base_url_override_wins_over_file() {
        let figment = Figment::new()
            .merge(Toml::string("[backend]\nbase_url = \"http://file:1\""))
            .merge(Serialized::defaults(BaseUrlOverride {
                backend: BaseUrlOnly {
                    base_url: "http://env:2",
                },
            }));
        let config = ProxyConfig::from_figment(figment).unwrap();
        assert_eq!(config.backend.base_url, "http://env:2");
        // Sibling keys in the section survive the override.
        assert_eq!(config.backend.timeout_secs, 300);
    }

    #[test]
    fn test_root_mount_path_rejected() {
        assert!(from_toml("[server]\nmount_path = \"/\"").is_err());
        assert!(from_toml("[server]\nmount_path = \"/a?b\"").is_err());
    }

    #[test]
    fn test_origin_validation() {
        let mut backend = BackendConfig::default();
        let origin = backend.origin().unwrap();
        assert_eq!(origin.as_str(), "http://localhost:8080/");

        backend.base_url = "ftp://files.example".to_string();
        assert!(backend.origin().is_err());

        backend.base_url = "not a url".to_string();
        assert!(backend.origin().is_err());

        backend.base_url = "http://backend:8080/prefix".to_string();
        assert_eq!(backend.origin().unwrap().path(), "/prefix");
    }
}
