// SPDX-License-Identifier: GPL-3.0-or-later
//! Configuration surface (spec §6): defaults, an optional TOML file, then
//! `CRATEDIG_`-prefixed environment variables, merged with `figment`.
//! Validation is collective — every violation is gathered into one error
//! rather than failing fast on the first.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "cratedig.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub downloads_dir: String,
    pub incoming_dir: String,
    /// Template over track fields `{AlbumArtist}/{Album}/{Track} {Title}` etc,
    /// rendered relative to `downloads_dir` and without a file extension.
    pub subdir_template: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            downloads_dir: "downloads".to_string(),
            incoming_dir: "downloads/.incoming".to_string(),
            subdir_template: "{{AlbumArtist}}/{{Album}}/{{Track}} {{Title}}".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Quality {
    Lossless,
    HiResLossless,
    High,
    Low,
}

impl Default for Quality {
    fn default() -> Self {
        Quality::Lossless
    }
}

impl std::str::FromStr for Quality {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "LOSSLESS" => Quality::Lossless,
            "HI_RES_LOSSLESS" => Quality::HiResLossless,
            "HIGH" => Quality::High,
            "LOW" => Quality::Low,
            other => return Err(anyhow!("invalid QUALITY: {other}")),
        })
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Quality::Lossless => "LOSSLESS",
            Quality::HiResLossless => "HI_RES_LOSSLESS",
            Quality::High => "HIGH",
            Quality::Low => "LOW",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider_url: String,
    pub external_metadata_url: String,
    pub quality: Quality,
    /// Duration string (e.g. "24h"), must be > 0. Parsed with `humantime`.
    pub cache_ttl: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_url: "https://api.example-hifi-catalog.invalid".to_string(),
            external_metadata_url: "https://musicbrainz.org/ws/2".to_string(),
            quality: Quality::Lossless,
            cache_ttl: "24h".to_string(),
        }
    }
}

impl ProviderConfig {
    pub fn cache_ttl_duration(&self) -> Result<Duration> {
        let d = humantime::parse_duration(&self.cache_ttl)
            .map_err(|e| anyhow!("invalid CACHE_TTL {:?}: {e}", self.cache_ttl))?;
        if d.is_zero() {
            return Err(anyhow!("CACHE_TTL must be > 0"));
        }
        Ok(d)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub max_concurrent: usize,
    pub poll_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            poll_interval_secs: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl AuthConfig {
    /// Basic auth is enabled only when a non-empty password is configured;
    /// a username is then required. See spec §6.
    pub fn is_enabled(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub provider: ProviderConfig,
    pub worker: WorkerConfig,
    pub telemetry: TelemetryConfig,
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Validate the whole config, aggregating every violation into a single
    /// error message rather than stopping at the first (spec §6).
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.http.port == 0 {
            errors.push("PORT must be between 1 and 65535".to_string());
        }
        if self.database.path.trim().is_empty() {
            errors.push("DB_PATH must not be empty".to_string());
        }
        if self.storage.downloads_dir.trim().is_empty() {
            errors.push("DOWNLOADS_DIR must not be empty".to_string());
        }
        if self.storage.incoming_dir.trim().is_empty() {
            errors.push("INCOMING_DIR must not be empty".to_string());
        }
        if self.provider.provider_url.trim().is_empty() {
            errors.push("PROVIDER_URL must not be empty".to_string());
        }
        if let Err(e) = self.provider.cache_ttl_duration() {
            errors.push(e.to_string());
        }
        if !matches!(
            self.telemetry.log_level.as_str(),
            "debug" | "info" | "warn" | "error"
        ) {
            errors.push("LOG_LEVEL must be one of debug, info, warn, error".to_string());
        }
        if !matches!(self.telemetry.log_format.as_str(), "text" | "json") {
            errors.push("LOG_FORMAT must be one of text, json".to_string());
        }
        if self.auth.password.as_deref().is_some_and(|p| !p.is_empty())
            && !self.auth.username.as_deref().is_some_and(|u| !u.is_empty())
        {
            errors.push("NAVIDRUMS_USERNAME is required when NAVIDRUMS_PASSWORD is set".to_string());
        }
        if self.worker.max_concurrent == 0 {
            errors.push("worker max_concurrent must be >= 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("invalid configuration: {}", errors.join("; ")))
        }
    }
}

/// Load configuration from defaults, an optional TOML file, and
/// `CRATEDIG_`-prefixed environment variables (double underscore as the
/// nesting separator, e.g. `CRATEDIG_HTTP__PORT`), merged with `figment` the
/// way the teacher crate layers its own config. The flat spec env var names
/// (`PORT`, `DB_PATH`, `QUALITY`, ...) are applied as a final override pass
/// so operators can use either naming scheme.
pub fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("CRATEDIG_").split("__"));

    let mut config: AppConfig = figment.extract()?;
    apply_flat_env_overrides(&mut config);
    config.validate()?;
    info!(target: "config", "configuration loaded and validated");
    Ok(config)
}

/// Applies spec §6's flat, unprefixed environment variable names directly,
/// taking precedence over anything figment already resolved.
fn apply_flat_env_overrides(config: &mut AppConfig) {
    use std::env::var;

    if let Ok(v) = var("PORT") {
        if let Ok(port) = v.parse() {
            config.http.port = port;
        }
    }
    if let Ok(v) = var("DB_PATH") {
        config.database.path = v;
    }
    if let Ok(v) = var("DOWNLOADS_DIR") {
        config.storage.downloads_dir = v;
    }
    if let Ok(v) = var("INCOMING_DIR") {
        config.storage.incoming_dir = v;
    }
    if let Ok(v) = var("SUBDIR_TEMPLATE") {
        config.storage.subdir_template = v;
    }
    if let Ok(v) = var("PROVIDER_URL") {
        config.provider.provider_url = v;
    }
    if let Ok(v) = var("EXTERNAL_METADATA_URL") {
        config.provider.external_metadata_url = v;
    }
    if let Ok(v) = var("QUALITY") {
        if let Ok(q) = v.parse() {
            config.provider.quality = q;
        }
    }
    if let Ok(v) = var("CACHE_TTL") {
        config.provider.cache_ttl = v;
    }
    if let Ok(v) = var("LOG_LEVEL") {
        config.telemetry.log_level = v;
    }
    if let Ok(v) = var("LOG_FORMAT") {
        config.telemetry.log_format = v;
    }
    if let Ok(v) = var("NAVIDRUMS_USERNAME").or_else(|_| var("CRATEDIG_AUTH_USERNAME")) {
        config.auth.username = Some(v);
    }
    if let Ok(v) = var("NAVIDRUMS_PASSWORD").or_else(|_| var("CRATEDIG_AUTH_PASSWORD")) {
        config.auth.password = Some(v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_round_trips() {
        for q in [
            Quality::Lossless,
            Quality::HiResLossless,
            Quality::High,
            Quality::Low,
        ] {
            assert_eq!(q.to_string().parse::<Quality>().unwrap(), q);
        }
    }

    #[test]
    fn default_config_is_valid() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn validation_aggregates_multiple_errors() {
        let mut cfg = AppConfig::default();
        cfg.http.port = 0;
        cfg.telemetry.log_level = "verbose".to_string();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("PORT"));
        assert!(err.contains("LOG_LEVEL"));
    }

    #[test]
    fn auth_requires_username_when_password_set() {
        let mut cfg = AppConfig::default();
        cfg.auth.password = Some("secret".to_string());
        assert!(cfg.validate().is_err());
        cfg.auth.username = Some("admin".to_string());
        assert!(cfg.validate().is_ok());
        assert!(cfg.auth.is_enabled());
    }

    #[test]
    fn empty_password_disables_auth() {
        let cfg = AppConfig::default();
        assert!(!cfg.auth.is_enabled());
    }
}
