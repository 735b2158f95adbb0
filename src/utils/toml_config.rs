//! TOML-based configuration for deepbench
//!
//! Loaded from `deepbench.toml`. Every section is optional; a missing file
//! section falls back to its defaults.
//!
//! # Hot Reloading
//!
//! [`DeepbenchConfigManager`] keeps the active configuration behind an
//! [`ArcSwap`] and can watch the file for changes. Runs already in flight
//! keep the configuration they started with.

use crate::db::DatabaseProvider;
use crate::llm::ProviderConfig;
use crate::research::pipeline::PipelineConfig;
use crate::types::ModelKind;
use arc_swap::ArcSwap;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Root configuration structure loaded from deepbench.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeepbenchConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Per-model provider overrides keyed by `openai`, `anthropic` or `kimi`
    #[serde(default)]
    pub providers: HashMap<String, ProviderSettings>,
}

// ============= Server Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

// ============= Authentication Configuration =============

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Environment variable holding the bearer key for `/research` routes.
    /// Unset (or naming an empty variable) leaves the routes open.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

// ============= Database Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Local database path, or `:memory:`
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Environment variable for Turso URL (optional cloud config)
    pub turso_url_env: Option<String>,

    /// Environment variable for Turso auth token
    pub turso_token_env: Option<String>,
}

fn default_database_url() -> String {
    "./data/deepbench.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            turso_url_env: None,
            turso_token_env: None,
        }
    }
}

// ============= Provider Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderSettings {
    /// Override the provider's API base URL
    pub api_base: Option<String>,

    /// Override the provider-side model identifier
    pub model: Option<String>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_tokens() -> u32 {
    8_000
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_base: None,
            model: None,
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// ============= Configuration Loading & Validation =============

/// Configuration warnings that don't prevent operation but may indicate issues
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub kind: ConfigWarningKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigWarningKind {
    /// Authentication is configured but its variable is unset
    OpenAccess,
    /// Clarification is enabled; every run pays for one extra call
    ClarificationEnabled,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),

    #[error("Unknown provider '{0}'. Expected one of: openai, anthropic, kimi")]
    UnknownProvider(String),

    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),
}

impl DeepbenchConfig {
    /// Load and validate configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: DeepbenchConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for internal consistency and env var availability
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port must be non-zero".to_string(),
            ));
        }

        let pipeline = &self.pipeline;
        if pipeline.max_research_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.max_research_iterations must be at least 1".to_string(),
            ));
        }
        if pipeline.max_findings == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.max_findings must be at least 1".to_string(),
            ));
        }
        if pipeline.run_budget_secs == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.run_budget_secs must be at least 1".to_string(),
            ));
        }
        if pipeline.event_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.event_buffer must be at least 1".to_string(),
            ));
        }
        if pipeline.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if pipeline.retry.base_delay_ms > pipeline.retry.max_delay_ms {
            return Err(ConfigError::ValidationError(
                "pipeline.retry.base_delay_ms exceeds max_delay_ms".to_string(),
            ));
        }

        for (name, settings) in &self.providers {
            name.parse::<ModelKind>()
                .map_err(|_| ConfigError::UnknownProvider(name.clone()))?;
            if let Some(base) = &settings.api_base
                && !(base.starts_with("http://") || base.starts_with("https://"))
            {
                return Err(ConfigError::ValidationError(format!(
                    "providers.{}.api_base must be an http(s) URL",
                    name
                )));
            }
            if settings.max_tokens == 0 || settings.request_timeout_secs == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "providers.{}: max_tokens and request_timeout_secs must be non-zero",
                    name
                )));
            }
        }

        // Validate database env vars if specified
        if let Some(ref env) = self.database.turso_url_env {
            self.validate_env_var(env)?;
        }
        if let Some(ref env) = self.database.turso_token_env {
            self.validate_env_var(env)?;
        }

        Ok(())
    }

    /// Validate and collect non-fatal warnings
    pub fn validate_with_warnings(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        self.validate()?;

        let mut warnings = Vec::new();
        if let Some(env) = &self.auth.api_key_env
            && self.api_key().is_none()
        {
            warnings.push(ConfigWarning {
                kind: ConfigWarningKind::OpenAccess,
                message: format!(
                    "auth.api_key_env is '{}' but the variable is unset; /research routes are open",
                    env
                ),
            });
        }
        if self.pipeline.allow_clarification {
            warnings.push(ConfigWarning {
                kind: ConfigWarningKind::ClarificationEnabled,
                message: "pipeline.allow_clarification adds one provider call per run".to_string(),
            });
        }
        Ok(warnings)
    }

    fn validate_env_var(&self, name: &str) -> Result<(), ConfigError> {
        match std::env::var(name) {
            Ok(value) if !value.is_empty() => Ok(()),
            _ => Err(ConfigError::MissingEnvVar(name.to_string())),
        }
    }

    /// Get a resolved value from an env var reference
    pub fn resolve_env(&self, env_name: &str) -> Option<String> {
        std::env::var(env_name).ok().filter(|v| !v.is_empty())
    }

    /// The bearer key required on `/research` routes, if any
    pub fn api_key(&self) -> Option<String> {
        self.auth
            .api_key_env
            .as_deref()
            .and_then(|env| self.resolve_env(env))
    }

    /// Settings for one model family (defaults when not configured)
    pub fn provider_settings(&self, model: ModelKind) -> ProviderSettings {
        self.providers
            .get(model.as_str())
            .cloned()
            .unwrap_or_default()
    }

    /// Build the per-run provider configuration for a caller's key
    pub fn provider_config(&self, model: ModelKind, api_key: &str) -> ProviderConfig {
        let settings = self.provider_settings(model);
        let mut config = ProviderConfig::new(model, api_key)
            .with_max_tokens(settings.max_tokens)
            .with_request_timeout(Duration::from_secs(settings.request_timeout_secs));
        if let Some(base) = settings.api_base {
            config = config.with_api_base(base);
        }
        if let Some(name) = settings.model {
            config = config.with_model_name(name);
        }
        config
    }

    /// Which database to open
    pub fn database_provider(&self) -> Result<DatabaseProvider, ConfigError> {
        #[cfg(feature = "turso")]
        if let (Some(url_env), Some(token_env)) =
            (&self.database.turso_url_env, &self.database.turso_token_env)
        {
            let url = self
                .resolve_env(url_env)
                .ok_or_else(|| ConfigError::MissingEnvVar(url_env.clone()))?;
            let auth_token = self
                .resolve_env(token_env)
                .ok_or_else(|| ConfigError::MissingEnvVar(token_env.clone()))?;
            return Ok(DatabaseProvider::Turso { url, auth_token });
        }
        Ok(DatabaseProvider::from_path(&self.database.url))
    }
}

// ============= Hot Reloading Configuration Manager =============

/// Thread-safe configuration manager with hot reloading support
pub struct DeepbenchConfigManager {
    config: Arc<ArcSwap<DeepbenchConfig>>,
    config_path: PathBuf,
    watcher: RwLock<Option<RecommendedWatcher>>,
}

impl DeepbenchConfigManager {
    /// Create a new configuration manager and load the initial config
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        // Absolute path for reliable file watching
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(ConfigError::ReadError)?
                .join(path)
        };

        let config = DeepbenchConfig::load(&path)?;

        Ok(Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: path,
            watcher: RwLock::new(None),
        })
    }

    /// Create a config manager directly from a config (useful for testing).
    /// This won't have file watching capabilities.
    pub fn from_config(config: DeepbenchConfig) -> Self {
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: PathBuf::from("deepbench.toml"),
            watcher: RwLock::new(None),
        }
    }

    /// Get the current configuration (lockless read)
    pub fn config(&self) -> Arc<DeepbenchConfig> {
        self.config.load_full()
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Re-read the file and swap it in, returning the sections that changed.
    ///
    /// On error the current configuration stays in place.
    pub fn reload(&self) -> Result<Vec<&'static str>, ConfigError> {
        let new_config = DeepbenchConfig::load(&self.config_path)?;
        Ok(swap_in(&self.config, new_config))
    }

    /// Start watching for configuration file changes
    pub fn start_watching(&self) -> Result<(), ConfigError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let config_path = self.config_path.clone();
        let config_arc = Arc::clone(&self.config);
        let file_name = self.config_path.file_name().map(|n| n.to_os_string());

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    let touches_config = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if touches_config && (event.kind.is_modify() || event.kind.is_create()) {
                        // Debounced in the receiver
                        let _ = tx.send(());
                    }
                }
                Err(e) => {
                    error!("Config watcher error: {:?}", e);
                }
            }
        })?;

        // Editors often replace the file, so watch the parent directory
        if let Some(parent) = self.config_path.parent() {
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
        }

        *self.watcher.write() = Some(watcher);

        tokio::spawn(async move {
            let debounce = Duration::from_millis(500);

            while rx.recv().await.is_some() {
                // Let the write finish, then collapse the burst into one reload
                tokio::time::sleep(debounce).await;
                while rx.try_recv().is_ok() {}

                match DeepbenchConfig::load(&config_path) {
                    Ok(new_config) => {
                        swap_in(&config_arc, new_config);
                    }
                    Err(e) => {
                        warn!("Ignoring edit to {:?}: {}", config_path, e);
                    }
                }
            }
        });

        info!("Configuration hot-reload watcher started");
        Ok(())
    }

    /// Stop watching for configuration changes
    pub fn stop_watching(&self) {
        *self.watcher.write() = None;
        info!("Configuration hot-reload watcher stopped");
    }
}

/// Sections read once at startup; edits to them only apply after a restart.
const RESTART_SECTIONS: [&str; 2] = ["server", "database"];

/// Top-level sections that differ between two configurations.
pub fn changed_sections(old: &DeepbenchConfig, new: &DeepbenchConfig) -> Vec<&'static str> {
    fn sections(c: &DeepbenchConfig) -> [(&'static str, Option<serde_json::Value>); 5] {
        [
            ("server", serde_json::to_value(&c.server).ok()),
            ("auth", serde_json::to_value(&c.auth).ok()),
            ("database", serde_json::to_value(&c.database).ok()),
            ("pipeline", serde_json::to_value(&c.pipeline).ok()),
            ("providers", serde_json::to_value(&c.providers).ok()),
        ]
    }

    sections(old)
        .into_iter()
        .zip(sections(new))
        .filter(|((_, a), (_, b))| a != b)
        .map(|((name, _), _)| name)
        .collect()
}

fn swap_in(current: &ArcSwap<DeepbenchConfig>, new_config: DeepbenchConfig) -> Vec<&'static str> {
    let previous = current.swap(Arc::new(new_config));
    let changed = changed_sections(&previous, &current.load());

    if changed.is_empty() {
        info!("Configuration reloaded without changes");
        return changed;
    }
    info!(sections = ?changed, "Configuration reloaded");
    for section in changed.iter().filter(|s| RESTART_SECTIONS.contains(s)) {
        warn!("[{}] changes take effect after a restart", section);
    }
    changed
}
