use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::{DlpRelayError, Result};
use crate::relay::SourceDescriptor;

/// Main configuration structure for dlprelay
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Where source files and the file catalog live
    #[serde(default)]
    pub source: SourceConfig,
    /// Local multipart upload endpoint
    #[serde(default)]
    pub local: LocalConfig,
    /// Object-store pre-signed upload settings
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
    /// Messaging-platform webhook settings
    #[serde(default)]
    pub webhook: WebhookConfig,
    /// Shared HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,
}

/// Source file location configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Base URL that bare file names are resolved against
    #[serde(default = "default_source_base_url")]
    pub base_url: String,
    /// URL of the available-files listing (name -> sha256)
    #[serde(default = "default_catalog_url")]
    pub catalog_url: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_source_base_url(),
            catalog_url: default_catalog_url(),
        }
    }
}

impl SourceConfig {
    /// Resolve a source argument: an absolute URL, or a name under `base_url`
    pub fn resolve(&self, input: &str) -> Result<SourceDescriptor> {
        let base = Url::parse(&self.base_url).map_err(|e| {
            DlpRelayError::Config(format!("Invalid source base URL '{}': {e}", self.base_url))
        })?;
        SourceDescriptor::resolve(input, &base)
    }
}

fn default_source_base_url() -> String {
    "http://localhost:8080/static/downloads/".to_string()
}

fn default_catalog_url() -> String {
    "http://localhost:8080/availableFiles".to_string()
}

/// Local upload endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalConfig {
    /// Fixed multipart upload endpoint
    #[serde(default = "default_local_upload_url")]
    pub upload_url: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            upload_url: default_local_upload_url(),
        }
    }
}

fn default_local_upload_url() -> String {
    "http://localhost:8080/upload".to_string()
}

/// Which request shape to use for a pre-signed object-store upload
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PresignedMethod {
    /// POST when the negotiation response carries form fields, PUT otherwise
    #[default]
    Auto,
    /// Always PUT the raw bytes
    Put,
    /// Always POST a multipart form
    Post,
}

impl PresignedMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresignedMethod::Auto => "auto",
            PresignedMethod::Put => "put",
            PresignedMethod::Post => "post",
        }
    }
}

/// Object-store negotiation configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObjectStoreConfig {
    /// Endpoint that hands out pre-signed upload targets
    #[serde(default = "default_negotiation_url")]
    pub negotiation_url: String,
    /// Request shape for the upload itself
    #[serde(default)]
    pub method: PresignedMethod,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            negotiation_url: default_negotiation_url(),
            method: PresignedMethod::default(),
        }
    }
}

fn default_negotiation_url() -> String {
    "http://localhost:8080/generateS3Token".to_string()
}

/// Webhook configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookConfig {
    /// Webhook URL (empty = resolve from `url_env`)
    #[serde(default)]
    pub url: String,
    /// Environment variable holding the webhook URL
    #[serde(default = "default_webhook_url_env")]
    pub url_env: String,
    /// Environment variable holding the webhook auth token (empty = none)
    #[serde(default)]
    pub token_env: String,
    /// Optional `channels` form field
    #[serde(default)]
    pub channels: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            url_env: default_webhook_url_env(),
            token_env: String::new(),
            channels: String::new(),
        }
    }
}

fn default_webhook_url_env() -> String {
    "DLPTEST_SLACK_HOOK".to_string()
}

impl WebhookConfig {
    /// Resolve the webhook URL from the config value or the environment
    pub fn resolve_url(&self) -> Option<String> {
        self.resolve_url_with(|name| std::env::var(name).ok())
    }

    /// Resolve the webhook URL with a custom environment lookup
    pub fn resolve_url_with<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if !self.url.is_empty() {
            return Some(self.url.clone());
        }
        if self.url_env.is_empty() {
            return None;
        }
        lookup(&self.url_env).filter(|v| !v.is_empty())
    }

    /// Resolve the webhook auth token from the environment
    pub fn resolve_token(&self) -> Option<String> {
        self.resolve_token_with(|name| std::env::var(name).ok())
    }

    pub fn resolve_token_with<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.token_env.is_empty() {
            return None;
        }
        lookup(&self.token_env).filter(|v| !v.is_empty())
    }
}

/// Shared HTTP client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds (0 = none)
    #[serde(default)]
    pub timeout_secs: u64,
    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 0,
            user_agent: default_user_agent(),
        }
    }
}

fn default_user_agent() -> String {
    format!("dlprelay/{}", env!("CARGO_PKG_VERSION"))
}

impl HttpConfig {
    /// Build the reqwest client shared by every pipeline stage
    pub fn build_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().user_agent(&self.user_agent);
        if self.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(self.timeout_secs));
        }
        builder
            .build()
            .map_err(|e| DlpRelayError::Http(format!("Failed to create HTTP client: {e}")))
    }
}

/// Candidate config file locations, in lookup order
pub fn default_config_paths() -> Vec<PathBuf> {
    [
        dirs::home_dir().map(|h| h.join(".dlprelay").join("config.toml")),
        dirs::config_dir().map(|c| c.join("dlprelay").join("config.toml")),
        Some(PathBuf::from("dlprelay.toml")),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Load configuration from an explicit path, the default locations, or defaults
///
/// Returns the config together with the file it was read from, if any.
pub fn load_config(config_path: Option<&Path>) -> Result<(Config, Option<PathBuf>)> {
    if let Some(path) = config_path {
        tracing::info!("Loading config from: {}", path.display());
        return Ok((read_config_file(path)?, Some(path.to_path_buf())));
    }

    for path in default_config_paths() {
        if path.exists() {
            tracing::info!("Loading config from: {}", path.display());
            let config = read_config_file(&path)?;
            return Ok((config, Some(path)));
        }
    }

    tracing::debug!("No config file found, using defaults");
    Ok((Config::default(), None))
}

fn read_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        DlpRelayError::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    toml::from_str(&content)
        .map_err(|e| DlpRelayError::Config(format!("Failed to parse config: {e}")))
}
