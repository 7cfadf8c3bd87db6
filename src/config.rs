use crate::error::{GatewayError, Result};
use crate::providers::ProviderAllowList;
use crate::translate::request::{InferenceDefaults, DEFAULT_MODEL_ID};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "bedrock-gateway";
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";

/// Short model names accepted without any config file.
const BUILTIN_MODEL_ALIASES: [(&str, &str); 3] = [
    (
        "anthropic.claude-3-5-sonnet",
        "anthropic.claude-3-5-sonnet-20240620-v1:0",
    ),
    ("anthropic.claude-3-opus", "anthropic.claude-3-opus-20240229-v1:0"),
    ("anthropic.claude-3-haiku", "anthropic.claude-3-haiku-20240307-v1:0"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub port: u16,
    /// Allowed CORS origins. `"*"` allows any origin.
    pub cors_origins: Vec<String>,
    /// Model used when a request names none.
    pub default_model: String,
    pub backend: BackendConfig,
    /// Short aliases mapped to full Bedrock model ids. A `[models]` table
    /// replaces the built-in aliases rather than extending them.
    pub models: HashMap<String, String>,
    pub catalog: CatalogConfig,
    /// Inference parameters applied to every call.
    pub defaults: InferenceDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub region: String,
    /// Environment variable holding a Bedrock API key, sent as a bearer token.
    pub api_key_env: String,
    pub inference_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_url: Option<String>,
    /// No timeout unless set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Provider names (`anthropic`, `meta`, ...) or raw model-id prefixes.
    pub allowed_providers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_path: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            cors_origins: vec![DEFAULT_CORS_ORIGIN.to_string()],
            default_model: DEFAULT_MODEL_ID.to_string(),
            backend: BackendConfig::default(),
            models: BUILTIN_MODEL_ALIASES
                .iter()
                .map(|(alias, id)| ((*alias).to_string(), (*id).to_string()))
                .collect(),
            catalog: CatalogConfig::default(),
            defaults: InferenceDefaults::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            region: "us-west-2".to_string(),
            api_key_env: "AWS_BEARER_TOKEN_BEDROCK".to_string(),
            inference_type: "ON_DEMAND".to_string(),
            runtime_url: None,
            control_url: None,
            request_timeout_secs: None,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            allowed_providers: vec!["anthropic".to_string()],
            metadata_path: Some(PathBuf::from("provider_model_details.json")),
        }
    }
}

impl GatewayConfig {
    /// Load config from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: CLI arg > CWD > XDG config > home dir > built-in defaults
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        for candidate in config_search_paths() {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(&candidate);
            }
        }

        tracing::info!("No config file found, using built-in defaults");
        Ok(Self::default())
    }

    pub fn runtime_base_url(&self) -> String {
        self.backend.runtime_url.clone().unwrap_or_else(|| {
            format!("https://bedrock-runtime.{}.amazonaws.com", self.backend.region)
        })
    }

    pub fn control_base_url(&self) -> String {
        self.backend
            .control_url
            .clone()
            .unwrap_or_else(|| format!("https://bedrock.{}.amazonaws.com", self.backend.region))
    }

    /// Bedrock API key from the configured environment variable, if set and non-empty.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(&self.backend.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    /// Full model id for an alias. Unknown names pass through unchanged.
    pub fn resolve_model<'a>(&'a self, name: &'a str) -> &'a str {
        self.models.get(name).map_or(name, String::as_str)
    }

    pub fn allow_list(&self) -> ProviderAllowList {
        ProviderAllowList::new(&self.catalog.allowed_providers)
    }

    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|o| o.trim() == "*")
    }
}

/// Candidate config file locations, in search order.
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // CWD
    paths.push(PathBuf::from(format!("{APP_NAME}.toml")));

    // XDG / platform config dir
    if cfg!(target_os = "macos") {
        if let Some(home) = home_dir() {
            paths.push(
                home.join("Library")
                    .join("Application Support")
                    .join(APP_NAME)
                    .join("config.toml"),
            );
        }
    } else {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg).join(APP_NAME).join("config.toml"));
        }
        if let Some(home) = home_dir() {
            paths.push(home.join(".config").join(APP_NAME).join("config.toml"));
        }
    }

    // Home directory fallback
    if let Some(home) = home_dir() {
        paths.push(home.join(format!(".{APP_NAME}.toml")));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
