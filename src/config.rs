//! Configuration management for doclens
//!
//! Stores settings in ~/.config/doclens/config.json. Environment variables
//! override the file; CLI flags override both for a single run.

use crate::keyring;
use crate::llm::{CompletionGateway, Model, OpenRouterOracle, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";
pub const MODEL_ENV: &str = "DOCLENS_MODEL";
pub const MAX_ATTEMPTS_ENV: &str = "DOCLENS_MAX_ATTEMPTS";
pub const BACKOFF_ENV: &str = "DOCLENS_BACKOFF_SECS";

const DEFAULT_OUTPUT_DIR: &str = "output";

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model tier used for every oracle call
    pub model: Model,
    /// Oracle attempts per completion
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed delay between attempts
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Where reports are written; `./output` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    /// Discard revisions that add or drop any hyperlink
    pub verify_links: bool,
    /// Alternate chat-completions endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: Model::default(),
            max_attempts: default_max_attempts(),
            backoff_secs: default_backoff_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            output_dir: None,
            verify_links: false,
            api_url: None,
        }
    }
}

impl Config {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("doclens"))
    }

    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk, or return default
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if let Ok(content) = fs::read_to_string(&path) {
                match Self::parse(&content) {
                    Ok(config) => return config,
                    Err(err) => {
                        preserve_corrupt_config(&path, &content);
                        tracing::warn!(
                            path = %path.display(),
                            error = %err,
                            "Config file was corrupted; a backup was saved and defaults were loaded"
                        );
                    }
                }
            }
        }
        Self::default()
    }

    fn parse(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Load from disk and apply environment overrides.
    pub fn load_with_env() -> Self {
        let mut config = Self::load();
        config.apply_overrides(|name| std::env::var(name).ok());
        config
    }

    /// Apply `DOCLENS_*` overrides. Unparsable values are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(MODEL_ENV) {
            match Model::parse(&raw) {
                Some(model) => self.model = model,
                None => tracing::warn!(var = MODEL_ENV, value = %raw, "Unknown model; keeping configured one"),
            }
        }
        if let Some(raw) = lookup(MAX_ATTEMPTS_ENV) {
            match raw.trim().parse() {
                Ok(value) => self.max_attempts = value,
                Err(_) => tracing::warn!(var = MAX_ATTEMPTS_ENV, value = %raw, "Ignoring invalid number"),
            }
        }
        if let Some(raw) = lookup(BACKOFF_ENV) {
            match raw.trim().parse() {
                Ok(value) => self.backoff_secs = value,
                Err(_) => tracing::warn!(var = BACKOFF_ENV, value = %raw, "Ignoring invalid number"),
            }
        }
    }

    /// Save config to disk
    pub fn save(&self) -> Result<(), String> {
        let dir = Self::config_dir()
            .ok_or_else(|| "Could not determine config directory".to_string())?;

        fs::create_dir_all(&dir)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(&dir, fs::Permissions::from_mode(0o700)) {
                tracing::warn!(error = %e, "Failed to set config directory permissions");
            }
        }

        let path = dir.join("config.json");
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        write_config_atomic(&path, &content).map_err(|e| format!("Failed to write config: {}", e))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.backoff_secs))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
    }

    /// Get the OpenRouter API key (from environment or keychain)
    pub fn get_api_key(&self) -> Option<String> {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                return Some(key.trim().to_string());
            }
        }
        match keyring::get_api_key() {
            Ok(key) => key,
            Err(err) => {
                keyring::warn_keychain_error_once("the OpenRouter API key", &err);
                None
            }
        }
    }

    /// Store the API key in the keychain
    pub fn set_api_key(&self, key: &str) -> Result<(), String> {
        keyring::set_api_key(key).map_err(|e| {
            format!(
                "Failed to store API key in system keychain: {}. \
                 You can set the {} environment variable instead.",
                e, API_KEY_ENV
            )
        })?;
        match keyring::get_api_key() {
            Ok(Some(stored)) if stored == key => Ok(()),
            Ok(_) => Err("API key verification failed: stored key doesn't match.".to_string()),
            Err(e) => Err(format!("API key verification failed: {}", e)),
        }
    }

    /// Validate API key format (should start with sk-)
    pub fn validate_api_key_format(key: &str) -> bool {
        key.starts_with("sk-")
    }

    /// Build the completion gateway. Without a usable key the gateway is
    /// created in its unavailable state and every call fails fast.
    pub fn build_gateway(&self, api_key: Option<String>) -> CompletionGateway {
        let Some(api_key) = api_key else {
            return CompletionGateway::unavailable(format!(
                "no OpenRouter API key configured (set {} or run `doclens setup`)",
                API_KEY_ENV
            ));
        };
        match OpenRouterOracle::new(api_key, self.model, self.request_timeout()) {
            Ok(oracle) => {
                let oracle = match &self.api_url {
                    Some(url) => oracle.with_endpoint(url.clone()),
                    None => oracle,
                };
                CompletionGateway::new(Arc::new(oracle), self.retry_policy())
            }
            Err(err) => CompletionGateway::unavailable(err.to_string()),
        }
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/doclens/config.json".to_string())
    }
}

fn preserve_corrupt_config(path: &std::path::Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

fn write_config_atomic(path: &std::path::Path, content: &str) -> Result<(), String> {
    use std::fs::OpenOptions;

    let tmp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)
        .map_err(|e| e.to_string())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
            tracing::warn!(error = %e, "Failed to set temp config file permissions");
        }
    }

    file.write_all(content.as_bytes())
        .map_err(|e| e.to_string())?;

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.to_string());
    }
    Ok(())
}
