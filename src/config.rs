use crate::ai_service::AIConfig;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variables checked for a Gemini key, in priority order.
pub const API_KEY_VARS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY", "GENAI_API_KEY"];

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CritiqueConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub database_path: Option<PathBuf>, // None = ~/.critique/db.sqlite
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default)]
    pub api_key: Option<String>, // wins over the environment when non-empty
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_max_upload_bytes() -> usize {
    2 * 1024 * 1024
}

impl Default for CritiqueConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_path: None,
            model: default_model(),
            api_base: default_api_base(),
            request_timeout_secs: default_request_timeout_secs(),
            max_upload_bytes: default_max_upload_bytes(),
            api_key: None,
        }
    }
}

impl CritiqueConfig {
    /// ~/.critique, where the config file and default database live.
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;
        Ok(home.join(".critique"))
    }

    /// Load ~/.critique/config.toml (defaults if missing), then apply
    /// `CRITIQUE_PORT` and `CRITIQUE_DB_PATH` from the environment.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_dir()?.join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Invalid config file: {:?}", path))
    }

    pub fn apply_env_overrides<F>(&mut self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = env("CRITIQUE_PORT") {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("CRITIQUE_PORT is not a port number: {}", port))?;
        }
        if let Some(path) = env("CRITIQUE_DB_PATH").filter(|p| !p.is_empty()) {
            self.database_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let config_dir = Self::config_dir()?;
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)?;
        }
        self.save_to(&config_dir.join("config.toml"))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        let mut file = fs::File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("db.sqlite")),
        }
    }

    /// Config value first, then the first non-empty of [`API_KEY_VARS`].
    pub fn resolve_api_key<F>(&self, env: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Some(key.clone());
        }
        API_KEY_VARS
            .iter()
            .filter_map(|name| env(name))
            .find(|value| !value.is_empty())
    }

    pub fn ai_config(&self) -> AIConfig {
        AIConfig {
            api_key: self.resolve_api_key(|name| std::env::var(name).ok()),
            model: self.model.clone(),
            api_base: self.api_base.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}
