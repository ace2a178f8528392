use anyhow::Result;
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::AppError;
use crate::provider::novallm::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE};

pub const ENV_API_URL: &str = "NOVALLM_API_URL";
pub const ENV_API_KEY: &str = "NOVALLM_API_KEY";
pub const ENV_STORE: &str = "MAGIC_BLOCK_STORE";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub store_dir: PathBuf,
    pub save_runs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            model: DEFAULT_MODEL.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: 120,
            store_dir: PathBuf::from(".magic_block"),
            save_runs: false,
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| AppError::Config(e.to_string()).into())
    }

    /// Defaults, then the TOML file if given, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => Self::from_toml(&fs::read_to_string(p)?)?,
            None => Self::default(),
        };
        cfg.apply_env(|k| std::env::var(k).ok());
        Ok(cfg)
    }

    pub fn apply_env<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = get(ENV_API_URL).filter(|v| !v.is_empty()) {
            self.api_url = Some(url);
        }
        if let Some(key) = get(ENV_API_KEY).filter(|v| !v.is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(dir) = get(ENV_STORE).filter(|v| !v.is_empty()) {
            self.store_dir = PathBuf::from(dir);
        }
    }

    pub fn demo_mode(&self) -> bool {
        self.api_url.as_deref().map_or(true, |u| u.trim().is_empty())
    }
}
