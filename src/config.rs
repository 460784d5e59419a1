use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;

use crate::extract::ExtractorConfig;
use crate::surface::DEFAULT_SUCCESS_DELAY;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub temperature: Option<f32>,
    pub success_delay: Duration,
    config_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    api_key: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
    temperature: Option<f32>,
    success_delay_secs: Option<u64>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub success_delay_secs: Option<u64>,
}

impl Config {
    pub fn load(config_path: Option<PathBuf>, overrides: ConfigOverrides) -> Result<Self> {
        let file_config = load_file_config(config_path.as_ref())?;
        let config_path = config_path.or_else(default_config_path);
        Ok(Self::resolve(file_config, overrides, config_path, |key| {
            env::var(key).ok()
        }))
    }

    fn resolve(
        file_config: FileConfig,
        overrides: ConfigOverrides,
        config_path: Option<PathBuf>,
        env_var: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let non_empty = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = non_empty(file_config.api_key)
            .or_else(|| non_empty(env_var("GEMINI_API_KEY")))
            .or_else(|| non_empty(env_var("API_KEY")));

        let model = non_empty(overrides.model)
            .or(non_empty(file_config.model))
            .or_else(|| non_empty(env_var("GEMINI_MODEL")))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let base_url = non_empty(overrides.base_url)
            .or(non_empty(file_config.base_url))
            .or_else(|| non_empty(env_var("GEMINI_BASE_URL")))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let temperature = overrides.temperature.or(file_config.temperature).or_else(|| {
            env_var("GEMINI_TEMPERATURE").and_then(|v| v.trim().parse().ok())
        });

        let success_delay = overrides
            .success_delay_secs
            .or(file_config.success_delay_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SUCCESS_DELAY);

        Self {
            api_key,
            model,
            base_url,
            temperature,
            success_delay,
            config_path,
        }
    }

    pub fn extractor(&self) -> ExtractorConfig {
        ExtractorConfig {
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            temperature: self.temperature,
        }
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

#[cfg(test)]
impl Config {
    pub(crate) fn load_for_tests(overrides: ConfigOverrides) -> Self {
        Self::resolve(FileConfig::default(), overrides, None, |_| None)
    }
}

fn load_file_config(path: Option<&PathBuf>) -> Result<FileConfig> {
    if let Some(path) = path {
        if path.exists() {
            return read_config_from_path(path);
        }
        anyhow::bail!("config path {:?} does not exist", path);
    }

    if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            return read_config_from_path(&default_path);
        }
    }

    Ok(FileConfig::default())
}

fn read_config_from_path(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file at {}", path.display()))
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "concept-cli", "concept-cli")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
