// Language and engine configuration
use anyhow::{bail, Context, Result};
use gradebox_common::types::Language;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_LANGUAGES_PATH: &str = "config/languages.json";
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageExecution {
    pub command: String,
    pub args: Vec<String>,
    pub file_extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub name: String,
    pub version: String,
    /// Image used by the docker backend
    pub image: String,
    pub execution: LanguageExecution,
    pub memory_limit_mb: u32,
    pub cpu_limit: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct LanguagesJson {
    languages: Vec<LanguageConfig>,
}

/// Language configuration manager
#[derive(Debug, Clone)]
pub struct LanguageConfigManager {
    configs: HashMap<String, LanguageConfig>,
}

impl LanguageConfigManager {
    /// Load language configurations from languages.json
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Language config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        Self::from_json(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let languages_json: LanguagesJson = serde_json::from_str(content)?;

        let mut configs = HashMap::new();
        for lang in languages_json.languages {
            let language: Language = lang
                .name
                .parse()
                .with_context(|| format!("Unknown language '{}' in languages.json", lang.name))?;
            configs.insert(language.to_string(), lang);
        }

        if configs.is_empty() {
            bail!("No languages configured");
        }

        Ok(Self { configs })
    }

    /// Load `path` if it exists, otherwise fall back to the built-in defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let manager = Self::load(path)?;
            info!(path = %path.display(), languages = ?manager.list_languages(), "Loaded language configurations");
            Ok(manager)
        } else {
            warn!(path = %path.display(), "Language config not found, using defaults");
            Ok(Self::defaults())
        }
    }

    /// node for JavaScript, python3 for Python
    pub fn defaults() -> Self {
        let configs = [
            LanguageConfig {
                name: Language::JavaScript.to_string(),
                version: "20".to_string(),
                image: "node:20-alpine".to_string(),
                execution: LanguageExecution {
                    command: "node".to_string(),
                    args: vec!["--max-old-space-size=128".to_string()],
                    file_extension: ".js".to_string(),
                },
                memory_limit_mb: 256,
                cpu_limit: 0.5,
            },
            LanguageConfig {
                name: Language::Python.to_string(),
                version: "3.12".to_string(),
                image: "python:3.12-alpine".to_string(),
                execution: LanguageExecution {
                    command: "python3".to_string(),
                    args: vec!["-u".to_string()],
                    file_extension: ".py".to_string(),
                },
                memory_limit_mb: 256,
                cpu_limit: 0.5,
            },
        ]
        .into_iter()
        .map(|config| (config.name.clone(), config))
        .collect();

        Self { configs }
    }

    /// Get configuration for a specific language
    pub fn get_config(&self, language: &Language) -> Result<&LanguageConfig> {
        let lang_name = language.to_string();
        self.configs
            .get(&lang_name)
            .ok_or_else(|| anyhow::anyhow!("No configuration found for language: {}", lang_name))
    }

    pub fn get_image(&self, language: &Language) -> Result<String> {
        Ok(self.get_config(language)?.image.clone())
    }

    pub fn get_memory_limit_mb(&self, language: &Language) -> Result<u32> {
        Ok(self.get_config(language)?.memory_limit_mb)
    }

    pub fn get_cpu_limit(&self, language: &Language) -> Result<f32> {
        Ok(self.get_config(language)?.cpu_limit)
    }

    /// List all supported languages, sorted
    pub fn list_languages(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Which isolation mechanism runs submissions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Child OS process per run
    Process,
    /// Docker container per run
    Docker,
}

impl std::str::FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "process" => Ok(Backend::Process),
            "docker" => Ok(Backend::Docker),
            other => bail!("Invalid backend '{}', expected 'process' or 'docker'", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub backend: Backend,
    pub timeout: Duration,
    pub languages_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Process,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            languages_path: PathBuf::from(DEFAULT_LANGUAGES_PATH),
        }
    }
}

impl EngineConfig {
    /// Reads `GRADEBOX_BACKEND`, `GRADEBOX_TIMEOUT_MS` and `GRADEBOX_LANGUAGES`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(backend) = lookup("GRADEBOX_BACKEND") {
            config.backend = backend.parse()?;
        }
        if let Some(timeout) = lookup("GRADEBOX_TIMEOUT_MS") {
            let ms: u64 = timeout
                .parse()
                .with_context(|| format!("Invalid GRADEBOX_TIMEOUT_MS '{}'", timeout))?;
            if ms == 0 {
                bail!("GRADEBOX_TIMEOUT_MS must be greater than zero");
            }
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(path) = lookup("GRADEBOX_LANGUAGES") {
            config.languages_path = PathBuf::from(path);
        }

        Ok(config)
    }
}
