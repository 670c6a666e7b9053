use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;
use thiserror::Error;

/// Config file looked up in the current directory.
pub const CONFIG_FILE: &str = ".plantir.toml";

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_REGION: &str = "us-west-2";
pub const DEFAULT_MODEL: &str = "us.anthropic.claude-opus-4-5-20251101-v1:0";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Top-level configuration loaded from `.plantir.toml`.
///
/// All fields are optional; the tool works with zero config as long as a
/// GitHub token is available from the environment.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GitHubConfig {
    /// GitHub API token. If None, falls back to GITHUB_TOKEN env var.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// API root, overridable for GitHub Enterprise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Authors excluded from every search with a `-author:` qualifier.
    #[serde(default = "default_excluded_authors")]
    pub excluded_authors: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            excluded_authors: default_excluded_authors(),
        }
    }
}

fn default_excluded_authors() -> Vec<String> {
    vec!["app/dependabot".to_string()]
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModelConfig {
    /// AWS named profile. None uses the default credential chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Bedrock model identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Model settings after applying flag > config > default precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSettings {
    pub profile: Option<String>,
    pub region: String,
    pub model: String,
    pub max_tokens: u32,
}

impl Config {
    /// Load configuration from `.plantir.toml` in the current directory.
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            Config::default()
        };

        if config.github.token.is_none() {
            if let Ok(token) = std::env::var("GITHUB_TOKEN") {
                config.github.token = Some(token);
            }
        }

        Ok(config)
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Write the config as TOML to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Resolve the GitHub token: config file value takes precedence,
    /// falls back to GITHUB_TOKEN env var.
    pub fn github_token(&self) -> Option<String> {
        self.github
            .token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
    }

    pub fn api_url(&self) -> &str {
        self.github.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    /// Merge command-line overrides with the `[model]` section.
    pub fn model_settings(
        &self,
        profile: Option<&str>,
        region: Option<&str>,
        model: Option<&str>,
    ) -> ModelSettings {
        fn pick(flag: Option<&str>, configured: Option<&String>) -> Option<String> {
            flag.filter(|v| !v.is_empty())
                .map(str::to_string)
                .or_else(|| configured.filter(|v| !v.is_empty()).cloned())
        }

        ModelSettings {
            profile: pick(profile, self.model.profile.as_ref()),
            region: pick(region, self.model.region.as_ref())
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            model: pick(model, self.model.model.as_ref())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: self.model.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        }
    }

    /// Interactively edit the `[model]` section.
    ///
    /// Each prompt shows the current value; an empty answer keeps it.
    pub fn prompt_model_settings<R: BufRead, W: Write>(
        &mut self,
        input: &mut R,
        out: &mut W,
    ) -> Result<(), ConfigError> {
        self.model.profile = prompt_field(input, out, "AWS Profile", self.model.profile.take())?;
        self.model.region = prompt_field(input, out, "AWS Region", self.model.region.take())?;
        self.model.model = prompt_field(input, out, "Bedrock Model ID", self.model.model.take())?;
        Ok(())
    }
}

fn prompt_field<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    label: &str,
    current: Option<String>,
) -> Result<Option<String>, ConfigError> {
    write!(out, "{} [{}]: ", label, current.as_deref().unwrap_or("unset"))?;
    out.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let answer = line.trim();
    if answer.is_empty() {
        Ok(current)
    } else {
        Ok(Some(answer.to_string()))
    }
}
