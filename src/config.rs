use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::{Error, Result};

static DEFAULT_CONFIG: &str = include_str!("default_config.toml");

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub notion: NotionConfig,
    pub llm: LlmConfig,
    pub image: ImageConfig,
    pub notify: NotifyConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct NotionConfig {
    pub api_key: String,
    pub database_id: String,
    pub base_url: String,
    /// Value sent in the `Notion-Version` header
    pub version: String,
    pub title_property: String,
    pub status_property: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    /// Model used to research and draft the article
    pub draft_model: String,
    /// Model used for small structured-extraction calls
    pub extract_model: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ImageConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub width: u32,
    pub height: u32,
    pub sample_strength: f32,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct NotifyConfig {
    pub discord_webhook_url: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Status of database pages that hold prompts waiting to be drafted
    pub source_status: String,
    /// Status given to newly created drafts
    pub draft_status: String,
    /// Page property used as the draft title, when present
    pub title_property: String,
    pub cover: bool,
}

impl Config {
    /// Parse the bundled default config (validated by build.rs).
    pub fn compiled_default() -> Self {
        toml::from_str(DEFAULT_CONFIG).unwrap_or_default()
    }

    /// Load a user config file layered over the bundled defaults, then apply
    /// environment overrides.
    ///
    /// A missing file is not an error; a malformed one is.
    pub fn load(path: &Path) -> Result<Self> {
        let user = match fs::read_to_string(path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        let mut config = Self::from_layers(user.as_deref())?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_layers(user: Option<&str>) -> Result<Self> {
        let mut table: toml::Table = DEFAULT_CONFIG.parse()?;
        if let Some(user) = user {
            merge(&mut table, user.parse()?);
        }
        Ok(toml::Value::Table(table).try_into()?)
    }

    /// Override secrets and endpoints from environment-style variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let overrides: [(&str, &mut String); 7] = [
            ("NOTION_API_KEY", &mut self.notion.api_key),
            ("NOTION_DATABASE_ID", &mut self.notion.database_id),
            ("OPENROUTER_API_KEY", &mut self.llm.api_key),
            ("OPENROUTER_BASE_URL", &mut self.llm.base_url),
            ("DREAMINA_API_KEY", &mut self.image.api_key),
            ("DREAMINA_BASE_URL", &mut self.image.endpoint),
            ("DISCORD_WEBHOOK_URL", &mut self.notify.discord_webhook_url),
        ];
        for (key, slot) in overrides {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *slot = value;
            }
        }
    }

    /// Check the settings needed to read and write the document database.
    pub fn validate_notion(&self) -> Result<()> {
        require(&[
            ("notion.api_key", &self.notion.api_key),
            ("notion.database_id", &self.notion.database_id),
        ])
    }

    /// Check everything a full pipeline run needs.
    pub fn validate(&self) -> Result<()> {
        self.validate_notion()?;
        require(&[("llm.api_key", &self.llm.api_key)])?;
        if self.pipeline.cover {
            require(&[
                ("image.api_key", &self.image.api_key),
                ("image.endpoint", &self.image.endpoint),
            ])?;
        }
        Ok(())
    }
}

fn require(fields: &[(&str, &String)]) -> Result<()> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::config(format!("missing {}", missing.join(", "))))
    }
}

/// Deep-merge `overlay` into `base`; overlay values win.
fn merge(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
