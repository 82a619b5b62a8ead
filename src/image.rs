//! Cover image generation.
//!
//! [`CoverArtist`] turns an article into a short scene description with the
//! structured extractor, then hands that description to an
//! [`ImageGenerator`]. The first returned URL becomes the cover.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::config::ImageConfig;
use crate::llm::StructuredExtractor;
use crate::{Error, Result};

/// Characters of article text used to describe the cover scene.
const ARTICLE_PREVIEW_CHARS: usize = 600;

const SCENE_INSTRUCTIONS: &str = "\
Write a detailed prompt for an image generator that illustrates the article below.
Make people the main subject, for example two young people shopping in a futuristic store.
Avoid robots and AI imagery. Do not mention brands or company names.
Answer in English.";

/// Something that turns a text prompt into hosted image URLs.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Vec<String>>;
}

/// Scene description returned by the model
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ImagePrompt {
    pub description: String,
}

/// Text-to-image client for the Dreamina (Jimeng) generation endpoint.
pub struct DreaminaClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    width: u32,
    height: u32,
    sample_strength: f32,
}

impl DreaminaClient {
    pub fn new(config: &ImageConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            width: config.width,
            height: config.height,
            sample_strength: config.sample_strength,
        }
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "prompt": prompt,
            "width": self.width,
            "height": self.height,
            "sample_strength": self.sample_strength,
        })
    }
}

fn image_urls(body: &Value) -> Vec<String> {
    body["data"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["url"].as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ImageGenerator for DreaminaClient {
    async fn generate(&self, prompt: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| Error::http("image generation", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::http("image generation", e))?;
        let urls = image_urls(&body);
        debug!(count = urls.len(), "images generated");
        Ok(urls)
    }
}

/// Produces a cover image URL for an article.
pub struct CoverArtist {
    scenes: StructuredExtractor<ImagePrompt>,
    generator: Arc<dyn ImageGenerator>,
}

impl CoverArtist {
    pub fn new(scenes: StructuredExtractor<ImagePrompt>, generator: Arc<dyn ImageGenerator>) -> Self {
        Self { scenes, generator }
    }

    /// Example object shown to the model when asking for a scene.
    pub fn scene_shape() -> Value {
        json!({ "description": "someone some action somewhere" })
    }

    pub async fn cover_for(&self, article: &str) -> Result<String> {
        let preview: String = article.chars().take(ARTICLE_PREVIEW_CHARS).collect();
        let scene = self
            .scenes
            .extract(&format!("{SCENE_INSTRUCTIONS}\n\nArticle:\n{preview}"))
            .await?;
        info!(description = %scene.description, "cover scene");

        self.generator
            .generate(&scene.description)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::upstream_empty("image generation"))
    }
}

/// Generator returning a fixed URL list and remembering the prompts it saw.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct StubImageGenerator {
    pub urls: Vec<String>,
    pub prompts: tokio::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl StubImageGenerator {
    pub fn with_urls(urls: &[&str]) -> Self {
        Self {
            urls: urls.iter().map(|u| u.to_string()).collect(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
#[async_trait]
impl ImageGenerator for StubImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<Vec<String>> {
        self.prompts.lock().await.push(prompt.to_string());
        Ok(self.urls.clone())
    }
}
