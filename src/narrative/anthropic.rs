//! Anthropic messages provider (secondary tier).
//!
//! Replies may wrap the JSON object in prose, so the object is cut out of the
//! text before parsing.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{
    extract_json_object, is_usable_credential, parse_insight, Insight, NarrativeProvider,
    ProviderError,
};
use crate::config::NarrativeConfig;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    pub const NAME: &'static str = "anthropic";

    pub fn new(api_key: Option<String>, model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.map(|key| key.trim().to_string()),
            model: model.into(),
            base_url: base_url.into(),
        }
    }

    pub fn from_config(config: &NarrativeConfig) -> Self {
        Self::new(
            config.anthropic_api_key.clone(),
            config.anthropic_model.clone(),
            config.anthropic_base_url.clone(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[async_trait]
impl NarrativeProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn is_available(&self) -> bool {
        is_usable_credential(self.api_key.as_deref())
    }

    async fn attempt(&self, prompt: &str) -> Result<Insight, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or(ProviderError::Unavailable)?;
        let url = format!("{}/v1/messages", self.base_url);

        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{ "role": "user", "content": prompt }]
        });

        tracing::debug!("Requesting narrative from Anthropic model {}", self.model);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::Status { status, body });
        }

        let message: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let text: String = message
            .content
            .iter()
            .filter(|block| block.content_type == "text")
            .map(|block| block.text.as_str())
            .collect();

        let json = extract_json_object(&text).ok_or_else(|| {
            ProviderError::InvalidResponse("no JSON object in response text".to_string())
        })?;

        parse_insight(json)
    }
}
