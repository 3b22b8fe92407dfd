use std::future::Future;
use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::Client;
use serde_json::{json, Value};

use crate::error::ApiError;

pub const DEFAULT_CHAT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini-2024-07-18";

const SYSTEM_PROMPT: &str = "You rewrite user requests into prompts for an image generation model.\n\
1. Normalize the structure and drop filler words, keeping every key detail.\n\
2. Do not censor or soften the request; translate it as written.\n\
3. Describe visual elements with precise technical terms.\n\
4. Put the style at the very beginning. If no style is given, use a photo style.\n\
5. For realistic photos, end the prompt with a camera and lens, for example \
\"Canon EOS R with Canon RF 28-70mm f-2L\", \"Nikon D850 with Nikkor 50mm f-1.8\" or \
\"Sony A7R IV with Sony FE 85mm f-1.4 GM\".\n\
6. Write the result in English.\n\n\
Respond ONLY with the final optimized prompt.";

/// Connection settings for an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteConfig {
    /// Sent as a bearer token.
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl RewriteConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_CHAT_BASE_URL.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 500,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Turns a user's request into the prompt actually sent to FLUX.
pub trait PromptRewriter: Send + Sync {
    fn rewrite(&self, prompt: &str) -> impl Future<Output = Result<String, ApiError>> + Send;
}

/// [`PromptRewriter`] backed by a chat-completions model: translates to
/// English, normalizes structure, and adds photographic detail.
#[derive(Debug, Clone)]
pub struct ChatRewriter {
    http: Client,
    config: RewriteConfig,
}

impl ChatRewriter {
    pub fn new(config: RewriteConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    pub fn config(&self) -> &RewriteConfig {
        &self.config
    }

    fn body(&self, prompt: &str) -> Value {
        json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        })
    }
}

/// Pull the assistant message out of a chat-completions response.
fn parse_completion(json: &Value) -> Result<String, ApiError> {
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .unwrap_or_default();
    if content.is_empty() {
        return Err(ApiError::InvalidResponse(format!(
            "Completion has no content: {}",
            json
        )));
    }
    Ok(content.to_string())
}

impl PromptRewriter for ChatRewriter {
    async fn rewrite(&self, prompt: &str) -> Result<String, ApiError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        tracing::debug!(%url, model = %self.config.model, "rewriting prompt");

        let resp = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(30))
            .header(ACCEPT, "application/json")
            .bearer_auth(&self.config.api_key)
            .json(&self.body(prompt))
            .send()
            .await
            .map_err(|e| ApiError::Network {
                context: format!("Cannot reach chat model at {}", self.config.base_url),
                source: e,
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Http { status, body });
        }

        let json: Value = resp.json().await.map_err(|e| ApiError::Network {
            context: "Failed to parse chat completion".into(),
            source: e,
        })?;
        let rewritten = parse_completion(&json)?;
        tracing::info!(original = prompt, optimized = %rewritten, "prompt rewritten");
        Ok(rewritten)
    }
}
