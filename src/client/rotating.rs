// HTTP client for OpenAI-compatible chat-completion endpoints

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::credentials::CredentialPool;
use super::types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use super::ChatBackend;
use crate::config::ApiConfig;
use crate::errors::{LooperError, Result};
use crate::monitoring;

/// Chat-completion client that rotates through a credential pool.
///
/// One network call per `complete`; no retries at this layer.
pub struct RotatingClient {
    http: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    credentials: CredentialPool,
}

impl RotatingClient {
    pub fn new(config: &ApiConfig, credentials: CredentialPool) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LooperError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            credentials,
        })
    }

    /// Build from config, discovering credentials when none are inline
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        let credentials = CredentialPool::discover(&config.api_keys)?;
        tracing::info!(
            "Chat client ready: model={}, {} credential(s)",
            config.model,
            credentials.len()
        );
        Self::new(config, credentials)
    }

    pub fn credential_count(&self) -> usize {
        self.credentials.len()
    }

    async fn send(&self, messages: &[ChatMessage]) -> Result<String> {
        let (index, key) = self.credentials.claim();
        tracing::debug!(
            "POST {} (model={}, messages={}, key #{})",
            self.endpoint,
            self.model,
            messages.len(),
            index
        );

        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(key)
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(LooperError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: ChatCompletionResponse = response.json().await?;
        if let Some(usage) = &body.usage {
            tracing::debug!(
                "Completion usage: prompt={} completion={}",
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }
        body.first_content().ok_or(LooperError::EmptyResponse)
    }
}

#[async_trait]
impl ChatBackend for RotatingClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let result = self.send(messages).await;
        match &result {
            Ok(_) => monitoring::record_api_request("success"),
            Err(e) => {
                tracing::warn!("Chat completion failed: {}", e);
                monitoring::record_api_request("error");
            }
        }
        result
    }

    fn model(&self) -> &str {
        &self.model
    }
}
