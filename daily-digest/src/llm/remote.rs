use anyhow::{Context, Result};
use common::LlmConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::{ChatMessage, ChatRequest, LlmProvider, LlmResponse, UsageMetadata};

/// Remote LLM provider using OpenAI-compatible HTTP API
pub struct RemoteLlmProvider {
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl RemoteLlmProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let api_key = api_key.into();
        Self {
            base_url: base_url.into(),
            api_key: Some(api_key).filter(|k| !k.trim().is_empty()),
            model: model.into(),
            timeout: Duration::from_secs(60),
            temperature: None,
            client: reqwest::Client::new(),
        }
    }

    /// A missing key is not an error here; every call will fail instead.
    pub fn from_config(config: &LlmConfig, client: reqwest::Client) -> Self {
        Self {
            base_url: config.api_url().to_string(),
            api_key: config.api_key(),
            model: config.model().to_string(),
            timeout: Duration::from_secs(config.timeout_seconds.unwrap_or(60)),
            temperature: config.temperature,
            client,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, api_key: &str, body: &OpenAiRequest<'_>) -> Result<OpenAiResponse> {
        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(api_key)
            // llm.timeout_seconds, not the shared client's http timeout
            .timeout(self.timeout)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .context("LLM HTTP request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM API error {}: {}", status, body);
        }

        response.json().await.context("Failed to parse LLM response")
    }
}

#[async_trait::async_trait]
impl LlmProvider for RemoteLlmProvider {
    async fn complete(&self, request: ChatRequest) -> Result<LlmResponse> {
        let api_key = self
            .api_key
            .as_deref()
            .context("LLM API key not configured")?;

        let req_body = OpenAiRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: &request.messages,
            response_format: request.response_schema.map(|s| ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaSpec {
                    name: s.name,
                    strict: true,
                    schema: s.schema,
                },
            }),
        };

        let resp_body = tokio::time::timeout(self.timeout, self.send(api_key, &req_body))
            .await
            .context("LLM request timed out")??;

        let choice = resp_body
            .choices
            .into_iter()
            .next()
            .context("LLM response has no choices")?;

        if let Some(refusal) = choice.message.refusal {
            anyhow::bail!("LLM refused the request: {}", refusal);
        }
        let content = choice
            .message
            .content
            .context("LLM response message has no content")?;

        let usage = resp_body.usage.unwrap_or_default();
        let usage = UsageMetadata {
            prompt_tokens: usage.prompt_tokens.unwrap_or(0),
            completion_tokens: usage.completion_tokens.unwrap_or(0),
            total_tokens: usage.total_tokens.unwrap_or(0),
        };

        Ok(LlmResponse {
            content,
            usage,
            model: resp_body.model.unwrap_or_else(|| self.model.clone()),
        })
    }
}

// OpenAI API request/response structures
#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaSpec,
}

#[derive(Debug, Serialize)]
struct JsonSchemaSpec {
    name: &'static str,
    strict: bool,
    schema: Value,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: Option<usize>,
    #[serde(default)]
    completion_tokens: Option<usize>,
    #[serde(default)]
    total_tokens: Option<usize>,
}
