use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Core trait for chat-completion providers
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run one chat completion. No retries: a failure is returned as-is.
    async fn complete(&self, request: ChatRequest) -> Result<LlmResponse>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Named JSON schema the provider must constrain its answer to.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: &'static str,
    pub schema: Value,
}

/// Request structure for a chat completion
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub response_schema: Option<ResponseSchema>,
}

/// Response from a chat completion
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub usage: UsageMetadata,
    pub model: String,
}

/// Token usage metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// A response type with a fixed JSON schema.
pub trait StructuredOutput: DeserializeOwned {
    /// Schema name sent to the provider
    const NAME: &'static str;

    fn schema() -> Value;

    fn response_schema() -> ResponseSchema {
        ResponseSchema {
            name: Self::NAME,
            schema: Self::schema(),
        }
    }
}

/// Strict object schema: every property required, nothing else allowed.
pub fn object_schema(properties: Value) -> Value {
    let required: Vec<String> = properties
        .as_object()
        .map(|props| props.keys().cloned().collect())
        .unwrap_or_default();

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

/// Ask for a completion constrained to `T`'s schema and decode it.
pub async fn structured_completion<T, P>(provider: &P, system_prompt: &str, user_prompt: String) -> Result<T>
where
    T: StructuredOutput,
    P: LlmProvider + ?Sized,
{
    let request = ChatRequest {
        messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)],
        response_schema: Some(T::response_schema()),
    };

    let response = provider.complete(request).await?;
    tracing::debug!(
        schema = T::NAME,
        model = %response.model,
        total_tokens = response.usage.total_tokens,
        "structured completion received"
    );

    // Schema-constrained answers are usually bare JSON already.
    if let Ok(parsed) = serde_json::from_str(response.content.trim()) {
        return Ok(parsed);
    }

    let cleaned_json = extract_json_from_text(&response.content)
        .with_context(|| format!("No JSON object found in {} response", T::NAME))?;

    serde_json::from_str(&cleaned_json)
        .with_context(|| format!("Failed to parse {} response as JSON. Input was: {}", T::NAME, cleaned_json))
}

pub mod curator;
pub mod remote;
pub mod summarizer;

/// Helper to extract JSON from text that might contain markdown backticks or preamble
pub fn extract_json_from_text(text: &str) -> Option<String> {
    // 1. Try to find content between ```json and ```
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim().to_string());
        }
    }

    // 2. Try to find content between ``` and ```
    if let Some(start) = text.find("```") {
        let rest = &text[start + 3..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim().to_string());
        }
    }

    // 3. Try to find the first '{' and last '}'
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some(text[start..=end].to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_schema_requires_every_property() {
        let schema = object_schema(json!({
            "title": { "type": "string" },
            "summary": { "type": "string" }
        }));

        assert_eq!(schema["type"], "object");
        assert_eq!(schema["additionalProperties"], false);
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert!(required.contains(&"title"));
        assert!(required.contains(&"summary"));
        assert_eq!(required.len(), 2);
    }

    #[test]
    fn extracts_json_from_fenced_block() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nThanks";
        assert_eq!(extract_json_from_text(text).as_deref(), Some("{\"a\": 1}"));
    }

    #[test]
    fn extracts_bare_json_object() {
        let text = "Sure! {\"stories\": []} hope it helps";
        assert_eq!(extract_json_from_text(text).as_deref(), Some("{\"stories\": []}"));
    }

    #[test]
    fn no_json_yields_none() {
        assert_eq!(extract_json_from_text("not json at all"), None);
        assert_eq!(extract_json_from_text("} backwards {"), None);
    }
}
