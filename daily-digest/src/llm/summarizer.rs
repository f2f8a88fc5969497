// Summarizer module
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::curator::AUDIENCE_DESCRIPTION;
use super::{object_schema, structured_completion, LlmProvider, StructuredOutput};
use crate::models::{Story, Summary};

/// Answer shape of both summarization calls.
#[derive(Debug, Deserialize)]
pub struct StorySummary {
    pub title: String,
    pub summary: String,
    pub sources: String,
}

impl StructuredOutput for StorySummary {
    const NAME: &'static str = "story_summary";

    fn schema() -> Value {
        object_schema(json!({
            "title": { "type": "string" },
            "summary": { "type": "string" },
            "sources": { "type": "string" }
        }))
    }
}

impl From<StorySummary> for Summary {
    fn from(s: StorySummary) -> Self {
        Summary {
            title: s.title.trim().to_string(),
            content: s.summary,
            sources: s.sources,
        }
    }
}

fn story_prompt() -> String {
    format!(
        r#"You are an expert in summarizing news stories related to Artificial Intelligence. {}

You will receive JSON containing one or more related articles. Analyze these articles and return a JSON response with the following fields:
- title: A clear, concise title in plain text (no markdown)
- summary: A focused summary in markdown format, containing 2-3 bullet points highlighting key technical details and implications
- sources: A markdown bullet point list of the source URLs from the provided articles

Your summaries should emphasize technical substance and business impact while avoiding surface-level explanations. Keep the bullet points short and to the point."#,
        AUDIENCE_DESCRIPTION
    )
}

fn digest_prompt() -> String {
    format!(
        r####"You are an expert editor producing a daily news digest. {}

You will receive a markdown document with one "## <source>" section per news source, each listing the latest items as "### [title](url)" followed by a description. Return a JSON response with the following fields:
- title: A clear, concise title for today's digest in plain text (no markdown)
- summary: The digest in markdown. Keep one "## <source>" section per source, in the same order, and under each write 2-3 short, technically dense bullet points covering the key items. Link every item you mention to its URL.
- sources: An empty string (the links are already part of the summary)

Avoid speculation and personal opinions."####,
        AUDIENCE_DESCRIPTION
    )
}

/// Summarizes one curated story. On failure the story is skipped (`None`).
pub async fn summarize_story<P: LlmProvider + ?Sized>(provider: &P, story: &Story) -> Option<Summary> {
    let story_json = match serde_json::to_string(story) {
        Ok(json) => json,
        Err(e) => {
            error!("Error during story summary generation: {}", e);
            return None;
        }
    };

    let user_prompt = format!("Analyze and summarize the following articles: {}", story_json);

    match structured_completion::<StorySummary, _>(provider, &story_prompt(), user_prompt).await {
        Ok(summary) => {
            info!(story = %story.title, title = %summary.title, "story summarized");
            Some(summary.into())
        }
        Err(e) => {
            error!(story = %story.title, "Error during story summary generation: {:#}", e);
            None
        }
    }
}

/// Summarizes the accumulated digest markdown, falling back to the raw
/// markdown (under `fallback_title`) when the LLM call fails.
pub async fn summarize_digest<P: LlmProvider + ?Sized>(provider: &P, markdown: &str, fallback_title: &str) -> Summary {
    let user_prompt = format!("Summarize the following news digest:\n\n{}", markdown);

    match structured_completion::<StorySummary, _>(provider, &digest_prompt(), user_prompt).await {
        Ok(summary) if !summary.summary.trim().is_empty() => {
            info!(title = %summary.title, "digest summarized");
            summary.into()
        }
        Ok(_) => {
            warn!("LLM returned an empty digest summary, falling back to raw content");
            raw_digest(markdown, fallback_title)
        }
        Err(e) => {
            warn!("Digest summarization failed: {:#}, falling back to raw content", e);
            raw_digest(markdown, fallback_title)
        }
    }
}

/// Fallback when the LLM fails: the digest as fetched
fn raw_digest(markdown: &str, title: &str) -> Summary {
    Summary {
        title: title.to_string(),
        content: markdown.to_string(),
        sources: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatRequest, LlmResponse, UsageMetadata};
    use crate::models::Article;

    struct FixedProvider(Option<&'static str>);

    #[async_trait::async_trait]
    impl LlmProvider for FixedProvider {
        async fn complete(&self, request: ChatRequest) -> anyhow::Result<LlmResponse> {
            assert_eq!(request.response_schema.map(|s| s.name), Some("story_summary"));
            match self.0 {
                Some(content) => Ok(LlmResponse {
                    content: content.to_string(),
                    usage: UsageMetadata::default(),
                    model: "test".to_string(),
                }),
                None => anyhow::bail!("LLM request timed out"),
            }
        }
    }

    fn story() -> Story {
        Story {
            title: "New model".to_string(),
            articles: vec![Article::new("A", "B", "https://a.example/1")],
        }
    }

    #[tokio::test]
    async fn story_summary_maps_fields() {
        let provider = FixedProvider(Some(
            r#"{"title": " Lab ships model ", "summary": "- fast\n- cheap", "sources": "- https://a.example/1"}"#,
        ));

        let summary = summarize_story(&provider, &story()).await.expect("summary");

        assert_eq!(summary.title, "Lab ships model");
        assert_eq!(summary.content, "- fast\n- cheap");
        assert_eq!(summary.sources, "- https://a.example/1");
    }

    #[test]
    fn digest_prompt_describes_markdown_layout() {
        let prompt = digest_prompt();
        assert!(prompt.contains(r####"one "## <source>" section per news source"####));
        assert!(prompt.contains(r####""### [title](url)""####));
        assert!(prompt.contains(AUDIENCE_DESCRIPTION));
        assert!(prompt.ends_with("Avoid speculation and personal opinions."));
    }

    #[tokio::test]
    async fn failed_story_summary_is_skipped() {
        assert!(summarize_story(&FixedProvider(None), &story()).await.is_none());
        assert!(summarize_story(&FixedProvider(Some("not json")), &story()).await.is_none());
    }

    #[tokio::test]
    async fn failed_digest_falls_back_to_raw_markdown() {
        let markdown = "## TechNews\n\n### [A](https://a.example/1)\nB";

        let summary = summarize_digest(&FixedProvider(None), markdown, "Daily Digest").await;
        assert_eq!(summary.title, "Daily Digest");
        assert_eq!(summary.content, markdown);

        let summary = summarize_digest(&FixedProvider(Some("{\"title\": 1}")), markdown, "Daily Digest").await;
        assert_eq!(summary.content, markdown);

        let summary = summarize_digest(
            &FixedProvider(Some(r#"{"title": "t", "summary": "  ", "sources": ""}"#)),
            markdown,
            "Daily Digest",
        )
        .await;
        assert_eq!(summary.content, markdown);
    }
}
