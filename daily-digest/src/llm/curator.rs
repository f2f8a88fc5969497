//! Picks the most significant stories out of a batch of fetched articles.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::{object_schema, structured_completion, LlmProvider, StructuredOutput};
use crate::models::{Article, Story};

pub const AUDIENCE_DESCRIPTION: &str = "Your audience consists of AI professionals - engineers and entrepreneurs - with deep technical expertise in the field. They follow major developments in AI and are fluent in technical terminology. Focus on significant technical and industry developments rather than introductory content or niche applications.";

/// Answer shape of the curation call.
#[derive(Debug, Deserialize)]
pub struct StoryEvaluations {
    pub stories: Vec<StoryEvaluation>,
}

#[derive(Debug, Deserialize)]
pub struct StoryEvaluation {
    pub explanation: String,
    pub title: String,
    pub urls: Vec<String>,
}

impl StructuredOutput for StoryEvaluations {
    const NAME: &'static str = "story_evaluations";

    fn schema() -> Value {
        let story = object_schema(json!({
            "explanation": { "type": "string" },
            "title": { "type": "string" },
            "urls": { "type": "array", "items": { "type": "string" } }
        }));

        object_schema(json!({
            "stories": { "type": "array", "items": story }
        }))
    }
}

fn count_word(count: usize) -> &'static str {
    match count {
        2 => "two",
        3 => "three",
        _ => "few",
    }
}

fn system_prompt(story_count: usize) -> String {
    format!(
        r#"You are an expert news curator with a focus on Artificial Intelligence. {audience}

Your task is to analyze the provided JSON array of news articles and identify the {count} most significant AI-related stories. For each story:
- Provide a brief explanation of its relevance
- Create a clear, informative title
- List 1-3 of the provided article URLs from the most authoritative sources

Selection criteria:
- Stories must represent new developments in frontier AI technology or its business applications
- Impact should be broad and significant to the AI field and world at large, avoiding niche topics
- Content should be factual and objective, avoiding speculation and personal opinions

If multiple articles cover the same story, synthesize their information into a single comprehensive entry while citing all relevant sources."#,
        audience = AUDIENCE_DESCRIPTION,
        count = count_word(story_count),
    )
}

/// Asks the LLM for the `story_count` most significant stories among `articles`.
///
/// Never fails: any transport, schema or parse error is logged and yields no stories.
pub async fn curate_stories<P: LlmProvider + ?Sized>(
    provider: &P,
    articles: &[Article],
    story_count: usize,
) -> Vec<Story> {
    let json_articles = match serde_json::to_string(articles) {
        Ok(json) => json,
        Err(e) => {
            error!("Error during story filtering: failed to serialize articles: {}", e);
            return Vec::new();
        }
    };

    let user_prompt = format!(
        "Pick the {} most significant stories based on these articles: {}",
        count_word(story_count),
        json_articles
    );

    match structured_completion::<StoryEvaluations, _>(provider, &system_prompt(story_count), user_prompt).await {
        Ok(evaluations) => {
            info!("Curator selected {} stories", evaluations.stories.len());
            stories_from_evaluations(evaluations, articles)
        }
        Err(e) => {
            error!("Error during story filtering: {:#}", e);
            Vec::new()
        }
    }
}

/// Maps each evaluation's urls back to fetched articles by exact url equality.
///
/// An article may back several stories; a story backed by no fetched article is dropped.
pub fn stories_from_evaluations(evaluations: StoryEvaluations, articles: &[Article]) -> Vec<Story> {
    evaluations
        .stories
        .into_iter()
        .filter_map(|evaluation| {
            let matched: Vec<Article> = articles
                .iter()
                .filter(|a| evaluation.urls.iter().any(|u| u == &a.url))
                .cloned()
                .collect();

            if matched.is_empty() {
                warn!(title = %evaluation.title, urls = ?evaluation.urls, "story cites no fetched article, dropping");
                return None;
            }

            info!(title = %evaluation.title, articles = matched.len(), explanation = %evaluation.explanation, "story selected");
            Some(Story {
                title: evaluation.title,
                articles: matched,
            })
        })
        .collect()
}
