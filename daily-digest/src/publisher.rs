use anyhow::{Context, Result};
use common::ForumConfig;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// A topic to create on the forum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTopic {
    pub title: String,
    /// Markdown body of the first post
    pub raw: String,
    pub category: u64,
    pub tags: Vec<String>,
}

/// Reference to a created post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPost {
    pub post_id: u64,
    pub topic_id: u64,
    pub url: String,
}

/// Forum post creation
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    /// Create a new topic as the service account. Errors carry the forum's
    /// validation messages.
    async fn create_topic(&self, topic: &NewTopic) -> Result<PublishedPost>;
}

/// Publishes through the Discourse REST API (`POST /posts.json`).
pub struct DiscoursePublisher {
    base_url: String,
    api_key: Option<String>,
    api_username: String,
    client: reqwest::Client,
}

impl DiscoursePublisher {
    pub fn from_config(config: &ForumConfig, client: reqwest::Client) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key(),
            api_username: config.api_username().to_string(),
            client,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreatePostBody<'a> {
    title: &'a str,
    raw: &'a str,
    category: u64,
    tags: &'a [String],
    /// Skips min-length, rate-limit and similar user-facing checks
    skip_validations: bool,
}

#[derive(Debug, Deserialize)]
struct CreatedPost {
    id: u64,
    topic_id: u64,
    topic_slug: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

#[async_trait::async_trait]
impl Publisher for DiscoursePublisher {
    async fn create_topic(&self, topic: &NewTopic) -> Result<PublishedPost> {
        let api_key = self.api_key.as_deref().context("Forum API key not configured")?;

        let body = CreatePostBody {
            title: &topic.title,
            raw: &topic.raw,
            category: topic.category,
            tags: &topic.tags,
            skip_validations: true,
        };

        let response = self
            .client
            .post(format!("{}/posts.json", self.base_url))
            .header("Api-Key", api_key)
            .header("Api-Username", &self.api_username)
            .json(&body)
            .send()
            .await
            .context("Forum HTTP request failed")?;

        let status = response.status();
        let text = response.text().await.context("Failed to read forum response")?;

        if !status.is_success() {
            match serde_json::from_str::<ErrorBody>(&text) {
                Ok(err) if !err.errors.is_empty() => {
                    anyhow::bail!("{} ({})", err.errors.join(", "), status)
                }
                _ => anyhow::bail!("forum returned {}: {}", status, text),
            }
        }

        let created: CreatedPost = serde_json::from_str(&text)
            .with_context(|| format!("Unexpected forum response: {}", text))?;
        let slug = created.topic_slug.unwrap_or_else(|| "-".to_string());

        Ok(PublishedPost {
            post_id: created.id,
            topic_id: created.topic_id,
            url: format!("{}/t/{}/{}", self.base_url, slug, created.topic_id),
        })
    }
}

/// Logs topics instead of creating them.
pub struct DryRunPublisher;

#[async_trait::async_trait]
impl Publisher for DryRunPublisher {
    async fn create_topic(&self, topic: &NewTopic) -> Result<PublishedPost> {
        info!(
            title = %topic.title,
            category = topic.category,
            tags = ?topic.tags,
            "dry run, not posting:\n{}",
            topic.raw
        );
        Ok(PublishedPost {
            post_id: 0,
            topic_id: 0,
            url: "dry-run".to_string(),
        })
    }
}

/// Creates the topic, logging the outcome. A failure is terminal for this
/// topic only.
pub async fn publish<P: Publisher + ?Sized>(publisher: &P, topic: &NewTopic) -> Option<PublishedPost> {
    match publisher.create_topic(topic).await {
        Ok(post) => {
            info!(url = %post.url, "Successfully created daily digest post");
            Some(post)
        }
        Err(e) => {
            error!(title = %topic.title, "Failed to create daily digest post. Errors: {:#}", e);
            None
        }
    }
}
