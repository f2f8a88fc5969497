use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use common::{Config, DigestMode};
use reqwest::Client;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::ingestion;
use crate::llm::curator::curate_stories;
use crate::llm::remote::RemoteLlmProvider;
use crate::llm::summarizer::{summarize_digest, summarize_story};
use crate::llm::LlmProvider;
use crate::models::FeedItem;
use crate::publisher::{publish, DiscoursePublisher, DryRunPublisher, NewTopic, Publisher};

/// Fetch → curate/summarize → publish, once.
///
/// Runs are independent: nothing is remembered between them, so two runs
/// over the same news make two sets of LLM calls and may post twice.
#[derive(Clone)]
pub struct DigestGenerator {
    client: Client,
    llm: Arc<dyn LlmProvider>,
    publisher: Arc<dyn Publisher>,
}

impl DigestGenerator {
    pub fn new(client: Client, llm: Arc<dyn LlmProvider>, publisher: Arc<dyn Publisher>) -> Self {
        Self { client, llm, publisher }
    }

    /// Wire the HTTP implementations described by `config`.
    pub fn from_config(config: &Config, dry_run: bool) -> Result<Self> {
        let client = ingestion::build_http_client(config.http_timeout_seconds(), config.user_agent())?;

        let llm = RemoteLlmProvider::from_config(&config.llm, client.clone());
        info!(model = %llm.model(), "LLM provider initialized");

        let publisher: Arc<dyn Publisher> = if dry_run {
            info!("Dry run: posts will be logged, not created");
            Arc::new(DryRunPublisher)
        } else {
            Arc::new(DiscoursePublisher::from_config(&config.forum, client.clone()))
        };

        Ok(Self::new(client, Arc::new(llm), publisher))
    }

    /// Entry point of a run. Returns the number of posts created.
    ///
    /// Per-source, per-story and per-post failures are logged and skipped;
    /// only a broken configuration surfaces as an error.
    pub async fn generate_and_post(&self, config: &Config, now: DateTime<Utc>) -> Result<usize> {
        match config.digest.mode {
            DigestMode::NewsApi => self.post_curated_stories(config, now).await,
            DigestMode::Feeds => self.post_feed_digest(config, now).await,
        }
    }

    async fn post_curated_stories(&self, config: &Config, now: DateTime<Utc>) -> Result<usize> {
        let news_api = config.news_api.clone().unwrap_or_default();

        let articles = ingestion::fetch_news_articles(&self.client, &news_api, now).await;
        if articles.is_empty() {
            error!("No articles fetched from NewsAPI.");
            return Ok(0);
        }
        info!("Fetched {} articles.", articles.len());

        let stories = curate_stories(self.llm.as_ref(), &articles, config.digest.story_count).await;
        if stories.is_empty() {
            error!("No stories passed filtering.");
            return Ok(0);
        }
        info!("Created {} stories from articles.", stories.len());

        let tags = config.digest.tags();
        let mut posted = 0;

        for story in &stories {
            let Some(summary) = summarize_story(self.llm.as_ref(), story).await else {
                continue;
            };

            let title = if summary.title.is_empty() {
                story.title.clone()
            } else {
                summary.title.clone()
            };

            let topic = NewTopic {
                title,
                raw: summary.story_markdown(),
                category: config.digest.category_id,
                tags: tags.clone(),
            };

            if publish(self.publisher.as_ref(), &topic).await.is_some() {
                posted += 1;
            }
        }

        info!(posted, stories = stories.len(), "Curated story run complete");
        Ok(posted)
    }

    async fn post_feed_digest(&self, config: &Config, now: DateTime<Utc>) -> Result<usize> {
        let feeds = config
            .feeds
            .as_ref()
            .context("digest.mode = \"feeds\" requires a [feeds] section")?;
        let sources = feeds.parse_sources()?;

        if sources.is_empty() {
            error!("No feed sources configured.");
            return Ok(0);
        }

        let items = ingestion::fetch_feed_sources(&self.client, &sources, feeds.max_items_per_source()).await;
        if items.is_empty() {
            error!("No articles fetched from any feed source.");
            return Ok(0);
        }
        info!(items = items.len(), sources = sources.len(), "Fetched feed items.");

        let markdown = build_digest_markdown(&items);

        let date = now.with_timezone(&Local).format("%Y-%m-%d").to_string();
        let configured_title = config.digest.render_title(&date);
        let fallback_title = configured_title
            .clone()
            .unwrap_or_else(|| format!("Daily Digest for {}", date));

        let summary = summarize_digest(self.llm.as_ref(), &markdown, &fallback_title).await;

        let title = match configured_title {
            Some(title) => title,
            None if summary.title.is_empty() => fallback_title,
            None => summary.title.clone(),
        };

        let topic = NewTopic {
            title,
            raw: summary.digest_markdown(),
            category: config.digest.category_id,
            tags: config.digest.tags(),
        };

        match publish(self.publisher.as_ref(), &topic).await {
            Some(_) => Ok(1),
            None => {
                warn!("Feed digest was not posted");
                Ok(0)
            }
        }
    }
}

/// One "## <source>" section per source, items in fetch order.
pub fn build_digest_markdown(items: &[FeedItem]) -> String {
    let mut markdown = String::new();
    let mut current_source: Option<&str> = None;

    for item in items {
        if current_source != Some(item.source.as_str()) {
            if !markdown.is_empty() {
                markdown.push('\n');
            }
            markdown.push_str(&format!("## {}\n", item.source));
            current_source = Some(item.source.as_str());
        }

        let title = if item.article.title.is_empty() {
            item.article.url.as_str()
        } else {
            item.article.title.as_str()
        };
        markdown.push_str(&format!("\n### [{}]({})\n", title, item.article.url));
        if !item.article.description.is_empty() {
            markdown.push_str(&format!("{}\n", item.article.description));
        }
    }

    markdown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Article;

    fn item(source: &str, n: u32) -> FeedItem {
        FeedItem {
            source: source.to_string(),
            article: Article::new(
                format!("Item {}", n),
                format!("About {}", n),
                format!("https://{}.example/{}", source.to_lowercase(), n),
            ),
        }
    }

    #[test]
    fn digest_markdown_groups_by_source_in_order() {
        let items = vec![item("TechNews", 1), item("TechNews", 2), item("Other", 3)];

        let markdown = build_digest_markdown(&items);

        assert_eq!(
            markdown,
            "## TechNews\n\n### [Item 1](https://technews.example/1)\nAbout 1\n\n### [Item 2](https://technews.example/2)\nAbout 2\n\n## Other\n\n### [Item 3](https://other.example/3)\nAbout 3\n"
        );
    }

    #[test]
    fn untitled_item_uses_url_as_link_text() {
        let mut untitled = item("TechNews", 1);
        untitled.article.title.clear();
        untitled.article.description.clear();

        let markdown = build_digest_markdown(&[untitled]);
        assert!(markdown.contains("### [https://technews.example/1](https://technews.example/1)\n"));
    }
}
