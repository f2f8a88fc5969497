use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use common::{FeedSource, NewsApiConfig};
use feed_rs::model::{Entry, Feed};
use feed_rs::parser;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::models::{Article, FeedItem};

const DEFAULT_NEWS_API_URL: &str = "https://newsapi.org/v2/everything";
const DEFAULT_QUERY: &str = "Artificial Intelligence";
const DESCRIPTION_WIDTH: usize = 120;

/// Builds the HTTP client shared by every outbound call of a run.
pub fn build_http_client(timeout_secs: u64, user_agent: &str) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(user_agent)
        .build()
        .context("failed to build reqwest client")
}

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

#[derive(Debug, Deserialize)]
struct NewsApiArticle {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
}

/// Fetches the last `window_hours` of articles from the news-search API.
///
/// Never fails: a missing key, a transport error, a non-2xx status or a
/// malformed body is logged and yields an empty list.
pub async fn fetch_news_articles(client: &Client, config: &NewsApiConfig, now: DateTime<Utc>) -> Vec<Article> {
    let Some(api_key) = config.api_key() else {
        error!("News API key not configured");
        return Vec::new();
    };

    match try_fetch_news_articles(client, config, &api_key, now).await {
        Ok(articles) => articles,
        Err(e) => {
            error!("NewsAPI error: {:#}", e);
            Vec::new()
        }
    }
}

async fn try_fetch_news_articles(
    client: &Client,
    config: &NewsApiConfig,
    api_key: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Article>> {
    let window_hours = config.window_hours.unwrap_or(24);
    let from = ChronoDuration::try_hours(window_hours)
        .filter(|_| window_hours > 0)
        .and_then(|window| now.checked_sub_signed(window))
        .with_context(|| format!("invalid news_api.window_hours: {}", window_hours))?
        .to_rfc3339_opts(SecondsFormat::Secs, true);
    let api_url = config.api_url.as_deref().unwrap_or(DEFAULT_NEWS_API_URL);

    let url = url::Url::parse_with_params(
        api_url,
        &[
            ("q", config.query.as_deref().unwrap_or(DEFAULT_QUERY)),
            ("from", from.as_str()),
            ("sortBy", "relevancy"),
            ("language", config.language.as_deref().unwrap_or("en")),
            ("apiKey", api_key),
        ],
    )
    .with_context(|| format!("invalid news API url: {}", api_url))?;

    debug!(endpoint = %api_url, %from, "requesting news articles");
    let response = client.get(url).send().await.context("network error during news fetch")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("{} - {}", status, body);
    }

    let body: NewsApiResponse = response.json().await.context("malformed news API response")?;

    Ok(body
        .articles
        .into_iter()
        .filter_map(|a| {
            let url = a.url.filter(|u| !u.trim().is_empty())?;
            Some(Article::new(
                a.title.unwrap_or_default(),
                a.description.unwrap_or_default(),
                url,
            ))
        })
        .collect())
}

/// Fetches a feed from the given URL and parses it (RSS, Atom or JSON Feed).
pub async fn fetch_and_parse_feed(client: &Client, url: &str) -> Result<Feed> {
    let response = client.get(url).send().await.context("network error during feed fetch")?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("feed fetch failed with status: {}", status);
    }

    let bytes = response.bytes().await.context("failed to read response body")?;
    parser::parse(bytes.as_ref()).context("failed to parse feed")
}

/// First `max_items` entries of one source, as articles.
pub async fn fetch_feed_source(client: &Client, source: &FeedSource, max_items: usize) -> Result<Vec<Article>> {
    let feed = fetch_and_parse_feed(client, &source.url).await?;
    Ok(feed
        .entries
        .iter()
        .take(max_items)
        .filter_map(entry_to_article)
        .collect())
}

/// Fetches every source in order. A failing or empty source is logged and
/// skipped; it never aborts the others.
pub async fn fetch_feed_sources(client: &Client, sources: &[FeedSource], max_items: usize) -> Vec<FeedItem> {
    let mut items = Vec::new();

    for source in sources {
        match fetch_feed_source(client, source, max_items).await {
            Ok(articles) if articles.is_empty() => {
                warn!(source = %source.name, url = %source.url, "feed returned no entries, skipping");
            }
            Ok(articles) => {
                info!(source = %source.name, count = articles.len(), "fetched feed entries");
                items.extend(articles.into_iter().map(|article| FeedItem {
                    source: source.name.clone(),
                    article,
                }));
            }
            Err(e) => {
                error!(source = %source.name, url = %source.url, "failed to fetch feed: {:#}", e);
            }
        }
    }

    items
}

fn entry_to_article(entry: &Entry) -> Option<Article> {
    // Use the first link as the URL
    let url = entry.links.first().map(|l| l.href.trim().to_string()).unwrap_or_default();
    let title = entry.title.as_ref().map(|t| t.content.trim().to_string()).unwrap_or_default();

    if url.is_empty() {
        debug!("Skipping entry without URL: {:?}", title);
        return None;
    }

    let raw = entry
        .summary
        .as_ref()
        .map(|s| s.content.clone())
        .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
        .unwrap_or_default();

    Some(Article::new(title, html_to_text(&raw), url))
}

/// Feed descriptions are usually HTML; the digest wants plain text.
fn html_to_text(html: &str) -> String {
    match html2text::from_read(html.as_bytes(), DESCRIPTION_WIDTH) {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            warn!("failed to convert feed description to text: {}", e);
            html.trim().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example</title>
    <link>https://example.com</link>
    <description>Example feed</description>
    <item>
      <title>First</title>
      <link>https://example.com/1</link>
      <description>&lt;p&gt;Hello &lt;b&gt;world&lt;/b&gt;&lt;/p&gt;</description>
    </item>
    <item>
      <title>No link</title>
      <description>dropped</description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn converts_entries_and_strips_html() {
        let feed = parser::parse(RSS.as_bytes()).expect("parse rss");
        let articles: Vec<Article> = feed.entries.iter().filter_map(entry_to_article).collect();

        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "First");
        assert_eq!(articles[0].url, "https://example.com/1");
        assert!(articles[0].description.contains("Hello"));
        assert!(!articles[0].description.contains("<p>"));
    }

    #[test]
    fn plain_text_survives_html_conversion() {
        assert_eq!(html_to_text("  just text  "), "just text");
    }
}
