use serde::{Deserialize, Serialize};

/// A news item as fetched from a source, normalized to what the LLM needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub description: String,
    pub url: String,
}

impl Article {
    pub fn new(title: impl Into<String>, description: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            url: url.into(),
        }
    }
}

/// An article fetched from a named feed source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub source: String,
    pub article: Article,
}

/// A cluster of related articles chosen by the curator.
///
/// `articles` is never empty and only holds articles from the fetched set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    pub title: String,
    pub articles: Vec<Article>,
}

/// Generated post material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub title: String,
    /// Markdown body
    pub content: String,
    /// Markdown bullet list of source urls; empty when the sources are part of `content`
    pub sources: String,
}

impl Summary {
    /// Markdown body of a per-story post.
    pub fn story_markdown(&self) -> String {
        let mut raw = format!("## Summary\n{}", self.content.trim());
        if !self.sources.trim().is_empty() {
            raw.push_str(&format!("\n\n## Sources\n{}", self.sources.trim()));
        }
        raw
    }

    /// Markdown body of a single-digest post.
    pub fn digest_markdown(&self) -> String {
        let mut raw = self.content.trim().to_string();
        if !self.sources.trim().is_empty() {
            raw.push_str(&format!("\n\n## Sources\n{}", self.sources.trim()));
        }
        raw
    }
}
