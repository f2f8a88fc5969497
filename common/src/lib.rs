/*!
common/src/lib.rs

Shared configuration types and helpers for Daily Digest.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader for a default + override pair of TOML files
- Validation of the values the pipeline relies on
- Secret resolution (inline value or environment variable)
*/

use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Placeholder replaced by the run date in `digest.title_template`.
pub const DATE_PLACEHOLDER: &str = "%{date}";

/// Longest look-back accepted for the news-search API (30 days).
pub const MAX_WINDOW_HOURS: i64 = 720;

/// Which source feeds the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestMode {
    /// One news-search API call, curated into stories, one post per story.
    #[default]
    NewsApi,
    /// A list of syndication feeds, summarized into a single digest post.
    Feeds,
}

/// Digest behaviour: what to publish, where, and when.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub mode: DigestMode,
    /// Number of stories the curator selects (2 or 3)
    #[serde(default = "default_story_count")]
    pub story_count: usize,
    /// Forum category the posts land in
    pub category_id: u64,
    pub tag: Option<String>,
    /// Post title for single-digest runs, e.g. "Daily Digest for %{date}"
    pub title_template: Option<String>,
    /// Local wall-clock time in "HH:MM" 24h format
    pub schedule_time: Option<String>,
}

fn default_story_count() -> usize {
    2
}

impl DigestConfig {
    /// Parsed `schedule_time`, defaulting to 11:00.
    pub fn schedule_time(&self) -> Result<NaiveTime> {
        let raw = self.schedule_time.as_deref().unwrap_or("11:00");
        NaiveTime::parse_from_str(raw, "%H:%M")
            .with_context(|| format!("Invalid digest.schedule_time '{}', expected HH:MM", raw))
    }

    /// Tags to attach to each post (empty when no tag is configured).
    pub fn tags(&self) -> Vec<String> {
        self.tag
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Render `title_template` for the given date, if a template is set.
    pub fn render_title(&self, date: &str) -> Option<String> {
        self.title_template
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| t.replace(DATE_PLACEHOLDER, date))
    }
}

/// News-search API (mode `news_api`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewsApiConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    pub query: Option<String>,
    pub language: Option<String>,
    /// Rolling window, in hours, for the `from` parameter
    pub window_hours: Option<i64>,
}

impl NewsApiConfig {
    pub fn api_key(&self) -> Option<String> {
        resolve_secret(self.api_key.as_deref(), self.api_key_env.as_deref())
    }
}

/// Syndication feeds (mode `feeds`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedsConfig {
    /// Entries separated by ';' or newlines, each "Name|https://url"
    pub sources: String,
    pub max_items_per_source: Option<usize>,
}

/// A named feed URL decoded from `feeds.sources`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
}

impl FeedsConfig {
    pub fn max_items_per_source(&self) -> usize {
        self.max_items_per_source.unwrap_or(5)
    }

    /// Decode `sources` into ordered (name, url) pairs.
    pub fn parse_sources(&self) -> Result<Vec<FeedSource>> {
        parse_feed_sources(&self.sources)
    }
}

/// Decode a "Name|url; Name|url" list. Blank entries are ignored, order is kept.
pub fn parse_feed_sources(raw: &str) -> Result<Vec<FeedSource>> {
    raw.split(|c: char| c == ';' || c == '\n')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| -> Result<FeedSource> {
            let (name, url) = entry
                .split_once('|')
                .with_context(|| format!("Feed source '{}' is not in 'Name|url' form", entry))?;
            let (name, url) = (name.trim(), url.trim());
            if name.is_empty() {
                anyhow::bail!("Feed source '{}' has an empty name", entry);
            }
            url::Url::parse(url).with_context(|| format!("Feed source '{}' has an invalid url", name))?;
            Ok(FeedSource {
                name: name.to_string(),
                url: url.to_string(),
            })
        })
        .collect()
}

/// OpenAI-compatible chat-completion endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub timeout_seconds: Option<u64>,
}

impl LlmConfig {
    pub fn api_key(&self) -> Option<String> {
        resolve_secret(self.api_key.as_deref(), self.api_key_env.as_deref())
    }

    pub fn api_url(&self) -> &str {
        self.api_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1/chat/completions")
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("gpt-4o-mini")
    }
}

/// Forum the digest is posted to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForumConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    /// Account posts are created as
    pub api_username: Option<String>,
}

impl ForumConfig {
    pub fn api_key(&self) -> Option<String> {
        resolve_secret(self.api_key.as_deref(), self.api_key_env.as_deref())
    }

    pub fn api_username(&self) -> &str {
        self.api_username.as_deref().unwrap_or("system")
    }
}

/// Outbound HTTP defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_seconds: Option<u64>,
    pub user_agent: Option<String>,
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub digest: DigestConfig,
    pub news_api: Option<NewsApiConfig>,
    pub feeds: Option<FeedsConfig>,
    #[serde(default)]
    pub llm: LlmConfig,
    pub forum: ForumConfig,
    pub http: Option<HttpConfig>,
}

impl Config {
    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for path in [default_path, override_path].into_iter().flatten() {
            if path.exists() {
                let data = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read config: {}", path.display()))?;
                let val: toml::Value = toml::from_str(&data)
                    .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
                merge_toml(&mut config_value, val);
            }
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check the values the pipeline relies on. Secrets are not checked here:
    /// a missing key only disables the stage that needs it.
    pub fn validate(&self) -> Result<()> {
        if !(2..=3).contains(&self.digest.story_count) {
            anyhow::bail!(
                "digest.story_count must be 2 or 3, got {}",
                self.digest.story_count
            );
        }
        self.digest.schedule_time()?;

        url::Url::parse(&self.forum.base_url)
            .with_context(|| format!("Invalid forum.base_url: {}", self.forum.base_url))?;
        url::Url::parse(self.llm.api_url())
            .with_context(|| format!("Invalid llm.api_url: {}", self.llm.api_url()))?;

        if let Some(news_api) = &self.news_api {
            if let Some(api_url) = &news_api.api_url {
                url::Url::parse(api_url).with_context(|| format!("Invalid news_api.api_url: {}", api_url))?;
            }
            if let Some(hours) = news_api.window_hours {
                if !(1..=MAX_WINDOW_HOURS).contains(&hours) {
                    anyhow::bail!(
                        "news_api.window_hours must be between 1 and {}, got {}",
                        MAX_WINDOW_HOURS,
                        hours
                    );
                }
            }
        }

        match (&self.digest.mode, &self.feeds) {
            (DigestMode::Feeds, None) => anyhow::bail!("digest.mode = \"feeds\" requires a [feeds] section"),
            (_, Some(feeds)) => {
                if feeds.max_items_per_source() == 0 {
                    anyhow::bail!("feeds.max_items_per_source must be at least 1");
                }
                feeds.parse_sources()?;
            }
            _ => {}
        }

        Ok(())
    }

    pub fn http_timeout_seconds(&self) -> u64 {
        self.http.as_ref().and_then(|h| h.timeout_seconds).unwrap_or(20)
    }

    pub fn user_agent(&self) -> &str {
        self.http
            .as_ref()
            .and_then(|h| h.user_agent.as_deref())
            .unwrap_or("DailyDigest/0.1.0")
    }
}

/// Inline value wins over the environment; blank values count as missing.
pub fn resolve_secret(inline: Option<&str>, env_var: Option<&str>) -> Option<String> {
    inline
        .map(str::to_string)
        .or_else(|| env_var.and_then(|name| std::env::var(name).ok()))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
        [digest]
        enabled = true
        category_id = 5
        tag = "daily-digest"

        [forum]
        base_url = "https://forum.example.com"
    "#;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg: Config = toml::from_str(MINIMAL).expect("parse config");
        cfg.validate().expect("valid");

        assert_eq!(cfg.digest.mode, DigestMode::NewsApi);
        assert_eq!(cfg.digest.story_count, 2);
        assert_eq!(cfg.digest.schedule_time().unwrap(), NaiveTime::from_hms_opt(11, 0, 0).unwrap());
        assert_eq!(cfg.llm.model(), "gpt-4o-mini");
        assert_eq!(cfg.forum.api_username(), "system");
        assert_eq!(cfg.http_timeout_seconds(), 20);
        assert_eq!(cfg.digest.tags(), vec!["daily-digest".to_string()]);
    }

    #[test]
    fn story_count_outside_range_is_rejected() {
        let toml = MINIMAL.replace("category_id = 5", "category_id = 5\nstory_count = 4");
        let cfg: Config = toml::from_str(&toml).expect("parse config");
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("story_count"));
    }

    #[test]
    fn feeds_mode_requires_feeds_section() {
        let toml = MINIMAL.replace("enabled = true", "enabled = true\nmode = \"feeds\"");
        let cfg: Config = toml::from_str(&toml).expect("parse config");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn bad_schedule_time_is_rejected() {
        let toml = MINIMAL.replace("enabled = true", "enabled = true\nschedule_time = \"25:99\"");
        let cfg: Config = toml::from_str(&toml).expect("parse config");
        assert!(cfg.validate().unwrap_err().to_string().contains("schedule_time"));
    }

    #[test]
    fn parses_feed_sources_in_order() {
        let sources = parse_feed_sources(
            "TechNews|https://technews.example/rss;\n  Other | https://other.example/atom.xml ;;",
        )
        .expect("parse");

        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].name, "TechNews");
        assert_eq!(sources[0].url, "https://technews.example/rss");
        assert_eq!(sources[1].name, "Other");
        assert_eq!(sources[1].url, "https://other.example/atom.xml");
    }

    #[test]
    fn rejects_malformed_feed_sources() {
        assert!(parse_feed_sources("no separator here").is_err());
        assert!(parse_feed_sources("|https://x.example/rss").is_err());
        assert!(parse_feed_sources("Name|not a url").is_err());
        assert!(parse_feed_sources("  ").unwrap().is_empty());
    }

    #[test]
    fn renders_title_template() {
        let cfg: Config = toml::from_str(
            &MINIMAL.replace("tag = \"daily-digest\"", "title_template = \"AI news for %{date}\""),
        )
        .expect("parse config");

        assert_eq!(
            cfg.digest.render_title("2026-10-18").as_deref(),
            Some("AI news for 2026-10-18")
        );
        assert!(cfg.digest.tags().is_empty());
    }

    #[test]
    fn news_window_must_be_positive_and_bounded() {
        let with_window = |hours: i64| {
            let toml = format!("{}\n[news_api]\nwindow_hours = {}\n", MINIMAL, hours);
            toml::from_str::<Config>(&toml).expect("parse config")
        };

        assert!(with_window(48).validate().is_ok());
        assert!(with_window(MAX_WINDOW_HOURS).validate().is_ok());
        assert!(with_window(0).validate().is_err());
        assert!(with_window(-6).validate().is_err());
        assert!(with_window(i64::MAX / 1000).validate().is_err());
    }

    #[test]
    fn inline_secret_wins_and_blank_is_missing() {
        assert_eq!(resolve_secret(Some("abc"), Some("PATH")).as_deref(), Some("abc"));
        assert_eq!(resolve_secret(Some("   "), None), None);
        assert_eq!(resolve_secret(None, Some("DAILY_DIGEST_SURELY_UNSET_VAR")), None);
    }

    #[tokio::test]
    async fn override_file_is_merged_over_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let default_path = dir.path().join("config.default.toml");
        let override_path = dir.path().join("config.toml");

        let mut f = std::fs::File::create(&default_path).expect("create default");
        write!(
            f,
            "{}\n[llm]\nmodel = \"gpt-4o-mini\"\ntemperature = 0.2\n",
            MINIMAL
        )
        .expect("write default");

        std::fs::write(
            &override_path,
            "[digest]\ncategory_id = 9\n\n[llm]\nmodel = \"gpt-4o\"\n",
        )
        .expect("write override");

        let cfg = Config::load_with_defaults(Some(&default_path), Some(&override_path))
            .await
            .expect("load");

        assert_eq!(cfg.digest.category_id, 9);
        assert!(cfg.digest.enabled);
        assert_eq!(cfg.llm.model(), "gpt-4o");
        assert_eq!(cfg.llm.temperature, Some(0.2));
    }

    #[tokio::test]
    async fn missing_files_yield_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.toml");
        let err = Config::load_with_defaults(Some(&missing), None).await.unwrap_err();
        assert!(err.to_string().contains("merged configuration"));
    }
}
