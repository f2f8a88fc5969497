use chrono::Utc;
use common::{Config, DigestMode};
use daily_digest::ingestion;
use std::path::PathBuf;

/// Fetches the configured sources and prints what came back. No LLM call, no post.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();
    dotenv::dotenv().ok();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let default_path = PathBuf::from("config.default.toml");

    let config = Config::load_with_defaults(Some(default_path.as_path()), Some(path.as_path())).await?;
    let client = ingestion::build_http_client(config.http_timeout_seconds(), config.user_agent())?;

    match config.digest.mode {
        DigestMode::NewsApi => {
            let news_api = config.news_api.clone().unwrap_or_default();
            println!("\n{}", "=".repeat(60));
            println!("Testing news API: {}", news_api.api_url.as_deref().unwrap_or("default endpoint"));
            println!("{}", "=".repeat(60));

            let articles = ingestion::fetch_news_articles(&client, &news_api, Utc::now()).await;
            println!("  Articles: {}", articles.len());
            for (i, article) in articles.iter().take(5).enumerate() {
                println!("    {}. {}", i + 1, article.title);
                println!("       URL: {}", article.url);
            }
        }
        DigestMode::Feeds => {
            let Some(feeds) = config.feeds.as_ref() else {
                anyhow::bail!("digest.mode = \"feeds\" requires a [feeds] section");
            };

            for source in feeds.parse_sources()? {
                println!("\n{}", "=".repeat(60));
                println!("Testing: {} ({})", source.name, source.url);
                println!("{}", "=".repeat(60));

                match ingestion::fetch_feed_source(&client, &source, feeds.max_items_per_source()).await {
                    Ok(articles) => {
                        println!("✓ Success! Entries: {}", articles.len());
                        for (i, article) in articles.iter().enumerate() {
                            println!("    {}. {}", i + 1, article.title);
                            println!("       URL: {}", article.url);
                            println!("       Description: {} chars", article.description.len());
                        }
                    }
                    Err(e) => {
                        println!("✗ Failed: {:#}", e);
                    }
                }
            }
        }
    }

    Ok(())
}
