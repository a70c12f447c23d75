use crate::config::PipelineConfig;
use crate::llm_adapter::LlmAdapter;
use crate::types::{Article, NewsletterError, Result, Topic, TopicArticles};
use async_trait::async_trait;
use backoff::backoff::Backoff;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Trait for the external news-search capability. An empty result set is a
/// normal outcome, not an error.
#[async_trait]
pub trait NewsSearch: Send + Sync {
    async fn search(&self, query: &str, language: &str) -> Result<Vec<Article>>;
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    articles: Vec<SearchArticle>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchArticle {
    title: Option<String>,
    description: Option<String>,
    url: String,
    published_at: Option<DateTime<Utc>>,
    source: Option<SearchSource>,
}

#[derive(Deserialize)]
struct SearchSource {
    name: Option<String>,
}

/// Client for a NewsAPI-style `/v2/everything` search endpoint.
pub struct NewsApiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    page_size: u32,
    max_retries: u32,
}

impl NewsApiClient {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("newsletter-pipeline/0.1")
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            api_key: config.news_api_key.clone(),
            base_url: "https://newsapi.org/v2".to_string(),
            page_size: config.news_page_size,
            max_retries: 2,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn search_once(&self, query: &str, language: &str) -> Result<Vec<Article>> {
        let page_size = self.page_size.to_string();
        let response = self
            .client
            .get(format!("{}/everything", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("q", query),
                ("language", language),
                ("sortBy", "relevancy"),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NewsletterError::Search(format!(
                "search for '{}' failed with HTTP {}",
                query, status
            )));
        }

        let body: SearchResponse = response.json().await?;
        let articles = body
            .articles
            .into_iter()
            .map(|raw| Article {
                title: raw.title.unwrap_or_else(|| "Untitled".to_string()),
                snippet: raw.description.unwrap_or_default(),
                source: raw
                    .source
                    .and_then(|s| s.name)
                    .unwrap_or_else(|| "Unknown".to_string()),
                url: raw.url,
                search_term: Some(query.to_string()),
                published_at: raw.published_at,
            })
            .collect();

        Ok(articles)
    }
}

#[async_trait]
impl NewsSearch for NewsApiClient {
    async fn search(&self, query: &str, language: &str) -> Result<Vec<Article>> {
        let mut backoff = backoff::ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(8),
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            match self.search_once(query, language).await {
                Ok(articles) => {
                    debug!("search '{}' returned {} articles", query, articles.len());
                    return Ok(articles);
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        if let Some(delay) = backoff.next_backoff() {
                            warn!(
                                "search attempt {} for '{}' failed, retrying in {:?}",
                                attempt + 1,
                                query,
                                delay
                            );
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| NewsletterError::Search(format!("search for '{}' failed", query))))
    }
}

/// Deterministic canned search used by mock runs and tests.
#[derive(Debug, Default, Clone)]
pub struct MockNewsSearch;

#[async_trait]
impl NewsSearch for MockNewsSearch {
    async fn search(&self, query: &str, _language: &str) -> Result<Vec<Article>> {
        let slug = query.to_lowercase().replace(' ', "-");
        let published = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).single();

        Ok(vec![
            Article {
                title: format!("{}: the week in review", query),
                snippet: format!("A roundup of the most important {} stories.", query),
                source: "Example Wire".to_string(),
                url: format!("https://news.example.com/{}/weekly", slug),
                search_term: Some(query.to_string()),
                published_at: published,
            },
            Article {
                title: format!("What's next for {}", query),
                snippet: format!("Analysts weigh in on where {} is heading.", query),
                source: "Example Journal".to_string(),
                url: format!("https://news.example.com/{}/outlook", slug),
                search_term: Some(query.to_string()),
                published_at: published,
            },
        ])
    }
}

/// The fetch stage: turns subscribed topics into candidate articles.
///
/// Query terms come from the language model, falling back to the raw topic
/// name when generation fails. A failing search degrades that topic to an
/// empty article list; sibling topics are unaffected.
pub struct NewsFetcher {
    search: Arc<dyn NewsSearch>,
    llm: Arc<dyn LlmAdapter>,
    max_articles_per_topic: usize,
}

impl NewsFetcher {
    pub fn new(
        search: Arc<dyn NewsSearch>,
        llm: Arc<dyn LlmAdapter>,
        max_articles_per_topic: usize,
    ) -> Self {
        Self {
            search,
            llm,
            max_articles_per_topic,
        }
    }

    /// Fetch candidate articles for every topic, preserving topic order.
    /// Topics are processed concurrently; each result is collected
    /// independently.
    pub async fn fetch(&self, topics: &[Topic], language: &str) -> Vec<TopicArticles> {
        let results = futures::future::join_all(
            topics.iter().map(|topic| self.fetch_topic(topic, language)),
        )
        .await;

        let total: usize = results.iter().map(|t| t.articles.len()).sum();
        info!(
            "fetched {} articles across {} topics",
            total,
            results.len()
        );

        results
    }

    async fn fetch_topic(&self, topic: &Topic, language: &str) -> TopicArticles {
        let terms = match self.llm.search_terms(topic).await {
            Ok(terms) if !terms.is_empty() => terms,
            Ok(_) => vec![topic.name.clone()],
            Err(e) => {
                warn!(
                    "search-term generation failed for topic '{}', using topic name: {}",
                    topic.name, e
                );
                vec![topic.name.clone()]
            }
        };

        let mut articles: Vec<Article> = Vec::new();
        let mut seen_urls: HashSet<String> = HashSet::new();

        for term in &terms {
            match self.search.search(term, language).await {
                Ok(found) => {
                    for article in found {
                        if Url::parse(&article.url).is_err() {
                            debug!("dropping article with invalid URL: {}", article.url);
                            continue;
                        }
                        if seen_urls.insert(article.url.clone()) {
                            articles.push(article);
                        }
                    }
                }
                Err(e) => {
                    warn!("news search failed for term '{}': {}", term, e);
                }
            }

            if articles.len() >= self.max_articles_per_topic {
                articles.truncate(self.max_articles_per_topic);
                break;
            }
        }

        debug!(
            "topic '{}' resolved to {} articles from {} terms",
            topic.name,
            articles.len(),
            terms.len()
        );

        TopicArticles {
            topic: topic.clone(),
            articles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_adapter::MockLlmAdapter;

    /// Search impl that returns the same article URL for every query.
    struct RepeatingSearch;

    #[async_trait]
    impl NewsSearch for RepeatingSearch {
        async fn search(&self, query: &str, _language: &str) -> Result<Vec<Article>> {
            Ok(vec![Article {
                title: "Same story".to_string(),
                snippet: "Identical coverage.".to_string(),
                source: "Wire".to_string(),
                url: "https://news.example.com/same-story".to_string(),
                search_term: Some(query.to_string()),
                published_at: None,
            }])
        }
    }

    #[tokio::test]
    async fn deduplicates_articles_by_url() {
        let fetcher = NewsFetcher::new(Arc::new(RepeatingSearch), Arc::new(MockLlmAdapter), 5);
        let topics = vec![Topic::new("1", "Quantum Computing", None)];

        let fetched = fetcher.fetch(&topics, "en").await;
        assert_eq!(fetched.len(), 1);
        // Two search terms, both returning the same URL.
        assert_eq!(fetched[0].articles.len(), 1);
    }

    #[tokio::test]
    async fn caps_articles_per_topic() {
        let fetcher = NewsFetcher::new(Arc::new(MockNewsSearch), Arc::new(MockLlmAdapter), 3);
        let topics = vec![Topic::new("1", "Artificial Intelligence", None)];

        let fetched = fetcher.fetch(&topics, "en").await;
        // Two terms * two canned articles = four candidates, capped at three.
        assert_eq!(fetched[0].articles.len(), 3);
    }
}
