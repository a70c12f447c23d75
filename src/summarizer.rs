use crate::llm_adapter::LlmAdapter;
use crate::types::{SummarizedArticle, TopicArticles, TopicDigest};
use std::sync::Arc;
use tracing::{info, warn};

/// The summarization stage: turns fetched articles into per-topic digests.
///
/// Every subscribed topic is represented in the output. Topics with no
/// articles get a placeholder digest; a model failure for one topic or
/// article degrades to a placeholder without touching siblings.
pub struct Summarizer {
    llm: Arc<dyn LlmAdapter>,
    include_relevance: bool,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LlmAdapter>, include_relevance: bool) -> Self {
        Self {
            llm,
            include_relevance,
        }
    }

    pub async fn summarize(&self, fetched: Vec<TopicArticles>) -> Vec<TopicDigest> {
        let digests = futures::future::join_all(
            fetched.into_iter().map(|topic| self.summarize_topic(topic)),
        )
        .await;

        info!("summarized {} topics", digests.len());
        digests
    }

    async fn summarize_topic(&self, fetched: TopicArticles) -> TopicDigest {
        let TopicArticles { topic, articles } = fetched;

        if articles.is_empty() {
            return TopicDigest {
                summary: format!("No recent news was found for '{}'.", topic.name),
                topic,
                articles: Vec::new(),
            };
        }

        let summary = match self.llm.topic_summary(&topic.name, &articles).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("topic summary failed for '{}': {}", topic.name, e);
                format!("Summary unavailable for '{}'.", topic.name)
            }
        };

        let mut summarized = Vec::with_capacity(articles.len());
        for article in articles {
            let item = match self
                .llm
                .article_summary(&topic.name, &article, self.include_relevance)
                .await
            {
                Ok(parsed) => SummarizedArticle {
                    summary: parsed.summary,
                    relevance: parsed.relevance,
                    article,
                },
                Err(e) => {
                    warn!("article summary failed for '{}': {}", article.title, e);
                    SummarizedArticle {
                        summary: if article.snippet.is_empty() {
                            "Summary unavailable.".to_string()
                        } else {
                            article.snippet.clone()
                        },
                        relevance: self
                            .include_relevance
                            .then(|| "No relevance information available.".to_string()),
                        article,
                    }
                }
            };
            summarized.push(item);
        }

        TopicDigest {
            topic,
            summary,
            articles: summarized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_adapter::MockLlmAdapter;
    use crate::types::{Article, Topic};

    fn article(title: &str) -> Article {
        Article {
            title: title.to_string(),
            snippet: format!("{} in brief.", title),
            source: "Wire".to_string(),
            url: format!("https://news.example.com/{}", title.to_lowercase()),
            search_term: None,
            published_at: None,
        }
    }

    #[tokio::test]
    async fn empty_topic_gets_placeholder_digest() {
        let summarizer = Summarizer::new(Arc::new(MockLlmAdapter), true);
        let fetched = vec![TopicArticles {
            topic: Topic::new("1", "Space", None),
            articles: Vec::new(),
        }];

        let digests = summarizer.summarize(fetched).await;
        assert_eq!(digests.len(), 1);
        assert!(digests[0].articles.is_empty());
        assert!(digests[0].summary.contains("Space"));
    }

    #[tokio::test]
    async fn preserves_article_correspondence() {
        let summarizer = Summarizer::new(Arc::new(MockLlmAdapter), true);
        let fetched = vec![TopicArticles {
            topic: Topic::new("1", "AI", None),
            articles: vec![article("First"), article("Second")],
        }];

        let digests = summarizer.summarize(fetched).await;
        let items = &digests[0].articles;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].article.title, "First");
        assert_eq!(items[1].article.title, "Second");
        assert!(items.iter().all(|i| i.relevance.is_some()));
    }
}
