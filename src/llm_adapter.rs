use crate::config::PipelineConfig;
use crate::types::{Article, NewsletterError, Result, Topic};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// One article's condensed summary plus the optional note tying it to the
/// subscribed topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleSummary {
    pub summary: String,
    pub relevance: Option<String>,
}

/// Trait for the text-generation capability behind each pipeline stage.
///
/// The methods are task-shaped rather than a single raw completion call so
/// that a canned implementation can answer each task deterministically.
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    /// Human-readable name for this adapter.
    fn adapter_name(&self) -> String;

    /// Short list of search queries for finding recent news about a topic.
    async fn search_terms(&self, topic: &Topic) -> Result<Vec<String>>;

    /// Overall summary of a topic from the fetched article snippets.
    async fn topic_summary(&self, topic_name: &str, articles: &[Article]) -> Result<String>;

    /// Condensed summary of one article, optionally with a relevance note.
    async fn article_summary(
        &self,
        topic_name: &str,
        article: &Article,
        include_relevance: bool,
    ) -> Result<ArticleSummary>;

    /// Personalized newsletter title.
    async fn newsletter_title(&self, user_name: &str, topic_names: &[String]) -> Result<String>;

    /// Personalized newsletter introduction paragraph.
    async fn newsletter_introduction(
        &self,
        user_name: &str,
        topic_names: &[String],
    ) -> Result<String>;
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Adapter backed by an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiAdapter {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiAdapter {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            api_key: config.openai_api_key.clone(),
            model: config.openai_model.clone(),
            base_url: "https://api.openai.com/v1".to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: 0.7,
            max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NewsletterError::Llm(format!(
                "completion request failed with HTTP {}",
                status
            )));
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .first()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| NewsletterError::Llm("completion returned no choices".to_string()))?;

        debug!("completion returned {} characters", content.len());
        Ok(content)
    }
}

#[async_trait]
impl LlmAdapter for OpenAiAdapter {
    fn adapter_name(&self) -> String {
        format!("OpenAI ({})", self.model)
    }

    async fn search_terms(&self, topic: &Topic) -> Result<Vec<String>> {
        let description = topic
            .description
            .as_deref()
            .map(|d| format!("Additional description: {}\n", d))
            .unwrap_or_default();

        let prompt = format!(
            "I need to find recent news about the topic \"{}\".\n{}\
             Provide 3 search terms or phrases that could be used with a news \
             search API to find recent, relevant articles on this subject.\n\
             Respond only with the terms separated by commas, with no numbering \
             or extra text.",
            topic.name, description
        );

        let response = self
            .complete(
                "You are an assistant expert at finding relevant news.",
                &prompt,
                100,
            )
            .await?;

        Ok(split_search_terms(&response))
    }

    async fn topic_summary(&self, topic_name: &str, articles: &[Article]) -> Result<String> {
        let titles: Vec<&str> = articles.iter().take(3).map(|a| a.title.as_str()).collect();
        let snippets: Vec<&str> = articles
            .iter()
            .filter(|a| !a.snippet.is_empty())
            .take(3)
            .map(|a| a.snippet.as_str())
            .collect();

        let prompt = format!(
            "Based on the following news about \"{}\", write an overall summary \
             capturing the main trends or themes in no more than 3 sentences.\n\n\
             Titles:\n{}\n\nDescriptions:\n{}\n\nSummary:",
            topic_name,
            titles.join("\n"),
            snippets.join("\n")
        );

        self.complete(
            "You are an expert at synthesizing news information clearly and objectively.",
            &prompt,
            150,
        )
        .await
    }

    async fn article_summary(
        &self,
        topic_name: &str,
        article: &Article,
        include_relevance: bool,
    ) -> Result<ArticleSummary> {
        let mut context = format!("Title: {}\n", article.title);
        if !article.snippet.is_empty() {
            context.push_str(&format!("Description: {}\n", article.snippet));
        }

        let prompt = if include_relevance {
            format!(
                "Summarize the following article about \"{}\" in no more than 150 words.\n\n\
                 {}\n\
                 Provide:\n\
                 1. A concise summary\n\
                 2. A brief explanation of why this article is relevant for people \
                 interested in {}\n\n\
                 Format:\n\
                 Summary: [concise summary]\n\
                 Relevance: [brief explanation]",
                topic_name, context, topic_name
            )
        } else {
            format!(
                "Summarize the following article about \"{}\" in no more than 150 words.\n\n\
                 {}\nSummary:",
                topic_name, context
            )
        };

        let response = self
            .complete(
                "You are an expert at summarizing news concisely and accurately.",
                &prompt,
                250,
            )
            .await?;

        Ok(parse_article_summary(&response, include_relevance))
    }

    async fn newsletter_title(&self, user_name: &str, topic_names: &[String]) -> Result<String> {
        let prompt = format!(
            "Write an engaging, personal title for a newsletter addressed to {} \
             containing news about: {}.\n\
             The title must be concise (8 words at most) and attention-grabbing. \
             Do not use quotes or excessive exclamation marks.",
            user_name,
            joined_topics(topic_names)
        );

        let title = self
            .complete(
                "You are an expert in marketing and compelling headlines.",
                &prompt,
                30,
            )
            .await?;

        Ok(title.trim_matches(|c| c == '"' || c == '\'').to_string())
    }

    async fn newsletter_introduction(
        &self,
        user_name: &str,
        topic_names: &[String],
    ) -> Result<String> {
        let prompt = format!(
            "Write a personal, friendly introductory paragraph for a newsletter \
             addressed to {} containing a news summary about: {}.\n\
             The introduction must be warm, direct and no longer than 3 sentences. \
             Mention that these are the most relevant stories selected for their interests.",
            user_name,
            joined_topics(topic_names)
        );

        self.complete(
            "You are a friendly, persuasive writer who connects with readers.",
            &prompt,
            150,
        )
        .await
    }
}

/// Deterministic canned adapter used by mock runs and tests. Produces the
/// same output for the same input, with no external calls.
#[derive(Debug, Default, Clone)]
pub struct MockLlmAdapter;

#[async_trait]
impl LlmAdapter for MockLlmAdapter {
    fn adapter_name(&self) -> String {
        "Mock LLM Adapter".to_string()
    }

    async fn search_terms(&self, topic: &Topic) -> Result<Vec<String>> {
        let name = topic.name.to_lowercase();
        Ok(vec![name.clone(), format!("{} news", name)])
    }

    async fn topic_summary(&self, topic_name: &str, articles: &[Article]) -> Result<String> {
        Ok(format!(
            "Recent {} coverage centers on {} developments worth following.",
            topic_name,
            articles.len()
        ))
    }

    async fn article_summary(
        &self,
        topic_name: &str,
        article: &Article,
        include_relevance: bool,
    ) -> Result<ArticleSummary> {
        let summary = if article.snippet.is_empty() {
            article.title.clone()
        } else {
            article.snippet.clone()
        };

        Ok(ArticleSummary {
            summary,
            relevance: include_relevance
                .then(|| format!("Directly related to your interest in {}.", topic_name)),
        })
    }

    async fn newsletter_title(&self, _user_name: &str, topic_names: &[String]) -> Result<String> {
        Ok(format!("Your News Briefing: {}", joined_topics(topic_names)))
    }

    async fn newsletter_introduction(
        &self,
        user_name: &str,
        topic_names: &[String],
    ) -> Result<String> {
        Ok(format!(
            "Hello {}, here are the most relevant stories about {}, selected for you.",
            user_name,
            joined_topics(topic_names)
        ))
    }
}

/// Join up to three topic names for prompt text, noting when more exist.
fn joined_topics(topic_names: &[String]) -> String {
    let mut text = topic_names
        .iter()
        .take(3)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if topic_names.len() > 3 {
        text.push_str(" and more");
    }
    text
}

/// Split a comma- or newline-separated completion into clean query terms.
fn split_search_terms(response: &str) -> Vec<String> {
    response
        .split(|c: char| c == ',' || c == '\n')
        .map(|term| term.trim().trim_matches('"').to_string())
        .filter(|term| !term.is_empty())
        .take(3)
        .collect()
}

/// Extract the `Summary:` and `Relevance:` sections from a completion.
/// Completions that ignore the requested layout degrade to being used
/// whole as the summary.
fn parse_article_summary(response: &str, include_relevance: bool) -> ArticleSummary {
    if !include_relevance {
        return ArticleSummary {
            summary: response.trim().to_string(),
            relevance: None,
        };
    }

    match response.split_once("Relevance:") {
        Some((summary_part, relevance_part)) => {
            let summary = summary_part
                .split_once("Summary:")
                .map(|(_, s)| s)
                .unwrap_or(summary_part)
                .trim()
                .to_string();
            let relevance = relevance_part.trim().to_string();

            ArticleSummary {
                summary,
                relevance: (!relevance.is_empty()).then_some(relevance),
            }
        }
        None => ArticleSummary {
            summary: response.trim().to_string(),
            relevance: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_summary_and_relevance_sections() {
        let response = "Summary: A compact model was released.\nRelevance: It lowers inference costs.";
        let parsed = parse_article_summary(response, true);
        assert_eq!(parsed.summary, "A compact model was released.");
        assert_eq!(
            parsed.relevance.as_deref(),
            Some("It lowers inference costs.")
        );
    }

    #[test]
    fn malformed_layout_degrades_to_whole_summary() {
        let response = "A compact model was released and it matters.";
        let parsed = parse_article_summary(response, true);
        assert_eq!(parsed.summary, response);
        assert!(parsed.relevance.is_none());
    }

    #[test]
    fn splits_terms_on_commas_and_newlines() {
        let terms = split_search_terms("\"AI regulation\", EU AI Act\nmodel safety, extra, more");
        assert_eq!(
            terms,
            vec!["AI regulation", "EU AI Act", "model safety"]
        );
    }

    #[tokio::test]
    async fn mock_adapter_is_deterministic() {
        let adapter = MockLlmAdapter;
        let topics = vec!["AI".to_string(), "Climate".to_string()];

        let first = adapter.newsletter_title("Ana", &topics).await.unwrap();
        let second = adapter.newsletter_title("Ana", &topics).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "Your News Briefing: AI, Climate");
    }
}
