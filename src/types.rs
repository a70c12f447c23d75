use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A user as stored in the `users` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub telegram_id: Option<String>,
    pub preferences: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A subscribable news topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

impl Topic {
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description,
        }
    }
}

/// A candidate article produced by the fetch stage. Lives only within one
/// pipeline run; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub snippet: String,
    pub source: String,
    pub url: String,
    pub search_term: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// The fetch stage output for a single topic. An empty article list is a
/// normal outcome, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicArticles {
    pub topic: Topic,
    pub articles: Vec<Article>,
}

/// An article annotated with its condensed summary and an optional note on
/// why it matters for the subscribed topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizedArticle {
    pub article: Article,
    pub summary: String,
    pub relevance: Option<String>,
}

/// The summarized representation of one topic's news for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicDigest {
    pub topic: Topic,
    pub summary: String,
    pub articles: Vec<SummarizedArticle>,
}

/// The fully formatted newsletter, ready for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsletterDocument {
    pub title: String,
    pub introduction: String,
    pub subject: String,
    pub digests: Vec<TopicDigest>,
    pub html: String,
    pub text: String,
}

/// Audit row written to the `newsletters` table after a successful delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsletterRecord {
    pub id: Uuid,
    pub user_id: String,
    pub content: String,
    pub topics: Vec<String>,
    pub channel: Channel,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Delivery transport selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Whatsapp,
    Telegram,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Whatsapp => "whatsapp",
            Channel::Telegram => "telegram",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = NewsletterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "email" => Ok(Channel::Email),
            "whatsapp" => Ok(Channel::Whatsapp),
            "telegram" => Ok(Channel::Telegram),
            other => Err(NewsletterError::UnsupportedChannel(other.to_string())),
        }
    }
}

/// Outcome of a single delivery attempt. Transport failures are reported
/// here rather than raised, so the orchestrator decides what to persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub success: bool,
    pub channel: Channel,
    pub detail: String,
    pub recipient: Option<String>,
}

impl DeliveryResult {
    pub fn failure(channel: Channel, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            channel,
            detail: detail.into(),
            recipient: None,
        }
    }
}

/// Pipeline stages, in execution order. Used for logging and for locating
/// where a failed run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStage {
    Resolving,
    Fetching,
    Summarizing,
    Formatting,
    Delivering,
    Done,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::Resolving => "resolving",
            RunStage::Fetching => "fetching",
            RunStage::Summarizing => "summarizing",
            RunStage::Formatting => "formatting",
            RunStage::Delivering => "delivering",
            RunStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Terminal status of a run. Every invocation ends in exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Done,
    Failed,
}

/// Machine-readable description of why a run failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    pub kind: String,
    pub message: String,
    pub stage: RunStage,
}

/// Terminal result of one end-to-end pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub user_id: String,
    pub channel: String,
    pub topics: Vec<String>,
    pub newsletter_title: Option<String>,
    pub record_id: Option<Uuid>,
    pub delivery: Option<DeliveryResult>,
    pub error: Option<RunError>,
    pub mock: bool,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn failed(
        user_id: &str,
        channel: &str,
        mock: bool,
        stage: RunStage,
        error: &NewsletterError,
    ) -> Self {
        Self {
            status: RunStatus::Failed,
            user_id: user_id.to_string(),
            channel: channel.to_string(),
            topics: Vec::new(),
            newsletter_title: None,
            record_id: None,
            delivery: None,
            error: Some(RunError {
                kind: error.kind().to_string(),
                message: error.to_string(),
                stage,
            }),
            mock,
            finished_at: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NewsletterError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("user not found: {id}")]
    UserNotFound { id: String },

    #[error("unsupported channel: {0}")]
    UnsupportedChannel(String),

    #[error("language model error: {0}")]
    Llm(String),

    #[error("news search error: {0}")]
    Search(String),

    #[error("newsletter formatting error: {0}")]
    Format(String),

    #[error("delivery error: {0}")]
    Delivery(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    General(String),
}

impl NewsletterError {
    /// Stable error-kind tag surfaced in `RunResult.error`. Lets callers
    /// distinguish a bad request from an upstream outage without matching
    /// on message text.
    pub fn kind(&self) -> &'static str {
        match self {
            NewsletterError::UserNotFound { .. } => "not_found",
            NewsletterError::UnsupportedChannel(_) => "unsupported_channel",
            NewsletterError::Llm(_) | NewsletterError::Search(_) | NewsletterError::Http(_) => {
                "upstream_unavailable"
            }
            NewsletterError::Delivery(_) => "transport",
            NewsletterError::Database(_) | NewsletterError::Migration(_) => "storage",
            NewsletterError::Format(_) => "format",
            NewsletterError::Config(_) => "configuration",
            _ => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, NewsletterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_parses_known_values() {
        assert_eq!("email".parse::<Channel>().unwrap(), Channel::Email);
        assert_eq!("WhatsApp".parse::<Channel>().unwrap(), Channel::Whatsapp);
        assert_eq!(" telegram ".parse::<Channel>().unwrap(), Channel::Telegram);
    }

    #[test]
    fn channel_rejects_unknown_values() {
        let err = "carrier-pigeon".parse::<Channel>().unwrap_err();
        assert_eq!(err.kind(), "unsupported_channel");
    }

    #[test]
    fn error_kinds_are_distinguishable() {
        let not_found = NewsletterError::UserNotFound {
            id: "abc".to_string(),
        };
        let transport = NewsletterError::Delivery("SMTP refused".to_string());
        assert_eq!(not_found.kind(), "not_found");
        assert_eq!(transport.kind(), "transport");
        assert_ne!(not_found.kind(), transport.kind());
    }
}
