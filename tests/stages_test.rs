use async_trait::async_trait;
use chrono::Utc;
use newsletter_pipeline::{
    Article, Channel, ChannelSender, DeliveryAgent, EmailConfig, EmailSender, Formatter,
    MockLlmAdapter, MockNewsSearch, NewsFetcher, NewsSearch, NewsletterError, Result, Summarizer,
    TelegramSender, Topic, UserProfile, WhatsAppSender,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

fn test_user() -> UserProfile {
    let now = Utc::now();
    UserProfile {
        id: "user-1".to_string(),
        name: "Ana".to_string(),
        email: Some("ana@example.com".to_string()),
        phone: Some("+1234567890".to_string()),
        telegram_id: None,
        preferences: HashMap::new(),
        created_at: now,
        updated_at: now,
    }
}

/// Search capability that fails for climate queries and answers everything
/// else with one canned article.
struct FlakySearch;

#[async_trait]
impl NewsSearch for FlakySearch {
    async fn search(&self, query: &str, _language: &str) -> Result<Vec<Article>> {
        if query.contains("climate") {
            return Err(NewsletterError::Search(format!(
                "simulated outage for '{}'",
                query
            )));
        }

        Ok(vec![Article {
            title: format!("Breaking: {}", query),
            snippet: format!("Latest developments in {}.", query),
            source: "Test Wire".to_string(),
            url: format!(
                "https://news.example.com/{}",
                query.to_lowercase().replace(' ', "-")
            ),
            search_term: Some(query.to_string()),
            published_at: None,
        }])
    }
}

#[tokio::test]
async fn failing_topic_degrades_without_affecting_siblings() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    let topics = vec![
        Topic::new("1", "Artificial Intelligence", None),
        Topic::new("2", "Climate Change", None),
    ];

    let llm = Arc::new(MockLlmAdapter);
    let fetcher = NewsFetcher::new(Arc::new(FlakySearch), llm.clone(), 3);
    let fetched = fetcher.fetch(&topics, "en").await;

    info!(
        "fetched article counts: {:?}",
        fetched.iter().map(|t| t.articles.len()).collect::<Vec<_>>()
    );

    // Both topics are represented; only the failing one is empty.
    assert_eq!(fetched.len(), 2);
    assert!(!fetched[0].articles.is_empty());
    assert!(fetched[1].articles.is_empty());

    let digests = Summarizer::new(llm.clone(), true).summarize(fetched).await;
    assert_eq!(digests.len(), 2);
    assert!(!digests[0].articles.is_empty());
    assert!(digests[1].articles.is_empty());
    assert!(digests[1].summary.contains("No recent news"));

    let document = Formatter::new(llm)
        .format(&test_user(), digests)
        .await
        .unwrap();

    // The degraded topic still renders its own section.
    assert_eq!(document.html.matches("<div class=\"topic\">").count(), 2);
    assert!(document.html.contains("Climate Change"));
    assert!(document.text.contains("CLIMATE CHANGE"));
}

#[tokio::test]
async fn format_renders_one_section_per_topic_in_order() {
    let topics = vec![
        Topic::new("1", "Quantum Computing", None),
        Topic::new("2", "Space Exploration", None),
        Topic::new("3", "Robotics", None),
    ];

    let llm = Arc::new(MockLlmAdapter);
    let fetcher = NewsFetcher::new(Arc::new(MockNewsSearch), llm.clone(), 3);
    let fetched = fetcher.fetch(&topics, "en").await;
    let digests = Summarizer::new(llm.clone(), true).summarize(fetched).await;
    let document = Formatter::new(llm).format(&test_user(), digests).await.unwrap();

    assert_eq!(document.digests.len(), 3);
    assert_eq!(document.html.matches("<div class=\"topic\">").count(), 3);

    // Section order follows the resolver's topic order.
    let quantum = document.html.find("Quantum Computing").unwrap();
    let space = document.html.find("Space Exploration").unwrap();
    let robotics = document.html.find("Robotics").unwrap();
    assert!(quantum < space && space < robotics);

    assert!(document.html.contains("Read more"));
    assert!(document.text.contains("Relevance:"));
}

#[tokio::test]
async fn format_handles_zero_topics() {
    let llm = Arc::new(MockLlmAdapter);
    let document = Formatter::new(llm)
        .format(&test_user(), Vec::new())
        .await
        .unwrap();

    assert_eq!(document.digests.len(), 0);
    assert!(!document.html.contains("<div class=\"topic\">"));
    assert!(document.introduction.contains("no subscribed topics"));
    assert!(document.html.contains("Hello Ana"));
}

#[tokio::test]
async fn email_sender_simulates_when_unconfigured() {
    let sender = EmailSender::new(&EmailConfig::default()).unwrap();

    let llm = Arc::new(MockLlmAdapter);
    let document = Formatter::new(llm)
        .format(&test_user(), Vec::new())
        .await
        .unwrap();

    let result = sender.send(&test_user(), &document).await;
    assert!(result.success);
    assert!(result.detail.contains("simulated"));
    assert_eq!(result.recipient.as_deref(), Some("ana@example.com"));

    let mut no_email = test_user();
    no_email.email = None;
    let result = sender.send(&no_email, &document).await;
    assert!(!result.success);
    assert_eq!(result.channel, Channel::Email);
}

#[tokio::test]
async fn stub_channels_require_their_identifiers() {
    let llm = Arc::new(MockLlmAdapter);
    let document = Formatter::new(llm)
        .format(&test_user(), Vec::new())
        .await
        .unwrap();

    let user = test_user();

    let whatsapp = WhatsAppSender.send(&user, &document).await;
    assert!(whatsapp.success);

    // The test user has no Telegram id.
    let telegram = TelegramSender.send(&user, &document).await;
    assert!(!telegram.success);
    assert!(telegram.detail.contains("Telegram"));
}

#[tokio::test]
async fn delivery_agent_dispatches_to_registered_sender() {
    let llm = Arc::new(MockLlmAdapter);
    let document = Formatter::new(llm)
        .format(&test_user(), Vec::new())
        .await
        .unwrap();

    let mut agent = DeliveryAgent::mock();
    agent.register(Box::new(WhatsAppSender));

    // Registered channels still work after replacement.
    let result = agent.deliver(&test_user(), &document, Channel::Whatsapp).await;
    assert!(result.success);
    assert!(result.detail.contains("stub"));
}
