use crate::config::PipelineConfig;
use crate::fetcher::{MockNewsSearch, NewsApiClient, NewsFetcher, NewsSearch};
use crate::formatter::Formatter;
use crate::llm_adapter::{LlmAdapter, MockLlmAdapter, OpenAiAdapter};
use crate::sender::DeliveryAgent;
use crate::store::Store;
use crate::summarizer::Summarizer;
use crate::types::{
    Channel, NewsletterError, NewsletterRecord, Result, RunResult, RunStage, RunStatus, Topic,
    UserProfile,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Sequences the four pipeline stages for one user and records the outcome.
///
/// Stages run strictly in order; no stage starts before the previous one
/// has produced its full output. Mock runs exercise the same control flow
/// with canned capabilities and never touch storage or external services.
pub struct Orchestrator {
    config: PipelineConfig,
    store: Option<Arc<Store>>,
    llm: Arc<dyn LlmAdapter>,
    search: Arc<dyn NewsSearch>,
    delivery: DeliveryAgent,
}

impl Orchestrator {
    /// Build an orchestrator with live capabilities from the configuration.
    pub fn new(config: PipelineConfig, store: Option<Arc<Store>>) -> Result<Self> {
        let llm = Arc::new(OpenAiAdapter::new(&config)?);
        let search = Arc::new(NewsApiClient::new(&config)?);
        let delivery = DeliveryAgent::new(&config.email)?;

        Ok(Self {
            config,
            store,
            llm,
            search,
            delivery,
        })
    }

    /// Build an orchestrator with caller-provided capabilities.
    pub fn with_capabilities(
        config: PipelineConfig,
        store: Option<Arc<Store>>,
        llm: Arc<dyn LlmAdapter>,
        search: Arc<dyn NewsSearch>,
        delivery: DeliveryAgent,
    ) -> Self {
        Self {
            config,
            store,
            llm,
            search,
            delivery,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Check that a user exists, for callers that validate before accepting
    /// a run request.
    pub async fn verify_user(&self, user_id: &str) -> Result<()> {
        match &self.store {
            Some(store) => store.get_user(user_id).await.map(|_| ()),
            None => Err(NewsletterError::Config(
                "no storage configured; cannot verify users".to_string(),
            )),
        }
    }

    /// Run the full pipeline for one user. Always terminates in a DONE or
    /// FAILED result; per-topic degradations are absorbed inside stages.
    pub async fn run(
        &self,
        user_id: &str,
        channel: &str,
        language: &str,
        mock: bool,
    ) -> RunResult {
        // Channel validation happens before any stage so an unknown channel
        // never reaches a transport.
        let channel = match channel.parse::<Channel>() {
            Ok(channel) => channel,
            Err(e) => {
                warn!("rejected run for {}: {}", user_id, e);
                return RunResult::failed(user_id, channel, mock, RunStage::Resolving, &e);
            }
        };

        info!(
            "starting {} newsletter run for user {} via {}",
            if mock { "mock" } else { "live" },
            user_id,
            channel
        );

        // RESOLVING
        let (user, topics) = if mock {
            (mock_user(user_id), mock_topics())
        } else {
            match self.resolve(user_id).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    error!("resolving user {} failed: {}", user_id, e);
                    return RunResult::failed(
                        user_id,
                        channel.as_str(),
                        mock,
                        RunStage::Resolving,
                        &e,
                    );
                }
            }
        };

        if topics.is_empty() {
            // Recoverable by policy: the run proceeds and renders an empty
            // digest instead of failing.
            warn!("user {} has no subscribed topics", user_id);
        }
        let topic_names: Vec<String> = topics.iter().map(|t| t.name.clone()).collect();

        let llm: Arc<dyn LlmAdapter> = if mock {
            Arc::new(MockLlmAdapter)
        } else {
            self.llm.clone()
        };
        let search: Arc<dyn NewsSearch> = if mock {
            Arc::new(MockNewsSearch)
        } else {
            self.search.clone()
        };

        // FETCHING
        info!("step 1: fetching news for {} topics", topics.len());
        let fetcher = NewsFetcher::new(search, llm.clone(), self.config.max_articles_per_topic);
        let fetched = fetcher.fetch(&topics, language).await;

        // SUMMARIZING
        info!("step 2: summarizing news");
        let summarizer = Summarizer::new(llm.clone(), self.config.include_relevance);
        let digests = summarizer.summarize(fetched).await;

        // FORMATTING
        info!("step 3: formatting newsletter");
        let formatter = Formatter::new(llm);
        let newsletter = match formatter.format(&user, digests).await {
            Ok(newsletter) => newsletter,
            Err(e) => {
                error!("formatting failed for user {}: {}", user_id, e);
                return RunResult::failed(user_id, channel.as_str(), mock, RunStage::Formatting, &e);
            }
        };

        // DELIVERING
        info!("step 4: delivering via {}", channel);
        let delivery = if mock {
            DeliveryAgent::mock().deliver(&user, &newsletter, channel).await
        } else {
            self.delivery.deliver(&user, &newsletter, channel).await
        };

        if !delivery.success {
            warn!(
                "delivery to user {} via {} failed: {}",
                user_id, channel, delivery.detail
            );
        }

        // A record is persisted only for live runs whose delivery succeeded,
        // so sent_at on a stored row always reflects a real send.
        let record_id = if !mock && delivery.success {
            self.persist_record(&user, &newsletter.title, &topic_names, channel)
                .await
        } else {
            None
        };

        info!("newsletter run for user {} finished", user_id);

        RunResult {
            status: RunStatus::Done,
            user_id: user_id.to_string(),
            channel: channel.to_string(),
            topics: topic_names,
            newsletter_title: Some(newsletter.title),
            record_id,
            delivery: Some(delivery),
            error: None,
            mock,
            finished_at: Utc::now(),
        }
    }

    async fn resolve(&self, user_id: &str) -> Result<(UserProfile, Vec<Topic>)> {
        let store = self.store.as_ref().ok_or_else(|| {
            NewsletterError::Config("no storage configured for live runs".to_string())
        })?;

        let user = store.get_user(user_id).await?;
        let topics = store.get_user_topics(user_id).await?;
        Ok((user, topics))
    }

    async fn persist_record(
        &self,
        user: &UserProfile,
        title: &str,
        topic_names: &[String],
        channel: Channel,
    ) -> Option<Uuid> {
        let store = self.store.as_ref()?;

        let record = NewsletterRecord {
            id: Uuid::new_v4(),
            user_id: user.id.clone(),
            content: title.to_string(),
            topics: topic_names.to_vec(),
            channel,
            sent_at: Some(Utc::now()),
            created_at: Utc::now(),
        };

        match store.save_newsletter(&record).await {
            Ok(id) => Some(id),
            Err(e) => {
                // The newsletter already went out; losing the audit row is
                // reported but does not fail the run.
                error!("failed to persist newsletter record: {}", e);
                None
            }
        }
    }
}

/// Canned profile used by mock runs, matching the demo data the seed
/// command creates.
fn mock_user(user_id: &str) -> UserProfile {
    let now = Utc::now();
    UserProfile {
        id: user_id.to_string(),
        name: "Test User".to_string(),
        email: Some("test@example.com".to_string()),
        phone: Some("+1234567890".to_string()),
        telegram_id: Some("12345678".to_string()),
        preferences: HashMap::new(),
        created_at: now,
        updated_at: now,
    }
}

fn mock_topics() -> Vec<Topic> {
    vec![
        Topic::new(
            "1",
            "Artificial Intelligence",
            Some("Advances in AI and machine learning".to_string()),
        ),
        Topic::new(
            "2",
            "Climate Change",
            Some("News about the environment and climate change".to_string()),
        ),
    ]
}
