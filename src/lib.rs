pub mod api;
pub mod config;
pub mod fetcher;
pub mod formatter;
pub mod llm_adapter;
pub mod orchestrator;
pub mod sender;
pub mod store;
pub mod summarizer;
pub mod types;

pub use config::{EmailConfig, PipelineConfig};
pub use fetcher::{MockNewsSearch, NewsApiClient, NewsFetcher, NewsSearch};
pub use formatter::Formatter;
pub use llm_adapter::{ArticleSummary, LlmAdapter, MockLlmAdapter, OpenAiAdapter};
pub use orchestrator::Orchestrator;
pub use sender::{ChannelSender, DeliveryAgent, EmailSender, MockSender, TelegramSender, WhatsAppSender};
pub use store::Store;
pub use summarizer::Summarizer;
pub use types::*;
