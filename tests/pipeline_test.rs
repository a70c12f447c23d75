use newsletter_pipeline::{
    DeliveryAgent, MockLlmAdapter, MockNewsSearch, Orchestrator, PipelineConfig, RunStatus,
};
use std::sync::Arc;
use tracing::info;

fn mock_orchestrator() -> Orchestrator {
    Orchestrator::with_capabilities(
        PipelineConfig::default(),
        None,
        Arc::new(MockLlmAdapter),
        Arc::new(MockNewsSearch),
        DeliveryAgent::mock(),
    )
}

#[tokio::test]
async fn mock_run_completes_without_external_capabilities() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    let orchestrator = mock_orchestrator();
    let result = orchestrator.run("mock", "email", "en", true).await;

    info!("mock run finished with status {:?}", result.status);

    assert_eq!(result.status, RunStatus::Done);
    assert_eq!(
        result.topics,
        vec!["Artificial Intelligence", "Climate Change"]
    );
    assert!(result.newsletter_title.is_some());
    assert!(result.error.is_none());

    // Mock runs never touch storage.
    assert!(result.record_id.is_none());

    let delivery = result.delivery.expect("mock run should attempt delivery");
    assert!(delivery.success);
    assert_eq!(delivery.detail, "mock delivery");
}

#[tokio::test]
async fn mock_run_is_deterministic() {
    let orchestrator = mock_orchestrator();

    let first = orchestrator.run("mock", "email", "en", true).await;
    let second = orchestrator.run("mock", "email", "en", true).await;

    assert_eq!(first.status, second.status);
    assert_eq!(first.topics, second.topics);
    assert_eq!(first.newsletter_title, second.newsletter_title);
    assert_eq!(first.topics.len(), 2);
}

#[tokio::test]
async fn unknown_channel_is_rejected_before_any_stage() {
    let orchestrator = mock_orchestrator();
    let result = orchestrator.run("mock", "carrier-pigeon", "en", true).await;

    assert_eq!(result.status, RunStatus::Failed);
    // No transport was consulted.
    assert!(result.delivery.is_none());
    assert!(result.newsletter_title.is_none());

    let error = result.error.expect("failed run must carry an error");
    assert_eq!(error.kind, "unsupported_channel");
    assert!(error.message.contains("carrier-pigeon"));
}

#[tokio::test]
async fn mock_run_supports_stub_channels() {
    let orchestrator = mock_orchestrator();

    for channel in ["whatsapp", "telegram"] {
        let result = orchestrator.run("mock", channel, "en", true).await;
        assert_eq!(result.status, RunStatus::Done, "channel {}", channel);

        let delivery = result.delivery.expect("delivery result expected");
        assert!(delivery.success);
        assert_eq!(delivery.channel.as_str(), channel);
    }
}

#[tokio::test]
async fn live_run_without_storage_fails_at_resolution() {
    let orchestrator = mock_orchestrator();
    let result = orchestrator.run("some-user", "email", "en", false).await;

    assert_eq!(result.status, RunStatus::Failed);
    let error = result.error.expect("failed run must carry an error");
    assert_eq!(error.kind, "configuration");
}
