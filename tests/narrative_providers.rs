/// Narrative provider tests against mocked OpenAI and Anthropic endpoints.
/// Exercises the provider failover chain without calling real services.
use std::sync::Arc;
use std::time::Duration;

use sme_health_api::metrics::Metrics;
use sme_health_api::narrative::{
    AnthropicProvider, NarrativeProvider, OpenAiProvider, ProviderChain, ProviderError, RiskLevel,
    FALLBACK_SOURCE,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn insight_json(summary: &str) -> serde_json::Value {
    serde_json::json!({
        "summary": summary,
        "recommendations": ["Cut costs", "Grow sales", "Build reserves"],
        "risk_level": "Medium",
        "compliance_score": 82,
        "compliance_checks": [
            {"title": "GST Filing", "status": "Filed", "date": "2024-03-15", "icon": "✅"},
            {"title": "Income Tax", "status": "Pending", "date": "2024-06-30", "icon": "⚠️"},
            {"title": "Labor Compliance", "status": "Verified", "date": "2024-01-10", "icon": "✅"}
        ]
    })
}

fn openai_reply(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-test",
        "choices": [
            {"index": 0, "message": {"role": "assistant", "content": content}}
        ]
    })
}

fn anthropic_reply(text: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "msg_test",
        "type": "message",
        "content": [{"type": "text", "text": text}]
    })
}

fn sample_metrics() -> Metrics {
    Metrics::from_totals(100000.0, 60000.0, 1.5)
}

fn chain(openai: OpenAiProvider, anthropic: AnthropicProvider) -> ProviderChain {
    let providers: Vec<Arc<dyn NarrativeProvider>> = vec![Arc::new(openai), Arc::new(anthropic)];
    ProviderChain::new(providers, Duration::from_secs(5))
}

#[tokio::test]
async fn test_openai_success() {
    let mock_server = MockServer::start().await;
    let content = insight_json("Healthy retail business").to_string();

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_reply(&content)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(Some("sk-test".to_string()), "gpt-4o", mock_server.uri());
    let insight = provider.attempt("prompt").await.unwrap();

    assert_eq!(insight.summary, "Healthy retail business");
    assert_eq!(insight.risk_level, RiskLevel::Medium);
    assert_eq!(insight.compliance_score, 82);
}

#[tokio::test]
async fn test_credentials_are_sent_trimmed() {
    let openai_server = MockServer::start().await;
    let anthropic_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(openai_reply(&insight_json("Trimmed").to_string())),
        )
        .expect(1)
        .mount(&openai_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-ant-test"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(anthropic_reply(&insight_json("Trimmed").to_string())),
        )
        .expect(1)
        .mount(&anthropic_server)
        .await;

    let openai = OpenAiProvider::new(Some("  sk-test\n".to_string()), "gpt-4o", openai_server.uri());
    let anthropic = AnthropicProvider::new(
        Some("\tsk-ant-test ".to_string()),
        "claude",
        anthropic_server.uri(),
    );

    assert!(openai.is_available());
    assert_eq!(openai.attempt("prompt").await.unwrap().summary, "Trimmed");
    assert_eq!(anthropic.attempt("prompt").await.unwrap().summary, "Trimmed");
}

#[tokio::test]
async fn test_openai_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(Some("sk-test".to_string()), "gpt-4o", mock_server.uri());
    let err = provider.attempt("prompt").await.unwrap_err();

    match err {
        ProviderError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "upstream exploded");
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_openai_rejects_wrong_shape() {
    let mock_server = MockServer::start().await;
    let mut short = insight_json("Too few recommendations");
    short["recommendations"] = serde_json::json!(["Only one"]);

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_reply(&short.to_string())))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(Some("sk-test".to_string()), "gpt-4o", mock_server.uri());
    let err = provider.attempt("prompt").await.unwrap_err();

    assert!(matches!(err, ProviderError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_anthropic_extracts_json_from_prose() {
    let mock_server = MockServer::start().await;
    let text = format!(
        "Here is the analysis you asked for:\n{}\nLet me know if you need more.",
        insight_json("Stable manufacturing business")
    );

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-ant-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_reply(&text)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = AnthropicProvider::new(
        Some("sk-ant-test".to_string()),
        "claude-3-opus-20240229",
        mock_server.uri(),
    );
    let insight = provider.attempt("prompt").await.unwrap();

    assert_eq!(insight.summary, "Stable manufacturing business");
    assert_eq!(insight.compliance_checks.len(), 3);
}

#[tokio::test]
async fn test_anthropic_reply_without_json() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(anthropic_reply("I cannot help with that.")),
        )
        .mount(&mock_server)
        .await;

    let provider = AnthropicProvider::new(Some("sk-ant-test".to_string()), "claude", mock_server.uri());
    let err = provider.attempt("prompt").await.unwrap_err();

    assert!(matches!(err, ProviderError::InvalidResponse(_)));
}

#[test]
fn test_placeholder_credentials_are_unavailable() {
    let openai = OpenAiProvider::new(
        Some("your_openai_api_key".to_string()),
        "gpt-4o",
        "http://localhost",
    );
    let anthropic = AnthropicProvider::new(Some("   ".to_string()), "claude", "http://localhost");
    let missing = OpenAiProvider::new(None, "gpt-4o", "http://localhost");

    assert!(!openai.is_available());
    assert!(!anthropic.is_available());
    assert!(!missing.is_available());
    assert!(OpenAiProvider::new(Some("sk-real".to_string()), "gpt-4o", "http://localhost").is_available());
}

#[tokio::test]
async fn test_chain_prefers_openai() {
    let openai_server = MockServer::start().await;
    let anthropic_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(openai_reply(&insight_json("From OpenAI").to_string())),
        )
        .mount(&openai_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_reply(
            &insight_json("From Anthropic").to_string(),
        )))
        .expect(0)
        .mount(&anthropic_server)
        .await;

    let chain = chain(
        OpenAiProvider::new(Some("sk-test".to_string()), "gpt-4o", openai_server.uri()),
        AnthropicProvider::new(Some("sk-ant-test".to_string()), "claude", anthropic_server.uri()),
    );
    let narrative = chain.generate(&sample_metrics(), "Retail").await;

    assert_eq!(narrative.source, OpenAiProvider::NAME);
    assert_eq!(narrative.insight.summary, "From OpenAI");
}

#[tokio::test]
async fn test_chain_falls_through_to_anthropic() {
    let openai_server = MockServer::start().await;
    let anthropic_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&openai_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_reply(
            &insight_json("From Anthropic").to_string(),
        )))
        .expect(1)
        .mount(&anthropic_server)
        .await;

    let chain = chain(
        OpenAiProvider::new(Some("sk-test".to_string()), "gpt-4o", openai_server.uri()),
        AnthropicProvider::new(Some("sk-ant-test".to_string()), "claude", anthropic_server.uri()),
    );
    let narrative = chain.generate(&sample_metrics(), "Retail").await;

    assert_eq!(narrative.source, AnthropicProvider::NAME);
    assert_eq!(narrative.insight.summary, "From Anthropic");
}

#[tokio::test]
async fn test_chain_falls_back_when_every_provider_fails() {
    let openai_server = MockServer::start().await;
    let anthropic_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_reply("not json at all")))
        .mount(&openai_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
        .mount(&anthropic_server)
        .await;

    let chain = chain(
        OpenAiProvider::new(Some("sk-test".to_string()), "gpt-4o", openai_server.uri()),
        AnthropicProvider::new(Some("sk-ant-test".to_string()), "claude", anthropic_server.uri()),
    );
    let narrative = chain.generate(&sample_metrics(), "Retail").await;

    assert_eq!(narrative.source, FALLBACK_SOURCE);
    assert_eq!(narrative.insight.risk_level, RiskLevel::Low);
    assert!(narrative.insight.summary.contains("Retail"));
}

#[tokio::test]
async fn test_chain_skips_unconfigured_providers_without_requests() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let chain = chain(
        OpenAiProvider::new(None, "gpt-4o", server.uri()),
        AnthropicProvider::new(Some("your_claude_api_key".to_string()), "claude", server.uri()),
    );

    assert!(chain.available_providers().is_empty());
    let narrative = chain.generate(&sample_metrics(), "Retail").await;
    assert_eq!(narrative.source, FALLBACK_SOURCE);
}
