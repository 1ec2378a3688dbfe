//! Narrative generation with ordered provider failover.
//!
//! Remote providers are tried in order (OpenAI, then Anthropic). The first
//! one that returns a well-formed [`Insight`] wins. When every provider is
//! unavailable or fails, the deterministic [`fallback`] generator answers, so
//! the chain as a whole never fails.

mod anthropic;
pub mod fallback;
mod openai;

pub use anthropic::AnthropicProvider;
pub use fallback::{fallback_insight, HealthState};
pub use openai::OpenAiProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::circuit_breaker::{create_provider_circuit_breaker, ProviderCircuitBreaker};
use crate::config::NarrativeConfig;
use crate::metrics::Metrics;

/// Source name reported when the deterministic generator produced the insight.
pub const FALLBACK_SOURCE: &str = "fallback";

/// Credentials shipped in sample `.env` files. A key containing one of these
/// is treated as missing.
const PLACEHOLDER_CREDENTIALS: [&str; 4] = [
    "your_openai_api_key",
    "your_claude_api_key",
    "your_anthropic_api_key",
    "your_api_key",
];

/// Returns true when the credential is set and is not a sample placeholder.
pub fn is_usable_credential(key: Option<&str>) -> bool {
    match key.map(str::trim) {
        Some(key) if !key.is_empty() => !PLACEHOLDER_CREDENTIALS
            .iter()
            .any(|placeholder| key.contains(placeholder)),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(alias = "low", alias = "LOW")]
    Low,
    #[serde(alias = "medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "high", alias = "HIGH")]
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceCheck {
    pub title: String,
    pub status: String,
    pub date: String,
    pub icon: String,
}

impl ComplianceCheck {
    pub fn new(title: &str, status: &str, date: &str, icon: &str) -> Self {
        Self {
            title: title.to_string(),
            status: status.to_string(),
            date: date.to_string(),
            icon: icon.to_string(),
        }
    }
}

/// Narrative and compliance scorecard for one analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    pub summary: String,
    /// Exactly three items.
    pub recommendations: Vec<String>,
    pub risk_level: RiskLevel,
    /// 0 to 100.
    pub compliance_score: u8,
    /// Exactly three items.
    pub compliance_checks: Vec<ComplianceCheck>,
}

impl Insight {
    pub const RECOMMENDATION_COUNT: usize = 3;
    pub const CHECK_COUNT: usize = 3;

    /// Checks the shape constraints serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.summary.trim().is_empty() {
            return Err("summary is empty".to_string());
        }
        if self.recommendations.len() != Self::RECOMMENDATION_COUNT {
            return Err(format!(
                "expected {} recommendations, got {}",
                Self::RECOMMENDATION_COUNT,
                self.recommendations.len()
            ));
        }
        if self.compliance_checks.len() != Self::CHECK_COUNT {
            return Err(format!(
                "expected {} compliance checks, got {}",
                Self::CHECK_COUNT,
                self.compliance_checks.len()
            ));
        }
        if self.compliance_score > 100 {
            return Err(format!(
                "compliance score {} is above 100",
                self.compliance_score
            ));
        }
        Ok(())
    }
}

/// Why a provider tier did not produce an insight. Never leaves the chain.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider is not configured")]
    Unavailable,
    #[error("circuit open after repeated failures")]
    CircuitOpen,
    #[error("request failed: {0}")]
    Request(String),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Request(err.to_string())
    }
}

/// A remote narrative backend.
#[async_trait]
pub trait NarrativeProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the provider has what it needs to be called at all.
    fn is_available(&self) -> bool;

    /// Sends the prompt and returns the insight found in the reply.
    async fn attempt(&self, prompt: &str) -> Result<Insight, ProviderError>;
}

/// Builds the prompt shared by every remote provider.
pub fn build_prompt(metrics: &Metrics, industry: &str) -> String {
    let metrics_json = serde_json::to_string(metrics).unwrap_or_default();
    format!(
        r#"Analyze the financial health and regulatory compliance of an SME in the {industry} industry.
Metrics: {metrics_json}

Provide:
1. A professional summary of their health.
2. 3 actionable recommendations for optimization.
3. A risk level (Low, Medium, or High).
4. A compliance score out of 100 based on the sector.
5. 3 typical regulatory checks (GST, Tax, Labor) with status, date and a simple icon (✅, ⚠️, ❌).

Return ONLY a JSON object:
{{
    "summary": "...",
    "recommendations": ["...", "...", "..."],
    "risk_level": "...",
    "compliance_score": 85,
    "compliance_checks": [
        {{"title": "...", "status": "...", "date": "...", "icon": "..."}},
        {{"title": "...", "status": "...", "date": "...", "icon": "..."}},
        {{"title": "...", "status": "...", "date": "...", "icon": "..."}}
    ]
}}"#
    )
}

/// Slice from the first `{` to the last `}`, if there is one.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parses and validates an insight from a provider's JSON text.
pub fn parse_insight(json: &str) -> Result<Insight, ProviderError> {
    let insight: Insight = serde_json::from_str(json.trim())
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
    insight.validate().map_err(ProviderError::InvalidResponse)?;
    Ok(insight)
}

/// An insight together with the tier that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Narrative {
    pub insight: Insight,
    pub source: &'static str,
}

struct Tier {
    provider: Arc<dyn NarrativeProvider>,
    breaker: ProviderCircuitBreaker,
}

/// Ordered providers terminated by the deterministic fallback.
pub struct ProviderChain {
    tiers: Vec<Tier>,
    timeout: Duration,
}

impl ProviderChain {
    /// Providers are tried in the given order, each bounded by `timeout`.
    pub fn new(providers: Vec<Arc<dyn NarrativeProvider>>, timeout: Duration) -> Self {
        let tiers = providers
            .into_iter()
            .map(|provider| Tier {
                provider,
                breaker: create_provider_circuit_breaker(),
            })
            .collect();
        Self { tiers, timeout }
    }

    /// OpenAI as primary, Anthropic as secondary.
    pub fn from_config(config: &NarrativeConfig) -> Self {
        let providers: Vec<Arc<dyn NarrativeProvider>> = vec![
            Arc::new(OpenAiProvider::from_config(config)),
            Arc::new(AnthropicProvider::from_config(config)),
        ];
        Self::new(providers, config.provider_timeout())
    }

    /// A chain that always answers from the deterministic generator.
    pub fn fallback_only() -> Self {
        Self::new(Vec::new(), Duration::from_secs(crate::config::DEFAULT_PROVIDER_TIMEOUT_SECS))
    }

    /// Names of the providers that currently have usable credentials.
    pub fn available_providers(&self) -> Vec<&'static str> {
        self.tiers
            .iter()
            .filter(|tier| tier.provider.is_available())
            .map(|tier| tier.provider.name())
            .collect()
    }

    async fn attempt_tier(&self, tier: &Tier, prompt: &str) -> Result<Insight, ProviderError> {
        if !tier.provider.is_available() {
            return Err(ProviderError::Unavailable);
        }
        if !tier.breaker.is_call_permitted() {
            return Err(ProviderError::CircuitOpen);
        }

        let result = match tokio::time::timeout(self.timeout, tier.provider.attempt(prompt)).await
        {
            Ok(result) => result.and_then(|insight| {
                insight.validate().map_err(ProviderError::InvalidResponse)?;
                Ok(insight)
            }),
            Err(_) => Err(ProviderError::Timeout(self.timeout)),
        };

        match result {
            Ok(_) => tier.breaker.on_success(),
            Err(_) => tier.breaker.on_error(),
        }
        result
    }

    /// Produces an insight, reporting which tier answered.
    pub async fn generate(&self, metrics: &Metrics, industry: &str) -> Narrative {
        let prompt = build_prompt(metrics, industry);

        for tier in &self.tiers {
            let provider = tier.provider.name();
            match self.attempt_tier(tier, &prompt).await {
                Ok(insight) => {
                    tracing::info!(provider, "Narrative generated by provider");
                    return Narrative {
                        insight,
                        source: provider,
                    };
                }
                Err(ProviderError::Unavailable) => {
                    tracing::debug!(provider, "Provider not configured, skipping");
                }
                Err(e) => {
                    tracing::warn!(provider, error = %e, "Provider failed, falling through");
                }
            }
        }

        let state = HealthState::classify(metrics);
        tracing::info!(state = state.as_str(), "Using deterministic narrative fallback");
        Narrative {
            insight: fallback_insight(metrics, industry),
            source: FALLBACK_SOURCE,
        }
    }

    /// Produces an insight. Never fails.
    pub async fn get_narrative(&self, metrics: &Metrics, industry: &str) -> Insight {
        self.generate(metrics, industry).await.insight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_insight(summary: &str) -> Insight {
        Insight {
            summary: summary.to_string(),
            recommendations: vec!["a".into(), "b".into(), "c".into()],
            risk_level: RiskLevel::Medium,
            compliance_score: 70,
            compliance_checks: vec![
                ComplianceCheck::new("GST Filing", "Compliant", "On Time", "✅"),
                ComplianceCheck::new("TDS Returns", "Pending", "Due soon", "⚠️"),
                ComplianceCheck::new("Labor Laws", "Compliant", "Verified", "✅"),
            ],
        }
    }

    enum Behaviour {
        Succeed(Insight),
        Fail,
        Hang,
    }

    struct FakeProvider {
        name: &'static str,
        available: bool,
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn new(name: &'static str, available: bool, behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                name,
                available,
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NarrativeProvider for FakeProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_available(&self) -> bool {
            self.available
        }

        async fn attempt(&self, _prompt: &str) -> Result<Insight, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behaviour {
                Behaviour::Succeed(insight) => Ok(insight.clone()),
                Behaviour::Fail => Err(ProviderError::Request("connection refused".into())),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(ProviderError::Request("unreachable".into()))
                }
            }
        }
    }

    fn chain(providers: Vec<Arc<FakeProvider>>, timeout: Duration) -> ProviderChain {
        ProviderChain::new(
            providers
                .into_iter()
                .map(|p| p as Arc<dyn NarrativeProvider>)
                .collect(),
            timeout,
        )
    }

    fn profitable() -> Metrics {
        Metrics::from_totals(100000.0, 60000.0, 1.5)
    }

    #[tokio::test]
    async fn test_primary_success_skips_secondary() {
        let primary = FakeProvider::new("primary", true, Behaviour::Succeed(sample_insight("p")));
        let secondary =
            FakeProvider::new("secondary", true, Behaviour::Succeed(sample_insight("s")));
        let chain = chain(vec![primary.clone(), secondary.clone()], Duration::from_secs(5));

        let narrative = chain.generate(&profitable(), "Retail").await;

        assert_eq!(narrative.source, "primary");
        assert_eq!(narrative.insight.summary, "p");
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn test_failure_falls_through_to_secondary() {
        let primary = FakeProvider::new("primary", true, Behaviour::Fail);
        let secondary =
            FakeProvider::new("secondary", true, Behaviour::Succeed(sample_insight("s")));
        let chain = chain(vec![primary.clone(), secondary.clone()], Duration::from_secs(5));

        let narrative = chain.generate(&profitable(), "Retail").await;

        assert_eq!(narrative.source, "secondary");
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_providers_are_never_called() {
        let primary = FakeProvider::new("primary", false, Behaviour::Succeed(sample_insight("p")));
        let secondary = FakeProvider::new("secondary", false, Behaviour::Fail);
        let chain = chain(vec![primary.clone(), secondary.clone()], Duration::from_secs(5));

        let metrics = profitable();
        let narrative = chain.generate(&metrics, "Retail").await;

        assert_eq!(narrative.source, FALLBACK_SOURCE);
        assert_eq!(narrative.insight, fallback_insight(&metrics, "Retail"));
        assert_eq!(primary.calls() + secondary.calls(), 0);
        assert!(chain.available_providers().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_shape_falls_through() {
        let mut short = sample_insight("p");
        short.recommendations.pop();
        let primary = FakeProvider::new("primary", true, Behaviour::Succeed(short));
        let chain = chain(vec![primary], Duration::from_secs(5));

        let narrative = chain.generate(&profitable(), "Retail").await;
        assert_eq!(narrative.source, FALLBACK_SOURCE);
    }

    #[tokio::test]
    async fn test_hanging_provider_times_out() {
        let primary = FakeProvider::new("primary", true, Behaviour::Hang);
        let secondary =
            FakeProvider::new("secondary", true, Behaviour::Succeed(sample_insight("s")));
        let chain = chain(vec![primary, secondary], Duration::from_millis(50));

        let narrative = chain.generate(&profitable(), "Retail").await;
        assert_eq!(narrative.source, "secondary");
    }

    #[tokio::test]
    async fn test_repeated_failures_open_the_circuit() {
        let primary = FakeProvider::new("primary", true, Behaviour::Fail);
        let chain = chain(vec![primary.clone()], Duration::from_secs(5));

        for _ in 0..8 {
            let narrative = chain.generate(&profitable(), "Retail").await;
            assert_eq!(narrative.source, FALLBACK_SOURCE);
        }

        assert_eq!(primary.calls(), 5);
    }

    #[tokio::test]
    async fn test_get_narrative_without_providers() {
        let metrics = Metrics::from_totals(0.0, 500.0, 1.5);
        let insight = ProviderChain::fallback_only()
            .get_narrative(&metrics, "Logistics")
            .await;

        assert_eq!(insight.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_placeholder_credentials_are_unusable() {
        assert!(!is_usable_credential(None));
        assert!(!is_usable_credential(Some("   ")));
        assert!(!is_usable_credential(Some("your_openai_api_key_here")));
        assert!(!is_usable_credential(Some("your_claude_api_key")));
        assert!(is_usable_credential(Some("sk-live-123")));
    }

    #[test]
    fn test_extract_json_object() {
        let text = "Here is the analysis:\n{\"a\": {\"b\": 1}}\nLet me know!";
        assert_eq!(extract_json_object(text), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }

    #[test]
    fn test_parse_insight_accepts_lowercase_risk() {
        let json = r#"{
            "summary": "Healthy",
            "recommendations": ["a", "b", "c"],
            "risk_level": "low",
            "compliance_score": 90,
            "compliance_checks": [
                {"title": "GST", "status": "ok", "date": "now", "icon": "✅"},
                {"title": "Tax", "status": "ok", "date": "now", "icon": "✅"},
                {"title": "Labor", "status": "ok", "date": "now", "icon": "✅"}
            ]
        }"#;

        let insight = parse_insight(json).unwrap();
        assert_eq!(insight.risk_level, RiskLevel::Low);
        assert_eq!(insight.compliance_score, 90);
    }

    #[test]
    fn test_parse_insight_rejects_bad_shapes() {
        let over_score = r#"{"summary": "x", "recommendations": ["a","b","c"], "risk_level": "Low",
            "compliance_score": 140, "compliance_checks": [
            {"title": "a", "status": "b", "date": "c", "icon": "d"},
            {"title": "a", "status": "b", "date": "c", "icon": "d"},
            {"title": "a", "status": "b", "date": "c", "icon": "d"}]}"#;
        assert!(matches!(
            parse_insight(over_score),
            Err(ProviderError::InvalidResponse(_))
        ));

        let unknown_risk = over_score
            .replace("140", "40")
            .replace("\"Low\"", "\"Severe\"");
        assert!(parse_insight(&unknown_risk).is_err());

        assert!(parse_insight("not json").is_err());
    }

    #[test]
    fn test_prompt_embeds_industry_and_metrics() {
        let prompt = build_prompt(&profitable(), "Agriculture");
        assert!(prompt.contains("Agriculture industry"));
        assert!(prompt.contains("\"net_profit\":40000.0"));
        assert!(prompt.contains("\"compliance_checks\""));
    }
}
