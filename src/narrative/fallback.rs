//! Rule-based insight used when no remote provider answers.

use super::{ComplianceCheck, Insight, RiskLevel};
use crate::metrics::Metrics;

/// Margin above which a profitable business counts as performing strongly.
pub const STRONG_MARGIN_THRESHOLD: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Profitable with a margin above 15%.
    Positive,
    /// Profitable with a margin of at most 15%.
    Stable,
    /// Not profitable.
    Critical,
}

impl HealthState {
    pub fn classify(metrics: &Metrics) -> Self {
        if !metrics.is_profitable() {
            HealthState::Critical
        } else if metrics.ratios.profit_margin > STRONG_MARGIN_THRESHOLD {
            HealthState::Positive
        } else {
            HealthState::Stable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Positive => "positive",
            HealthState::Stable => "stable",
            HealthState::Critical => "critical",
        }
    }
}

fn recommendations(items: [&str; 3]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Pre-authored insight for the metrics' health state. Pure and total.
///
/// Amounts in the summary are always rendered with two decimals.
pub fn fallback_insight(metrics: &Metrics, industry: &str) -> Insight {
    match HealthState::classify(metrics) {
        HealthState::Positive => Insight {
            summary: format!(
                "Strong financial performance in the {} sector. Your profit margin of {:.2}% is significantly above industry benchmarks.",
                industry, metrics.ratios.profit_margin
            ),
            recommendations: recommendations([
                "Explore reinvestment opportunities for business expansion.",
                "Consider building a long-term capital reserve for future growth.",
                "Evaluate tax-saving investment options for the current fiscal year.",
            ]),
            risk_level: RiskLevel::Low,
            compliance_score: 94,
            compliance_checks: vec![
                ComplianceCheck::new("GST Filing", "Compliant", "On Time", "✅"),
                ComplianceCheck::new("TDS Returns", "Compliant", "Up to date", "✅"),
                ComplianceCheck::new("Labor Laws", "Compliant", "Verified", "✅"),
            ],
        },
        HealthState::Stable => Insight {
            summary: format!(
                "Your business in the {} sector is maintaining stability with a net profit of ${:.2}.",
                industry, metrics.net_profit
            ),
            recommendations: recommendations([
                "Focus on reducing operational overhead to improve margins.",
                "Optimize inventory turnover to free up working capital.",
                "Review customer payment cycles to ensure consistent cash flow.",
            ]),
            risk_level: RiskLevel::Medium,
            compliance_score: 82,
            compliance_checks: vec![
                ComplianceCheck::new("GST Filing", "Compliant", "On Time", "✅"),
                ComplianceCheck::new("TDS Returns", "Pending", "Due in 5 days", "⚠️"),
                ComplianceCheck::new("Labor Laws", "Action Required", "Renewal Needed", "❌"),
            ],
        },
        HealthState::Critical => Insight {
            summary: format!(
                "Financial stress detected. The current net loss indicates that operating costs are exceeding revenue in the {} segment, with a net profit of ${:.2}.",
                industry, metrics.net_profit
            ),
            recommendations: recommendations([
                "Immediate audit of all non-essential expenses.",
                "Negotiate extended payment terms with key suppliers.",
                "Explore short-term working capital financing to bridge cash gaps.",
            ]),
            risk_level: RiskLevel::High,
            compliance_score: 45,
            compliance_checks: vec![
                ComplianceCheck::new("GST Filing", "Late", "Overdue", "❌"),
                ComplianceCheck::new("TDS Returns", "Overdue", "Immediate action", "❌"),
                ComplianceCheck::new("Labor Laws", "Non-compliant", "Warning issued", "⚠️"),
            ],
        },
    }
}
