use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::analysis::DataSource;
use crate::metrics::{Metrics, Ratios};
use crate::narrative::Insight;
use crate::parser::RecordSet;

// ============ Database Models ============

/// A small or medium enterprise whose statements are analysed.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Sme {
    pub id: Uuid,
    pub name: String,
    /// Industry label interpolated into narratives.
    pub industry: String,
    /// Company registration number, unique across SMEs.
    pub registration_number: String,
    pub created_at: DateTime<Utc>,
}

/// An uploaded statement and the records decoded from it.
#[derive(Debug, Clone, FromRow)]
pub struct FinancialStatement {
    pub id: Uuid,
    pub sme_id: Uuid,
    pub file_name: String,
    /// `csv`, `xlsx` or `pdf`.
    pub data_type: String,
    pub content_sha256: String,
    pub data_source: String,
    pub raw_data: Json<RecordSet>,
    pub upload_date: DateTime<Utc>,
}

/// Metrics and insight computed for a statement.
#[derive(Debug, Clone, FromRow)]
pub struct FinancialMetric {
    pub id: Uuid,
    pub statement_id: Uuid,
    pub revenue: f64,
    pub expenses: f64,
    pub net_profit: f64,
    pub ratios: Json<Ratios>,
    pub ai_insights: Json<Insight>,
    /// Narrative tier that produced the insight.
    pub narrative_source: String,
    pub calculated_at: DateTime<Utc>,
}

impl FinancialMetric {
    pub fn metrics(&self) -> Metrics {
        Metrics {
            revenue: self.revenue,
            expenses: self.expenses,
            net_profit: self.net_profit,
            ratios: self.ratios.0,
        }
    }
}

/// Records, metrics and insight of one analysis, read back together.
#[derive(Debug, Clone)]
pub struct StoredAnalysis {
    pub statement: FinancialStatement,
    pub metric: FinancialMetric,
}

// ============ API Models ============

#[derive(Debug, Clone, Deserialize)]
pub struct SmeCreate {
    pub name: String,
    pub industry: String,
    pub registration_number: String,
}

impl SmeCreate {
    /// Every field is required and must not be blank.
    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("name", &self.name),
            ("industry", &self.industry),
            ("registration_number", &self.registration_number),
        ] {
            if value.trim().is_empty() {
                return Err(format!("'{}' cannot be empty", field));
            }
        }
        Ok(())
    }
}

/// `?skip=&limit=` query for listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

impl Pagination {
    pub const DEFAULT_LIMIT: i64 = 100;
    pub const MAX_LIMIT: i64 = 100;

    pub fn offset(&self) -> i64 {
        self.skip.unwrap_or(0).max(0)
    }

    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResponse {
    pub status: &'static str,
    pub statement_id: Uuid,
    pub data_source: DataSource,
    pub narrative_source: &'static str,
    pub metrics: Metrics,
    pub ai_insights: Insight,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatestAnalysisResponse {
    /// `success` or `no_data`.
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_insights: Option<Insight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculated_at: Option<DateTime<Utc>>,
}

impl LatestAnalysisResponse {
    pub fn no_data() -> Self {
        Self {
            status: "no_data",
            statement_id: None,
            file_name: None,
            metrics: None,
            ai_insights: None,
            calculated_at: None,
        }
    }
}

impl From<StoredAnalysis> for LatestAnalysisResponse {
    fn from(stored: StoredAnalysis) -> Self {
        Self {
            status: "success",
            statement_id: Some(stored.statement.id),
            file_name: Some(stored.statement.file_name),
            metrics: Some(stored.metric.metrics()),
            ai_insights: Some(stored.metric.ai_insights.0),
            calculated_at: Some(stored.metric.calculated_at),
        }
    }
}
