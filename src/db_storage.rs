use chrono::Utc;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::analysis::AnalysisReport;
use crate::errors::{AppError, ResultExt};
use crate::models::{FinancialMetric, FinancialStatement, Pagination, Sme, SmeCreate, StoredAnalysis};

/// Persistence for SMEs and their analyses.
pub struct AnalysisStorage {
    pool: PgPool,
}

impl AnalysisStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Registers an SME. A duplicate registration number is a conflict.
    pub async fn create_sme(&self, input: &SmeCreate) -> Result<Sme, AppError> {
        let result = sqlx::query_as::<_, Sme>(
            r#"
            INSERT INTO smes (id, name, industry, registration_number, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, industry, registration_number, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.name.trim())
        .bind(input.industry.trim())
        .bind(input.registration_number.trim())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(sme) => {
                tracing::info!("✓ SME registered: {} ({})", sme.name, sme.id);
                Ok(sme)
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(AppError::Conflict(format!(
                    "SME with registration number '{}' already exists",
                    input.registration_number.trim()
                )))
            }
            Err(e) => Err::<Sme, _>(e).context("Failed to register SME"),
        }
    }

    pub async fn list_smes(&self, page: &Pagination) -> Result<Vec<Sme>, AppError> {
        sqlx::query_as::<_, Sme>(
            "SELECT id, name, industry, registration_number, created_at
             FROM smes ORDER BY created_at ASC OFFSET $1 LIMIT $2",
        )
        .bind(page.offset())
        .bind(page.limit())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list SMEs")
    }

    pub async fn get_sme(&self, id: Uuid) -> Result<Option<Sme>, AppError> {
        sqlx::query_as::<_, Sme>(
            "SELECT id, name, industry, registration_number, created_at FROM smes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load SME {}", id))
    }

    /// Stores the records, metrics and insight of one analysis in a single
    /// transaction. Nothing is written if any insert fails.
    pub async fn store_analysis(
        &self,
        sme_id: Uuid,
        file_name: &str,
        report: &AnalysisReport,
    ) -> Result<Uuid, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start analysis transaction")?;

        let statement_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO financial_statements
                (id, sme_id, file_name, data_type, content_sha256, data_source, raw_data, upload_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(statement_id)
        .bind(sme_id)
        .bind(file_name)
        .bind(report.format.as_str())
        .bind(&report.content_sha256)
        .bind(report.data_source.as_str())
        .bind(Json(&report.records))
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .context("Failed to store financial statement")?;

        sqlx::query(
            r#"
            INSERT INTO financial_metrics
                (id, statement_id, revenue, expenses, net_profit, ratios, ai_insights,
                 narrative_source, calculated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(statement_id)
        .bind(report.metrics.revenue)
        .bind(report.metrics.expenses)
        .bind(report.metrics.net_profit)
        .bind(Json(&report.metrics.ratios))
        .bind(Json(&report.insight))
        .bind(report.narrative_source)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .context("Failed to store financial metrics")?;

        tx.commit()
            .await
            .context("Failed to commit analysis transaction")?;

        tracing::info!(
            "✓ Analysis stored for SME {} (statement {})",
            sme_id,
            statement_id
        );
        Ok(statement_id)
    }

    /// Most recent analysis of an SME, if any.
    pub async fn latest_analysis(&self, sme_id: Uuid) -> Result<Option<StoredAnalysis>, AppError> {
        let metric = sqlx::query_as::<_, FinancialMetric>(
            r#"
            SELECT m.id, m.statement_id, m.revenue, m.expenses, m.net_profit, m.ratios,
                   m.ai_insights, m.narrative_source, m.calculated_at
            FROM financial_metrics m
            JOIN financial_statements s ON s.id = m.statement_id
            WHERE s.sme_id = $1
            ORDER BY m.calculated_at DESC
            LIMIT 1
            "#,
        )
        .bind(sme_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load latest metrics")?;

        let Some(metric) = metric else {
            return Ok(None);
        };

        let statement = sqlx::query_as::<_, FinancialStatement>(
            r#"
            SELECT id, sme_id, file_name, data_type, content_sha256, data_source, raw_data,
                   upload_date
            FROM financial_statements
            WHERE id = $1
            "#,
        )
        .bind(metric.statement_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to load financial statement")?;

        Ok(Some(StoredAnalysis { statement, metric }))
    }
}
