//! Analysis pipeline: bytes, then records, then metrics, then narrative.
//!
//! Every input failure (unknown format, unreadable document) is reported
//! before any provider is contacted. Once records exist the pipeline cannot
//! fail: the narrative chain always answers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::AnalysisError;
use crate::metrics::{calculate, classify_kind, Metrics};
use crate::narrative::{Insight, ProviderChain};
use crate::parser::{records_from_text, DocumentFormat, FieldValue, ParsedDocument, RawDocument, Record, RecordSet};

/// Where the records fed to the calculator came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Rows of a CSV or XLSX sheet.
    Tabular,
    /// Statement lines found in PDF text.
    PdfText,
    /// Fixed sample records; the PDF had no recognizable statement lines.
    Placeholder,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Tabular => "tabular",
            DataSource::PdfText => "pdf_text",
            DataSource::Placeholder => "placeholder",
        }
    }
}

/// Records used when a PDF yields no statement lines.
pub fn placeholder_records() -> RecordSet {
    [("revenue", 10000.0), ("expense", 6000.0)]
        .into_iter()
        .map(|(kind, amount)| {
            let mut record = Record::new();
            record.insert("type".to_string(), FieldValue::Text(kind.to_string()));
            record.insert("amount".to_string(), FieldValue::Number(amount));
            record
        })
        .collect()
}

/// Records for PDF text: the statement lines found in it, or the placeholder
/// records when none of them is a revenue or expense line.
pub fn statement_records(text: &str) -> (RecordSet, DataSource) {
    let records = records_from_text(text);
    let classified = records.iter().any(|record| {
        record
            .get("type")
            .and_then(|value| value.as_text())
            .is_some_and(|kind| {
                let (is_revenue, is_expense) = classify_kind(kind);
                is_revenue || is_expense
            })
    });

    if classified {
        (records, DataSource::PdfText)
    } else {
        tracing::warn!(
            chars = text.len(),
            lines = records.len(),
            "No revenue or expense lines found in PDF text, using placeholder records"
        );
        (placeholder_records(), DataSource::Placeholder)
    }
}

/// Hex SHA-256 of the uploaded bytes.
pub fn content_checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// A decoded document ready for metric calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedDocument {
    pub format: DocumentFormat,
    pub data_source: DataSource,
    pub content_sha256: String,
    pub records: RecordSet,
}

/// Decodes a document into records without touching any provider.
pub fn prepare(document: RawDocument<'_>) -> Result<PreparedDocument, AnalysisError> {
    let (records, data_source) = match document.parse()? {
        ParsedDocument::Records(records) => (records, DataSource::Tabular),
        ParsedDocument::Text(text) => statement_records(&text),
    };

    Ok(PreparedDocument {
        format: document.format,
        data_source,
        content_sha256: content_checksum(document.bytes),
        records,
    })
}

/// Everything one analysis produces.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub format: DocumentFormat,
    pub data_source: DataSource,
    pub content_sha256: String,
    pub records: RecordSet,
    pub metrics: Metrics,
    pub insight: Insight,
    /// Tier that produced the insight.
    pub narrative_source: &'static str,
}

pub struct AnalysisEngine {
    chain: ProviderChain,
}

impl AnalysisEngine {
    pub fn new(chain: ProviderChain) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &ProviderChain {
        &self.chain
    }

    /// Runs the whole pipeline for an uploaded file.
    pub async fn analyze(
        &self,
        file_name: &str,
        bytes: &[u8],
        industry: &str,
    ) -> Result<AnalysisReport, AnalysisError> {
        let document = RawDocument::from_upload(file_name, bytes)?;
        self.analyze_document(document, industry).await
    }

    pub async fn analyze_document(
        &self,
        document: RawDocument<'_>,
        industry: &str,
    ) -> Result<AnalysisReport, AnalysisError> {
        let prepared = prepare(document)?;
        tracing::info!(
            format = %prepared.format,
            data_source = prepared.data_source.as_str(),
            records = prepared.records.len(),
            "Document parsed"
        );

        let metrics = calculate(&prepared.records);
        let narrative = self.chain.generate(&metrics, industry).await;

        Ok(AnalysisReport {
            format: prepared.format,
            data_source: prepared.data_source,
            content_sha256: prepared.content_sha256,
            records: prepared.records,
            metrics,
            insight: narrative.insight,
            narrative_source: narrative.source,
        })
    }
}
