//! Document decoding: raw upload bytes into normalized records or text.
//!
//! Tabular formats (`csv`, `xlsx`) become a [`RecordSet`] with one record per
//! row, keyed by the normalized column header. PDFs become a single text blob
//! built from the per-page text in page order.

use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Cursor;

use crate::errors::AnalysisError;

/// Declared format of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Csv,
    Xlsx,
    Pdf,
}

impl DocumentFormat {
    /// Matches an extension case-insensitively, with or without the dot.
    pub fn from_extension(extension: &str) -> Result<Self, AnalysisError> {
        match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "csv" => Ok(DocumentFormat::Csv),
            "xlsx" => Ok(DocumentFormat::Xlsx),
            "pdf" => Ok(DocumentFormat::Pdf),
            other => Err(AnalysisError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Detects the format from the extension of an uploaded file name.
    pub fn from_file_name(file_name: &str) -> Result<Self, AnalysisError> {
        match file_name.rsplit_once('.') {
            Some((_, extension)) => Self::from_extension(extension),
            None => Err(AnalysisError::UnsupportedFormat(file_name.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Csv => "csv",
            DocumentFormat::Xlsx => "xlsx",
            DocumentFormat::Pdf => "pdf",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar cell value, typed only as far as the decoder can infer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Numeric view of the value. Text counts when it parses as a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            FieldValue::Null | FieldValue::Bool(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Infers a value from a raw text cell.
    fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
            return FieldValue::Null;
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return FieldValue::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return FieldValue::Bool(false);
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => FieldValue::Number(n),
            _ => FieldValue::Text(raw.to_string()),
        }
    }
}

/// One row of a tabular document, keyed by normalized field name.
pub type Record = BTreeMap<String, FieldValue>;

/// Ordered rows of a tabular document.
pub type RecordSet = Vec<Record>;

/// Result of decoding a document.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedDocument {
    Records(RecordSet),
    Text(String),
}

/// An uploaded document, alive only for the duration of one analysis.
#[derive(Debug, Clone, Copy)]
pub struct RawDocument<'a> {
    pub format: DocumentFormat,
    pub bytes: &'a [u8],
}

impl<'a> RawDocument<'a> {
    pub fn new(format: DocumentFormat, bytes: &'a [u8]) -> Self {
        Self { format, bytes }
    }

    /// Builds a document from an upload, rejecting unknown extensions.
    pub fn from_upload(file_name: &str, bytes: &'a [u8]) -> Result<Self, AnalysisError> {
        Ok(Self::new(DocumentFormat::from_file_name(file_name)?, bytes))
    }

    pub fn parse(&self) -> Result<ParsedDocument, AnalysisError> {
        parse(self.format, self.bytes)
    }
}

/// Lower-cases a header and replaces internal spaces with underscores.
/// Applying it twice gives the same result as applying it once.
pub fn normalize_field_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// Returns a copy of the record with every field name normalized.
pub fn normalize_record(record: &Record) -> Record {
    record
        .iter()
        .map(|(key, value)| (normalize_field_name(key), value.clone()))
        .collect()
}

/// Decodes a document of a known format.
pub fn parse(format: DocumentFormat, bytes: &[u8]) -> Result<ParsedDocument, AnalysisError> {
    match format {
        DocumentFormat::Csv => parse_csv(bytes).map(ParsedDocument::Records),
        DocumentFormat::Xlsx => parse_xlsx(bytes).map(ParsedDocument::Records),
        DocumentFormat::Pdf => parse_pdf(bytes).map(ParsedDocument::Text),
    }
}

fn header_names<'h>(headers: impl Iterator<Item = &'h str>) -> Vec<String> {
    headers
        .enumerate()
        .map(|(idx, header)| {
            let name = normalize_field_name(header);
            if name.is_empty() {
                format!("unnamed_{}", idx)
            } else {
                name
            }
        })
        .collect()
}

pub fn parse_csv(bytes: &[u8]) -> Result<RecordSet, AnalysisError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| AnalysisError::parse(DocumentFormat::Csv, e))?
        .clone();
    if headers.is_empty() {
        return Err(AnalysisError::parse(
            DocumentFormat::Csv,
            "no header row found",
        ));
    }
    let names = header_names(headers.iter());

    let mut records = RecordSet::new();
    for row in reader.records() {
        let row = row.map_err(|e| AnalysisError::parse(DocumentFormat::Csv, e))?;
        if row.len() > names.len() {
            let line = row.position().map_or(0, |pos| pos.line());
            return Err(AnalysisError::parse(
                DocumentFormat::Csv,
                format!(
                    "line {} has {} fields, but the header has {}",
                    line,
                    row.len(),
                    names.len()
                ),
            ));
        }
        // Short rows are padded with nulls for the trailing columns.
        let record: Record = names
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let value = row.get(idx).map_or(FieldValue::Null, FieldValue::infer);
                (name.clone(), value)
            })
            .collect();
        records.push(record);
    }

    tracing::debug!(rows = records.len(), columns = names.len(), "Parsed CSV document");
    Ok(records)
}

fn cell_value(cell: &Data) -> FieldValue {
    match cell {
        Data::Int(i) => FieldValue::Number(*i as f64),
        Data::Float(f) => FieldValue::Number(*f),
        Data::Bool(b) => FieldValue::Bool(*b),
        Data::String(s) if s.trim().is_empty() => FieldValue::Null,
        Data::String(s) => FieldValue::Text(s.clone()),
        Data::DateTime(_) | Data::DateTimeIso(_) | Data::DurationIso(_) => {
            FieldValue::Text(cell.to_string())
        }
        Data::Error(_) | Data::Empty => FieldValue::Null,
    }
}

/// Reads the first worksheet; its first row holds the headers.
pub fn parse_xlsx(bytes: &[u8]) -> Result<RecordSet, AnalysisError> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|e| AnalysisError::parse(DocumentFormat::Xlsx, e))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AnalysisError::parse(DocumentFormat::Xlsx, "workbook has no worksheets"))?
        .map_err(|e| AnalysisError::parse(DocumentFormat::Xlsx, e))?;

    let mut rows = range.rows();
    let header_row = rows
        .next()
        .ok_or_else(|| AnalysisError::parse(DocumentFormat::Xlsx, "worksheet is empty"))?;
    let header_text: Vec<String> = header_row.iter().map(|cell| cell.to_string()).collect();
    let names = header_names(header_text.iter().map(String::as_str));

    let records: RecordSet = rows
        .filter(|row| row.iter().any(|cell| !matches!(cell, Data::Empty)))
        .map(|row| {
            names
                .iter()
                .cloned()
                .zip(row.iter().map(cell_value))
                .collect::<Record>()
        })
        .collect();

    tracing::debug!(rows = records.len(), columns = names.len(), "Parsed XLSX document");
    Ok(records)
}

/// Concatenates the text of every page in page order.
pub fn parse_pdf(bytes: &[u8]) -> Result<String, AnalysisError> {
    let document = lopdf::Document::load_mem(bytes)
        .map_err(|e| AnalysisError::parse(DocumentFormat::Pdf, e))?;

    let mut text = String::new();
    for page_number in document.get_pages().keys() {
        match document.extract_text(&[*page_number]) {
            Ok(page_text) => text.push_str(&page_text),
            Err(e) => {
                tracing::warn!(page = page_number, error = %e, "Skipping unreadable PDF page");
            }
        }
    }

    tracing::debug!(chars = text.len(), "Extracted PDF text");
    Ok(text)
}

/// Parses the trailing amount of a statement line: `$12,500.00`, `(1,200)`,
/// `-300`. Percentages are not amounts.
fn parse_amount_token(token: &str) -> Option<f64> {
    if token.ends_with('%') {
        return None;
    }
    let (negative, inner) = match token.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, token),
    };
    let cleaned: String = inner
        .trim_start_matches(&['$', '€', '£', '₹'][..])
        .chars()
        .filter(|c| *c != ',')
        .collect();
    let value = cleaned.parse::<f64>().ok().filter(|n| n.is_finite())?;
    Some(if negative { -value } else { value })
}

/// Heuristic line scan of statement text: every `label ... amount` line
/// becomes `{type: label, amount: amount}`.
pub fn records_from_text(text: &str) -> RecordSet {
    text.lines()
        .filter_map(|line| {
            let mut tokens: Vec<&str> = line.split_whitespace().collect();
            let amount = parse_amount_token(tokens.pop()?)?;
            let label = tokens.join(" ");
            if !label.chars().any(char::is_alphabetic) {
                return None;
            }
            let mut record = Record::new();
            record.insert("type".to_string(), FieldValue::Text(label));
            record.insert("amount".to_string(), FieldValue::Number(amount));
            Some(record)
        })
        .collect()
}
