//! Reduction of normalized records into the fixed [`Metrics`] shape.

use serde::{Deserialize, Serialize};

use crate::parser::{normalize_record, Record};

/// Liquidity ratio reported when no balance-sheet columns are available.
pub const PLACEHOLDER_LIQUIDITY_RATIO: f64 = 1.5;

const REVENUE_MARKERS: [&str; 2] = ["rev", "income"];
const EXPENSE_MARKERS: [&str; 2] = ["exp", "cost"];

/// Named ratios derived from the statement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ratios {
    pub liquidity_ratio: f64,
    /// Net profit as a percentage of revenue, 0 when there is no revenue.
    pub profit_margin: f64,
}

/// Financial summary of one statement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub revenue: f64,
    pub expenses: f64,
    /// Always `revenue - expenses`.
    pub net_profit: f64,
    pub ratios: Ratios,
}

impl Metrics {
    /// Builds metrics from the two accumulations; every derived field follows
    /// from them.
    pub fn from_totals(revenue: f64, expenses: f64, liquidity_ratio: f64) -> Self {
        let net_profit = revenue - expenses;
        Self {
            revenue,
            expenses,
            net_profit,
            ratios: Ratios {
                liquidity_ratio,
                profit_margin: profit_margin(net_profit, revenue),
            },
        }
    }

    pub fn is_profitable(&self) -> bool {
        self.net_profit > 0.0
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `round(net_profit / revenue * 100, 2)` when revenue is positive, else 0.
pub fn profit_margin(net_profit: f64, revenue: f64) -> f64 {
    if revenue > 0.0 {
        round2(net_profit / revenue * 100.0)
    } else {
        0.0
    }
}

/// Whether a `type` label counts as (revenue, expense). Case-insensitive;
/// both may be true.
pub fn classify_kind(kind: &str) -> (bool, bool) {
    let kind = kind.to_lowercase();
    (
        REVENUE_MARKERS.iter().any(|marker| kind.contains(marker)),
        EXPENSE_MARKERS.iter().any(|marker| kind.contains(marker)),
    )
}

fn has_field(records: &[Record], field: &str) -> bool {
    records.iter().any(|record| record.contains_key(field))
}

fn column_total(records: &[Record], field: &str) -> f64 {
    records
        .iter()
        .filter_map(|record| record.get(field).and_then(|value| value.as_f64()))
        .sum()
}

/// Current assets over current liabilities when both columns exist and the
/// liabilities are positive.
fn liquidity_ratio(records: &[Record]) -> f64 {
    if !has_field(records, "current_assets") || !has_field(records, "current_liabilities") {
        return PLACEHOLDER_LIQUIDITY_RATIO;
    }
    let liabilities = column_total(records, "current_liabilities");
    if liabilities <= 0.0 {
        return PLACEHOLDER_LIQUIDITY_RATIO;
    }
    round2(column_total(records, "current_assets") / liabilities)
}

/// Computes revenue, expenses, net profit and ratios.
///
/// Records are classified by a case-insensitive substring match on their
/// `type` field: `rev`/`income` count as revenue, `exp`/`cost` as expenses.
/// A type matching both patterns (e.g. "Cost Revenue Share") is counted in
/// both totals. Without both an `amount` and a `type` field every monetary
/// metric is zero.
pub fn calculate(records: &[Record]) -> Metrics {
    let records: Vec<Record> = records.iter().map(normalize_record).collect();

    let mut revenue = 0.0;
    let mut expenses = 0.0;

    if has_field(&records, "amount") && has_field(&records, "type") {
        for record in &records {
            let Some(kind) = record.get("type").and_then(|v| v.as_text()) else {
                continue;
            };
            let Some(amount) = record.get("amount").and_then(|v| v.as_f64()) else {
                continue;
            };
            let (is_revenue, is_expense) = classify_kind(kind);

            if is_revenue {
                revenue += amount;
            }
            if is_expense {
                expenses += amount;
            }
        }
    } else {
        tracing::debug!("No amount/type columns found, monetary metrics default to zero");
    }

    let metrics = Metrics::from_totals(revenue, expenses, liquidity_ratio(&records));
    tracing::debug!(
        revenue = metrics.revenue,
        expenses = metrics.expenses,
        net_profit = metrics.net_profit,
        profit_margin = metrics.ratios.profit_margin,
        "Calculated metrics"
    );
    metrics
}
